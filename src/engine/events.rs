//! Model-side effects of browser events.
//!
//! Applying an event never talks to the browser. The one follow-up that
//! needs a browser call, releasing a re-navigated tab from its special
//! group, is returned as an [`EventEffect`] for the caller to perform.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{EngineModel, GroupId, TabId, TabStatus, TrackedTab};
use crate::naming::parse;
use crate::provider::BrowserEvent;
use crate::zones::USER_EDIT_LOCK;

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Navigation events for one tab closer together than this collapse into one.
pub const NAVIGATION_DEBOUNCE: Duration = Duration::seconds(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEffect {
    None,
    ReleaseFromSpecial { tab_id: TabId, group_id: GroupId },
}

/// Per-tab debounce. The first event in a burst is admitted.
#[derive(Debug, Default)]
pub struct Debouncer {
    window: Duration,
    last_seen: BTreeMap<TabId, DateTime<Utc>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: BTreeMap::new(),
        }
    }

    pub fn admit(&mut self, tab_id: TabId, now: DateTime<Utc>) -> bool {
        let admitted = match self.last_seen.get(&tab_id) {
            Some(last) => now - *last >= self.window || now < *last,
            None => true,
        };
        if admitted {
            self.last_seen.insert(tab_id, now);
        }
        admitted
    }

    pub fn forget(&mut self, tab_id: TabId) {
        self.last_seen.remove(&tab_id);
    }

    /// Drops entries for tabs that no longer exist.
    pub fn retain_live(&mut self, is_live: impl Fn(TabId) -> bool) {
        self.last_seen.retain(|tab_id, _| is_live(*tab_id));
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}

pub fn apply_event(model: &mut EngineModel, event: &BrowserEvent, now: DateTime<Utc>) -> EventEffect {
    let active_total = model.active_time.current_total(now);

    match event {
        BrowserEvent::TabCreated { tab } => {
            let in_special_group = tab
                .group_id
                .map(|group_id| {
                    model
                        .windows
                        .get(&tab.window_id)
                        .is_some_and(|window| window.is_special(group_id))
                })
                .unwrap_or(false);
            let tracked = model.tabs.entry(tab.id).or_insert_with(|| {
                TrackedTab::new(
                    tab.id,
                    tab.window_id,
                    tab.url.as_str(),
                    tab.title.as_str(),
                    active_total,
                    now,
                )
            });
            tracked.window_id = tab.window_id;
            tracked.group_id = tab.group_id;
            tracked.excluded = tab.pinned;
            tracked.in_special_group = in_special_group;
            model.window_mut(tab.window_id);
            EventEffect::None
        }
        BrowserEvent::TabRemoved { tab_id } => {
            model.tabs.remove(tab_id);
            EventEffect::None
        }
        BrowserEvent::TabNavigated { tab_id, url, title } => {
            let Some(tab) = model.tabs.get_mut(tab_id) else {
                return EventEffect::None;
            };
            tab.reset_age(active_total, now);
            tab.url = url.clone();
            tab.title = title.clone();
            log_debug!("Tab {tab_id} navigated; age reset");
            match (tab.in_special_group, tab.group_id) {
                (true, Some(group_id)) => EventEffect::ReleaseFromSpecial {
                    tab_id: *tab_id,
                    group_id,
                },
                _ => EventEffect::None,
            }
        }
        BrowserEvent::TabTitleChanged { tab_id, title } => {
            if let Some(tab) = model.tabs.get_mut(tab_id) {
                tab.title = title.clone();
            }
            EventEffect::None
        }
        BrowserEvent::TabPinnedChanged { tab_id, pinned } => {
            if let Some(tab) = model.tabs.get_mut(tab_id) {
                tab.excluded = *pinned;
                if *pinned {
                    tab.status = TabStatus::Green;
                }
            }
            EventEffect::None
        }
        BrowserEvent::TabAttached {
            tab_id,
            window_id,
            group_id,
        } => {
            let in_special_group = group_id
                .map(|group_id| {
                    model
                        .windows
                        .get(window_id)
                        .is_some_and(|window| window.is_special(group_id))
                })
                .unwrap_or(false);
            if let Some(tab) = model.tabs.get_mut(tab_id) {
                tab.window_id = *window_id;
                tab.group_id = *group_id;
                tab.in_special_group = in_special_group;
            }
            EventEffect::None
        }
        BrowserEvent::GroupUpdated {
            group_id,
            window_id,
            title,
        } => {
            let progress = model
                .window_mut(*window_id)
                .naming
                .entry(*group_id)
                .or_default();
            if progress.last_written_title.as_deref() != Some(title.as_str()) {
                log_debug!("Group {group_id} retitled by the user; naming paused");
                progress.user_edit_lock_until = Some(now + USER_EDIT_LOCK);
                if !parse(title).is_unnamed() {
                    progress.first_seen_unnamed_at = None;
                }
            }
            EventEffect::None
        }
        BrowserEvent::GroupRemoved { group_id } => {
            for window in model.windows.values_mut() {
                window.forget_group(*group_id);
            }
            for tab in model.tabs.values_mut() {
                if tab.group_id == Some(*group_id) {
                    tab.group_id = None;
                    tab.in_special_group = false;
                }
            }
            EventEffect::None
        }
        BrowserEvent::FocusChanged { window_id } => {
            match window_id {
                Some(_) => model.active_time.on_focus_gained(now),
                None => model.active_time.on_focus_lost(now),
            }
            EventEffect::None
        }
        BrowserEvent::WindowRemoved { window_id } => {
            model.windows.remove(window_id);
            model.tabs.retain(|_, tab| tab.window_id != *window_id);
            EventEffect::None
        }
    }
}
