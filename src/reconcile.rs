//! Brings the engine model in line with the live browser.
//!
//! Runs at the start of every cycle and at cold start. Tabs the browser
//! re-numbered across a restart are matched back to their orphaned entries
//! by URL so their age survives. Special groups whose id changed are found
//! again through those same tabs and keep their marker.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::models::{
    EngineModel, GroupId, NamingProgress, SpecialGroupRef, SpecialStage, TabId, TabStatus,
    TrackedTab, WindowId, WindowState,
};
use crate::provider::LiveWorld;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub retained: usize,
    pub adopted: usize,
    pub deleted: usize,
    pub navigated: usize,
    pub windows_created: usize,
    pub windows_deleted: usize,
    pub groups_forgotten: usize,
    pub specials_rebound: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.created
            + self.adopted
            + self.deleted
            + self.navigated
            + self.windows_created
            + self.windows_deleted
            + self.groups_forgotten
            + self.specials_rebound
            > 0
    }
}

/// Whether two URLs point at the same document, ignoring the fragment.
pub fn same_document(a: &str, b: &str) -> bool {
    fn strip(url: &str) -> &str {
        url.split_once('#').map(|(head, _)| head).unwrap_or(url)
    }
    strip(a) == strip(b)
}

/// Special group whose id is no longer live. Rebound to whichever live
/// group now holds most of its former members.
struct StaleSpecial {
    stage: SpecialStage,
    special: SpecialGroupRef,
    naming: Option<NamingProgress>,
}

fn stale_specials(
    model: &EngineModel,
    live_groups: &BTreeMap<GroupId, WindowId>,
) -> Vec<StaleSpecial> {
    model
        .windows
        .values()
        .flat_map(|state| {
            state
                .special_groups
                .iter()
                .filter(|(_, special)| !live_groups.contains_key(&special.group_id))
                .map(move |(stage, special)| StaleSpecial {
                    stage: *stage,
                    special: special.clone(),
                    naming: state.naming.get(&special.group_id).cloned(),
                })
        })
        .collect()
}

fn rebind_specials(
    model: &mut EngineModel,
    stale: Vec<StaleSpecial>,
    votes: &BTreeMap<(GroupId, GroupId), usize>,
    live_groups: &BTreeMap<GroupId, WindowId>,
) -> usize {
    let mut rebound = 0;
    for entry in stale {
        let old_id = entry.special.group_id;
        // Most former members wins; ties go to the lower group id.
        let best = votes
            .iter()
            .filter(|((old, _), _)| *old == old_id)
            .max_by(|((_, a_id), a_count), ((_, b_id), b_count)| {
                a_count.cmp(b_count).then(b_id.cmp(a_id))
            })
            .map(|((_, new_id), _)| *new_id);
        let Some(new_id) = best else {
            continue;
        };
        let Some(window_id) = live_groups.get(&new_id).copied() else {
            continue;
        };

        let state = model.window_mut(window_id);
        if state.is_special(new_id) || state.special_groups.contains_key(&entry.stage) {
            continue;
        }
        log_info!(
            "Special group {} ({}) is now group {new_id} in window {window_id}",
            entry.special.marker,
            entry.stage.default_title()
        );
        let special = SpecialGroupRef {
            group_id: new_id,
            ..entry.special
        };
        state.special_groups.insert(entry.stage, special);
        if let Some(naming) = entry.naming {
            state.naming.insert(new_id, naming);
        }

        for tab in model.tabs.values_mut() {
            if tab.group_id == Some(new_id) {
                tab.in_special_group = true;
            }
        }
        rebound += 1;
    }
    rebound
}

pub fn reconcile(
    model: &mut EngineModel,
    world: &LiveWorld,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let active_total = model.active_time.current_total(now);

    let live_windows: BTreeSet<WindowId> = world.windows.iter().map(|window| window.id).collect();
    let live_groups: BTreeMap<GroupId, WindowId> = world
        .groups
        .iter()
        .map(|group| (group.id, group.window_id))
        .collect();
    let stale = stale_specials(model, &live_groups);
    let mut votes: BTreeMap<(GroupId, GroupId), usize> = BTreeMap::new();

    for window_id in &live_windows {
        if !model.windows.contains_key(window_id) {
            model.windows.insert(*window_id, WindowState::new(*window_id));
            report.windows_created += 1;
        }
    }
    let before = model.windows.len();
    model.windows.retain(|id, _| live_windows.contains(id));
    report.windows_deleted = before - model.windows.len();

    // Forget groups that vanished or moved to another window.
    for (window_id, state) in model.windows.iter_mut() {
        let known: BTreeSet<_> = state
            .zones
            .keys()
            .chain(state.naming.keys())
            .copied()
            .chain(state.special_groups.values().map(|special| special.group_id))
            .collect();
        for group_id in known {
            if live_groups.get(&group_id) != Some(window_id) {
                state.forget_group(group_id);
                report.groups_forgotten += 1;
            }
        }
    }

    let live_ids: BTreeSet<TabId> = world.tabs.iter().map(|tab| tab.id).collect();
    let mut orphans: BTreeMap<String, VecDeque<TrackedTab>> = BTreeMap::new();
    let orphan_ids: Vec<TabId> = model
        .tabs
        .keys()
        .filter(|id| !live_ids.contains(*id))
        .copied()
        .collect();
    for id in orphan_ids {
        if let Some(tab) = model.tabs.remove(&id) {
            orphans.entry(tab.url.clone()).or_default().push_back(tab);
        }
    }

    let mut live_tabs: Vec<_> = world.tabs.iter().collect();
    live_tabs.sort_by_key(|tab| (tab.window_id, tab.index, tab.id));
    for live in live_tabs {
        if let Some(tab) = model.tabs.get_mut(&live.id) {
            if same_document(&tab.url, &live.url) {
                report.retained += 1;
            } else {
                tab.reset_age(active_total, now);
                report.navigated += 1;
            }
        } else {
            let adopted = orphans
                .get_mut(&live.url)
                .and_then(|candidates| candidates.pop_front());
            let tab = match adopted {
                Some(mut previous) => {
                    log_debug!("Tab {} adopted record of former tab {}", live.id, previous.id);
                    previous.id = live.id;
                    report.adopted += 1;
                    previous
                }
                None => {
                    report.created += 1;
                    TrackedTab::new(
                        live.id,
                        live.window_id,
                        live.url.as_str(),
                        live.title.as_str(),
                        active_total,
                        now,
                    )
                }
            };
            model.tabs.insert(live.id, tab);
        }

        let in_special_group = live
            .group_id
            .and_then(|group_id| {
                model
                    .windows
                    .get(&live.window_id)
                    .map(|state| state.is_special(group_id))
            })
            .unwrap_or(false);
        let Some(tab) = model.tabs.get_mut(&live.id) else {
            continue;
        };
        if let (Some(old_id), Some(new_id)) = (tab.group_id, live.group_id) {
            if stale.iter().any(|entry| entry.special.group_id == old_id) {
                *votes.entry((old_id, new_id)).or_insert(0) += 1;
            }
        }
        tab.window_id = live.window_id;
        tab.url = live.url.clone();
        tab.title = live.title.clone();
        tab.group_id = live.group_id;
        tab.excluded = live.pinned;
        if tab.excluded {
            tab.status = TabStatus::Green;
        }
        tab.in_special_group = in_special_group;
    }

    report.deleted = orphans.values().map(VecDeque::len).sum();
    report.specials_rebound = rebind_specials(model, stale, &votes, &live_groups);

    if report.changed() {
        log_info!(
            "Reconciled: {} created, {} adopted, {} deleted, {} navigated, {} windows added, {} windows dropped, {} special groups rebound",
            report.created,
            report.adopted,
            report.deleted,
            report.navigated,
            report.windows_created,
            report.windows_deleted,
            report.specials_rebound
        );
    }
    report
}

/// Cold-start pass: recover active time, then reconcile and re-arm focus.
pub fn cold_start(
    model: &mut EngineModel,
    world: &LiveWorld,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let credited = model.active_time.recover(now);
    if credited > 0 {
        log_info!("Recovered {credited}ms of focused time from the previous run");
    }
    let report = reconcile(model, world, now);
    if world.focused_window().is_some() {
        model.active_time.on_focus_gained(now);
    }
    report
}
