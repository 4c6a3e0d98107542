//! Step 1: moving aging tabs in and out of the per-stage special groups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{WindowReport, MIN_SPECIAL_GROUP_SIZE};
use crate::models::{
    NamingProgress, SpecialGroupRef, SpecialStage, TabId, TabStatus, TrackedTab, WindowState,
};
use crate::naming::compose;
use crate::provider::{Browser, GroupUpdate, WindowView};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    /// Tabs in a special group that are fresh again.
    pub release: Vec<TabId>,
    pub join: BTreeMap<SpecialStage, Vec<TabId>>,
}

impl PlacementPlan {
    pub fn is_empty(&self) -> bool {
        self.release.is_empty() && self.join.is_empty()
    }
}

pub fn plan(
    view: &WindowView,
    window: &WindowState,
    tabs: &BTreeMap<TabId, TrackedTab>,
    auto_group: bool,
) -> PlacementPlan {
    let mut plan = PlacementPlan::default();

    for live in view.tabs.iter().filter(|tab| !tab.pinned) {
        let Some(tracked) = tabs.get(&live.id) else {
            continue;
        };
        if tracked.excluded {
            continue;
        }
        let current_stage = live.group_id.and_then(|group_id| window.special_stage_of(group_id));
        let is_user_grouped = live.group_id.is_some() && current_stage.is_none();
        if is_user_grouped {
            continue;
        }

        match (tracked.status, current_stage) {
            (TabStatus::Green, Some(_)) => plan.release.push(live.id),
            (status, current) => {
                let Some(target) = status.special_stage() else {
                    continue;
                };
                if auto_group && current != Some(target) {
                    plan.join.entry(target).or_default().push(live.id);
                }
            }
        }
    }

    // A new special group needs company; a lone tab waits where it is.
    plan.join.retain(|stage, members| {
        let live_group = window
            .special_group(*stage)
            .filter(|group_id| view.groups.contains_key(group_id));
        live_group.is_some() || members.len() >= MIN_SPECIAL_GROUP_SIZE
    });

    plan
}

pub async fn apply<B: Browser + ?Sized>(
    browser: &B,
    plan: &PlacementPlan,
    window: &mut WindowState,
    tabs: &mut BTreeMap<TabId, TrackedTab>,
    view: &WindowView,
    now: DateTime<Utc>,
    report: &mut WindowReport,
) {
    if !plan.release.is_empty() {
        match browser.ungroup_tabs(&plan.release).await {
            Ok(()) => {
                for tab_id in &plan.release {
                    if let Some(tab) = tabs.get_mut(tab_id) {
                        tab.group_id = None;
                        tab.in_special_group = false;
                    }
                }
                report.released += plan.release.len();
            }
            Err(err) => log_warn!(
                "Failed to release {} tabs from special groups in window {}: {err:#}",
                plan.release.len(),
                window.id
            ),
        }
    }

    for (stage, members) in &plan.join {
        let existing = window
            .special_group(*stage)
            .filter(|group_id| view.groups.contains_key(group_id));

        let group_id = match browser.group_tabs(members, existing).await {
            Ok(group_id) => group_id,
            Err(err) => {
                log_warn!(
                    "Failed to move {} tabs into the {} group: {err:#}",
                    members.len(),
                    stage.default_title()
                );
                continue;
            }
        };

        if existing.is_none() {
            let title = compose(stage.default_title(), None);
            let update = GroupUpdate {
                title: Some(title.clone()),
                color: Some(stage.zone().color()),
            };
            if let Err(err) = browser.update_group(group_id, update).await {
                log_warn!("Failed to label new special group {group_id}: {err:#}");
            }
            window.special_groups.insert(
                *stage,
                SpecialGroupRef {
                    group_id,
                    marker: Uuid::new_v4(),
                    created_at: now,
                },
            );
            window.naming.insert(
                group_id,
                NamingProgress {
                    last_written_title: Some(title),
                    ..NamingProgress::default()
                },
            );
            report.special_created += 1;
            log_info!(
                "Created {} group {group_id} in window {}",
                stage.default_title(),
                window.id
            );
        }

        for tab_id in members {
            if let Some(tab) = tabs.get_mut(tab_id) {
                tab.group_id = Some(group_id);
                tab.in_special_group = true;
            }
        }
        report.joined += members.len();
        log_debug!("Moved {} tabs into group {group_id}", members.len());
    }
}
