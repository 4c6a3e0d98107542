use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{metadata, ordering, placement};
use crate::aging::tab_age_ms;
use crate::archive::ArchiveCoordinator;
use crate::models::{GroupId, TabId, TabStatus, TrackedTab, WindowId, WindowState, Zone};
use crate::naming::{parse, NamingConfig, NamingInput};
use crate::provider::{Browser, WindowView};
use crate::settings::Settings;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Inputs shared by every window in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleContext<'a> {
    pub settings: &'a Settings,
    pub active_total_ms: u64,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub window_id: WindowId,
    pub released: usize,
    pub joined: usize,
    pub special_created: usize,
    pub zone_changes: usize,
    pub archived: usize,
    pub removed: usize,
    pub retire_deferred: usize,
    pub groups_moved: usize,
    pub dissolved: usize,
    pub titles_written: usize,
    pub names_assigned: usize,
    pub writes_aborted: usize,
}

impl WindowReport {
    fn new(window_id: WindowId) -> Self {
        Self {
            window_id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZoneManager {
    naming: NamingConfig,
}

impl ZoneManager {
    pub fn new(naming: NamingConfig) -> Self {
        Self { naming }
    }

    /// Runs every step for one window, in order. Individual provider
    /// failures are logged and left for the next cycle; only a failure to
    /// read the window at all is returned.
    pub async fn run_window<B: Browser + ?Sized>(
        &self,
        browser: &B,
        windows: &mut BTreeMap<WindowId, WindowState>,
        tabs: &mut BTreeMap<TabId, TrackedTab>,
        archive: &mut ArchiveCoordinator,
        window_id: WindowId,
        ctx: CycleContext<'_>,
    ) -> Result<WindowReport> {
        let mut window = windows
            .remove(&window_id)
            .unwrap_or_else(|| WindowState::new(window_id));
        let result = self
            .run_steps(browser, &mut window, tabs, archive, ctx)
            .await;
        windows.insert(window_id, window);
        result
    }

    async fn run_steps<B: Browser + ?Sized>(
        &self,
        browser: &B,
        window: &mut WindowState,
        tabs: &mut BTreeMap<TabId, TrackedTab>,
        archive: &mut ArchiveCoordinator,
        ctx: CycleContext<'_>,
    ) -> Result<WindowReport> {
        let mut report = WindowReport::new(window.id);
        let mut view = load_view(browser, window).await?;

        let plan = placement::plan(&view, window, tabs, ctx.settings.auto_group);
        if !plan.is_empty() {
            placement::apply(browser, &plan, window, tabs, &view, ctx.now, &mut report).await;
            view = load_view(browser, window).await?;
        }

        let aggregated = aggregate_zones(&view, tabs);
        for (group_id, zone) in &aggregated {
            let Some(zone) = zone else {
                continue;
            };
            let previous = window.zones.insert(*group_id, *zone);
            if previous.is_some_and(|previous| previous != *zone) {
                report.zone_changes += 1;
                log_debug!("Group {group_id} moved to the {} zone", zone.as_str());
            }
        }

        let terminal = terminal_tabs(&view, window, tabs, &aggregated);
        if !terminal.is_empty() {
            let outcome = archive
                .retire(browser, tabs, &terminal, &ctx.settings.archive, ctx.now)
                .await;
            report.archived += outcome.archived.len();
            report.removed += outcome.removed.len();
            report.retire_deferred += outcome.deferred.len();
            if !outcome.removed.is_empty() {
                log_info!(
                    "Retired {} gone tabs in window {}",
                    outcome.removed.len(),
                    window.id
                );
                view = load_view(browser, window).await?;
            }
        }

        let desired = ordering::desired_order(&view, &window.zones, window);
        let moves = ordering::plan_moves(&view, &desired);
        for (group_id, index) in &moves {
            match browser.move_group(*group_id, *index).await {
                Ok(()) => report.groups_moved += 1,
                Err(err) => {
                    log_warn!("Failed to move group {group_id} to {index}: {err:#}");
                    break;
                }
            }
        }
        if !moves.is_empty() {
            view = load_view(browser, window).await?;
        }

        if dissolve_degenerate(browser, window, tabs, &view, &mut report).await {
            view = load_view(browser, window).await?;
        }

        self.refresh_metadata(browser, window, tabs, &view, ctx, &mut report)
            .await;

        Ok(report)
    }

    async fn refresh_metadata<B: Browser + ?Sized>(
        &self,
        browser: &B,
        window: &mut WindowState,
        tabs: &BTreeMap<TabId, TrackedTab>,
        view: &WindowView,
        ctx: CycleContext<'_>,
        report: &mut WindowReport,
    ) {
        for group_id in &view.group_order {
            let Some(live) = view.groups.get(group_id) else {
                continue;
            };
            let facts = metadata::GroupFacts {
                zone: window.zones.get(group_id).copied().unwrap_or(Zone::Green),
                special: window.special_stage_of(*group_id),
                age_ms: freshest_age(view.members_of(*group_id), tabs, ctx),
                members: view
                    .members_of(*group_id)
                    .iter()
                    .filter_map(|tab_id| view.tab(*tab_id))
                    .map(|tab| NamingInput::new(tab.title.as_str(), tab.url.as_str()))
                    .collect(),
            };

            let progress = window.naming.entry(*group_id).or_default();
            let Some(planned) = metadata::plan_write(
                live,
                &facts,
                progress,
                ctx.settings,
                &self.naming,
                ctx.now,
            ) else {
                continue;
            };

            match metadata::write(browser, *group_id, &planned).await {
                Ok(metadata::WriteOutcome::Written) => {
                    report.titles_written += 1;
                    progress.last_written_title = Some(planned.title.clone());
                    if let Some(name) = planned.named {
                        log_info!("Named group {group_id} '{name}'");
                        progress.last_auto_named_at = Some(ctx.now);
                        progress.last_candidate = Some(name);
                        progress.first_seen_unnamed_at = None;
                        report.names_assigned += 1;
                    }
                }
                Ok(metadata::WriteOutcome::Aborted) => {
                    log_info!("Group {group_id} was retitled concurrently; skipping update");
                    report.writes_aborted += 1;
                }
                Ok(metadata::WriteOutcome::Vanished) => {}
                Err(err) => log_warn!("Failed to update group {group_id}: {err:#}"),
            }
        }
    }
}

async fn load_view<B: Browser + ?Sized>(browser: &B, window: &mut WindowState) -> Result<WindowView> {
    let view = WindowView::load(browser, window.id).await?;
    let dead: Vec<GroupId> = window
        .special_groups
        .values()
        .map(|special| special.group_id)
        .filter(|group_id| !view.groups.contains_key(group_id))
        .collect();
    for group_id in dead {
        log_debug!("Special group {group_id} is gone; dropping reference");
        window.forget_group(group_id);
    }
    Ok(view)
}

/// Zone of every live group: the freshest status among tracked, non-excluded
/// members. `None` marks a group whose members are all gone.
pub fn aggregate_zones(
    view: &WindowView,
    tabs: &BTreeMap<TabId, TrackedTab>,
) -> BTreeMap<GroupId, Option<Zone>> {
    view.group_order
        .iter()
        .map(|group_id| {
            let statuses: Vec<TabStatus> = view
                .members_of(*group_id)
                .iter()
                .filter_map(|tab_id| tabs.get(tab_id))
                .filter(|tab| !tab.excluded)
                .map(|tab| tab.status)
                .collect();
            let zone = match statuses.iter().min() {
                None => Some(Zone::Green),
                Some(freshest) => freshest.zone(),
            };
            (*group_id, zone)
        })
        .collect()
}

fn terminal_tabs(
    view: &WindowView,
    window: &WindowState,
    tabs: &BTreeMap<TabId, TrackedTab>,
    zones: &BTreeMap<GroupId, Option<Zone>>,
) -> Vec<TabId> {
    view.tabs
        .iter()
        .filter(|live| !live.pinned)
        .filter(|live| {
            tabs.get(&live.id)
                .map(|tab| !tab.excluded && tab.status == TabStatus::Gone)
                .unwrap_or(false)
        })
        .filter(|live| match live.group_id {
            None => true,
            Some(group_id) if window.is_special(group_id) => true,
            Some(group_id) => matches!(zones.get(&group_id), Some(None)),
        })
        .map(|live| live.id)
        .collect()
}

/// Ungroups special groups left with at most one member, unless the user
/// has given them a name of their own.
async fn dissolve_degenerate<B: Browser + ?Sized>(
    browser: &B,
    window: &mut WindowState,
    tabs: &mut BTreeMap<TabId, TrackedTab>,
    view: &WindowView,
    report: &mut WindowReport,
) -> bool {
    let candidates: Vec<(GroupId, Vec<TabId>)> = window
        .special_groups
        .iter()
        .filter_map(|(stage, special)| {
            let live = view.groups.get(&special.group_id)?;
            let members = view.members_of(special.group_id);
            let base = parse(&live.title).base;
            let renamed = !base.is_empty() && base != stage.default_title();
            (members.len() <= 1 && !renamed).then(|| (special.group_id, members.to_vec()))
        })
        .collect();

    let mut changed = false;
    for (group_id, members) in candidates {
        if let Err(err) = browser.ungroup_tabs(&members).await {
            log_warn!("Failed to dissolve special group {group_id}: {err:#}");
            continue;
        }
        for tab_id in &members {
            if let Some(tab) = tabs.get_mut(tab_id) {
                tab.group_id = None;
                tab.in_special_group = false;
            }
        }
        window.forget_group(group_id);
        report.dissolved += 1;
        changed = true;
    }
    changed
}

fn freshest_age(
    members: &[TabId],
    tabs: &BTreeMap<TabId, TrackedTab>,
    ctx: CycleContext<'_>,
) -> Option<u64> {
    members
        .iter()
        .filter_map(|tab_id| tabs.get(tab_id))
        .filter(|tab| !tab.excluded && tab.status != TabStatus::Gone)
        .map(|tab| {
            tab_age_ms(
                tab,
                ctx.settings.time_mode,
                ctx.active_total_ms,
                ctx.now,
            )
        })
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupColor;
    use crate::provider::{LiveGroup, LiveTab};

    fn view_with_group(statuses: &[TabStatus]) -> (WindowView, BTreeMap<TabId, TrackedTab>) {
        let mut live = Vec::new();
        let mut tabs = BTreeMap::new();
        for (index, status) in statuses.iter().enumerate() {
            let id = index as TabId + 1;
            live.push(LiveTab {
                id,
                window_id: 1,
                index,
                group_id: Some(100),
                pinned: false,
                url: String::new(),
                title: String::new(),
            });
            let mut tab = TrackedTab::new(id, 1, "", "", 0, Utc::now());
            tab.status = *status;
            tabs.insert(id, tab);
        }
        let group = LiveGroup {
            id: 100,
            window_id: 1,
            title: String::new(),
            color: GroupColor::Grey,
        };
        (
            WindowView::build(1, live.into_iter(), std::iter::once(group)),
            tabs,
        )
    }

    #[test]
    fn freshest_member_sets_zone() {
        let (view, tabs) = view_with_group(&[TabStatus::Green, TabStatus::Red]);
        assert_eq!(aggregate_zones(&view, &tabs)[&100], Some(Zone::Green));
    }

    #[test]
    fn gone_members_do_not_hold_zone() {
        let (view, tabs) = view_with_group(&[TabStatus::Gone, TabStatus::Red]);
        assert_eq!(aggregate_zones(&view, &tabs)[&100], Some(Zone::Red));

        let (view, tabs) = view_with_group(&[TabStatus::Gone, TabStatus::Gone]);
        assert_eq!(aggregate_zones(&view, &tabs)[&100], None);
        assert_eq!(
            terminal_tabs(&view, &WindowState::new(1), &tabs, &aggregate_zones(&view, &tabs)),
            vec![1, 2]
        );
    }

    #[test]
    fn partly_gone_user_group_keeps_its_tabs() {
        let (view, tabs) = view_with_group(&[TabStatus::Gone, TabStatus::Yellow]);
        let zones = aggregate_zones(&view, &tabs);
        assert!(terminal_tabs(&view, &WindowState::new(1), &tabs, &zones).is_empty());
    }
}
