use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::cycle::{transition, CycleEvent, CycleState, Transition};
use super::events::{apply_event, Debouncer, EventEffect, NAVIGATION_DEBOUNCE};
use crate::aging::{evaluate, tab_age_ms};
use crate::archive::ArchiveCoordinator;
use crate::clock::Clock;
use crate::models::{EngineModel, TabStatus};
use crate::naming::NamingConfig;
use crate::persistence::{load_model, save_model, KeyValueStore};
use crate::provider::{Browser, BrowserEvent, LiveWorld};
use crate::reconcile::{cold_start, reconcile, ReconcileReport};
use crate::settings::{Settings, SettingsStore};
use crate::zones::{CycleContext, WindowReport, ZoneManager};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const CYCLE_TIMEOUT: Duration = Duration::from_secs(45);
const EVENT_ACTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleOutcome {
    #[default]
    Completed,
    /// Another cycle or an event handler held the guard.
    Skipped,
    /// Ran past its time limit; the working copy was discarded.
    Abandoned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle_id: Option<u64>,
    pub outcome: CycleOutcome,
    pub reconcile: ReconcileReport,
    pub status_changes: usize,
    pub windows: Vec<WindowReport>,
    pub deferred_applied: usize,
    pub persisted: bool,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            outcome: CycleOutcome::Skipped,
            ..Self::default()
        }
    }

    fn abandoned(cycle_id: u64) -> Self {
        Self {
            cycle_id: Some(cycle_id),
            outcome: CycleOutcome::Abandoned,
            ..Self::default()
        }
    }

    pub fn removed(&self) -> usize {
        self.windows.iter().map(|window| window.removed).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Applied,
    /// Queued until the running cycle or handler finishes.
    Deferred,
    Debounced,
}

/// Guard flags and the deferred queue share one lock so that checking the
/// guard and queueing behind it cannot interleave with a release.
#[derive(Debug)]
struct Coordination {
    cycle: CycleState,
    placement_in_progress: bool,
    deferred: VecDeque<BrowserEvent>,
    debounce: Debouncer,
    next_cycle_id: u64,
}

/// Owns the engine model and runs evaluation cycles against a browser.
pub struct Engine<B: Browser + 'static> {
    browser: Arc<B>,
    store: Arc<dyn KeyValueStore>,
    settings: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    model: Arc<Mutex<EngineModel>>,
    coordination: Arc<Mutex<Coordination>>,
    archive: Arc<Mutex<ArchiveCoordinator>>,
    zones: ZoneManager,
    cycle_timeout: Duration,
}

impl<B: Browser + 'static> Clone for Engine<B> {
    fn clone(&self) -> Self {
        Self {
            browser: Arc::clone(&self.browser),
            store: Arc::clone(&self.store),
            settings: Arc::clone(&self.settings),
            clock: Arc::clone(&self.clock),
            model: Arc::clone(&self.model),
            coordination: Arc::clone(&self.coordination),
            archive: Arc::clone(&self.archive),
            zones: self.zones.clone(),
            cycle_timeout: self.cycle_timeout,
        }
    }
}

impl<B: Browser + 'static> Engine<B> {
    pub fn new(
        browser: Arc<B>,
        store: Arc<dyn KeyValueStore>,
        settings: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            browser,
            store,
            settings,
            clock,
            model: Arc::new(Mutex::new(EngineModel::default())),
            coordination: Arc::new(Mutex::new(Coordination {
                cycle: CycleState::Idle,
                placement_in_progress: false,
                deferred: VecDeque::new(),
                debounce: Debouncer::new(NAVIGATION_DEBOUNCE),
                next_cycle_id: 0,
            })),
            archive: Arc::new(Mutex::new(ArchiveCoordinator::new())),
            zones: ZoneManager::default(),
            cycle_timeout: CYCLE_TIMEOUT,
        }
    }

    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    pub fn with_naming_config(mut self, config: NamingConfig) -> Self {
        self.zones = ZoneManager::new(config);
        self
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn browser(&self) -> &Arc<B> {
        &self.browser
    }

    pub async fn snapshot(&self) -> EngineModel {
        self.model.lock().await.clone()
    }

    pub async fn cycle_state(&self) -> CycleState {
        self.coordination.lock().await.cycle
    }

    /// Cold start: load persisted state, recover active time, reconcile with
    /// the live browser and persist the result.
    pub async fn initialize(&self) -> Result<ReconcileReport> {
        let loaded = match load_model(self.store.as_ref()).await {
            Ok(loaded) => loaded.model,
            Err(err) => {
                log_warn!("Failed to read persisted state, starting empty: {err:#}");
                EngineModel::default()
            }
        };
        let world = LiveWorld::capture(self.browser.as_ref()).await?;
        let now = self.clock.now();

        let mut model = self.model.lock().await;
        *model = loaded;
        let report = cold_start(&mut model, &world, now);
        model.active_time.mark_persisted(now);
        if let Err(err) = save_model(self.store.as_ref(), &model).await {
            log_warn!("Failed to persist state after cold start: {err:#}");
        }
        log_info!(
            "Engine initialized with {} tabs in {} windows",
            model.tabs.len(),
            model.windows.len()
        );
        Ok(report)
    }

    /// Runs one evaluation cycle unless one is already in flight.
    pub async fn run_cycle_now(&self) -> Result<CycleReport> {
        let Some(cycle_id) = self.try_begin_cycle().await else {
            log_debug!("Cycle skipped; guard is held");
            return Ok(CycleReport::skipped());
        };

        match tokio::time::timeout(self.cycle_timeout, self.execute_cycle(cycle_id)).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(err)) => {
                log_warn!("Cycle {cycle_id} failed: {err:#}");
                self.release_guard(cycle_id, CycleEvent::Finish { cycle_id })
                    .await;
                Err(err)
            }
            Err(_) => {
                log_warn!(
                    "Cycle {cycle_id} exceeded {}s and was abandoned",
                    self.cycle_timeout.as_secs_f32()
                );
                self.release_guard(cycle_id, CycleEvent::Expire { cycle_id })
                    .await;
                Ok(CycleReport::abandoned(cycle_id))
            }
        }
    }

    async fn try_begin_cycle(&self) -> Option<u64> {
        let now = self.clock.now();
        let timeout = chrono::Duration::from_std(self.cycle_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(CYCLE_TIMEOUT.as_secs() as i64));

        let mut coord = self.coordination.lock().await;
        if coord.placement_in_progress {
            return None;
        }
        let cycle_id = coord.next_cycle_id + 1;
        let begin = CycleEvent::Begin {
            cycle_id,
            now,
            timeout,
        };

        let (mut state, mut result) = transition(coord.cycle, begin);
        if let Transition::Expired { stale_id } = result {
            log_warn!("Cycle {stale_id} held the guard past its time limit; clearing it");
            (state, result) = transition(state, begin);
        }
        coord.cycle = state;
        match result {
            Transition::Started => {
                coord.next_cycle_id = cycle_id;
                Some(cycle_id)
            }
            _ => None,
        }
    }

    async fn execute_cycle(&self, cycle_id: u64) -> Result<CycleReport> {
        let settings = self.settings.current();
        let world = LiveWorld::capture(self.browser.as_ref()).await?;
        let now = self.clock.now();

        let mut working = self.model.lock().await.clone();
        working.active_time.tick(now);
        let reconcile_report = reconcile(&mut working, &world, now);
        let active_total_ms = working.active_time.total_ms;
        let status_changes = evaluate_statuses(&mut working, &settings, active_total_ms, now);

        let ctx = CycleContext {
            settings: &settings,
            active_total_ms,
            now,
        };
        let mut windows = Vec::with_capacity(world.windows.len());
        {
            let mut archive = self.archive.lock().await;
            archive.begin_cycle();
            for window in &world.windows {
                let result = self
                    .zones
                    .run_window(
                        self.browser.as_ref(),
                        &mut working.windows,
                        &mut working.tabs,
                        &mut archive,
                        window.id,
                        ctx,
                    )
                    .await;
                match result {
                    Ok(report) => windows.push(report),
                    Err(err) => log_warn!("Window {} skipped this cycle: {err:#}", window.id),
                }
            }
        }

        let mut report = CycleReport {
            cycle_id: Some(cycle_id),
            outcome: CycleOutcome::Completed,
            reconcile: reconcile_report,
            status_changes,
            windows,
            deferred_applied: 0,
            persisted: false,
        };

        let mut model = self.model.lock().await;
        {
            let mut coord = self.coordination.lock().await;
            if coord.cycle.running_id() != Some(cycle_id) {
                log_warn!("Cycle {cycle_id} lost the guard before commit; discarding its changes");
                report.outcome = CycleOutcome::Abandoned;
                return Ok(report);
            }
            let (state, _) = transition(coord.cycle, CycleEvent::Finish { cycle_id });
            coord.cycle = state;
            coord.placement_in_progress = true;
            coord
                .debounce
                .retain_live(|tab_id| working.tabs.contains_key(&tab_id));
        }

        *model = working;
        report.deferred_applied = self.drain_deferred(&mut model).await;

        let persisted_at = self.clock.now();
        model.active_time.tick(persisted_at);
        model.active_time.mark_persisted(persisted_at);
        match save_model(self.store.as_ref(), &model).await {
            Ok(()) => report.persisted = true,
            Err(err) => log_warn!("Failed to persist cycle {cycle_id}: {err:#}"),
        }

        log_info!(
            "Cycle {cycle_id} done: {} status changes, {} tabs retired, {} deferred events",
            report.status_changes,
            report.removed(),
            report.deferred_applied
        );
        Ok(report)
    }

    /// Returns the guard after a failed or abandoned cycle and applies
    /// whatever queued up behind it.
    async fn release_guard(&self, cycle_id: u64, event: CycleEvent) {
        let mut model = self.model.lock().await;
        {
            let mut coord = self.coordination.lock().await;
            let (state, _) = transition(coord.cycle, event);
            let (state, _) = match state {
                CycleState::TimedOut { .. } => transition(state, CycleEvent::Clear),
                other => (other, Transition::Ignored),
            };
            coord.cycle = state;
            coord.placement_in_progress = true;
        }
        let applied = self.drain_deferred(&mut model).await;
        if applied > 0 {
            log_debug!("Applied {applied} events deferred behind cycle {cycle_id}");
        }
    }

    /// Applies queued events until the queue is empty, then releases the
    /// placement flag. Callers must have set the flag.
    async fn drain_deferred(&self, model: &mut EngineModel) -> usize {
        let mut applied = 0;
        loop {
            let batch: Vec<BrowserEvent> = {
                let mut coord = self.coordination.lock().await;
                if coord.deferred.is_empty() {
                    coord.placement_in_progress = false;
                    break;
                }
                coord.deferred.drain(..).collect()
            };
            let now = self.clock.now();
            for event in &batch {
                // Special-group release is left to the next cycle's placement step.
                apply_event(model, event, now);
                applied += 1;
            }
        }
        applied
    }

    /// Applies a browser event, or queues it while a cycle or another event
    /// handler is mid-flight.
    pub async fn handle_event(&self, event: BrowserEvent) -> EventDisposition {
        let now = self.clock.now();
        {
            let mut coord = self.coordination.lock().await;
            match &event {
                BrowserEvent::TabNavigated { tab_id, .. } => {
                    if !coord.debounce.admit(*tab_id, now) {
                        return EventDisposition::Debounced;
                    }
                }
                BrowserEvent::TabRemoved { tab_id } => coord.debounce.forget(*tab_id),
                _ => {}
            }
            if coord.cycle.is_running() || coord.placement_in_progress {
                log_debug!("Deferring {} event", event.kind());
                coord.deferred.push_back(event);
                return EventDisposition::Deferred;
            }
            coord.placement_in_progress = true;
        }

        self.apply_now(&event, now).await;

        let mut model = self.model.lock().await;
        self.drain_deferred(&mut model).await;
        EventDisposition::Applied
    }

    async fn apply_now(&self, event: &BrowserEvent, now: DateTime<Utc>) {
        let effect = {
            let mut model = self.model.lock().await;
            apply_event(&mut model, event, now)
        };

        let EventEffect::ReleaseFromSpecial { tab_id, group_id } = effect else {
            return;
        };
        let released = [tab_id];
        let release = self.browser.ungroup_tabs(&released);
        match tokio::time::timeout(EVENT_ACTION_TIMEOUT, release).await {
            Ok(Ok(())) => {
                let mut model = self.model.lock().await;
                if let Some(tab) = model.tabs.get_mut(&tab_id) {
                    tab.group_id = None;
                    tab.in_special_group = false;
                }
                log_debug!("Released tab {tab_id} from special group {group_id}");
            }
            Ok(Err(err)) => {
                log_warn!("Failed to release tab {tab_id} from group {group_id}: {err:#}")
            }
            Err(_) => log_warn!("Releasing tab {tab_id} from group {group_id} timed out"),
        }
    }
}

/// Re-derives every tab's status from its age. Returns how many changed.
pub fn evaluate_statuses(
    model: &mut EngineModel,
    settings: &Settings,
    active_total_ms: u64,
    now: DateTime<Utc>,
) -> usize {
    let mut changed = 0;
    for tab in model.tabs.values_mut() {
        let status = if tab.excluded {
            TabStatus::Green
        } else {
            let age_ms = tab_age_ms(tab, settings.time_mode, active_total_ms, now);
            evaluate(age_ms, &settings.thresholds, &settings.stages)
        };
        if status != tab.status {
            log_debug!(
                "Tab {} {} -> {}",
                tab.id,
                tab.status.as_str(),
                status.as_str()
            );
            tab.status = status;
            changed += 1;
        }
    }
    changed
}
