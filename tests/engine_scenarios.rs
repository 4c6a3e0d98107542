use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tempfile::tempdir;

use tab_aging::clock::ManualClock;
use tab_aging::db::SqliteStore;
use tab_aging::engine::CycleState;
use tab_aging::models::{GroupColor, SpecialStage, WindowId};
use tab_aging::persistence::{KeyValueStore, MemoryStore};
use tab_aging::provider::{GroupProvider, TabProvider};
use tab_aging::{
    BrowserEvent, CycleOutcome, Engine, EventDisposition, MemoryBrowser, Settings,
    SettingsStore, TabStatus, Zone,
};

struct Harness {
    browser: Arc<MemoryBrowser>,
    clock: Arc<ManualClock>,
    engine: Engine<MemoryBrowser>,
    window: WindowId,
}

fn harness_with(settings: Settings, store: Arc<dyn KeyValueStore>) -> Harness {
    let browser = Arc::new(MemoryBrowser::new());
    let window = browser.add_window(true);
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let settings = Arc::new(SettingsStore::in_memory(settings).unwrap());
    let engine = Engine::new(browser.clone(), store, settings, clock.clone());
    Harness {
        browser,
        clock,
        engine,
        window,
    }
}

fn harness(settings: Settings) -> Harness {
    harness_with(settings, Arc::new(MemoryStore::new()))
}

impl Harness {
    fn open(&self, url: &str, title: &str) -> i64 {
        self.browser.open_tab(self.window, url, title).unwrap().id
    }

    async fn user_group(&self, tabs: &[i64], title: &str) -> i64 {
        let group = self.browser.group_tabs(tabs, None).await.unwrap();
        self.browser.rename_group(group, title).unwrap();
        group
    }

    async fn status(&self, tab_id: i64) -> TabStatus {
        self.engine.snapshot().await.tabs[&tab_id].status
    }
}

#[tokio::test]
async fn five_focused_hours_move_tabs_into_aging_group() {
    let h = harness(Settings::default());
    let a = h.open("https://a.test/", "A");
    let b = h.open("https://b.test/", "B");
    h.engine.initialize().await.unwrap();

    h.clock.advance(Duration::hours(5));
    let report = h.engine.run_cycle_now().await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert!(report.persisted);
    assert_eq!(h.status(a).await, TabStatus::Yellow);
    assert_eq!(h.status(b).await, TabStatus::Yellow);

    let group_id = h.browser.tab(a).unwrap().group_id.unwrap();
    assert_eq!(h.browser.tab(b).unwrap().group_id, Some(group_id));
    let group = h.browser.group(group_id).unwrap();
    assert_eq!(group.title, "Aging (5h)");
    assert_eq!(group.color, GroupColor::Yellow);

    let model = h.engine.snapshot().await;
    assert_eq!(
        model.windows[&h.window].special_group(SpecialStage::Yellow),
        Some(group_id)
    );
}

#[tokio::test]
async fn unfocused_time_does_not_age_tabs() {
    let h = harness(Settings::default());
    let a = h.open("https://a.test/", "A");
    h.engine.initialize().await.unwrap();

    h.engine
        .handle_event(BrowserEvent::FocusChanged { window_id: None })
        .await;
    h.clock.advance(Duration::hours(30));
    h.engine.run_cycle_now().await.unwrap();

    assert_eq!(h.status(a).await, TabStatus::Green);
}

#[tokio::test]
async fn group_with_fresh_and_stale_tabs_stays_green() {
    let h = harness(Settings::default());
    let a = h.open("https://a.test/", "A");
    let b = h.open("https://b.test/", "B");
    h.engine.initialize().await.unwrap();
    let group = h.user_group(&[a, b], "Work").await;

    h.clock.advance(Duration::hours(9));
    h.browser.navigate(a, "https://a.test/next", "A next").unwrap();
    let disposition = h
        .engine
        .handle_event(BrowserEvent::TabNavigated {
            tab_id: a,
            url: "https://a.test/next".into(),
            title: "A next".into(),
        })
        .await;
    assert_eq!(disposition, EventDisposition::Applied);

    h.engine.run_cycle_now().await.unwrap();

    assert_eq!(h.status(a).await, TabStatus::Green);
    assert_eq!(h.status(b).await, TabStatus::Red);
    let live = h.browser.group(group).unwrap();
    assert_eq!(live.color, GroupColor::Green);
    assert_eq!(live.title, "Work (0m)");
    assert_eq!(h.browser.tab(b).unwrap().group_id, Some(group));
    assert_eq!(
        h.engine.snapshot().await.windows[&h.window].zones[&group],
        Zone::Green
    );
}

#[tokio::test]
async fn annotation_only_group_is_named_after_delay() {
    let h = harness(Settings::default());
    let a = h.open("https://blog.test/borrow", "Rust borrow checker");
    let b = h.open("https://docs.test/async", "Rust async book");
    h.engine.initialize().await.unwrap();
    let group = h.user_group(&[a, b], "(23m)").await;

    h.clock.advance(Duration::minutes(2));
    let first = h.engine.run_cycle_now().await.unwrap();
    assert_eq!(first.windows[0].names_assigned, 0);
    assert_eq!(h.browser.group(group).unwrap().title, "(2m)");

    h.clock.advance(Duration::minutes(2));
    let second = h.engine.run_cycle_now().await.unwrap();
    assert_eq!(second.windows[0].names_assigned, 1);
    assert_eq!(h.browser.group(group).unwrap().title, "Rust (4m)");

    let model = h.engine.snapshot().await;
    let progress = &model.windows[&h.window].naming[&group];
    assert_eq!(progress.last_candidate.as_deref(), Some("Rust"));
    assert_eq!(progress.last_written_title.as_deref(), Some("Rust (4m)"));
}

#[tokio::test]
async fn user_rename_during_cycle_aborts_title_write() {
    let h = harness(Settings::default());
    let a = h.open("https://blog.test/borrow", "Rust borrow checker");
    let b = h.open("https://docs.test/async", "Rust async book");
    h.engine.initialize().await.unwrap();
    let group = h.user_group(&[a, b], "").await;

    h.clock.advance(Duration::minutes(2));
    h.engine.run_cycle_now().await.unwrap();

    h.clock.advance(Duration::minutes(2));
    h.browser.rename_group_on_next_read(group, "My Reading");
    let report = h.engine.run_cycle_now().await.unwrap();

    assert_eq!(report.windows[0].writes_aborted, 1);
    assert_eq!(report.windows[0].names_assigned, 0);
    assert_eq!(h.browser.group(group).unwrap().title, "My Reading");
}

#[tokio::test]
async fn user_retitle_event_locks_naming() {
    let h = harness(Settings::default());
    let a = h.open("https://blog.test/borrow", "Rust borrow checker");
    let b = h.open("https://docs.test/async", "Rust async book");
    h.engine.initialize().await.unwrap();
    let group = h.user_group(&[a, b], "").await;

    h.clock.advance(Duration::minutes(2));
    h.engine.run_cycle_now().await.unwrap();

    // A hand-typed annotation is still unnamed, but naming waits out the lock.
    h.browser.rename_group(group, "(7m)").unwrap();
    h.engine
        .handle_event(BrowserEvent::GroupUpdated {
            group_id: group,
            window_id: h.window,
            title: "(7m)".into(),
        })
        .await;
    h.clock.advance(Duration::seconds(10));
    let locked = h.engine.run_cycle_now().await.unwrap();
    assert_eq!(locked.windows[0].names_assigned, 0);

    h.clock.advance(Duration::minutes(1));
    let unlocked = h.engine.run_cycle_now().await.unwrap();
    assert_eq!(unlocked.windows[0].names_assigned, 1);
}

#[tokio::test]
async fn disabled_gone_stage_caps_at_red() {
    let mut settings = Settings::default();
    settings.stages.gone = false;
    let h = harness(settings);
    let a = h.open("https://a.test/", "A");
    let b = h.open("https://b.test/", "B");
    h.engine.initialize().await.unwrap();

    h.clock.advance(Duration::hours(30));
    let report = h.engine.run_cycle_now().await.unwrap();

    assert_eq!(report.removed(), 0);
    assert_eq!(h.status(a).await, TabStatus::Red);
    assert_eq!(h.status(b).await, TabStatus::Red);
    assert!(h.browser.tab(a).is_some());
    let group = h.browser.tab(a).unwrap().group_id.unwrap();
    assert_eq!(h.browser.group(group).unwrap().color, GroupColor::Red);
    assert!(h.browser.archived("Gone Tabs").is_empty());
}

#[tokio::test]
async fn gone_tab_is_archived_then_closed() {
    let h = harness(Settings::default());
    let old = h.open("https://old.test/article", "Old article");
    h.engine.initialize().await.unwrap();

    h.clock.advance(Duration::hours(25));
    let fresh = h.open("https://fresh.test/", "Fresh");
    let report = h.engine.run_cycle_now().await.unwrap();

    assert_eq!(report.removed(), 1);
    assert!(h.browser.tab(old).is_none());
    assert!(h.browser.tab(fresh).is_some());
    let archived = h.browser.archived("Gone Tabs");
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].url, "https://old.test/article");
    assert_eq!(archived[0].title, "Old article");

    let model = h.engine.snapshot().await;
    assert!(!model.tabs.contains_key(&old));
    assert_eq!(model.tabs[&fresh].status, TabStatus::Green);
}

#[tokio::test]
async fn failed_archive_keeps_tab_for_next_cycle() {
    let h = harness(Settings::default());
    let old = h.open("https://old.test/", "Old");
    h.engine.initialize().await.unwrap();

    h.clock.advance(Duration::hours(25));
    h.browser.fail_next_archive_adds(1);
    let first = h.engine.run_cycle_now().await.unwrap();
    assert_eq!(first.removed(), 0);
    assert!(h.browser.tab(old).is_some());
    assert_eq!(h.status(old).await, TabStatus::Gone);

    h.clock.advance(Duration::minutes(1));
    let second = h.engine.run_cycle_now().await.unwrap();
    assert_eq!(second.removed(), 1);
    assert_eq!(h.browser.archived("Gone Tabs").len(), 1);
}

#[tokio::test]
async fn older_groups_are_ordered_right_and_sorting_is_idempotent() {
    let h = harness(Settings::default());
    let a = h.open("https://a.test/", "A");
    let b = h.open("https://b.test/", "B");
    h.engine.initialize().await.unwrap();
    h.user_group(&[a, b], "Old").await;

    h.clock.advance(Duration::hours(9));
    let c = h.open("https://c.test/", "C");
    let d = h.open("https://d.test/", "D");
    h.user_group(&[c, d], "New").await;

    h.engine.run_cycle_now().await.unwrap();
    let order: Vec<i64> = h.browser.snapshot().tabs.iter().map(|tab| tab.id).collect();
    assert_eq!(order, vec![c, d, a, b]);

    let moves = h.browser.calls().group_moves;
    h.clock.advance(Duration::minutes(1));
    h.engine.run_cycle_now().await.unwrap();
    assert_eq!(h.browser.calls().group_moves, moves);
}

#[tokio::test]
async fn navigation_releases_tab_and_lone_special_group_dissolves() {
    let h = harness(Settings::default());
    let a = h.open("https://a.test/", "A");
    let b = h.open("https://b.test/", "B");
    h.engine.initialize().await.unwrap();
    h.clock.advance(Duration::hours(5));
    h.engine.run_cycle_now().await.unwrap();
    assert!(h.browser.tab(a).unwrap().group_id.is_some());

    h.browser.navigate(a, "https://a.test/new", "A new").unwrap();
    h.engine
        .handle_event(BrowserEvent::TabNavigated {
            tab_id: a,
            url: "https://a.test/new".into(),
            title: "A new".into(),
        })
        .await;
    assert_eq!(h.browser.tab(a).unwrap().group_id, None);
    assert_eq!(h.status(a).await, TabStatus::Green);

    h.clock.advance(Duration::minutes(1));
    let report = h.engine.run_cycle_now().await.unwrap();
    assert_eq!(report.windows[0].dissolved, 1);
    assert_eq!(h.browser.tab(b).unwrap().group_id, None);
    assert!(h.browser.list_groups().await.unwrap().is_empty());
    let model = h.engine.snapshot().await;
    assert!(model.windows[&h.window].special_groups.is_empty());
}

#[tokio::test]
async fn repeated_navigation_is_debounced() {
    let h = harness(Settings::default());
    let a = h.open("https://a.test/", "A");
    h.engine.initialize().await.unwrap();

    let navigated = |url: &str| BrowserEvent::TabNavigated {
        tab_id: a,
        url: url.to_string(),
        title: "A".into(),
    };
    assert_eq!(
        h.engine.handle_event(navigated("https://a.test/1")).await,
        EventDisposition::Applied
    );
    assert_eq!(
        h.engine.handle_event(navigated("https://a.test/2")).await,
        EventDisposition::Debounced
    );
    h.clock.advance(Duration::seconds(2));
    assert_eq!(
        h.engine.handle_event(navigated("https://a.test/3")).await,
        EventDisposition::Applied
    );
}

#[tokio::test]
async fn concurrent_trigger_is_skipped_while_cycle_runs() {
    let h = harness(Settings::default());
    h.open("https://a.test/", "A");
    h.engine.initialize().await.unwrap();
    h.browser.stall_listing(Some(StdDuration::from_millis(200)));

    let (first, second) = tokio::join!(h.engine.run_cycle_now(), h.engine.run_cycle_now());

    assert_eq!(first.unwrap().outcome, CycleOutcome::Completed);
    assert_eq!(second.unwrap().outcome, CycleOutcome::Skipped);
    assert_eq!(h.engine.cycle_state().await, CycleState::Idle);
}

#[tokio::test]
async fn stuck_cycle_is_abandoned_and_guard_cleared() {
    let h = harness(Settings::default());
    h.open("https://a.test/", "A");
    h.engine.initialize().await.unwrap();
    let engine = h.engine.clone().with_cycle_timeout(StdDuration::from_millis(100));
    h.browser.stall_listing(Some(StdDuration::from_millis(500)));

    let report = engine.run_cycle_now().await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::Abandoned);
    assert_eq!(engine.cycle_state().await, CycleState::Idle);

    h.browser.stall_listing(None);
    let next = engine.run_cycle_now().await.unwrap();
    assert_eq!(next.outcome, CycleOutcome::Completed);
}

#[tokio::test]
async fn events_during_cycle_are_deferred_then_applied() {
    let h = harness(Settings::default());
    h.open("https://a.test/", "A");
    h.engine.initialize().await.unwrap();
    h.browser.stall_listing(Some(StdDuration::from_millis(200)));

    let late_event = async {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        h.engine
            .handle_event(BrowserEvent::FocusChanged { window_id: None })
            .await
    };
    let (report, disposition) = tokio::join!(h.engine.run_cycle_now(), late_event);

    assert_eq!(disposition, EventDisposition::Deferred);
    assert_eq!(report.unwrap().deferred_applied, 1);
    assert!(!h.engine.snapshot().await.active_time.is_focused());
}

#[tokio::test]
async fn state_survives_restart_with_renumbered_tabs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.sqlite");

    let browser = Arc::new(MemoryBrowser::new());
    let window = browser.add_window(true);
    let a = browser.open_tab(window, "https://a.test/", "A").unwrap().id;
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let settings = Arc::new(SettingsStore::in_memory(Settings::default()).unwrap());

    {
        let store = Arc::new(SqliteStore::open(path.clone()).unwrap());
        let engine = Engine::new(browser.clone(), store, settings.clone(), clock.clone());
        engine.initialize().await.unwrap();
        clock.advance(Duration::hours(5));
        let report = engine.run_cycle_now().await.unwrap();
        assert!(report.persisted);
    }

    let renumbered = browser.reassign_tab_id(a).unwrap();
    let store = Arc::new(SqliteStore::open(path).unwrap());
    let engine = Engine::new(browser.clone(), store, settings, clock.clone());
    let reconciled = engine.initialize().await.unwrap();
    assert_eq!(reconciled.adopted, 1);

    engine.run_cycle_now().await.unwrap();
    let model = engine.snapshot().await;
    assert_eq!(model.tabs[&renumbered].status, TabStatus::Yellow);
    assert!(!model.tabs.contains_key(&a));
}

#[tokio::test]
async fn pinned_tabs_never_age() {
    let h = harness(Settings::default());
    let pinned = h.open("https://mail.test/", "Mail");
    h.browser.set_pinned(pinned, true).unwrap();
    h.engine.initialize().await.unwrap();

    h.clock.advance(Duration::hours(48));
    h.engine.run_cycle_now().await.unwrap();

    assert_eq!(h.status(pinned).await, TabStatus::Green);
    assert!(h.browser.tab(pinned).is_some());
}

#[tokio::test]
async fn lowering_thresholds_takes_effect_next_cycle() {
    let h = harness(Settings::default());
    let a = h.open("https://a.test/", "A");
    h.engine.initialize().await.unwrap();

    h.clock.advance(Duration::hours(2));
    h.engine.run_cycle_now().await.unwrap();
    assert_eq!(h.status(a).await, TabStatus::Green);

    let mut settings = Settings::default();
    settings.thresholds.yellow_after_ms = 60 * 60 * 1000;
    h.engine.settings().update(settings).unwrap();
    h.engine.run_cycle_now().await.unwrap();
    assert_eq!(h.status(a).await, TabStatus::Yellow);
}

#[tokio::test]
async fn special_group_survives_restart_that_renumbers_everything() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let h = harness_with(Settings::default(), store.clone());
    let a = h.open("https://a.test/", "A");
    h.open("https://b.test/", "B");
    h.engine.initialize().await.unwrap();
    h.clock.advance(Duration::hours(5));
    h.engine.run_cycle_now().await.unwrap();
    let marker = h.engine.snapshot().await.windows[&h.window].special_groups
        [&SpecialStage::Yellow]
        .marker;

    let mut world = h.browser.snapshot();
    for window in &mut world.windows {
        window.id += 500;
    }
    for group in &mut world.groups {
        group.id += 1000;
        group.window_id += 500;
    }
    for tab in &mut world.tabs {
        tab.id += 2000;
        tab.window_id += 500;
        tab.group_id = tab.group_id.map(|id| id + 1000);
    }
    let browser = Arc::new(MemoryBrowser::from_snapshot(world).unwrap());
    let settings = Arc::new(SettingsStore::in_memory(Settings::default()).unwrap());
    let engine = Engine::new(browser.clone(), store, settings, h.clock.clone());

    let reconciled = engine.initialize().await.unwrap();
    assert_eq!(reconciled.specials_rebound, 1);

    let window = h.window + 500;
    let renamed_a = a + 2000;
    let group = browser.tab(renamed_a).unwrap().group_id.unwrap();
    let model = engine.snapshot().await;
    let special = &model.windows[&window].special_groups[&SpecialStage::Yellow];
    assert_eq!(special.group_id, group);
    assert_eq!(special.marker, marker);

    browser.navigate(renamed_a, "https://a.test/new", "A new").unwrap();
    engine
        .handle_event(BrowserEvent::TabNavigated {
            tab_id: renamed_a,
            url: "https://a.test/new".into(),
            title: "A new".into(),
        })
        .await;
    assert_eq!(browser.tab(renamed_a).unwrap().group_id, None);

    h.clock.advance(Duration::minutes(1));
    let report = engine.run_cycle_now().await.unwrap();
    assert_eq!(report.windows[0].special_created, 0);
}
