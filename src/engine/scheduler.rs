use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::controller::{CycleOutcome, Engine};
use crate::provider::Browser;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

fn ticker(period: Duration, first_tick: Instant) -> Interval {
    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_logged<B: Browser + 'static>(engine: &Engine<B>, trigger: &str) {
    match engine.run_cycle_now().await {
        Ok(report) if report.outcome == CycleOutcome::Skipped => {
            log_debug!("{trigger}: cycle skipped, previous one still running");
        }
        Ok(_) => {}
        Err(err) => log_error!("{trigger}: evaluation cycle failed: {err:#}"),
    }
}

/// Runs a cycle on every tick and whenever settings change, until cancelled.
pub async fn scheduler_loop<B: Browser + 'static>(engine: Engine<B>, cancel_token: CancellationToken) {
    let mut settings_rx = engine.settings().subscribe();
    let mut period = Duration::from_secs(engine.settings().current().effective_tick_interval_secs());
    let mut ticks = ticker(period, Instant::now());
    let mut settings_open = true;

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                run_logged(&engine, "tick").await;
            }
            changed = settings_rx.changed(), if settings_open => {
                if changed.is_err() {
                    settings_open = false;
                    continue;
                }
                let next = Duration::from_secs(
                    settings_rx.borrow_and_update().effective_tick_interval_secs(),
                );
                if next != period {
                    log_info!("Tick interval changed to {}s", next.as_secs());
                    period = next;
                    ticks = ticker(period, Instant::now() + period);
                }
                run_logged(&engine, "settings change").await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("scheduler shutting down");
                break;
            }
        }
    }
}

pub struct Scheduler {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start<B: Browser + 'static>(&mut self, engine: Engine<B>) -> Result<()> {
        if self.handle.is_some() {
            bail!("scheduler already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(scheduler_loop(engine, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("scheduler task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::clock::SystemClock;
    use crate::persistence::MemoryStore;
    use crate::provider::MemoryBrowser;
    use crate::settings::{Settings, SettingsStore};

    #[tokio::test]
    async fn runs_first_cycle_immediately_and_stops_on_cancel() {
        let browser = Arc::new(MemoryBrowser::new());
        let window = browser.add_window(true);
        browser.open_tab(window, "https://a.test/", "A").unwrap();
        let store = Arc::new(MemoryStore::new());
        let settings = Arc::new(SettingsStore::in_memory(Settings::default()).unwrap());
        let engine = Engine::new(browser, store.clone(), settings, Arc::new(SystemClock));

        let mut scheduler = Scheduler::new();
        scheduler.start(engine.clone()).unwrap();
        assert!(scheduler.start(engine.clone()).is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop().await.unwrap();

        assert!(!scheduler.is_running());
        assert!(store.last_write().is_some());
        assert_eq!(engine.snapshot().await.tabs.len(), 1);
    }
}
