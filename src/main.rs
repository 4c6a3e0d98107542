use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use tab_aging::clock::ManualClock;
use tab_aging::db::SqliteStore;
use tab_aging::persistence::{KeyValueStore, MemoryStore};
use tab_aging::provider::WorldSnapshot;
use tab_aging::utils::logging;
use tab_aging::{Engine, MemoryBrowser, SettingsStore};

#[derive(Parser)]
#[command(name = "tab-aging", version, about = "Tab aging engine tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay evaluation cycles against a recorded browser world.
    Replay {
        /// JSON world snapshot (windows, tabs, groups).
        #[arg(long)]
        world: PathBuf,
        /// Settings JSON file. Created with defaults if missing.
        #[arg(long)]
        settings: Option<PathBuf>,
        /// SQLite file for engine state; kept in memory when omitted.
        #[arg(long)]
        state: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        cycles: u32,
        /// Simulated minutes between cycles.
        #[arg(long, default_value_t = 60)]
        step_mins: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            world,
            settings,
            state,
            cycles,
            step_mins,
        } => replay(world, settings, state, cycles, step_mins).await,
    }
}

async fn replay(
    world: PathBuf,
    settings: Option<PathBuf>,
    state: Option<PathBuf>,
    cycles: u32,
    step_mins: i64,
) -> Result<()> {
    let raw = std::fs::read_to_string(&world)
        .with_context(|| format!("failed to read world snapshot {}", world.display()))?;
    let snapshot: WorldSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("invalid world snapshot {}", world.display()))?;
    let browser = Arc::new(MemoryBrowser::from_snapshot(snapshot)?);

    let settings = match settings {
        Some(path) => SettingsStore::new(path)?,
        None => SettingsStore::in_memory(Default::default())?,
    };
    let store: Arc<dyn KeyValueStore> = match state {
        Some(path) => Arc::new(SqliteStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let engine = Engine::new(browser.clone(), store, Arc::new(settings), clock.clone());
    let reconciled = engine.initialize().await?;
    log::info!(
        "Cold start: {} tabs tracked ({} new, {} restored)",
        reconciled.created + reconciled.retained + reconciled.adopted,
        reconciled.created,
        reconciled.retained + reconciled.adopted
    );

    for _ in 0..cycles {
        clock.advance(Duration::minutes(step_mins));
        let report = engine.run_cycle_now().await?;
        log::info!(
            "Cycle {:?}: {:?}, {} status changes, {} retired",
            report.cycle_id,
            report.outcome,
            report.status_changes,
            report.removed()
        );
    }

    println!("{}", serde_json::to_string_pretty(&browser.snapshot())?);
    Ok(())
}
