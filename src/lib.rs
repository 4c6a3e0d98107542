//! Tab aging engine: tracks how long tabs go unused, groups aging tabs,
//! keeps groups in age order with readable names, and archives tabs that
//! have gone stale.
//!
//! The browser is reached only through the traits in [`provider`]; state is
//! persisted through [`persistence::KeyValueStore`].

pub mod active_time;
pub mod aging;
pub mod archive;
pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod naming;
pub mod persistence;
pub mod provider;
pub mod reconcile;
pub mod settings;
pub mod utils;
pub mod zones;

pub use engine::{CycleOutcome, CycleReport, Engine, EventDisposition, Scheduler};
pub use error::ValidationError;
pub use models::{EngineModel, TabStatus, Zone};
pub use provider::{Browser, BrowserEvent, MemoryBrowser};
pub use settings::{Settings, SettingsStore};
