//! Versioned JSON blobs for the engine model, behind a key-value store.
//!
//! The model is split into three blobs that are always written together in
//! one batch, so a crash can never leave tabs and windows out of step.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::active_time::ActiveTimeState;
use crate::error::ValidationError;
use crate::models::{EngineModel, TabId, TrackedTab, WindowId, WindowState};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const TABS_KEY: &str = "tabs";
pub const WINDOWS_KEY: &str = "windows";
pub const ACTIVE_TIME_KEY: &str = "activeTime";

pub const BLOB_VERSION: u32 = 1;

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Keys touched by one committed batch.
pub type ChangeSet = Vec<String>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Writes every entry or none of them.
    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    data: Value,
}

fn wrap<T: Serialize>(data: &T) -> Result<Value> {
    let envelope = Envelope {
        version: BLOB_VERSION,
        data: serde_json::to_value(data)?,
    };
    Ok(serde_json::to_value(envelope)?)
}

fn unwrap_blob<T: DeserializeOwned>(key: &str, raw: Value) -> Result<T, ValidationError> {
    let envelope: Envelope =
        serde_json::from_value(raw).map_err(|err| ValidationError::MalformedBlob {
            key: key.to_string(),
            details: err.to_string(),
        })?;
    if envelope.version != BLOB_VERSION {
        return Err(ValidationError::BlobVersion {
            key: key.to_string(),
            found: envelope.version,
            expected: BLOB_VERSION,
        });
    }
    serde_json::from_value(envelope.data).map_err(|err| ValidationError::MalformedBlob {
        key: key.to_string(),
        details: err.to_string(),
    })
}

/// Outcome of a load. Rejected blobs fall back to their empty value.
#[derive(Debug, Default)]
pub struct LoadedModel {
    pub model: EngineModel,
    pub rejected: Vec<ValidationError>,
}

pub async fn load_model(store: &dyn KeyValueStore) -> Result<LoadedModel> {
    let mut loaded = LoadedModel::default();

    if let Some(raw) = store.get(TABS_KEY).await? {
        match unwrap_blob::<BTreeMap<TabId, TrackedTab>>(TABS_KEY, raw) {
            Ok(tabs) => loaded.model.tabs = tabs,
            Err(err) => loaded.rejected.push(err),
        }
    }
    if let Some(raw) = store.get(WINDOWS_KEY).await? {
        match unwrap_blob::<BTreeMap<WindowId, WindowState>>(WINDOWS_KEY, raw) {
            Ok(windows) => loaded.model.windows = windows,
            Err(err) => loaded.rejected.push(err),
        }
    }
    if let Some(raw) = store.get(ACTIVE_TIME_KEY).await? {
        match unwrap_blob::<ActiveTimeState>(ACTIVE_TIME_KEY, raw) {
            Ok(active_time) => loaded.model.active_time = active_time,
            Err(err) => loaded.rejected.push(err),
        }
    }

    for err in &loaded.rejected {
        log_warn!("Discarding persisted state: {err}");
    }
    Ok(loaded)
}

pub async fn save_model(store: &dyn KeyValueStore, model: &EngineModel) -> Result<()> {
    let entries = vec![
        (TABS_KEY.to_string(), wrap(&model.tabs)?),
        (WINDOWS_KEY.to_string(), wrap(&model.windows)?),
        (ACTIVE_TIME_KEY.to_string(), wrap(&model.active_time)?),
    ];
    store.set_many(entries).await
}

/// Keeps blobs in process memory. Used by tests and dry runs.
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
    fail_writes: Mutex<u32>,
    changes: broadcast::Sender<ChangeSet>,
    last_write: Mutex<Option<DateTime<Utc>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            fail_writes: Mutex::new(0),
            changes,
            last_write: Mutex::new(None),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` batches fail without writing anything.
    pub fn fail_next_writes(&self, count: u32) {
        *lock(&self.fail_writes) = count;
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: Value) {
        lock(&self.entries).insert(key.to_string(), value);
    }

    pub fn last_write(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_write)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.raw(key))
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<()> {
        {
            let mut failures = lock(&self.fail_writes);
            if *failures > 0 {
                *failures -= 1;
                bail!("storage write rejected");
            }
        }

        let keys: ChangeSet = entries.iter().map(|(key, _)| key.clone()).collect();
        lock(&self.entries).extend(entries);
        *lock(&self.last_write) = Some(Utc::now());
        // No subscribers is fine.
        let _ = self.changes.send(keys);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.changes.subscribe()
    }
}
