use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};
use tokio::sync::watch;

use crate::error::ValidationError;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Minimum effective scheduler interval; browsers will not wake us more often.
pub const MIN_TICK_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimeMode {
    /// Age counts only time spent with the browser focused.
    ActiveTime,
    WallClock,
}

impl Default for TimeMode {
    fn default() -> Self {
        TimeMode::ActiveTime
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub yellow_after_ms: u64,
    pub red_after_ms: u64,
    pub gone_after_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            yellow_after_ms: 4 * HOUR_MS,
            red_after_ms: 8 * HOUR_MS,
            gone_after_ms: 24 * HOUR_MS,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.yellow_after_ms == 0 {
            return Err(ValidationError::ZeroThreshold);
        }
        if self.yellow_after_ms >= self.red_after_ms || self.red_after_ms >= self.gone_after_ms {
            return Err(ValidationError::ThresholdOrder {
                yellow_ms: self.yellow_after_ms,
                red_ms: self.red_after_ms,
                gone_ms: self.gone_after_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageToggles {
    pub yellow: bool,
    pub red: bool,
    pub gone: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            yellow: true,
            red: true,
            gone: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamingSettings {
    pub enabled: bool,
    /// How long a group must stay unnamed before the engine names it.
    pub delay_ms: u64,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: MINUTE_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSettings {
    pub enabled: bool,
    pub folder_name: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            folder_name: "Gone Tabs".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub time_mode: TimeMode,
    pub thresholds: Thresholds,
    pub stages: StageToggles,
    /// Move ungrouped aging tabs into the per-stage special groups.
    pub auto_group: bool,
    pub naming: NamingSettings,
    /// Append an age annotation such as `(3h)` to group titles.
    pub age_display: bool,
    pub archive: ArchiveSettings,
    pub tick_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_mode: TimeMode::default(),
            thresholds: Thresholds::default(),
            stages: StageToggles::default(),
            auto_group: true,
            naming: NamingSettings::default(),
            age_display: true,
            archive: ArchiveSettings::default(),
            tick_interval_secs: 60,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.thresholds.validate()?;
        if self.archive.enabled && self.archive.folder_name.trim().is_empty() {
            return Err(ValidationError::EmptyArchiveFolder);
        }
        Ok(())
    }

    pub fn effective_tick_interval_secs(&self) -> u64 {
        self.tick_interval_secs.max(MIN_TICK_INTERVAL_SECS)
    }
}

/// Validated settings with change notification.
///
/// Backed by a JSON file when constructed with [`SettingsStore::new`], or
/// purely in memory with [`SettingsStore::in_memory`].
pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<Settings>,
    changes: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<Settings>(&contents) {
                Ok(settings) => match settings.validate() {
                    Ok(()) => settings,
                    Err(err) => {
                        log_warn!("Ignoring invalid settings in {}: {err}", path.display());
                        Settings::default()
                    }
                },
                Err(err) => {
                    log_warn!("Ignoring malformed settings in {}: {err}", path.display());
                    Settings::default()
                }
            }
        } else {
            Settings::default()
        };

        Ok(Self::build(Some(path), data))
    }

    pub fn in_memory(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::build(None, settings))
    }

    fn build(path: Option<PathBuf>, data: Settings) -> Self {
        let (changes, _) = watch::channel(data.clone());
        Self {
            path,
            data: RwLock::new(data),
            changes,
        }
    }

    pub fn current(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the settings. Invalid settings are rejected and the previous
    /// value stays in effect.
    pub fn update(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        {
            let mut guard = match self.data.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.persist(&settings)?;
            *guard = settings.clone();
        }
        self.changes.send_replace(settings);
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.changes.subscribe()
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_order_thresholds() {
        let mut settings = Settings::default();
        settings.thresholds.red_after_ms = settings.thresholds.gone_after_ms;
        assert!(matches!(
            settings.validate(),
            Err(ValidationError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn invalid_update_keeps_previous_settings() {
        let store = SettingsStore::in_memory(Settings::default()).unwrap();
        let mut bad = Settings::default();
        bad.thresholds.yellow_after_ms = bad.thresholds.red_after_ms + 1;

        assert!(store.update(bad).is_err());
        assert_eq!(store.current(), Settings::default());
    }

    #[test]
    fn update_notifies_subscribers() {
        let store = SettingsStore::in_memory(Settings::default()).unwrap();
        let mut rx = store.subscribe();

        let mut next = Settings::default();
        next.age_display = false;
        store.update(next).unwrap();

        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().age_display);
    }

    #[test]
    fn file_store_round_trips_and_ignores_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        let mut next = Settings::default();
        next.time_mode = TimeMode::WallClock;
        store.update(next.clone()).unwrap();

        let reloaded = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reloaded.current(), next);

        fs::write(&path, r#"{"thresholds":{"yellowAfterMs":5,"redAfterMs":4,"goneAfterMs":9}}"#)
            .unwrap();
        let fallback = SettingsStore::new(path).unwrap();
        assert_eq!(fallback.current(), Settings::default());
    }

    #[test]
    fn tick_interval_has_floor() {
        let mut settings = Settings::default();
        settings.tick_interval_secs = 5;
        assert_eq!(settings.effective_tick_interval_secs(), MIN_TICK_INTERVAL_SECS);
    }
}
