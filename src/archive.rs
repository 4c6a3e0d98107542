//! Retirement of terminal tabs: archive first, then remove.
//!
//! A tab is only closed once its archive entry exists (or archiving does not
//! apply to it). `archived_at` records that the entry exists so a failed
//! removal never produces a second entry on retry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{TabId, TrackedTab};
use crate::provider::{ArchiveEntry, ArchiveProvider, Browser, FolderId};
use crate::settings::ArchiveSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const INTERNAL_SCHEMES: [&str; 9] = [
    "chrome://",
    "about:",
    "edge://",
    "chrome-extension://",
    "moz-extension://",
    "devtools://",
    "view-source:",
    "data:",
    "javascript:",
];

/// Internal pages (`chrome://`, `about:` and friends) are never archived.
pub fn is_archivable(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    !lower.is_empty()
        && !INTERNAL_SCHEMES
            .iter()
            .any(|scheme| lower.starts_with(scheme))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetireOutcome {
    pub archived: Vec<TabId>,
    pub removed: Vec<TabId>,
    /// Left open for the next cycle because a step failed.
    pub deferred: Vec<TabId>,
}

/// Caches the archive destination for the session and limits lookups to
/// one per cycle.
#[derive(Debug, Default)]
pub struct ArchiveCoordinator {
    folder: Option<(String, FolderId)>,
    resolved_this_cycle: bool,
}

impl ArchiveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_cycle(&mut self) {
        self.resolved_this_cycle = false;
    }

    pub fn cached_folder(&self) -> Option<&FolderId> {
        self.folder.as_ref().map(|(_, folder)| folder)
    }

    fn invalidate(&mut self) {
        self.folder = None;
    }

    async fn destination<A: ArchiveProvider + ?Sized>(
        &mut self,
        archive: &A,
        name: &str,
    ) -> Option<FolderId> {
        if let Some((cached_name, folder)) = &self.folder {
            if cached_name == name {
                return Some(folder.clone());
            }
        }
        if self.resolved_this_cycle {
            return None;
        }
        self.resolved_this_cycle = true;

        match archive.resolve_folder(name).await {
            Ok(folder) => {
                log_debug!("Archive folder '{name}' resolved to {}", folder.0);
                self.folder = Some((name.to_string(), folder.clone()));
                Some(folder)
            }
            Err(err) => {
                log_warn!("Failed to resolve archive folder '{name}': {err:#}");
                None
            }
        }
    }

    /// Archives and closes `tab_ids`. Removed tabs are dropped from `tabs`.
    pub async fn retire<B: Browser + ?Sized>(
        &mut self,
        browser: &B,
        tabs: &mut BTreeMap<TabId, TrackedTab>,
        tab_ids: &[TabId],
        settings: &ArchiveSettings,
        now: DateTime<Utc>,
    ) -> RetireOutcome {
        let mut outcome = RetireOutcome::default();
        let mut ready = Vec::new();

        for tab_id in tab_ids {
            let Some(tab) = tabs.get_mut(tab_id) else {
                continue;
            };
            let needs_entry =
                settings.enabled && tab.archived_at.is_none() && is_archivable(&tab.url);
            if !needs_entry {
                ready.push(*tab_id);
                continue;
            }

            let Some(folder) = self.destination(browser, &settings.folder_name).await else {
                outcome.deferred.push(*tab_id);
                continue;
            };
            let entry = ArchiveEntry {
                title: if tab.title.trim().is_empty() {
                    tab.url.clone()
                } else {
                    tab.title.clone()
                },
                url: tab.url.clone(),
            };
            match browser.add_entry(&folder, &entry).await {
                Ok(()) => {
                    tab.archived_at = Some(now);
                    outcome.archived.push(*tab_id);
                    ready.push(*tab_id);
                }
                Err(err) => {
                    // The folder may have been deleted; look it up again next cycle.
                    log_warn!("Failed to archive tab {tab_id}: {err:#}");
                    self.invalidate();
                    outcome.deferred.push(*tab_id);
                }
            }
        }

        if ready.is_empty() {
            return outcome;
        }
        match browser.remove_tabs(&ready).await {
            Ok(()) => {
                for tab_id in &ready {
                    tabs.remove(tab_id);
                }
                outcome.removed = ready;
            }
            Err(err) => {
                log_warn!("Failed to close {} retired tabs: {err:#}", ready.len());
                outcome.deferred.extend(ready);
            }
        }
        outcome
    }
}
