use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TabStatus;

pub type TabId = i64;
pub type GroupId = i64;
pub type WindowId = i64;

/// Engine-side record for one live tab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedTab {
    pub id: TabId,
    pub window_id: WindowId,
    pub group_id: Option<GroupId>,
    pub status: TabStatus,
    /// Accumulator total at the moment the tab last changed content.
    pub active_anchor_ms: u64,
    /// Wall-clock instant the tab last changed content.
    pub wall_anchor: DateTime<Utc>,
    pub in_special_group: bool,
    /// Pinned tabs never age.
    pub excluded: bool,
    pub url: String,
    pub title: String,
    /// Set once an archive entry exists, so a failed removal does not archive twice.
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

impl TrackedTab {
    pub fn new(
        id: TabId,
        window_id: WindowId,
        url: impl Into<String>,
        title: impl Into<String>,
        active_total_ms: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            window_id,
            group_id: None,
            status: TabStatus::Green,
            active_anchor_ms: active_total_ms,
            wall_anchor: now,
            in_special_group: false,
            excluded: false,
            url: url.into(),
            title: title.into(),
            archived_at: None,
        }
    }

    /// Restarts aging after the tab's primary content changed.
    pub fn reset_age(&mut self, active_total_ms: u64, now: DateTime<Utc>) {
        self.active_anchor_ms = active_total_ms;
        self.wall_anchor = now;
        self.status = TabStatus::Green;
        self.archived_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn reset_age_moves_both_anchors() {
        let start = Utc::now();
        let mut tab = TrackedTab::new(1, 1, "https://a.test", "A", 100, start);
        tab.status = TabStatus::Red;
        tab.archived_at = Some(start);

        let later = start + Duration::hours(3);
        tab.reset_age(5_000, later);

        assert_eq!(tab.status, TabStatus::Green);
        assert_eq!(tab.active_anchor_ms, 5_000);
        assert_eq!(tab.wall_anchor, later);
        assert!(tab.archived_at.is_none());
    }
}
