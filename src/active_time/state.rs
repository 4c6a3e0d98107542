use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide counter of time spent with a browser window focused.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimeState {
    pub total_ms: u64,
    /// Set only while some browser window has focus.
    pub focused_since: Option<DateTime<Utc>>,
    pub last_persisted_at: Option<DateTime<Utc>>,
}

fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    // Clock skew can make `to` earlier than `from`; never count backwards.
    (to - from).num_milliseconds().max(0) as u64
}

impl ActiveTimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_focused(&self) -> bool {
        self.focused_since.is_some()
    }

    /// Total including the running window, without mutating state.
    pub fn current_total(&self, now: DateTime<Utc>) -> u64 {
        match self.focused_since {
            Some(since) => self.total_ms.saturating_add(elapsed_ms(since, now)),
            None => self.total_ms,
        }
    }

    /// Folds the running window into `total_ms` and restarts it at `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if let Some(since) = self.focused_since {
            self.total_ms = self.total_ms.saturating_add(elapsed_ms(since, now));
            self.focused_since = Some(now.max(since));
        }
    }

    pub fn on_focus_gained(&mut self, now: DateTime<Utc>) {
        if self.focused_since.is_none() {
            self.focused_since = Some(now);
        }
    }

    pub fn on_focus_lost(&mut self, now: DateTime<Utc>) {
        self.tick(now);
        self.focused_since = None;
    }

    /// Cold-start recovery after the process was suspended or restarted.
    ///
    /// If the previous run was focused when it last persisted, the gap up to
    /// `now` is credited once. Focus is unknown afterwards until the browser
    /// reports it again. Returns the credited milliseconds.
    pub fn recover(&mut self, now: DateTime<Utc>) -> u64 {
        let Some(since) = self.focused_since.take() else {
            return 0;
        };

        let checkpoint = self.last_persisted_at.unwrap_or(since).max(since);
        let folded = elapsed_ms(since, checkpoint);
        let lost = elapsed_ms(checkpoint, now);
        let credited = folded.saturating_add(lost);
        self.total_ms = self.total_ms.saturating_add(credited);
        credited
    }

    pub fn mark_persisted(&mut self, now: DateTime<Utc>) {
        self.last_persisted_at = Some(now);
    }
}
