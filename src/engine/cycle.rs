//! Evaluation cycle guard. Every state change goes through [`transition`].

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Running {
        cycle_id: u64,
        started_at: DateTime<Utc>,
    },
    /// Exceeded its time limit. The next begin clears it.
    TimedOut {
        cycle_id: u64,
        started_at: DateTime<Utc>,
    },
}

impl CycleState {
    pub fn is_running(&self) -> bool {
        matches!(self, CycleState::Running { .. })
    }

    pub fn running_id(&self) -> Option<u64> {
        match self {
            CycleState::Running { cycle_id, .. } => Some(*cycle_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    Begin {
        cycle_id: u64,
        now: DateTime<Utc>,
        timeout: Duration,
    },
    Finish {
        cycle_id: u64,
    },
    Expire {
        cycle_id: u64,
    },
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    /// Another cycle holds the guard and is within its time limit.
    Busy,
    /// A stuck cycle was found and marked timed out; begin again to start.
    Expired { stale_id: u64 },
    Finished,
    /// Stale finish or expiry from a cycle that no longer owns the guard.
    Ignored,
    Cleared,
}

pub fn transition(state: CycleState, event: CycleEvent) -> (CycleState, Transition) {
    match (state, event) {
        (_, CycleEvent::Clear) => (CycleState::Idle, Transition::Cleared),

        (CycleState::Idle | CycleState::TimedOut { .. }, CycleEvent::Begin { cycle_id, now, .. }) => (
            CycleState::Running {
                cycle_id,
                started_at: now,
            },
            Transition::Started,
        ),
        (
            CycleState::Running {
                cycle_id: current,
                started_at,
            },
            CycleEvent::Begin { now, timeout, .. },
        ) => {
            if now - started_at >= timeout {
                (
                    CycleState::TimedOut {
                        cycle_id: current,
                        started_at,
                    },
                    Transition::Expired { stale_id: current },
                )
            } else {
                (state, Transition::Busy)
            }
        }

        (CycleState::Running { cycle_id: current, .. }, CycleEvent::Finish { cycle_id })
            if current == cycle_id =>
        {
            (CycleState::Idle, Transition::Finished)
        }
        (
            CycleState::Running {
                cycle_id: current,
                started_at,
            },
            CycleEvent::Expire { cycle_id },
        ) if current == cycle_id => (
            CycleState::TimedOut {
                cycle_id: current,
                started_at,
            },
            Transition::Expired { stale_id: current },
        ),

        (_, CycleEvent::Finish { .. } | CycleEvent::Expire { .. }) => (state, Transition::Ignored),
    }
}
