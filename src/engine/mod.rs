//! Evaluation cycles, event handling and the tick scheduler.

pub mod controller;
pub mod cycle;
pub mod events;
pub mod scheduler;

pub use controller::{CycleOutcome, CycleReport, Engine, EventDisposition, CYCLE_TIMEOUT};
pub use cycle::CycleState;
pub use events::EventEffect;
pub use scheduler::Scheduler;
