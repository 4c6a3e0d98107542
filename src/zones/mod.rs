//! Per-window group management: special groups, zones, order and titles.

pub mod manager;
pub mod metadata;
pub mod ordering;
pub mod placement;

pub use manager::{CycleContext, WindowReport, ZoneManager};
pub use metadata::USER_EDIT_LOCK;

/// Smallest number of tabs that justifies creating a new special group.
/// An existing special group accepts any number.
pub const MIN_SPECIAL_GROUP_SIZE: usize = 2;
