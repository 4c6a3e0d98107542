pub mod state;
pub mod status;
pub mod tab;
pub mod window;

pub use state::EngineModel;
pub use status::{GroupColor, SpecialStage, TabStatus, Zone};
pub use tab::{GroupId, TabId, TrackedTab, WindowId};
pub use window::{NamingProgress, SpecialGroupRef, WindowState};
