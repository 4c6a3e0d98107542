pub mod state;

pub use state::ActiveTimeState;
