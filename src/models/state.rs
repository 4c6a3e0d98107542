use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::active_time::ActiveTimeState;

use super::{TabId, TrackedTab, WindowId, WindowState};

/// Everything the engine owns between cycles. Persisted as one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineModel {
    pub tabs: BTreeMap<TabId, TrackedTab>,
    pub windows: BTreeMap<WindowId, WindowState>,
    pub active_time: ActiveTimeState,
}

impl EngineModel {
    pub fn window_mut(&mut self, window_id: WindowId) -> &mut WindowState {
        self.windows
            .entry(window_id)
            .or_insert_with(|| WindowState::new(window_id))
    }

    pub fn tabs_in_window(&self, window_id: WindowId) -> impl Iterator<Item = &TrackedTab> {
        self.tabs
            .values()
            .filter(move |tab| tab.window_id == window_id)
    }
}
