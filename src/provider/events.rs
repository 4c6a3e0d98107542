use serde::{Deserialize, Serialize};

use super::LiveTab;
use crate::models::{GroupId, TabId, WindowId};

/// Browser notifications, already translated by the host adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BrowserEvent {
    TabCreated {
        tab: LiveTab,
    },
    #[serde(rename_all = "camelCase")]
    TabRemoved {
        tab_id: TabId,
    },
    /// The tab's primary content changed.
    #[serde(rename_all = "camelCase")]
    TabNavigated {
        tab_id: TabId,
        url: String,
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    TabTitleChanged {
        tab_id: TabId,
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    TabPinnedChanged {
        tab_id: TabId,
        pinned: bool,
    },
    /// Window or group membership changed.
    #[serde(rename_all = "camelCase")]
    TabAttached {
        tab_id: TabId,
        window_id: WindowId,
        group_id: Option<GroupId>,
    },
    #[serde(rename_all = "camelCase")]
    GroupUpdated {
        group_id: GroupId,
        window_id: WindowId,
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    GroupRemoved {
        group_id: GroupId,
    },
    /// `None` when the browser as a whole lost focus.
    #[serde(rename_all = "camelCase")]
    FocusChanged {
        window_id: Option<WindowId>,
    },
    #[serde(rename_all = "camelCase")]
    WindowRemoved {
        window_id: WindowId,
    },
}

impl BrowserEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BrowserEvent::TabCreated { .. } => "tab_created",
            BrowserEvent::TabRemoved { .. } => "tab_removed",
            BrowserEvent::TabNavigated { .. } => "tab_navigated",
            BrowserEvent::TabTitleChanged { .. } => "tab_title_changed",
            BrowserEvent::TabPinnedChanged { .. } => "tab_pinned_changed",
            BrowserEvent::TabAttached { .. } => "tab_attached",
            BrowserEvent::GroupUpdated { .. } => "group_updated",
            BrowserEvent::GroupRemoved { .. } => "group_removed",
            BrowserEvent::FocusChanged { .. } => "focus_changed",
            BrowserEvent::WindowRemoved { .. } => "window_removed",
        }
    }
}
