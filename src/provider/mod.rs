//! Boundary to the browser. The host adapter implements these traits and
//! translates its native events into [`BrowserEvent`].
//!
//! Every call is a suspension point; the engine never assumes the world is
//! unchanged across one.

pub mod events;
pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{GroupColor, GroupId, TabId, WindowId};

pub use events::BrowserEvent;
pub use memory::{MemoryBrowser, WorldSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveTab {
    pub id: TabId,
    pub window_id: WindowId,
    /// Position within the window, left to right.
    pub index: usize,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub pinned: bool,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveGroup {
    pub id: GroupId,
    pub window_id: WindowId,
    #[serde(default)]
    pub title: String,
    pub color: GroupColor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveWindow {
    pub id: WindowId,
    #[serde(default)]
    pub focused: bool,
}

/// Partial group update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupUpdate {
    pub title: Option<String>,
    pub color: Option<GroupColor>,
}

/// Opaque handle to an archive destination (a bookmark folder).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FolderId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait TabProvider: Send + Sync {
    async fn list_tabs(&self) -> Result<Vec<LiveTab>>;

    /// Adds tabs to `group`, or to a new group when `group` is `None`.
    /// Returns the id of the group the tabs ended up in.
    async fn group_tabs(&self, tab_ids: &[TabId], group: Option<GroupId>) -> Result<GroupId>;

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<()>;

    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<()>;
}

#[async_trait]
pub trait GroupProvider: Send + Sync {
    async fn list_groups(&self) -> Result<Vec<LiveGroup>>;

    async fn get_group(&self, group_id: GroupId) -> Result<Option<LiveGroup>>;

    async fn update_group(&self, group_id: GroupId, update: GroupUpdate) -> Result<()>;

    /// Moves the whole group so its first tab lands at `index`.
    async fn move_group(&self, group_id: GroupId, index: usize) -> Result<()>;
}

#[async_trait]
pub trait WindowProvider: Send + Sync {
    async fn list_windows(&self) -> Result<Vec<LiveWindow>>;
}

#[async_trait]
pub trait ArchiveProvider: Send + Sync {
    /// Finds the named destination, creating it if needed.
    async fn resolve_folder(&self, name: &str) -> Result<FolderId>;

    async fn add_entry(&self, folder: &FolderId, entry: &ArchiveEntry) -> Result<()>;
}

/// Everything the engine needs from the host browser.
pub trait Browser: TabProvider + GroupProvider + WindowProvider + ArchiveProvider {}

impl<T> Browser for T where T: TabProvider + GroupProvider + WindowProvider + ArchiveProvider {}

/// Point-in-time view of every window, tab and group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveWorld {
    pub windows: Vec<LiveWindow>,
    pub tabs: Vec<LiveTab>,
    pub groups: Vec<LiveGroup>,
}

impl LiveWorld {
    pub async fn capture<B: Browser + ?Sized>(browser: &B) -> Result<Self> {
        let windows = browser.list_windows().await?;
        let tabs = browser.list_tabs().await?;
        let groups = browser.list_groups().await?;
        Ok(Self {
            windows,
            tabs,
            groups,
        })
    }

    pub fn window(&self, window_id: WindowId) -> WindowView {
        WindowView::build(
            window_id,
            self.tabs.iter().filter(|tab| tab.window_id == window_id).cloned(),
            self.groups.iter().filter(|group| group.window_id == window_id).cloned(),
        )
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.windows.iter().find(|window| window.focused).map(|window| window.id)
    }
}

/// Tabs and groups of one window, with group order derived from the lowest
/// member position rather than from creation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowView {
    pub window_id: WindowId,
    pub tabs: Vec<LiveTab>,
    pub groups: BTreeMap<GroupId, LiveGroup>,
    pub members: BTreeMap<GroupId, Vec<TabId>>,
    pub group_order: Vec<GroupId>,
}

impl WindowView {
    pub fn build(
        window_id: WindowId,
        tabs: impl Iterator<Item = LiveTab>,
        groups: impl Iterator<Item = LiveGroup>,
    ) -> Self {
        let mut tabs: Vec<LiveTab> = tabs.collect();
        tabs.sort_by_key(|tab| (tab.index, tab.id));

        let groups: BTreeMap<GroupId, LiveGroup> =
            groups.map(|group| (group.id, group)).collect();

        let mut members: BTreeMap<GroupId, Vec<TabId>> = BTreeMap::new();
        let mut group_order = Vec::new();
        for tab in &tabs {
            let Some(group_id) = tab.group_id else {
                continue;
            };
            if !groups.contains_key(&group_id) {
                continue;
            }
            let entry = members.entry(group_id).or_default();
            if entry.is_empty() {
                group_order.push(group_id);
            }
            entry.push(tab.id);
        }

        Self {
            window_id,
            tabs,
            groups,
            members,
            group_order,
        }
    }

    pub async fn load<B: Browser + ?Sized>(browser: &B, window_id: WindowId) -> Result<Self> {
        let tabs = browser.list_tabs().await?;
        let groups = browser.list_groups().await?;
        Ok(Self::build(
            window_id,
            tabs.into_iter().filter(|tab| tab.window_id == window_id),
            groups.into_iter().filter(|group| group.window_id == window_id),
        ))
    }

    pub fn tab(&self, tab_id: TabId) -> Option<&LiveTab> {
        self.tabs.iter().find(|tab| tab.id == tab_id)
    }

    pub fn members_of(&self, group_id: GroupId) -> &[TabId] {
        self.members
            .get(&group_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pinned_count(&self) -> usize {
        self.tabs.iter().filter(|tab| tab.pinned).count()
    }
}
