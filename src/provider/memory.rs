//! In-process browser used by the replay binary and the test suite.
//!
//! Behaves like the real tab strip where it matters to the engine: groups
//! are contiguous, empty groups disappear, and moves shift neighbours.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    ArchiveEntry, ArchiveProvider, FolderId, GroupProvider, GroupUpdate, LiveGroup, LiveTab,
    LiveWindow, TabProvider, WindowProvider,
};
use crate::models::{GroupColor, GroupId, TabId, WindowId};

/// Serializable world used to seed and dump a [`MemoryBrowser`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldSnapshot {
    pub windows: Vec<LiveWindow>,
    pub tabs: Vec<LiveTab>,
    pub groups: Vec<LiveGroup>,
    pub archive: BTreeMap<String, Vec<ArchiveEntry>>,
}

#[derive(Debug, Clone)]
struct TabRecord {
    window_id: WindowId,
    group_id: Option<GroupId>,
    pinned: bool,
    url: String,
    title: String,
}

#[derive(Debug, Clone)]
struct GroupRecord {
    window_id: WindowId,
    title: String,
    color: GroupColor,
}

#[derive(Debug, Default)]
struct Faults {
    fail_removals: u32,
    fail_archive_adds: u32,
    fail_resolves: u32,
    stall_listing: Option<Duration>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub group_moves: u32,
    pub group_updates: u32,
    pub folder_resolves: u32,
    pub archive_adds: u32,
    pub removals: u32,
}

#[derive(Debug, Default)]
struct World {
    windows: Vec<LiveWindow>,
    order: BTreeMap<WindowId, Vec<TabId>>,
    tabs: BTreeMap<TabId, TabRecord>,
    groups: BTreeMap<GroupId, GroupRecord>,
    folders: BTreeMap<String, FolderId>,
    entries: BTreeMap<FolderId, Vec<ArchiveEntry>>,
    pending_user_titles: BTreeMap<GroupId, String>,
    next_id: i64,
    faults: Faults,
    calls: CallCounts,
}

impl World {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn index_of(&self, tab_id: TabId) -> Option<(WindowId, usize)> {
        let record = self.tabs.get(&tab_id)?;
        let order = self.order.get(&record.window_id)?;
        let index = order.iter().position(|id| *id == tab_id)?;
        Some((record.window_id, index))
    }

    fn detach(&mut self, tab_id: TabId) {
        for order in self.order.values_mut() {
            order.retain(|id| *id != tab_id);
        }
    }

    fn group_members(&self, group_id: GroupId) -> Vec<TabId> {
        let Some(group) = self.groups.get(&group_id) else {
            return Vec::new();
        };
        self.order
            .get(&group.window_id)
            .map(|order| {
                order
                    .iter()
                    .copied()
                    .filter(|id| {
                        self.tabs
                            .get(id)
                            .map(|tab| tab.group_id == Some(group_id))
                            .unwrap_or(false)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn drop_empty_groups(&mut self) {
        let occupied: Vec<GroupId> = self.tabs.values().filter_map(|tab| tab.group_id).collect();
        self.groups.retain(|id, _| occupied.contains(id));
    }

    fn live_tab(&self, tab_id: TabId) -> Option<LiveTab> {
        let record = self.tabs.get(&tab_id)?;
        let (_, index) = self.index_of(tab_id)?;
        Some(LiveTab {
            id: tab_id,
            window_id: record.window_id,
            index,
            group_id: record.group_id,
            pinned: record.pinned,
            url: record.url.clone(),
            title: record.title.clone(),
        })
    }

    fn live_group(&self, group_id: GroupId) -> Option<LiveGroup> {
        self.groups.get(&group_id).map(|group| LiveGroup {
            id: group_id,
            window_id: group.window_id,
            title: group.title.clone(),
            color: group.color,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryBrowser {
    world: Mutex<World>,
}

impl MemoryBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: WorldSnapshot) -> Result<Self> {
        let mut world = World::default();
        let mut max_id = 0;

        for window in snapshot.windows {
            max_id = max_id.max(window.id);
            world.order.entry(window.id).or_default();
            world.windows.push(window);
        }

        for group in snapshot.groups {
            if !world.order.contains_key(&group.window_id) {
                bail!("group {} references unknown window {}", group.id, group.window_id);
            }
            max_id = max_id.max(group.id);
            world.groups.insert(
                group.id,
                GroupRecord {
                    window_id: group.window_id,
                    title: group.title,
                    color: group.color,
                },
            );
        }

        let mut tabs = snapshot.tabs;
        tabs.sort_by_key(|tab| (tab.window_id, tab.index, tab.id));
        for tab in tabs {
            let Some(order) = world.order.get_mut(&tab.window_id) else {
                bail!("tab {} references unknown window {}", tab.id, tab.window_id);
            };
            if let Some(group_id) = tab.group_id {
                if !world.groups.contains_key(&group_id) {
                    bail!("tab {} references unknown group {group_id}", tab.id);
                }
            }
            max_id = max_id.max(tab.id);
            order.push(tab.id);
            world.tabs.insert(
                tab.id,
                TabRecord {
                    window_id: tab.window_id,
                    group_id: tab.group_id,
                    pinned: tab.pinned,
                    url: tab.url,
                    title: tab.title,
                },
            );
        }

        for (name, entries) in snapshot.archive {
            max_id += 1;
            let folder = FolderId(format!("folder-{max_id}"));
            world.folders.insert(name, folder.clone());
            world.entries.insert(folder, entries);
        }

        world.next_id = max_id;
        world.drop_empty_groups();
        Ok(Self {
            world: Mutex::new(world),
        })
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let world = self.lock();
        let tabs = world
            .order
            .values()
            .flatten()
            .filter_map(|id| world.live_tab(*id))
            .collect();
        let groups = world
            .groups
            .keys()
            .filter_map(|id| world.live_group(*id))
            .collect();
        let archive = world
            .folders
            .iter()
            .map(|(name, folder)| {
                (
                    name.clone(),
                    world.entries.get(folder).cloned().unwrap_or_default(),
                )
            })
            .collect();
        WorldSnapshot {
            windows: world.windows.clone(),
            tabs,
            groups,
            archive,
        }
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        match self.world.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_window(&self, focused: bool) -> WindowId {
        let mut world = self.lock();
        let id = world.allocate_id();
        if focused {
            for window in &mut world.windows {
                window.focused = false;
            }
        }
        world.windows.push(LiveWindow { id, focused });
        world.order.insert(id, Vec::new());
        id
    }

    pub fn set_focus(&self, window_id: Option<WindowId>) {
        let mut world = self.lock();
        for window in &mut world.windows {
            window.focused = Some(window.id) == window_id;
        }
    }

    pub fn close_window(&self, window_id: WindowId) {
        let mut world = self.lock();
        world.windows.retain(|window| window.id != window_id);
        world.order.remove(&window_id);
        world.tabs.retain(|_, tab| tab.window_id != window_id);
        world.drop_empty_groups();
    }

    /// Opens a tab at the right end of the window.
    pub fn open_tab(&self, window_id: WindowId, url: &str, title: &str) -> Result<LiveTab> {
        let mut world = self.lock();
        if !world.order.contains_key(&window_id) {
            bail!("no window with id {window_id}");
        }
        let id = world.allocate_id();
        world.tabs.insert(
            id,
            TabRecord {
                window_id,
                group_id: None,
                pinned: false,
                url: url.to_string(),
                title: title.to_string(),
            },
        );
        world.order.entry(window_id).or_default().push(id);
        world
            .live_tab(id)
            .ok_or_else(|| anyhow!("tab {id} vanished after insert"))
    }

    /// Replaces a tab's id, as a browser restart does.
    pub fn reassign_tab_id(&self, old_id: TabId) -> Result<TabId> {
        let mut world = self.lock();
        let record = world
            .tabs
            .remove(&old_id)
            .ok_or_else(|| anyhow!("no tab with id {old_id}"))?;
        let new_id = world.allocate_id();
        if let Some(order) = world.order.get_mut(&record.window_id) {
            for id in order.iter_mut() {
                if *id == old_id {
                    *id = new_id;
                }
            }
        }
        world.tabs.insert(new_id, record);
        Ok(new_id)
    }

    pub fn navigate(&self, tab_id: TabId, url: &str, title: &str) -> Result<()> {
        let mut world = self.lock();
        let tab = world
            .tabs
            .get_mut(&tab_id)
            .ok_or_else(|| anyhow!("no tab with id {tab_id}"))?;
        tab.url = url.to_string();
        tab.title = title.to_string();
        Ok(())
    }

    pub fn set_pinned(&self, tab_id: TabId, pinned: bool) -> Result<()> {
        let mut world = self.lock();
        let tab = world
            .tabs
            .get_mut(&tab_id)
            .ok_or_else(|| anyhow!("no tab with id {tab_id}"))?;
        tab.pinned = pinned;
        Ok(())
    }

    /// Renames a group as the user would, immediately.
    pub fn rename_group(&self, group_id: GroupId, title: &str) -> Result<()> {
        let mut world = self.lock();
        let group = world
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| anyhow!("no group with id {group_id}"))?;
        group.title = title.to_string();
        Ok(())
    }

    /// Renames a group as the user would, landing just as the next group
    /// read happens.
    pub fn rename_group_on_next_read(&self, group_id: GroupId, title: &str) {
        self.lock()
            .pending_user_titles
            .insert(group_id, title.to_string());
    }

    pub fn group(&self, group_id: GroupId) -> Option<LiveGroup> {
        self.lock().live_group(group_id)
    }

    pub fn tab(&self, tab_id: TabId) -> Option<LiveTab> {
        self.lock().live_tab(tab_id)
    }

    pub fn delete_folder(&self, name: &str) {
        let mut world = self.lock();
        if let Some(folder) = world.folders.remove(name) {
            world.entries.remove(&folder);
        }
    }

    pub fn archived(&self, name: &str) -> Vec<ArchiveEntry> {
        let world = self.lock();
        world
            .folders
            .get(name)
            .and_then(|folder| world.entries.get(folder))
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_next_removals(&self, count: u32) {
        self.lock().faults.fail_removals = count;
    }

    pub fn fail_next_archive_adds(&self, count: u32) {
        self.lock().faults.fail_archive_adds = count;
    }

    pub fn fail_next_folder_resolves(&self, count: u32) {
        self.lock().faults.fail_resolves = count;
    }

    /// Makes every tab listing hang for `delay`.
    pub fn stall_listing(&self, delay: Option<Duration>) {
        self.lock().faults.stall_listing = delay;
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }
}

fn take_fault(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl TabProvider for MemoryBrowser {
    async fn list_tabs(&self) -> Result<Vec<LiveTab>> {
        let stall = self.lock().faults.stall_listing;
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        let world = self.lock();
        Ok(world
            .order
            .values()
            .flatten()
            .filter_map(|id| world.live_tab(*id))
            .collect())
    }

    async fn group_tabs(&self, tab_ids: &[TabId], group: Option<GroupId>) -> Result<GroupId> {
        let mut world = self.lock();
        let Some(first) = tab_ids.first() else {
            bail!("cannot group an empty tab list");
        };
        for id in tab_ids {
            if !world.tabs.contains_key(id) {
                bail!("no tab with id {id}");
            }
        }

        let (window_id, group_id, anchor) = match group {
            Some(group_id) => {
                let window_id = world
                    .groups
                    .get(&group_id)
                    .map(|group| group.window_id)
                    .ok_or_else(|| anyhow!("no group with id {group_id}"))?;
                let last_member = world.group_members(group_id).into_iter().rev().find(|id| !tab_ids.contains(id));
                (window_id, group_id, last_member.map(Anchor::After))
            }
            None => {
                let (window_id, _) = world
                    .index_of(*first)
                    .ok_or_else(|| anyhow!("tab {first} is not in any window"))?;
                let group_id = world.allocate_id();
                world.groups.insert(
                    group_id,
                    GroupRecord {
                        window_id,
                        title: String::new(),
                        color: GroupColor::Grey,
                    },
                );
                let order = world.order.get(&window_id).cloned().unwrap_or_default();
                let before = order
                    .iter()
                    .position(|id| tab_ids.contains(id))
                    .and_then(|index| order[..index].last().copied());
                let anchor = match before {
                    Some(id) => Some(Anchor::After(id)),
                    None => Some(Anchor::Start),
                };
                (window_id, group_id, anchor)
            }
        };

        let mut moving: Vec<TabId> = tab_ids.to_vec();
        moving.sort_by_key(|id| world.index_of(*id).map(|(w, i)| (w != window_id, i)));
        for id in &moving {
            world.detach(*id);
            if let Some(tab) = world.tabs.get_mut(id) {
                tab.window_id = window_id;
                tab.group_id = Some(group_id);
            }
        }

        let order = world.order.entry(window_id).or_default();
        let position = match anchor {
            Some(Anchor::After(id)) => order
                .iter()
                .position(|existing| *existing == id)
                .map(|index| index + 1)
                .unwrap_or(order.len()),
            Some(Anchor::Start) => 0,
            None => order.len(),
        };
        for (offset, id) in moving.iter().enumerate() {
            order.insert(position + offset, *id);
        }

        world.drop_empty_groups();
        Ok(group_id)
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<()> {
        let mut world = self.lock();
        for id in tab_ids {
            let Some(group_id) = world.tabs.get(id).and_then(|tab| tab.group_id) else {
                continue;
            };
            let window_id = world.tabs.get(id).map(|tab| tab.window_id).unwrap_or_default();
            if let Some(tab) = world.tabs.get_mut(id) {
                tab.group_id = None;
            }
            // Leave the tab just right of what remains of its group.
            if let Some(last) = world.group_members(group_id).last().copied() {
                world.detach(*id);
                let order = world.order.entry(window_id).or_default();
                let position = order
                    .iter()
                    .position(|existing| *existing == last)
                    .map(|index| index + 1)
                    .unwrap_or(order.len());
                order.insert(position, *id);
            }
        }
        world.drop_empty_groups();
        Ok(())
    }

    async fn remove_tabs(&self, tab_ids: &[TabId]) -> Result<()> {
        let mut world = self.lock();
        if take_fault(&mut world.faults.fail_removals) {
            bail!("tab removal rejected");
        }
        world.calls.removals += 1;
        for id in tab_ids {
            world.tabs.remove(id);
            world.detach(*id);
        }
        world.drop_empty_groups();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Anchor {
    Start,
    After(TabId),
}

#[async_trait]
impl GroupProvider for MemoryBrowser {
    async fn list_groups(&self) -> Result<Vec<LiveGroup>> {
        let world = self.lock();
        Ok(world
            .groups
            .keys()
            .filter_map(|id| world.live_group(*id))
            .collect())
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Option<LiveGroup>> {
        let mut world = self.lock();
        if let Some(title) = world.pending_user_titles.remove(&group_id) {
            if let Some(group) = world.groups.get_mut(&group_id) {
                group.title = title;
            }
        }
        Ok(world.live_group(group_id))
    }

    async fn update_group(&self, group_id: GroupId, update: GroupUpdate) -> Result<()> {
        let mut world = self.lock();
        world.calls.group_updates += 1;
        let group = world
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| anyhow!("no group with id {group_id}"))?;
        if let Some(title) = update.title {
            group.title = title;
        }
        if let Some(color) = update.color {
            group.color = color;
        }
        Ok(())
    }

    async fn move_group(&self, group_id: GroupId, index: usize) -> Result<()> {
        let mut world = self.lock();
        let members = world.group_members(group_id);
        if members.is_empty() {
            bail!("no group with id {group_id}");
        }
        world.calls.group_moves += 1;
        let window_id = world
            .groups
            .get(&group_id)
            .map(|group| group.window_id)
            .unwrap_or_default();
        let order = world.order.entry(window_id).or_default();
        order.retain(|id| !members.contains(id));
        let position = index.min(order.len());
        for (offset, id) in members.iter().enumerate() {
            order.insert(position + offset, *id);
        }
        Ok(())
    }
}

#[async_trait]
impl WindowProvider for MemoryBrowser {
    async fn list_windows(&self) -> Result<Vec<LiveWindow>> {
        Ok(self.lock().windows.clone())
    }
}

#[async_trait]
impl ArchiveProvider for MemoryBrowser {
    async fn resolve_folder(&self, name: &str) -> Result<FolderId> {
        let mut world = self.lock();
        world.calls.folder_resolves += 1;
        if take_fault(&mut world.faults.fail_resolves) {
            bail!("archive folder lookup failed");
        }
        if let Some(folder) = world.folders.get(name) {
            return Ok(folder.clone());
        }
        let id = world.allocate_id();
        let folder = FolderId(format!("folder-{id}"));
        world.folders.insert(name.to_string(), folder.clone());
        world.entries.insert(folder.clone(), Vec::new());
        Ok(folder)
    }

    async fn add_entry(&self, folder: &FolderId, entry: &ArchiveEntry) -> Result<()> {
        let mut world = self.lock();
        if take_fault(&mut world.faults.fail_archive_adds) {
            bail!("archive entry rejected");
        }
        let entries = world
            .entries
            .get_mut(folder)
            .ok_or_else(|| anyhow!("archive folder {} no longer exists", folder.0))?;
        entries.push(entry.clone());
        world.calls.archive_adds += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser_with_tabs(count: usize) -> (MemoryBrowser, WindowId, Vec<TabId>) {
        let browser = MemoryBrowser::new();
        let window = browser.add_window(true);
        let tabs = (0..count)
            .map(|n| {
                browser
                    .open_tab(window, &format!("https://site{n}.test/"), &format!("Site {n}"))
                    .unwrap()
                    .id
            })
            .collect();
        (browser, window, tabs)
    }

    fn order(browser: &MemoryBrowser) -> Vec<TabId> {
        browser.snapshot().tabs.iter().map(|tab| tab.id).collect()
    }

    #[tokio::test]
    async fn new_group_is_contiguous_at_first_member() {
        let (browser, _, tabs) = browser_with_tabs(4);
        let group = browser.group_tabs(&[tabs[3], tabs[1]], None).await.unwrap();

        assert_eq!(order(&browser), vec![tabs[0], tabs[1], tabs[3], tabs[2]]);
        assert_eq!(browser.tab(tabs[3]).unwrap().group_id, Some(group));
    }

    #[tokio::test]
    async fn empty_groups_disappear() {
        let (browser, _, tabs) = browser_with_tabs(2);
        let group = browser.group_tabs(&[tabs[0]], None).await.unwrap();
        browser.ungroup_tabs(&[tabs[0]]).await.unwrap();
        assert!(browser.group(group).is_none());
    }

    #[tokio::test]
    async fn move_group_shifts_whole_block() {
        let (browser, _, tabs) = browser_with_tabs(4);
        let group = browser.group_tabs(&[tabs[2], tabs[3]], None).await.unwrap();
        browser.move_group(group, 0).await.unwrap();
        assert_eq!(order(&browser), vec![tabs[2], tabs[3], tabs[0], tabs[1]]);
        assert_eq!(browser.calls().group_moves, 1);
    }

    #[tokio::test]
    async fn scripted_rename_lands_on_next_read() {
        let (browser, _, tabs) = browser_with_tabs(2);
        let group = browser.group_tabs(&tabs, None).await.unwrap();
        browser.rename_group_on_next_read(group, "Mine");

        assert_eq!(browser.group(group).unwrap().title, "");
        let read = browser.get_group(group).await.unwrap().unwrap();
        assert_eq!(read.title, "Mine");
    }

    #[tokio::test]
    async fn deleted_folder_rejects_entries() {
        let browser = MemoryBrowser::new();
        let folder = browser.resolve_folder("Gone Tabs").await.unwrap();
        browser.delete_folder("Gone Tabs");
        let entry = ArchiveEntry {
            title: "A".into(),
            url: "https://a.test/".into(),
        };
        assert!(browser.add_entry(&folder, &entry).await.is_err());
    }
}
