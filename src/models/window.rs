use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GroupId, SpecialStage, WindowId, Zone};

/// A group created and owned by the engine for one aging stage.
///
/// The marker is what separates it from a user group that happens to carry
/// the same title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecialGroupRef {
    pub group_id: GroupId,
    pub marker: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Auto-naming bookkeeping for one group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamingProgress {
    pub first_seen_unnamed_at: Option<DateTime<Utc>>,
    pub last_auto_named_at: Option<DateTime<Utc>>,
    pub last_candidate: Option<String>,
    pub user_edit_lock_until: Option<DateTime<Utc>>,
    /// Last title the engine wrote; an update event with any other title is a user edit.
    pub last_written_title: Option<String>,
}

impl NamingProgress {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.user_edit_lock_until
            .map(|until| until > now)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    pub id: WindowId,
    pub special_groups: BTreeMap<SpecialStage, SpecialGroupRef>,
    pub zones: BTreeMap<GroupId, Zone>,
    pub naming: BTreeMap<GroupId, NamingProgress>,
}

impl WindowState {
    pub fn new(id: WindowId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn special_group(&self, stage: SpecialStage) -> Option<GroupId> {
        self.special_groups.get(&stage).map(|special| special.group_id)
    }

    pub fn special_stage_of(&self, group_id: GroupId) -> Option<SpecialStage> {
        self.special_groups
            .iter()
            .find(|(_, special)| special.group_id == group_id)
            .map(|(stage, _)| *stage)
    }

    pub fn is_special(&self, group_id: GroupId) -> bool {
        self.special_stage_of(group_id).is_some()
    }

    /// Drops every reference to a group that no longer exists.
    pub fn forget_group(&mut self, group_id: GroupId) {
        self.special_groups
            .retain(|_, special| special.group_id != group_id);
        self.zones.remove(&group_id);
        self.naming.remove(&group_id);
    }
}
