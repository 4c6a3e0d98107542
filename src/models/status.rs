use serde::{Deserialize, Serialize};

/// Aging stage of a tab, ordered from freshest to oldest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TabStatus {
    Green,
    Yellow,
    Red,
    Gone,
}

impl Default for TabStatus {
    fn default() -> Self {
        TabStatus::Green
    }
}

impl TabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabStatus::Green => "green",
            TabStatus::Yellow => "yellow",
            TabStatus::Red => "red",
            TabStatus::Gone => "gone",
        }
    }

    /// Zone for a live (non-terminal) status.
    pub fn zone(&self) -> Option<Zone> {
        match self {
            TabStatus::Green => Some(Zone::Green),
            TabStatus::Yellow => Some(Zone::Yellow),
            TabStatus::Red => Some(Zone::Red),
            TabStatus::Gone => None,
        }
    }

    /// Stage whose special group should hold an ungrouped tab with this status.
    pub fn special_stage(&self) -> Option<SpecialStage> {
        match self {
            TabStatus::Yellow => Some(SpecialStage::Yellow),
            TabStatus::Red => Some(SpecialStage::Red),
            TabStatus::Green | TabStatus::Gone => None,
        }
    }
}

/// Ordered aging category of a group. Sorted left to right in this order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Zone {
    Green,
    Yellow,
    Red,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Green => "green",
            Zone::Yellow => "yellow",
            Zone::Red => "red",
        }
    }

    pub fn color(&self) -> GroupColor {
        match self {
            Zone::Green => GroupColor::Green,
            Zone::Yellow => GroupColor::Yellow,
            Zone::Red => GroupColor::Red,
        }
    }
}

/// Aging stages that own a system-managed special group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SpecialStage {
    Yellow,
    Red,
}

impl SpecialStage {
    pub fn status(&self) -> TabStatus {
        match self {
            SpecialStage::Yellow => TabStatus::Yellow,
            SpecialStage::Red => TabStatus::Red,
        }
    }

    pub fn zone(&self) -> Zone {
        match self {
            SpecialStage::Yellow => Zone::Yellow,
            SpecialStage::Red => Zone::Red,
        }
    }

    /// Base name given to the special group when it is created.
    pub fn default_title(&self) -> &'static str {
        match self {
            SpecialStage::Yellow => "Aging",
            SpecialStage::Red => "Stale",
        }
    }
}

/// Tab group colours understood by the browser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum GroupColor {
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}
