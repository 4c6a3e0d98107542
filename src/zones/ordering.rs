//! Step 4: left-to-right zone order.
//!
//! Groups sort by zone, then special groups after user groups within a zone,
//! then by where they currently sit. The sort is stable against its own
//! output, so a window that is already in order produces no moves.

use std::collections::BTreeMap;

use crate::models::{GroupId, WindowState, Zone};
use crate::provider::WindowView;

pub fn desired_order(
    view: &WindowView,
    zones: &BTreeMap<GroupId, Zone>,
    window: &WindowState,
) -> Vec<GroupId> {
    let mut keyed: Vec<(Zone, bool, usize, GroupId)> = view
        .group_order
        .iter()
        .enumerate()
        .map(|(position, group_id)| {
            let zone = zones.get(group_id).copied().unwrap_or(Zone::Green);
            (zone, window.is_special(*group_id), position, *group_id)
        })
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, _, _, group_id)| group_id).collect()
}

/// Moves that lay `desired` out contiguously from the leftmost group's
/// current position. Empty when the live order already matches.
pub fn plan_moves(view: &WindowView, desired: &[GroupId]) -> Vec<(GroupId, usize)> {
    if desired == view.group_order.as_slice() {
        return Vec::new();
    }

    let start = view
        .group_order
        .first()
        .and_then(|group_id| view.members_of(*group_id).first())
        .and_then(|tab_id| view.tab(*tab_id))
        .map(|tab| tab.index)
        .unwrap_or_else(|| view.pinned_count());

    let mut moves = Vec::with_capacity(desired.len());
    let mut index = start;
    for group_id in desired {
        moves.push((*group_id, index));
        index += view.members_of(*group_id).len();
    }
    moves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroupColor, SpecialGroupRef, SpecialStage};
    use crate::provider::{LiveGroup, LiveTab};
    use chrono::Utc;
    use uuid::Uuid;

    fn view(layout: &[(i64, Option<GroupId>)]) -> WindowView {
        let tabs: Vec<LiveTab> = layout
            .iter()
            .enumerate()
            .map(|(index, (id, group_id))| LiveTab {
                id: *id,
                window_id: 1,
                index,
                group_id: *group_id,
                pinned: false,
                url: String::new(),
                title: String::new(),
            })
            .collect();
        let mut group_ids: Vec<GroupId> = layout.iter().filter_map(|(_, g)| *g).collect();
        group_ids.dedup();
        let groups = group_ids.into_iter().map(|id| LiveGroup {
            id,
            window_id: 1,
            title: String::new(),
            color: GroupColor::Grey,
        });
        WindowView::build(1, tabs.into_iter(), groups)
    }

    #[test]
    fn sorted_window_needs_no_moves() {
        let view = view(&[(1, Some(10)), (2, Some(20)), (3, None)]);
        let zones = BTreeMap::from([(10, Zone::Green), (20, Zone::Red)]);

        let desired = desired_order(&view, &zones, &WindowState::new(1));
        assert_eq!(desired, vec![10, 20]);
        assert!(plan_moves(&view, &desired).is_empty());
    }

    #[test]
    fn older_groups_move_right() {
        let view = view(&[(9, None), (1, Some(10)), (2, Some(10)), (3, Some(20)), (4, Some(30))]);
        let zones = BTreeMap::from([(10, Zone::Red), (20, Zone::Green), (30, Zone::Yellow)]);

        let desired = desired_order(&view, &zones, &WindowState::new(1));
        assert_eq!(desired, vec![20, 30, 10]);
        assert_eq!(plan_moves(&view, &desired), vec![(20, 1), (30, 2), (10, 3)]);
    }

    #[test]
    fn special_group_sorts_last_within_zone() {
        let view = view(&[(1, Some(10)), (2, Some(20))]);
        let zones = BTreeMap::from([(10, Zone::Yellow), (20, Zone::Yellow)]);
        let mut window = WindowState::new(1);
        window.special_groups.insert(
            SpecialStage::Yellow,
            SpecialGroupRef {
                group_id: 10,
                marker: Uuid::new_v4(),
                created_at: Utc::now(),
            },
        );

        assert_eq!(desired_order(&view, &zones, &window), vec![20, 10]);
    }
}
