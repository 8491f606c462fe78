//! Selection state for the grid.
//!
//! The [`SelectionSet`] is the only authority on what the operator picked.
//! Row checkboxes and the header control are projections of it, re-derived
//! after every observation so that a grid that skips unchanged rows cannot
//! make the two drift apart.
use std::collections::HashSet;
use tracing::{debug, warn};

/// Record ids chosen for a bulk action, in the order they were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl SelectionSet {
    pub fn insert(&mut self, id: &str) -> bool {
        if self.members.insert(id.to_string()) {
            self.order.push(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if self.members.remove(id) {
            self.order.retain(|x| x != id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Ids joined for a single batch request.
    pub fn joined(&self, delimiter: &str) -> String {
        self.order.join(delimiter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RowSlot {
    id: String,
    checked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionTracker {
    rows: Vec<RowSlot>,
    selected: SelectionSet,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the visible rows; checked state is projected from the set by id.
    pub fn set_rows<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows = ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                RowSlot {
                    checked: self.selected.contains(&id),
                    id,
                }
            })
            .collect();
    }

    /// Record the checkbox state last seen for one row.
    ///
    /// Idempotent. Unknown row indices and ids that do not match the row at
    /// that index are ignored.
    pub fn observe_row_state(&mut self, row_index: usize, record_id: &str, is_checked: bool) -> bool {
        let rows = self.rows.len();
        let Some(slot) = self.rows.get_mut(row_index) else {
            warn!(row_index, record_id, rows, "row index out of range; ignored");
            return false;
        };
        if slot.id != record_id {
            warn!(row_index, record_id, expected = %slot.id, "row id mismatch; ignored");
            return false;
        }
        slot.checked = is_checked;
        if is_checked {
            self.selected.insert(record_id);
        } else {
            self.selected.remove(record_id);
        }
        true
    }

    /// Apply a full checkbox snapshot, one flag per visible row.
    pub fn observe_snapshot(&mut self, checked: &[bool]) {
        let ids: Vec<String> = self.rows.iter().map(|r| r.id.clone()).collect();
        for (index, (id, is_checked)) in ids.iter().zip(checked).enumerate() {
            self.observe_row_state(index, id, *is_checked);
        }
    }

    /// Header control click: every visible row follows it.
    pub fn toggle_all(&mut self, checked: bool) {
        let snapshot = vec![checked; self.rows.len()];
        self.observe_snapshot(&snapshot);
    }

    /// Keep at most `max_size` selected ids; the first `max_size` rows win.
    /// Returns the ids that were dropped.
    pub fn enforce_capacity(&mut self, max_size: usize) -> Vec<String> {
        let mut dropped = Vec::new();
        for slot in self.rows.iter_mut().skip(max_size) {
            if slot.checked || self.selected.contains(&slot.id) {
                slot.checked = false;
                if self.selected.remove(&slot.id) {
                    dropped.push(slot.id.clone());
                }
            }
        }

        // Ids picked on other pages go next, most recent first.
        while self.selected.len() > max_size {
            let visible: HashSet<&str> = self.rows.iter().map(|r| r.id.as_str()).collect();
            let victim = self
                .selected
                .order
                .iter()
                .rev()
                .find(|id| !visible.contains(id.as_str()))
                .or_else(|| self.selected.order.last())
                .cloned();
            let Some(victim) = victim else { break };
            self.selected.remove(&victim);
            if let Some(slot) = self.rows.iter_mut().find(|r| r.id == victim) {
                slot.checked = false;
            }
            dropped.push(victim);
        }

        if !dropped.is_empty() {
            debug!(max_size, dropped = dropped.len(), "selection truncated");
        }
        dropped
    }

    /// Empty the set and uncheck every row; the header follows.
    pub fn clear(&mut self) {
        self.selected.clear();
        for slot in &mut self.rows {
            slot.checked = false;
        }
    }

    /// Checked ids on the current rows, keyed by row index.
    pub fn snapshot_visible(&self) -> Vec<(usize, String)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.checked)
            .map(|(index, slot)| (index, slot.id.clone()))
            .collect()
    }

    /// Fold a snapshot back into the set and re-project the current rows.
    pub fn reapply(&mut self, snapshot: &[(usize, String)]) {
        for (_, id) in snapshot {
            self.selected.insert(id);
        }
        for slot in &mut self.rows {
            slot.checked = self.selected.contains(&slot.id);
        }
    }

    pub fn header_checked(&self) -> bool {
        let visible = self.visible_count();
        visible > 0 && self.visible_selected_count() == visible
    }

    pub fn is_row_checked(&self, row_index: usize) -> bool {
        self.rows.get(row_index).map(|r| r.checked).unwrap_or(false)
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn visible_count(&self) -> usize {
        self.rows.len()
    }

    pub fn visible_selected_count(&self) -> usize {
        self.rows.iter().filter(|r| r.checked).count()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn selected(&self) -> &SelectionSet {
        &self.selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(n: usize) -> SelectionTracker {
        let mut t = SelectionTracker::new();
        t.set_rows((0..n).map(|i| format!("id-{i}")));
        t
    }

    #[test]
    fn snapshot_observation_matches_checked_rows() {
        let mut t = tracker_with(6);
        t.observe_snapshot(&[true, false, true, true, false, false]);
        t.observe_snapshot(&[true, false, false, true, false, true]);
        let mut ids = t.selected().to_vec();
        ids.sort();
        assert_eq!(ids, ["id-0", "id-3", "id-5"]);
        assert_eq!(t.visible_selected_count(), 3);
    }

    #[test]
    fn observation_is_idempotent() {
        let mut t = tracker_with(2);
        assert!(t.observe_row_state(1, "id-1", true));
        assert!(t.observe_row_state(1, "id-1", true));
        assert_eq!(t.selected_count(), 1);
        assert!(t.observe_row_state(1, "id-1", false));
        assert!(t.observe_row_state(1, "id-1", false));
        assert!(t.selected().is_empty());
    }

    #[test]
    fn out_of_range_and_mismatched_rows_ignored() {
        let mut t = tracker_with(2);
        assert!(!t.observe_row_state(5, "id-5", true));
        assert!(!t.observe_row_state(0, "id-1", true));
        assert!(t.selected().is_empty());
    }

    #[test]
    fn capacity_keeps_first_rows() {
        let mut t = tracker_with(70);
        t.toggle_all(true);
        assert_eq!(t.selected_count(), 70);
        let dropped = t.enforce_capacity(50);
        assert_eq!(dropped.len(), 20);
        assert_eq!(t.selected_count(), 50);
        for i in 0..70 {
            assert_eq!(t.is_selected(&format!("id-{i}")), i < 50, "row {i}");
            assert_eq!(t.is_row_checked(i), i < 50);
        }
    }

    #[test]
    fn capacity_drops_offpage_ids_before_visible_rows() {
        let mut t = tracker_with(2);
        t.toggle_all(true);
        t.set_rows(["p2-0", "p2-1"]);
        t.toggle_all(true);
        t.set_rows(["id-0", "id-1"]);
        let dropped = t.enforce_capacity(3);
        assert_eq!(dropped, ["p2-1"]);
        assert!(t.is_selected("id-0") && t.is_selected("id-1") && t.is_selected("p2-0"));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut t = tracker_with(3);
        t.toggle_all(true);
        assert!(t.header_checked());
        t.clear();
        let once = (t.selected().clone(), t.header_checked(), t.snapshot_visible());
        t.clear();
        let twice = (t.selected().clone(), t.header_checked(), t.snapshot_visible());
        assert_eq!(once, twice);
        assert!(!twice.1);
        assert!(twice.0.is_empty());
    }

    #[test]
    fn header_tracks_visible_rows() {
        let mut t = tracker_with(5);
        t.observe_snapshot(&[true; 5]);
        assert!(t.header_checked());
        t.observe_row_state(2, "id-2", false);
        assert!(!t.header_checked());
        t.observe_row_state(2, "id-2", true);
        assert!(t.header_checked());
    }

    #[test]
    fn empty_grid_header_unchecked() {
        let t = SelectionTracker::new();
        assert!(!t.header_checked());
    }

    #[test]
    fn selection_survives_row_replacement_by_id() {
        let mut t = tracker_with(3);
        t.observe_row_state(1, "id-1", true);
        let snap = t.snapshot_visible();
        assert_eq!(snap, [(1, "id-1".to_string())]);

        t.set_rows(["other-0", "other-1"]);
        t.reapply(&snap);
        assert!(!t.is_row_checked(1));

        t.set_rows(["id-1", "id-0"]);
        t.reapply(&snap);
        assert!(t.is_row_checked(0));
        assert!(!t.is_row_checked(1));
    }

    #[test]
    fn joined_preserves_pick_order() {
        let mut t = tracker_with(3);
        t.observe_row_state(2, "id-2", true);
        t.observe_row_state(0, "id-0", true);
        assert_eq!(t.selected().joined(","), "id-2,id-0");
    }
}
