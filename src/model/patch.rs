//! Sparse per-sheet cell patch codec (§4.4).
//!
//! A [`Patch`] is the diff between two [`DocumentState`](super::types::DocumentState)
//! cell maps: for each sheet, a sparse address → cell overlay where an
//! absent cell (`None`, serialized as JSON `null`) means the address was
//! deleted. `diff` and `apply` must round-trip: `apply(base, diff(base,
//! next)).cells == next.cells` whenever `base` and `next` share the same
//! sheet id set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cell::cells_equal;
use super::types::{Cell, DocumentState, SheetId};

/// A sparse per-sheet cell overlay. `None` at an address means "delete this
/// cell"; an address absent from the map means "unchanged".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Patch {
    /// Sheet id → sparse address → cell overlay.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sheets: BTreeMap<SheetId, BTreeMap<String, Option<Cell>>>,
}

impl Patch {
    /// An empty patch: applying it is a no-op.
    #[must_use]
    pub fn empty() -> Self {
        Self { sheets: BTreeMap::new() }
    }

    /// `true` if this patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.values().all(BTreeMap::is_empty)
    }
}

/// Compute the sparse overlay that turns `base`'s cells into `next`'s cells
/// (§4.4, "diff"). Only sheets and addresses that actually changed are
/// recorded; sheet presence/ordering/metadata are not part of the patch.
#[must_use]
pub fn diff(base: &DocumentState, next: &DocumentState) -> Patch {
    let mut sheets = BTreeMap::new();
    let mut sheet_ids: Vec<&SheetId> = base.cells.keys().chain(next.cells.keys()).collect();
    sheet_ids.sort();
    sheet_ids.dedup();

    for sheet_id in sheet_ids {
        let empty = BTreeMap::new();
        let base_cells = base.cells.get(sheet_id).unwrap_or(&empty);
        let next_cells = next.cells.get(sheet_id).unwrap_or(&empty);

        let mut addresses: Vec<&String> = base_cells.keys().chain(next_cells.keys()).collect();
        addresses.sort();
        addresses.dedup();

        let mut overlay = BTreeMap::new();
        for addr in addresses {
            let before = base_cells.get(addr);
            let after = next_cells.get(addr);
            if !cells_equal(before, after) {
                overlay.insert(addr.clone(), after.cloned());
            }
        }
        if !overlay.is_empty() {
            sheets.insert(sheet_id.clone(), overlay);
        }
    }

    Patch { sheets }
}

/// Apply `patch` to `state`, returning the resulting state (§4.4, "apply").
///
/// A patch targeting a sheet id absent from `state.cells` creates that
/// sheet's cell map; this only occurs when the patch is applied alongside a
/// sheet-presence change made elsewhere (the patch codec itself is
/// cells-only).
#[must_use]
pub fn apply(state: &DocumentState, patch: &Patch) -> DocumentState {
    let mut result = state.clone();
    for (sheet_id, overlay) in &patch.sheets {
        let cells = result.cells.entry(sheet_id.clone()).or_default();
        for (addr, cell) in overlay {
            match cell {
                Some(cell) => {
                    cells.insert(addr.clone(), cell.clone());
                }
                None => {
                    cells.remove(addr);
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{CellContent, ScalarValue};

    fn state_with(sheet: &str, cells: &[(&str, f64)]) -> DocumentState {
        let mut state = DocumentState::empty();
        let sheet_id = SheetId::new(sheet).unwrap();
        let mut map = BTreeMap::new();
        for (addr, n) in cells {
            map.insert(
                (*addr).to_owned(),
                Cell { content: CellContent::Value { value: ScalarValue::Number(*n) }, format: None },
            );
        }
        state.cells.insert(sheet_id, map);
        state
    }

    #[test]
    fn diff_is_empty_for_identical_states() {
        let a = state_with("s1", &[("A1", 1.0)]);
        let b = state_with("s1", &[("A1", 1.0)]);
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn diff_records_addition_deletion_and_edit() {
        let base = state_with("s1", &[("A1", 1.0), ("A2", 2.0)]);
        let next = state_with("s1", &[("A1", 99.0), ("A3", 3.0)]);
        let p = diff(&base, &next);
        let overlay = &p.sheets[&SheetId::new("s1").unwrap()];
        assert_eq!(overlay.len(), 3);
        assert!(overlay["A2"].is_none());
        assert!(overlay["A3"].is_some());
        assert_eq!(overlay["A1"].as_ref().unwrap().content, CellContent::Value { value: ScalarValue::Number(99.0) });
    }

    #[test]
    fn apply_round_trips_through_diff() {
        let base = state_with("s1", &[("A1", 1.0), ("A2", 2.0)]);
        let next = state_with("s1", &[("A1", 99.0), ("A3", 3.0)]);
        let patch = diff(&base, &next);
        let applied = apply(&base, &patch);
        assert_eq!(applied.cells, next.cells);
    }

    #[test]
    fn apply_empty_patch_is_identity() {
        let base = state_with("s1", &[("A1", 1.0)]);
        assert_eq!(apply(&base, &Patch::empty()).cells, base.cells);
    }
}
