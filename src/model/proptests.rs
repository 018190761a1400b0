//! Property tests for the document model and merge engine (§8).
//!
//! Grounded in the pack's own property-test style (`determinism_tests.rs`):
//! `arb_*`-prefixed `Strategy` generator functions feeding `proptest!`
//! blocks, checking algebraic laws rather than fixed input/output pairs.

#![cfg(test)]

use std::collections::BTreeMap;

use proptest::prelude::*;

use super::patch;
use super::types::{Cell, CellContent, DocumentState, ScalarValue, SheetId, SheetMeta};
use crate::merge;

fn sheet_id() -> SheetId {
    SheetId::new("s1").unwrap()
}

fn arb_scalar() -> impl Strategy<Value = ScalarValue> {
    prop_oneof![
        (-1000i32..1000).prop_map(|n| ScalarValue::Number(f64::from(n))),
        "[a-z]{1,6}".prop_map(ScalarValue::Text),
        any::<bool>().prop_map(ScalarValue::Bool),
    ]
}

fn arb_cell() -> impl Strategy<Value = Cell> {
    arb_scalar().prop_map(|value| Cell { content: CellContent::Value { value }, format: None })
}

fn arb_address() -> impl Strategy<Value = String> {
    "[A-C][1-3]"
}

fn arb_cell_map() -> impl Strategy<Value = BTreeMap<String, Cell>> {
    prop::collection::btree_map(arb_address(), arb_cell(), 0..=6)
}

/// Build a single-sheet document from a sparse cell map.
fn state_from_cells(cells: BTreeMap<String, Cell>) -> DocumentState {
    let mut state = DocumentState::empty();
    let id = sheet_id();
    state.sheets.order.push(id.clone());
    state.sheets.meta_by_id.insert(id.clone(), SheetMeta::empty(id.clone()));
    state.cells.insert(id, cells);
    state
}

proptest! {
    /// `apply(base, diff(base, next)).cells == next.cells` (§4.4).
    #[test]
    fn patch_round_trips(base_cells in arb_cell_map(), next_cells in arb_cell_map()) {
        let base = state_from_cells(base_cells);
        let next = state_from_cells(next_cells);
        let p = patch::diff(&base, &next);
        let applied = patch::apply(&base, &p);
        prop_assert_eq!(applied.cells, next.cells);
    }

    /// `merge(base, base, base)` is `base` with no conflicts (§4.5).
    #[test]
    fn merge_identity_has_no_conflicts(cells in arb_cell_map()) {
        let base = state_from_cells(cells);
        let result = merge::merge(&base, &base, &base);
        prop_assert!(result.conflicts.is_empty());
        prop_assert_eq!(result.merged.cells, base.cells);
    }

    /// An unchanged `ours` never wins over a changed `theirs` (§4.5).
    #[test]
    fn merge_trivial_ours_takes_theirs(base_cells in arb_cell_map(), theirs_cells in arb_cell_map()) {
        let base = state_from_cells(base_cells);
        let theirs = state_from_cells(theirs_cells);
        let result = merge::merge(&base, &base, &theirs);
        prop_assert!(result.conflicts.is_empty());
        prop_assert_eq!(result.merged.cells, theirs.cells);
    }

    /// Identical edits on both sides never conflict (§4.5).
    #[test]
    fn same_edit_both_sides_is_not_a_conflict(base_cells in arb_cell_map(), edited_cells in arb_cell_map()) {
        let base = state_from_cells(base_cells);
        let edited = state_from_cells(edited_cells);
        let result = merge::merge(&base, &edited, &edited);
        prop_assert!(result.conflicts.is_empty());
        prop_assert_eq!(result.merged.cells, edited.cells);
    }

    /// Edits to different addresses on each side both survive without
    /// conflict (§4.5, §8 "disjoint edits never conflict").
    #[test]
    fn disjoint_single_cell_edits_do_not_conflict(
        base_cells in arb_cell_map(),
        ours_addr in arb_address(), ours_cell in arb_cell(),
        theirs_addr in arb_address(), theirs_cell in arb_cell(),
    ) {
        prop_assume!(ours_addr != theirs_addr);

        let mut ours_cells = base_cells.clone();
        ours_cells.insert(ours_addr.clone(), ours_cell.clone());
        let mut theirs_cells = base_cells.clone();
        theirs_cells.insert(theirs_addr.clone(), theirs_cell.clone());

        let base = state_from_cells(base_cells);
        let ours = state_from_cells(ours_cells);
        let theirs = state_from_cells(theirs_cells);

        let result = merge::merge(&base, &ours, &theirs);
        prop_assert!(result.conflicts.is_empty());
        let merged = &result.merged.cells[&sheet_id()];
        prop_assert_eq!(merged.get(&ours_addr), Some(&ours_cell));
        prop_assert_eq!(merged.get(&theirs_addr), Some(&theirs_cell));
    }
}
