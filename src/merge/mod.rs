//! Three-way semantic merge engine (§4.5) — the hardest sub-component.
//!
//! Runs, in order: workbook-level keyed maps (§4.5.1), sheet
//! presence/rename/view/ordering (§4.5.2–§4.5.3), then per-sheet cell merge
//! (§4.5.4–§4.5.5). Always produces a best-effort merged, normalized state
//! plus an ordered conflict list; never fails.

mod cell;
pub mod conflict;
mod keyed_map;
mod sheet;
mod view;

pub use conflict::{Conflict, KeyedMapName};

use crate::model::types::DocumentState;

/// The result of a three-way merge (§4.5).
#[derive(Clone, Debug, PartialEq)]
pub struct MergeResult {
    /// The merged, normalized document state.
    pub merged: DocumentState,
    /// Conflicts recorded during the merge, in deterministic visitation
    /// order: keyed maps, then sheets, then cells.
    pub conflicts: Vec<Conflict>,
}

/// Three-way merge `ours` and `theirs` against their common `base` (§4.5).
///
/// Total: never fails. Ambiguity becomes a recorded [`Conflict`]; the
/// merged value always defaults to `ours` at the point of ambiguity.
#[must_use]
pub fn merge(base: &DocumentState, ours: &DocumentState, theirs: &DocumentState) -> MergeResult {
    let mut conflicts = Vec::new();

    let metadata = keyed_map::merge_keyed_map(KeyedMapName::Metadata, &base.metadata, &ours.metadata, &theirs.metadata, &mut conflicts);
    let named_ranges =
        keyed_map::merge_keyed_map(KeyedMapName::NamedRange, &base.named_ranges, &ours.named_ranges, &theirs.named_ranges, &mut conflicts);
    let comments = keyed_map::merge_keyed_map(KeyedMapName::Comment, &base.comments, &ours.comments, &theirs.comments, &mut conflicts);

    let (sheets, cells) = sheet::merge_sheets(base, ours, theirs, &mut conflicts);

    // Each sub-merge above already preserves the §3 invariants (sheets.order
    // / meta_by_id / cells all agree on the surviving sheet id set), so the
    // combination is already normalized; no re-normalization pass is needed.
    let merged = DocumentState { schema_version: 1, sheets, cells, metadata, named_ranges, comments };

    MergeResult { merged, conflicts }
}
