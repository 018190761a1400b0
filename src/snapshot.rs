//! Snapshot policy (§4.8): when a store backend should persist a full state
//! alongside a commit's patch, rather than relying on patch replay.
//!
//! This module is policy only — it decides *when*, not *how*; a store
//! implementation (e.g. [`crate::store::InMemoryStore`]) decides what to do
//! with the answer. Factoring the decision out keeps it unit-testable
//! without a store in the loop, the way the codebase keeps `epoch.rs`'s
//! pure graph-walk logic separate from `backend/*.rs`'s I/O.

use crate::config::SnapshotConfig;
use crate::model::patch::Patch;

/// Whether to persist a full-state snapshot alongside a new commit, and the
/// recorded distance-from-snapshot carried forward to the next decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotDecision {
    /// `true` if this commit should carry a full-state snapshot.
    pub should_snapshot: bool,
    /// The distance-from-nearest-snapshot value to record for this commit
    /// (`0` when `should_snapshot` is `true`, since this commit becomes the
    /// new nearest snapshot).
    pub distance_from_snapshot: u32,
}

/// Decide whether the commit with the given parent distance and patch size
/// should be snapshotted (§4.8).
///
/// `parent_distance_from_snapshot` is `0` for the root commit (which is
/// always its own snapshot) and otherwise the parent's recorded distance.
///
/// `non_cell_state_changed` must be `true` whenever this commit's sheet
/// metadata, sheet order, sheet view, or workbook-level keyed maps differ
/// from the parent's reconstructed state: the patch codec is cells-only
/// (§4.4), so a store has no other way to materialize that delta, and a
/// reconstruction that only replays cell patches between snapshots would
/// silently lose it. Forcing a snapshot here keeps every non-cell delta
/// inside some snapshot's full state.
#[must_use]
pub fn decide(config: &SnapshotConfig, parent_distance_from_snapshot: u32, patch: &Patch, non_cell_state_changed: bool) -> SnapshotDecision {
    let distance = parent_distance_from_snapshot + 1;
    let patch_bytes = serde_json::to_vec(patch).map(|v| v.len() as u64).unwrap_or(u64::MAX);
    let should_snapshot = non_cell_state_changed || distance >= config.distance_threshold || patch_bytes >= config.byte_threshold;
    SnapshotDecision { should_snapshot, distance_from_snapshot: if should_snapshot { 0 } else { distance } }
}
