//! Three-way sheet-order merge via longest-increasing-subsequence (§4.5.2,
//! "Ordering merge").
//!
//! Given `base`/`ours`/`theirs` orderings restricted to the sheet ids that
//! survived presence merging, this produces either a merged order or a
//! conflict (defaulting to `ours`'s order).

use std::collections::BTreeSet;

use super::types::SheetId;

/// Result of merging three sheet orderings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderMergeResult {
    /// The merged order.
    pub order: Vec<SheetId>,
    /// `true` if both sides moved at least one common sheet id, forcing a
    /// `sheet/order` conflict (§4.5.2).
    pub conflict: bool,
}

/// Merge `base`, `ours`, and `theirs` sheet orderings, restricted to
/// `surviving` ids (§4.5.2, "Ordering merge").
#[must_use]
pub fn merge_order(
    base: &[SheetId],
    ours: &[SheetId],
    theirs: &[SheetId],
    surviving: &BTreeSet<SheetId>,
) -> OrderMergeResult {
    let base_f = filter_dedup(base, surviving);
    let ours_f = filter_dedup(ours, surviving);
    let theirs_f = filter_dedup(theirs, surviving);

    if ours_f == theirs_f {
        return OrderMergeResult { order: ours_f, conflict: false };
    }
    if ours_f == base_f {
        return OrderMergeResult { order: theirs_f, conflict: false };
    }
    if theirs_f == base_f {
        return OrderMergeResult { order: ours_f, conflict: false };
    }

    let base_set: BTreeSet<SheetId> = base_f.iter().cloned().collect();
    let moved_ours = moved_set(&base_f, &ours_f);
    let moved_theirs = moved_set(&base_f, &theirs_f);

    if moved_ours.intersection(&moved_theirs).next().is_some() {
        return OrderMergeResult { order: ours_f, conflict: true };
    }
    if has_constraint_conflict(&base_f, &moved_ours, &ours_f, &moved_theirs, &theirs_f) {
        return OrderMergeResult { order: ours_f, conflict: true };
    }

    let mut result = base_f.clone();
    result.retain(|id| !moved_ours.contains(id));
    for id in ours_f.iter().filter(|id| moved_ours.contains(*id)) {
        insert_by_neighbor(&mut result, id.clone(), &ours_f);
    }
    result.retain(|id| !moved_theirs.contains(id));
    for id in theirs_f.iter().filter(|id| moved_theirs.contains(*id)) {
        insert_by_neighbor(&mut result, id.clone(), &theirs_f);
    }

    for id in ours_f.iter().filter(|id| !base_set.contains(*id)) {
        if !result.contains(id) {
            insert_by_neighbor(&mut result, id.clone(), &ours_f);
        }
    }
    for id in theirs_f.iter().filter(|id| !base_set.contains(*id)) {
        if !result.contains(id) {
            insert_by_neighbor(&mut result, id.clone(), &theirs_f);
        }
    }

    OrderMergeResult { order: result, conflict: false }
}

fn filter_dedup(ids: &[SheetId], keep: &BTreeSet<SheetId>) -> Vec<SheetId> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| keep.contains(*id) && seen.insert((*id).clone()))
        .cloned()
        .collect()
}

/// The minimal set of ids (common to `base` and `side`) whose relative
/// position changed, via longest-increasing-subsequence over the position
/// mapping (§4.5.2).
fn moved_set(base: &[SheetId], side: &[SheetId]) -> BTreeSet<SheetId> {
    let side_set: BTreeSet<&SheetId> = side.iter().collect();
    let common: Vec<SheetId> = base.iter().filter(|id| side_set.contains(id)).cloned().collect();
    if common.len() < 2 {
        return BTreeSet::new();
    }

    let common_set: BTreeSet<&SheetId> = common.iter().collect();
    let side_common_order: Vec<&SheetId> = side.iter().filter(|id| common_set.contains(id)).collect();
    let side_pos: std::collections::HashMap<&SheetId, usize> = side_common_order
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();
    let sequence: Vec<usize> = common.iter().map(|id| side_pos[id]).collect();

    let lis_indices = longest_increasing_subsequence_indices(&sequence);
    let lis_set: BTreeSet<usize> = lis_indices.into_iter().collect();

    common
        .iter()
        .enumerate()
        .filter(|(i, _)| !lis_set.contains(i))
        .map(|(_, id)| id.clone())
        .collect()
}

/// Detects a "constraint conflict" (§4.5.2): reinsert `moved_ours` into
/// `base` alone and `moved_theirs` into `base` alone, then check whether any
/// pair with one id from each moved set lands in a different relative order
/// between the two results. If so, the two sides want incompatible
/// positions for that pair and neither reinsertion sweep can satisfy both.
fn has_constraint_conflict(
    base: &[SheetId],
    moved_ours: &BTreeSet<SheetId>,
    ours: &[SheetId],
    moved_theirs: &BTreeSet<SheetId>,
    theirs: &[SheetId],
) -> bool {
    if moved_ours.is_empty() || moved_theirs.is_empty() {
        return false;
    }
    let order_a = apply_moves_only(base, moved_ours, ours);
    let order_b = apply_moves_only(base, moved_theirs, theirs);
    let pos_a: std::collections::HashMap<&SheetId, usize> =
        order_a.iter().enumerate().map(|(i, id)| (id, i)).collect();
    let pos_b: std::collections::HashMap<&SheetId, usize> =
        order_b.iter().enumerate().map(|(i, id)| (id, i)).collect();

    for x in moved_ours {
        for y in moved_theirs {
            if x == y {
                continue;
            }
            let (Some(&xa), Some(&ya)) = (pos_a.get(x), pos_a.get(y)) else { continue };
            let (Some(&xb), Some(&yb)) = (pos_b.get(x), pos_b.get(y)) else { continue };
            if (xa < ya) != (xb < yb) {
                return true;
            }
        }
    }
    false
}

/// Reinsert just `moved` ids into `base`, in `side`'s relative order,
/// leaving every other id at its base position.
fn apply_moves_only(base: &[SheetId], moved: &BTreeSet<SheetId>, side: &[SheetId]) -> Vec<SheetId> {
    let mut result: Vec<SheetId> = base.iter().filter(|id| !moved.contains(*id)).cloned().collect();
    for id in side.iter().filter(|id| moved.contains(*id)) {
        insert_by_neighbor(&mut result, id.clone(), side);
    }
    result
}

/// Indices (into `seq`) of one longest strictly-increasing subsequence,
/// O(n^2) — sheet counts are small, clarity over asymptotic cleverness.
fn longest_increasing_subsequence_indices(seq: &[usize]) -> Vec<usize> {
    if seq.is_empty() {
        return Vec::new();
    }
    let n = seq.len();
    let mut len = vec![1usize; n];
    let mut parent = vec![None; n];
    for i in 0..n {
        for j in 0..i {
            if seq[j] < seq[i] && len[j] + 1 > len[i] {
                len[i] = len[j] + 1;
                parent[i] = Some(j);
            }
        }
    }
    let mut end = 0;
    for i in 1..n {
        if len[i] > len[end] {
            end = i;
        }
    }
    let mut indices = Vec::new();
    let mut cur = Some(end);
    while let Some(i) = cur {
        indices.push(i);
        cur = parent[i];
    }
    indices.reverse();
    indices
}

fn insert_by_neighbor(list: &mut Vec<SheetId>, id: SheetId, side_order: &[SheetId]) {
    let Some(pos) = side_order.iter().position(|x| *x == id) else {
        list.push(id);
        return;
    };
    let mut insert_at = 0;
    for candidate in side_order[..pos].iter().rev() {
        if let Some(i) = list.iter().position(|x| x == candidate) {
            insert_at = i + 1;
            break;
        }
    }
    list.insert(insert_at, id);
}
