//! Three-way merge of a single sheet's `view` (§4.5.3).
//!
//! Missing-on-one-side is treated as "no change on that side" by
//! substituting `base`'s value first; scalar/opaque fields resolve via the
//! plain three-way rule, sparse maps merge per key, `mergedRanges` merges by
//! provenance weight, and `drawings` merges by stable id.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::merge::conflict::{Conflict, RangeProvenance, WeightedRect};
use crate::model::types::{Drawing, DrawingId, FormatRun, Rect, SheetId, SheetView};

/// Merge one sheet's `view` (§4.5.3).
pub(crate) fn merge_view(
    sheet_id: &SheetId,
    base: &SheetView,
    ours: &SheetView,
    theirs: &SheetView,
    conflicts: &mut Vec<Conflict>,
) -> SheetView {
    SheetView {
        frozen_rows: scalar_field(sheet_id, "view.frozenRows", base.frozen_rows, ours.frozen_rows, theirs.frozen_rows, conflicts),
        frozen_cols: scalar_field(sheet_id, "view.frozenCols", base.frozen_cols, ours.frozen_cols, theirs.frozen_cols, conflicts),
        background_image_id: optional_field(
            sheet_id,
            "view.backgroundImageId",
            base.background_image_id.clone(),
            ours.background_image_id.clone(),
            theirs.background_image_id.clone(),
            conflicts,
        ),
        col_widths: merge_sparse(sheet_id, "view.colWidths", &base.col_widths, &ours.col_widths, &theirs.col_widths, conflicts),
        row_heights: merge_sparse(sheet_id, "view.rowHeights", &base.row_heights, &ours.row_heights, &theirs.row_heights, conflicts),
        merged_ranges: merge_merged_ranges(base, ours, theirs),
        drawings: merge_drawings(sheet_id, base, ours, theirs, conflicts),
        default_format: optional_field(
            sheet_id,
            "view.defaultFormat",
            base.default_format.clone(),
            ours.default_format.clone(),
            theirs.default_format.clone(),
            conflicts,
        ),
        row_formats: merge_sparse(sheet_id, "view.rowFormats", &base.row_formats, &ours.row_formats, &theirs.row_formats, conflicts),
        col_formats: merge_sparse(sheet_id, "view.colFormats", &base.col_formats, &ours.col_formats, &theirs.col_formats, conflicts),
        format_runs_by_col: merge_format_runs(sheet_id, base, ours, theirs, conflicts),
    }
}

/// The plain three-way rule: `ours == theirs` wins outright; a side that
/// equals `base` yields to the other side; otherwise diverges, recorded as a
/// conflict, defaulting to `ours` (view state is local UI, §4.5.3).
fn three_way<T: PartialEq + Clone>(base: &T, ours: &T, theirs: &T) -> (T, bool) {
    if ours == theirs {
        (ours.clone(), false)
    } else if base == ours {
        (theirs.clone(), false)
    } else if base == theirs {
        (ours.clone(), false)
    } else {
        (ours.clone(), true)
    }
}

fn scalar_field<T: PartialEq + Clone + Serialize>(
    sheet_id: &SheetId,
    field: &str,
    base: T,
    ours: T,
    theirs: T,
    conflicts: &mut Vec<Conflict>,
) -> T {
    let (value, conflicted) = three_way(&base, &ours, &theirs);
    if conflicted {
        conflicts.push(Conflict::SheetField {
            sheet_id: sheet_id.clone(),
            field: field.to_owned(),
            ours: serde_json::to_value(&ours).unwrap_or(serde_json::Value::Null),
            theirs: serde_json::to_value(&theirs).unwrap_or(serde_json::Value::Null),
        });
    }
    value
}

/// Like [`scalar_field`], but a side missing the field entirely (`None`)
/// means "no change on that side" and is substituted with `base`'s value
/// before the three-way rule runs (§4.5.3 intro paragraph), so a side that
/// never mentions the field never appears to have "cleared" it.
fn optional_field<T: PartialEq + Clone + Serialize>(
    sheet_id: &SheetId,
    field: &str,
    base: Option<T>,
    ours: Option<T>,
    theirs: Option<T>,
    conflicts: &mut Vec<Conflict>,
) -> Option<T> {
    let ours_eff = ours.clone().or_else(|| base.clone());
    let theirs_eff = theirs.clone().or_else(|| base.clone());
    let (value, conflicted) = three_way(&base, &ours_eff, &theirs_eff);
    if conflicted {
        conflicts.push(Conflict::SheetField {
            sheet_id: sheet_id.clone(),
            field: field.to_owned(),
            ours: serde_json::to_value(&ours).unwrap_or(serde_json::Value::Null),
            theirs: serde_json::to_value(&theirs).unwrap_or(serde_json::Value::Null),
        });
    }
    value
}

fn merge_sparse<V: PartialEq + Clone + Serialize>(
    sheet_id: &SheetId,
    field: &str,
    base: &BTreeMap<u32, V>,
    ours: &BTreeMap<u32, V>,
    theirs: &BTreeMap<u32, V>,
    conflicts: &mut Vec<Conflict>,
) -> BTreeMap<u32, V> {
    let mut keys: Vec<u32> = base.keys().chain(ours.keys()).chain(theirs.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();

    let mut result = BTreeMap::new();
    for key in keys {
        let b = base.get(&key).cloned();
        let o = ours.get(&key).cloned();
        let t = theirs.get(&key).cloned();
        let (value, conflicted) = three_way(&b, &o, &t);
        if conflicted {
            conflicts.push(Conflict::SheetField {
                sheet_id: sheet_id.clone(),
                field: format!("{field}.{key}"),
                ours: serde_json::to_value(&o).unwrap_or(serde_json::Value::Null),
                theirs: serde_json::to_value(&t).unwrap_or(serde_json::Value::Null),
            });
        }
        if let Some(value) = value {
            result.insert(key, value);
        }
    }
    result
}

fn merge_format_runs(
    sheet_id: &SheetId,
    base: &SheetView,
    ours: &SheetView,
    theirs: &SheetView,
    conflicts: &mut Vec<Conflict>,
) -> BTreeMap<u32, Vec<FormatRun>> {
    let mut keys: Vec<u32> = base
        .format_runs_by_col
        .keys()
        .chain(ours.format_runs_by_col.keys())
        .chain(theirs.format_runs_by_col.keys())
        .copied()
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut result = BTreeMap::new();
    for col in keys {
        let b = base.format_runs_by_col.get(&col).cloned();
        let o = ours.format_runs_by_col.get(&col).cloned();
        let t = theirs.format_runs_by_col.get(&col).cloned();
        let (value, conflicted) = three_way(&b, &o, &t);
        if conflicted {
            conflicts.push(Conflict::SheetField {
                sheet_id: sheet_id.clone(),
                field: format!("view.formatRunsByCol.{col}"),
                ours: serde_json::to_value(&o).unwrap_or(serde_json::Value::Null),
                theirs: serde_json::to_value(&t).unwrap_or(serde_json::Value::Null),
            });
        }
        // An explicit empty list ("cleared") must survive if any side
        // supplied the field at all (§4.5.3).
        if value.is_some() || o.is_some() || t.is_some() {
            result.insert(col, value.unwrap_or_default());
        }
    }
    result
}

/// Merge `mergedRanges` by rectangle identity, weighted by provenance
/// (base:0, theirs-only addition:1, ours addition or conflict winner:2).
/// Candidates are accepted in ascending `(weight, rect)` order; any
/// candidate overlapping an already-accepted rectangle evicts the earlier
/// one (later wins). Final output is lexicographically sorted (§4.5.3).
fn merge_merged_ranges(base: &SheetView, ours: &SheetView, theirs: &SheetView) -> Option<Vec<Rect>> {
    if base.merged_ranges.is_none() && ours.merged_ranges.is_none() && theirs.merged_ranges.is_none() {
        return None;
    }
    let base_set: Vec<Rect> = base.merged_ranges.clone().unwrap_or_default();
    let ours_set: Vec<Rect> = ours.merged_ranges.clone().unwrap_or_default();
    let theirs_set: Vec<Rect> = theirs.merged_ranges.clone().unwrap_or_default();

    let mut candidates: Vec<WeightedRect> = Vec::new();
    for rect in &base_set {
        candidates.push((RangeProvenance::Base, *rect));
    }
    for rect in &theirs_set {
        if !base_set.contains(rect) {
            candidates.push((RangeProvenance::TheirsOnly, *rect));
        }
    }
    for rect in &ours_set {
        candidates.push((RangeProvenance::OursOrWinner, *rect));
    }

    candidates.sort_by_key(|(provenance, rect)| (provenance.weight(), *rect));

    let mut accepted: Vec<Rect> = Vec::new();
    for (_, rect) in candidates {
        accepted.retain(|existing| !existing.overlaps(rect));
        accepted.push(rect);
    }
    accepted.sort();
    Some(accepted)
}

/// Merge `drawings` by stable id: per-id three-way rule, preferring `ours`
/// on divergence, re-sorted by `(zOrder, id)` (§4.5.3).
fn merge_drawings(
    sheet_id: &SheetId,
    base: &SheetView,
    ours: &SheetView,
    theirs: &SheetView,
    conflicts: &mut Vec<Conflict>,
) -> Option<Vec<Drawing>> {
    if base.drawings.is_none() && ours.drawings.is_none() && theirs.drawings.is_none() {
        return None;
    }
    let by_id = |list: &Option<Vec<Drawing>>| -> BTreeMap<DrawingId, Drawing> {
        list.clone().unwrap_or_default().into_iter().map(|d| (d.id.clone(), d)).collect()
    };
    let base_by_id = by_id(&base.drawings);
    let ours_by_id = by_id(&ours.drawings);
    let theirs_by_id = by_id(&theirs.drawings);

    let mut ids: Vec<&DrawingId> = base_by_id.keys().chain(ours_by_id.keys()).chain(theirs_by_id.keys()).collect();
    ids.sort();
    ids.dedup();

    let mut result = Vec::new();
    for id in ids {
        let b = base_by_id.get(id);
        let o = ours_by_id.get(id);
        let t = theirs_by_id.get(id);
        let resolved = if o == t {
            o.cloned()
        } else if b == o {
            t.cloned()
        } else if b == t {
            o.cloned()
        } else {
            conflicts.push(Conflict::SheetField {
                sheet_id: sheet_id.clone(),
                field: format!("view.drawings.{id:?}"),
                ours: serde_json::to_value(o).unwrap_or(serde_json::Value::Null),
                theirs: serde_json::to_value(t).unwrap_or(serde_json::Value::Null),
            });
            o.cloned()
        };
        if let Some(drawing) = resolved {
            result.push(drawing);
        }
    }
    result.sort_by(|a, b| a.z_order.cmp(&b.z_order).then_with(|| a.id.cmp(&b.id)));
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet_id() -> SheetId {
        SheetId::new("s1").unwrap()
    }

    #[test]
    fn scalar_divergence_prefers_ours() {
        let base = SheetView { frozen_rows: 0, ..Default::default() };
        let ours = SheetView { frozen_rows: 2, ..Default::default() };
        let theirs = SheetView { frozen_rows: 3, ..Default::default() };
        let mut conflicts = Vec::new();
        let merged = merge_view(&sheet_id(), &base, &ours, &theirs, &mut conflicts);
        assert_eq!(merged.frozen_rows, 2);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn col_widths_merge_per_key() {
        let mut base = SheetView::default();
        base.col_widths.insert(0, 10.0);
        let mut ours = base.clone();
        ours.col_widths.insert(1, 20.0);
        let mut theirs = base.clone();
        theirs.col_widths.insert(2, 30.0);
        let mut conflicts = Vec::new();
        let merged = merge_view(&sheet_id(), &base, &ours, &theirs, &mut conflicts);
        assert_eq!(merged.col_widths.len(), 3);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn merged_ranges_later_addition_wins_on_overlap() {
        let mut base = SheetView::default();
        let r1 = Rect { start_row: 0, end_row: 1, start_col: 0, end_col: 1 };
        let r2 = Rect { start_row: 0, end_row: 2, start_col: 0, end_col: 2 };
        base.merged_ranges = Some(vec![r1]);
        let mut ours = base.clone();
        ours.merged_ranges = Some(vec![r1, r2]);
        let theirs = base.clone();
        let mut conflicts = Vec::new();
        let merged = merge_view(&sheet_id(), &base, &ours, &theirs, &mut conflicts);
        assert_eq!(merged.merged_ranges, Some(vec![r2]));
    }

    #[test]
    fn drawings_merge_by_id_no_change_both_sides() {
        let d = Drawing { id: DrawingId::Int(1), z_order: 0, payload: serde_json::json!({}) };
        let mut base = SheetView::default();
        base.drawings = Some(vec![d.clone()]);
        let mut conflicts = Vec::new();
        let merged = merge_view(&sheet_id(), &base, &base, &base, &mut conflicts);
        assert_eq!(merged.drawings, Some(vec![d]));
        assert!(conflicts.is_empty());
    }
}
