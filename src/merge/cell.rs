//! Cell-level merge: move-aware combination of two sheets' cell maps
//! relative to a common base (§4.5.4), then per-cell three-way merge
//! (§4.5.5).

use std::collections::BTreeMap;

use crate::merge::conflict::Conflict;
use crate::model::cell::{content_equal, content_semantically_equal};
use crate::model::move_detect::detect_moves;
use crate::model::types::{Cell, CellContent, SheetId};

/// Merge one sheet's cells (§4.5.4, §4.5.5).
pub(crate) fn merge_cells(
    sheet_id: &SheetId,
    base: &BTreeMap<String, Cell>,
    ours: &BTreeMap<String, Cell>,
    theirs: &BTreeMap<String, Cell>,
    conflicts: &mut Vec<Conflict>,
) -> BTreeMap<String, Cell> {
    let ours_moves = detect_moves(base, ours);
    let theirs_moves = detect_moves(base, theirs);

    // Build a combined move map: ours wins when both sides move the same
    // source to different destinations, after recording the conflict.
    let mut combined: BTreeMap<String, String> = ours_moves.clone();
    for (from, theirs_to) in &theirs_moves {
        match ours_moves.get(from) {
            Some(ours_to) if ours_to != theirs_to => {
                conflicts.push(Conflict::Move {
                    sheet_id: sheet_id.clone(),
                    from: from.clone(),
                    ours_to: ours_to.clone(),
                    theirs_to: theirs_to.clone(),
                });
            }
            Some(_) => {}
            None => {
                combined.insert(from.clone(), theirs_to.clone());
            }
        }
    }

    // Relocate `base` into the merge coordinate system using the combined
    // move map; a destination still unoccupied by either side's own state
    // is what "unchanged vs. base" means here.
    let relocated_base = relocate(base, &combined);
    let relocated_ours = relocate_side(ours, &ours_moves, &combined);
    let relocated_theirs = relocate_side(theirs, &theirs_moves, &combined);

    let mut addresses: Vec<&String> = relocated_base
        .keys()
        .chain(relocated_ours.keys())
        .chain(relocated_theirs.keys())
        .collect();
    addresses.sort();
    addresses.dedup();

    let mut result = BTreeMap::new();
    for addr in addresses {
        let nb = relocated_base.get(addr);
        let no = relocated_ours.get(addr);
        let nt = relocated_theirs.get(addr);
        if let Some(cell) = merge_cell(sheet_id, addr, nb, no, nt, conflicts) {
            result.insert(addr.clone(), cell);
        }
    }
    result
}

/// Move every address in `map` whose source appears in `moves` to its
/// destination, leaving everything else untouched.
fn relocate(map: &BTreeMap<String, Cell>, moves: &BTreeMap<String, String>) -> BTreeMap<String, Cell> {
    let mut result = BTreeMap::new();
    for (addr, cell) in map {
        let dest = moves.get(addr).cloned().unwrap_or_else(|| addr.clone());
        result.insert(dest, cell.clone());
    }
    result
}

/// Relocate one side's own sheet into the combined coordinate system.
///
/// For each address, find the address's true `base` source — either the
/// address itself (untouched by this side's own moves) or the `from` this
/// side moved it from — then look up the *combined* (conflict-resolved)
/// destination for that source. This ensures a side whose own move lost a
/// move-vs-move conflict (§4.5.4) lands at the winning destination instead
/// of at its own discarded one.
fn relocate_side(
    side: &BTreeMap<String, Cell>,
    side_moves: &BTreeMap<String, String>,
    combined: &BTreeMap<String, String>,
) -> BTreeMap<String, Cell> {
    let mut result = BTreeMap::new();
    for (addr, cell) in side {
        let source = side_moves
            .iter()
            .find(|(_, to)| *to == addr)
            .map_or_else(|| addr.clone(), |(from, _)| from.clone());
        let dest = combined.get(&source).cloned().unwrap_or(source);
        result.insert(dest, cell.clone());
    }
    result
}

/// Per-cell three-way merge (§4.5.5). Returns `None` when the merged cell
/// is absent.
fn merge_cell(
    sheet_id: &SheetId,
    address: &str,
    nb: Option<&Cell>,
    no: Option<&Cell>,
    nt: Option<&Cell>,
    conflicts: &mut Vec<Conflict>,
) -> Option<Cell> {
    if cells_full_eq(no, nt) {
        return no.cloned();
    }
    if cells_full_eq(nb, no) {
        return nt.cloned();
    }
    if cells_full_eq(nb, nt) {
        return no.cloned();
    }

    let base_present = nb.is_some() && !is_effectively_absent(nb);
    if base_present && (no.is_none() || nt.is_none()) {
        let ours_deleted = no.is_none();
        let theirs_deleted = nt.is_none();
        if ours_deleted != theirs_deleted {
            conflicts.push(Conflict::DeleteVsEdit {
                sheet_id: sheet_id.clone(),
                address: address.to_owned(),
                ours_deleted,
                theirs_deleted,
            });
            return if ours_deleted { None } else { no.cloned() };
        }
    }

    let content = resolve_content(sheet_id, address, nb, no, nt, conflicts);
    let format = resolve_format(sheet_id, address, nb, no, nt, content.is_some(), conflicts);

    match (content, format) {
        (None, None) => None,
        (Some(content), format) => Some(Cell { content, format }),
        (None, Some(format)) => Some(Cell { content: CellContent::Empty, format: Some(format) }),
    }
}

fn is_effectively_absent(cell: Option<&Cell>) -> bool {
    matches!(cell, None) || matches!(cell, Some(Cell { content: CellContent::Empty, format: None }))
}

fn cells_full_eq(a: Option<&Cell>, b: Option<&Cell>) -> bool {
    crate::model::cell::cells_equal(a, b)
}

/// Resolve the content half of a cell (value/formula/encryption), recording
/// a `cell/content` conflict when both sides changed it to non-equivalent
/// content.
fn resolve_content(
    sheet_id: &SheetId,
    address: &str,
    nb: Option<&Cell>,
    no: Option<&Cell>,
    nt: Option<&Cell>,
    conflicts: &mut Vec<Conflict>,
) -> Option<CellContent> {
    if content_equal(no, nt) {
        return no.map(|c| c.content.clone());
    }
    let ours_changed = !content_equal(nb, no);
    let theirs_changed = !content_equal(nb, nt);
    match (ours_changed, theirs_changed) {
        (true, false) => no.map(|c| c.content.clone()),
        (false, true) => nt.map(|c| c.content.clone()),
        (false, false) => nb.map(|c| c.content.clone()),
        (true, true) => {
            if content_semantically_equal(no, nt) {
                no.map(|c| c.content.clone())
            } else {
                conflicts.push(Conflict::CellContent {
                    sheet_id: sheet_id.clone(),
                    address: address.to_owned(),
                    ours: no.cloned(),
                    theirs: nt.cloned(),
                });
                no.map(|c| c.content.clone())
            }
        }
    }
}

/// Resolve the format half of a cell via per-key three-way, recording a
/// `cell/format` conflict on divergence — but only when there was no
/// accompanying content conflict for this address (§4.5.5: "only one of
/// content/format conflicts is reported per cell, with content preferred").
fn resolve_format(
    sheet_id: &SheetId,
    address: &str,
    nb: Option<&Cell>,
    no: Option<&Cell>,
    nt: Option<&Cell>,
    had_content_conflict: bool,
    conflicts: &mut Vec<Conflict>,
) -> Option<serde_json::Value> {
    let base_fmt = nb.and_then(|c| c.format.clone());
    let ours_fmt = no.and_then(|c| c.format.clone());
    let theirs_fmt = nt.and_then(|c| c.format.clone());

    if ours_fmt == theirs_fmt {
        return ours_fmt;
    }
    if base_fmt == ours_fmt {
        return theirs_fmt;
    }
    if base_fmt == theirs_fmt {
        return ours_fmt;
    }

    let merged = merge_format_objects(&base_fmt, &ours_fmt, &theirs_fmt);
    if !had_content_conflict {
        conflicts.push(Conflict::CellFormat {
            sheet_id: sheet_id.clone(),
            address: address.to_owned(),
            ours: ours_fmt,
            theirs: theirs_fmt,
        });
    }
    merged
}

/// Per-key three-way merge of two format objects, defaulting to `ours` on a
/// divergent key.
fn merge_format_objects(
    base: &Option<serde_json::Value>,
    ours: &Option<serde_json::Value>,
    theirs: &Option<serde_json::Value>,
) -> Option<serde_json::Value> {
    let (Some(serde_json::Value::Object(b)), Some(serde_json::Value::Object(o)), Some(serde_json::Value::Object(t))) =
        (base, ours, theirs)
    else {
        return ours.clone().or_else(|| theirs.clone());
    };

    let mut keys: Vec<&String> = b.keys().chain(o.keys()).chain(t.keys()).collect();
    keys.sort();
    keys.dedup();

    let mut result = serde_json::Map::new();
    for key in keys {
        let bv = b.get(key);
        let ov = o.get(key);
        let tv = t.get(key);
        let resolved = if ov == tv {
            ov
        } else if bv == ov {
            tv
        } else if bv == tv {
            ov
        } else {
            ov
        };
        if let Some(value) = resolved {
            result.insert(key.clone(), value.clone());
        }
    }
    if result.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::ScalarValue;

    fn sheet_id() -> SheetId {
        SheetId::new("s1").unwrap()
    }

    fn value_cell(s: &str) -> Cell {
        Cell { content: CellContent::Value { value: ScalarValue::Text(s.to_owned()) }, format: None }
    }

    #[test]
    fn move_plus_edit_harmony() {
        let mut base = BTreeMap::new();
        base.insert("A1".to_owned(), value_cell("x"));
        let mut ours = BTreeMap::new();
        ours.insert("B2".to_owned(), value_cell("x"));
        let mut theirs = BTreeMap::new();
        theirs.insert(
            "A1".to_owned(),
            Cell { content: CellContent::Value { value: ScalarValue::Text("x".to_owned()) }, format: Some(serde_json::json!({"bold": true})) },
        );

        let mut conflicts = Vec::new();
        let merged = merge_cells(&sheet_id(), &base, &ours, &theirs, &mut conflicts);
        assert!(conflicts.is_empty());
        assert_eq!(merged.len(), 1);
        let cell = &merged["B2"];
        assert_eq!(cell.content, CellContent::Value { value: ScalarValue::Text("x".to_owned()) });
        assert_eq!(cell.format, Some(serde_json::json!({"bold": true})));
    }

    #[test]
    fn move_vs_move_conflict_keeps_ours_destination() {
        let mut base = BTreeMap::new();
        base.insert("A1".to_owned(), value_cell("x"));
        let mut ours = BTreeMap::new();
        ours.insert("B2".to_owned(), value_cell("x"));
        let mut theirs = BTreeMap::new();
        theirs.insert("C3".to_owned(), value_cell("x"));

        let mut conflicts = Vec::new();
        let merged = merge_cells(&sheet_id(), &base, &ours, &theirs, &mut conflicts);
        assert_eq!(conflicts.len(), 1);
        assert!(matches!(conflicts[0], Conflict::Move { .. }));
        assert!(merged.contains_key("B2"));
        assert!(!merged.contains_key("C3"));
    }

    #[test]
    fn same_edit_both_sides_is_not_a_conflict() {
        let mut base = BTreeMap::new();
        base.insert("A1".to_owned(), value_cell("old"));
        let mut ours = BTreeMap::new();
        ours.insert("A1".to_owned(), value_cell("new"));
        let theirs = ours.clone();

        let mut conflicts = Vec::new();
        let merged = merge_cells(&sheet_id(), &base, &ours, &theirs, &mut conflicts);
        assert!(conflicts.is_empty());
        assert_eq!(merged["A1"], value_cell("new"));
    }

    #[test]
    fn concurrent_content_conflict_defaults_to_ours() {
        let mut base = BTreeMap::new();
        base.insert("A1".to_owned(), value_cell("1"));
        let mut ours = BTreeMap::new();
        ours.insert("A1".to_owned(), value_cell("2"));
        let mut theirs = BTreeMap::new();
        theirs.insert("A1".to_owned(), value_cell("3"));

        let mut conflicts = Vec::new();
        let merged = merge_cells(&sheet_id(), &base, &ours, &theirs, &mut conflicts);
        assert_eq!(conflicts.len(), 1);
        assert!(matches!(conflicts[0], Conflict::CellContent { .. }));
        assert_eq!(merged["A1"], value_cell("2"));
    }

    #[test]
    fn format_only_change_one_side_content_other_no_collision() {
        let base = value_cell("x");
        let mut base_map = BTreeMap::new();
        base_map.insert("A1".to_owned(), base);
        let mut ours = BTreeMap::new();
        ours.insert(
            "A1".to_owned(),
            Cell { content: CellContent::Value { value: ScalarValue::Text("x".to_owned()) }, format: Some(serde_json::json!({"bold": true})) },
        );
        let mut theirs = BTreeMap::new();
        theirs.insert("A1".to_owned(), value_cell("y"));

        let mut conflicts = Vec::new();
        let merged = merge_cells(&sheet_id(), &base_map, &ours, &theirs, &mut conflicts);
        assert!(conflicts.is_empty());
        let cell = &merged["A1"];
        assert_eq!(cell.content, CellContent::Value { value: ScalarValue::Text("y".to_owned()) });
        assert_eq!(cell.format, Some(serde_json::json!({"bold": true})));
    }
}
