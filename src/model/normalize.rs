//! The normalizer (§4.1).
//!
//! `normalize` is a total function: it accepts legacy v0 payloads
//! (`{sheets: {sheetId -> cellMap}}`), valid or partial v1 payloads, and
//! arbitrary object graphs (as stores rebuild state), and always returns a
//! [`DocumentState`] satisfying every invariant in `spec.md` §3. It never
//! fails — malformed sub-fields are sanitized away, not rejected.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::cell::normalize_cell;
use super::types::{
    Cell, CellContent, DocumentState, Drawing, DrawingId, EncryptedPayload, FormatRun, Rect,
    ScalarValue, SheetId, SheetMeta, SheetView, Sheets, Visibility,
};

/// Normalize an arbitrary input value into a valid [`DocumentState`] (§4.1).
///
/// Total: never fails, never panics on malformed input.
#[must_use]
pub fn normalize(input: &Value) -> DocumentState {
    let obj = input.as_object();

    let raw_sheets_field = obj.and_then(|o| o.get("sheets"));
    let is_v1_shape = matches!(
        raw_sheets_field,
        Some(Value::Object(m)) if m.contains_key("order") || m.contains_key("metaById")
    );

    // ------------------------------------------------------------------
    // 1. Cells: legacy v0 lifts `sheets` directly; v1 reads `cells`.
    // ------------------------------------------------------------------
    let mut cells: BTreeMap<SheetId, BTreeMap<String, Cell>> = BTreeMap::new();
    let mut cells_insertion_order: Vec<SheetId> = Vec::new();

    let cell_source: Option<&Map<String, Value>> = if is_v1_shape {
        obj.and_then(|o| o.get("cells")).and_then(Value::as_object)
    } else {
        raw_sheets_field.and_then(Value::as_object)
    };

    if let Some(map) = cell_source {
        for (sheet_id_str, cell_map_value) in map {
            let Ok(sheet_id) = SheetId::new(sheet_id_str) else {
                continue;
            };
            let normalized_map = normalize_cell_map(cell_map_value);
            cells_insertion_order.push(sheet_id.clone());
            cells.insert(sheet_id, normalized_map);
        }
    }

    // ------------------------------------------------------------------
    // 2. Sheet metadata: rebuilt from scratch even for v1 input (§4.1).
    // ------------------------------------------------------------------
    let raw_meta_by_id = if is_v1_shape {
        raw_sheets_field
            .and_then(Value::as_object)
            .and_then(|m| m.get("metaById"))
            .and_then(Value::as_object)
    } else {
        None
    };

    let mut meta_insertion_order: Vec<SheetId> = Vec::new();
    let mut sanitized_meta: BTreeMap<SheetId, SheetMeta> = BTreeMap::new();

    if let Some(map) = raw_meta_by_id {
        for (sheet_id_str, meta_value) in map {
            let Ok(sheet_id) = SheetId::new(sheet_id_str) else {
                continue;
            };
            let meta = sanitize_sheet_meta(sheet_id.clone(), meta_value);
            meta_insertion_order.push(sheet_id.clone());
            sanitized_meta.insert(sheet_id, meta);
        }
    }

    // ------------------------------------------------------------------
    // 3. Union of sheet ids; default meta for ids missing one.
    // ------------------------------------------------------------------
    let known_ids: BTreeSet<SheetId> = cells.keys().chain(sanitized_meta.keys()).cloned().collect();

    for id in &known_ids {
        sanitized_meta
            .entry(id.clone())
            .or_insert_with(|| SheetMeta::empty(id.clone()));
        cells.entry(id.clone()).or_default();
    }

    // ------------------------------------------------------------------
    // 4. Order: original v1 order entries (deduped, known ids only), then
    //    remaining ids in insertion order of metaById, then any leftover
    //    cell-only ids in their insertion order.
    // ------------------------------------------------------------------
    let raw_order: Vec<SheetId> = if is_v1_shape {
        raw_sheets_field
            .and_then(Value::as_object)
            .and_then(|m| m.get("order"))
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| SheetId::new(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let mut order: Vec<SheetId> = Vec::new();
    let mut seen: BTreeSet<SheetId> = BTreeSet::new();
    for id in raw_order {
        if known_ids.contains(&id) && seen.insert(id.clone()) {
            order.push(id);
        }
    }
    for id in meta_insertion_order.into_iter().chain(cells_insertion_order) {
        if seen.insert(id.clone()) {
            order.push(id);
        }
    }
    // Any id that came only from an `or_insert_with` default (legacy path
    // where metaById was absent entirely) is still covered by
    // `cells_insertion_order` above.

    DocumentState {
        schema_version: 1,
        sheets: Sheets {
            order,
            meta_by_id: sanitized_meta,
        },
        cells,
        metadata: opaque_map(obj, "metadata"),
        named_ranges: opaque_map(obj, "namedRanges"),
        comments: opaque_map(obj, "comments"),
    }
}

fn opaque_map(obj: Option<&Map<String, Value>>, key: &str) -> BTreeMap<String, Value> {
    obj.and_then(|o| o.get(key))
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn normalize_cell_map(value: &Value) -> BTreeMap<String, Cell> {
    let mut out = BTreeMap::new();
    let Some(map) = value.as_object() else {
        return out;
    };
    for (addr, cell_value) in map {
        let cell = cell_from_value(cell_value);
        if let Some(normalized) = normalize_cell(&cell) {
            out.insert(addr.clone(), normalized);
        }
    }
    out
}

/// Best-effort extraction of a [`Cell`] from an arbitrary JSON value,
/// tolerating legacy shapes (`{value: ...}`, `{formula: ...}`, a bare
/// scalar) as well as our own tagged `Cell` serialization.
fn cell_from_value(value: &Value) -> Cell {
    if let Ok(cell) = serde_json::from_value::<Cell>(value.clone()) {
        return cell;
    }
    let Some(map) = value.as_object() else {
        return scalar_from_value(value)
            .map(|value| Cell { content: CellContent::Value { value }, format: None })
            .unwrap_or_default();
    };
    let format = map.get("format").cloned();
    if let Some(marker) = map.get("encryptionMarker").and_then(Value::as_str) {
        let blob = map
            .get("blob")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return Cell {
            content: CellContent::Encrypted {
                payload: EncryptedPayload {
                    marker: marker.to_owned(),
                    blob,
                },
            },
            format,
        };
    }
    if let Some(formula) = map.get("formula").and_then(Value::as_str) {
        return Cell {
            content: CellContent::Formula { formula: formula.to_owned() },
            format,
        };
    }
    if let Some(v) = map.get("value") {
        if let Some(scalar) = scalar_from_value(v) {
            return Cell { content: CellContent::Value { value: scalar }, format };
        }
    }
    Cell { content: CellContent::Empty, format }
}

fn scalar_from_value(v: &Value) -> Option<ScalarValue> {
    match v {
        Value::Number(n) => n.as_f64().map(ScalarValue::Number),
        Value::String(s) => Some(ScalarValue::Text(s.clone())),
        Value::Bool(b) => Some(ScalarValue::Bool(*b)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sheet metadata sanitization
// ---------------------------------------------------------------------------

fn sanitize_sheet_meta(id: SheetId, raw: &Value) -> SheetMeta {
    let Some(map) = raw.as_object() else {
        return SheetMeta::empty(id);
    };

    let display_name = match map.get("displayName").or_else(|| map.get("display_name")) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) => None,
        _ => Some(id.as_str().to_owned()),
    };

    let view = map
        .get("view")
        .map(sanitize_view)
        .unwrap_or_default();

    let visibility = map.get("visibility").and_then(Value::as_str).and_then(|s| match s {
        "visible" => Some(Visibility::Visible),
        "hidden" => Some(Visibility::Hidden),
        "very_hidden" | "veryHidden" => Some(Visibility::VeryHidden),
        _ => None,
    });

    let tab_color = sanitize_tab_color(map.get("tabColor").or_else(|| map.get("tab_color")));

    SheetMeta { id, display_name, view, visibility, tab_color }
}

fn sanitize_tab_color(raw: Option<&Value>) -> Option<Option<String>> {
    match raw {
        Some(Value::Null) => Some(None),
        Some(Value::String(s)) if is_argb_hex(s) => Some(Some(s.to_uppercase())),
        _ => None,
    }
}

fn is_argb_hex(s: &str) -> bool {
    s.len() == 8 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn sanitize_view(raw: &Value) -> SheetView {
    let Some(map) = raw.as_object() else {
        return SheetView::default();
    };

    SheetView {
        frozen_rows: coerce_non_negative_int(map.get("frozenRows")),
        frozen_cols: coerce_non_negative_int(map.get("frozenCols")),
        background_image_id: sanitize_background_image_id(map.get("backgroundImageId")),
        col_widths: sanitize_index_number_map(map.get("colWidths")),
        row_heights: sanitize_index_number_map(map.get("rowHeights")),
        merged_ranges: sanitize_merged_ranges(map),
        drawings: sanitize_drawings(map.get("drawings")),
        default_format: map
            .get("defaultFormat")
            .cloned()
            .filter(|v| !is_empty_object(v)),
        row_formats: sanitize_index_format_map(map.get("rowFormats")),
        col_formats: sanitize_index_format_map(map.get("colFormats")),
        format_runs_by_col: sanitize_format_runs_by_col(map.get("formatRunsByCol")),
    }
}

fn is_empty_object(v: &Value) -> bool {
    matches!(v, Value::Object(m) if m.is_empty()) || v.is_null()
}

fn coerce_non_negative_int(raw: Option<&Value>) -> u32 {
    match raw.and_then(Value::as_f64) {
        Some(n) if n.is_finite() && n > 0.0 => n as u32,
        _ => 0,
    }
}

fn sanitize_background_image_id(raw: Option<&Value>) -> Option<Option<String>> {
    match raw {
        Some(Value::Null) => Some(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Some(trimmed.to_owned()))
            }
        }
        _ => None,
    }
}

/// Accepts a map, an array of `[index, size]`, or an array of
/// `{index, size}`. Drops non-integer, negative, zero, or non-finite sizes.
fn sanitize_index_number_map(raw: Option<&Value>) -> BTreeMap<u32, f64> {
    let mut out = BTreeMap::new();
    let Some(raw) = raw else { return out };
    match raw {
        Value::Object(map) => {
            for (k, v) in map {
                if let (Some(idx), Some(size)) = (parse_index(k), v.as_f64()) {
                    insert_valid_size(&mut out, idx, size);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let (idx, size) = match item {
                    Value::Array(pair) if pair.len() == 2 => (
                        pair[0].as_u64().and_then(|n| u32::try_from(n).ok()),
                        pair[1].as_f64(),
                    ),
                    Value::Object(m) => (
                        m.get("index").and_then(Value::as_u64).and_then(|n| u32::try_from(n).ok()),
                        m.get("size").and_then(Value::as_f64),
                    ),
                    _ => (None, None),
                };
                if let (Some(idx), Some(size)) = (idx, size) {
                    insert_valid_size(&mut out, idx, size);
                }
            }
        }
        _ => {}
    }
    out
}

fn insert_valid_size(out: &mut BTreeMap<u32, f64>, idx: u32, size: f64) {
    if size.is_finite() && size > 0.0 {
        out.insert(idx, size);
    }
}

fn parse_index(s: &str) -> Option<u32> {
    s.parse::<u32>().ok()
}

fn sanitize_index_format_map(raw: Option<&Value>) -> BTreeMap<u32, Value> {
    let mut out = BTreeMap::new();
    let Some(Value::Object(map)) = raw else { return out };
    for (k, v) in map {
        if is_empty_object(v) {
            continue;
        }
        if let Some(idx) = parse_index(k) {
            out.insert(idx, v.clone());
        }
    }
    out
}

/// Accepts several aliases and coordinate shapes; see §4.1 "mergedRanges".
fn sanitize_merged_ranges(map: &Map<String, Value>) -> Option<Vec<Rect>> {
    let raw = map
        .get("mergedRanges")
        .or_else(|| map.get("mergedCells"))
        .or_else(|| map.get("merged_cells"))
        .or_else(|| map.get("mergedRegions"))?;
    let items = raw.as_array()?;

    let mut candidates: Vec<Rect> = Vec::new();
    for item in items {
        if let Some(rect) = rect_from_value(item) {
            if !rect.is_single_cell() {
                candidates.push(rect);
            }
        }
    }

    // Remove entries overlapping earlier entries — later wins.
    let mut accepted: Vec<Rect> = Vec::new();
    for candidate in candidates {
        accepted.retain(|r| !r.overlaps(candidate));
        accepted.push(candidate);
    }
    accepted.sort();
    accepted.dedup();
    Some(accepted)
}

fn rect_from_value(v: &Value) -> Option<Rect> {
    let (mut sr, mut er, mut sc, mut ec);
    if let Some(m) = v.as_object() {
        sr = m.get("startRow").and_then(Value::as_u64)?;
        er = m.get("endRow").and_then(Value::as_u64)?;
        sc = m.get("startCol").and_then(Value::as_u64)?;
        ec = m.get("endCol").and_then(Value::as_u64)?;
    } else if let Some(arr) = v.as_array() {
        if arr.len() != 4 {
            return None;
        }
        sr = arr[0].as_u64()?;
        sc = arr[1].as_u64()?;
        er = arr[2].as_u64()?;
        ec = arr[3].as_u64()?;
    } else {
        return None;
    }
    if sr > er {
        std::mem::swap(&mut sr, &mut er);
    }
    if sc > ec {
        std::mem::swap(&mut sc, &mut ec);
    }
    Some(Rect {
        start_row: u32::try_from(sr).ok()?,
        end_row: u32::try_from(er).ok()?,
        start_col: u32::try_from(sc).ok()?,
        end_col: u32::try_from(ec).ok()?,
    })
}

fn sanitize_drawings(raw: Option<&Value>) -> Option<Vec<Drawing>> {
    let items = raw?.as_array()?;
    let mut out: Vec<Drawing> = items.iter().filter_map(drawing_from_value).collect();
    out.sort_by(|a, b| a.z_order.cmp(&b.z_order).then_with(|| a.id.cmp(&b.id)));
    Some(out)
}

fn drawing_from_value(v: &Value) -> Option<Drawing> {
    let map = v.as_object()?;
    let id = drawing_id_from_value(map.get("id")?)?;
    let z_order = map.get("zOrder").and_then(Value::as_i64).unwrap_or(0);
    Some(Drawing { id, z_order, payload: v.clone() })
}

fn drawing_id_from_value(v: &Value) -> Option<DrawingId> {
    match v {
        Value::Number(n) => {
            let i = n.as_i64()?;
            (i.unsigned_abs() < (1u64 << 53)).then_some(DrawingId::Int(i))
        }
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty() && trimmed.len() <= 4096)
                .then(|| DrawingId::Text(trimmed.to_owned()))
        }
        _ => None,
    }
}

/// Accepts a map of `col -> runs`, an array of `{col, runs}`, or an array of
/// `[col, runs]`.
fn sanitize_format_runs_by_col(raw: Option<&Value>) -> BTreeMap<u32, Vec<FormatRun>> {
    let mut out = BTreeMap::new();
    let Some(raw) = raw else { return out };

    let mut entries: Vec<(u32, Vec<FormatRun>)> = Vec::new();
    match raw {
        Value::Object(map) => {
            for (k, v) in map {
                if let Some(col) = parse_index(k) {
                    entries.push((col, runs_from_value(v)));
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let (col, runs) = match item {
                    Value::Object(m) => (
                        m.get("col").and_then(Value::as_u64).and_then(|n| u32::try_from(n).ok()),
                        m.get("runs").map(runs_from_value).unwrap_or_default(),
                    ),
                    Value::Array(pair) if pair.len() == 2 => (
                        pair[0].as_u64().and_then(|n| u32::try_from(n).ok()),
                        runs_from_value(&pair[1]),
                    ),
                    _ => (None, Vec::new()),
                };
                if let Some(col) = col {
                    entries.push((col, runs));
                }
            }
        }
        _ => {}
    }

    for (col, runs) in entries {
        out.insert(col, runs);
    }
    out
}

fn runs_from_value(raw: &Value) -> Vec<FormatRun> {
    let Some(items) = raw.as_array() else { return Vec::new() };
    let mut runs: Vec<FormatRun> = items
        .iter()
        .filter_map(|item| {
            let m = item.as_object()?;
            let start = m.get("startRow").and_then(Value::as_u64)?;
            let end = m.get("endRowExclusive").and_then(Value::as_u64)?;
            let format = m.get("format").cloned()?;
            if end <= start || is_empty_object(&format) {
                return None;
            }
            Some(FormatRun {
                start_row: u32::try_from(start).ok()?,
                end_row_exclusive: u32::try_from(end).ok()?,
                format,
            })
        })
        .collect();
    runs.sort_by_key(|r| r.start_row);
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_legacy_v0_lifts_cells() {
        let input = json!({
            "sheets": {
                "s1": { "A1": { "value": 1.0 } }
            }
        });
        let state = normalize(&input);
        assert_eq!(state.schema_version, 1);
        assert_eq!(state.sheets.order, vec![SheetId::new("s1").unwrap()]);
        assert!(state.cells.contains_key(&SheetId::new("s1").unwrap()));
        let cell = &state.cells[&SheetId::new("s1").unwrap()]["A1"];
        assert_eq!(cell.content, CellContent::Value { value: ScalarValue::Number(1.0) });
    }

    #[test]
    fn normalize_is_idempotent() {
        let input = json!({
            "sheets": { "s1": { "A1": { "formula": "  =A2+A3  " } } }
        });
        let once = normalize(&input);
        let once_json = serde_json::to_value(&once).unwrap();
        let twice = normalize(&once_json);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_empty_input_yields_empty_document() {
        let state = normalize(&json!({}));
        assert_eq!(state, DocumentState::empty());
    }

    #[test]
    fn normalize_drops_degenerate_merged_range() {
        let input = json!({
            "cells": {},
            "sheets": {
                "order": ["s1"],
                "metaById": {
                    "s1": { "view": { "mergedRanges": [
                        {"startRow":0,"endRow":0,"startCol":0,"endCol":0},
                        {"startRow":0,"endRow":1,"startCol":0,"endCol":1}
                    ]}}
                }
            }
        });
        let state = normalize(&input);
        let meta = &state.sheets.meta_by_id[&SheetId::new("s1").unwrap()];
        let ranges = meta.view.merged_ranges.as_ref().unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].end_row, 1);
    }

    #[test]
    fn normalize_later_merged_range_wins_on_overlap() {
        let input = json!({
            "cells": {},
            "sheets": {
                "order": ["s1"],
                "metaById": {
                    "s1": { "view": { "mergedRanges": [
                        {"startRow":0,"endRow":1,"startCol":0,"endCol":1},
                        {"startRow":1,"endRow":2,"startCol":1,"endCol":2}
                    ]}}
                }
            }
        });
        let state = normalize(&input);
        let meta = &state.sheets.meta_by_id[&SheetId::new("s1").unwrap()];
        let ranges = meta.view.merged_ranges.as_ref().unwrap();
        // First range overlaps the second (shares cell (1,1)); later wins.
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_row, 1);
    }

    #[test]
    fn normalize_tab_color_uppercases() {
        let input = json!({
            "cells": {},
            "sheets": {
                "order": ["s1"],
                "metaById": { "s1": { "tabColor": "ff00ff00" } }
            }
        });
        let state = normalize(&input);
        let meta = &state.sheets.meta_by_id[&SheetId::new("s1").unwrap()];
        assert_eq!(meta.tab_color, Some(Some("FF00FF00".to_owned())));
    }

    #[test]
    fn normalize_invalid_visibility_omitted() {
        let input = json!({
            "cells": {},
            "sheets": {
                "order": ["s1"],
                "metaById": { "s1": { "visibility": "bogus" } }
            }
        });
        let state = normalize(&input);
        let meta = &state.sheets.meta_by_id[&SheetId::new("s1").unwrap()];
        assert_eq!(meta.visibility, None);
    }

    #[test]
    fn normalize_drawings_sorted_by_z_then_id() {
        let input = json!({
            "cells": {},
            "sheets": {
                "order": ["s1"],
                "metaById": { "s1": { "view": { "drawings": [
                    {"id": 2, "zOrder": 1},
                    {"id": 1, "zOrder": 1},
                    {"id": 5, "zOrder": 0}
                ]}}}
            }
        });
        let state = normalize(&input);
        let meta = &state.sheets.meta_by_id[&SheetId::new("s1").unwrap()];
        let drawings = meta.view.drawings.as_ref().unwrap();
        let ids: Vec<_> = drawings.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![DrawingId::Int(5), DrawingId::Int(1), DrawingId::Int(2)]);
    }

    #[test]
    fn cells_has_no_keys_outside_meta_by_id() {
        let input = json!({ "sheets": { "s1": {}, "s2": { "A1": {"value": 1.0}} } });
        let state = normalize(&input);
        for id in state.cells.keys() {
            assert!(state.sheets.meta_by_id.contains_key(id));
        }
        for id in state.sheets.meta_by_id.keys() {
            assert!(state.cells.contains_key(id));
        }
    }
}
