//! Conflict resolver (§4.6): `applyResolutions(mergeResult, resolutions)`.
//!
//! The merge engine (§4.5) already defaults every conflict to `ours`, so
//! resolving a conflict `Ours` is a no-op; `Theirs` and `Manual` rewrite the
//! merged state at the conflict's location. Resolutions are applied in list
//! order; a later resolution for an already-seen conflict index overwrites
//! the earlier one (last-wins — the Open Question resolution recorded in
//! `DESIGN.md`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConflictResolverError;
use crate::merge::{Conflict, KeyedMapName, MergeResult};
use crate::model::types::{Cell, DocumentState, SheetId, SheetMeta};

/// Which side of a conflict to take, or a manually supplied value (§4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    /// Keep the merge's default (already `ours`); a no-op.
    Ours,
    /// Replace with `theirs`'s value at the time of the conflict.
    Theirs,
    /// Replace with a caller-supplied value.
    Manual,
}

/// A manually supplied replacement value, shaped to match one conflict kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManualPayload {
    /// Replacement for a workbook-level keyed-map entry; `None` deletes it.
    KeyedMapValue(Option<serde_json::Value>),
    /// Replacement sheet display name.
    SheetName(Option<String>),
    /// Replacement full sheet state (meta and cells); `None` deletes the
    /// sheet.
    SheetState {
        /// The replacement metadata, if the sheet survives.
        meta: Option<SheetMeta>,
        /// The replacement cell map, if the sheet survives.
        #[serde(default)]
        cells: BTreeMap<String, Cell>,
    },
    /// Replacement sheet order (only sheet ids already present in the
    /// merged state are honored; missing ones are appended).
    Order(Vec<SheetId>),
    /// Replacement value for the dotted sheet-view field path named in
    /// `Conflict::SheetField::field`.
    SheetFieldValue(serde_json::Value),
    /// Replacement for the destination address of a move.
    Address(String),
    /// Replacement cell, `None` meaning the cell is absent.
    CellContent(Option<Cell>),
    /// Replacement format, `None` meaning no format.
    CellFormat(Option<serde_json::Value>),
}

/// One caller-supplied resolution for a single conflict, by its index in
/// the merge preview's conflict list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Index into `MergeResult::conflicts`.
    pub conflict_index: usize,
    /// Which side (or manual value) to take.
    pub choice: ResolutionChoice,
    /// Required when `choice == Manual`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManualPayload>,
}

/// Apply a set of resolutions to a merge result, returning the resulting
/// document state.
///
/// `ours`/`theirs` are the same document states passed to
/// [`crate::merge::merge`] — needed because several conflict kinds do not
/// carry enough of `theirs`'s side inline to reconstruct it (full sheet
/// state on deletion, full cell content on a deletion-vs-edit conflict,
/// sheet ordering).
///
/// # Errors
/// Returns [`ConflictResolverError`] if a resolution's index is in range
/// but its manual payload does not match the shape the conflict at that
/// index requires, or if a manual address resolution names an address with
/// no corresponding source cell.
pub fn apply_resolutions(
    merge_result: &MergeResult,
    ours: &DocumentState,
    theirs: &DocumentState,
    resolutions: &[Resolution],
) -> Result<DocumentState, ConflictResolverError> {
    let mut state = merge_result.merged.clone();

    // Last-wins: a later resolution for the same index overwrites an
    // earlier one, so only the last one per index is applied.
    let mut by_index: BTreeMap<usize, &Resolution> = BTreeMap::new();
    for r in resolutions {
        by_index.insert(r.conflict_index, r);
    }

    for (&index, resolution) in &by_index {
        let Some(conflict) = merge_result.conflicts.get(index) else {
            continue;
        };
        if resolution.choice == ResolutionChoice::Ours {
            continue;
        }
        apply_one(&mut state, conflict, resolution, ours, theirs)?;
    }

    Ok(state)
}

#[allow(clippy::too_many_lines)]
fn apply_one(
    state: &mut DocumentState,
    conflict: &Conflict,
    resolution: &Resolution,
    ours: &DocumentState,
    theirs: &DocumentState,
) -> Result<(), ConflictResolverError> {
    let index = resolution.conflict_index;
    match conflict {
        Conflict::KeyedMap { map, key, theirs: theirs_value, .. } => {
            let value = match resolution.choice {
                ResolutionChoice::Theirs => theirs_value.clone(),
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::KeyedMapValue(v)) => v.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "keyed_map_value" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            let target = keyed_map_mut(state, *map);
            match value {
                Some(v) => {
                    target.insert(key.clone(), v);
                }
                None => {
                    target.remove(key);
                }
            }
        }

        Conflict::SheetRename { sheet_id, theirs: theirs_name, .. } => {
            let name = match resolution.choice {
                ResolutionChoice::Theirs => theirs_name.clone(),
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::SheetName(n)) => n.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "sheet_name" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            if let Some(meta) = state.sheets.meta_by_id.get_mut(sheet_id) {
                meta.display_name = name;
            }
        }

        Conflict::SheetPresence { sheet_id, theirs_deleted, .. } => {
            let (new_meta, new_cells) = match resolution.choice {
                ResolutionChoice::Theirs => {
                    if *theirs_deleted {
                        (None, BTreeMap::new())
                    } else {
                        let meta = theirs.sheets.meta_by_id.get(sheet_id).cloned();
                        let cells = theirs.cells.get(sheet_id).cloned().unwrap_or_default();
                        (meta, cells)
                    }
                }
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::SheetState { meta, cells }) => (meta.clone(), cells.clone()),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "sheet_state" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            set_sheet(state, sheet_id, new_meta, new_cells);
        }

        Conflict::SheetOrder => {
            let new_order = match resolution.choice {
                ResolutionChoice::Theirs => theirs.sheets.order.clone(),
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::Order(order)) => order.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "order" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            let surviving: Vec<SheetId> = state.sheets.meta_by_id.keys().cloned().collect();
            let mut order: Vec<SheetId> = new_order.into_iter().filter(|id| state.sheets.meta_by_id.contains_key(id)).collect();
            for id in surviving {
                if !order.contains(&id) {
                    order.push(id);
                }
            }
            state.sheets.order = order;
        }

        Conflict::SheetField { sheet_id, field, theirs: theirs_value, .. } => {
            let value = match resolution.choice {
                ResolutionChoice::Theirs => theirs_value.clone(),
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::SheetFieldValue(v)) => v.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "sheet_field_value" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            if let Some(meta) = state.sheets.meta_by_id.get_mut(sheet_id) {
                set_view_field(&mut meta.view, field, value);
            }
        }

        Conflict::Move { sheet_id, ours_to, theirs_to, .. } => {
            let destination = match resolution.choice {
                ResolutionChoice::Theirs => theirs_to.clone(),
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::Address(addr)) => addr.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "address" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            if let Some(cells) = state.cells.get_mut(sheet_id) {
                if let Some(cell) = cells.remove(ours_to) {
                    cells.insert(destination, cell);
                } else {
                    return Err(ConflictResolverError::MissingDestination { index, address: ours_to.clone() });
                }
            }
        }

        Conflict::CellContent { sheet_id, address, theirs: theirs_cell, .. } => {
            let cell = match resolution.choice {
                ResolutionChoice::Theirs => theirs_cell.clone(),
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::CellContent(c)) => c.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "cell_content" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            set_cell(state, sheet_id, address, cell);
        }

        Conflict::CellFormat { sheet_id, address, theirs: theirs_format, .. } => {
            let format = match resolution.choice {
                ResolutionChoice::Theirs => theirs_format.clone(),
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::CellFormat(f)) => f.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "cell_format" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            if let Some(cells) = state.cells.get_mut(sheet_id) {
                if let Some(cell) = cells.get_mut(address) {
                    cell.format = format;
                }
            }
        }

        Conflict::DeleteVsEdit { sheet_id, address, theirs_deleted, .. } => {
            let cell = match resolution.choice {
                ResolutionChoice::Theirs => {
                    if *theirs_deleted {
                        None
                    } else {
                        theirs.cells.get(sheet_id).and_then(|m| m.get(address)).cloned()
                    }
                }
                ResolutionChoice::Manual => match &resolution.manual {
                    Some(ManualPayload::CellContent(c)) => c.clone(),
                    _ => return Err(ConflictResolverError::InvalidManualPayload { index, expected: "cell_content" }),
                },
                ResolutionChoice::Ours => unreachable!("Ours is handled before dispatch"),
            };
            set_cell(state, sheet_id, address, cell);
        }
    }

    // `ours` is unused on most branches but kept as a parameter for
    // symmetry and future manual-payload validation against it.
    let _ = ours;
    Ok(())
}

fn keyed_map_mut(state: &mut DocumentState, map: KeyedMapName) -> &mut BTreeMap<String, serde_json::Value> {
    match map {
        KeyedMapName::Metadata => &mut state.metadata,
        KeyedMapName::NamedRange => &mut state.named_ranges,
        KeyedMapName::Comment => &mut state.comments,
    }
}

fn set_sheet(state: &mut DocumentState, sheet_id: &SheetId, meta: Option<SheetMeta>, cells: BTreeMap<String, Cell>) {
    match meta {
        Some(meta) => {
            state.sheets.meta_by_id.insert(sheet_id.clone(), meta);
            if !state.sheets.order.contains(sheet_id) {
                state.sheets.order.push(sheet_id.clone());
            }
            state.cells.insert(sheet_id.clone(), cells);
        }
        None => {
            state.sheets.meta_by_id.remove(sheet_id);
            state.sheets.order.retain(|id| id != sheet_id);
            state.cells.remove(sheet_id);
        }
    }
}

fn set_cell(state: &mut DocumentState, sheet_id: &SheetId, address: &str, cell: Option<Cell>) {
    let Some(cells) = state.cells.get_mut(sheet_id) else { return };
    match cell {
        Some(c) => {
            cells.insert(address.to_owned(), c);
        }
        None => {
            cells.remove(address);
        }
    }
}

/// Set a dotted field path (e.g. `"frozenRows"`, `"colWidths.3"`) within a
/// sheet view by round-tripping through its JSON projection.
fn set_view_field(view: &mut crate::model::types::SheetView, field: &str, value: serde_json::Value) {
    let field = field.strip_prefix("view.").unwrap_or(field);
    let path: Vec<&str> = field.split('.').collect();
    let Ok(mut json) = serde_json::to_value(&*view) else { return };
    set_dotted(&mut json, &path, value);
    if let Ok(updated) = serde_json::from_value(json) {
        *view = updated;
    }
}

fn set_dotted(value: &mut serde_json::Value, path: &[&str], new_value: serde_json::Value) {
    let Some((head, rest)) = path.split_first() else {
        *value = new_value;
        return;
    };
    if rest.is_empty() {
        if let Some(obj) = value.as_object_mut() {
            obj.insert((*head).to_owned(), new_value);
        }
        return;
    }
    if let Some(obj) = value.as_object_mut() {
        let entry = obj.entry((*head).to_owned()).or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        set_dotted(entry, rest, new_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::types::{CellContent, ScalarValue};

    fn doc_with_cell(sheet: &str, addr: &str, n: f64) -> DocumentState {
        let sheet_id = SheetId::new(sheet).unwrap();
        let mut state = DocumentState::empty();
        state.sheets.order.push(sheet_id.clone());
        state.sheets.meta_by_id.insert(sheet_id.clone(), SheetMeta::empty(sheet_id.clone()));
        let mut map = BTreeMap::new();
        map.insert(addr.to_owned(), Cell { content: CellContent::Value { value: ScalarValue::Number(n) }, format: None });
        state.cells.insert(sheet_id, map);
        state
    }

    #[test]
    fn ours_resolution_is_a_no_op() {
        let base = doc_with_cell("s1", "A1", 1.0);
        let ours = doc_with_cell("s1", "A1", 2.0);
        let theirs = doc_with_cell("s1", "A1", 3.0);
        let result = crate::merge::merge(&base, &ours, &theirs);
        assert_eq!(result.conflicts.len(), 1);

        let resolutions = vec![Resolution { conflict_index: 0, choice: ResolutionChoice::Ours, manual: None }];
        let resolved = apply_resolutions(&result, &ours, &theirs, &resolutions).unwrap();
        assert_eq!(resolved, result.merged);
    }

    #[test]
    fn theirs_resolution_takes_theirs_cell() {
        let base = doc_with_cell("s1", "A1", 1.0);
        let ours = doc_with_cell("s1", "A1", 2.0);
        let theirs = doc_with_cell("s1", "A1", 3.0);
        let result = crate::merge::merge(&base, &ours, &theirs);

        let resolutions = vec![Resolution { conflict_index: 0, choice: ResolutionChoice::Theirs, manual: None }];
        let resolved = apply_resolutions(&result, &ours, &theirs, &resolutions).unwrap();
        let sheet_id = SheetId::new("s1").unwrap();
        let cell = &resolved.cells[&sheet_id]["A1"];
        assert_eq!(cell.content, CellContent::Value { value: ScalarValue::Number(3.0) });
    }

    #[test]
    fn manual_resolution_overrides_with_supplied_cell() {
        let base = doc_with_cell("s1", "A1", 1.0);
        let ours = doc_with_cell("s1", "A1", 2.0);
        let theirs = doc_with_cell("s1", "A1", 3.0);
        let result = crate::merge::merge(&base, &ours, &theirs);

        let manual_cell = Cell { content: CellContent::Value { value: ScalarValue::Number(42.0) }, format: None };
        let resolutions = vec![Resolution {
            conflict_index: 0,
            choice: ResolutionChoice::Manual,
            manual: Some(ManualPayload::CellContent(Some(manual_cell.clone()))),
        }];
        let resolved = apply_resolutions(&result, &ours, &theirs, &resolutions).unwrap();
        let sheet_id = SheetId::new("s1").unwrap();
        assert_eq!(resolved.cells[&sheet_id]["A1"], manual_cell);
    }

    #[test]
    fn mismatched_manual_payload_is_an_error() {
        let base = doc_with_cell("s1", "A1", 1.0);
        let ours = doc_with_cell("s1", "A1", 2.0);
        let theirs = doc_with_cell("s1", "A1", 3.0);
        let result = crate::merge::merge(&base, &ours, &theirs);

        let resolutions = vec![Resolution {
            conflict_index: 0,
            choice: ResolutionChoice::Manual,
            manual: Some(ManualPayload::SheetName(Some("x".to_owned()))),
        }];
        let err = apply_resolutions(&result, &ours, &theirs, &resolutions).unwrap_err();
        assert!(matches!(err, ConflictResolverError::InvalidManualPayload { .. }));
    }

    #[test]
    fn duplicate_index_resolutions_last_wins() {
        let base = doc_with_cell("s1", "A1", 1.0);
        let ours = doc_with_cell("s1", "A1", 2.0);
        let theirs = doc_with_cell("s1", "A1", 3.0);
        let result = crate::merge::merge(&base, &ours, &theirs);

        let resolutions = vec![
            Resolution { conflict_index: 0, choice: ResolutionChoice::Theirs, manual: None },
            Resolution { conflict_index: 0, choice: ResolutionChoice::Ours, manual: None },
        ];
        let resolved = apply_resolutions(&result, &ours, &theirs, &resolutions).unwrap();
        assert_eq!(resolved, result.merged);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let base = doc_with_cell("s1", "A1", 1.0);
        let ours = doc_with_cell("s1", "A1", 2.0);
        let theirs = doc_with_cell("s1", "A1", 3.0);
        let result = crate::merge::merge(&base, &ours, &theirs);

        let resolutions = vec![Resolution { conflict_index: 99, choice: ResolutionChoice::Theirs, manual: None }];
        let resolved = apply_resolutions(&result, &ours, &theirs, &resolutions).unwrap();
        assert_eq!(resolved, result.merged);
    }
}
