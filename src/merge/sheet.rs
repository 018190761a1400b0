//! Sheet presence, rename, and ordering merge orchestration (§4.5.2).

use std::collections::BTreeSet;

use crate::merge::cell::merge_cells;
use crate::merge::conflict::Conflict;
use crate::merge::view::merge_view;
use crate::model::ordering::merge_order;
use crate::model::types::{DocumentState, SheetId, SheetMeta, Sheets, Visibility};

/// Merge sheet presence, metadata, view, cells, and ordering across all
/// three states (§4.5.2). Returns the merged `Sheets` and `cells` map.
pub(crate) fn merge_sheets(
    base: &DocumentState,
    ours: &DocumentState,
    theirs: &DocumentState,
    conflicts: &mut Vec<Conflict>,
) -> (Sheets, std::collections::BTreeMap<SheetId, std::collections::BTreeMap<String, crate::model::types::Cell>>) {
    let mut all_ids: Vec<&SheetId> = base
        .sheets
        .meta_by_id
        .keys()
        .chain(ours.sheets.meta_by_id.keys())
        .chain(theirs.sheets.meta_by_id.keys())
        .collect();
    all_ids.sort();
    all_ids.dedup();

    let empty_cells = std::collections::BTreeMap::new();
    let mut meta_by_id = std::collections::BTreeMap::new();
    let mut cells = std::collections::BTreeMap::new();
    let mut surviving = BTreeSet::new();

    for sheet_id in all_ids {
        let base_meta = base.sheets.meta_by_id.get(sheet_id);
        let ours_meta = ours.sheets.meta_by_id.get(sheet_id);
        let theirs_meta = theirs.sheets.meta_by_id.get(sheet_id);

        let outcome = match base_meta {
            None => merge_new_sheet(sheet_id, ours_meta, theirs_meta, conflicts),
            Some(base_meta) => {
                let base_cells = base.cells.get(sheet_id).unwrap_or(&empty_cells);
                let ours_cells = ours.cells.get(sheet_id).unwrap_or(&empty_cells);
                let theirs_cells = theirs.cells.get(sheet_id).unwrap_or(&empty_cells);
                merge_existing_sheet(
                    sheet_id,
                    base_meta,
                    ours_meta,
                    theirs_meta,
                    base_cells != ours_cells,
                    base_cells != theirs_cells,
                    conflicts,
                )
            }
        };

        if let Some(meta) = outcome {
            surviving.insert(sheet_id.clone());
            meta_by_id.insert(sheet_id.clone(), meta);
            let merged_cells = merge_cells(
                sheet_id,
                base.cells.get(sheet_id).unwrap_or(&empty_cells),
                ours.cells.get(sheet_id).unwrap_or(&empty_cells),
                theirs.cells.get(sheet_id).unwrap_or(&empty_cells),
                conflicts,
            );
            cells.insert(sheet_id.clone(), merged_cells);
        }
    }

    let order_result = merge_order(&base.sheets.order, &ours.sheets.order, &theirs.sheets.order, &surviving);
    if order_result.conflict {
        conflicts.push(Conflict::SheetOrder);
    }
    let mut order: Vec<SheetId> = order_result.order.into_iter().filter(|id| surviving.contains(id)).collect();
    for id in &surviving {
        if !order.contains(id) {
            order.push(id.clone());
        }
    }

    (Sheets { order, meta_by_id }, cells)
}

/// A sheet absent from `base`: keep whichever side(s) have it, merging metas
/// when both sides independently added it.
fn merge_new_sheet(
    sheet_id: &SheetId,
    ours_meta: Option<&SheetMeta>,
    theirs_meta: Option<&SheetMeta>,
    conflicts: &mut Vec<Conflict>,
) -> Option<SheetMeta> {
    match (ours_meta, theirs_meta) {
        (Some(o), None) => Some(o.clone()),
        (None, Some(t)) => Some(t.clone()),
        (None, None) => None,
        (Some(o), Some(t)) => Some(merge_metas(sheet_id, &SheetMeta::empty(sheet_id.clone()), o, t, conflicts)),
    }
}

/// A sheet present in `base`: handle deletion-vs-modification and the
/// three-way rule on name/visibility/`tabColor`.
#[allow(clippy::fn_params_excessive_bools)]
fn merge_existing_sheet(
    sheet_id: &SheetId,
    base_meta: &SheetMeta,
    ours_meta: Option<&SheetMeta>,
    theirs_meta: Option<&SheetMeta>,
    ours_cells_changed: bool,
    theirs_cells_changed: bool,
    conflicts: &mut Vec<Conflict>,
) -> Option<SheetMeta> {
    match (ours_meta, theirs_meta) {
        (None, None) => None,
        (Some(o), Some(t)) => Some(merge_metas(sheet_id, base_meta, o, t, conflicts)),
        (None, Some(t)) => {
            let theirs_modified = t != base_meta || theirs_cells_changed;
            if theirs_modified {
                conflicts.push(Conflict::SheetPresence { sheet_id: sheet_id.clone(), ours_deleted: true, theirs_deleted: false });
            }
            None
        }
        (Some(o), None) => {
            let ours_modified = o != base_meta || ours_cells_changed;
            if ours_modified {
                conflicts.push(Conflict::SheetPresence { sheet_id: sheet_id.clone(), ours_deleted: false, theirs_deleted: true });
            }
            Some(o.clone())
        }
    }
}

fn merge_metas(sheet_id: &SheetId, base: &SheetMeta, ours: &SheetMeta, theirs: &SheetMeta, conflicts: &mut Vec<Conflict>) -> SheetMeta {
    let display_name = if ours.display_name == theirs.display_name {
        ours.display_name.clone()
    } else if base.display_name == ours.display_name {
        theirs.display_name.clone()
    } else if base.display_name == theirs.display_name {
        ours.display_name.clone()
    } else {
        conflicts.push(Conflict::SheetRename {
            sheet_id: sheet_id.clone(),
            ours: ours.display_name.clone(),
            theirs: theirs.display_name.clone(),
        });
        ours.display_name.clone()
    };

    let visibility = three_way_visibility(base.visibility, ours.visibility, theirs.visibility);
    let tab_color = three_way_tab_color(&base.tab_color, &ours.tab_color, &theirs.tab_color);
    let view = merge_view(sheet_id, &base.view, &ours.view, &theirs.view, conflicts);

    SheetMeta { id: sheet_id.clone(), display_name, view, visibility, tab_color }
}

fn three_way_visibility(base: Option<Visibility>, ours: Option<Visibility>, theirs: Option<Visibility>) -> Option<Visibility> {
    if ours == theirs {
        ours
    } else if base == ours {
        theirs
    } else if base == theirs {
        ours
    } else {
        ours
    }
}

/// `tabColor` three-way, treating `None` ("no information") on one side as
/// "no change on that side" (§4.5.2).
fn three_way_tab_color(
    base: &Option<Option<String>>,
    ours: &Option<Option<String>>,
    theirs: &Option<Option<String>>,
) -> Option<Option<String>> {
    let ours_eff = ours.clone().or_else(|| base.clone());
    let theirs_eff = theirs.clone().or_else(|| base.clone());
    if ours_eff == theirs_eff {
        ours_eff
    } else if *base == ours_eff {
        theirs_eff
    } else if *base == theirs_eff {
        ours_eff
    } else {
        ours_eff
    }
}
