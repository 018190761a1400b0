//! End-to-end scenarios S1–S6 (`spec.md` §8) driven through the public
//! `BranchService` + `InMemoryStore` surface, exactly as an RPC adapter
//! sitting on top of this crate would call it.

use serde_json::json;

use shelf_branch::merge::Conflict;
use shelf_branch::model::types::{Actor, CellContent, Role, ScalarValue, SheetId};
use shelf_branch::resolver::{ManualPayload, Resolution, ResolutionChoice};
use shelf_branch::store::InMemoryStore;
use shelf_branch::{BranchService, BranchServiceError};

fn owner() -> Actor {
    Actor::new("alice", Role::Owner)
}

fn service() -> BranchService<InMemoryStore> {
    BranchService::new(InMemoryStore::default(), "doc-1".parse().unwrap())
}

fn sheet1() -> SheetId {
    SheetId::new("Sheet1").unwrap()
}

fn number(v: f64) -> CellContent {
    CellContent::Value { value: ScalarValue::Number(v) }
}

fn empty_workbook() -> serde_json::Value {
    json!({ "cells": { "Sheet1": {} }, "sheets": { "order": ["Sheet1"], "metaById": {} } })
}

fn workbook_with(cells: serde_json::Value) -> serde_json::Value {
    json!({ "cells": { "Sheet1": cells }, "sheets": { "order": ["Sheet1"], "metaById": {} } })
}

/// S1: Root then commit.
#[test]
fn s1_root_then_commit() {
    let svc = service();
    svc.init(&owner(), &empty_workbook()).unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 1.0 } })), None).unwrap();

    let state = svc.get_current_state().unwrap();
    assert_eq!(state.cells[&sheet1()]["A1"].content, number(1.0));
}

/// S2: Fast-forward.
#[test]
fn s2_fast_forward() {
    let svc = service();
    svc.init(&owner(), &empty_workbook()).unwrap();
    let first = svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 1.0 } })), None).unwrap();
    let second = svc
        .commit(&owner(), &workbook_with(json!({ "A1": { "value": 1.0 }, "A2": { "value": 2.0 } })), None)
        .unwrap();

    assert_eq!(second.parent_commit_id.as_ref(), Some(&first.id));
    let branch = svc.get_current_branch().unwrap();
    assert_eq!(branch.head_commit_id, second.id);

    let state = svc.get_current_state().unwrap();
    assert_eq!(state.cells[&sheet1()].len(), 2);
}

/// S3: Rename-sheet merge — renaming a sheet on one side and editing a cell
/// in it on the other side does not conflict.
#[test]
fn s3_rename_sheet_merge() {
    let svc = service();
    svc.init(&owner(), &workbook_with(json!({ "A1": { "value": 1.0 } }))).unwrap();
    svc.create_branch(&owner(), "feature", None).unwrap();

    // ours: rename Sheet1 -> "Budget" on main.
    let state = svc.get_current_state().unwrap();
    let mut meta = state.sheets.meta_by_id[&sheet1()].clone();
    meta.display_name = Some("Budget".to_owned());
    let renamed = json!({
        "schemaVersion": 1,
        "cells": { "Sheet1": { "A1": { "value": 1.0 } } },
        "sheets": {
            "order": ["Sheet1"],
            "metaById": { "Sheet1": { "displayName": "Budget" } },
        },
    });
    svc.commit(&owner(), &renamed, None).unwrap();

    // theirs: edit A1 on feature.
    svc.checkout_branch(&owner(), "feature").unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 10.0 } })), None).unwrap();
    svc.checkout_branch(&owner(), "main").unwrap();

    let preview = svc.preview_merge(&owner(), "feature").unwrap();
    assert!(preview.result.conflicts.is_empty());
    assert_eq!(preview.result.merged.sheets.meta_by_id[&sheet1()].display_name.as_deref(), Some("Budget"));
    assert_eq!(preview.result.merged.cells[&sheet1()]["A1"].content, number(10.0));
}

/// S4: Concurrent same-cell content conflict, resolved to `theirs`.
#[test]
fn s4_content_conflict_resolved_to_theirs() {
    let svc = service();
    svc.init(&owner(), &workbook_with(json!({ "A1": { "value": 1.0 } }))).unwrap();
    svc.create_branch(&owner(), "feature", None).unwrap();

    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 2.0 } })), None).unwrap();
    svc.checkout_branch(&owner(), "feature").unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 3.0 } })), None).unwrap();
    svc.checkout_branch(&owner(), "main").unwrap();

    let preview = svc.preview_merge(&owner(), "feature").unwrap();
    assert_eq!(preview.result.conflicts.len(), 1);
    assert!(matches!(preview.result.conflicts[0], Conflict::CellContent { .. }));

    let resolutions = vec![Resolution { conflict_index: 0, choice: ResolutionChoice::Theirs, manual: None }];
    let outcome = svc.merge(&owner(), "feature", &resolutions, Some("resolve A1")).unwrap();
    assert!(outcome.commit.merge_parent_commit_id.is_some());
    assert_eq!(outcome.state.cells[&sheet1()]["A1"].content, number(3.0));
}

/// S5: Move + edit harmony — ours moves A1 -> B2, theirs formats A1; the
/// format travels with the move and no conflict is reported.
#[test]
fn s5_move_plus_edit_harmony() {
    let svc = service();
    svc.init(&owner(), &workbook_with(json!({ "A1": { "value": "x" } }))).unwrap();
    svc.create_branch(&owner(), "feature", None).unwrap();

    // ours: delete A1, add B2 with the same content (a move).
    svc.commit(&owner(), &workbook_with(json!({ "B2": { "value": "x" } })), None).unwrap();

    // theirs: keep A1 in place, add a format.
    svc.checkout_branch(&owner(), "feature").unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": "x", "format": { "bold": true } } })), None).unwrap();
    svc.checkout_branch(&owner(), "main").unwrap();

    let preview = svc.preview_merge(&owner(), "feature").unwrap();
    assert!(preview.result.conflicts.is_empty(), "unexpected conflicts: {:?}", preview.result.conflicts);
    let merged_cells = &preview.result.merged.cells[&sheet1()];
    assert!(!merged_cells.contains_key("A1"));
    assert_eq!(merged_cells["B2"].format, Some(json!({ "bold": true })));
    assert_eq!(merged_cells["B2"].content, CellContent::Value { value: ScalarValue::Text("x".to_owned()) });
}

/// S6: Order conflict — both sides move `S1` to a different position.
#[test]
fn s6_order_conflict_defaults_to_ours() {
    let svc = service();
    let base = json!({
        "cells": { "S1": {}, "S2": {}, "S3": {} },
        "sheets": { "order": ["S1", "S2", "S3"], "metaById": {} },
    });
    svc.init(&owner(), &base).unwrap();
    svc.create_branch(&owner(), "feature", None).unwrap();

    let ours_order = json!({
        "cells": { "S1": {}, "S2": {}, "S3": {} },
        "sheets": { "order": ["S2", "S1", "S3"], "metaById": {} },
    });
    svc.commit(&owner(), &ours_order, None).unwrap();

    svc.checkout_branch(&owner(), "feature").unwrap();
    let theirs_order = json!({
        "cells": { "S1": {}, "S2": {}, "S3": {} },
        "sheets": { "order": ["S3", "S1", "S2"], "metaById": {} },
    });
    svc.commit(&owner(), &theirs_order, None).unwrap();
    svc.checkout_branch(&owner(), "main").unwrap();

    let preview = svc.preview_merge(&owner(), "feature").unwrap();
    assert!(preview.result.conflicts.iter().any(|c| matches!(c, Conflict::SheetOrder)));
    let s1 = SheetId::new("S1").unwrap();
    let s2 = SheetId::new("S2").unwrap();
    let s3 = SheetId::new("S3").unwrap();
    assert_eq!(preview.result.merged.sheets.order, vec![s2, s1, s3]);
}

#[test]
fn merge_rejects_out_of_range_resolution_index() {
    let svc = service();
    svc.init(&owner(), &workbook_with(json!({ "A1": { "value": 1.0 } }))).unwrap();
    svc.create_branch(&owner(), "feature", None).unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 2.0 } })), None).unwrap();
    svc.checkout_branch(&owner(), "feature").unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 3.0 } })), None).unwrap();
    svc.checkout_branch(&owner(), "main").unwrap();

    let bogus = vec![Resolution { conflict_index: 99, choice: ResolutionChoice::Ours, manual: None }];
    let err = svc.merge(&owner(), "feature", &bogus, None).unwrap_err();
    assert!(matches!(err, BranchServiceError::MergeUnknownConflictIndex { .. }));
}

#[test]
fn manual_resolution_on_a_cell_content_conflict() {
    let svc = service();
    svc.init(&owner(), &workbook_with(json!({ "A1": { "value": 1.0 } }))).unwrap();
    svc.create_branch(&owner(), "feature", None).unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 2.0 } })), None).unwrap();
    svc.checkout_branch(&owner(), "feature").unwrap();
    svc.commit(&owner(), &workbook_with(json!({ "A1": { "value": 3.0 } })), None).unwrap();
    svc.checkout_branch(&owner(), "main").unwrap();

    let preview = svc.preview_merge(&owner(), "feature").unwrap();
    let manual = shelf_branch::model::types::Cell {
        content: number(100.0),
        format: None,
    };
    let resolutions = vec![Resolution {
        conflict_index: 0,
        choice: ResolutionChoice::Manual,
        manual: Some(ManualPayload::CellContent(Some(manual))),
    }];
    let outcome = svc.merge(&owner(), "feature", &resolutions, None).unwrap();
    assert_eq!(outcome.state.cells[&sheet1()]["A1"].content, number(100.0));
    // conflict list from the frozen preview is unaffected by resolution.
    assert_eq!(preview.result.conflicts.len(), 1);
}
