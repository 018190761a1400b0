//! Legacy-or-partial payload detection for the commit path (§4.9; Design
//! Note "Legacy overlay logic" in `spec.md` §9).
//!
//! `spec.md` describes the commit path's "preserve if missing" behavior as
//! a scattering of ad-hoc checks; this module factors it into one explicit
//! [`LegacyOverlay`] value so the overlay decision is made once, up front,
//! and applied uniformly rather than re-derived at each field.

use std::collections::BTreeSet;

use serde_json::Value;

use super::types::DocumentState;

/// Which top-level fields of a caller-supplied `nextState` could not be
/// trusted (absent, or present-but-invalid) and must therefore be carried
/// forward from the current-head state instead of from the caller's input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyOverlay {
    /// Top-level [`DocumentState`] field names to keep from the base state
    /// rather than the caller's (already-normalized) next state.
    pub keep_from_base_fields: BTreeSet<&'static str>,
}

impl LegacyOverlay {
    /// `true` if no field needs to be overlaid — the caller's state is a
    /// complete, current-shape payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keep_from_base_fields.is_empty()
    }
}

/// Detect which fields of `raw_next` (the caller's not-yet-normalized
/// payload) must be overlaid from the current-head state (§4.9).
///
/// A field is flagged when it is missing entirely from `raw_next`, or when
/// it is present but structurally invalid for its current shape — per
/// §4.9's "a key that is present but invalid is treated as omitted". This
/// inspects the *raw* input, not the already-normalized result, because
/// normalization itself silently repairs invalid shapes (so by the time a
/// value is normalized, "invalid" and "absent" are indistinguishable).
#[must_use]
pub fn detect_overlay(raw_next: &Value) -> LegacyOverlay {
    let mut keep = BTreeSet::new();
    let Some(obj) = raw_next.as_object() else {
        // Not an object at all: every field is missing.
        keep.insert("cells");
        keep.insert("sheets");
        keep.insert("metadata");
        keep.insert("namedRanges");
        keep.insert("comments");
        return LegacyOverlay { keep_from_base_fields: keep };
    };

    // No `cells` at all means a legacy v0 payload (`{sheets: {id -> cellMap}}`)
    // or a bare object with neither shape — either way `cells` itself isn't
    // present under the v1 key, so don't overlay it: the normalizer already
    // lifts legacy `sheets` into `cells` for us. Overlay applies only to the
    // *other* top-level keys a legacy/partial client wouldn't know about.
    let has_cells_key = obj.contains_key("cells");

    let sheets_value = obj.get("sheets");
    let is_v1_sheets_shape = matches!(
        sheets_value,
        Some(Value::Object(m)) if m.contains_key("order") || m.contains_key("metaById")
    );

    if !has_cells_key && !is_v1_sheets_shape {
        // Pure legacy v0 payload: no ordering/metaById information exists
        // anywhere in the input, so sheet metadata must come from the
        // current head (a legacy client cannot have deleted formatting or
        // renamed a sheet it doesn't know exists).
        keep.insert("sheets");
    } else if !is_v1_sheets_shape {
        // `schemaVersion` claims v1 (or `cells` is present) but `sheets` is
        // missing its ordering/metaById — a partial client.
        keep.insert("sheets");
    }

    for key in ["metadata", "namedRanges", "comments"] {
        match obj.get(key) {
            Some(Value::Object(_)) => {}
            _ => {
                keep.insert(match key {
                    "metadata" => "metadata",
                    "namedRanges" => "namedRanges",
                    _ => "comments",
                });
            }
        }
    }

    LegacyOverlay { keep_from_base_fields: keep }
}

/// Apply a [`LegacyOverlay`] to a normalized `next` state, replacing any
/// flagged top-level field with the corresponding field from `base`.
#[must_use]
pub fn apply_overlay(overlay: &LegacyOverlay, base: &DocumentState, next: DocumentState) -> DocumentState {
    if overlay.is_empty() {
        return next;
    }
    let mut out = next;
    for field in &overlay.keep_from_base_fields {
        match *field {
            "sheets" => {
                out.sheets = base.sheets.clone();
                out.cells = base.cells.clone();
            }
            "cells" => out.cells = base.cells.clone(),
            "metadata" => out.metadata = base.metadata.clone(),
            "namedRanges" => out.named_ranges = base.named_ranges.clone(),
            "comments" => out.comments = base.comments.clone(),
            _ => {}
        }
    }
    out
}
