//! The structured conflict model produced by the merge engine (§4.5, §6).
//!
//! Conflicts are never bare strings: each variant carries exactly the data a
//! caller needs to render the conflict and to submit a resolution by index
//! (§4.6). Conflicts are always appended in the deterministic order the
//! merge engine visits keyed maps, then sheets, then cells — never
//! reordered afterward, since resolutions reference conflicts positionally.

use serde::{Deserialize, Serialize};

use crate::model::types::{Cell, Rect, SheetId};

/// Which workbook-level keyed map a [`Conflict::KeyedMap`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyedMapName {
    /// `DocumentState::metadata`.
    Metadata,
    /// `DocumentState::named_ranges`.
    NamedRange,
    /// `DocumentState::comments`.
    Comment,
}

/// A single divergence the three-way rule could not reconcile (§4.5, §6).
///
/// Tagged as `{ "type": "...", ... }` in JSON, matching the rest of the
/// crate's conflict/enum wire shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Conflict {
    /// A key in `metadata`/`namedRanges`/`comments` changed on both sides to
    /// different values (§4.5.1).
    KeyedMap {
        /// Which map.
        map: KeyedMapName,
        /// The divergent key.
        key: String,
        /// Ours's value, if any.
        ours: Option<serde_json::Value>,
        /// Theirs's value, if any.
        theirs: Option<serde_json::Value>,
    },

    /// Both sides renamed the same sheet to different display names (§4.5.2).
    SheetRename {
        /// The sheet id.
        sheet_id: SheetId,
        /// Ours's display name.
        ours: Option<String>,
        /// Theirs's display name.
        theirs: Option<String>,
    },

    /// A sheet present in `base` was deleted on one side and modified on the
    /// other (§4.5.2). The merge keeps `ours`'s outcome by default.
    SheetPresence {
        /// The sheet id.
        sheet_id: SheetId,
        /// `true` if `ours` deleted the sheet.
        ours_deleted: bool,
        /// `true` if `theirs` deleted the sheet.
        theirs_deleted: bool,
    },

    /// Both sides reordered sheets in a way that cannot be reconciled
    /// (§4.5.2). The merge defaults to `ours`'s order.
    SheetOrder,

    /// A sheet field resolved via per-key three-way that diverged and was
    /// defaulted to `ours` (§4.5.3): view scalars, `colWidths`/`rowHeights`
    /// entries, `formatRunsByCol` columns, or `drawings` entries.
    SheetField {
        /// The sheet id.
        sheet_id: SheetId,
        /// Dotted path identifying the diverging field, e.g.
        /// `"view.frozenRows"` or `"view.colWidths.3"`.
        field: String,
        /// Ours's value.
        ours: serde_json::Value,
        /// Theirs's value.
        theirs: serde_json::Value,
    },

    /// Both sides moved the same source address to different destinations
    /// within a sheet (§4.5.4). The merge keeps `ours`'s destination.
    Move {
        /// The sheet id.
        sheet_id: SheetId,
        /// The source address both sides moved.
        from: String,
        /// Ours's destination address.
        ours_to: String,
        /// Theirs's destination address.
        theirs_to: String,
    },

    /// A cell changed on both sides to non-equivalent content (§4.5.5).
    CellContent {
        /// The sheet id.
        sheet_id: SheetId,
        /// The cell address.
        address: String,
        /// Ours's cell, if present.
        ours: Option<Cell>,
        /// Theirs's cell, if present.
        theirs: Option<Cell>,
    },

    /// A cell's format changed on both sides in incompatible ways (§4.5.5).
    /// Only reported when there is no accompanying content conflict.
    CellFormat {
        /// The sheet id.
        sheet_id: SheetId,
        /// The cell address.
        address: String,
        /// Ours's format, if any.
        ours: Option<serde_json::Value>,
        /// Theirs's format, if any.
        theirs: Option<serde_json::Value>,
    },

    /// A cell present in `base` was deleted on one side while the other side
    /// edited its content (§4.5.5). The merge keeps `ours`'s outcome.
    DeleteVsEdit {
        /// The sheet id.
        sheet_id: SheetId,
        /// The cell address.
        address: String,
        /// `true` if `ours` deleted the cell.
        ours_deleted: bool,
        /// `true` if `theirs` deleted the cell.
        theirs_deleted: bool,
    },
}

/// Describes how a rectangle entered the `mergedRanges` candidate pool, used
/// to weight acceptance order in §4.5.3's merge-by-overlap rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum RangeProvenance {
    Base,
    TheirsOnly,
    OursOrWinner,
}

impl RangeProvenance {
    pub(crate) fn weight(self) -> u8 {
        match self {
            Self::Base => 0,
            Self::TheirsOnly => 1,
            Self::OursOrWinner => 2,
        }
    }
}

pub(crate) type WeightedRect = (RangeProvenance, Rect);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_map_conflict_round_trips_json() {
        let c = Conflict::KeyedMap {
            map: KeyedMapName::Metadata,
            key: "author".to_owned(),
            ours: Some(serde_json::json!("alice")),
            theirs: Some(serde_json::json!("bob")),
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "keyed_map");
        let back: Conflict = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn range_provenance_orders_by_weight() {
        assert!(RangeProvenance::Base.weight() < RangeProvenance::TheirsOnly.weight());
        assert!(RangeProvenance::TheirsOnly.weight() < RangeProvenance::OursOrWinner.weight());
    }
}
