//! Core document types for the spreadsheet branching core (§3).
//!
//! Defines the identifiers, the cell and sheet model, and the document,
//! commit, branch, and actor types. Everything here is a plain data type;
//! normalization (`model::normalize`), equality (`model::cell`), and the
//! patch codec (`model::patch`) are separate modules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Why a validated identifier failed to parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Which kind of identifier failed validation.
    pub kind: ErrorKind,
    /// The raw value that was rejected.
    pub value: String,
    /// Human-readable reason.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {:?} {:?}: {}", self.kind, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Which identifier kind a [`ValidationError`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A document identifier.
    DocId,
    /// A sheet identifier.
    SheetId,
    /// A commit identifier (64-character lowercase hex digest).
    CommitId,
    /// A branch identifier.
    BranchId,
    /// A branch name.
    BranchName,
}

// ---------------------------------------------------------------------------
// DocId / SheetId — free-form, non-empty string identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident, $kind:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Construct from a string, rejecting empty or over-long values.
            ///
            /// # Errors
            /// Returns an error if `s` is empty or exceeds 256 characters.
            pub fn new(s: &str) -> Result<Self, ValidationError> {
                if s.is_empty() {
                    return Err(ValidationError {
                        kind: ErrorKind::$kind,
                        value: s.to_owned(),
                        reason: "must not be empty".to_owned(),
                    });
                }
                if s.len() > 256 {
                    return Err(ValidationError {
                        kind: ErrorKind::$kind,
                        value: s.to_owned(),
                        reason: "must be at most 256 characters".to_owned(),
                    });
                }
                Ok(Self(s.to_owned()))
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(DocId, DocId, "A document (workbook) identifier.");
string_id!(SheetId, SheetId, "A sheet identifier, stable across renames.");

// ---------------------------------------------------------------------------
// CommitId — 64-character lowercase hex digest (sha256 of commit payload)
// ---------------------------------------------------------------------------

/// A validated 64-character lowercase hex commit identifier.
///
/// Produced by [`crate::id::commit_id`] from the canonical commit payload —
/// see that module for the content-addressing scheme.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Create a `CommitId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 64 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.len() != 64 {
            return Err(ValidationError {
                kind: ErrorKind::CommitId,
                value: s.to_owned(),
                reason: format!("expected 64 hex characters, got {}", s.len()),
            });
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(ValidationError {
                kind: ErrorKind::CommitId,
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Return the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CommitId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CommitId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// BranchId — 32-character lowercase hex, randomly generated
// ---------------------------------------------------------------------------

/// A validated 32-character lowercase hex branch identifier.
///
/// Distinct from a branch's `name`: the id is immutable for the branch's
/// lifetime, while the name may be renamed (§3, "Branch" lifecycle).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchId(String);

impl BranchId {
    /// Create a `BranchId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 32 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.len() != 32 {
            return Err(ValidationError {
                kind: ErrorKind::BranchId,
                value: s.to_owned(),
                reason: format!("expected 32 hex characters, got {}", s.len()),
            });
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(ValidationError {
                kind: ErrorKind::BranchId,
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Return the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BranchId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<BranchId> for String {
    fn from(id: BranchId) -> Self {
        id.0
    }
}

/// Validate a branch name: non-empty, at most 255 bytes.
///
/// # Errors
/// Returns an error if `name` is empty or too long.
pub fn validate_branch_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError {
            kind: ErrorKind::BranchName,
            value: name.to_owned(),
            reason: "branch name must not be empty".to_owned(),
        });
    }
    if name.len() > 255 {
        return Err(ValidationError {
            kind: ErrorKind::BranchName,
            value: name.to_owned(),
            reason: "branch name must be at most 255 characters".to_owned(),
        });
    }
    Ok(())
}

/// The name of the branch that always exists and cannot be deleted (§3).
pub const MAIN_BRANCH: &str = "main";

// ---------------------------------------------------------------------------
// Actor / Role
// ---------------------------------------------------------------------------

/// An authenticated actor performing an operation (§3, "Actor").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Opaque user identifier, supplied by the caller's auth layer.
    pub user_id: String,
    /// The actor's role within this document.
    pub role: Role,
}

impl Actor {
    /// Construct an actor.
    #[must_use]
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// An actor's role within a document (§3).
///
/// Ranked low-to-high for permission checks: `Viewer < Commenter < Editor <
/// Admin < Owner`. Per the Open Question in `spec.md` §9, `Commenter` and
/// `Viewer` are treated as strictly below `Editor` everywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Read-only access.
    Viewer,
    /// Read-only access plus commenting (not exercised by any gate today).
    Commenter,
    /// May commit.
    Editor,
    /// May commit and manage branches.
    Admin,
    /// May commit, manage branches, and is always permitted on a fresh `init`.
    Owner,
}

impl Role {
    /// Returns `true` if this role meets or exceeds `minimum`.
    #[must_use]
    pub fn at_least(self, minimum: Self) -> bool {
        self >= minimum
    }
}

// ---------------------------------------------------------------------------
// Cell model
// ---------------------------------------------------------------------------

/// A literal scalar cell value (§3, "Cell").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A numeric value. Compared bitwise via its string round-trip so that
    /// `NaN` (which never arises from a correctly-normalized cell, but which
    /// we must not panic on) still satisfies `Eq`-like reflexivity in tests.
    Number(f64),
    /// A text value.
    Text(String),
    /// A boolean value.
    Bool(bool),
}

/// An opaque encrypted cell payload (§3, "Cell": "opaque encrypted payload").
///
/// The core never inspects `blob`; it is carried verbatim and compared only
/// by equality.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Marker identifying the encryption scheme; opaque to this crate.
    pub marker: String,
    /// Opaque ciphertext, base64 or otherwise encoded by the caller.
    pub blob: String,
}

/// The content of a [`Cell`], exclusive of `format` (§3, §4.2).
///
/// For a non-encrypted cell, `Formula` and `Value` are mutually exclusive —
/// enforced by [`crate::model::cell::normalize_cell`], not by this type
/// itself (so that un-normalized input, which may carry both, still
/// round-trips through `serde` for the normalizer to sanitize).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellContent {
    /// No value and no formula.
    Empty,
    /// A literal scalar value.
    Value {
        /// The literal value.
        value: ScalarValue,
    },
    /// A formula in canonical string form (leading `=`, trimmed).
    Formula {
        /// The formula text, including the leading `=`.
        formula: String,
    },
    /// An opaque encrypted payload.
    Encrypted {
        /// The payload.
        payload: EncryptedPayload,
    },
}

impl Default for CellContent {
    fn default() -> Self {
        Self::Empty
    }
}

/// A single cell (§3, "Cell").
///
/// A cell with `content = Empty` and `format = None` is equivalent to
/// absence from the cell map; [`crate::model::cell::normalize_cell`] enforces
/// this by returning `None` in that case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Cell {
    /// The cell's value, formula, or encrypted payload.
    #[serde(default)]
    pub content: CellContent,
    /// Arbitrary nested JSON formatting metadata, opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<serde_json::Value>,
}

/// A sparse mapping from A1 address to cell. Absence means empty (§3).
pub type CellMap = BTreeMap<String, Cell>;

// ---------------------------------------------------------------------------
// Sheet view
// ---------------------------------------------------------------------------

/// A non-degenerate, inclusive rectangular range (§3, "mergedRanges").
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    /// First row, inclusive.
    pub start_row: u32,
    /// Last row, inclusive.
    pub end_row: u32,
    /// First column, inclusive.
    pub start_col: u32,
    /// Last column, inclusive.
    pub end_col: u32,
}

impl Rect {
    /// Returns `true` if this rectangle spans a single cell (degenerate for
    /// `mergedRanges` purposes).
    #[must_use]
    pub fn is_single_cell(self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    /// Returns `true` if `self` and `other` share at least one cell.
    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        self.start_row <= other.end_row
            && other.start_row <= self.end_row
            && self.start_col <= other.end_col
            && other.start_col <= self.end_col
    }
}

/// A drawing's stable identifier (§3, "drawings").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DrawingId {
    /// An integer id within the JavaScript safe-integer range.
    Int(i64),
    /// A trimmed, non-empty string id, at most 4096 characters.
    Text(String),
}

/// A single drawing entry (§3, "drawings").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drawing {
    /// Stable identifier.
    pub id: DrawingId,
    /// Stacking order; drawings sort by `(z_order, id)`.
    pub z_order: i64,
    /// Arbitrary drawing payload (position, size, image ref, etc.), opaque
    /// to this crate — the plain-JSON projection of whatever source
    /// representation produced it (§9, "Shared-type wrappers").
    pub payload: serde_json::Value,
}

/// A half-open row interval `[start_row, end_row_exclusive)` within one
/// column, carrying a format (§3, "formatRunsByCol"; GLOSSARY, "Range run").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRun {
    /// First row, inclusive.
    pub start_row: u32,
    /// One past the last row covered.
    pub end_row_exclusive: u32,
    /// The format applied to this run. Never absent — an empty run list
    /// means "cleared"; a run always carries a concrete, non-null format.
    pub format: serde_json::Value,
}

/// Per-sheet UI state (§3, "Sheet metadata": `view`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SheetView {
    /// Number of frozen rows, from the top.
    #[serde(default)]
    pub frozen_rows: u32,
    /// Number of frozen columns, from the left.
    #[serde(default)]
    pub frozen_cols: u32,
    /// `None` = no information; `Some(None)` = explicitly cleared;
    /// `Some(Some(id))` = set to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_id: Option<Option<String>>,
    /// Column index → width, sparse, positive values only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub col_widths: BTreeMap<u32, f64>,
    /// Row index → height, sparse, positive values only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub row_heights: BTreeMap<u32, f64>,
    /// Non-overlapping, non-degenerate merged ranges, lexicographic order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_ranges: Option<Vec<Rect>>,
    /// Drawings, ordered by `(z_order, id)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawings: Option<Vec<Drawing>>,
    /// Default format applied to cells with no more specific format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_format: Option<serde_json::Value>,
    /// Row index → format, sparse.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub row_formats: BTreeMap<u32, serde_json::Value>,
    /// Column index → format, sparse.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub col_formats: BTreeMap<u32, serde_json::Value>,
    /// Column index → ordered list of format runs. An entry with an empty
    /// `Vec` means "explicitly cleared" and is preserved; an absent entry
    /// means "no information".
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub format_runs_by_col: BTreeMap<u32, Vec<FormatRun>>,
}

/// Sheet visibility (§3, "Sheet metadata": `visibility`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Normally visible.
    Visible,
    /// Hidden but can be unhidden through the UI.
    Hidden,
    /// Hidden and cannot be unhidden through the standard UI.
    VeryHidden,
}

/// Per-sheet metadata (§3, "Sheet metadata").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetMeta {
    /// Stable identifier, unchanged across renames.
    pub id: SheetId,
    /// User-visible name; `None` is a valid display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Per-sheet UI state.
    #[serde(default)]
    pub view: SheetView,
    /// Visibility; `None` means "no information" (defaults to visible on
    /// display, but is distinguished for three-way-merge purposes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// `None` = no information; `Some(None)` = explicitly cleared;
    /// `Some(Some(argb))` = set to an 8-hex-digit uppercase ARGB string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_color: Option<Option<String>>,
}

impl SheetMeta {
    /// A freshly-created sheet meta with `name = id` and a default view.
    #[must_use]
    pub fn empty(id: SheetId) -> Self {
        let display_name = Some(id.as_str().to_owned());
        Self {
            id,
            display_name,
            view: SheetView::default(),
            visibility: None,
            tab_color: None,
        }
    }
}

/// The ordered collection of sheets plus their metadata (§3, "Sheets
/// collection").
///
/// Invariant: `set(order) == keys(meta_by_id)`, and `order` has no
/// duplicates. Enforced by the normalizer, not by this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Sheets {
    /// Display order of sheet ids.
    pub order: Vec<SheetId>,
    /// Sheet id → metadata.
    pub meta_by_id: BTreeMap<SheetId, SheetMeta>,
}

// ---------------------------------------------------------------------------
// DocumentState
// ---------------------------------------------------------------------------

/// The normalized document state (§3, "Document state").
///
/// Invariants (enforced by [`crate::model::normalize::normalize`]):
/// every sheet id in `sheets.meta_by_id` has an entry in `cells` (possibly
/// empty); `cells` has no keys outside `sheets.meta_by_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    /// Always `1` for a normalized state.
    pub schema_version: u32,
    /// Sheet order and metadata.
    pub sheets: Sheets,
    /// Sheet id → cell map.
    pub cells: BTreeMap<SheetId, CellMap>,
    /// Opaque workbook-level keyed map.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Opaque workbook-level keyed map.
    #[serde(default)]
    pub named_ranges: BTreeMap<String, serde_json::Value>,
    /// Opaque workbook-level keyed map.
    #[serde(default)]
    pub comments: BTreeMap<String, serde_json::Value>,
}

impl DocumentState {
    /// The empty document: no sheets, no cells, no keyed-map entries.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema_version: 1,
            sheets: Sheets::default(),
            cells: BTreeMap::new(),
            metadata: BTreeMap::new(),
            named_ranges: BTreeMap::new(),
            comments: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Commit / Branch
// ---------------------------------------------------------------------------

/// An immutable commit node (§3, "Commit").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// Content-addressed identifier; see [`crate::id::commit_id`].
    pub id: CommitId,
    /// The document this commit belongs to.
    pub doc_id: DocId,
    /// `None` only for the root commit.
    pub parent_commit_id: Option<CommitId>,
    /// `Some` only for a merge commit (two parents).
    pub merge_parent_commit_id: Option<CommitId>,
    /// The actor's user id.
    pub created_by: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Optional commit message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The patch from the (first) parent state to this commit's state.
    /// For the root commit, the diff from the empty state.
    pub patch: crate::model::patch::Patch,
}

/// A named, movable pointer to a commit (§3, "Branch").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Immutable identity, distinct from `name`.
    pub id: BranchId,
    /// The document this branch belongs to.
    pub doc_id: DocId,
    /// Unique within the document; renamable.
    pub name: String,
    /// The actor's user id that created the branch.
    pub created_by: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Optional free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The commit this branch currently points to.
    pub head_commit_id: CommitId,
}
