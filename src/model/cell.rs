//! Cell normalization, equality, and formula canonicalization (§4.2).

use super::types::{Cell, CellContent, EncryptedPayload, ScalarValue};

/// Drop empty components and enforce the encryption/formula/value mutual
/// exclusion rule: `encryption marker > formula > value` (§4.2, "Normalize
/// cell"). Returns `None` when the result is equivalent to absence: no
/// value, no formula, no format, and no encryption marker.
#[must_use]
pub fn normalize_cell(cell: &Cell) -> Option<Cell> {
    let content = match &cell.content {
        CellContent::Encrypted { payload } => CellContent::Encrypted {
            payload: payload.clone(),
        },
        CellContent::Formula { formula } => {
            let trimmed = formula.trim();
            if trimmed.is_empty() {
                CellContent::Empty
            } else {
                CellContent::Formula {
                    formula: canonical_formula_text(trimmed),
                }
            }
        }
        CellContent::Value { value } => CellContent::Value {
            value: value.clone(),
        },
        CellContent::Empty => CellContent::Empty,
    };

    let format = cell.format.clone().filter(|f| !is_empty_json(f));

    if matches!(content, CellContent::Empty) && format.is_none() {
        return None;
    }

    Some(Cell { content, format })
}

fn is_empty_json(v: &serde_json::Value) -> bool {
    matches!(v, serde_json::Value::Null)
        || matches!(v, serde_json::Value::Object(m) if m.is_empty())
}

/// Ensure a formula string has exactly one leading `=` and is trimmed.
fn canonical_formula_text(trimmed: &str) -> String {
    let body = trimmed.strip_prefix('=').unwrap_or(trimmed);
    format!("={}", body.trim())
}

/// Full structural equality on normalized cells: value/formula/format/encryption
/// all must match (§4.2, "Full equality").
#[must_use]
pub fn cells_equal(a: Option<&Cell>, b: Option<&Cell>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.content == b.content && json_eq(&a.format, &b.format),
        _ => false,
    }
}

fn json_eq(a: &Option<serde_json::Value>, b: &Option<serde_json::Value>) -> bool {
    a == b
}

/// Content equality: ignores `format`; compares encryption marker, else
/// formula text, else value (§4.2, "Content equality").
#[must_use]
pub fn content_equal(a: Option<&Cell>, b: Option<&Cell>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => content_key(a) == content_key(b),
        _ => false,
    }
}

/// Semantic content equivalence: like [`content_equal`], but formulas are
/// compared via [`canonical_formula_key`] rather than literal text (§4.2,
/// "Semantic content equivalence"). Required by the merge engine to resolve
/// "same edit on both sides" without a false conflict when only whitespace
/// or case differs.
#[must_use]
pub fn content_semantically_equal(a: Option<&Cell>, b: Option<&Cell>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => semantic_content_key(a) == semantic_content_key(b),
        _ => false,
    }
}

/// The part of content equality that distinguishes cells by literal text.
fn content_key(cell: &Cell) -> ContentKey<'_> {
    match &cell.content {
        CellContent::Encrypted { payload } => ContentKey::Encrypted(payload),
        CellContent::Formula { formula } => ContentKey::Formula(formula.as_str()),
        CellContent::Value { value } => ContentKey::Value(value),
        CellContent::Empty => ContentKey::Empty,
    }
}

fn semantic_content_key(cell: &Cell) -> SemanticKey {
    match &cell.content {
        CellContent::Encrypted { payload } => SemanticKey::Encrypted(payload.clone()),
        CellContent::Formula { formula } => SemanticKey::Formula(canonical_formula_key(formula)),
        CellContent::Value { value } => SemanticKey::Value(value.clone()),
        CellContent::Empty => SemanticKey::Empty,
    }
}

#[derive(PartialEq)]
enum ContentKey<'a> {
    Empty,
    Value(&'a ScalarValue),
    Formula(&'a str),
    Encrypted(&'a EncryptedPayload),
}

#[derive(Clone, PartialEq)]
enum SemanticKey {
    Empty,
    Value(ScalarValue),
    Formula(String),
    Encrypted(EncryptedPayload),
}

/// A minimal case/whitespace-insensitive canonical form of a formula's text.
///
/// Collapses runs of whitespace to a single space, trims, and lowercases.
/// This is intentionally conservative: it resolves the common case of
/// "typed the same formula with different spacing/case" without attempting
/// true AST equivalence (§4.2 allows a fuller AST check to be plugged in
/// later; this is the baseline every implementation must provide).
#[must_use]
pub fn canonical_formula_key(formula: &str) -> String {
    let body = formula.strip_prefix('=').unwrap_or(formula);
    let collapsed: String = body
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("={collapsed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_cell(n: f64) -> Cell {
        Cell {
            content: CellContent::Value { value: ScalarValue::Number(n) },
            format: None,
        }
    }

    #[test]
    fn normalize_drops_absent_cell() {
        let cell = Cell::default();
        assert!(normalize_cell(&cell).is_none());
    }

    #[test]
    fn normalize_drops_empty_format_object() {
        let cell = Cell {
            content: CellContent::Empty,
            format: Some(serde_json::json!({})),
        };
        assert!(normalize_cell(&cell).is_none());
    }

    #[test]
    fn normalize_keeps_format_only_cell() {
        let cell = Cell {
            content: CellContent::Empty,
            format: Some(serde_json::json!({"bold": true})),
        };
        assert!(normalize_cell(&cell).is_some());
    }

    #[test]
    fn normalize_trims_and_prefixes_formula() {
        let cell = Cell {
            content: CellContent::Formula { formula: "  SUM(A1:A2)  ".to_owned() },
            format: None,
        };
        let n = normalize_cell(&cell).unwrap();
        assert_eq!(
            n.content,
            CellContent::Formula { formula: "=SUM(A1:A2)".to_owned() }
        );
    }

    #[test]
    fn full_equality_distinguishes_format() {
        let a = Cell { content: CellContent::Value { value: ScalarValue::Number(1.0) }, format: None };
        let b = Cell {
            content: CellContent::Value { value: ScalarValue::Number(1.0) },
            format: Some(serde_json::json!({"bold": true})),
        };
        assert!(!cells_equal(Some(&a), Some(&b)));
        assert!(content_equal(Some(&a), Some(&b)));
    }

    #[test]
    fn semantic_equivalence_ignores_case_and_whitespace() {
        let a = Cell { content: CellContent::Formula { formula: "=SUM(A1, A2)".to_owned() }, format: None };
        let b = Cell { content: CellContent::Formula { formula: "=sum(A1,  A2)".to_owned() }, format: None };
        assert!(!content_equal(Some(&a), Some(&b)));
        assert!(content_semantically_equal(Some(&a), Some(&b)));
    }

    #[test]
    fn encrypted_only_matches_encrypted() {
        let enc = Cell {
            content: CellContent::Encrypted {
                payload: EncryptedPayload { marker: "aes256".into(), blob: "xx".into() },
            },
            format: None,
        };
        let val = value_cell(1.0);
        assert!(!content_equal(Some(&enc), Some(&val)));
    }

    #[test]
    fn absence_equals_none() {
        assert!(cells_equal(None, None));
        assert!(content_equal(None, None));
        assert!(content_semantically_equal(None, None));
    }
}
