//! Conservative 1:1 cell move detection between two cell maps (§4.3).
//!
//! Grounded on the same "stable content fingerprint, BTreeMap for
//! determinism" shape the merge engine's rename detector uses for files —
//! here applied to cells within one sheet instead of paths within a
//! workspace.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use super::types::{Cell, CellContent, EncryptedPayload, ScalarValue};

/// Detect cell relocations between `base` and `next`: addresses present in
/// `next` but absent in `base` ("additions") are paired 1:1 with addresses
/// present in `base` but absent in `next` ("deletions") that have the same
/// content fingerprint.
///
/// Conservative: only 1:1 pairing; ties among additions for the same
/// fingerprint are broken lexicographically by destination address;
/// encrypted cells only match other encrypted cells with the same marker
/// (their content is opaque, so the blob itself is part of the fingerprint).
#[must_use]
pub fn detect_moves(
    base: &BTreeMap<String, Cell>,
    next: &BTreeMap<String, Cell>,
) -> BTreeMap<String, String> {
    let additions: Vec<&String> = next.keys().filter(|addr| !base.contains_key(*addr)).collect();
    let deletions: Vec<&String> = base.keys().filter(|addr| !next.contains_key(*addr)).collect();

    // Group additions by fingerprint, each group sorted lexicographically so
    // pairing is deterministic and ties break by destination address.
    let mut additions_by_fp: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for addr in additions {
        let fp = fingerprint(&next[addr]);
        additions_by_fp.entry(fp).or_default().push(addr.clone());
    }
    for group in additions_by_fp.values_mut() {
        group.sort();
    }

    let mut result = BTreeMap::new();
    // Deletions iterate in address order (BTreeMap key order) for determinism.
    for from in deletions {
        let fp = fingerprint(&base[from]);
        if let Some(group) = additions_by_fp.get_mut(&fp) {
            if !group.is_empty() {
                let to = group.remove(0);
                result.insert(from.clone(), to);
            }
        }
    }
    result
}

/// A stable, string-based fingerprint of a normalized cell's content,
/// ignoring format (moves are detected by content, not presentation).
fn fingerprint(cell: &Cell) -> String {
    let mut hasher = Sha256::new();
    match &cell.content {
        CellContent::Empty => hasher.update(b"empty"),
        CellContent::Value { value } => {
            hasher.update(b"value:");
            match value {
                ScalarValue::Number(n) => hasher.update(format!("n:{n}").as_bytes()),
                ScalarValue::Text(s) => hasher.update(format!("s:{s}").as_bytes()),
                ScalarValue::Bool(b) => hasher.update(format!("b:{b}").as_bytes()),
            }
        }
        CellContent::Formula { formula } => {
            hasher.update(b"formula:");
            hasher.update(formula.as_bytes());
        }
        CellContent::Encrypted { payload: EncryptedPayload { marker, blob } } => {
            hasher.update(b"encrypted:");
            hasher.update(marker.as_bytes());
            hasher.update(b":");
            hasher.update(blob.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
