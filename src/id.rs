//! Commit and branch identifier generation (§3 "Commit", "Branch").
//!
//! Commit ids are content-addressed: the same canonical payload always
//! yields the same id, matching the codebase's existing use of `sha2` for
//! content hashing (see `model/diff.rs`'s blob hashing). Branch ids are not
//! derived from content — a branch is a mutable pointer — so they are drawn
//! from `rand`, matching the codebase's `GitOid`-adjacent random-id helpers.

use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::patch::Patch;
use crate::model::types::{BranchId, CommitId};

/// The fields that make a commit's identity, independent of its own id.
///
/// Hashing this (rather than the full [`crate::model::types::Commit`]) keeps
/// the id generator decoupled from fields that do not affect content
/// identity, such as a future audit-log annotation.
#[derive(Serialize)]
struct CommitPayload<'a> {
    doc_id: &'a str,
    parent_commit_id: Option<&'a str>,
    merge_parent_commit_id: Option<&'a str>,
    created_by: &'a str,
    created_at: u64,
    message: Option<&'a str>,
    patch: &'a Patch,
}

/// Derive a commit's content-addressed identifier.
///
/// # Panics
/// Never: the payload is built entirely from already-validated types, so
/// JSON serialization cannot fail.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn commit_id(
    doc_id: &str,
    parent_commit_id: Option<&str>,
    merge_parent_commit_id: Option<&str>,
    created_by: &str,
    created_at: u64,
    message: Option<&str>,
    patch: &Patch,
) -> CommitId {
    let payload = CommitPayload { doc_id, parent_commit_id, merge_parent_commit_id, created_by, created_at, message, patch };
    let canonical = serde_json::to_vec(&payload).expect("commit payload of validated fields always serializes");
    let digest = Sha256::digest(&canonical);
    let hex = hex_lower(&digest);
    CommitId::new(&hex).expect("sha256 digest is always 64 lowercase hex characters")
}

/// Generate a fresh, random branch identifier.
#[must_use]
pub fn new_branch_id() -> BranchId {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let hex = hex_lower(&bytes);
    BranchId::new(&hex).expect("16 random bytes always hex-encode to 32 lowercase hex characters")
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String never fails");
    }
    s
}
