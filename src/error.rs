//! Unified error types for the branch service and conflict resolver (§7).
//!
//! Error messages are agent-friendly: each variant describes what went
//! wrong and carries the structured data needed to act on it, in the voice
//! of the codebase's existing `ManifoldError`.

use std::fmt;

use crate::model::types::{CommitId, Role};

// ---------------------------------------------------------------------------
// BranchServiceError
// ---------------------------------------------------------------------------

/// Unified error type for [`crate::service::BranchService`] operations.
#[derive(Debug)]
pub enum BranchServiceError {
    /// The acting role did not meet the minimum required for the operation.
    PermissionDenied {
        /// The operation that was attempted.
        operation: &'static str,
        /// The actor's actual role.
        role: Role,
        /// The minimum role required.
        required: Role,
    },

    /// The named branch does not exist.
    BranchNotFound {
        /// The branch name that was not found.
        name: String,
    },

    /// A branch with this name already exists.
    BranchNameConflict {
        /// The conflicting name.
        name: String,
    },

    /// The operation cannot target the `main` branch.
    BranchIsMain,

    /// The operation cannot target the currently checked-out branch.
    BranchIsCurrent {
        /// The current branch's name.
        name: String,
    },

    /// A referenced commit does not exist in the store.
    CommitNotFound {
        /// The commit id that was not found.
        id: CommitId,
    },

    /// The common-ancestor walk could not find a shared ancestor, or a
    /// commit referenced by the parent chain is missing.
    CorruptHistory {
        /// Human-readable description of what went wrong.
        detail: String,
    },

    /// `merge` was called without a resolution for every reported conflict.
    MergeUnresolvedConflicts {
        /// Indices of conflicts (from the preview) with no resolution.
        missing_indices: Vec<usize>,
    },

    /// A resolution referenced a conflict index outside the preview's range.
    MergeUnknownConflictIndex {
        /// The out-of-range index.
        index: usize,
        /// The number of conflicts in the preview.
        conflict_count: usize,
    },

    /// A wrapped [`ConflictResolverError`] from applying resolutions.
    Resolver(ConflictResolverError),

    /// A wrapped store failure.
    Store(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for BranchServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied { operation, role, required } => {
                write!(
                    f,
                    "permission denied: '{operation}' requires at least {required:?}, actor has {role:?}.\n  To fix: ask a user with {required:?} or higher to perform this operation."
                )
            }
            Self::BranchNotFound { name } => {
                write!(f, "branch '{name}' not found.\n  To fix: check available branches with listBranches.")
            }
            Self::BranchNameConflict { name } => {
                write!(f, "a branch named '{name}' already exists.\n  To fix: choose a different name or rename the existing branch first.")
            }
            Self::BranchIsMain => {
                write!(f, "the 'main' branch cannot be deleted.\n  To fix: operate on a different branch.")
            }
            Self::BranchIsCurrent { name } => {
                write!(f, "branch '{name}' is currently checked out and cannot be deleted.\n  To fix: checkout a different branch first.")
            }
            Self::CommitNotFound { id } => {
                write!(f, "commit '{id}' not found.\n  To fix: verify the commit id came from this document's history.")
            }
            Self::CorruptHistory { detail } => {
                write!(f, "commit history is corrupt: {detail}\n  To fix: inspect the store's commit graph for missing or cyclic parent links.")
            }
            Self::MergeUnresolvedConflicts { missing_indices } => {
                write!(f, "merge has {} unresolved conflict(s): indices {missing_indices:?}.\n  To fix: supply a resolution for every conflict index from the preview before merging.", missing_indices.len())
            }
            Self::MergeUnknownConflictIndex { index, conflict_count } => {
                write!(f, "resolution references conflict index {index}, but the preview reported only {conflict_count} conflict(s).\n  To fix: re-run previewMerge and resolve against its current conflict list.")
            }
            Self::Resolver(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "store error: {err}\n  To fix: check the store backend's logs."),
        }
    }
}

impl std::error::Error for BranchServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Resolver(err) => Some(err),
            Self::Store(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<ConflictResolverError> for BranchServiceError {
    fn from(err: ConflictResolverError) -> Self {
        Self::Resolver(err)
    }
}

// ---------------------------------------------------------------------------
// ConflictResolverError
// ---------------------------------------------------------------------------

/// Failure applying resolutions in [`crate::resolver::apply_resolutions`].
#[derive(Debug)]
pub enum ConflictResolverError {
    /// A manual resolution's payload did not match the shape the conflict
    /// at that index requires (e.g. a sheet-order payload for a cell
    /// content conflict).
    InvalidManualPayload {
        /// The conflict index the resolution targeted.
        index: usize,
        /// What was expected.
        expected: &'static str,
    },

    /// A resolution referenced a destination address that no longer exists
    /// after the merge's move relocation.
    MissingDestination {
        /// The conflict index the resolution targeted.
        index: usize,
        /// The address that could not be found.
        address: String,
    },
}

impl fmt::Display for ConflictResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidManualPayload { index, expected } => {
                write!(f, "resolution for conflict {index} has an invalid manual payload: expected {expected}.\n  To fix: supply a payload matching that conflict's kind.")
            }
            Self::MissingDestination { index, address } => {
                write!(f, "resolution for conflict {index} references address '{address}', which does not exist in the merged state.\n  To fix: resolve against an address present in the merge preview.")
            }
        }
    }
}

impl std::error::Error for ConflictResolverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_permission_denied() {
        let err = BranchServiceError::PermissionDenied { operation: "merge", role: Role::Viewer, required: Role::Admin };
        let msg = format!("{err}");
        assert!(msg.contains("merge"));
        assert!(msg.contains("Viewer"));
        assert!(msg.contains("Admin"));
    }

    #[test]
    fn display_branch_not_found() {
        let err = BranchServiceError::BranchNotFound { name: "feature-x".to_owned() };
        let msg = format!("{err}");
        assert!(msg.contains("feature-x"));
        assert!(msg.contains("listBranches"));
    }

    #[test]
    fn display_merge_unresolved_conflicts() {
        let err = BranchServiceError::MergeUnresolvedConflicts { missing_indices: vec![0, 2] };
        let msg = format!("{err}");
        assert!(msg.contains("2 unresolved"));
        assert!(msg.contains("[0, 2]"));
    }

    #[test]
    fn resolver_error_wraps_with_source() {
        let inner = ConflictResolverError::MissingDestination { index: 1, address: "B2".to_owned() };
        let err: BranchServiceError = inner.into();
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{err}").contains("B2"));
    }

    #[test]
    fn display_invalid_manual_payload() {
        let err = ConflictResolverError::InvalidManualPayload { index: 0, expected: "cell" };
        let msg = format!("{err}");
        assert!(msg.contains("conflict 0"));
        assert!(msg.contains("expected cell"));
    }
}
