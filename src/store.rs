//! The abstract store contract (§4.7) plus an in-memory reference
//! implementation.
//!
//! `spec.md` places persistent backends out of scope but requires the
//! contract itself and something to exercise it against. [`Store`] mirrors
//! the shape of the codebase's `WorkspaceBackend` trait: an associated
//! `Error` type, one method per contract operation, invariants documented
//! per method. [`InMemoryStore`] is one concrete implementation, serializing
//! all access through a single mutex — good enough for the integration
//! tests and scenarios in §8, not a production backend.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::SheetBranchConfig;
use crate::model::types::{Actor, Branch, BranchId, Commit, CommitId, DocId, DocumentState, MAIN_BRANCH};
use crate::model::{normalize, patch};

/// The abstract store contract (§4.7).
///
/// Implementations own persistence, concurrency control, and snapshotting;
/// the [`crate::service::BranchService`] only ever calls through this trait.
#[allow(clippy::missing_errors_doc)]
pub trait Store {
    /// The error type returned by store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Idempotently ensure a document exists.
    ///
    /// On first call, creates the root commit (a patch from the empty state
    /// to `initial_state`) and the `main` branch pointing to it. On
    /// subsequent calls for the same `doc_id`, a no-op.
    fn ensure_document(&self, doc_id: &DocId, actor: &Actor, initial_state: &DocumentState) -> Result<(), Self::Error>;

    /// Existence probe.
    fn has_document(&self, doc_id: &DocId) -> Result<bool, Self::Error>;

    /// Fetch one branch by name.
    fn get_branch(&self, doc_id: &DocId, name: &str) -> Result<Option<Branch>, Self::Error>;

    /// List every branch of a document, in creation order.
    fn list_branches(&self, doc_id: &DocId) -> Result<Vec<Branch>, Self::Error>;

    /// Create a new branch pointing at `head_commit_id`.
    ///
    /// # Invariants
    /// The caller has already checked name uniqueness; a conflicting name
    /// is a logic error, not a condition this method reports.
    fn create_branch(&self, doc_id: &DocId, actor: &Actor, name: &str, description: Option<&str>, head_commit_id: &CommitId) -> Result<Branch, Self::Error>;

    /// Rename a branch in place, preserving its id and head.
    fn rename_branch(&self, doc_id: &DocId, branch_id: &BranchId, new_name: &str) -> Result<(), Self::Error>;

    /// Remove a branch. Idempotent: removing an absent branch is not an
    /// error.
    fn delete_branch(&self, doc_id: &DocId, branch_id: &BranchId) -> Result<(), Self::Error>;

    /// Atomically move a branch's head to `commit_id`.
    ///
    /// # Invariants
    /// Atomic with respect to concurrent reads of the same branch (§5).
    fn update_branch_head(&self, doc_id: &DocId, branch_id: &BranchId, commit_id: &CommitId) -> Result<(), Self::Error>;

    /// The name of the currently checked-out branch, defaulting to
    /// [`MAIN_BRANCH`] if never set.
    fn get_current_branch_name(&self, doc_id: &DocId) -> Result<String, Self::Error>;

    /// Record the currently checked-out branch's name.
    fn set_current_branch_name(&self, doc_id: &DocId, name: &str) -> Result<(), Self::Error>;

    /// Persist a new commit.
    ///
    /// `next_state` is supplied as a snapshot candidate; whether the store
    /// actually materializes a snapshot for this commit is governed by
    /// [`crate::snapshot::SnapshotPolicy`] (§4.8).
    #[allow(clippy::too_many_arguments)]
    fn create_commit(
        &self,
        doc_id: &DocId,
        parent_commit_id: Option<&CommitId>,
        merge_parent_commit_id: Option<&CommitId>,
        created_by: &str,
        message: Option<&str>,
        patch: &patch::Patch,
        next_state: &DocumentState,
    ) -> Result<Commit, Self::Error>;

    /// Fetch one commit by id.
    fn get_commit(&self, doc_id: &DocId, id: &CommitId) -> Result<Option<Commit>, Self::Error>;

    /// Reconstruct the normalized document state at a commit (§4.8:
    /// walk parent-first to the nearest snapshot, then apply patches
    /// forward).
    fn get_document_state_at_commit(&self, doc_id: &DocId, id: &CommitId) -> Result<Option<DocumentState>, Self::Error>;
}

/// An in-memory [`Store`] implementation (§4.7).
///
/// Not a production backend: no persistence across process restarts, and
/// concurrency control is a single coarse [`Mutex`] rather than
/// per-branch compare-and-swap. Good enough to exercise every operation
/// and invariant in §4.7 and to back the scenarios in §8.
pub struct InMemoryStore {
    config: SheetBranchConfig,
    inner: Mutex<Documents>,
}

#[derive(Default)]
struct Documents {
    by_id: BTreeMap<String, DocumentRecord>,
}

struct DocumentRecord {
    commits: BTreeMap<CommitId, StoredCommit>,
    branches: BTreeMap<BranchId, Branch>,
    current_branch_name: String,
    created_at_counter: u64,
}

struct StoredCommit {
    commit: Commit,
    /// Present when this commit is a snapshot point (§4.8); otherwise the
    /// state is reconstructed by walking `parent_commit_id` and applying
    /// patches forward.
    snapshot: Option<DocumentState>,
    /// Commits since the nearest ancestor snapshot, inclusive of this one.
    distance_from_snapshot: u32,
}

/// [`InMemoryStore`] never actually fails; its associated error type exists
/// only to satisfy the [`Store`] trait's bound.
#[derive(Debug)]
pub struct InMemoryStoreError(String);

impl std::fmt::Display for InMemoryStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "in-memory store error: {}", self.0)
    }
}

impl std::error::Error for InMemoryStoreError {}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(SheetBranchConfig::default())
    }
}

impl InMemoryStore {
    /// Create a new, empty store using the given configuration's snapshot
    /// thresholds (§4.8).
    #[must_use]
    pub fn new(config: SheetBranchConfig) -> Self {
        Self { config, inner: Mutex::new(Documents::default()) }
    }

    fn next_timestamp(record: &mut DocumentRecord) -> u64 {
        record.created_at_counter += 1;
        record.created_at_counter
    }

    fn reconstruct(record: &DocumentRecord, id: &CommitId) -> Option<DocumentState> {
        let mut chain = Vec::new();
        let mut cursor = Some(id.clone());
        let mut base = DocumentState::empty();
        while let Some(current_id) = cursor {
            let stored = record.commits.get(&current_id)?;
            if let Some(snapshot) = &stored.snapshot {
                base = snapshot.clone();
                break;
            }
            chain.push(stored.commit.patch.clone());
            cursor = stored.commit.parent_commit_id.clone();
        }
        chain.reverse();
        let mut state = base;
        for p in &chain {
            state = patch::apply(&state, p);
        }
        Some(normalize::normalize(&serde_json::to_value(&state).unwrap_or(serde_json::Value::Null)))
    }
}

/// `true` if `a` and `b` agree on everything the cell patch codec cannot
/// carry: sheet metadata, sheet order, sheet view, and the workbook-level
/// keyed maps. `create_commit` forces a full snapshot whenever this is
/// `false`, since [`reconstruct`] only replays cell patches between
/// snapshots and would otherwise lose the delta silently.
fn non_cell_state_eq(a: &DocumentState, b: &DocumentState) -> bool {
    a.sheets == b.sheets && a.metadata == b.metadata && a.named_ranges == b.named_ranges && a.comments == b.comments
}

impl Store for InMemoryStore {
    type Error = InMemoryStoreError;

    fn ensure_document(&self, doc_id: &DocId, actor: &Actor, initial_state: &DocumentState) -> Result<(), Self::Error> {
        let mut documents = self.inner.lock().expect("store mutex is never poisoned");
        if documents.by_id.contains_key(doc_id.as_str()) {
            return Ok(());
        }
        let mut record = DocumentRecord {
            commits: BTreeMap::new(),
            branches: BTreeMap::new(),
            current_branch_name: MAIN_BRANCH.to_owned(),
            created_at_counter: 0,
        };
        let normalized = normalize::normalize(&serde_json::to_value(initial_state).unwrap_or(serde_json::Value::Null));
        let root_patch = patch::diff(&DocumentState::empty(), &normalized);
        let created_at = Self::next_timestamp(&mut record);
        let id = crate::id::commit_id(doc_id.as_str(), None, None, &actor.user_id, created_at, None, &root_patch);
        let commit = Commit {
            id: id.clone(),
            doc_id: doc_id.clone(),
            parent_commit_id: None,
            merge_parent_commit_id: None,
            created_by: actor.user_id.clone(),
            created_at,
            message: None,
            patch: root_patch,
        };
        record.commits.insert(id.clone(), StoredCommit { commit, snapshot: Some(normalized), distance_from_snapshot: 0 });
        let branch_id = crate::id::new_branch_id();
        let branch_created_at = Self::next_timestamp(&mut record);
        record.branches.insert(
            branch_id.clone(),
            Branch {
                id: branch_id,
                doc_id: doc_id.clone(),
                name: MAIN_BRANCH.to_owned(),
                created_by: actor.user_id.clone(),
                created_at: branch_created_at,
                description: None,
                head_commit_id: id,
            },
        );
        documents.by_id.insert(doc_id.as_str().to_owned(), record);
        Ok(())
    }

    fn has_document(&self, doc_id: &DocId) -> Result<bool, Self::Error> {
        let documents = self.inner.lock().expect("store mutex is never poisoned");
        Ok(documents.by_id.contains_key(doc_id.as_str()))
    }

    fn get_branch(&self, doc_id: &DocId, name: &str) -> Result<Option<Branch>, Self::Error> {
        let documents = self.inner.lock().expect("store mutex is never poisoned");
        Ok(documents.by_id.get(doc_id.as_str()).and_then(|r| r.branches.values().find(|b| b.name == name).cloned()))
    }

    fn list_branches(&self, doc_id: &DocId) -> Result<Vec<Branch>, Self::Error> {
        let documents = self.inner.lock().expect("store mutex is never poisoned");
        Ok(documents.by_id.get(doc_id.as_str()).map(|r| r.branches.values().cloned().collect()).unwrap_or_default())
    }

    fn create_branch(&self, doc_id: &DocId, actor: &Actor, name: &str, description: Option<&str>, head_commit_id: &CommitId) -> Result<Branch, Self::Error> {
        let mut documents = self.inner.lock().expect("store mutex is never poisoned");
        let record = documents
            .by_id
            .get_mut(doc_id.as_str())
            .ok_or_else(|| InMemoryStoreError(format!("document '{doc_id}' not found")))?;
        let branch_id = crate::id::new_branch_id();
        let created_at = Self::next_timestamp(record);
        let branch = Branch {
            id: branch_id.clone(),
            doc_id: doc_id.clone(),
            name: name.to_owned(),
            created_by: actor.user_id.clone(),
            created_at,
            description: description.map(ToOwned::to_owned),
            head_commit_id: head_commit_id.clone(),
        };
        record.branches.insert(branch_id, branch.clone());
        Ok(branch)
    }

    fn rename_branch(&self, doc_id: &DocId, branch_id: &BranchId, new_name: &str) -> Result<(), Self::Error> {
        let mut documents = self.inner.lock().expect("store mutex is never poisoned");
        let record = documents
            .by_id
            .get_mut(doc_id.as_str())
            .ok_or_else(|| InMemoryStoreError(format!("document '{doc_id}' not found")))?;
        if let Some(branch) = record.branches.get_mut(branch_id) {
            branch.name = new_name.to_owned();
        }
        Ok(())
    }

    fn delete_branch(&self, doc_id: &DocId, branch_id: &BranchId) -> Result<(), Self::Error> {
        let mut documents = self.inner.lock().expect("store mutex is never poisoned");
        if let Some(record) = documents.by_id.get_mut(doc_id.as_str()) {
            record.branches.remove(branch_id);
        }
        Ok(())
    }

    fn update_branch_head(&self, doc_id: &DocId, branch_id: &BranchId, commit_id: &CommitId) -> Result<(), Self::Error> {
        let mut documents = self.inner.lock().expect("store mutex is never poisoned");
        let record = documents
            .by_id
            .get_mut(doc_id.as_str())
            .ok_or_else(|| InMemoryStoreError(format!("document '{doc_id}' not found")))?;
        let branch = record.branches.get_mut(branch_id).ok_or_else(|| InMemoryStoreError(format!("branch '{branch_id}' not found")))?;
        branch.head_commit_id = commit_id.clone();
        Ok(())
    }

    fn get_current_branch_name(&self, doc_id: &DocId) -> Result<String, Self::Error> {
        let documents = self.inner.lock().expect("store mutex is never poisoned");
        Ok(documents.by_id.get(doc_id.as_str()).map_or_else(|| MAIN_BRANCH.to_owned(), |r| r.current_branch_name.clone()))
    }

    fn set_current_branch_name(&self, doc_id: &DocId, name: &str) -> Result<(), Self::Error> {
        let mut documents = self.inner.lock().expect("store mutex is never poisoned");
        if let Some(record) = documents.by_id.get_mut(doc_id.as_str()) {
            record.current_branch_name = name.to_owned();
        }
        Ok(())
    }

    fn create_commit(
        &self,
        doc_id: &DocId,
        parent_commit_id: Option<&CommitId>,
        merge_parent_commit_id: Option<&CommitId>,
        created_by: &str,
        message: Option<&str>,
        patch: &patch::Patch,
        next_state: &DocumentState,
    ) -> Result<Commit, Self::Error> {
        let mut documents = self.inner.lock().expect("store mutex is never poisoned");
        let record = documents
            .by_id
            .get_mut(doc_id.as_str())
            .ok_or_else(|| InMemoryStoreError(format!("document '{doc_id}' not found")))?;

        let non_cell_state_changed = match parent_commit_id.and_then(|p| Self::reconstruct(record, p)) {
            Some(parent_state) => !non_cell_state_eq(&parent_state, next_state),
            None => false,
        };

        let created_at = Self::next_timestamp(record);
        let id = crate::id::commit_id(
            doc_id.as_str(),
            parent_commit_id.map(CommitId::as_str),
            merge_parent_commit_id.map(CommitId::as_str),
            created_by,
            created_at,
            message,
            patch,
        );
        let commit = Commit {
            id: id.clone(),
            doc_id: doc_id.clone(),
            parent_commit_id: parent_commit_id.cloned(),
            merge_parent_commit_id: merge_parent_commit_id.cloned(),
            created_by: created_by.to_owned(),
            created_at,
            message: message.map(ToOwned::to_owned),
            patch: patch.clone(),
        };

        let parent_distance = parent_commit_id.and_then(|p| record.commits.get(p)).map_or(0, |s| s.distance_from_snapshot);
        let decision = crate::snapshot::decide(&self.config.snapshot, parent_distance, patch, non_cell_state_changed);
        let snapshot = decision.should_snapshot.then(|| next_state.clone());

        record.commits.insert(id, StoredCommit { commit: commit.clone(), snapshot, distance_from_snapshot: decision.distance_from_snapshot });
        Ok(commit)
    }

    fn get_commit(&self, doc_id: &DocId, id: &CommitId) -> Result<Option<Commit>, Self::Error> {
        let documents = self.inner.lock().expect("store mutex is never poisoned");
        Ok(documents.by_id.get(doc_id.as_str()).and_then(|r| r.commits.get(id)).map(|s| s.commit.clone()))
    }

    fn get_document_state_at_commit(&self, doc_id: &DocId, id: &CommitId) -> Result<Option<DocumentState>, Self::Error> {
        let documents = self.inner.lock().expect("store mutex is never poisoned");
        Ok(documents.by_id.get(doc_id.as_str()).and_then(|record| Self::reconstruct(record, id)))
    }
}
