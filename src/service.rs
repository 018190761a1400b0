//! [`BranchService`] (§4.9): the permission-gated orchestration layer that
//! ties normalization, diffing, the merge engine, and a [`Store`]
//! implementation together into the operations of §6.
//!
//! One `BranchService` is bound to a single document (`doc_id`) for its
//! lifetime, matching the way the codebase's `WorkspaceBackend` consumers
//! are constructed per-workspace rather than re-targeted per call. Every
//! mutating operation emits a `tracing` span and logs the actor, role, and
//! outcome at the density used elsewhere in the codebase's orchestration
//! modules.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::SheetBranchConfig;
use crate::error::BranchServiceError;
use crate::merge::{self, MergeResult};
use crate::model::types::{Actor, Branch, Commit, CommitId, DocId, DocumentState, MAIN_BRANCH, Role};
use crate::model::{legacy, normalize, patch};
use crate::resolver::{self, Resolution};
use crate::store::Store;

/// The result of [`BranchService::preview_merge`] (§6, `previewMerge`).
#[derive(Clone, Debug, PartialEq)]
pub struct MergePreview {
    /// The three-way merge result: merged state plus conflicts.
    pub result: MergeResult,
    /// The common-ancestor commit used as `base`.
    pub base_commit_id: CommitId,
    /// The current branch's head commit at preview time.
    pub ours_commit_id: CommitId,
    /// The source branch's head commit at preview time.
    pub theirs_commit_id: CommitId,
}

/// The result of [`BranchService::merge`] (§6, `merge`).
#[derive(Clone, Debug, PartialEq)]
pub struct MergeOutcome {
    /// The two-parent merge commit that was created.
    pub commit: Commit,
    /// The resulting document state at that commit.
    pub state: DocumentState,
}

/// The permission-gated orchestration layer (§4.9).
///
/// Bound to one document for its lifetime. Read operations
/// (`list_branches`, `get_current_branch`, `get_current_state`) are
/// ungated; every other operation checks the acting [`Role`] before
/// touching the store.
pub struct BranchService<S: Store> {
    store: S,
    doc_id: DocId,
    #[allow(dead_code)]
    config: SheetBranchConfig,
}

impl<S: Store> BranchService<S> {
    /// Bind a service to one document, using the store's own
    /// [`SheetBranchConfig`]-driven policies for everything except the
    /// permission gates implemented here.
    #[must_use]
    pub fn new(store: S, doc_id: DocId) -> Self {
        Self::with_config(store, doc_id, SheetBranchConfig::default())
    }

    /// As [`Self::new`], but with an explicit configuration (currently used
    /// only to carry the same config the store was constructed with, for
    /// callers that want a single source of truth).
    #[must_use]
    pub fn with_config(store: S, doc_id: DocId, config: SheetBranchConfig) -> Self {
        Self { store, doc_id, config }
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The document this service is bound to.
    #[must_use]
    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    fn store_err(err: S::Error) -> BranchServiceError {
        BranchServiceError::Store(Box::new(err))
    }

    fn require_role(actor: &Actor, minimum: Role, operation: &'static str) -> Result<(), BranchServiceError> {
        if actor.role.at_least(minimum) {
            Ok(())
        } else {
            Err(BranchServiceError::PermissionDenied { operation, role: actor.role, required: minimum })
        }
    }

    fn get_branch(&self, name: &str) -> Result<Branch, BranchServiceError> {
        self.store
            .get_branch(&self.doc_id, name)
            .map_err(Self::store_err)?
            .ok_or_else(|| BranchServiceError::BranchNotFound { name: name.to_owned() })
    }

    fn current_branch_name(&self) -> Result<String, BranchServiceError> {
        self.store.get_current_branch_name(&self.doc_id).map_err(Self::store_err)
    }

    fn state_at(&self, commit_id: &CommitId) -> Result<DocumentState, BranchServiceError> {
        self.store
            .get_document_state_at_commit(&self.doc_id, commit_id)
            .map_err(Self::store_err)?
            .ok_or_else(|| BranchServiceError::CommitNotFound { id: commit_id.clone() })
    }

    fn get_commit(&self, commit_id: &CommitId) -> Result<Commit, BranchServiceError> {
        self.store.get_commit(&self.doc_id, commit_id).map_err(Self::store_err)?.ok_or_else(|| {
            BranchServiceError::CorruptHistory { detail: format!("commit '{commit_id}' referenced in history but missing from store") }
        })
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Create the document on first call; a no-op on subsequent calls,
    /// permitted for any role (§3, "Document" lifecycle; §4.9).
    ///
    /// # Errors
    /// [`BranchServiceError::PermissionDenied`] if the document does not
    /// yet exist and `actor` is below [`Role::Admin`].
    #[instrument(skip(self, initial_state), fields(doc_id = %self.doc_id))]
    pub fn init(&self, actor: &Actor, initial_state: &Value) -> Result<(), BranchServiceError> {
        let exists = self.store.has_document(&self.doc_id).map_err(Self::store_err)?;
        if exists {
            debug!("init: document already exists, no-op");
            return Ok(());
        }
        Self::require_role(actor, Role::Admin, "init")?;
        let normalized = normalize::normalize(initial_state);
        self.store.ensure_document(&self.doc_id, actor, &normalized).map_err(Self::store_err)?;
        info!(actor = %actor.user_id, "init: created root commit and main branch");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Reads (ungated)
    // -----------------------------------------------------------------

    /// List every branch of this document, in creation order.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn list_branches(&self) -> Result<Vec<Branch>, BranchServiceError> {
        self.store.list_branches(&self.doc_id).map_err(Self::store_err)
    }

    /// The currently checked-out branch.
    ///
    /// # Errors
    /// [`BranchServiceError::BranchNotFound`] if the current branch name
    /// does not resolve to a branch (e.g. the document was never
    /// initialized).
    pub fn get_current_branch(&self) -> Result<Branch, BranchServiceError> {
        let name = self.current_branch_name()?;
        self.get_branch(&name)
    }

    /// The normalized document state at the current branch's head.
    ///
    /// # Errors
    /// [`BranchServiceError::BranchNotFound`] or
    /// [`BranchServiceError::CommitNotFound`].
    pub fn get_current_state(&self) -> Result<DocumentState, BranchServiceError> {
        let branch = self.get_current_branch()?;
        self.state_at(&branch.head_commit_id)
    }

    /// List commits reachable from the current branch's head, parent-first
    /// (newest first), following the first parent only.
    ///
    /// # Errors
    /// Propagates store failures or [`BranchServiceError::CorruptHistory`]
    /// if the parent chain references a missing commit.
    pub fn list_commits(&self) -> Result<Vec<Commit>, BranchServiceError> {
        let branch = self.get_current_branch()?;
        let mut out = Vec::new();
        let mut cursor = Some(branch.head_commit_id);
        while let Some(id) = cursor {
            let commit = self.get_commit(&id)?;
            cursor = commit.parent_commit_id.clone();
            out.push(commit);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------
    // Branch management (owner/admin)
    // -----------------------------------------------------------------

    /// Create a new branch pointing at the current branch's head.
    ///
    /// # Errors
    /// [`BranchServiceError::PermissionDenied`], or
    /// [`BranchServiceError::BranchNameConflict`] if `name` is already
    /// taken.
    #[instrument(skip(self, description), fields(doc_id = %self.doc_id, name))]
    pub fn create_branch(&self, actor: &Actor, name: &str, description: Option<&str>) -> Result<Branch, BranchServiceError> {
        Self::require_role(actor, Role::Admin, "createBranch")?;
        if self.store.get_branch(&self.doc_id, name).map_err(Self::store_err)?.is_some() {
            return Err(BranchServiceError::BranchNameConflict { name: name.to_owned() });
        }
        let head = self.get_current_branch()?.head_commit_id;
        let branch = self.store.create_branch(&self.doc_id, actor, name, description, &head).map_err(Self::store_err)?;
        info!(actor = %actor.user_id, branch = %name, "createBranch");
        Ok(branch)
    }

    /// Rename a branch in place, preserving its id and head.
    ///
    /// # Errors
    /// [`BranchServiceError::PermissionDenied`],
    /// [`BranchServiceError::BranchNotFound`], or
    /// [`BranchServiceError::BranchNameConflict`].
    #[instrument(skip(self), fields(doc_id = %self.doc_id, old_name, new_name))]
    pub fn rename_branch(&self, actor: &Actor, old_name: &str, new_name: &str) -> Result<(), BranchServiceError> {
        Self::require_role(actor, Role::Admin, "renameBranch")?;
        let branch = self.get_branch(old_name)?;
        if old_name != new_name && self.store.get_branch(&self.doc_id, new_name).map_err(Self::store_err)?.is_some() {
            return Err(BranchServiceError::BranchNameConflict { name: new_name.to_owned() });
        }
        self.store.rename_branch(&self.doc_id, &branch.id, new_name).map_err(Self::store_err)?;
        if old_name == self.current_branch_name()? {
            self.store.set_current_branch_name(&self.doc_id, new_name).map_err(Self::store_err)?;
        }
        info!(actor = %actor.user_id, old_name, new_name, "renameBranch");
        Ok(())
    }

    /// Delete a branch. `main` can never be deleted; the currently
    /// checked-out branch cannot be deleted out from under itself.
    ///
    /// # Errors
    /// [`BranchServiceError::PermissionDenied`],
    /// [`BranchServiceError::BranchNotFound`],
    /// [`BranchServiceError::BranchIsMain`], or
    /// [`BranchServiceError::BranchIsCurrent`].
    #[instrument(skip(self), fields(doc_id = %self.doc_id, name))]
    pub fn delete_branch(&self, actor: &Actor, name: &str) -> Result<(), BranchServiceError> {
        Self::require_role(actor, Role::Admin, "deleteBranch")?;
        if name == MAIN_BRANCH {
            return Err(BranchServiceError::BranchIsMain);
        }
        let branch = self.get_branch(name)?;
        if name == self.current_branch_name()? {
            return Err(BranchServiceError::BranchIsCurrent { name: name.to_owned() });
        }
        self.store.delete_branch(&self.doc_id, &branch.id).map_err(Self::store_err)?;
        info!(actor = %actor.user_id, branch = name, "deleteBranch");
        Ok(())
    }

    /// Move the "currently checked-out" pointer to `name`, returning the
    /// state at its head.
    ///
    /// # Errors
    /// [`BranchServiceError::PermissionDenied`] or
    /// [`BranchServiceError::BranchNotFound`].
    #[instrument(skip(self), fields(doc_id = %self.doc_id, name))]
    pub fn checkout_branch(&self, actor: &Actor, name: &str) -> Result<DocumentState, BranchServiceError> {
        Self::require_role(actor, Role::Admin, "checkoutBranch")?;
        let branch = self.get_branch(name)?;
        self.store.set_current_branch_name(&self.doc_id, name).map_err(Self::store_err)?;
        info!(actor = %actor.user_id, branch = name, "checkoutBranch");
        self.state_at(&branch.head_commit_id)
    }

    // -----------------------------------------------------------------
    // Commit (owner/admin/editor)
    // -----------------------------------------------------------------

    /// Create a commit advancing the current branch's head.
    ///
    /// `next_state` is accepted as raw, possibly legacy-or-partial JSON
    /// (§4.1); it is normalized, and any top-level field an older or
    /// partial client omitted or sent invalidly is overlaid from the
    /// current-head state so that client cannot silently delete data it
    /// doesn't know about (§4.9).
    ///
    /// # Errors
    /// [`BranchServiceError::PermissionDenied`] or
    /// [`BranchServiceError::BranchNotFound`].
    #[instrument(skip(self, next_state, message), fields(doc_id = %self.doc_id))]
    pub fn commit(&self, actor: &Actor, next_state: &Value, message: Option<&str>) -> Result<Commit, BranchServiceError> {
        Self::require_role(actor, Role::Editor, "commit")?;
        let branch = self.get_current_branch()?;
        let base_state = self.state_at(&branch.head_commit_id)?;

        let overlay = legacy::detect_overlay(next_state);
        if !overlay.is_empty() {
            debug!(fields = ?overlay.keep_from_base_fields, "commit: overlaying fields from current head");
        }
        let normalized_next = normalize::normalize(next_state);
        let effective_next = legacy::apply_overlay(&overlay, &base_state, normalized_next);

        let patch = patch::diff(&base_state, &effective_next);
        let commit = self
            .store
            .create_commit(&self.doc_id, Some(&branch.head_commit_id), None, &actor.user_id, message, &patch, &effective_next)
            .map_err(Self::store_err)?;
        self.store.update_branch_head(&self.doc_id, &branch.id, &commit.id).map_err(Self::store_err)?;
        info!(actor = %actor.user_id, commit = %commit.id, "commit");
        Ok(commit)
    }

    // -----------------------------------------------------------------
    // Merge (owner/admin)
    // -----------------------------------------------------------------

    /// Find the lowest-common-ancestor commit of two heads by the two-phase
    /// BFS in §4.9: walk `ours`'s ancestors recording minimum depth, then
    /// walk `theirs`'s ancestors scoring `depth_ours + depth_theirs`,
    /// tracking the minimum-score commit with ties broken by first-seen
    /// order in the `theirs` walk.
    ///
    /// # Errors
    /// [`BranchServiceError::CorruptHistory`] if no common ancestor exists
    /// or a referenced commit is missing from the store.
    fn common_ancestor(&self, ours_head: &CommitId, theirs_head: &CommitId) -> Result<CommitId, BranchServiceError> {
        let ours_depths = self.ancestor_depths(ours_head)?;
        let ours_by_id: std::collections::BTreeMap<CommitId, u32> = ours_depths.into_iter().collect();

        let theirs_depths = self.ancestor_depths(theirs_head)?;

        let mut best: Option<(u32, CommitId)> = None;
        for (id, depth_theirs) in theirs_depths {
            if let Some(&depth_ours) = ours_by_id.get(&id) {
                let score = depth_ours + depth_theirs;
                let better = match &best {
                    None => true,
                    Some((best_score, _)) => score < *best_score,
                };
                if better {
                    best = Some((score, id));
                }
            }
        }

        best.map(|(_, id)| id).ok_or_else(|| BranchServiceError::CorruptHistory {
            detail: format!("no common ancestor between '{ours_head}' and '{theirs_head}'"),
        })
    }

    /// BFS over a commit's ancestors (following both parent links),
    /// returning `(commit id, minimum depth)` pairs in visitation order.
    /// Visitation order follows non-decreasing depth, so the first
    /// occurrence of any id is always its minimum depth.
    fn ancestor_depths(&self, head: &CommitId) -> Result<Vec<(CommitId, u32)>, BranchServiceError> {
        let mut seen = std::collections::BTreeSet::new();
        let mut queue = std::collections::VecDeque::new();
        let mut out = Vec::new();
        queue.push_back((head.clone(), 0u32));
        while let Some((id, depth)) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let commit = self.get_commit(&id)?;
            out.push((id, depth));
            if let Some(parent) = &commit.parent_commit_id {
                queue.push_back((parent.clone(), depth + 1));
            }
            if let Some(parent) = &commit.merge_parent_commit_id {
                queue.push_back((parent.clone(), depth + 1));
            }
        }
        Ok(out)
    }

    /// Compute the merge of `sourceBranch` into the current branch without
    /// committing (§6, `previewMerge`).
    ///
    /// # Errors
    /// [`BranchServiceError::PermissionDenied`],
    /// [`BranchServiceError::BranchNotFound`], or
    /// [`BranchServiceError::CorruptHistory`].
    #[instrument(skip(self), fields(doc_id = %self.doc_id, source_branch))]
    pub fn preview_merge(&self, actor: &Actor, source_branch: &str) -> Result<MergePreview, BranchServiceError> {
        Self::require_role(actor, Role::Admin, "previewMerge")?;
        let ours_branch = self.get_current_branch()?;
        let theirs_branch = self.get_branch(source_branch)?;
        let ours_head = ours_branch.head_commit_id;
        let theirs_head = theirs_branch.head_commit_id;

        let base_id = self.common_ancestor(&ours_head, &theirs_head)?;
        debug!(base = %base_id, ours = %ours_head, theirs = %theirs_head, "previewMerge: resolved common ancestor");

        let base_state = self.state_at(&base_id)?;
        let ours_state = self.state_at(&ours_head)?;
        let theirs_state = self.state_at(&theirs_head)?;
        let result = merge::merge(&base_state, &ours_state, &theirs_state);
        info!(conflicts = result.conflicts.len(), "previewMerge");
        Ok(MergePreview { result, base_commit_id: base_id, ours_commit_id: ours_head, theirs_commit_id: theirs_head })
    }

    /// Merge `sourceBranch` into the current branch (§6, `merge`), applying
    /// `resolutions` to every conflict the preview reported.
    ///
    /// # Errors
    /// As [`Self::preview_merge`], plus
    /// [`BranchServiceError::MergeUnresolvedConflicts`] if a conflict index
    /// has no resolution, [`BranchServiceError::MergeUnknownConflictIndex`]
    /// if a resolution targets an out-of-range index, and
    /// [`BranchServiceError::Resolver`] if a manual payload is malformed.
    #[instrument(skip(self, resolutions, message), fields(doc_id = %self.doc_id, source_branch))]
    pub fn merge(
        &self,
        actor: &Actor,
        source_branch: &str,
        resolutions: &[Resolution],
        message: Option<&str>,
    ) -> Result<MergeOutcome, BranchServiceError> {
        Self::require_role(actor, Role::Admin, "merge")?;
        let preview = self.preview_merge(actor, source_branch)?;
        let conflict_count = preview.result.conflicts.len();

        for resolution in resolutions {
            if resolution.conflict_index >= conflict_count {
                return Err(BranchServiceError::MergeUnknownConflictIndex { index: resolution.conflict_index, conflict_count });
            }
        }

        let resolved_indices: std::collections::BTreeSet<usize> = resolutions.iter().map(|r| r.conflict_index).collect();
        let missing_indices: Vec<usize> = (0..conflict_count).filter(|i| !resolved_indices.contains(i)).collect();
        if !missing_indices.is_empty() {
            return Err(BranchServiceError::MergeUnresolvedConflicts { missing_indices });
        }

        let ours_state = self.state_at(&preview.ours_commit_id)?;
        let theirs_state = self.state_at(&preview.theirs_commit_id)?;
        let resolved_state = resolver::apply_resolutions(&preview.result, &ours_state, &theirs_state, resolutions)?;

        let patch = patch::diff(&ours_state, &resolved_state);
        let branch = self.get_current_branch()?;
        let commit = self
            .store
            .create_commit(
                &self.doc_id,
                Some(&preview.ours_commit_id),
                Some(&preview.theirs_commit_id),
                &actor.user_id,
                message,
                &patch,
                &resolved_state,
            )
            .map_err(Self::store_err)?;
        self.store.update_branch_head(&self.doc_id, &branch.id, &commit.id).map_err(Self::store_err)?;
        info!(actor = %actor.user_id, commit = %commit.id, "merge");
        warn!(conflict_count, "merge: committed with resolved conflicts");
        Ok(MergeOutcome { commit, state: resolved_state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ManualPayload, ResolutionChoice};
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn doc_id() -> DocId {
        DocId::new("doc1").unwrap()
    }

    fn owner() -> Actor {
        Actor::new("alice", Role::Owner)
    }

    fn editor() -> Actor {
        Actor::new("bob", Role::Editor)
    }

    fn viewer() -> Actor {
        Actor::new("eve", Role::Viewer)
    }

    fn service() -> BranchService<InMemoryStore> {
        BranchService::new(InMemoryStore::default(), doc_id())
    }

    #[test]
    fn init_requires_admin_on_fresh_document() {
        let svc = service();
        let err = svc.init(&viewer(), &json!({})).unwrap_err();
        assert!(matches!(err, BranchServiceError::PermissionDenied { .. }));
    }

    #[test]
    fn init_is_idempotent_for_any_role() {
        let svc = service();
        svc.init(&owner(), &json!({ "cells": {}, "sheets": { "order": [], "metaById": {} } })).unwrap();
        svc.init(&viewer(), &json!({})).unwrap();
        assert_eq!(svc.list_branches().unwrap().len(), 1);
    }

    #[test]
    fn scenario_s1_root_then_commit() {
        let svc = service();
        svc.init(&owner(), &json!({ "cells": { "Sheet1": {} }, "sheets": { "order": ["Sheet1"], "metaById": {} } })).unwrap();
        svc.commit(&owner(), &json!({ "cells": { "Sheet1": { "A1": { "value": 1.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }), None)
            .unwrap();
        let state = svc.get_current_state().unwrap();
        let sheet_id = crate::model::types::SheetId::new("Sheet1").unwrap();
        let cell = &state.cells[&sheet_id]["A1"];
        assert_eq!(
            cell.content,
            crate::model::types::CellContent::Value { value: crate::model::types::ScalarValue::Number(1.0) }
        );
    }

    #[test]
    fn scenario_s2_fast_forward_keeps_both_cells() {
        let svc = service();
        svc.init(&owner(), &json!({ "cells": { "Sheet1": {} }, "sheets": { "order": ["Sheet1"], "metaById": {} } })).unwrap();
        let first = svc
            .commit(&owner(), &json!({ "cells": { "Sheet1": { "A1": { "value": 1.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }), None)
            .unwrap();
        let second = svc
            .commit(
                &owner(),
                &json!({ "cells": { "Sheet1": { "A1": { "value": 1.0 }, "A2": { "value": 2.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
                None,
            )
            .unwrap();
        assert_eq!(second.parent_commit_id.as_ref(), Some(&first.id));
        let branch = svc.get_current_branch().unwrap();
        assert_eq!(branch.head_commit_id, second.id);
        let state = svc.get_current_state().unwrap();
        let sheet_id = crate::model::types::SheetId::new("Sheet1").unwrap();
        assert_eq!(state.cells[&sheet_id].len(), 2);
    }

    fn init_with_a1(svc: &BranchService<InMemoryStore>, value: f64) {
        svc.init(&owner(), &json!({ "cells": { "Sheet1": {} }, "sheets": { "order": ["Sheet1"], "metaById": {} } })).unwrap();
        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "A1": { "value": value } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();
    }

    #[test]
    fn scenario_s4_content_conflict_resolved_to_theirs() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        svc.create_branch(&owner(), "feature", None).unwrap();

        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "A1": { "value": 2.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();

        svc.checkout_branch(&owner(), "feature").unwrap();
        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "A1": { "value": 3.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();
        svc.checkout_branch(&owner(), "main").unwrap();

        let preview = svc.preview_merge(&owner(), "feature").unwrap();
        assert_eq!(preview.result.conflicts.len(), 1);
        assert!(matches!(preview.result.conflicts[0], crate::merge::Conflict::CellContent { .. }));

        let resolutions = vec![Resolution { conflict_index: 0, choice: ResolutionChoice::Theirs, manual: None }];
        let outcome = svc.merge(&owner(), "feature", &resolutions, None).unwrap();
        assert!(outcome.commit.merge_parent_commit_id.is_some());
        let sheet_id = crate::model::types::SheetId::new("Sheet1").unwrap();
        assert_eq!(
            outcome.state.cells[&sheet_id]["A1"].content,
            crate::model::types::CellContent::Value { value: crate::model::types::ScalarValue::Number(3.0) }
        );
    }

    #[test]
    fn merge_without_resolving_every_conflict_fails() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        svc.create_branch(&owner(), "feature", None).unwrap();
        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "A1": { "value": 2.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();
        svc.checkout_branch(&owner(), "feature").unwrap();
        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "A1": { "value": 3.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();
        svc.checkout_branch(&owner(), "main").unwrap();

        let err = svc.merge(&owner(), "feature", &[], None).unwrap_err();
        assert!(matches!(err, BranchServiceError::MergeUnresolvedConflicts { .. }));
    }

    #[test]
    fn merge_with_unknown_index_fails() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        svc.create_branch(&owner(), "feature", None).unwrap();
        svc.checkout_branch(&owner(), "feature").unwrap();
        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "B1": { "value": 9.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();
        svc.checkout_branch(&owner(), "main").unwrap();

        let resolutions = vec![Resolution { conflict_index: 5, choice: ResolutionChoice::Theirs, manual: None }];
        let err = svc.merge(&owner(), "feature", &resolutions, None).unwrap_err();
        assert!(matches!(err, BranchServiceError::MergeUnknownConflictIndex { .. }));
    }

    #[test]
    fn commit_requires_at_least_editor() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        let err = svc.commit(&viewer(), &json!({}), None).unwrap_err();
        assert!(matches!(err, BranchServiceError::PermissionDenied { .. }));
    }

    #[test]
    fn delete_branch_rejects_main() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        let err = svc.delete_branch(&owner(), MAIN_BRANCH).unwrap_err();
        assert!(matches!(err, BranchServiceError::BranchIsMain));
    }

    #[test]
    fn delete_branch_rejects_current() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        svc.create_branch(&owner(), "feature", None).unwrap();
        svc.checkout_branch(&owner(), "feature").unwrap();
        let err = svc.delete_branch(&owner(), "feature").unwrap_err();
        assert!(matches!(err, BranchServiceError::BranchIsCurrent { .. }));
    }

    #[test]
    fn create_branch_rejects_duplicate_name() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        svc.create_branch(&owner(), "feature", None).unwrap();
        let err = svc.create_branch(&owner(), "feature", None).unwrap_err();
        assert!(matches!(err, BranchServiceError::BranchNameConflict { .. }));
    }

    #[test]
    fn branch_management_requires_admin() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        let err = svc.create_branch(&editor(), "feature", None).unwrap_err();
        assert!(matches!(err, BranchServiceError::PermissionDenied { .. }));
    }

    #[test]
    fn manual_resolution_overrides_conflict() {
        let svc = service();
        init_with_a1(&svc, 1.0);
        svc.create_branch(&owner(), "feature", None).unwrap();
        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "A1": { "value": 2.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();
        svc.checkout_branch(&owner(), "feature").unwrap();
        svc.commit(
            &owner(),
            &json!({ "cells": { "Sheet1": { "A1": { "value": 3.0 } } }, "sheets": { "order": ["Sheet1"], "metaById": {} } }),
            None,
        )
        .unwrap();
        svc.checkout_branch(&owner(), "main").unwrap();

        let manual_cell = crate::model::types::Cell {
            content: crate::model::types::CellContent::Value { value: crate::model::types::ScalarValue::Number(42.0) },
            format: None,
        };
        let resolutions = vec![Resolution {
            conflict_index: 0,
            choice: ResolutionChoice::Manual,
            manual: Some(ManualPayload::CellContent(Some(manual_cell))),
        }];
        let outcome = svc.merge(&owner(), "feature", &resolutions, None).unwrap();
        let sheet_id = crate::model::types::SheetId::new("Sheet1").unwrap();
        assert_eq!(
            outcome.state.cells[&sheet_id]["A1"].content,
            crate::model::types::CellContent::Value { value: crate::model::types::ScalarValue::Number(42.0) }
        );
    }
}
