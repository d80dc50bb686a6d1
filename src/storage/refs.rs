//! Branch and reference management.
//!
//! Git refs are pointers to commits. This module handles:
//! - the `main` branch, which holds committed state
//! - transaction branch lifecycle (create, delete, list)
//! - compare-and-swap publication of a transaction onto `main`
//!
//! Transaction branches use a namespaced pattern: `tx/{transaction_id}`.
//! This makes them easy to identify and clean up.

use git2::{BranchType, ErrorCode, Repository};

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{BranchName, CommitId};

/// Manages Git references (branches).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve(repo: &Repository, branch: &BranchName) -> StoreResult<CommitId> {
        let reference = repo
            .find_reference(&branch.as_ref_path())
            .map_err(|_| StoreError::RefNotFound(branch.to_string()))?;

        let commit = reference.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }

    /// Check if a branch exists.
    pub fn exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(
        repo: &Repository,
        branch: &BranchName,
        target: CommitId,
    ) -> StoreResult<()> {
        if Self::exists(repo, branch) {
            return Err(StoreError::BranchAlreadyExists(branch.to_string()));
        }

        let commit = repo.find_commit(target.raw())?;
        repo.branch(branch.as_str(), &commit, false)?;
        Ok(())
    }

    /// Delete a branch.
    pub fn delete_branch(repo: &Repository, branch: &BranchName) -> StoreResult<()> {
        let mut git_branch = repo
            .find_branch(branch.as_str(), BranchType::Local)
            .map_err(|_| StoreError::RefNotFound(branch.to_string()))?;

        git_branch.delete()?;
        Ok(())
    }

    /// Move `branch` from `expected` to `target`, failing if it has moved.
    ///
    /// `tx_id` only labels the error and the reflog entry.
    pub fn compare_and_swap(
        repo: &Repository,
        branch: &BranchName,
        expected: CommitId,
        target: CommitId,
        tx_id: &str,
    ) -> StoreResult<()> {
        let current = Self::resolve(repo, branch)?;
        if current != expected {
            return Err(StoreError::Conflict {
                tx_id: tx_id.to_string(),
                expected,
                found: current,
            });
        }

        let message = format!("transactor: publish {} at {}", tx_id, target.short());
        match repo.reference_matching(
            &branch.as_ref_path(),
            target.raw(),
            true,
            expected.raw(),
            &message,
        ) {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::Modified => {
                let found = Self::resolve(repo, branch)?;
                Err(StoreError::Conflict {
                    tx_id: tx_id.to_string(),
                    expected,
                    found,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List all transaction branches.
    pub fn list_transaction_branches(repo: &Repository) -> StoreResult<Vec<BranchName>> {
        let mut result = Vec::new();
        for entry in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()? {
                if name.starts_with(BranchName::TX_PREFIX) {
                    result.push(BranchName::from_git(name));
                }
            }
        }
        Ok(result)
    }

    /// Point `main` at `initial_commit` and make HEAD follow it.
    pub fn init_main(repo: &Repository, initial_commit: CommitId) -> StoreResult<()> {
        let main = BranchName::main();
        if !Self::exists(repo, &main) {
            Self::create_branch(repo, &main, initial_commit)?;
        }
        repo.set_head(&main.as_ref_path())?;
        Ok(())
    }
}
