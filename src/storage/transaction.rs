//! Store transactions.
//!
//! A [`GitTx`] owns a branch `tx/{id}` forked from `main`. Every write is a
//! commit on that branch, so reads inside the transaction see its own writes
//! while `main` stays untouched. Committing fast-forwards `main` to the branch
//! head; rolling back deletes the branch.
//!
//! The handle is shared (`Arc<GitTx>`) by everything running inside the
//! transaction, so all operations take `&self` and the lifecycle state lives
//! behind a mutex. Once committed or rolled back, every further operation
//! fails with [`StoreError::NotActive`].

use std::fmt;

use chrono::{DateTime, Utc};
use git2::{Oid, Repository, Tree};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;

use crate::storage::blob::{self, Row};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::repository::GitStore;
use crate::storage::tree;
use crate::storage::types::{BranchName, CommitId, RowKey, TableName};
use crate::transaction::TxHandle;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Committed,
    Aborted,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxStatus::Active => "active",
            TxStatus::Committed => "committed",
            TxStatus::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Transaction metadata tracked by the store.
#[derive(Debug, Clone)]
pub struct TxInfo {
    /// Unique transaction ID (lower-case ULID).
    pub tx_id: String,
    /// Transaction branch name.
    pub branch: BranchName,
    /// `main` at the time the transaction began.
    pub base_commit: CommitId,
    pub started_at: DateTime<Utc>,
}

struct TxState {
    /// Tip of the transaction branch.
    head: CommitId,
    status: TxStatus,
}

/// A transaction on a [`GitStore`].
pub struct GitTx {
    store: GitStore,
    info: TxInfo,
    state: Mutex<TxState>,
}

impl GitTx {
    pub(crate) fn new(store: GitStore, info: TxInfo) -> Self {
        let head = info.base_commit;
        Self {
            store,
            info,
            state: Mutex::new(TxState {
                head,
                status: TxStatus::Active,
            }),
        }
    }

    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.info.tx_id
    }

    pub fn info(&self) -> &TxInfo {
        &self.info
    }

    pub fn status(&self) -> TxStatus {
        self.state.lock().status
    }

    /// Current tip of the transaction branch.
    pub fn head(&self) -> CommitId {
        self.state.lock().head
    }

    fn active(&self) -> StoreResult<MutexGuard<'_, TxState>> {
        let state = self.state.lock();
        if state.status != TxStatus::Active {
            return Err(StoreError::NotActive {
                tx_id: self.info.tx_id.clone(),
                status: state.status,
            });
        }
        Ok(state)
    }

    // ==================== Reads ====================

    /// Read a row, seeing this transaction's own writes.
    pub fn get(&self, table: &TableName, key: &RowKey) -> StoreResult<Option<Row>> {
        let state = self.active()?;
        self.store
            .read_at(Some(state.head), |repo, root| tree::read_row(repo, root, table, key))
    }

    pub fn list_keys(&self, table: &TableName) -> StoreResult<Vec<RowKey>> {
        let state = self.active()?;
        self.store
            .read_at(Some(state.head), |repo, root| tree::list_keys(repo, root, table))
    }

    /// Read every row of `table`, ordered by key.
    pub fn scan(&self, table: &TableName) -> StoreResult<Vec<Row>> {
        let state = self.active()?;
        self.store.read_at(Some(state.head), |repo, root| {
            let mut rows = Vec::new();
            for key in tree::list_keys(repo, root, table)? {
                if let Some(row) = tree::read_row(repo, root, table, &key)? {
                    rows.push(row);
                }
            }
            Ok(rows)
        })
    }

    // ==================== Writes ====================

    /// Insert a new row. Fails if the key is taken.
    pub fn insert(&self, table: &TableName, key: RowKey, data: Value) -> StoreResult<Row> {
        let columns = blob::columns(data)?;
        let message = format!("[transactor] insert {}/{}", table, key);

        self.write(&message, |repo, root| {
            if tree::read_row(repo, root, table, &key)?.is_some() {
                return Err(StoreError::RowAlreadyExists {
                    table: table.clone(),
                    key,
                });
            }
            let row = Row::new(key, columns);
            Ok((tree::put_row(repo, root, table, &row)?, row))
        })
    }

    /// Insert or replace a row.
    ///
    /// A replaced row keeps its creation time and gets the next version.
    pub fn upsert(&self, table: &TableName, key: RowKey, data: Value) -> StoreResult<Row> {
        let columns = blob::columns(data)?;
        let message = format!("[transactor] upsert {}/{}", table, key);

        self.write(&message, |repo, root| {
            let row = match tree::read_row(repo, root, table, &key)? {
                Some(existing) => existing.replaced(columns),
                None => Row::new(key, columns),
            };
            Ok((tree::put_row(repo, root, table, &row)?, row))
        })
    }

    /// Delete a row. Fails if it does not exist.
    pub fn delete(&self, table: &TableName, key: &RowKey) -> StoreResult<()> {
        let message = format!("[transactor] delete {}/{}", table, key);
        self.write(&message, |repo, root| {
            Ok((tree::remove_row(repo, root, table, key)?, ()))
        })
    }

    /// Apply a tree change and commit it onto the transaction branch.
    fn write<F, T>(&self, message: &str, change: F) -> StoreResult<T>
    where
        F: FnOnce(&Repository, &Tree<'_>) -> StoreResult<(Oid, T)>,
    {
        let mut state = self.active()?;
        let head = state.head;

        let (new_head, out) = self.store.with_repo(|repo| {
            let parent = repo.find_commit(head.raw())?;
            let root = parent.tree()?;
            let (tree_id, out) = change(repo, &root)?;
            let commit =
                self.store
                    .commit_tree(repo, &self.info.branch, &parent, tree_id, message)?;
            Ok((commit, out))
        })?;

        state.head = new_head;
        Ok(out)
    }

    // ==================== Finalization ====================

    /// Publish this transaction's writes to `main`.
    ///
    /// A transaction that wrote nothing always commits. Otherwise `main` must
    /// still be at the commit the transaction started from; if another
    /// transaction published first this fails with
    /// [`StoreError::Conflict`] and nothing is applied. The branch is deleted
    /// either way.
    pub fn commit(&self) -> StoreResult<()> {
        let mut state = self.active()?;

        let result = if state.head == self.info.base_commit {
            Ok(())
        } else {
            self.store.publish(&self.info, state.head)
        };
        state.status = match result {
            Ok(()) => TxStatus::Committed,
            Err(_) => TxStatus::Aborted,
        };
        let head = state.head;
        drop(state);

        // The outcome is decided; a leftover branch is only garbage.
        if let Err(err) = self.store.release(&self.info) {
            tracing::warn!(
                tx_id = %self.info.tx_id,
                error = %err,
                "failed to delete transaction branch"
            );
        }

        result?;
        tracing::debug!(tx_id = %self.info.tx_id, head = %head.short(), "transaction committed");
        Ok(())
    }

    /// Discard this transaction's writes.
    pub fn rollback(&self) -> StoreResult<()> {
        let mut state = self.active()?;
        state.status = TxStatus::Aborted;
        drop(state);

        self.store.release(&self.info)?;
        tracing::debug!(tx_id = %self.info.tx_id, "transaction rolled back");
        Ok(())
    }
}

impl TxHandle for GitTx {
    type Error = StoreError;

    fn commit(&self) -> StoreResult<()> {
        GitTx::commit(self)
    }

    fn rollback(&self) -> StoreResult<()> {
        GitTx::rollback(self)
    }
}

impl Drop for GitTx {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.status == TxStatus::Active {
            state.status = TxStatus::Aborted;
            if let Err(err) = self.store.release(&self.info) {
                tracing::warn!(
                    tx_id = %self.info.tx_id,
                    error = %err,
                    "failed to clean up dropped transaction"
                );
            }
        }
    }
}

impl fmt::Debug for GitTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitTx")
            .field("id", &self.info.tx_id)
            .field("status", &self.status())
            .finish()
    }
}
