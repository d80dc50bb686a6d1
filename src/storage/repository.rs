//! The Git-backed document store.
//!
//! This is the central component of the storage layer. It wraps
//! `git2::Repository` with thread-safe access, opens transactions and
//! publishes them onto `main`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use git2::{Commit, Oid, Repository, Tree};
use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use crate::storage::blob::Row;
use crate::storage::config::StoreConfig;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::refs::RefManager;
use crate::storage::transaction::{GitTx, TxInfo};
use crate::storage::tree;
use crate::storage::types::{BranchName, CommitId, RowKey, TableName};
use crate::transaction::TxResource;

/// A document store kept in a Git repository.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct GitStore {
    inner: Arc<GitStoreInner>,
}

struct GitStoreInner {
    repo: Mutex<Repository>,
    config: StoreConfig,
    /// Live transactions by ID.
    active: RwLock<HashMap<String, TxInfo>>,
}

impl GitStore {
    /// Open an existing store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(StoreConfig::new(path.as_ref()).create_if_missing(false))
    }

    /// Initialize a new store.
    pub fn init(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::init_with_config(StoreConfig::new(path.as_ref()))
    }

    /// Open a store, initializing it if needed.
    pub fn open_or_init(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(StoreConfig::new(path.as_ref()))
    }

    /// Open according to `config`, honouring `create_if_missing`.
    pub fn open_with_config(config: StoreConfig) -> StoreResult<Self> {
        match Repository::open(&config.path) {
            Ok(repo) => {
                if !RefManager::exists(&repo, &BranchName::main()) {
                    return Err(StoreError::NotInitialized(config.path));
                }
                Ok(Self::from_parts(repo, config))
            }
            Err(_) if config.create_if_missing => Self::init_with_config(config),
            Err(_) => Err(StoreError::NotInitialized(config.path)),
        }
    }

    fn init_with_config(config: StoreConfig) -> StoreResult<Self> {
        let repo = Repository::init(&config.path)?;
        {
            let tree = repo.find_tree(tree::empty_tree(&repo)?)?;
            let sig = config.signature()?;
            let oid = repo.commit(None, &sig, &sig, "[transactor] initialize store", &tree, &[])?;
            RefManager::init_main(&repo, CommitId::new(oid))?;
        }
        tracing::debug!(path = %config.path.display(), "initialized store");
        Ok(Self::from_parts(repo, config))
    }

    fn from_parts(repo: Repository, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(GitStoreInner {
                repo: Mutex::new(repo),
                config,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.inner.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Execute a function with exclusive access to the repository.
    pub(crate) fn with_repo<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Repository) -> StoreResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    /// Current tip of `main`.
    pub fn head(&self) -> StoreResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve(repo, &BranchName::main()))
    }

    /// Read a committed row.
    pub fn get(&self, table: &TableName, key: &RowKey) -> StoreResult<Option<Row>> {
        self.read_at(None, |repo, root| tree::read_row(repo, root, table, key))
    }

    /// List committed row keys of `table`.
    pub fn list_keys(&self, table: &TableName) -> StoreResult<Vec<RowKey>> {
        self.read_at(None, |repo, root| tree::list_keys(repo, root, table))
    }

    /// Run a read against the tree at `at`, or at `main` when `None`.
    pub(crate) fn read_at<F, T>(&self, at: Option<CommitId>, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Repository, &Tree<'_>) -> StoreResult<T>,
    {
        self.with_repo(|repo| {
            let commit_id = match at {
                Some(id) => id,
                None => RefManager::resolve(repo, &BranchName::main())?,
            };
            let root = repo.find_commit(commit_id.raw())?.tree()?;
            f(repo, &root)
        })
    }

    /// Commit a new tree on top of `parent`, advancing `branch`.
    pub(crate) fn commit_tree(
        &self,
        repo: &Repository,
        branch: &BranchName,
        parent: &Commit<'_>,
        tree_id: Oid,
        message: &str,
    ) -> StoreResult<CommitId> {
        let tree = repo.find_tree(tree_id)?;
        let sig = self.inner.config.signature()?;
        let oid = repo.commit(
            Some(&branch.as_ref_path()),
            &sig,
            &sig,
            message,
            &tree,
            &[parent],
        )?;
        Ok(CommitId::new(oid))
    }

    // ==================== Transactions ====================

    /// Begin a new transaction on a branch forked from `main`.
    pub fn begin(&self) -> StoreResult<GitTx> {
        let tx_id = Ulid::new().to_string().to_lowercase();
        let branch = BranchName::for_transaction(&tx_id);

        // Register before the branch exists so cleanup never sees it orphaned.
        self.inner.active.write().insert(
            tx_id.clone(),
            TxInfo {
                tx_id: tx_id.clone(),
                branch: branch.clone(),
                base_commit: CommitId::new(Oid::zero()),
                started_at: Utc::now(),
            },
        );

        let created = self.with_repo(|repo| {
            let base = RefManager::resolve(repo, &BranchName::main())?;
            RefManager::create_branch(repo, &branch, base)?;
            Ok(base)
        });

        let base = match created {
            Ok(base) => base,
            Err(err) => {
                self.inner.active.write().remove(&tx_id);
                return Err(err);
            }
        };

        let info = {
            let mut active = self.inner.active.write();
            let info = active
                .get_mut(&tx_id)
                .ok_or_else(|| StoreError::RefNotFound(branch.to_string()))?;
            info.base_commit = base;
            info.clone()
        };

        tracing::debug!(tx_id = %info.tx_id, base = %base.short(), "transaction started");
        Ok(GitTx::new(self.clone(), info))
    }

    /// Fast-forward `main` from the transaction's base to `head`.
    pub(crate) fn publish(&self, info: &TxInfo, head: CommitId) -> StoreResult<()> {
        self.with_repo(|repo| {
            RefManager::compare_and_swap(
                repo,
                &BranchName::main(),
                info.base_commit,
                head,
                &info.tx_id,
            )
        })
    }

    /// Forget a finished transaction and delete its branch.
    pub(crate) fn release(&self, info: &TxInfo) -> StoreResult<()> {
        self.inner.active.write().remove(&info.tx_id);
        self.with_repo(|repo| RefManager::delete_branch(repo, &info.branch))
    }

    /// Get the number of live transactions.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// Snapshot of live transactions.
    pub fn active_transactions(&self) -> Vec<TxInfo> {
        self.inner.active.read().values().cloned().collect()
    }

    /// Delete transaction branches that no live transaction owns.
    ///
    /// Such branches are left behind when a process dies mid-transaction.
    pub fn cleanup_abandoned(&self) -> StoreResult<usize> {
        let live: HashSet<String> = self.inner.active.read().keys().cloned().collect();

        let removed = self.with_repo(|repo| {
            let mut removed = 0;
            for branch in RefManager::list_transaction_branches(repo)? {
                let orphaned = branch
                    .transaction_id()
                    .map(|id| !live.contains(id))
                    .unwrap_or(false);
                if orphaned && RefManager::delete_branch(repo, &branch).is_ok() {
                    removed += 1;
                }
            }
            Ok(removed)
        })?;

        if removed > 0 {
            tracing::info!(removed, "removed abandoned transaction branches");
        }
        Ok(removed)
    }
}

impl TxResource for GitStore {
    type Tx = GitTx;

    fn begin(&self) -> StoreResult<GitTx> {
        GitStore::begin(self)
    }
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("path", &self.path())
            .field("active_count", &self.active_count())
            .finish()
    }
}
