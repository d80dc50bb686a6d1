//! Git-backed document store.
//!
//! This is the transactional backend the coordinator drives. Committed state
//! lives on `main`; each transaction works on its own `tx/{id}` branch and is
//! published by fast-forwarding `main`. The upper layers use this API and
//! never touch git2 directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              GitStore  ──begin──▶  GitTx                    │
//! │   (open, committed reads)     (reads, writes, finalize)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    blob     │       │    refs     │
//!  │  (tables)   │       │   (rows)    │       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use serde_json::json;
//! use transactor::storage::{GitStore, RowKey, TableName};
//!
//! let store = GitStore::open_or_init("./my_store")?;
//! let users = TableName::new("users")?;
//!
//! let tx = store.begin()?;
//! tx.insert(&users, RowKey::generate(), json!({"name": "Alice"}))?;
//! tx.commit()?;
//!
//! let keys = store.list_keys(&users)?;
//! ```

mod blob;
mod config;
mod error;
mod refs;
mod repository;
mod transaction;
mod tree;
mod types;

pub use blob::{columns, Row};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use repository::GitStore;
pub use transaction::{GitTx, TxInfo, TxStatus};
pub use types::{BranchName, CommitId, InvalidNameError, RowKey, TableName};
