//! Transactor - implicit transaction propagation
//!
//! Code that needs a transaction asks a [`TxManager`](transaction::TxManager)
//! for one through a [`Context`](context::Context). The outermost call opens
//! and finalizes it; every call nested inside joins the same transaction
//! without it being passed around explicitly.
//!
//! The crate ships a Git-backed document store ([`storage::GitStore`]) as the
//! transactional backend, but any type implementing
//! [`TxResource`](transaction::TxResource) works.
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use transactor::context::Context;
//! use transactor::storage::{GitStore, RowKey, StoreError, TableName};
//! use transactor::transaction::TxManager;
//!
//! let manager = TxManager::new(GitStore::open_or_init("./my_store").unwrap());
//! let users = TableName::new("users").unwrap();
//!
//! manager
//!     .within_tx(&Context::background(), |_ctx, tx| {
//!         tx.insert(&users, RowKey::generate(), json!({"name": "Alice"}))?;
//!         Ok::<_, StoreError>(())
//!     })
//!     .unwrap();
//! ```

pub mod context;
pub mod storage;
pub mod transaction;
