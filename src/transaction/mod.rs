//! Implicit, nesting-aware transactions.
//!
//! A [`TxManager`] runs a unit of work inside a transaction that travels in
//! the [`Context`](crate::context::Context) rather than through function
//! arguments. The outermost call opens and finalizes it; every call nested
//! inside (at any depth, across any function boundary) finds the handle in
//! its context and joins it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TxManager                            │
//! │   (looks up / opens / binds / commits / rolls back)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │   Context   │       │ TxResource  │       │ TxObserver  │
//!  │  (carrier)  │       │ / TxHandle  │       │(side channel)│
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use transactor::context::Context;
//! use transactor::storage::GitStore;
//! use transactor::transaction::TxManager;
//!
//! let manager = TxManager::new(GitStore::open_or_init("./data")?);
//!
//! manager.within_tx(&Context::background(), |ctx, tx| {
//!     tx.upsert(&users, key, json!({"name": "Alice"}))?;
//!     audit(&manager, ctx)?; // calls within_tx again and joins this tx
//!     Ok::<_, StoreError>(())
//! })?;
//! ```

mod manager;
mod observer;
mod resource;

#[cfg(test)]
pub(crate) mod mock;

pub use manager::TxManager;
pub use observer::{NoopObserver, TracingObserver, TxEvent, TxObserver};
pub use resource::{ResourceError, TxHandle, TxResource};
