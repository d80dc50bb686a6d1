//! Storage layer error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::transaction::TxStatus;
use crate::storage::types::{CommitId, InvalidNameError, RowKey, TableName};

/// The error type for store and transaction operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// no store at the given path
    #[error("store not initialized: {0}")]
    NotInitialized(PathBuf),

    #[error("row not found: table={table}, key={key}")]
    RowNotFound { table: TableName, key: RowKey },

    /// duplicate primary key on insert
    #[error("row already exists: table={table}, key={key}")]
    RowAlreadyExists { table: TableName, key: RowKey },

    /// row data was not a JSON object
    #[error("invalid row: {0}")]
    InvalidRow(String),

    /// data integrity check failed
    #[error("corrupted data at {path}: {reason}")]
    CorruptedData { path: String, reason: String },

    /// main moved after the transaction began
    #[error("transaction {tx_id} conflicts: main moved from {expected} to {found}")]
    Conflict {
        tx_id: String,
        expected: CommitId,
        found: CommitId,
    },

    /// the transaction was already committed or rolled back
    #[error("transaction {tx_id} is no longer active (state: {status})")]
    NotActive { tx_id: String, status: TxStatus },

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),
}

impl StoreError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::RowNotFound { .. }
                | StoreError::RefNotFound(_)
                | StoreError::NotInitialized(_)
        )
    }

    /// check if this error is a conflict with other writers
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::RowAlreadyExists { .. } | StoreError::Conflict { .. }
        )
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
