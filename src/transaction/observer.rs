//! Side-channel notifications about transaction lifecycle.
//!
//! The manager reports what it does to a [`TxObserver`]. Observers only
//! watch: nothing they do (including panicking) changes how a transaction is
//! finalized or what `within_tx` returns.

use std::fmt;

/// A lifecycle step taken by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxEvent {
    /// No transaction in context, opening a new one.
    Begin,
    /// The backend refused to open a transaction.
    BeginFailed,
    /// A transaction is already bound; the caller joins it.
    Reuse,
    /// A call that joined an existing transaction returned an error. The
    /// owning call decides what happens to the transaction.
    NestedError,
    /// The unit of work panicked; rolling back before re-raising.
    RollbackOnPanic,
    /// The unit of work returned an error; rolling back.
    RollbackOnError,
    /// Rolling back failed. The primary outcome is unaffected.
    RollbackFailed,
    /// The unit of work succeeded; committing.
    Commit,
    /// Commit failed; its error becomes the result.
    CommitFailed,
}

impl TxEvent {
    /// Short, stable message for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxEvent::Begin => "tx: creating new",
            TxEvent::BeginFailed => "tx: begin failed",
            TxEvent::Reuse => "tx: using existing",
            TxEvent::NestedError => "tx: error in nested call",
            TxEvent::RollbackOnPanic => "tx: rollback due to panic",
            TxEvent::RollbackOnError => "tx: rollback due to error",
            TxEvent::RollbackFailed => "tx: rollback failed",
            TxEvent::Commit => "tx: commit",
            TxEvent::CommitFailed => "tx: commit failed",
        }
    }

    /// Whether the event marks the call as failed.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            TxEvent::BeginFailed
                | TxEvent::NestedError
                | TxEvent::RollbackOnPanic
                | TxEvent::RollbackOnError
                | TxEvent::RollbackFailed
                | TxEvent::CommitFailed
        )
    }
}

impl fmt::Display for TxEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives lifecycle notifications from a `TxManager`.
pub trait TxObserver: Send + Sync {
    /// Called once per event. `error` carries the failure being reported,
    /// when the event has one.
    fn observe(&self, event: TxEvent, error: Option<&dyn fmt::Display>);
}

/// Forwards events to `tracing`. This is the default observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TxObserver for TracingObserver {
    fn observe(&self, event: TxEvent, error: Option<&dyn fmt::Display>) {
        match (event, error) {
            (TxEvent::RollbackFailed | TxEvent::CommitFailed, Some(err)) => {
                tracing::error!(
                    event = event.as_str(),
                    error = %err,
                    "transaction finalize failed"
                );
            }
            (_, Some(err)) => {
                tracing::warn!(event = event.as_str(), error = %err, "transaction event");
            }
            (_, None) if event.is_error() => {
                tracing::warn!(event = event.as_str(), "transaction event");
            }
            (_, None) => {
                tracing::debug!(event = event.as_str(), "transaction event");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TxObserver for NoopObserver {
    fn observe(&self, _event: TxEvent, _error: Option<&dyn fmt::Display>) {}
}
