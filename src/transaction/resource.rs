//! The contract a transactional backend offers the manager.

use std::error::Error;
use std::sync::Arc;

/// An open transaction.
///
/// Finalizers take `&self`: the handle is shared between the owning
/// `within_tx` call and every nested call through an `Arc`, so it tracks its
/// own lifecycle internally.
pub trait TxHandle: Send + Sync + 'static {
    /// Error produced by the backend.
    type Error: Error + Send + Sync + 'static;

    /// Make the transaction's writes durable.
    fn commit(&self) -> Result<(), Self::Error>;

    /// Discard the transaction's writes.
    fn rollback(&self) -> Result<(), Self::Error>;
}

/// Something that can open transactions.
pub trait TxResource {
    /// Handle type produced by [`begin`](TxResource::begin).
    type Tx: TxHandle;

    /// Open a new transaction.
    fn begin(&self) -> Result<Self::Tx, <Self::Tx as TxHandle>::Error>;
}

/// Error type shared by a resource and its handles.
pub type ResourceError<R> = <<R as TxResource>::Tx as TxHandle>::Error;

impl<R: TxResource + ?Sized> TxResource for Arc<R> {
    type Tx = R::Tx;

    fn begin(&self) -> Result<Self::Tx, <Self::Tx as TxHandle>::Error> {
        (**self).begin()
    }
}

impl<R: TxResource + ?Sized> TxResource for &R {
    type Tx = R::Tx;

    fn begin(&self) -> Result<Self::Tx, <Self::Tx as TxHandle>::Error> {
        (**self).begin()
    }
}
