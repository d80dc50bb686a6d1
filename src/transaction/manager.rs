//! Transaction manager - opens, joins and finalizes transactions.
//!
//! The manager is the only place a transaction is begun or finalized. It
//! handles:
//! - Detecting a transaction already bound in the context
//! - Opening one (and binding it) when there is none
//! - Committing or rolling back when the owning call finishes, including
//!   when the unit of work panics

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::Context;
use crate::transaction::observer::{TracingObserver, TxEvent, TxObserver};
use crate::transaction::resource::{ResourceError, TxHandle, TxResource};

/// Transaction manager over a backend `R`.
///
/// Thread-safe when `R` is: can be shared across threads via Clone (uses Arc
/// internally).
pub struct TxManager<R> {
    inner: Arc<TxManagerInner<R>>,
}

struct TxManagerInner<R> {
    /// The backend transactions are opened on.
    resource: R,
    /// Side channel for lifecycle notifications.
    observer: Arc<dyn TxObserver>,
}

impl<R> Clone for TxManager<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TxResource> TxManager<R> {
    /// Create a manager that reports to `tracing`.
    pub fn new(resource: R) -> Self {
        Self::with_observer(resource, TracingObserver)
    }

    /// Create a manager with a custom observer.
    pub fn with_observer(resource: R, observer: impl TxObserver + 'static) -> Self {
        Self {
            inner: Arc::new(TxManagerInner {
                resource,
                observer: Arc::new(observer),
            }),
        }
    }

    /// Get a reference to the underlying backend.
    pub fn resource(&self) -> &R {
        &self.inner.resource
    }

    /// Run `work` inside a transaction.
    ///
    /// If `ctx` already carries a transaction of this backend's handle type,
    /// `work` runs with `ctx` and that handle unchanged, and nothing is
    /// committed or rolled back here: the call that opened the transaction
    /// finalizes it. An error from such a call is still reported to the
    /// observer before it is returned.
    ///
    /// Otherwise a transaction is opened and bound into a derived context,
    /// and `work` runs with that context. Afterwards:
    /// - `Ok` commits; a commit error becomes the result.
    /// - `Err` rolls back and returns the error as is.
    /// - a panic rolls back and is re-raised with its original payload.
    ///
    /// Rollback errors never replace the primary outcome; they are reported to
    /// the observer only. Errors from the backend reach the caller through
    /// `E: From<...>`, which is the identity when `E` is the backend's own
    /// error type.
    ///
    /// `work` must not commit or roll back the handle it is given. It may use
    /// either the handle argument or [`Context::transaction`] on its context;
    /// both are the same `Arc`.
    ///
    /// ```ignore
    /// manager.within_tx(&ctx, |outer_ctx, outer_tx| {
    ///     // a new transaction was opened and bound into outer_ctx
    ///     manager.within_tx(outer_ctx, |inner_ctx, inner_tx| {
    ///         // nothing opened: inner_tx is outer_tx
    ///         Ok(())
    ///     })?;
    ///     // nothing finalized yet; that happens when this closure returns
    ///     Ok(())
    /// })?;
    /// ```
    pub fn within_tx<T, E, F>(&self, ctx: &Context, work: F) -> Result<T, E>
    where
        F: FnOnce(&Context, &Arc<R::Tx>) -> Result<T, E>,
        E: From<ResourceError<R>> + fmt::Display,
    {
        let span = tracing::debug_span!(
            "within_tx",
            owner = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        let _entered = span.enter();

        if let Some(tx) = ctx.transaction::<R::Tx>() {
            span.record("owner", false);
            self.notify(TxEvent::Reuse, None);
            let result = work(ctx, &tx);
            if let Err(err) = &result {
                span.record("error", tracing::field::display(err));
                self.notify(TxEvent::NestedError, Some(err));
            }
            return result;
        }

        span.record("owner", true);
        self.notify(TxEvent::Begin, None);

        let tx = match self.inner.resource.begin() {
            Ok(tx) => Arc::new(tx),
            Err(err) => {
                span.record("error", tracing::field::display(&err));
                self.notify(TxEvent::BeginFailed, Some(&err));
                return Err(E::from(err));
            }
        };

        let ctx = ctx.with_transaction(Arc::clone(&tx));

        match panic::catch_unwind(AssertUnwindSafe(|| work(&ctx, &tx))) {
            Err(payload) => {
                self.notify(TxEvent::RollbackOnPanic, None);
                self.rollback_quietly(&tx);
                panic::resume_unwind(payload)
            }
            Ok(Err(err)) => {
                span.record("error", tracing::field::display(&err));
                self.notify(TxEvent::RollbackOnError, Some(&err));
                self.rollback_quietly(&tx);
                Err(err)
            }
            Ok(Ok(value)) => {
                self.notify(TxEvent::Commit, None);
                match tx.commit() {
                    Ok(()) => Ok(value),
                    Err(err) => {
                        span.record("error", tracing::field::display(&err));
                        self.notify(TxEvent::CommitFailed, Some(&err));
                        Err(E::from(err))
                    }
                }
            }
        }
    }

    /// Roll back, reporting (not returning) any failure.
    fn rollback_quietly(&self, tx: &R::Tx) {
        if let Err(err) = tx.rollback() {
            self.notify(TxEvent::RollbackFailed, Some(&err));
        }
    }

    fn notify(&self, event: TxEvent, error: Option<&dyn fmt::Display>) {
        let observer = &self.inner.observer;
        // A misbehaving observer must not change the outcome.
        let _ = panic::catch_unwind(AssertUnwindSafe(|| observer.observe(event, error)));
    }
}

impl<R> fmt::Debug for TxManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crate::context::Key;
    use crate::transaction::mock::{MockError, MockResource, MockTx, RecordingObserver};

    fn setup() -> (MockResource, RecordingObserver, TxManager<MockResource>) {
        let resource = MockResource::new();
        let observer = RecordingObserver::default();
        let manager = TxManager::with_observer(resource.clone(), observer.clone());
        (resource, observer, manager)
    }

    #[test]
    fn test_success_commits_once() {
        let (resource, observer, manager) = setup();

        let result: Result<u32, MockError> =
            manager.within_tx(&Context::background(), |_, _| Ok(42));

        assert_eq!(result, Ok(42));
        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 0);
        assert_eq!(observer.events(), vec![TxEvent::Begin, TxEvent::Commit]);
    }

    #[test]
    fn test_context_values_are_passed() {
        let (_resource, _observer, manager) = setup();
        const SOME_KEY: Key = Key::new("some_key");
        let base = Context::background().with_value(SOME_KEY, "some_value");

        let result: Result<(), MockError> = manager.within_tx(&base, |ctx, tx| {
            assert_eq!(ctx.value::<&str>(SOME_KEY), Some(&"some_value"));
            let bound = ctx.transaction::<MockTx>().unwrap();
            assert!(Arc::ptr_eq(&bound, tx));
            Ok(())
        });

        assert!(result.is_ok());
        // The caller's context is untouched.
        assert!(base.transaction::<MockTx>().is_none());
    }

    #[test]
    fn test_nested_calls_share_one_transaction() {
        let (resource, observer, manager) = setup();

        let result: Result<(), MockError> =
            manager.within_tx(&Context::background(), |ctx, outer| {
                manager.within_tx(ctx, |ctx, middle| {
                    assert!(Arc::ptr_eq(outer, middle));
                    manager.within_tx(ctx, |_, inner| {
                        assert!(Arc::ptr_eq(outer, inner));
                        assert_eq!(resource.commits(), 0);
                        Ok::<_, MockError>(())
                    })
                })?;
                // Nested calls returned but nothing is finalized yet.
                assert_eq!(resource.commits(), 0);
                assert_eq!(resource.rollbacks(), 0);
                Ok(())
            });

        assert!(result.is_ok());
        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 0);
        assert_eq!(
            observer.events(),
            vec![TxEvent::Begin, TxEvent::Reuse, TxEvent::Reuse, TxEvent::Commit]
        );
    }

    #[test]
    fn test_nested_call_passes_context_through() {
        let (_resource, _observer, manager) = setup();

        let result: Result<(), MockError> =
            manager.within_tx(&Context::background(), |outer_ctx, _| {
                let depth = outer_ctx.depth();
                manager.within_tx(outer_ctx, |inner_ctx, _| {
                    assert_eq!(inner_ctx.depth(), depth);
                    Ok(())
                })
            });
        assert!(result.is_ok());
    }

    #[test]
    fn test_error_causes_rollback() {
        let (resource, observer, manager) = setup();
        let some_error = MockError::new("some error occurred");

        let result: Result<(), MockError> =
            manager.within_tx(&Context::background(), |_, _| Err(some_error.clone()));

        assert_eq!(result, Err(some_error));
        assert_eq!(resource.commits(), 0);
        assert_eq!(resource.rollbacks(), 1);
        assert_eq!(observer.events(), vec![TxEvent::Begin, TxEvent::RollbackOnError]);
    }

    #[test]
    fn test_nested_error_rolls_back_at_owner() {
        let (resource, observer, manager) = setup();
        let inner_error = MockError::new("inner failed");

        let result: Result<(), MockError> = manager.within_tx(&Context::background(), |ctx, _| {
            manager.within_tx(ctx, |_, _| Err::<(), _>(inner_error.clone()))?;
            assert_eq!(resource.rollbacks(), 0);
            Ok(())
        });

        assert_eq!(result, Err(inner_error));
        assert_eq!(resource.begins(), 1);
        assert_eq!(resource.rollbacks(), 1);
        assert_eq!(resource.commits(), 0);
        // The nested call reports its own failure before the owner rolls back.
        assert_eq!(
            observer.events(),
            vec![TxEvent::Begin, TxEvent::Reuse, TxEvent::NestedError, TxEvent::RollbackOnError]
        );
        assert_eq!(
            observer.errors(),
            vec!["inner failed".to_string(), "inner failed".to_string()]
        );
    }

    #[test]
    fn test_panic_causes_rollback_and_panic() {
        let (resource, observer, manager) = setup();

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), MockError> = manager.within_tx(&Context::background(), |_, _| {
                panic!("panic in transaction!");
            });
        }));

        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"panic in transaction!"));
        assert_eq!(resource.rollbacks(), 1);
        assert_eq!(resource.commits(), 0);
        assert_eq!(observer.events(), vec![TxEvent::Begin, TxEvent::RollbackOnPanic]);
    }

    #[test]
    fn test_panic_payload_survives_rollback_failure() {
        let resource = MockResource::new().fail_rollback(MockError::new("rollback broke"));
        let observer = RecordingObserver::default();
        let manager = TxManager::with_observer(resource.clone(), observer.clone());

        #[derive(Debug, PartialEq)]
        struct Invariant(u8);

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), MockError> = manager.within_tx(&Context::background(), |_, _| {
                panic::panic_any(Invariant(7));
            });
        }));

        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<Invariant>(), Some(&Invariant(7)));
        assert_eq!(resource.rollbacks(), 1);
        assert_eq!(
            observer.events(),
            vec![TxEvent::Begin, TxEvent::RollbackOnPanic, TxEvent::RollbackFailed]
        );
        assert_eq!(observer.errors(), vec!["rollback broke".to_string()]);
    }

    #[test]
    fn test_begin_error_skips_work() {
        let begin_error = MockError::new("error on begin tx");
        let resource = MockResource::new().fail_begin(begin_error.clone());
        let manager = TxManager::with_observer(resource.clone(), RecordingObserver::default());
        let mut calls = 0;

        let result: Result<(), MockError> = manager.within_tx(&Context::background(), |_, _| {
            calls += 1;
            Ok(())
        });

        assert_eq!(result, Err(begin_error));
        assert_eq!(calls, 0);
        assert_eq!(resource.commits(), 0);
        assert_eq!(resource.rollbacks(), 0);
    }

    #[test]
    fn test_commit_error_overrides_success() {
        let commit_error = MockError::new("error on commit tx");
        let resource = MockResource::new().fail_commit(commit_error.clone());
        let observer = RecordingObserver::default();
        let manager = TxManager::with_observer(resource.clone(), observer.clone());

        let result: Result<(), MockError> =
            manager.within_tx(&Context::background(), |_, _| Ok(()));

        assert_eq!(result, Err(commit_error));
        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 0);
        assert_eq!(
            observer.events(),
            vec![TxEvent::Begin, TxEvent::Commit, TxEvent::CommitFailed]
        );
    }

    #[test]
    fn test_rollback_error_does_not_replace_work_error() {
        let resource = MockResource::new().fail_rollback(MockError::new("rollback broke"));
        let observer = RecordingObserver::default();
        let manager = TxManager::with_observer(resource.clone(), observer.clone());
        let work_error = MockError::new("work failed");

        let result: Result<(), MockError> =
            manager.within_tx(&Context::background(), |_, _| Err(work_error.clone()));

        assert_eq!(result, Err(work_error));
        assert_eq!(
            observer.events(),
            vec![TxEvent::Begin, TxEvent::RollbackOnError, TxEvent::RollbackFailed]
        );
        assert_eq!(
            observer.errors(),
            vec!["work failed".to_string(), "rollback broke".to_string()]
        );
    }

    #[test]
    fn test_panicking_observer_is_ignored() {
        struct Exploding;
        impl TxObserver for Exploding {
            fn observe(&self, _event: TxEvent, _error: Option<&dyn fmt::Display>) {
                panic!("observer exploded");
            }
        }

        let resource = MockResource::new();
        let manager = TxManager::with_observer(resource.clone(), Exploding);
        let work_error = MockError::new("work failed");

        let ok: Result<u8, MockError> = manager.within_tx(&Context::background(), |_, _| Ok(1));
        let err: Result<u8, MockError> =
            manager.within_tx(&Context::background(), |_, _| Err(work_error.clone()));

        assert_eq!(ok, Ok(1));
        assert_eq!(err, Err(work_error));
        assert_eq!(resource.commits(), 1);
        assert_eq!(resource.rollbacks(), 1);
    }

    #[test]
    fn test_concurrent_owners_get_distinct_transactions() {
        let (resource, _observer, manager) = setup();
        let root = Context::background();

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                let root = root.clone();
                thread::spawn(move || {
                    manager
                        .within_tx(&root, |ctx, tx| {
                            let seen = ctx.transaction::<MockTx>().unwrap();
                            assert!(Arc::ptr_eq(&seen, tx));
                            Ok::<_, MockError>(tx.id())
                        })
                        .unwrap()
                })
            })
            .collect();

        let mut ids: Vec<usize> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
        assert_eq!(resource.begins(), 4);
        assert_eq!(resource.commits(), 4);
    }

    #[test]
    fn test_manager_over_shared_resource() {
        let resource = Arc::new(MockResource::new());
        let manager = TxManager::with_observer(Arc::clone(&resource), RecordingObserver::default());

        let result: Result<(), MockError> =
            manager.within_tx(&Context::background(), |_, _| Ok(()));

        assert!(result.is_ok());
        assert_eq!(manager.resource().commits(), 1);
        assert_eq!(resource.commits(), 1);
    }
}
