//! Counting in-memory backend for manager tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::transaction::observer::{TxEvent, TxObserver};
use crate::transaction::resource::{TxHandle, TxResource};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MockError(String);

impl MockError {
    pub fn new(message: &str) -> Self {
        Self(message.to_string())
    }
}

#[derive(Debug, Default)]
struct Counters {
    next_id: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

#[derive(Debug, Default)]
struct Failures {
    begin: Option<MockError>,
    commit: Option<MockError>,
    rollback: Option<MockError>,
}

/// Counts begin/commit/rollback calls and fails on demand.
#[derive(Debug, Clone, Default)]
pub struct MockResource {
    counters: Arc<Counters>,
    failures: Arc<Failures>,
}

impl MockResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_begin(self, err: MockError) -> Self {
        self.with_failures(|f| f.begin = Some(err))
    }

    pub fn fail_commit(self, err: MockError) -> Self {
        self.with_failures(|f| f.commit = Some(err))
    }

    pub fn fail_rollback(self, err: MockError) -> Self {
        self.with_failures(|f| f.rollback = Some(err))
    }

    fn with_failures(self, set: impl FnOnce(&mut Failures)) -> Self {
        let mut failures = Failures {
            begin: self.failures.begin.clone(),
            commit: self.failures.commit.clone(),
            rollback: self.failures.rollback.clone(),
        };
        set(&mut failures);
        Self {
            counters: self.counters,
            failures: Arc::new(failures),
        }
    }

    pub fn begins(&self) -> usize {
        self.counters.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }
}

impl TxResource for MockResource {
    type Tx = MockTx;

    fn begin(&self) -> Result<MockTx, MockError> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failures.begin {
            return Err(err.clone());
        }
        Ok(MockTx {
            id: self.counters.next_id.fetch_add(1, Ordering::SeqCst),
            counters: Arc::clone(&self.counters),
            failures: Arc::clone(&self.failures),
        })
    }
}

#[derive(Debug)]
pub struct MockTx {
    id: usize,
    counters: Arc<Counters>,
    failures: Arc<Failures>,
}

impl MockTx {
    pub fn id(&self) -> usize {
        self.id
    }
}

impl TxHandle for MockTx {
    type Error = MockError;

    fn commit(&self) -> Result<(), MockError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        match &self.failures.commit {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn rollback(&self) -> Result<(), MockError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        match &self.failures.rollback {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Remembers every event (and rendered error) it sees.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    seen: Arc<Mutex<Vec<(TxEvent, Option<String>)>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<TxEvent> {
        self.seen.lock().iter().map(|(event, _)| *event).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|(_, err)| err.clone())
            .collect()
    }
}

impl TxObserver for RecordingObserver {
    fn observe(&self, event: TxEvent, error: Option<&dyn fmt::Display>) {
        self.seen
            .lock()
            .push((event, error.map(|err| err.to_string())));
    }
}
