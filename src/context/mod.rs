//! Immutable, hierarchical execution context.
//!
//! A [`Context`] is an append-only chain of bindings. Deriving a context never
//! touches its parent: every `with_*` call returns a new head that points back
//! at the old one, so a context can be cloned and handed to other threads
//! freely.
//!
//! Besides ordinary call-scoped values, the chain can carry the current
//! transaction handle. That binding lives in a private slot that no public
//! [`Key`] can reach; it is read with [`Context::transaction`] and written
//! only by the transaction manager.
//!
//! ```ignore
//! use transactor::context::{Context, Key};
//!
//! const REQUEST_ID: Key = Key::new("request_id");
//!
//! let ctx = Context::background().with_value(REQUEST_ID, String::from("r-42"));
//! assert_eq!(ctx.value::<String>(REQUEST_ID).map(String::as_str), Some("r-42"));
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Name of a user value bound in a [`Context`].
///
/// Keys compare by name, so give them a crate-specific prefix if several
/// libraries share one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(&'static str);

impl Key {
    /// Create a key with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The key's name.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a binding lives. The transaction slot is never reachable by `Key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Value(Key),
    Transaction,
}

type Shared = Arc<dyn Any + Send + Sync>;

struct Node {
    slot: Slot,
    value: Shared,
    parent: Option<Arc<Node>>,
}

/// An immutable execution context.
///
/// Cloning is cheap (one `Arc` bump) and the clone shares every binding.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

impl Context {
    /// The empty root context.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context with `value` bound under `key`.
    ///
    /// The new binding shadows any outer binding of the same key.
    pub fn with_value<T>(&self, key: Key, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.push(Slot::Value(key), Arc::new(value))
    }

    /// Nearest value bound under `key`.
    ///
    /// Returns `None` if the key is unbound, or if the nearest binding holds
    /// a different type.
    pub fn value<T>(&self, key: Key) -> Option<&T>
    where
        T: Any + Send + Sync,
    {
        self.find(Slot::Value(key))?.downcast_ref::<T>()
    }

    /// Derive a context carrying `handle` as the current transaction.
    pub(crate) fn with_transaction<H>(&self, handle: Arc<H>) -> Self
    where
        H: Any + Send + Sync,
    {
        self.push(Slot::Transaction, handle)
    }

    /// The nearest transaction handle of type `H` bound in this context.
    ///
    /// The returned `Arc` is the very handle that was bound: compare with
    /// [`Arc::ptr_eq`] to check identity. Handles of other types are skipped,
    /// so a backend's transaction stays visible underneath another backend's.
    pub fn transaction<H>(&self) -> Option<Arc<H>>
    where
        H: Any + Send + Sync,
    {
        self.nodes()
            .filter(|node| node.slot == Slot::Transaction)
            .find_map(|node| Arc::clone(&node.value).downcast::<H>().ok())
    }

    /// Whether any transaction handle is bound, regardless of its type.
    pub fn has_transaction(&self) -> bool {
        self.find(Slot::Transaction).is_some()
    }

    /// Number of bindings in the chain.
    pub fn depth(&self) -> usize {
        self.nodes().count()
    }

    fn push(&self, slot: Slot, value: Shared) -> Self {
        Self {
            head: Some(Arc::new(Node {
                slot,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    fn find(&self, slot: Slot) -> Option<&Shared> {
        self.nodes()
            .find(|node| node.slot == slot)
            .map(|node| &node.value)
    }

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(self.head.as_deref(), |node| node.parent.as_deref())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<String> = self
            .nodes()
            .map(|node| match node.slot {
                Slot::Value(key) => key.to_string(),
                Slot::Transaction => "<transaction>".to_string(),
            })
            .collect();

        f.debug_struct("Context").field("bindings", &slots).finish()
    }
}
