// ============================================================================
// spark-bindings - Store Interface
// The asynchronous, set-valued data source projections are built on
// ============================================================================

pub mod extract;
pub mod memory;
pub mod signal;
pub mod value;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::StoreError;

pub use extract::CommonValue;
pub use memory::MemoryStore;
pub use signal::{query_signal, QuerySignalOptions};
pub use value::{PortableId, Row, Value};

// =============================================================================
// DIFFERENTIAL
// =============================================================================

/// A change reported by the store: rows that appeared and rows that went
/// away. A logical update shows up as the same id in both sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Differential {
    pub added: Vec<Row>,
    pub removed: Vec<Row>,
}

impl Differential {
    pub fn new(added: Vec<Row>, removed: Vec<Row>) -> Self {
        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Opaque token naming a store state that a commit is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot(u64);

impl Snapshot {
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    pub const fn version(self) -> u64 {
        self.0
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Completion of a one-shot query.
pub type QueryCompletion = Box<dyn FnOnce(Result<Vec<Row>, StoreError>)>;

/// Receives change notifications from a store.
///
/// Every `will_change` is followed by exactly one `changed` or
/// `change_failed`, then one `did_change`, all on the caller's timeline.
pub trait StoreObserver {
    fn will_change(&self);

    fn changed(&self, differential: &Differential);

    fn did_change(&self);

    fn change_failed(&self, error: &StoreError) {
        warn!(error = %error, "store change failed");
    }
}

/// An asynchronous, set-valued data source.
pub trait Store {
    /// Fetches the full current content. `completion` runs later, never
    /// from inside this call.
    fn query(&self, completion: QueryCompletion);

    /// Registers `observer` for change notifications.
    fn subscribe(&self, observer: std::rc::Rc<dyn StoreObserver>) -> StoreSubscription;
}

/// Runs a query and post-processes its rows before handing them on.
pub fn query_with<S, T>(
    store: &S,
    postprocess: impl FnOnce(Vec<Row>) -> T + 'static,
    completion: impl FnOnce(Result<T, StoreError>) + 'static,
) where
    S: Store + ?Sized,
{
    store.query(Box::new(move |result| completion(result.map(postprocess))));
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Keeps a store subscription alive. Dropping it unsubscribes.
#[must_use = "dropping a StoreSubscription unsubscribes immediately"]
pub struct StoreSubscription {
    removal: Option<Box<dyn FnOnce()>>,
}

impl StoreSubscription {
    pub fn new(removal: impl FnOnce() + 'static) -> Self {
        Self {
            removal: Some(Box::new(removal)),
        }
    }

    /// Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(removal) = self.removal.take() {
            removal();
        }
    }

    pub fn is_active(&self) -> bool {
        self.removal.is_some()
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn empty_differential() {
        assert!(Differential::default().is_empty());
        let diff = Differential::new(vec![Row::new().with("id", 1)], vec![]);
        assert!(!diff.is_empty());
    }

    #[test]
    fn subscription_unsubscribes_once() {
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let mut sub = StoreSubscription::new(move || c.set(c.get() + 1));
        sub.unsubscribe();
        sub.unsubscribe();
        drop(sub);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn query_with_postprocesses() {
        let store = MemoryStore::new("id");
        store.insert(Row::new().with("id", 1)).unwrap();
        store.insert(Row::new().with("id", 2)).unwrap();
        store.flush();

        let count = Rc::new(RefCell::new(None));
        let c = count.clone();
        query_with(
            &*store,
            |rows| rows.len(),
            move |result| *c.borrow_mut() = Some(result),
        );
        assert!(count.borrow().is_none());
        store.flush();
        assert_eq!(*count.borrow(), Some(Ok(2)));
    }
}
