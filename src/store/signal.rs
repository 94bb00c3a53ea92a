// ============================================================================
// spark-bindings - Query Signal
// A signal that re-runs a store query every time the store changes
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::core::error::StoreError;
use crate::core::types::{default_equals, ChangeMetadata, EqualsFn};
use crate::primitives::signal::{
    deliver_value, Notify, ObserverFn, ObserverRemoval, Signal, SignalSource,
};
use crate::store::value::Row;
use crate::store::{Differential, Store, StoreObserver, StoreSubscription};

/// Options for [`query_signal`].
pub struct QuerySignalOptions<T> {
    /// Results equal to the last delivered value are not delivered again.
    pub equals: EqualsFn<T>,
    /// Delivered when a query fails. Without it a failure delivers nothing.
    pub fallback_on_error: Option<T>,
}

impl<T: PartialEq> Default for QuerySignalOptions<T> {
    fn default() -> Self {
        Self {
            equals: default_equals,
            fallback_on_error: None,
        }
    }
}

/// A signal carrying `postprocess(rows)` for the store's current content.
///
/// Nothing happens until the first observer attaches; that observer starts
/// the subscription and the first query. Every store change opens a window
/// on the signal, and the window closes once the follow-up query has landed.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use spark_bindings::{query_signal, MemoryStore, QuerySignalOptions, Row};
///
/// let store = MemoryStore::new("id");
/// let count = query_signal(store.clone(), |rows| rows.len(), QuerySignalOptions::default());
///
/// let seen = Rc::new(Cell::new(0));
/// let s = seen.clone();
/// let _removal = count.observe_changing(move |n, _| s.set(*n));
///
/// store.insert(Row::new().with("id", 1)).unwrap();
/// store.flush();
/// assert_eq!(seen.get(), 1);
/// ```
pub fn query_signal<T: Clone + 'static>(
    store: Rc<dyn Store>,
    postprocess: impl Fn(&[Row]) -> T + 'static,
    options: QuerySignalOptions<T>,
) -> Signal<T> {
    let (signal, notify) = Signal::pipe();
    let core = Rc::new(QueryCore {
        store,
        notify: notify.clone(),
        postprocess: Box::new(postprocess),
        options,
        last: RefCell::new(None),
        subscription: RefCell::new(None),
        started: Cell::new(false),
    });

    let weak = Rc::downgrade(&core);
    notify.set_on_observe(move |observer| {
        if let Some(core) = weak.upgrade() {
            core.observer_attached(observer);
        }
    });

    Signal::from_source(Rc::new(QuerySource { _core: core, signal }))
}

// =============================================================================
// CORE
// =============================================================================

struct QueryCore<T> {
    store: Rc<dyn Store>,
    notify: Notify<T>,
    postprocess: Box<dyn Fn(&[Row]) -> T>,
    options: QuerySignalOptions<T>,
    last: RefCell<Option<T>>,
    subscription: RefCell<Option<StoreSubscription>>,
    started: Cell<bool>,
}

impl<T: Clone + 'static> QueryCore<T> {
    fn observer_attached(self: &Rc<Self>, observer: &ObserverFn<T>) {
        if !self.started.get() {
            self.start();
            return;
        }
        let last = self.last.borrow().clone();
        if let Some(value) = last {
            deliver_value(observer, value, ChangeMetadata::committed());
        }
    }

    fn start(self: &Rc<Self>) {
        self.started.set(true);
        debug!("query signal started");
        let adapter: Rc<dyn StoreObserver> = Rc::new(StoreAdapter {
            core: Rc::downgrade(self),
        });
        let subscription = self.store.subscribe(adapter);
        *self.subscription.borrow_mut() = Some(subscription);

        self.notify.will_change();
        self.issue_query();
    }

    /// Runs a query and closes one window when it lands.
    fn issue_query(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.store.query(Box::new(move |result| {
            if let Some(core) = weak.upgrade() {
                core.complete(result);
            }
        }));
    }

    fn complete(&self, result: Result<Vec<Row>, StoreError>) {
        let value = match result {
            Ok(rows) => Some((self.postprocess)(&rows)),
            Err(error) => {
                warn!(error = %error, "query signal query failed");
                self.options.fallback_on_error.clone()
            }
        };
        if let Some(value) = value {
            let unchanged = self
                .last
                .borrow()
                .as_ref()
                .is_some_and(|last| (self.options.equals)(last, &value));
            if !unchanged {
                *self.last.borrow_mut() = Some(value.clone());
                self.notify.changing(value, ChangeMetadata::committed());
            }
        }
        self.notify.did_change();
    }
}

struct StoreAdapter<T> {
    core: Weak<QueryCore<T>>,
}

impl<T: Clone + 'static> StoreObserver for StoreAdapter<T> {
    fn will_change(&self) {
        if let Some(core) = self.core.upgrade() {
            core.notify.will_change();
        }
    }

    fn changed(&self, _differential: &Differential) {}

    fn did_change(&self) {
        if let Some(core) = self.core.upgrade() {
            core.issue_query();
        }
    }
}

// =============================================================================
// SOURCE
// =============================================================================

/// Keeps the core alive for as long as the signal is.
struct QuerySource<T> {
    _core: Rc<QueryCore<T>>,
    signal: Signal<T>,
}

impl<T: 'static> SignalSource<T> for QuerySource<T> {
    fn observe(&self, observer: ObserverFn<T>) -> ObserverRemoval {
        self.signal.observe_rc(observer)
    }

    fn observer_count(&self) -> usize {
        self.signal.observer_count()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SignalEvent;
    use crate::store::memory::MemoryStore;
    use crate::store::value::Value;

    fn events_of<T: Clone + 'static>(
        signal: &Signal<T>,
    ) -> (Rc<RefCell<Vec<SignalEvent<T>>>>, ObserverRemoval) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let removal = signal.observe(move |event| e.borrow_mut().push(event.clone()));
        (events, removal)
    }

    #[test]
    fn subscribes_lazily() {
        let store = MemoryStore::new("id");
        let signal = query_signal(store.clone(), |rows| rows.len(), QuerySignalOptions::default());
        assert_eq!(store.observer_count(), 0);
        assert_eq!(store.query_count(), 0);

        let (events, _removal) = events_of(&signal);
        assert_eq!(store.observer_count(), 1);
        assert_eq!(*events.borrow(), vec![SignalEvent::WillChange]);

        store.flush();
        assert_eq!(
            *events.borrow(),
            vec![
                SignalEvent::WillChange,
                SignalEvent::Changing(0, ChangeMetadata::committed()),
                SignalEvent::DidChange,
            ]
        );
    }

    #[test]
    fn store_change_window_spans_the_requery() {
        let store = MemoryStore::new("id");
        let signal = query_signal(store.clone(), |rows| rows.len(), QuerySignalOptions::default());
        let (events, _removal) = events_of(&signal);
        store.flush();
        events.borrow_mut().clear();

        store.insert(Row::new().with("id", 1)).unwrap();
        assert_eq!(*events.borrow(), vec![SignalEvent::WillChange]);

        // Differential lands and the follow-up query is issued.
        assert!(store.step());
        assert_eq!(events.borrow().len(), 1);

        store.flush();
        assert_eq!(
            *events.borrow(),
            vec![
                SignalEvent::WillChange,
                SignalEvent::Changing(1, ChangeMetadata::committed()),
                SignalEvent::DidChange,
            ]
        );
    }

    #[test]
    fn equal_results_are_not_redelivered() {
        let store = MemoryStore::with_rows("id", vec![Row::new().with("id", 1).with("n", 3)]);
        let signal = query_signal(store.clone(), |rows| rows.len(), QuerySignalOptions::default());
        let (events, _removal) = events_of(&signal);
        store.flush();

        store.set(&Value::Integer(1), "n", 4).unwrap();
        store.flush();
        let changing = events.borrow().iter().filter(|e| e.is_changing()).count();
        assert_eq!(changing, 1);
        assert_eq!(events.borrow().last(), Some(&SignalEvent::DidChange));
    }

    #[test]
    fn failure_delivers_fallback() {
        let store = MemoryStore::new("id");
        store.fail_next_query(StoreError::Unavailable);
        let signal = query_signal(
            store.clone(),
            |rows| rows.len() as i64,
            QuerySignalOptions {
                fallback_on_error: Some(-1),
                ..QuerySignalOptions::default()
            },
        );
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        let _removal = signal.observe_changing(move |v, _| s.set(*v));
        store.flush();
        assert_eq!(seen.get(), -1);
    }

    #[test]
    fn late_observer_gets_cached_value() {
        let store = MemoryStore::with_rows("id", vec![Row::new().with("id", 1)]);
        let signal = query_signal(store.clone(), |rows| rows.len(), QuerySignalOptions::default());
        let (_first, _r1) = events_of(&signal);
        store.flush();

        let (late, _r2) = events_of(&signal);
        assert_eq!(
            *late.borrow(),
            vec![
                SignalEvent::WillChange,
                SignalEvent::Changing(1, ChangeMetadata::committed()),
                SignalEvent::DidChange,
            ]
        );
        assert_eq!(store.query_count(), 1);
    }
}
