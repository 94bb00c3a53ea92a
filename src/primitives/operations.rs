// ============================================================================
// spark-bindings - Signal Operations
// map, zip and boolean combinators over signals
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::types::SignalEvent;
use crate::primitives::signal::{ObserverFn, ObserverRemoval, Signal, SignalSource};

// =============================================================================
// MAP
// =============================================================================

struct MapSource<S, T> {
    upstream: Signal<S>,
    transform: Rc<dyn Fn(&S) -> T>,
    observers: Rc<Cell<usize>>,
}

impl<S: 'static, T: 'static> SignalSource<T> for MapSource<S, T> {
    fn observe(&self, observer: ObserverFn<T>) -> ObserverRemoval {
        self.observers.set(self.observers.get() + 1);
        let transform = self.transform.clone();
        let mut inner = self.upstream.observe(move |event| match event {
            SignalEvent::WillChange => observer(&SignalEvent::WillChange),
            SignalEvent::Changing(value, metadata) => {
                observer(&SignalEvent::Changing(transform(value), *metadata))
            }
            SignalEvent::DidChange => observer(&SignalEvent::DidChange),
        });
        let count = self.observers.clone();
        ObserverRemoval::new(move || {
            inner.remove();
            count.set(count.get() - 1);
        })
    }

    fn observer_count(&self) -> usize {
        self.observers.get()
    }
}

// =============================================================================
// BINARY OPERATIONS
// =============================================================================

/// Combines the latest values of two signals. Notifies only once both sides
/// have produced a value.
struct BinaryOpSource<A, B, T> {
    lhs: Signal<A>,
    rhs: Signal<B>,
    combine: Rc<dyn Fn(&A, &B) -> T>,
    observers: Rc<Cell<usize>>,
}

struct Latest<A, B> {
    lhs: Option<A>,
    rhs: Option<B>,
}

impl<A, B, T> SignalSource<T> for BinaryOpSource<A, B, T>
where
    A: Clone + 'static,
    B: Clone + 'static,
    T: 'static,
{
    fn observe(&self, observer: ObserverFn<T>) -> ObserverRemoval {
        self.observers.set(self.observers.get() + 1);
        let latest = Rc::new(RefCell::new(Latest::<A, B> { lhs: None, rhs: None }));

        let (obs, state, combine) = (observer.clone(), latest.clone(), self.combine.clone());
        let mut lhs_removal = self.lhs.observe(move |event| match event {
            SignalEvent::WillChange => obs(&SignalEvent::WillChange),
            SignalEvent::Changing(value, metadata) => {
                let combined = {
                    let mut state = state.borrow_mut();
                    state.lhs = Some(value.clone());
                    state.rhs.as_ref().map(|rhs| combine(value, rhs))
                };
                if let Some(combined) = combined {
                    obs(&SignalEvent::Changing(combined, *metadata));
                }
            }
            SignalEvent::DidChange => obs(&SignalEvent::DidChange),
        });

        let (obs, state, combine) = (observer, latest, self.combine.clone());
        let mut rhs_removal = self.rhs.observe(move |event| match event {
            SignalEvent::WillChange => obs(&SignalEvent::WillChange),
            SignalEvent::Changing(value, metadata) => {
                let combined = {
                    let mut state = state.borrow_mut();
                    state.rhs = Some(value.clone());
                    state.lhs.as_ref().map(|lhs| combine(lhs, value))
                };
                if let Some(combined) = combined {
                    obs(&SignalEvent::Changing(combined, *metadata));
                }
            }
            SignalEvent::DidChange => obs(&SignalEvent::DidChange),
        });

        let count = self.observers.clone();
        ObserverRemoval::new(move || {
            lhs_removal.remove();
            rhs_removal.remove();
            count.set(count.get() - 1);
        })
    }

    fn observer_count(&self) -> usize {
        self.observers.get()
    }
}

// =============================================================================
// SIGNAL OPERATIONS
// =============================================================================

impl<T: 'static> Signal<T> {
    /// A signal delivering `transform(value)` for every value of `self`.
    /// Windows pass through unchanged.
    ///
    /// # Example
    ///
    /// ```
    /// use std::cell::Cell;
    /// use std::rc::Rc;
    /// use spark_bindings::Signal;
    ///
    /// let (signal, notify) = Signal::pipe();
    /// let doubled = signal.map(|v: &i32| v * 2);
    /// let last = Rc::new(Cell::new(0));
    /// let l = last.clone();
    /// let _removal = doubled.observe_changing(move |v, _| l.set(*v));
    ///
    /// notify.changed(21);
    /// assert_eq!(last.get(), 42);
    /// ```
    pub fn map<U: 'static>(&self, transform: impl Fn(&T) -> U + 'static) -> Signal<U> {
        Signal::from_source(Rc::new(MapSource {
            upstream: self.clone(),
            transform: Rc::new(transform),
            observers: Rc::new(Cell::new(0)),
        }))
    }

    /// Pairs the latest values of both signals.
    pub fn zip<U>(&self, other: &Signal<U>) -> Signal<(T, U)>
    where
        T: Clone,
        U: Clone + 'static,
    {
        self.zip_with(other, |a, b| (a.clone(), b.clone()))
    }

    /// Combines the latest values of both signals with `combine`.
    pub fn zip_with<U, V>(
        &self,
        other: &Signal<U>,
        combine: impl Fn(&T, &U) -> V + 'static,
    ) -> Signal<V>
    where
        T: Clone,
        U: Clone + 'static,
        V: 'static,
    {
        Signal::from_source(Rc::new(BinaryOpSource {
            lhs: self.clone(),
            rhs: other.clone(),
            combine: Rc::new(combine),
            observers: Rc::new(Cell::new(0)),
        }))
    }
}

impl Signal<bool> {
    pub fn not(&self) -> Signal<bool> {
        self.map(|v| !*v)
    }

    pub fn and(&self, other: &Signal<bool>) -> Signal<bool> {
        self.zip_with(other, |a, b| *a && *b)
    }

    pub fn or(&self, other: &Signal<bool>) -> Signal<bool> {
        self.zip_with(other, |a, b| *a || *b)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChangeMetadata;

    fn values<T: Clone + 'static>(signal: &Signal<T>) -> (Rc<RefCell<Vec<T>>>, ObserverRemoval) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let removal = signal.observe_changing(move |v, _| s.borrow_mut().push(v.clone()));
        (seen, removal)
    }

    #[test]
    fn map_preserves_metadata_and_windows() {
        let (signal, notify) = Signal::pipe();
        let mapped = signal.map(|v: &i32| v.to_string());
        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let _removal = mapped.observe(move |event| e.borrow_mut().push(event.clone()));

        notify.will_change();
        notify.changing(3, ChangeMetadata::transient());
        notify.did_change();

        assert_eq!(
            *events.borrow(),
            vec![
                SignalEvent::WillChange,
                SignalEvent::Changing("3".to_string(), ChangeMetadata::transient()),
                SignalEvent::DidChange,
            ]
        );
    }

    #[test]
    fn zip_waits_for_both_sides() {
        let (lhs, notify_lhs) = Signal::pipe();
        let (rhs, notify_rhs) = Signal::pipe();
        let zipped = lhs.zip(&rhs);
        let (seen, _removal) = values(&zipped);

        notify_lhs.changed(1);
        assert!(seen.borrow().is_empty());

        notify_rhs.changed("a");
        notify_lhs.changed(2);
        assert_eq!(*seen.borrow(), vec![(1, "a"), (2, "a")]);
    }

    #[test]
    fn boolean_combinators() {
        let a = Signal::constant(true);
        let b = Signal::constant(false);

        let (and, _r1) = values(&a.and(&b));
        let (or, _r2) = values(&a.or(&b));
        let (not, _r3) = values(&b.not());

        assert_eq!(*and.borrow(), vec![false]);
        assert_eq!(*or.borrow(), vec![true]);
        assert_eq!(*not.borrow(), vec![true]);
    }

    #[test]
    fn removal_detaches_from_upstream() {
        let (signal, _notify) = Signal::<i32>::pipe();
        let mapped = signal.map(|v| *v + 1);
        let removal = mapped.observe(|_| {});
        assert_eq!(signal.observer_count(), 1);
        assert_eq!(mapped.observer_count(), 1);
        drop(removal);
        assert_eq!(signal.observer_count(), 0);
        assert_eq!(mapped.observer_count(), 0);
    }
}
