// ============================================================================
// spark-bindings - Signal Primitive
// Multicast push observables with the three-phase change protocol
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::core::types::{ChangeMetadata, SignalEvent};

/// An observer callback. Receives every event of the signal it observes.
pub type ObserverFn<T> = Rc<dyn Fn(&SignalEvent<T>)>;

/// Hook run after an observer has been attached to a pipe.
pub type OnObserveFn<T> = Rc<dyn Fn(&ObserverFn<T>)>;

// =============================================================================
// SIGNAL SOURCE
// =============================================================================

/// Anything that can hand out observations. [`Signal`] is the public handle.
pub trait SignalSource<T> {
    /// Registers `observer`. Implementations may deliver events to it
    /// synchronously before returning (current value, open windows).
    fn observe(&self, observer: ObserverFn<T>) -> ObserverRemoval;

    fn observer_count(&self) -> usize;
}

// =============================================================================
// OBSERVER REMOVAL
// =============================================================================

/// Handle that keeps an observation alive.
///
/// Dropping it (or calling [`ObserverRemoval::remove`]) detaches the
/// observer. Removal is idempotent.
#[must_use = "dropping an ObserverRemoval detaches the observer immediately"]
pub struct ObserverRemoval {
    removal: Option<Box<dyn FnOnce()>>,
}

impl ObserverRemoval {
    pub fn new(removal: impl FnOnce() + 'static) -> Self {
        Self {
            removal: Some(Box::new(removal)),
        }
    }

    /// A removal with nothing to remove.
    pub fn noop() -> Self {
        Self { removal: None }
    }

    pub fn remove(&mut self) {
        if let Some(removal) = self.removal.take() {
            removal();
        }
    }

    pub fn is_active(&self) -> bool {
        self.removal.is_some()
    }

    /// Leaves the observer attached for the lifetime of the signal.
    pub fn detach(mut self) {
        self.removal = None;
    }
}

impl Drop for ObserverRemoval {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for ObserverRemoval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRemoval")
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// SIGNAL<T> - The public signal handle
// =============================================================================

/// A multicast, push-only observable.
///
/// A signal holds no value of its own. It delivers `WillChange`,
/// `Changing(value, metadata)` and `DidChange` events to its observers.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use spark_bindings::Signal;
///
/// let (signal, notify) = Signal::pipe();
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let s = seen.clone();
/// let _removal = signal.observe_changing(move |v: &i32, _| s.borrow_mut().push(*v));
///
/// notify.changed(1);
/// notify.changed(2);
/// assert_eq!(*seen.borrow(), vec![1, 2]);
/// ```
pub struct Signal<T> {
    source: Rc<dyn SignalSource<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: 'static> Signal<T> {
    pub fn from_source(source: Rc<dyn SignalSource<T>>) -> Self {
        Self { source }
    }

    /// Creates a raw pipe: a signal plus the handle that feeds it.
    pub fn pipe() -> (Signal<T>, Notify<T>) {
        let core = PipeCore::new();
        let signal = Signal::from_source(core.clone());
        (signal, Notify { core })
    }

    /// Observe every event.
    pub fn observe(&self, observer: impl Fn(&SignalEvent<T>) + 'static) -> ObserverRemoval {
        self.source.observe(Rc::new(observer))
    }

    /// Observe only `Changing` events.
    pub fn observe_changing(
        &self,
        observer: impl Fn(&T, ChangeMetadata) + 'static,
    ) -> ObserverRemoval {
        self.observe(move |event| {
            if let SignalEvent::Changing(value, metadata) = event {
                observer(value, *metadata);
            }
        })
    }

    pub(crate) fn observe_rc(&self, observer: ObserverFn<T>) -> ObserverRemoval {
        self.source.observe(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.source.observer_count()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("observers", &self.source.observer_count())
            .finish()
    }
}

/// Delivers a complete `WillChange`, `Changing`, `DidChange` sequence to a
/// single observer.
pub(crate) fn deliver_value<T>(observer: &ObserverFn<T>, value: T, metadata: ChangeMetadata) {
    observer(&SignalEvent::WillChange);
    observer(&SignalEvent::Changing(value, metadata));
    observer(&SignalEvent::DidChange);
}

// =============================================================================
// PIPE
// =============================================================================

pub(crate) struct PipeCore<T> {
    weak_self: Weak<PipeCore<T>>,
    observers: RefCell<Vec<(u64, ObserverFn<T>)>>,
    next_id: Cell<u64>,
    open_windows: Cell<usize>,
    on_observe: RefCell<Option<OnObserveFn<T>>>,
}

impl<T: 'static> PipeCore<T> {
    fn new() -> Rc<Self> {
        Rc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            observers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            open_windows: Cell::new(0),
            on_observe: RefCell::new(None),
        })
    }

    fn snapshot(&self) -> Vec<ObserverFn<T>> {
        self.observers
            .borrow()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }

    fn broadcast(&self, event: &SignalEvent<T>) {
        let observers = self.snapshot();
        for observer in &observers {
            observer(event);
        }
    }

    fn will_change(&self) {
        self.open_windows.set(self.open_windows.get() + 1);
        trace!(open = self.open_windows.get(), "signal will_change");
        self.broadcast(&SignalEvent::WillChange);
    }

    fn changing(&self, value: T, metadata: ChangeMetadata) {
        // A value outside any window gets a window of its own.
        let bracket = self.open_windows.get() == 0;
        if bracket {
            self.will_change();
        }
        trace!(transient = metadata.transient, "signal changing");
        self.broadcast(&SignalEvent::Changing(value, metadata));
        if bracket {
            self.did_change();
        }
    }

    fn did_change(&self) {
        let open = self.open_windows.get();
        assert!(open > 0, "signal did_change without a matching will_change");
        // Close before delivering so observers attached during delivery are
        // not told about a window that is already closing.
        self.open_windows.set(open - 1);
        trace!(open = open - 1, "signal did_change");
        self.broadcast(&SignalEvent::DidChange);
    }
}

impl<T: 'static> SignalSource<T> for PipeCore<T> {
    fn observe(&self, observer: ObserverFn<T>) -> ObserverRemoval {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.observers.borrow_mut().push((id, observer.clone()));

        // Late observers see the windows that are already open.
        for _ in 0..self.open_windows.get() {
            observer(&SignalEvent::WillChange);
        }

        let hook = self.on_observe.borrow().clone();
        if let Some(hook) = hook {
            hook(&observer);
        }

        let weak = self.weak_self.clone();
        ObserverRemoval::new(move || {
            if let Some(core) = weak.upgrade() {
                // Drop the removed observer outside the borrow.
                let removed = {
                    let mut observers = core.observers.borrow_mut();
                    observers
                        .iter()
                        .position(|(oid, _)| *oid == id)
                        .map(|index| observers.remove(index))
                };
                drop(removed);
            }
        })
    }

    fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }
}

/// The feeding end of a pipe signal.
pub struct Notify<T> {
    core: Rc<PipeCore<T>>,
}

impl<T> Clone for Notify<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> Notify<T> {
    pub fn will_change(&self) {
        self.core.will_change();
    }

    /// Delivers a value. Outside an open window the value is bracketed by a
    /// window of its own.
    pub fn changing(&self, value: T, metadata: ChangeMetadata) {
        self.core.changing(value, metadata);
    }

    /// # Panics
    ///
    /// Panics if no window is open.
    pub fn did_change(&self) {
        self.core.did_change();
    }

    /// Shorthand for `will_change`, a committed `changing` and `did_change`.
    pub fn changed(&self, value: T) {
        self.will_change();
        self.changing(value, ChangeMetadata::committed());
        self.did_change();
    }

    pub fn open_windows(&self) -> usize {
        self.core.open_windows.get()
    }

    /// Installs the hook run after each observer attaches, after it has
    /// received one `WillChange` per open window.
    pub fn set_on_observe(&self, hook: impl Fn(&ObserverFn<T>) + 'static) {
        *self.core.on_observe.borrow_mut() = Some(Rc::new(hook));
    }

    pub fn observer_count(&self) -> usize {
        self.core.observer_count()
    }
}

impl<T> fmt::Debug for Notify<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notify")
            .field("open_windows", &self.core.open_windows.get())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CONSTANT
// =============================================================================

struct ConstantSource<T> {
    value: T,
    observers: Rc<Cell<usize>>,
}

impl<T: Clone + 'static> SignalSource<T> for ConstantSource<T> {
    fn observe(&self, observer: ObserverFn<T>) -> ObserverRemoval {
        self.observers.set(self.observers.get() + 1);
        deliver_value(&observer, self.value.clone(), ChangeMetadata::committed());
        let count = self.observers.clone();
        ObserverRemoval::new(move || count.set(count.get() - 1))
    }

    fn observer_count(&self) -> usize {
        self.observers.get()
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// A signal that delivers `value` to each observer on attach and never
    /// changes afterwards.
    pub fn constant(value: T) -> Self {
        Signal::from_source(Rc::new(ConstantSource {
            value,
            observers: Rc::new(Cell::new(0)),
        }))
    }
}

// =============================================================================
// TESTS
// =============================================================================
