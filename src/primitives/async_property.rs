// ============================================================================
// spark-bindings - Asynchronous Properties
// Properties whose value is undefined until their source first delivers
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};

use crate::core::error::{BindingError, StoreError};
use crate::core::types::{ChangeMetadata, SignalEvent};
use crate::primitives::binding::PropertySource;
use crate::primitives::signal::{deliver_value, Notify, ObserverRemoval, Signal};
use crate::store::Snapshot;

// =============================================================================
// ASYNC READABLE PROPERTY
// =============================================================================

struct AsyncCore<T> {
    upstream: Signal<T>,
    removal: RefCell<Option<ObserverRemoval>>,
    started: Cell<bool>,
    value: RefCell<Option<T>>,
    notify: Notify<T>,
    signal: Signal<T>,
    _owner: Option<Box<dyn Any>>,
}

impl<T: Clone + 'static> AsyncCore<T> {
    fn start(self: &Rc<Self>) {
        if self.started.replace(true) {
            return;
        }
        debug!("async property starting");
        let weak = Rc::downgrade(self);
        let removal = self.upstream.observe(move |event| {
            let Some(core) = weak.upgrade() else {
                return;
            };
            match event {
                SignalEvent::WillChange => core.notify.will_change(),
                SignalEvent::Changing(value, metadata) => {
                    *core.value.borrow_mut() = Some(value.clone());
                    core.notify.changing(value.clone(), *metadata);
                }
                SignalEvent::DidChange => core.notify.did_change(),
            }
        });
        *self.removal.borrow_mut() = Some(removal);
    }
}

/// A read-only property whose value is `None` until [`start`] is called and
/// the underlying signal has delivered a value.
///
/// Attaching the first observer starts the property. Later observers receive
/// the cached value, if any, without restarting anything.
///
/// [`start`]: AsyncReadableProperty::start
pub struct AsyncReadableProperty<T> {
    core: Rc<AsyncCore<T>>,
}

impl<T> Clone for AsyncReadableProperty<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + 'static> AsyncReadableProperty<T> {
    pub fn new(upstream: &Signal<T>) -> Self {
        Self::build(upstream, None)
    }

    /// An async property that delivers `value` as soon as it starts.
    pub fn constant(value: T) -> Self {
        Self::new(&Signal::constant(value))
    }

    pub(crate) fn build(upstream: &Signal<T>, owner: Option<Box<dyn Any>>) -> Self {
        let (signal, notify) = Signal::pipe();
        let core = Rc::new(AsyncCore {
            upstream: upstream.clone(),
            removal: RefCell::new(None),
            started: Cell::new(false),
            value: RefCell::new(None),
            notify: notify.clone(),
            signal,
            _owner: owner,
        });
        let weak = Rc::downgrade(&core);
        notify.set_on_observe(move |observer| {
            let Some(core) = weak.upgrade() else {
                return;
            };
            if !core.started.get() {
                core.start();
                return;
            }
            let value = core.value.borrow().clone();
            if let Some(value) = value {
                deliver_value(observer, value, ChangeMetadata::committed());
            }
        });
        Self { core }
    }

    /// Starts observing the underlying signal. Idempotent.
    pub fn start(&self) {
        self.core.start();
    }

    pub fn is_started(&self) -> bool {
        self.core.started.get()
    }

    pub fn value(&self) -> Option<T> {
        self.core.value.borrow().clone()
    }

    pub fn signal(&self) -> Signal<T> {
        self.core.signal.clone()
    }
}

impl<T: Clone + 'static> PropertySource<T> for AsyncReadableProperty<T> {
    fn signal(&self) -> Signal<T> {
        self.core.signal.clone()
    }

    fn owner(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncReadableProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncReadableProperty")
            .field("started", &self.core.started.get())
            .field("value", &*self.core.value.borrow())
            .finish()
    }
}

// =============================================================================
// MUTATION CONFIG
// =============================================================================

/// How an [`AsyncReadWriteProperty`] writes back to its store.
pub struct MutationConfig<T> {
    snapshot: Box<dyn Fn() -> Snapshot>,
    update: Box<dyn Fn(&T)>,
    commit: Box<dyn Fn(Snapshot, &T) -> Result<(), StoreError>>,
}

impl<T> MutationConfig<T> {
    /// * `snapshot` captures the state a durable commit will be relative to.
    /// * `update` applies a transient value without committing it.
    /// * `commit` durably applies a value relative to the held snapshot.
    pub fn new(
        snapshot: impl Fn() -> Snapshot + 'static,
        update: impl Fn(&T) + 'static,
        commit: impl Fn(Snapshot, &T) -> Result<(), StoreError> + 'static,
    ) -> Self {
        Self {
            snapshot: Box::new(snapshot),
            update: Box::new(update),
            commit: Box::new(commit),
        }
    }
}

// =============================================================================
// ASYNC READ-WRITE PROPERTY
// =============================================================================

pub(crate) struct AsyncRwCore<T> {
    readable: AsyncReadableProperty<T>,
    config: MutationConfig<T>,
    before: RefCell<Option<Snapshot>>,
    last_error: RefCell<Option<BindingError>>,
}

/// An async property whose writes go through a [`MutationConfig`].
///
/// The first write of a change sequence takes a snapshot. Transient writes
/// call `update`; a committed write calls `commit(snapshot, value)` and
/// releases the snapshot, so a run of transient edits collapses into one
/// durable commit. The cached value only changes when the underlying signal
/// delivers.
pub struct AsyncReadWriteProperty<T> {
    core: Rc<AsyncRwCore<T>>,
}

impl<T> Clone for AsyncReadWriteProperty<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + 'static> AsyncReadWriteProperty<T> {
    pub fn new(upstream: &Signal<T>, config: MutationConfig<T>) -> Self {
        Self {
            core: Rc::new(AsyncRwCore {
                readable: AsyncReadableProperty::new(upstream),
                config,
                before: RefCell::new(None),
                last_error: RefCell::new(None),
            }),
        }
    }

    pub fn start(&self) {
        self.core.readable.start();
    }

    pub fn value(&self) -> Option<T> {
        self.core.readable.value()
    }

    pub fn signal(&self) -> Signal<T> {
        self.core.readable.signal()
    }

    /// The read-only view of this property.
    pub fn readable(&self) -> AsyncReadableProperty<T> {
        self.core.readable.clone()
    }

    /// Writes `value` through the mutation config.
    ///
    /// Fails with [`BindingError::NotReady`] while the property has no value,
    /// and with [`BindingError::Store`] if the commit fails. A failed commit
    /// still releases the snapshot.
    pub fn write(&self, value: T, metadata: ChangeMetadata) -> Result<(), BindingError> {
        if self.core.readable.core.value.borrow().is_none() {
            error!("write to an async property that has no value yet");
            return Err(BindingError::NotReady);
        }

        // The first write of a sequence takes the snapshot; later transient
        // writes reuse it until a committed write consumes it.
        let held = self.core.before.borrow_mut().take();
        let before = held.unwrap_or_else(|| (self.core.config.snapshot)());

        if metadata.transient {
            *self.core.before.borrow_mut() = Some(before);
            (self.core.config.update)(&value);
            return Ok(());
        }

        (self.core.config.commit)(before, &value).map_err(|err| {
            warn!(error = %err, "commit failed");
            let err = BindingError::Store(err);
            *self.core.last_error.borrow_mut() = Some(err.clone());
            err
        })
    }

    /// Whether a snapshot is held for an unfinished change sequence.
    pub fn holds_snapshot(&self) -> bool {
        self.core.before.borrow().is_some()
    }

    /// The most recent commit failure.
    pub fn last_error(&self) -> Option<BindingError> {
        self.core.last_error.borrow().clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<AsyncRwCore<T>> {
        Rc::downgrade(&self.core)
    }

    pub(crate) fn upgrade(weak: &Weak<AsyncRwCore<T>>) -> Option<Self> {
        weak.upgrade().map(|core| Self { core })
    }
}

impl<T: Clone + 'static> PropertySource<T> for AsyncReadWriteProperty<T> {
    fn signal(&self) -> Signal<T> {
        self.core.readable.signal()
    }

    fn owner(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for AsyncReadWriteProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncReadWriteProperty")
            .field("readable", &self.core.readable)
            .field("holds_snapshot", &self.core.before.borrow().is_some())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        snapshots: Cell<u64>,
        updates: RefCell<Vec<i32>>,
        commits: RefCell<Vec<(Snapshot, i32)>>,
        fail_commit: Cell<bool>,
    }

    fn config(log: &Rc<Log>) -> MutationConfig<i32> {
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        MutationConfig::new(
            move || {
                l1.snapshots.set(l1.snapshots.get() + 1);
                Snapshot::new(l1.snapshots.get())
            },
            move |v| l2.updates.borrow_mut().push(*v),
            move |before, v| {
                if l3.fail_commit.get() {
                    return Err(StoreError::Commit("rejected".into()));
                }
                l3.commits.borrow_mut().push((before, *v));
                Ok(())
            },
        )
    }

    #[test]
    fn undefined_until_started() {
        let (signal, notify) = Signal::pipe();
        let prop = AsyncReadableProperty::new(&signal);
        notify.changed(1);
        assert_eq!(prop.value(), None);
        assert!(!prop.is_started());

        prop.start();
        prop.start();
        assert_eq!(signal.observer_count(), 1);
        notify.changed(2);
        assert_eq!(prop.value(), Some(2));
    }

    #[test]
    fn first_observer_starts_and_late_observer_gets_cache() {
        let prop = AsyncReadableProperty::constant(5);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let _first = prop.signal().observe_changing(move |v, _| s.borrow_mut().push(*v));
        assert!(prop.is_started());
        assert_eq!(*seen.borrow(), vec![5]);

        let late = Rc::new(Cell::new(0));
        let l = late.clone();
        let _second = prop.signal().observe_changing(move |v, _| l.set(*v));
        assert_eq!(late.get(), 5);
        assert_eq!(*seen.borrow(), vec![5]);
    }

    #[test]
    fn late_observer_sees_open_window() {
        let (signal, notify) = Signal::pipe();
        let prop = AsyncReadableProperty::new(&signal);
        prop.start();
        notify.will_change();

        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        let _removal = prop.signal().observe(move |ev| e.borrow_mut().push(ev.clone()));
        assert_eq!(*events.borrow(), vec![SignalEvent::WillChange]);

        notify.changing(3, ChangeMetadata::committed());
        notify.did_change();
        assert_eq!(events.borrow().len(), 3);
        assert_eq!(prop.value(), Some(3));
    }

    #[test]
    fn write_before_value_is_rejected() {
        let log = Rc::new(Log::default());
        let (signal, _notify) = Signal::pipe();
        let prop = AsyncReadWriteProperty::new(&signal, config(&log));
        prop.start();
        assert_eq!(
            prop.write(1, ChangeMetadata::committed()),
            Err(BindingError::NotReady)
        );
        assert_eq!(log.snapshots.get(), 0);
    }

    #[test]
    fn transient_writes_collapse_into_one_commit() {
        let log = Rc::new(Log::default());
        let prop = AsyncReadWriteProperty::new(&Signal::constant(0), config(&log));
        prop.start();

        prop.write(1, ChangeMetadata::transient()).unwrap();
        prop.write(2, ChangeMetadata::transient()).unwrap();
        assert!(prop.holds_snapshot());
        prop.write(3, ChangeMetadata::committed()).unwrap();
        assert!(!prop.holds_snapshot());

        assert_eq!(log.snapshots.get(), 1);
        assert_eq!(*log.updates.borrow(), vec![1, 2]);
        assert_eq!(*log.commits.borrow(), vec![(Snapshot::new(1), 3)]);

        // The next sequence takes a fresh snapshot.
        prop.write(4, ChangeMetadata::committed()).unwrap();
        assert_eq!(log.commits.borrow()[1], (Snapshot::new(2), 4));
    }

    #[test]
    fn single_committed_write_takes_one_snapshot() {
        let log = Rc::new(Log::default());
        let prop = AsyncReadWriteProperty::new(&Signal::constant(0), config(&log));
        prop.start();

        prop.write(5, ChangeMetadata::committed()).unwrap();
        assert_eq!(log.snapshots.get(), 1);
        assert!(log.updates.borrow().is_empty());
        assert_eq!(*log.commits.borrow(), vec![(Snapshot::new(1), 5)]);
        assert!(!prop.holds_snapshot());
    }

    #[test]
    fn failed_commit_is_reported_and_recorded() {
        let log = Rc::new(Log::default());
        log.fail_commit.set(true);
        let prop = AsyncReadWriteProperty::new(&Signal::constant(0), config(&log));
        prop.start();

        let err = prop.write(9, ChangeMetadata::committed()).unwrap_err();
        assert_eq!(err, BindingError::Store(StoreError::Commit("rejected".into())));
        assert_eq!(prop.last_error(), Some(err));
        assert!(!prop.holds_snapshot());
    }
}
