// ============================================================================
// spark-bindings - Synchronous Properties
// Readable, read-write, write-only and action properties
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::core::types::{default_equals, ChangeMetadata, ChangeResult, EqualsFn, SignalEvent};
use crate::primitives::async_property::AsyncReadWriteProperty;
use crate::primitives::binding::{BindableProperty, Binding, BindingSet, PropertySource, Sink};
use crate::primitives::signal::{deliver_value, Notify, ObserverRemoval, Signal};
use crate::reactivity::bidi::BidiGuard;
use crate::reactivity::change_handler::ChangeHandler;

/// Setter used by external storage and write-only properties.
pub type SetterFn<T> = Box<dyn Fn(T, ChangeMetadata)>;

/// Hook run after owned storage accepted a bound value.
pub type DidSetFn<T> = Box<dyn Fn(&T, ChangeMetadata)>;

// =============================================================================
// READABLE PROPERTY TYPE
// =============================================================================

/// A property whose value is always defined.
pub trait ReadablePropertyType<T: Clone + 'static>: PropertySource<T> {
    fn value(&self) -> T;
}

// =============================================================================
// READABLE PROPERTY
// =============================================================================

struct ReadableCore<T> {
    value: RefCell<T>,
    notify: Notify<T>,
    signal: Signal<T>,
    upstream: RefCell<Option<ObserverRemoval>>,
    _owner: Option<Box<dyn Any>>,
}

/// A read-only property with a value that is always defined.
///
/// The value is mutated only by the signal the property was created from.
/// Repeated equal values are suppressed.
///
/// # Example
///
/// ```
/// use spark_bindings::{ReadableProperty, Signal};
///
/// let (signal, notify) = Signal::pipe();
/// let title = ReadableProperty::new(String::from("untitled"), &signal);
/// notify.changed(String::from("Report"));
/// assert_eq!(title.value(), "Report");
/// ```
pub struct ReadableProperty<T> {
    core: Rc<ReadableCore<T>>,
}

impl<T> Clone for ReadableProperty<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + 'static> ReadableProperty<T> {
    pub fn new(initial: T, upstream: &Signal<T>) -> Self
    where
        T: PartialEq,
    {
        Self::with_equals(initial, upstream, default_equals)
    }

    pub fn with_equals(initial: T, upstream: &Signal<T>, equals: EqualsFn<T>) -> Self {
        Self::build(initial, upstream, equals, None)
    }

    /// A property whose value never changes.
    pub fn constant(value: T) -> Self {
        let upstream = Signal::constant(value.clone());
        Self::build(value, &upstream, |_, _| true, None)
    }

    pub(crate) fn build(
        initial: T,
        upstream: &Signal<T>,
        equals: EqualsFn<T>,
        owner: Option<Box<dyn Any>>,
    ) -> Self {
        let (signal, notify) = Signal::pipe();
        let core = Rc::new(ReadableCore {
            value: RefCell::new(initial),
            notify: notify.clone(),
            signal,
            upstream: RefCell::new(None),
            _owner: owner,
        });

        let weak = Rc::downgrade(&core);
        notify.set_on_observe(move |observer| {
            if let Some(core) = weak.upgrade() {
                let value = core.value.borrow().clone();
                deliver_value(observer, value, ChangeMetadata::committed());
            }
        });

        let weak = Rc::downgrade(&core);
        let removal = upstream.observe(move |event| {
            let Some(core) = weak.upgrade() else {
                return;
            };
            match event {
                SignalEvent::WillChange => core.notify.will_change(),
                SignalEvent::Changing(value, metadata) => {
                    let changed = {
                        let mut current = core.value.borrow_mut();
                        if equals(&current, value) {
                            false
                        } else {
                            *current = value.clone();
                            true
                        }
                    };
                    if changed {
                        core.notify.changing(value.clone(), *metadata);
                    }
                }
                SignalEvent::DidChange => core.notify.did_change(),
            }
        });
        *core.upstream.borrow_mut() = Some(removal);

        Self { core }
    }

    pub fn value(&self) -> T {
        self.core.value.borrow().clone()
    }

    /// Access the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.core.value.borrow())
    }

    pub fn signal(&self) -> Signal<T> {
        self.core.signal.clone()
    }
}

impl<T: Clone + 'static> PropertySource<T> for ReadableProperty<T> {
    fn signal(&self) -> Signal<T> {
        self.core.signal.clone()
    }

    fn owner(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }
}

impl<T: Clone + 'static> ReadablePropertyType<T> for ReadableProperty<T> {
    fn value(&self) -> T {
        ReadableProperty::value(self)
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadableProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableProperty")
            .field("value", &*self.core.value.borrow())
            .finish()
    }
}

// =============================================================================
// READ-WRITE PROPERTY
// =============================================================================

/// Where a read-write property keeps its value.
enum Storage<T> {
    /// The property owns the value and suppresses equal writes.
    Owned {
        value: RefCell<T>,
        equals: EqualsFn<T>,
        did_set: Option<DidSetFn<T>>,
    },

    /// The value lives elsewhere (a UI control, a settings object).
    External {
        get: Box<dyn Fn() -> T>,
        set: SetterFn<T>,
    },
}

/// Construction options for an owned [`ReadWriteProperty`].
pub struct PropertyOptions<T> {
    pub equals: EqualsFn<T>,
    pub did_set: Option<DidSetFn<T>>,
    pub change_handler: ChangeHandler,
}

impl<T: PartialEq> Default for PropertyOptions<T> {
    fn default() -> Self {
        Self {
            equals: default_equals,
            did_set: None,
            change_handler: ChangeHandler::silent(),
        }
    }
}

struct ReadWriteCore<T> {
    storage: Storage<T>,
    notify: Notify<T>,
    signal: Signal<T>,
    exclusive: Cell<bool>,
    handler: ChangeHandler,
    bindings: BindingSet,
}

impl<T: Clone + 'static> ReadWriteCore<T> {
    fn current(&self) -> T {
        match &self.storage {
            Storage::Owned { value, .. } => value.borrow().clone(),
            Storage::External { get, .. } => get(),
        }
    }
}

impl<T: Clone + 'static> Sink<T> for ReadWriteCore<T> {
    fn set_value(&self, value: T, metadata: ChangeMetadata) {
        if self.exclusive.get() {
            trace!("exclusive mode, ignoring bound value");
            return;
        }
        match &self.storage {
            Storage::Owned {
                value: current,
                equals,
                did_set,
            } => {
                let changed = {
                    let mut current = current.borrow_mut();
                    if equals(&current, &value) {
                        false
                    } else {
                        *current = value.clone();
                        true
                    }
                };
                if changed {
                    if let Some(did_set) = did_set {
                        did_set(&value, metadata);
                    }
                    self.notify.changing(value, metadata);
                }
            }
            Storage::External { set, .. } => {
                set(value.clone(), metadata);
                self.notify.changing(value, metadata);
            }
        }
    }

    fn change_handler(&self) -> &ChangeHandler {
        &self.handler
    }

    fn bindings(&self) -> &BindingSet {
        &self.bindings
    }
}

/// A property that can be read, changed directly and bound in either
/// direction.
///
/// # Example
///
/// ```
/// use spark_bindings::{BindableProperty, ReadWriteProperty};
///
/// let source = ReadWriteProperty::new(1);
/// let sink = ReadWriteProperty::new(0);
/// let _binding = sink.bind(&source);
/// assert_eq!(sink.value(), 1);
///
/// source.change(5, false);
/// assert_eq!(sink.value(), 5);
/// ```
pub struct ReadWriteProperty<T> {
    core: Rc<ReadWriteCore<T>>,
}

impl<T> Clone for ReadWriteProperty<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + 'static> ReadWriteProperty<T> {
    pub fn new(initial: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(initial, PropertyOptions::default())
    }

    pub fn with_equals(initial: T, equals: EqualsFn<T>) -> Self {
        Self::with_options(
            initial,
            PropertyOptions {
                equals,
                did_set: None,
                change_handler: ChangeHandler::silent(),
            },
        )
    }

    /// Owned storage that calls `did_set` whenever a bound value is accepted.
    pub fn with_did_set(initial: T, did_set: impl Fn(&T, ChangeMetadata) + 'static) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(
            initial,
            PropertyOptions {
                did_set: Some(Box::new(did_set)),
                ..PropertyOptions::default()
            },
        )
    }

    pub fn with_options(initial: T, options: PropertyOptions<T>) -> Self {
        Self::build(
            Storage::Owned {
                value: RefCell::new(initial),
                equals: options.equals,
                did_set: options.did_set,
            },
            options.change_handler,
        )
    }

    /// A property whose storage is maintained elsewhere.
    ///
    /// Call [`ReadWriteProperty::changed`] when the external value changes
    /// on its own.
    pub fn external(
        get: impl Fn() -> T + 'static,
        set: impl Fn(T, ChangeMetadata) + 'static,
    ) -> Self {
        Self::external_with_handler(get, set, ChangeHandler::silent())
    }

    pub fn external_with_handler(
        get: impl Fn() -> T + 'static,
        set: impl Fn(T, ChangeMetadata) + 'static,
        handler: ChangeHandler,
    ) -> Self {
        Self::build(
            Storage::External {
                get: Box::new(get),
                set: Box::new(set),
            },
            handler,
        )
    }

    fn build(storage: Storage<T>, handler: ChangeHandler) -> Self {
        let (signal, notify) = Signal::pipe();
        let core = Rc::new(ReadWriteCore {
            storage,
            notify: notify.clone(),
            signal,
            exclusive: Cell::new(false),
            handler,
            bindings: BindingSet::new(),
        });
        let weak = Rc::downgrade(&core);
        notify.set_on_observe(move |observer| {
            if let Some(core) = weak.upgrade() {
                deliver_value(observer, core.current(), ChangeMetadata::committed());
            }
        });
        Self { core }
    }

    pub fn value(&self) -> T {
        self.core.current()
    }

    pub fn signal(&self) -> Signal<T> {
        self.core.signal.clone()
    }

    /// Changes the value and notifies observers.
    ///
    /// Owned storage ignores a value equal to the current one and does not
    /// run its `did_set` hook; external storage is written through.
    pub fn change(&self, value: T, transient: bool) {
        let metadata = ChangeMetadata::new(transient);
        match &self.core.storage {
            Storage::Owned {
                value: current,
                equals,
                ..
            } => {
                let changed = {
                    let mut current = current.borrow_mut();
                    if equals(&current, &value) {
                        false
                    } else {
                        *current = value.clone();
                        true
                    }
                };
                if changed {
                    self.core.notify.changing(value, metadata);
                }
            }
            Storage::External { set, .. } => {
                set(value.clone(), metadata);
                self.core.notify.changing(value, metadata);
            }
        }
    }

    /// Notifies observers that the value changed behind the property's back.
    pub fn changed(&self, transient: bool) {
        self.core
            .notify
            .changing(self.core.current(), ChangeMetadata::new(transient));
    }

    /// While set, values delivered through bindings are ignored. Meant for
    /// controls with an edit mode that only push values out while editing.
    pub fn set_exclusive_mode(&self, exclusive: bool) {
        self.core.exclusive.set(exclusive);
    }

    pub fn exclusive_mode(&self) -> bool {
        self.core.exclusive.get()
    }

    pub fn change_handler(&self) -> &ChangeHandler {
        &self.core.handler
    }

    /// Number of bindings this property currently holds.
    pub fn binding_count(&self) -> usize {
        self.core.bindings.len()
    }

    // =========================================================================
    // BIDIRECTIONAL BINDING
    // =========================================================================

    /// Connects this property and `other` in both directions.
    ///
    /// `other` immediately receives `forward(self.value())`. Afterwards every
    /// change on either side is transformed and applied to the other side,
    /// unless the transform returns [`ChangeResult::NoChange`]. A change never
    /// bounces back to the side that made it.
    pub fn connect_bidi<U: Clone + 'static>(
        &self,
        other: &ReadWriteProperty<U>,
        forward: impl Fn(&T) -> ChangeResult<U> + 'static,
        reverse: impl Fn(&U) -> ChangeResult<T> + 'static,
    ) -> Binding {
        self.connect_bidi_inner(other, forward, reverse, true)
    }

    /// Two-way identity binding. This property takes on `other`'s value
    /// immediately.
    pub fn bind_bidi(&self, other: &ReadWriteProperty<T>) -> Binding {
        self.core.set_value(other.value(), ChangeMetadata::committed());
        self.connect_bidi_inner(
            other,
            |v| ChangeResult::Change(v.clone()),
            |v| ChangeResult::Change(v.clone()),
            false,
        )
    }

    fn connect_bidi_inner<U: Clone + 'static>(
        &self,
        other: &ReadWriteProperty<U>,
        forward: impl Fn(&T) -> ChangeResult<U> + 'static,
        reverse: impl Fn(&U) -> ChangeResult<T> + 'static,
        push_initial: bool,
    ) -> Binding {
        let guard = Rc::new(BidiGuard::new());
        let forward = Rc::new(forward);
        let mut self_removal = ObserverRemoval::noop();
        let mut other_removal = ObserverRemoval::noop();

        // Installing counts as a self-initiated change, so the current values
        // delivered on attach are not cross-applied.
        guard.push_to_other(|| {
            let (g, weak_self) = (guard.clone(), Rc::downgrade(&self.core));
            other_removal = other.signal().observe_changing(move |value, metadata| {
                g.accept_from_other(|| {
                    let Some(core) = weak_self.upgrade() else {
                        return;
                    };
                    if let ChangeResult::Change(value) = reverse(value) {
                        trace!("bidi binding applying value from other side");
                        core.set_value(value, metadata);
                    }
                });
            });

            let (g, f, weak_other) = (guard.clone(), forward.clone(), Rc::downgrade(&other.core));
            self_removal = self.signal().observe_changing(move |value, metadata| {
                g.push_to_other(|| {
                    let Some(other) = weak_other.upgrade() else {
                        return;
                    };
                    if let ChangeResult::Change(value) = f(value) {
                        trace!("bidi binding pushing value to other side");
                        other.set_value(value, metadata);
                    }
                });
            });

            if push_initial {
                if let ChangeResult::Change(value) = forward(&self.value()) {
                    other.core.set_value(value, ChangeMetadata::committed());
                }
            }
        });

        let id = self.core.bindings.next_id();
        let weak_self = Rc::downgrade(&self.core);
        let binding = Binding::new(other.owner(), move || {
            self_removal.remove();
            other_removal.remove();
            guard.reset();
            if let Some(core) = weak_self.upgrade() {
                core.bindings.remove(id);
            }
        });
        self.core.bindings.insert(id, binding.clone());
        binding
    }

    /// Connects this property and an asynchronous property in both
    /// directions.
    ///
    /// This property takes on `reverse(other.value())` once `other` has a
    /// value. Writes pushed into `other` are counted until their windows
    /// close; values `other` delivers meanwhile are treated as echoes and
    /// are not re-applied. Windows `other` opens on its own are mirrored on
    /// this property's ChangeHandler.
    pub fn connect_bidi_async<U: Clone + 'static>(
        &self,
        other: &AsyncReadWriteProperty<U>,
        forward: impl Fn(&T) -> ChangeResult<U> + 'static,
        reverse: impl Fn(&U) -> ChangeResult<T> + 'static,
    ) -> Binding {
        let guard = Rc::new(BidiGuard::new());

        // The value delivered when we attach to our own signal is not a
        // change made by this side.
        let skip_initial = Rc::new(Cell::new(true));
        let (g, weak_other) = (guard.clone(), other.downgrade());
        let mut self_removal = self.signal().observe_changing(move |value, metadata| {
            if skip_initial.replace(false) {
                return;
            }
            g.push_to_other(|| {
                let Some(other) = AsyncReadWriteProperty::upgrade(&weak_other) else {
                    return;
                };
                if let ChangeResult::Change(value) = forward(value) {
                    trace!(transient = metadata.transient, "bidi binding writing to async side");
                    if let Err(err) = other.write(value, metadata) {
                        warn!(error = %err, "async side rejected write");
                    }
                }
            });
        });

        let (g, weak_self) = (guard.clone(), Rc::downgrade(&self.core));
        let mut other_removal = other.signal().observe(move |event| {
            let Some(core) = weak_self.upgrade() else {
                return;
            };
            match event {
                SignalEvent::WillChange => {
                    if g.other_will_change() {
                        core.handler.will_change();
                    }
                }
                SignalEvent::Changing(value, metadata) => {
                    g.accept_from_other(|| {
                        if let ChangeResult::Change(value) = reverse(value) {
                            core.set_value(value, *metadata);
                        }
                    });
                }
                SignalEvent::DidChange => {
                    if g.other_did_change() {
                        core.handler.did_change();
                    }
                }
            }
        });

        let id = self.core.bindings.next_id();
        let weak_self = Rc::downgrade(&self.core);
        let binding = Binding::new(other.owner(), move || {
            self_removal.remove();
            other_removal.remove();
            let mirrored = guard.reset();
            if let Some(core) = weak_self.upgrade() {
                core.handler.decrement_count(mirrored);
                core.bindings.remove(id);
            }
        });
        self.core.bindings.insert(id, binding.clone());
        binding
    }

    /// Two-way identity binding with an asynchronous property.
    pub fn bind_bidi_async(&self, other: &AsyncReadWriteProperty<T>) -> Binding {
        self.connect_bidi_async(
            other,
            |v| ChangeResult::Change(v.clone()),
            |v| ChangeResult::Change(v.clone()),
        )
    }
}

impl<T: Clone + 'static> BindableProperty<T> for ReadWriteProperty<T> {
    fn sink(&self) -> Rc<dyn Sink<T>> {
        self.core.clone()
    }
}

impl<T: Clone + 'static> PropertySource<T> for ReadWriteProperty<T> {
    fn signal(&self) -> Signal<T> {
        self.core.signal.clone()
    }

    fn owner(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }
}

impl<T: Clone + 'static> ReadablePropertyType<T> for ReadWriteProperty<T> {
    fn value(&self) -> T {
        self.core.current()
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for ReadWriteProperty<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadWriteProperty")
            .field("value", &self.core.current())
            .field("exclusive", &self.core.exclusive.get())
            .finish()
    }
}

// =============================================================================
// WRITE-ONLY AND ACTION PROPERTIES
// =============================================================================

struct WriteOnlyCore<T> {
    set: SetterFn<T>,
    handler: ChangeHandler,
    bindings: BindingSet,
}

impl<T: 'static> Sink<T> for WriteOnlyCore<T> {
    fn set_value(&self, value: T, metadata: ChangeMetadata) {
        (self.set)(value, metadata);
    }

    fn change_handler(&self) -> &ChangeHandler {
        &self.handler
    }

    fn bindings(&self) -> &BindingSet {
        &self.bindings
    }
}

/// A property that can be bound to but not read.
pub struct WriteOnlyProperty<T> {
    core: Rc<WriteOnlyCore<T>>,
}

impl<T> Clone for WriteOnlyProperty<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> WriteOnlyProperty<T> {
    pub fn new(set: impl Fn(T, ChangeMetadata) + 'static) -> Self {
        Self::with_change_handler(set, ChangeHandler::silent())
    }

    pub fn with_change_handler(
        set: impl Fn(T, ChangeMetadata) + 'static,
        handler: ChangeHandler,
    ) -> Self {
        Self {
            core: Rc::new(WriteOnlyCore {
                set: Box::new(set),
                handler,
                bindings: BindingSet::new(),
            }),
        }
    }

    pub fn change_handler(&self) -> &ChangeHandler {
        &self.core.handler
    }
}

impl<T: Clone + 'static> BindableProperty<T> for WriteOnlyProperty<T> {
    fn sink(&self) -> Rc<dyn Sink<T>> {
        self.core.clone()
    }
}

/// A write-only property that runs a callback for every delivered value.
///
/// Useful for momentary events such as button clicks.
#[derive(Clone)]
pub struct ActionProperty<T> {
    inner: WriteOnlyProperty<T>,
}

impl<T: 'static> ActionProperty<T> {
    pub fn new(action: impl Fn(T) + 'static) -> Self {
        Self {
            inner: WriteOnlyProperty::new(move |value, _| action(value)),
        }
    }
}

impl<T: Clone + 'static> BindableProperty<T> for ActionProperty<T> {
    fn sink(&self) -> Rc<dyn Sink<T>> {
        self.inner.sink()
    }
}

// =============================================================================
// TESTS
// =============================================================================
