// ============================================================================
// spark-bindings - Bindings
// Subscriptions linking a sink property to a source signal
// ============================================================================

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::core::types::{ChangeMetadata, SignalEvent};
use crate::primitives::signal::Signal;
use crate::reactivity::change_handler::ChangeHandler;

// =============================================================================
// BINDING
// =============================================================================

struct BindingInner {
    owner: RefCell<Option<Box<dyn Any>>>,
    removal: RefCell<Option<Box<dyn FnOnce()>>>,
}

/// A live link between a sink and a source.
///
/// The binding keeps the source alive while it is bound. [`Binding::unbind`]
/// releases the source and tears down every observation the binding made;
/// it is safe to call any number of times. The sink keeps its own handle to
/// each of its bindings, so dropping the handle returned by `bind` does not
/// break the link.
#[derive(Clone)]
pub struct Binding {
    inner: Rc<BindingInner>,
}

impl Binding {
    pub(crate) fn new(owner: Box<dyn Any>, removal: impl FnOnce() + 'static) -> Self {
        Self {
            inner: Rc::new(BindingInner {
                owner: RefCell::new(Some(owner)),
                removal: RefCell::new(Some(Box::new(removal))),
            }),
        }
    }

    /// Breaks the binding.
    pub fn unbind(&self) {
        let owner = self.inner.owner.borrow_mut().take();
        let removal = self.inner.removal.borrow_mut().take();
        if let Some(removal) = removal {
            removal();
        }
        drop(owner);
    }

    pub fn is_bound(&self) -> bool {
        self.inner.removal.borrow().is_some()
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("bound", &self.is_bound())
            .finish()
    }
}

// =============================================================================
// BINDING SET
// =============================================================================

/// The bindings a sink currently participates in.
#[derive(Default)]
pub struct BindingSet {
    entries: RefCell<Vec<(u64, Binding)>>,
    next_id: Cell<u64>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub(crate) fn insert(&self, id: u64, binding: Binding) {
        self.entries.borrow_mut().push((id, binding));
    }

    pub(crate) fn remove(&self, id: u64) -> Option<Binding> {
        let mut entries = self.entries.borrow_mut();
        let index = entries.iter().position(|(bid, _)| *bid == id)?;
        Some(entries.remove(index).1)
    }

    /// Unbinds everything. Each removal runs outside the borrow.
    pub(crate) fn unbind_all(&self) {
        let entries = std::mem::take(&mut *self.entries.borrow_mut());
        for (_, binding) in entries {
            binding.unbind();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Drop for BindingSet {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

impl fmt::Debug for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSet")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// SINKS AND SOURCES
// =============================================================================

/// The receiving half of a binding.
pub trait Sink<T>: 'static {
    /// Applies a value delivered through a binding.
    fn set_value(&self, value: T, metadata: ChangeMetadata);

    fn change_handler(&self) -> &ChangeHandler;

    fn bindings(&self) -> &BindingSet;
}

/// Anything a sink can be bound to.
pub trait PropertySource<T: 'static> {
    fn signal(&self) -> Signal<T>;

    /// The object a binding must keep alive for `signal` to keep delivering.
    fn owner(&self) -> Box<dyn Any>;
}

impl<T: 'static> PropertySource<T> for Signal<T> {
    fn signal(&self) -> Signal<T> {
        self.clone()
    }

    fn owner(&self) -> Box<dyn Any> {
        Box::new(self.clone())
    }
}

/// Properties that can be the sink of a unidirectional binding.
pub trait BindableProperty<T: Clone + 'static> {
    fn sink(&self) -> Rc<dyn Sink<T>>;

    /// Binds this property to `source`. The property takes on the source's
    /// current value immediately if one is available, and every later value
    /// after that.
    fn bind(&self, source: &impl PropertySource<T>) -> Binding
    where
        Self: Sized,
    {
        bind_signal(self.sink(), &source.signal(), source.owner(), None)
    }

    /// Like [`BindableProperty::bind`], but takes on `initial` if the source
    /// has no value to deliver yet.
    fn bind_with_initial(&self, source: &impl PropertySource<T>, initial: T) -> Binding
    where
        Self: Sized,
    {
        bind_signal(self.sink(), &source.signal(), source.owner(), Some(initial))
    }

    /// Breaks every binding of this property and closes any windows they
    /// left open on its ChangeHandler.
    fn unbind_all(&self) {
        let sink = self.sink();
        sink.bindings().unbind_all();
        sink.change_handler().reset_count();
    }
}

/// Core of every unidirectional binding.
pub(crate) fn bind_signal<T: Clone + 'static>(
    sink: Rc<dyn Sink<T>>,
    signal: &Signal<T>,
    owner: Box<dyn Any>,
    initial: Option<T>,
) -> Binding {
    // Windows this binding opened on the sink's handler and has not closed.
    let open_windows = Rc::new(Cell::new(0usize));
    let received = Rc::new(Cell::new(false));

    let weak = Rc::downgrade(&sink);
    let (windows, got) = (open_windows.clone(), received.clone());
    let mut removal = signal.observe(move |event| {
        let Some(sink) = weak.upgrade() else {
            return;
        };
        match event {
            SignalEvent::WillChange => {
                windows.set(windows.get() + 1);
                sink.change_handler().will_change();
            }
            SignalEvent::Changing(value, metadata) => {
                trace!(transient = metadata.transient, "binding delivering value");
                got.set(true);
                sink.set_value(value.clone(), *metadata);
            }
            SignalEvent::DidChange => {
                windows.set(windows.get().saturating_sub(1));
                sink.change_handler().did_change();
            }
        }
    });

    if !received.get() {
        if let Some(initial) = initial {
            sink.set_value(initial, ChangeMetadata::committed());
        }
    }

    let id = sink.bindings().next_id();
    let weak = Rc::downgrade(&sink);
    let binding = Binding::new(owner, move || {
        removal.remove();
        if let Some(sink) = weak.upgrade() {
            let removed = sink.bindings().remove(id);
            if removed.is_some() {
                sink.change_handler().decrement_count(open_windows.get());
            }
        }
    });
    sink.bindings().insert(id, binding.clone());
    binding
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbind_is_idempotent_and_releases_owner() {
        let owner = Rc::new(());
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let binding = Binding::new(Box::new(owner.clone()), move || c.set(c.get() + 1));
        assert_eq!(Rc::strong_count(&owner), 2);

        binding.unbind();
        binding.clone().unbind();
        assert_eq!(calls.get(), 1);
        assert_eq!(Rc::strong_count(&owner), 1);
        assert!(!binding.is_bound());
    }

    #[test]
    fn binding_set_drop_unbinds() {
        let calls = Rc::new(Cell::new(0));
        {
            let set = BindingSet::new();
            for _ in 0..3 {
                let c = calls.clone();
                let id = set.next_id();
                set.insert(id, Binding::new(Box::new(()), move || c.set(c.get() + 1)));
            }
            assert_eq!(set.len(), 3);
        }
        assert_eq!(calls.get(), 3);
    }
}
