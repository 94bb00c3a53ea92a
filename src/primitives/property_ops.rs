// ============================================================================
// spark-bindings - Property Operations
// map, zip and boolean combinators lifted to properties
// ============================================================================

use std::any::Any;
use std::rc::Rc;

use crate::core::types::default_equals;
use crate::primitives::async_property::AsyncReadableProperty;
use crate::primitives::binding::PropertySource;
use crate::primitives::property::{ReadWriteProperty, ReadableProperty, ReadablePropertyType};
use crate::primitives::signal::Signal;

// =============================================================================
// SYNCHRONOUS OPERATIONS
// =============================================================================

/// Derived read-only properties. The result keeps its sources alive.
///
/// # Example
///
/// ```
/// use spark_bindings::{PropertyOps, ReadWriteProperty};
///
/// let count = ReadWriteProperty::new(2);
/// let label = count.map(|n| format!("{n} items"));
/// assert_eq!(label.value(), "2 items");
///
/// count.change(3, false);
/// assert_eq!(label.value(), "3 items");
/// ```
pub trait PropertyOps<T: Clone + 'static>: ReadablePropertyType<T> + Sized {
    fn map<U>(&self, transform: impl Fn(&T) -> U + 'static) -> ReadableProperty<U>
    where
        U: Clone + PartialEq + 'static,
    {
        let transform = Rc::new(transform);
        let initial = transform(&self.value());
        let signal = self.signal().map(move |v| transform(v));
        ReadableProperty::build(initial, &signal, default_equals, Some(self.owner()))
    }

    fn zip<U, P>(&self, other: &P) -> ReadableProperty<(T, U)>
    where
        T: PartialEq,
        U: Clone + PartialEq + 'static,
        P: ReadablePropertyType<U>,
    {
        let initial = (self.value(), other.value());
        let signal = self.signal().zip(&other.signal());
        let owners: Box<dyn Any> = Box::new((self.owner(), other.owner()));
        ReadableProperty::build(initial, &signal, default_equals, Some(owners))
    }
}

impl<T: Clone + 'static, P: ReadablePropertyType<T>> PropertyOps<T> for P {}

/// Boolean combinators over synchronous properties.
pub trait BoolPropertyOps: ReadablePropertyType<bool> + Sized {
    fn not(&self) -> ReadableProperty<bool> {
        self.map(|v| !*v)
    }

    fn and<P: ReadablePropertyType<bool>>(&self, other: &P) -> ReadableProperty<bool> {
        combine_bool(self, other, |a, b| a && b)
    }

    fn or<P: ReadablePropertyType<bool>>(&self, other: &P) -> ReadableProperty<bool> {
        combine_bool(self, other, |a, b| a || b)
    }
}

impl<P: ReadablePropertyType<bool>> BoolPropertyOps for P {}

fn combine_bool<L, R>(lhs: &L, rhs: &R, op: fn(bool, bool) -> bool) -> ReadableProperty<bool>
where
    L: ReadablePropertyType<bool>,
    R: ReadablePropertyType<bool>,
{
    let initial = op(lhs.value(), rhs.value());
    let signal = lhs.signal().zip_with(&rhs.signal(), move |a, b| op(*a, *b));
    let owners: Box<dyn Any> = Box::new((lhs.owner(), rhs.owner()));
    ReadableProperty::build(initial, &signal, default_equals, Some(owners))
}

// =============================================================================
// ASYNCHRONOUS OPERATIONS
// =============================================================================

impl<T: Clone + 'static> AsyncReadableProperty<T> {
    /// An async property holding `transform(value)`. Starting it starts
    /// `self`.
    pub fn map<U: Clone + 'static>(
        &self,
        transform: impl Fn(&T) -> U + 'static,
    ) -> AsyncReadableProperty<U> {
        AsyncReadableProperty::build(&self.signal().map(transform), Some(self.owner()))
    }

    /// Defined once both sides are defined.
    pub fn zip<U: Clone + 'static>(
        &self,
        other: &AsyncReadableProperty<U>,
    ) -> AsyncReadableProperty<(T, U)> {
        let owners: Box<dyn Any> = Box::new((self.owner(), other.owner()));
        AsyncReadableProperty::build(&self.signal().zip(&other.signal()), Some(owners))
    }
}

impl AsyncReadableProperty<bool> {
    pub fn not(&self) -> AsyncReadableProperty<bool> {
        self.map(|v| !*v)
    }

    pub fn and(&self, other: &AsyncReadableProperty<bool>) -> AsyncReadableProperty<bool> {
        let owners: Box<dyn Any> = Box::new((self.owner(), other.owner()));
        AsyncReadableProperty::build(&self.signal().and(&other.signal()), Some(owners))
    }

    pub fn or(&self, other: &AsyncReadableProperty<bool>) -> AsyncReadableProperty<bool> {
        let owners: Box<dyn Any> = Box::new((self.owner(), other.owner()));
        AsyncReadableProperty::build(&self.signal().or(&other.signal()), Some(owners))
    }
}

// =============================================================================
// ANY READABLE PROPERTY
// =============================================================================

/// One readable property of any flavor, dispatched explicitly.
///
/// Lets a consumer accept "a string that is either known now or loaded
/// later" without inspecting types at runtime.
#[derive(Clone)]
pub enum AnyReadableProperty<T> {
    Sync(ReadableProperty<T>),
    ReadWrite(ReadWriteProperty<T>),
    Async(AsyncReadableProperty<T>),
}

impl<T: Clone + 'static> AnyReadableProperty<T> {
    /// The current value, `None` for an async property that has not loaded.
    pub fn value(&self) -> Option<T> {
        match self {
            AnyReadableProperty::Sync(p) => Some(p.value()),
            AnyReadableProperty::ReadWrite(p) => Some(p.value()),
            AnyReadableProperty::Async(p) => p.value(),
        }
    }

    /// Starts an async property. No effect for the synchronous flavors.
    pub fn start(&self) {
        if let AnyReadableProperty::Async(p) = self {
            p.start();
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, AnyReadableProperty::Async(_))
    }
}

impl<T: Clone + 'static> PropertySource<T> for AnyReadableProperty<T> {
    fn signal(&self) -> Signal<T> {
        match self {
            AnyReadableProperty::Sync(p) => p.signal(),
            AnyReadableProperty::ReadWrite(p) => p.signal(),
            AnyReadableProperty::Async(p) => p.signal(),
        }
    }

    fn owner(&self) -> Box<dyn Any> {
        match self {
            AnyReadableProperty::Sync(p) => p.owner(),
            AnyReadableProperty::ReadWrite(p) => p.owner(),
            AnyReadableProperty::Async(p) => p.owner(),
        }
    }
}

impl<T> From<ReadableProperty<T>> for AnyReadableProperty<T> {
    fn from(p: ReadableProperty<T>) -> Self {
        AnyReadableProperty::Sync(p)
    }
}

impl<T> From<ReadWriteProperty<T>> for AnyReadableProperty<T> {
    fn from(p: ReadWriteProperty<T>) -> Self {
        AnyReadableProperty::ReadWrite(p)
    }
}

impl<T> From<AsyncReadableProperty<T>> for AnyReadableProperty<T> {
    fn from(p: AsyncReadableProperty<T>) -> Self {
        AnyReadableProperty::Async(p)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::binding::BindableProperty;
    use std::cell::Cell;

    #[test]
    fn map_follows_source_and_keeps_it_alive() {
        let mapped = {
            let source = ReadWriteProperty::new(1);
            let mapped = source.map(|v| v * 10);
            source.change(2, false);
            mapped
        };
        assert_eq!(mapped.value(), 20);
    }

    #[test]
    fn zip_pairs_latest_values() {
        let a = ReadWriteProperty::new(1);
        let b = ReadWriteProperty::new("x");
        let zipped = a.zip(&b);
        assert_eq!(zipped.value(), (1, "x"));
        b.change("y", false);
        assert_eq!(zipped.value(), (1, "y"));
    }

    #[test]
    fn boolean_ops_track_both_sides() {
        let a = ReadWriteProperty::new(true);
        let b = ReadWriteProperty::new(false);
        let and = a.and(&b);
        let or = a.or(&b);
        let not_b = b.not();
        assert!(!and.value());
        assert!(or.value());
        assert!(not_b.value());

        b.change(true, false);
        assert!(and.value());
        assert!(!not_b.value());

        a.change(false, false);
        b.change(false, false);
        assert!(!or.value());
    }

    #[test]
    fn mapped_property_is_a_bind_source() {
        let source = ReadWriteProperty::new(2);
        let sink = ReadWriteProperty::new(String::new());
        let _binding = sink.bind(&source.map(|v| v.to_string()));
        source.change(5, false);
        assert_eq!(sink.value(), "5");
    }

    #[test]
    fn async_ops_stay_undefined_until_both_sides_load() {
        let (lhs_signal, lhs) = Signal::pipe();
        let (rhs_signal, rhs) = Signal::pipe();
        let a = AsyncReadableProperty::new(&lhs_signal);
        let b = AsyncReadableProperty::new(&rhs_signal);
        let both = a.and(&b);
        both.start();

        lhs.changed(true);
        assert_eq!(both.value(), None);
        rhs.changed(true);
        assert_eq!(both.value(), Some(true));
        assert_eq!(both.not().value(), None);
    }

    #[test]
    fn any_readable_dispatches() {
        let sync: AnyReadableProperty<i32> = ReadableProperty::constant(1).into();
        let pending: AnyReadableProperty<i32> =
            AsyncReadableProperty::new(&Signal::pipe().0).into();
        assert_eq!(sync.value(), Some(1));
        assert_eq!(pending.value(), None);
        assert!(pending.is_async());

        let loaded: AnyReadableProperty<i32> = AsyncReadableProperty::constant(4).into();
        loaded.start();
        assert_eq!(loaded.value(), Some(4));

        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let _removal = sync.signal().observe_changing(move |_, _| h.set(h.get() + 1));
        assert_eq!(hits.get(), 1);
    }
}
