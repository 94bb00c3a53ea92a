// ============================================================================
// spark-bindings - Reactive Bindings over Asynchronous Stores
// ============================================================================
//
// Signals with a three-phase change protocol, properties that cache their
// latest value, one- and two-way bindings between them, and projections of
// an asynchronous, set-valued store into sorted arrays and trees.
//
// Everything runs on one logical timeline. The store is the only source of
// asynchrony and calls back onto that same timeline, so nothing here locks.
// ============================================================================

pub mod collections;
pub mod core;
pub mod primitives;
pub mod reactivity;
pub mod store;

mod macros;

// Re-export core items at crate root for ergonomic access
pub use core::constants;
pub use core::error::{BindingError, PortableError, ProjectionError, StoreError};
pub use core::types::{default_equals, ChangeMetadata, ChangeResult, EqualsFn, SignalEvent};

// Signals, properties and bindings
pub use primitives::async_property::{AsyncReadWriteProperty, AsyncReadableProperty, MutationConfig};
pub use primitives::binding::{BindableProperty, Binding, BindingSet, PropertySource, Sink};
pub use primitives::property::{
    ActionProperty, PropertyOptions, ReadWriteProperty, ReadableProperty, ReadablePropertyType,
    WriteOnlyProperty,
};
pub use primitives::property_ops::{AnyReadableProperty, BoolPropertyOps, PropertyOps};
pub use primitives::signal::{Notify, ObserverFn, ObserverRemoval, Signal, SignalSource};

// Busy windows, bidirectional guards and equality helpers
pub use reactivity::bidi::{BidiGuard, BidiState};
pub use reactivity::change_handler::ChangeHandler;
pub use reactivity::equality::{order_values_equal, safe_equals_f64};

// Store interface
pub use store::extract::CommonValue;
pub use store::memory::{MemoryStore, Transaction};
pub use store::signal::{query_signal, QuerySignalOptions};
pub use store::value::{PortableId, Row, Value};
pub use store::{
    query_with, Differential, QueryCompletion, Snapshot, Store, StoreObserver, StoreSubscription,
};

// Projections
pub use collections::{
    ArrayChange, ArrayConfig, ArrayElement, ArrayProperty, MoveTarget, OrderRails, OrphanPolicy,
    RelationChangeParts, TreeChange, TreeConfig, TreeNode, TreePath, TreeProperty,
};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn constants_match_default_rails() {
        let rails = OrderRails::default();
        assert_eq!(rails.first, constants::DEFAULT_FIRST_ORDER);
        assert_eq!(rails.lower, constants::DEFAULT_LOWER_RAIL);
        assert_eq!(rails.upper, constants::DEFAULT_UPPER_RAIL);
        assert!(rails.lower < rails.first && rails.first < rails.upper);
    }

    #[test]
    fn row_macro_builds_rows() {
        let r = row! { "id" => 1, "order" => 2.5 };
        assert_eq!(r.id("id"), Some(&Value::Integer(1)));
        assert_eq!(r.get("order").and_then(Value::as_order), Some(2.5));
        assert!(row! {}.is_empty());
    }

    #[test]
    fn projection_feeds_a_bound_property() {
        // A read-write property bound to an array projection's element
        // count through map.
        let store = MemoryStore::new("id");
        let array = ArrayProperty::new(store.clone(), ArrayConfig::default());
        let full = array.full_array();
        let count = ReadWriteProperty::new(0usize);
        let _binding = count.bind(&full.map(|elements| elements.len()));
        store.flush();
        assert_eq!(count.value(), 0);

        store.insert(row! { "id" => 1, "order" => 5.0 }).unwrap();
        store.insert(row! { "id" => 2, "order" => 7.0 }).unwrap();
        assert!(count.change_handler().is_locked());
        store.flush();
        assert_eq!(count.value(), 2);
        assert!(!count.change_handler().is_locked());
    }

    #[test]
    fn query_signal_drives_a_readable_property() {
        let store = MemoryStore::with_rows("id", vec![row! { "id" => 1 }]);
        let signal = query_signal(store.clone(), |rows| rows.len(), QuerySignalOptions::default());
        let prop = AsyncReadableProperty::new(&signal);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _removal = prop
            .signal()
            .observe_changing(cloned!(seen => move |n: &usize, _| seen.borrow_mut().push(*n)));
        store.flush();
        store.delete(&Value::Integer(1)).unwrap();
        store.flush();
        assert_eq!(*seen.borrow(), vec![1, 0]);
        assert_eq!(prop.value(), Some(0));
    }
}
