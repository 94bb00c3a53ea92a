// ============================================================================
// spark-bindings - Primitives Module
// Signals, properties and bindings
// ============================================================================

pub mod async_property;
pub mod binding;
pub mod operations;
pub mod property;
pub mod property_ops;
pub mod signal;

pub use async_property::{AsyncReadWriteProperty, AsyncReadableProperty, MutationConfig};
pub use binding::{BindableProperty, Binding, BindingSet, PropertySource, Sink};
pub use property::{
    ActionProperty, PropertyOptions, ReadWriteProperty, ReadableProperty, ReadablePropertyType,
    WriteOnlyProperty,
};
pub use property_ops::{AnyReadableProperty, BoolPropertyOps, PropertyOps};
pub use signal::{Notify, ObserverFn, ObserverRemoval, Signal, SignalSource};
