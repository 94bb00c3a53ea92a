// ============================================================================
// spark-bindings - Core Module
// Fundamental types, constants and errors shared by every layer
// ============================================================================

pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{BindingError, PortableError, ProjectionError, StoreError};
pub use types::{default_equals, ChangeMetadata, ChangeResult, EqualsFn, SignalEvent};
