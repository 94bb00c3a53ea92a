// ============================================================================
// spark-bindings - Reactivity Module
// Busy-window counting, bidirectional guards and equality helpers
// ============================================================================

pub mod bidi;
pub mod change_handler;
pub mod equality;

pub use bidi::{BidiGuard, BidiState};
pub use change_handler::ChangeHandler;
