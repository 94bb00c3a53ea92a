// ============================================================================
// spark-bindings - Type Definitions
// Change events, metadata and equality hooks shared by signals and properties
// ============================================================================

// =============================================================================
// CHANGE METADATA
// =============================================================================

/// Extra information delivered alongside every new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeMetadata {
    /// `true` while a value is still being edited (a slider drag, a field
    /// being typed into). Transient values must not be durably committed.
    pub transient: bool,
}

impl ChangeMetadata {
    /// Metadata for a durable change.
    pub const fn committed() -> Self {
        Self { transient: false }
    }

    /// Metadata for a transient change.
    pub const fn transient() -> Self {
        Self { transient: true }
    }

    pub const fn new(transient: bool) -> Self {
        Self { transient }
    }
}

// =============================================================================
// SIGNAL EVENTS
// =============================================================================

/// One phase of the three-phase change protocol.
///
/// Every `WillChange` is balanced by exactly one `DidChange`. Windows may
/// nest or overlap; `Changing` is only ever delivered while at least one
/// window is open.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEvent<T> {
    /// A new value may be forthcoming (possibly asynchronously).
    WillChange,

    /// The new value.
    Changing(T, ChangeMetadata),

    /// Closes the window opened by the matching `WillChange`.
    DidChange,
}

impl<T> SignalEvent<T> {
    /// Returns the carried value for `Changing` events.
    pub fn value(&self) -> Option<&T> {
        match self {
            SignalEvent::Changing(value, _) => Some(value),
            _ => None,
        }
    }

    pub fn is_changing(&self) -> bool {
        matches!(self, SignalEvent::Changing(..))
    }
}

// =============================================================================
// BIDIRECTIONAL TRANSFORM RESULT
// =============================================================================

/// Result of a `connect_bidi` transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeResult<T> {
    /// Apply this value to the other side.
    Change(T),

    /// Skip propagation. Not an error: an unparsable string typed mid-edit
    /// simply does not reach the other side.
    NoChange,
}

impl<T> ChangeResult<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            ChangeResult::Change(value) => Some(value),
            ChangeResult::NoChange => None,
        }
    }
}

impl<T> From<Option<T>> for ChangeResult<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => ChangeResult::Change(value),
            None => ChangeResult::NoChange,
        }
    }
}

// =============================================================================
// EQUALITY
// =============================================================================

/// Equality function used to suppress redundant changes.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default equality using PartialEq
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}
