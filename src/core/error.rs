// ============================================================================
// spark-bindings - Errors
// Store failures, projection contract violations and binding errors
// ============================================================================

use thiserror::Error;

use crate::store::value::Value;

// =============================================================================
// STORE ERRORS
// =============================================================================

/// A failure reported by the store for a query or a commit.
///
/// Distinct from an empty result: a failed query never produces an empty
/// row set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("store unavailable")]
    Unavailable,
}

// =============================================================================
// PROJECTION ERRORS
// =============================================================================

/// Contract violations detected while applying store rows to a projection,
/// and failures of the order-planning helpers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("row {id} references parent {parent} which is neither in the tree nor in the batch")]
    MissingParent { id: Value, parent: Value },

    #[error("id {0} appears more than once")]
    DuplicateId(Value),

    #[error("id {0} is not in the projection")]
    UnknownId(Value),

    #[error("row is missing attribute `{0}`")]
    MissingAttribute(String),

    #[error("attribute `{attribute}` of row {id} is not a number")]
    InvalidOrder { id: Value, attribute: String },

    #[error("moving {0} would make it its own ancestor")]
    CyclicParent(Value),

    #[error("index {index} is out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no order key fits between {low} and {high}")]
    OrderExhausted { low: f64, high: f64 },

    #[error("projection has not loaded its initial rows")]
    NotStarted,

    #[error("initial load failed: {0}")]
    Store(#[from] StoreError),
}

// =============================================================================
// BINDING ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    /// A write was attempted before the property received its first value.
    #[error("property is still awaiting its first value")]
    NotReady,

    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// PORTABLE ID ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum PortableError {
    #[error("malformed portable id: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported portable id type `{0}`")]
    UnsupportedType(String),

    #[error("real id {0} has no portable form")]
    NonFinite(f64),
}
