// ============================================================================
// spark-bindings - Constants
// Order-key rails and default attribute names
// ============================================================================

// =============================================================================
// ORDER KEY RAILS
// =============================================================================

/// Order key handed out when a collection has no neighbors at all.
///
/// Sits in the middle of the default rails so there is room on both sides.
pub const DEFAULT_FIRST_ORDER: f64 = 5.0;

/// Lower bound used when inserting before the first element.
pub const DEFAULT_LOWER_RAIL: f64 = 1.0;

/// Upper bound used when inserting after the last element.
pub const DEFAULT_UPPER_RAIL: f64 = 9.0;

/// Smallest gap between two neighbors that can still be split.
pub const DEFAULT_MIN_ORDER_GAP: f64 = 1e-9;

/// Spacing between keys produced by a renumbering plan.
pub const DEFAULT_RENUMBER_SPACING: f64 = 1.0;

// =============================================================================
// ATTRIBUTE NAMES
// =============================================================================

/// Default identifier attribute.
pub const DEFAULT_ID_ATTR: &str = "id";

/// Default order attribute.
pub const DEFAULT_ORDER_ATTR: &str = "order";

/// Default parent attribute for tree projections.
pub const DEFAULT_PARENT_ATTR: &str = "parent";
