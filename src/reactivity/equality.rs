// ============================================================================
// spark-bindings - Equality Functions
// NaN-safe float comparison and order-key equality for the projections
// ============================================================================

use crate::store::value::Value;

// =============================================================================
// SAFE EQUALITY (Handles NaN)
// =============================================================================

/// Safe equality for f64 values.
/// Handles NaN correctly: NaN == NaN returns true.
///
/// # Example
/// ```
/// use spark_bindings::reactivity::equality::safe_equals_f64;
///
/// assert!(safe_equals_f64(&1.0, &1.0));
/// assert!(!safe_equals_f64(&1.0, &2.0));
/// assert!(safe_equals_f64(&f64::NAN, &f64::NAN));
/// ```
pub fn safe_equals_f64(a: &f64, b: &f64) -> bool {
    if a.is_nan() {
        return b.is_nan();
    }
    a == b
}

// =============================================================================
// ORDER KEYS
// =============================================================================

/// Compares two order attributes numerically.
///
/// `Integer(2)` and `Real(2.0)` hold the same order key, so moving between
/// the two representations is not a move. The array and tree projections
/// use this to tell an in-place update from a reposition.
///
/// # Example
/// ```
/// use spark_bindings::reactivity::equality::order_values_equal;
/// use spark_bindings::Value;
///
/// assert!(order_values_equal(Some(&Value::Integer(2)), Some(&Value::Real(2.0))));
/// assert!(!order_values_equal(Some(&Value::Integer(2)), None));
/// ```
pub fn order_values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => match (a.as_order(), b.as_order()) {
            (Some(x), Some(y)) => safe_equals_f64(&x, &y),
            _ => a == b,
        },
        _ => false,
    }
}

// =============================================================================
// TESTS
// =============================================================================
