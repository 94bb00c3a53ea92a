// ============================================================================
// spark-bindings - Ordered Elements
// Sorted insertion and fractional order-key allocation
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::core::constants::{
    DEFAULT_FIRST_ORDER, DEFAULT_LOWER_RAIL, DEFAULT_MIN_ORDER_GAP, DEFAULT_RENUMBER_SPACING,
    DEFAULT_UPPER_RAIL,
};
use crate::core::error::ProjectionError;
use crate::store::value::Value;

// =============================================================================
// RAILS
// =============================================================================

/// Bounds used when allocating order keys without two neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRails {
    /// Key for the first element of an empty collection.
    pub first: f64,
    /// Stand-in for the missing lower neighbor.
    pub lower: f64,
    /// Stand-in for the missing upper neighbor.
    pub upper: f64,
    /// Neighbors closer than this are considered exhausted.
    pub min_gap: f64,
    /// Distance between keys in a renumbering plan.
    pub renumber_spacing: f64,
}

impl Default for OrderRails {
    fn default() -> Self {
        Self {
            first: DEFAULT_FIRST_ORDER,
            lower: DEFAULT_LOWER_RAIL,
            upper: DEFAULT_UPPER_RAIL,
            min_gap: DEFAULT_MIN_ORDER_GAP,
            renumber_spacing: DEFAULT_RENUMBER_SPACING,
        }
    }
}

// =============================================================================
// SORTED INSERTION
// =============================================================================

/// Inserts `item` into `items`, which must already be sorted by `key`.
///
/// Equal keys keep arrival order: the new item lands after every item with
/// the same key. Returns the index it landed at.
pub fn insert_sorted<T>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> f64) -> usize {
    let k = key(&item);
    let index = items.partition_point(|existing| key(existing) <= k);
    items.insert(index, item);
    index
}

// =============================================================================
// KEY ALLOCATION
// =============================================================================

/// An order key between `low` and `high`.
///
/// - both present: the midpoint
/// - neither: `rails.first`
/// - only `low`: halfway to `rails.upper`, or one spacing past `low` when it
///   already sits at or above the rail
/// - only `high`: the mirror image against `rails.lower`
///
/// Existing keys are never renumbered. See [`checked_order_key_between`]
/// for the variant that reports exhausted gaps.
pub fn order_key_between(low: Option<f64>, high: Option<f64>, rails: &OrderRails) -> f64 {
    match (low, high) {
        (Some(lo), Some(hi)) => lo + (hi - lo) / 2.0,
        (None, None) => rails.first,
        (Some(lo), None) => {
            if lo < rails.upper {
                lo + (rails.upper - lo) / 2.0
            } else {
                lo + rails.renumber_spacing
            }
        }
        (None, Some(hi)) => {
            if hi > rails.lower {
                rails.lower + (hi - rails.lower) / 2.0
            } else {
                hi - rails.renumber_spacing
            }
        }
    }
}

/// Like [`order_key_between`], but fails with
/// [`ProjectionError::OrderExhausted`] when the neighbors are out of order,
/// closer than `rails.min_gap`, or the midpoint is not strictly between
/// them.
pub fn checked_order_key_between(
    low: Option<f64>,
    high: Option<f64>,
    rails: &OrderRails,
) -> Result<f64, ProjectionError> {
    let key = order_key_between(low, high, rails);
    if let (Some(lo), Some(hi)) = (low, high) {
        if hi - lo < rails.min_gap || key <= lo || key >= hi {
            return Err(ProjectionError::OrderExhausted { low: lo, high: hi });
        }
    }
    if !key.is_finite() {
        return Err(ProjectionError::OrderExhausted {
            low: low.unwrap_or(f64::NEG_INFINITY),
            high: high.unwrap_or(f64::INFINITY),
        });
    }
    Ok(key)
}

/// Evenly spaced keys for `ids`, in the order given.
pub fn renumbered<'a>(
    ids: impl IntoIterator<Item = &'a Value>,
    rails: &OrderRails,
) -> Vec<(Value, f64)> {
    ids.into_iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), rails.lower + rails.renumber_spacing * (i + 1) as f64))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
