// ============================================================================
// spark-bindings - Typed Extraction
// Single values, value sets and common values pulled out of a row snapshot
// ============================================================================
//
// Every extractor reads one attribute out of a `&[Row]` snapshot, which makes
// them drop-in transforms for `query_signal`:
//
//     let title = query_signal(store, |rows| one_string(rows, "title"), options);

use std::collections::HashSet;

use serde::Serialize;

use crate::store::value::{Row, Value};

// =============================================================================
// COMMON VALUE
// =============================================================================

/// What a set of rows holds for one attribute: nothing, a single shared
/// value, or a mix.
///
/// # Example
///
/// ```
/// use spark_bindings::{row, CommonValue};
/// use spark_bindings::store::extract::common_value;
///
/// let rows = vec![row! { "id" => 1, "color" => "red" }, row! { "id" => 2, "color" => "red" }];
/// let color = common_value(&rows, "color", |v| v.as_text().map(str::to_owned));
/// assert_eq!(color, CommonValue::One("red".to_owned()));
/// assert!(color.all(&"red".to_owned()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CommonValue<T> {
    /// No row defines the value.
    None,
    /// Every row shares this value.
    One(T),
    /// The rows disagree.
    Multi,
}

impl<T> Default for CommonValue<T> {
    fn default() -> Self {
        CommonValue::None
    }
}

impl<T> CommonValue<T> {
    /// The shared value, or `default` for `None` and `Multi`.
    pub fn or_default(self, default: T) -> T {
        match self {
            CommonValue::One(value) => value,
            CommonValue::None | CommonValue::Multi => default,
        }
    }

    /// The shared value, if there is exactly one.
    pub fn or_none(self) -> Option<T> {
        match self {
            CommonValue::One(value) => Some(value),
            CommonValue::None | CommonValue::Multi => None,
        }
    }

    /// `Some(value)` for `Multi`, otherwise `None`. Handy for mixed-state
    /// placeholders such as "Multiple Values".
    pub fn when_multi<U>(&self, value: U) -> Option<U> {
        match self {
            CommonValue::Multi => Some(value),
            CommonValue::None | CommonValue::One(_) => None,
        }
    }

    /// `value` for `Multi`, otherwise `otherwise`.
    pub fn when_multi_or<U>(&self, value: U, otherwise: U) -> U {
        self.when_multi(value).unwrap_or(otherwise)
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, CommonValue::Multi)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CommonValue<U> {
        match self {
            CommonValue::None => CommonValue::None,
            CommonValue::One(value) => CommonValue::One(f(value)),
            CommonValue::Multi => CommonValue::Multi,
        }
    }
}

impl<T: PartialEq> CommonValue<T> {
    /// Whether every row holds `value`.
    pub fn all(&self, value: &T) -> bool {
        matches!(self, CommonValue::One(v) if v == value)
    }
}

/// The value shared by every row that defines `attribute`.
///
/// Rows without the attribute are skipped. Distinct values give `Multi`;
/// a single shared value that `transform` refuses gives `None`.
pub fn common_value<T>(
    rows: &[Row],
    attribute: &str,
    transform: impl Fn(&Value) -> Option<T>,
) -> CommonValue<T> {
    let mut values = rows.iter().filter_map(|row| row.get(attribute));
    let Some(first) = values.next() else {
        return CommonValue::None;
    };
    if values.any(|value| value != first) {
        return CommonValue::Multi;
    }
    transform(first).map_or(CommonValue::None, CommonValue::One)
}

// =============================================================================
// VALUE SETS
// =============================================================================

/// Every distinct value of `attribute` across the rows.
pub fn all_values(rows: &[Row], attribute: &str) -> HashSet<Value> {
    rows.iter()
        .filter_map(|row| row.get(attribute).cloned())
        .collect()
}

/// Every distinct value of `attribute` that `transform` accepts.
pub fn all_values_with<T: Eq + std::hash::Hash>(
    rows: &[Row],
    attribute: &str,
    transform: impl Fn(&Value) -> Option<T>,
) -> HashSet<T> {
    rows.iter()
        .filter_map(|row| row.get(attribute))
        .filter_map(transform)
        .collect()
}

/// `attribute` of some row, if there are any rows.
pub fn any_value(rows: &[Row], attribute: &str) -> Option<Value> {
    rows.first().and_then(|row| row.get(attribute)).cloned()
}

// =============================================================================
// SINGLE VALUES
// =============================================================================

/// The row, if there is exactly one.
pub fn one_row(rows: &[Row]) -> Option<Row> {
    match rows {
        [row] => Some(row.clone()),
        _ => None,
    }
}

/// `attribute` of the only row. `None` for zero rows or several.
pub fn one_value(rows: &[Row], attribute: &str) -> Option<Value> {
    match rows {
        [row] => row.get(attribute).cloned(),
        _ => None,
    }
}

pub fn one_string_or_none(rows: &[Row], attribute: &str) -> Option<String> {
    one_value(rows, attribute).and_then(|v| v.as_text().map(str::to_owned))
}

/// The only row's text, or an empty string.
pub fn one_string(rows: &[Row], attribute: &str) -> String {
    one_string_or_none(rows, attribute).unwrap_or_default()
}

pub fn one_integer_or_none(rows: &[Row], attribute: &str) -> Option<i64> {
    one_value(rows, attribute).and_then(|v| v.as_integer())
}

/// The only row's integer, or zero.
pub fn one_integer(rows: &[Row], attribute: &str) -> i64 {
    one_integer_or_none(rows, attribute).unwrap_or_default()
}

pub fn one_double_or_none(rows: &[Row], attribute: &str) -> Option<f64> {
    one_value(rows, attribute).and_then(|v| v.as_real())
}

/// The only row's real, or zero.
pub fn one_double(rows: &[Row], attribute: &str) -> f64 {
    one_double_or_none(rows, attribute).unwrap_or_default()
}

pub fn one_bool_or_none(rows: &[Row], attribute: &str) -> Option<bool> {
    one_value(rows, attribute).and_then(|v| v.as_bool())
}

/// The only row's flag, or `false`.
pub fn one_bool(rows: &[Row], attribute: &str) -> bool {
    one_bool_or_none(rows, attribute).unwrap_or_default()
}

pub fn one_blob_or_none(rows: &[Row], attribute: &str) -> Option<Vec<u8>> {
    one_value(rows, attribute).and_then(|v| v.as_blob().map(<[u8]>::to_vec))
}

/// The only row's blob, or an empty one.
pub fn one_blob(rows: &[Row], attribute: &str) -> Vec<u8> {
    one_blob_or_none(rows, attribute).unwrap_or_default()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn text(v: &Value) -> Option<String> {
        v.as_text().map(str::to_owned)
    }

    #[test]
    fn common_value_of_no_rows_is_none() {
        assert_eq!(common_value(&[], "color", text), CommonValue::None);
        let rows = vec![row! { "id" => 1 }];
        assert_eq!(common_value(&rows, "color", text), CommonValue::None);
    }

    #[test]
    fn common_value_of_agreeing_rows_is_one() {
        let rows = vec![
            row! { "id" => 1, "color" => "red" },
            row! { "id" => 2 },
            row! { "id" => 3, "color" => "red" },
        ];
        let color = common_value(&rows, "color", text);
        assert_eq!(color, CommonValue::One("red".to_owned()));
        assert!(color.all(&"red".to_owned()));
        assert!(!color.all(&"blue".to_owned()));
        assert_eq!(color.when_multi("mixed"), None);
    }

    #[test]
    fn common_value_of_disagreeing_rows_is_multi() {
        let rows = vec![
            row! { "id" => 1, "color" => "red" },
            row! { "id" => 2, "color" => "blue" },
        ];
        let color = common_value(&rows, "color", text);
        assert!(color.is_multi());
        assert!(!color.all(&"red".to_owned()));
        assert_eq!(color.when_multi_or("mixed", "same"), "mixed");
        assert_eq!(color.clone().or_none(), None);
        assert_eq!(color.or_default("none".to_owned()), "none");
    }

    #[test]
    fn refused_shared_value_is_none() {
        let rows = vec![row! { "id" => 1, "color" => 7 }, row! { "id" => 2, "color" => 7 }];
        assert_eq!(common_value(&rows, "color", text), CommonValue::None);
        assert_eq!(
            common_value(&rows, "color", Value::as_integer),
            CommonValue::One(7)
        );
    }

    #[test]
    fn single_values_need_exactly_one_row() {
        let one = vec![row! { "id" => 1, "title" => "Page1", "count" => 3, "done" => true }];
        assert_eq!(one_row(&one), Some(one[0].clone()));
        assert_eq!(one_string(&one, "title"), "Page1");
        assert_eq!(one_integer(&one, "count"), 3);
        assert!(one_bool(&one, "done"));

        let two = vec![row! { "id" => 1, "title" => "a" }, row! { "id" => 2, "title" => "a" }];
        assert_eq!(one_row(&two), None);
        assert_eq!(one_string_or_none(&two, "title"), None);
        assert_eq!(one_string(&two, "title"), "");
        assert_eq!(one_integer(&[], "count"), 0);
        assert!(!one_bool(&[], "done"));
    }

    #[test]
    fn wrong_types_fall_back_to_defaults() {
        let rows = vec![row! { "id" => 1, "size" => 2, "data" => "text" }];
        assert_eq!(one_double_or_none(&rows, "size"), None);
        assert_eq!(one_double(&rows, "size"), 0.0);
        assert_eq!(one_blob(&rows, "data"), Vec::<u8>::new());

        let rows = vec![row! { "id" => 1, "size" => 2.5, "data" => vec![1u8, 2] }];
        assert_eq!(one_double(&rows, "size"), 2.5);
        assert_eq!(one_blob_or_none(&rows, "data"), Some(vec![1, 2]));
    }

    #[test]
    fn value_sets_are_distinct() {
        let rows = vec![
            row! { "id" => 1, "tag" => "a" },
            row! { "id" => 2, "tag" => "b" },
            row! { "id" => 3, "tag" => "a" },
            row! { "id" => 4 },
        ];
        let tags = all_values(&rows, "tag");
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&Value::from("b")));
        assert_eq!(all_values_with(&rows, "tag", text).len(), 2);
        assert_eq!(any_value(&rows, "tag"), Some(Value::from("a")));
        assert_eq!(any_value(&[], "tag"), None);
    }
}
