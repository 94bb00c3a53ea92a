// ============================================================================
// spark-bindings - Values and Rows
// Attribute values, keyed rows and portable identifiers
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::error::PortableError;

// =============================================================================
// VALUE
// =============================================================================

/// A single attribute value held by a store row.
///
/// Values are used as identifiers, so equality and hashing are total: reals
/// compare by bit pattern (`NaN == NaN`, `0.0 != -0.0`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Numeric view used for order keys.
    pub fn as_order(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Booleans are stored as integers; any non-zero integer is true.
    pub fn as_bool(&self) -> Option<bool> {
        self.as_integer().map(|i| i != 0)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(i) => i.hash(state),
            Value::Real(r) => r.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Blob(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Blob(b) => {
                f.write_str("x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(value.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

// =============================================================================
// ROW
// =============================================================================

/// One store row: attribute name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    attributes: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Row::set`].
    ///
    /// # Example
    ///
    /// ```
    /// use spark_bindings::{Row, Value};
    ///
    /// let row = Row::new().with("id", 1).with("order", 2.5);
    /// assert_eq!(row.get("order"), Some(&Value::Real(2.5)));
    /// ```
    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) {
        self.attributes.insert(attribute.to_owned(), value.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// The row's identifier under `attribute`.
    pub fn id(&self, attribute: &str) -> Option<&Value> {
        self.get(attribute)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// =============================================================================
// PORTABLE IDENTIFIERS
// =============================================================================

/// Identifiers that can cross a process or pasteboard boundary.
pub trait PortableId: Sized {
    fn to_portable(&self) -> Result<serde_json::Value, PortableError>;

    fn from_portable(portable: &serde_json::Value) -> Result<Self, PortableError>;

    /// Flat string form, e.g. for a drag payload.
    fn to_portable_string(&self) -> Result<String, PortableError> {
        Ok(self.to_portable()?.to_string())
    }

    fn from_portable_str(s: &str) -> Result<Self, PortableError> {
        let portable: serde_json::Value = serde_json::from_str(s)?;
        Self::from_portable(&portable)
    }
}

impl PortableId for Value {
    /// JSON has no NaN or infinity, so non-finite reals are refused rather
    /// than written as `null`.
    fn to_portable(&self) -> Result<serde_json::Value, PortableError> {
        if let Value::Real(r) = self {
            if !r.is_finite() {
                return Err(PortableError::NonFinite(*r));
            }
        }
        // Value's serde form is already the tagged {"type", "value"} shape.
        Ok(serde_json::to_value(self)?)
    }

    fn from_portable(portable: &serde_json::Value) -> Result<Self, PortableError> {
        if let Some(kind) = portable.get("type").and_then(|t| t.as_str()) {
            if !matches!(kind, "null" | "integer" | "real" | "text" | "blob") {
                return Err(PortableError::UnsupportedType(kind.to_owned()));
            }
        }
        Ok(Value::deserialize(portable)?)
    }
}
