#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Stored in place of null values and empty lists, which the collection cannot hold
pub const NONE_SENTINEL: &str = "None";

/// A primitive value the vector store accepts as metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A metadata value: either a single scalar or a non-empty list of scalars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Scalar(MetadataScalar),
    List(Vec<MetadataScalar>),
}

/// Cleaned chunk metadata, ordered by key
pub type Metadata = BTreeMap<String, MetadataValue>;

impl MetadataValue {
    /// Returns the string content of a scalar string value
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(MetadataScalar::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(MetadataScalar::Int(i)) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::Scalar(MetadataScalar::Str(value.to_string()))
    }
}

impl From<String> for MetadataValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::Scalar(MetadataScalar::Str(value))
    }
}

impl From<i64> for MetadataValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Scalar(MetadataScalar::Int(value))
    }
}

/// Coerce arbitrary JSON metadata into values the vector store accepts
///
/// Null becomes [`NONE_SENTINEL`], scalars pass through, an empty list becomes
/// the sentinel, a non-empty list keeps its scalars and stringifies anything
/// nested, and objects are stringified as compact JSON.
#[inline]
pub fn clean_metadata(raw: &Map<String, Value>) -> Metadata {
    raw.iter()
        .map(|(key, value)| (key.clone(), clean_value(value)))
        .collect()
}

fn clean_value(value: &Value) -> MetadataValue {
    match value {
        Value::Array(items) if items.is_empty() => {
            MetadataValue::Scalar(MetadataScalar::Str(NONE_SENTINEL.to_string()))
        }
        Value::Array(items) => MetadataValue::List(items.iter().map(clean_scalar).collect()),
        other => MetadataValue::Scalar(clean_scalar(other)),
    }
}

fn clean_scalar(value: &Value) -> MetadataScalar {
    match value {
        Value::Null => MetadataScalar::Str(NONE_SENTINEL.to_string()),
        Value::Bool(b) => MetadataScalar::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(MetadataScalar::Int)
            .or_else(|| n.as_f64().map(MetadataScalar::Float))
            .unwrap_or_else(|| MetadataScalar::Str(n.to_string())),
        Value::String(s) => MetadataScalar::Str(s.clone()),
        Value::Array(_) | Value::Object(_) => MetadataScalar::Str(value.to_string()),
    }
}
