//! Query-related data models.
//!
//! This module defines the positional arguments passed to procedures and the
//! shapes returned by the select operations.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One result row: column name to decoded value.
pub type Record = serde_json::Map<String, JsonValue>;

/// A positional argument for a stored procedure call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data, serialized as base64.
    ///
    /// Deserialization tries `String` first, so a JSON string always becomes
    /// [`QueryParam::String`]; bytes can only be built from Rust.
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Parse a command-line argument: JSON scalars keep their type, anything else is a string.
    pub fn parse_lenient(raw: &str) -> Self {
        serde_json::from_str::<QueryParam>(raw).unwrap_or_else(|_| Self::String(raw.to_string()))
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// How many rows a select should hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fetch {
    /// Only the first row.
    One,
    /// Every row, in fetch order.
    #[default]
    All,
}

impl From<bool> for Fetch {
    /// `true` means "return one".
    fn from(return_one: bool) -> Self {
        if return_one { Self::One } else { Self::All }
    }
}

/// Result of a select operation.
///
/// `One(None)` is the empty single-row outcome; it is never a record of nulls.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    One(Option<Record>),
    All(Vec<Record>),
}

impl Selection {
    /// The single record, if this was a single-row select that found one.
    ///
    /// For `All`, yields the first record.
    pub fn into_one(self) -> Option<Record> {
        match self {
            Self::One(record) => record,
            Self::All(records) => records.into_iter().next(),
        }
    }

    /// All records. A single-row select yields zero or one.
    pub fn into_all(self) -> Vec<Record> {
        match self {
            Self::One(record) => record.into_iter().collect(),
            Self::All(records) => records,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(record) => record.is_none(),
            Self::All(records) => records.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::One(record) => usize::from(record.is_some()),
            Self::All(records) => records.len(),
        }
    }
}
