//! MySQL column decoding.
//!
//! Column values are decoded into `serde_json::Value` in two phases:
//! 1. `TypeCategory` classifies the column's MySQL type name
//! 2. a category-specific decoder extracts the value
//!
//! Values are produced positionally, one per column, so that duplicate column
//! names survive until records are built.

use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for a MySQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Unknown,
}

/// Classify a MySQL type name (as reported by the driver) into a category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal - before the float checks, "numeric" overlaps
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    // Binary and text before integers: TINYBLOB / TINYTEXT share the "tiny" prefix
    if lower.contains("blob") || lower.contains("binary") || lower == "bit" {
        return TypeCategory::Binary;
    }
    if lower.contains("text") || lower.contains("char") || lower == "enum" || lower == "set" {
        return TypeCategory::Text;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower == "date" || lower == "time" || lower == "datetime" || lower == "timestamp" {
        return TypeCategory::Temporal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower == "year" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Decode binary data to a JSON value.
///
/// If `decode_binary` is true, attempts to decode as UTF-8 text first.
/// Falls back to base64 encoding if not valid UTF-8 or if `decode_binary` is false.
pub fn decode_binary_value(bytes: &[u8], decode_binary: bool) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    if decode_binary {
        match std::str::from_utf8(bytes) {
            Ok(s) => JsonValue::String(s.to_string()),
            Err(_) => JsonValue::String(STANDARD.encode(bytes)),
        }
    } else {
        JsonValue::String(STANDARD.encode(bytes))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Column names of a row, in result order (duplicates kept).
pub fn column_names(row: &MySqlRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Decoded values of a row, in result order.
pub fn row_values(row: &MySqlRow, decode_binary: bool) -> Vec<JsonValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let type_name = col.type_info().name();
            decode_column(row, idx, categorize_type(type_name), decode_binary)
        })
        .collect()
}

fn decode_column(
    row: &MySqlRow,
    idx: usize,
    category: TypeCategory,
    decode_binary: bool,
) -> JsonValue {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return JsonValue::Null,
        Ok(_) => {}
        Err(e) => {
            tracing::error!(column = idx, "Failed to read column: {:?}", e);
            return JsonValue::Null;
        }
    }

    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx, decode_binary),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Temporal => decode_temporal(row, idx),
        TypeCategory::Text | TypeCategory::Unknown => decode_text(row, idx),
    }
}

fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<RawDecimal, _>(idx) {
        Ok(v) => JsonValue::String(v.0),
        Err(e) => {
            tracing::error!("Failed to decode DECIMAL: {:?}", e);
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(v) = row.try_get::<i8, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(v) = row.try_get::<u32, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(v) = row.try_get::<u16, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(v) = row.try_get::<u8, _>(idx) {
        return JsonValue::Number(v.into());
    }
    JsonValue::Null
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<bool, _>(idx)
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(v) = row.try_get::<f32, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &MySqlRow, idx: usize, decode_binary: bool) -> JsonValue {
    row.try_get::<Vec<u8>, _>(idx)
        .map(|v| decode_binary_value(&v, decode_binary))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<JsonValue, _>(idx).unwrap_or(JsonValue::Null)
}

fn decode_temporal(row: &MySqlRow, idx: usize) -> JsonValue {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
        return JsonValue::String(v.to_rfc3339());
    }
    if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
        return JsonValue::String(v.to_string());
    }
    decode_text(row, idx)
}

fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return JsonValue::String(v);
    }
    // VARBINARY-backed strings (e.g. some procedure result columns)
    if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(idx) {
        return decode_binary_value(&v, true);
    }
    JsonValue::Null
}
