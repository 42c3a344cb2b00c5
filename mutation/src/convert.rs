//! Conversion of JSON values into SQL literals for a column.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use duality_core::{SqlString, SqlValue};
use duality_schema::{Column, ColumnType, Table};
use serde_json::Value;

use crate::error::{MutationError, MutationResult};

/// Name of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Convert a document value into the literal stored in `column`.
pub fn to_sql_value(table: &Table, column: &Column, value: &Value) -> MutationResult<SqlValue> {
    let mismatch = |expected: &str| {
        MutationError::invalid_type(
            table.full_name(),
            &column.name,
            expected,
            json_type_name(value),
        )
    };

    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    match column.column_type {
        ColumnType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Int)
                .or_else(|| n.as_u64().map(SqlValue::UInt))
                .ok_or_else(|| mismatch("integer")),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(SqlValue::Int)
                .or_else(|_| s.trim().parse::<u64>().map(SqlValue::UInt))
                .map_err(|_| mismatch("integer")),
            _ => Err(mismatch("integer")),
        },
        ColumnType::Double => match value {
            Value::Number(n) => n.as_f64().map(SqlValue::Double).ok_or_else(|| mismatch("number")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(SqlValue::Double)
                .map_err(|_| mismatch("number")),
            _ => Err(mismatch("number")),
        },
        ColumnType::Boolean => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            _ => Err(mismatch("boolean")),
        },
        ColumnType::String => match value {
            Value::String(s) => Ok(SqlValue::String(s.clone())),
            _ => Err(mismatch("string")),
        },
        ColumnType::Binary => match value {
            Value::String(s) => BASE64
                .decode(s)
                .map(SqlValue::Binary)
                .map_err(|_| mismatch("base64 string")),
            _ => Err(mismatch("base64 string")),
        },
        ColumnType::Geometry => match value {
            Value::Object(_) => Ok(SqlValue::Expr(
                SqlString::new("ST_GeomFromGeoJSON(?, 1, ?)")
                    .value(value.to_string())
                    .value(column.srid as i64)
                    .into_string(),
            )),
            Value::String(wkt) => Ok(SqlValue::Expr(
                SqlString::new("ST_GeomFromText(?, ?)")
                    .value(wkt.as_str())
                    .value(column.srid as i64)
                    .into_string(),
            )),
            _ => Err(mismatch("GeoJSON object")),
        },
        ColumnType::Json => Ok(SqlValue::Expr(
            SqlString::new("CAST(? AS JSON)")
                .value(value.to_string())
                .into_string(),
        )),
        ColumnType::Unknown => match value {
            Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            Value::Number(n) => Ok(n
                .as_i64()
                .map(SqlValue::Int)
                .or_else(|| n.as_u64().map(SqlValue::UInt))
                .unwrap_or_else(|| SqlValue::Double(n.as_f64().unwrap_or_default()))),
            Value::String(s) => Ok(SqlValue::String(s.clone())),
            other => Ok(SqlValue::String(other.to_string())),
        },
    }
}

/// Values compare equal when they render the same, so `"7"` from a path
/// matches `7` from a document.
pub fn same_value(a: &SqlValue, b: &SqlValue) -> bool {
    a == b || a.to_plain() == b.to_plain()
}
