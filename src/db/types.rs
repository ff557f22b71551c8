//! Database-agnostic type mappings.
//!
//! Result values are returned as `serde_json::Value` so a row is an ordered
//! sequence of dynamically typed values regardless of the backend.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction

use crate::models::{ColumnMetadata, DatabaseType};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};
use tracing::debug;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
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

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Names that would otherwise match the "int" check below
    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Boolean
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // Date/Time
    if lower.starts_with("timestamp")
        || lower == "datetime"
        || lower == "date"
        || lower == "time"
        || lower == "timetz"
    {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower == "text" || lower == "name" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
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

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawDecimal(pg_numeric_to_string(value.as_bytes()?)?)),
        }
    }
}

/// Render a PostgreSQL binary NUMERIC value as its decimal text.
///
/// Layout: ndigits, weight, sign, dscale (all i16), then `ndigits` base-10000 digits.
fn pg_numeric_to_string(bytes: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    let read_i16 = |pos: usize| -> Result<i16, sqlx::error::BoxDynError> {
        bytes
            .get(pos..pos + 2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = read_i16(0)?.max(0) as usize;
    let weight = read_i16(2)? as i32;
    let sign = read_i16(4)? as u16;
    let dscale = read_i16(6)?.max(0) as usize;

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| read_i16(8 + i * 2))
        .collect::<Result<Vec<_>, _>>()?;

    let mut int_part = String::new();
    for pos in 0..=weight.max(-1) {
        let d = digits.get(pos as usize).copied().unwrap_or(0);
        if int_part.is_empty() {
            int_part.push_str(&d.to_string());
        } else {
            int_part.push_str(&format!("{:04}", d));
        }
    }
    if int_part.is_empty() {
        int_part.push('0');
    }

    let mut frac_part = String::new();
    let mut pos = weight + 1;
    while frac_part.len() < dscale {
        let d = if pos < 0 {
            0
        } else {
            digits.get(pos as usize).copied().unwrap_or(0)
        };
        frac_part.push_str(&format!("{:04}", d));
        pos += 1;
    }
    frac_part.truncate(dscale);

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    out.push_str(&int_part);
    if dscale > 0 {
        out.push('.');
        out.push_str(&frac_part);
    }
    Ok(out)
}

// =============================================================================
// Value Conversion
// =============================================================================

/// Encode binary column data as a base64 string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

fn number<T: Into<serde_json::Number>>(v: T) -> JsonValue {
    JsonValue::Number(v.into())
}

/// NaN and infinities have no JSON number form.
fn float<T: Into<f64>>(v: T) -> JsonValue {
    let v = v.into();
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn display<T: ToString>(v: T) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn rfc3339(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

/// Decode column `idx` as `T`. `None` when the column type does not fit `T`.
fn try_decode<'r, R, T>(row: &'r R, idx: usize, map: impl FnOnce(T) -> JsonValue) -> Option<JsonValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Some(map(v)),
        Ok(None) => Some(JsonValue::Null),
        Err(_) => None,
    }
}

/// Try each type in order and keep the first that decodes.
macro_rules! decode_first {
    ($row:expr, $idx:expr, $map:expr; $($ty:ty),+ $(,)?) => {
        None$(.or_else(|| try_decode::<_, $ty>($row, $idx, $map)))+
    };
}

// =============================================================================
// Row Decoding Trait
// =============================================================================

/// Trait for converting backend rows into ordered dynamic values.
pub trait RowToValues {
    fn to_values(&self) -> Vec<JsonValue>;
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
}

macro_rules! impl_row_to_values {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowToValues for $row {
            fn to_values(&self) -> Vec<JsonValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        $decoder(self, idx, category).unwrap_or_else(|| {
                            debug!(
                                column = col.name(),
                                type_name = col.type_info().name(),
                                "Column value could not be decoded"
                            );
                            JsonValue::Null
                        })
                    })
                    .collect()
            }

            fn column_metadata(&self) -> Vec<ColumnMetadata> {
                self.columns()
                    .iter()
                    .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
                    .collect()
            }
        }
    };
}

impl_row_to_values!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_to_values!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_to_values!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

// =============================================================================
// Database-Specific Decoders
// =============================================================================
//
// Each decoder returns `None` only when no representation fits; anything
// without a dedicated mapping falls back to text.

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        let value = match category {
            TypeCategory::Decimal => {
                try_decode::<_, RawDecimal>(row, idx, |d| JsonValue::String(d.0))
            }
            // TINYINT UNSIGNED and friends only decode into their exact width
            TypeCategory::Integer => {
                decode_first!(row, idx, number; i8, i16, i32, i64, u8, u16, u32, u64)
            }
            TypeCategory::Boolean => try_decode::<_, bool>(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_first!(row, idx, float; f64, f32),
            TypeCategory::Binary => {
                try_decode::<_, Vec<u8>>(row, idx, |v| encode_binary_value(&v))
            }
            TypeCategory::Json => try_decode::<_, JsonValue>(row, idx, |v| v),
            TypeCategory::Temporal => try_decode::<_, DateTime<Utc>>(row, idx, rfc3339)
                .or_else(|| decode_first!(row, idx, display; NaiveDateTime, NaiveDate, NaiveTime)),
            _ => None,
        };
        value.or_else(|| try_decode::<_, String>(row, idx, JsonValue::String))
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        let value = match category {
            TypeCategory::Decimal => {
                try_decode::<_, RawDecimal>(row, idx, |d| JsonValue::String(d.0))
            }
            TypeCategory::Integer => decode_first!(row, idx, number; i16, i32, i64),
            TypeCategory::Boolean => try_decode::<_, bool>(row, idx, JsonValue::Bool),
            TypeCategory::Float => decode_first!(row, idx, float; f64, f32),
            TypeCategory::Binary => {
                try_decode::<_, Vec<u8>>(row, idx, |v| encode_binary_value(&v))
            }
            TypeCategory::Json => try_decode::<_, JsonValue>(row, idx, |v| v),
            TypeCategory::Temporal => try_decode::<_, DateTime<Utc>>(row, idx, rfc3339)
                .or_else(|| decode_first!(row, idx, display; NaiveDateTime, NaiveDate, NaiveTime)),
            _ => None,
        };
        value.or_else(|| try_decode::<_, String>(row, idx, JsonValue::String))
    }
}

mod sqlite {
    use super::*;

    /// Dispatch on the value's storage class; expression columns such as
    /// `SELECT ?` or `count(*)` have no declared type at all.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Option<JsonValue> {
        let storage = match row.try_get_raw(idx) {
            Ok(value) if value.is_null() => return Some(JsonValue::Null),
            Ok(value) => value.type_info().name().to_ascii_uppercase(),
            Err(_) => return None,
        };
        let value = match (category, storage.as_str()) {
            (TypeCategory::Boolean, "INTEGER") => try_decode::<_, bool>(row, idx, JsonValue::Bool),
            (_, "INTEGER") => try_decode::<_, i64>(row, idx, number),
            (_, "REAL") => try_decode::<_, f64>(row, idx, float),
            (_, "BLOB") => try_decode::<_, Vec<u8>>(row, idx, |v| encode_binary_value(&v)),
            _ => None,
        };
        // DATETIME and friends are stored as text
        value.or_else(|| {
            row.try_get_unchecked::<Option<String>, _>(idx)
                .ok()
                .map(|v| v.map(JsonValue::String).unwrap_or(JsonValue::Null))
        })
    }
}
