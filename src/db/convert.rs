//! Conversions between PostgreSQL wire values and `Value`.
//!
//! Decoding dispatches on the column's PostgreSQL type name; binding maps each
//! `Value` variant onto the matching `sqlx` encoder. Types without a dedicated
//! variant (arrays, intervals, ranges, user enums, ...) decode as their text form
//! when the row arrived in text format, which is the case for every statement run
//! without parameters.

use crate::error::{AppError, Result};
use crate::models::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::encode::IsNull;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgRow, PgTypeInfo, PgValueFormat, PgValueRef,
};
use sqlx::query::Query;
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Encode, Postgres, Row, Type, TypeInfo, ValueRef};

/// Decodes every cell of a row, in column order.
pub(crate) fn decode_row(row: &PgRow) -> Result<Vec<Value>> {
    (0..row.columns().len())
        .map(|idx| decode_cell(row, idx))
        .collect()
}

/// Decodes the cell at `idx`.
///
/// # Errors
///
/// Returns `AppError::UnsupportedType` for a binary-format column whose type has
/// no `Value` mapping and `AppError::Db` if `sqlx` fails to decode the bytes.
pub(crate) fn decode_cell(row: &PgRow, idx: usize) -> Result<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let column = &row.columns()[idx];
    let value = match column.type_info().name() {
        "BOOL" => Value::Bool(row.try_get(idx)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(idx)?.into()),
        "INT4" => Value::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT8" => Value::Int(row.try_get(idx)?),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(idx)?.into()),
        "FLOAT8" => Value::Float(row.try_get(idx)?),
        // NaN and the infinities have no Decimal form.
        "NUMERIC" => match numeric_special(&raw) {
            Some(f) => Value::Float(f),
            None => Value::Numeric(row.try_get::<Decimal, _>(idx)?),
        },
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => Value::Text(row.try_get(idx)?),
        "DATE" => Value::Date(row.try_get::<NaiveDate, _>(idx)?),
        "TIMESTAMP" => Value::Timestamp(row.try_get::<NaiveDateTime, _>(idx)?),
        "TIMESTAMPTZ" => Value::TimestampTz(row.try_get::<DateTime<Utc>, _>(idx)?),
        "TIME" => Value::Time(row.try_get::<NaiveTime, _>(idx)?),
        "UUID" => Value::Uuid(row.try_get::<Uuid, _>(idx)?),
        "JSON" | "JSONB" => Value::Json(row.try_get::<serde_json::Value, _>(idx)?),
        other => match raw.format() {
            PgValueFormat::Text => {
                Value::Text(raw.as_str().map_err(sqlx::Error::Decode)?.to_string())
            },
            PgValueFormat::Binary => {
                return Err(AppError::UnsupportedType {
                    column: column.name().to_string(),
                    type_name: other.to_string(),
                })
            },
        },
    };
    Ok(value)
}

/// `NaN`, `Infinity` or `-Infinity` stored in a NUMERIC cell, as a float.
fn numeric_special(raw: &PgValueRef<'_>) -> Option<f64> {
    match raw.format() {
        PgValueFormat::Binary => raw.as_bytes().ok().and_then(numeric_special_binary),
        PgValueFormat::Text => raw.as_str().ok().and_then(numeric_special_text),
    }
}

/// Binary NUMERIC header: ndigits, weight, sign, dscale (each two bytes). The
/// sign word carries the special values.
fn numeric_special_binary(bytes: &[u8]) -> Option<f64> {
    let sign = u16::from_be_bytes([*bytes.get(4)?, *bytes.get(5)?]);
    match sign {
        0xC000 => Some(f64::NAN),
        0xD000 => Some(f64::INFINITY),
        0xF000 => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn numeric_special_text(text: &str) -> Option<f64> {
    match text {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// A NULL parameter declared with PostgreSQL's `unknown` type, so the server
/// infers the real type from context instead of rejecting a mismatch.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("unknown")
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> IsNull {
        IsNull::Yes
    }
}

/// Binds one value as the next positional parameter.
pub(crate) fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(UntypedNull),
        Value::Float(f) if f.is_nan() => query.bind(UntypedNull),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Numeric(d) => query.bind(*d),
        Value::Text(s) => query.bind(s.clone()),
        Value::Date(d) => query.bind(*d),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::TimestampTz(ts) => query.bind(*ts),
        Value::Time(t) => query.bind(*t),
        Value::Uuid(u) => query.bind(*u),
        Value::Json(v) => query.bind(v.clone()),
    }
}

/// Builds a query over `sql` with every value in `params` bound in order.
pub(crate) fn bound<'q>(sql: &'q str, params: &[Value]) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(sqlx::query(sql), bind_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn numeric_header(sign: u16) -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 0];
        bytes.extend_from_slice(&sign.to_be_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    #[test]
    fn test_numeric_special_binary() {
        assert!(numeric_special_binary(&numeric_header(0xC000)).unwrap().is_nan());
        assert_eq!(numeric_special_binary(&numeric_header(0xD000)), Some(f64::INFINITY));
        assert_eq!(numeric_special_binary(&numeric_header(0xF000)), Some(f64::NEG_INFINITY));
        assert_eq!(numeric_special_binary(&numeric_header(0x4000)), None);
        assert_eq!(numeric_special_binary(&numeric_header(0x0000)), None);
        assert_eq!(numeric_special_binary(&[0, 0, 0]), None);
    }

    #[rstest]
    #[case("Infinity", Some(f64::INFINITY))]
    #[case("-Infinity", Some(f64::NEG_INFINITY))]
    #[case("12.50", None)]
    #[case("nan", None)]
    fn test_numeric_special_text(#[case] text: &str, #[case] expected: Option<f64>) {
        assert_eq!(numeric_special_text(text), expected);
    }

    #[test]
    fn test_numeric_special_text_nan() {
        assert!(numeric_special_text("NaN").unwrap().is_nan());
    }
}
