//! In-memory tabular data: named columns and rows of dynamically typed `Value`s.
//!
//! A `Table` is what a SELECT produces and what the INSERT statement generator
//! consumes. Column order is significant and is preserved everywhere.

use crate::error::{AppError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use sqlx::types::{Decimal, Uuid};
use std::fmt;
use std::str::FromStr;

/// Format used for `Timestamp` values in literals and JSON.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Format used for `Time` values in literals and JSON.
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Time(NaiveTime),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    /// True for `Null` and for a floating-point NaN.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Integral view of the value, if it has one without loss.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Numeric(d) if d.fract().is_zero() => d.to_i64(),
            Value::Float(f) if f.fract() == 0.0 => f.to_i64(),
            _ => None,
        }
    }

    /// Builds a value from a JSON cell.
    ///
    /// Scalars map directly. Typed values that JSON cannot express are written as
    /// single-key objects: `{"date": "2020-01-01"}`, `{"timestamp": "..."}`,
    /// `{"timestamptz": "..."}`, `{"time": "12:30:00"}`, `{"uuid": "..."}`,
    /// `{"numeric": "12.50"}`. Any other object or array
    /// becomes `Value::Json`.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        use serde_json::Value as J;

        Ok(match json {
            J::Null => Value::Null,
            J::Bool(b) => Value::Bool(b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::Text(s),
            J::Object(map) if map.len() == 1 => {
                let typed = match map.iter().next() {
                    Some((tag, J::String(raw))) => typed_cell(tag, raw)?,
                    _ => None,
                };
                typed.unwrap_or(Value::Json(J::Object(map)))
            },
            other => Value::Json(other),
        })
    }

    /// Inverse of [`Value::from_json`].
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) if f.is_finite() => json!(f),
            Value::Float(_) => serde_json::Value::Null,
            Value::Numeric(d) => json!({ "numeric": d.to_string() }),
            Value::Text(s) => json!(s),
            Value::Date(d) => json!({ "date": d.format("%Y-%m-%d").to_string() }),
            Value::Timestamp(ts) => json!({ "timestamp": ts.format(TIMESTAMP_FORMAT).to_string() }),
            Value::TimestampTz(ts) => json!({ "timestamptz": ts.to_rfc3339() }),
            Value::Time(t) => json!({ "time": t.format(TIME_FORMAT).to_string() }),
            Value::Uuid(u) => json!({ "uuid": u.to_string() }),
            Value::Json(v) => v.clone(),
        }
    }
}

fn typed_cell(tag: &str, raw: &str) -> Result<Option<Value>> {
    let value = match tag {
        "date" => Value::Date(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| bad_cell(tag, raw, e))?,
        ),
        "timestamp" => Value::Timestamp(
            NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| bad_cell(tag, raw, e))?,
        ),
        "timestamptz" => Value::TimestampTz(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| bad_cell(tag, raw, e))?
                .with_timezone(&Utc),
        ),
        "time" => Value::Time(
            NaiveTime::parse_from_str(raw, TIME_FORMAT).map_err(|e| bad_cell(tag, raw, e))?,
        ),
        "uuid" => Value::Uuid(Uuid::parse_str(raw).map_err(|e| bad_cell(tag, raw, e))?),
        "numeric" => Value::Numeric(Decimal::from_str(raw).map_err(|e| bad_cell(tag, raw, e))?),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn bad_cell(tag: &str, raw: &str, err: impl fmt::Display) -> AppError {
    AppError::Table(format!("invalid {} value '{}': {}", tag, raw, err))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Numeric(d) => write!(f, "{}", d),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Numeric(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Rows of values under an ordered list of column names.
///
/// Every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTable", into = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// A table with the given columns and no rows.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a table, checking every row's width.
    pub fn with_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        table.rows.reserve(rows.len());
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Table` if the row width differs from the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(AppError::Table(format!(
                "row {} has {} values, expected {}",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// The value at `row` in the named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// A new table holding only `columns`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Table` if a name is not a column of this table.
    pub fn project(&self, columns: &[&str]) -> Result<Self> {
        let indexes = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| AppError::Table(format!("unknown column '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }
}

/// Serialized shape of a table: `{"columns": [...], "rows": [[...], ...]}`.
#[derive(Serialize, Deserialize)]
struct RawTable {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

impl TryFrom<RawTable> for Table {
    type Error = AppError;

    fn try_from(raw: RawTable) -> Result<Self> {
        let rows = raw
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(Value::from_json).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;
        Table::with_rows(raw.columns, rows)
    }
}

impl From<Table> for RawTable {
    fn from(table: Table) -> Self {
        RawTable {
            rows: table
                .rows
                .iter()
                .map(|row| row.iter().map(Value::to_json).collect())
                .collect(),
            columns: table.columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn users() -> Table {
        Table::with_rows(
            ["id", "name", "joined"],
            vec![
                vec![
                    Value::Int(1),
                    Value::from("Alice"),
                    Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
                ],
                vec![Value::Int(2), Value::from("Bob"), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_push_row_rejects_wrong_width() {
        let mut table = Table::new(["a", "b"]);
        assert!(table.push_row(vec![Value::Int(1), Value::Int(2)]).is_ok());
        match table.push_row(vec![Value::Int(3)]) {
            Err(AppError::Table(msg)) => assert!(msg.contains("row 2 has 1 values, expected 2")),
            other => panic!("Expected Table error, got {:?}", other),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_new_table_keeps_columns_without_rows() {
        let table = Table::new(["id", "name"]);
        assert!(table.is_empty());
        assert_eq!(table.columns(), ["id", "name"]);
        assert!(Table::empty().columns().is_empty());
    }

    #[test]
    fn test_get_and_column_index() {
        let table = users();
        assert_eq!(table.column_index("joined"), Some(2));
        assert_eq!(table.get(1, "name"), Some(&Value::from("Bob")));
        assert_eq!(table.get(5, "name"), None);
        assert_eq!(table.get(0, "missing"), None);
    }

    #[test]
    fn test_project_reorders_columns() {
        let table = users().project(&["joined", "id"]).unwrap();
        assert_eq!(table.columns(), ["joined", "id"]);
        assert_eq!(table.rows()[1], vec![Value::Null, Value::Int(2)]);
        assert!(users().project(&["nope"]).is_err());
    }

    #[rstest]
    #[case(Value::Null, true)]
    #[case(Value::Float(f64::NAN), true)]
    #[case(Value::Float(0.0), false)]
    #[case(Value::from(""), false)]
    fn test_is_null(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_null(), expected);
    }

    #[rstest]
    #[case(Value::Int(42), Some(42))]
    #[case(Value::Numeric(Decimal::new(4200, 2)), Some(42))]
    #[case(Value::Numeric(Decimal::new(4250, 2)), None)]
    #[case(Value::Float(7.0), Some(7))]
    #[case(Value::from("42"), None)]
    fn test_as_i64(#[case] value: Value, #[case] expected: Option<i64>) {
        assert_eq!(value.as_i64(), expected);
    }

    #[test]
    fn test_from_json_typed_cells() {
        assert_eq!(
            Value::from_json(json!({"date": "2020-01-01"})).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
        );
        assert_eq!(
            Value::from_json(json!({"numeric": "12.50"})).unwrap(),
            Value::Numeric(Decimal::new(1250, 2))
        );
        assert_eq!(Value::from_json(json!(3)).unwrap(), Value::Int(3));
        assert_eq!(Value::from_json(json!(2.5)).unwrap(), Value::Float(2.5));
        assert_eq!(
            Value::from_json(json!({"a": 1, "b": 2})).unwrap(),
            Value::Json(json!({"a": 1, "b": 2}))
        );
        assert_eq!(
            Value::from_json(json!({"time": "12:30:00.5"})).unwrap(),
            Value::Time(NaiveTime::from_hms_milli_opt(12, 30, 0, 500).unwrap())
        );
        assert_eq!(
            Value::from_json(json!({"uuid": "67e55044-10b1-426f-9247-bb680e5fe0c8"})).unwrap(),
            Value::Uuid(Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap())
        );
        assert!(Value::from_json(json!({"date": "yesterday"})).is_err());
        assert!(Value::from_json(json!({"uuid": "not-a-uuid"})).is_err());
    }

    #[test]
    fn test_table_json_shape() {
        let table: Table = serde_json::from_value(json!({
            "columns": ["id", "name", "joined"],
            "rows": [[1, "Alice", {"date": "2020-01-01"}]]
        }))
        .unwrap();
        assert_eq!(table.columns(), ["id", "name", "joined"]);
        assert_eq!(table.get(0, "name"), Some(&Value::from("Alice")));

        let back = serde_json::to_value(&table).unwrap();
        assert_eq!(back["rows"][0][2], json!({"date": "2020-01-01"}));
    }

    #[test]
    fn test_table_json_rejects_ragged_rows() {
        let result: std::result::Result<Table, _> = serde_json::from_value(json!({
            "columns": ["a", "b"],
            "rows": [[1]]
        }));
        assert!(result.is_err());
    }
}
