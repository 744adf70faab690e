//! Builds INSERT statements from a `Table`.
//!
//! Two flavours are provided:
//! - [`insert_statement`] renders every value as an SQL literal, producing one
//!   self-contained statement string.
//! - [`insert_placeholders`] renders `$n` placeholders and returns the values to
//!   bind, which is what [`crate::db::Connector::insert_table`] executes.
//!
//! In both, column order follows the table and tuple order follows row order.
//! Table and column names are emitted as given.

use crate::error::{AppError, Result};
use crate::models::{Table, Value, TIMESTAMP_FORMAT, TIME_FORMAT};
use rayon::prelude::*;
use tracing::debug;

/// Renders one value as an SQL literal.
///
/// Text, dates, times, timestamps, UUIDs and JSON are single-quoted with embedded
/// quotes doubled. `Null` and NaN become `NULL`. Infinite floats become the quoted
/// PostgreSQL spellings `'Infinity'` and `'-Infinity'`. Everything else uses its
/// `Display` form.
pub fn sql_literal(value: &Value) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    match value {
        Value::Float(f) if f.is_infinite() => {
            let spelled = if f.is_sign_positive() { "Infinity" } else { "-Infinity" };
            quote(spelled)
        },
        Value::Text(s) => quote(s),
        Value::Date(d) => quote(&d.format("%Y-%m-%d").to_string()),
        Value::Timestamp(ts) => quote(&ts.format(TIMESTAMP_FORMAT).to_string()),
        Value::TimestampTz(ts) => quote(&ts.to_rfc3339()),
        Value::Time(t) => quote(&t.format(TIME_FORMAT).to_string()),
        Value::Uuid(u) => quote(&u.to_string()),
        Value::Json(v) => quote(&v.to_string()),
        other => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn check_shape(table: &Table) -> Result<()> {
    if table.column_count() == 0 {
        return Err(AppError::Table("table has no columns".to_string()));
    }
    if table.is_empty() {
        return Err(AppError::Table("table has no rows".to_string()));
    }
    Ok(())
}

fn header(table: &Table, target: &str) -> String {
    format!("INSERT INTO {} ({}) VALUES ", target, table.columns().join(","))
}

/// Generates one INSERT statement with a VALUES tuple per row.
///
/// ```text
/// INSERT INTO users (id,name,joined) VALUES (1, 'Alice', '2020-01-01'), (2, 'Bob', NULL)
/// ```
///
/// # Errors
///
/// Returns `AppError::Table` if the table has no columns or no rows.
pub fn insert_statement(table: &Table, target: &str) -> Result<String> {
    check_shape(table)?;

    // Rows are rendered in parallel; collect() keeps input order.
    let tuples: Vec<String> = table
        .rows()
        .par_iter()
        .map(|row| {
            let values: Vec<String> = row.iter().map(sql_literal).collect();
            format!("({})", values.join(", "))
        })
        .collect();

    debug!(
        "Generated INSERT for {} rows into {}",
        tuples.len(),
        target
    );
    Ok(header(table, target) + &tuples.join(", "))
}

/// Generates an INSERT statement with `$n` placeholders and the values to bind,
/// flattened row by row.
///
/// # Errors
///
/// Returns `AppError::Table` if the table has no columns or no rows.
pub fn insert_placeholders(table: &Table, target: &str) -> Result<(String, Vec<Value>)> {
    check_shape(table)?;

    let width = table.column_count();
    let tuples: Vec<String> = (0..table.len())
        .map(|r| {
            let slots: Vec<String> = (1..=width).map(|c| format!("${}", r * width + c)).collect();
            format!("({})", slots.join(", "))
        })
        .collect();
    let params: Vec<Value> = table.rows().iter().flatten().cloned().collect();

    Ok((header(table, target) + &tuples.join(", "), params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use rand::seq::SliceRandom;
    use rstest::rstest;
    use serde_json::json;
    use sqlx::types::{Decimal, Uuid};

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn users() -> Table {
        Table::with_rows(
            ["id", "name", "joined"],
            vec![vec![Value::Int(1), Value::from("Alice"), date(2020, 1, 1)]],
        )
        .unwrap()
    }

    #[test]
    fn test_insert_statement_single_row() {
        let sql = insert_statement(&users(), "users").unwrap();
        assert_eq!(
            sql,
            "INSERT INTO users (id,name,joined) VALUES (1, 'Alice', '2020-01-01')"
        );
    }

    #[test]
    fn test_insert_statement_keeps_row_order() {
        let table = Table::with_rows(
            ["id", "name"],
            vec![
                vec![Value::Int(3), Value::from("c")],
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::from("b")],
            ],
        )
        .unwrap();
        assert_eq!(
            insert_statement(&table, "t").unwrap(),
            "INSERT INTO t (id,name) VALUES (3, 'c'), (1, 'a'), (2, 'b')"
        );
    }

    #[rstest]
    #[case(Value::Null, "NULL")]
    #[case(Value::Float(f64::NAN), "NULL")]
    #[case(Value::Float(2.5), "2.5")]
    #[case(Value::Float(f64::INFINITY), "'Infinity'")]
    #[case(Value::Float(f64::NEG_INFINITY), "'-Infinity'")]
    #[case(Value::Int(-7), "-7")]
    #[case(Value::Bool(true), "true")]
    #[case(Value::Numeric(Decimal::new(1250, 2)), "12.50")]
    #[case(Value::from("O'Brien"), "'O''Brien'")]
    #[case(Value::from(""), "''")]
    #[case(date(1999, 12, 31), "'1999-12-31'")]
    #[case(
        Value::Timestamp(NaiveDate::from_ymd_opt(2021, 3, 4).unwrap().and_hms_opt(5, 6, 7).unwrap()),
        "'2021-03-04T05:06:07'"
    )]
    #[case(
        Value::TimestampTz(Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap()),
        "'2021-03-04T05:06:07+00:00'"
    )]
    #[case(
        Value::Time(NaiveTime::from_hms_opt(9, 5, 0).unwrap()),
        "'09:05:00'"
    )]
    #[case(
        Value::Uuid(Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap()),
        "'67e55044-10b1-426f-9247-bb680e5fe0c8'"
    )]
    #[case(Value::Json(json!({"k": "it's"})), r#"'{"k":"it''s"}'"#)]
    fn test_sql_literal(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(sql_literal(&value), expected);
    }

    #[test]
    fn test_null_and_nan_never_quoted() {
        let table = Table::with_rows(
            ["a", "b", "c"],
            vec![vec![Value::Null, Value::Float(f64::NAN), Value::from("x")]],
        )
        .unwrap();
        let sql = insert_statement(&table, "t").unwrap();
        assert!(sql.ends_with("VALUES (NULL, NULL, 'x')"));
        assert!(!sql.contains("''"));
    }

    #[test]
    fn test_column_order_follows_any_permutation() {
        let base = Table::with_rows(
            ["id", "name", "joined", "score"],
            vec![
                vec![Value::Int(1), Value::from("Alice"), date(2020, 1, 1), Value::Float(9.5)],
                vec![Value::Int(2), Value::from("Bob"), Value::Null, Value::Float(7.0)],
            ],
        )
        .unwrap();

        let mut rng = rand::thread_rng();
        let mut order: Vec<&str> = vec!["id", "name", "joined", "score"];
        for _ in 0..20 {
            order.shuffle(&mut rng);
            let table = base.project(&order).unwrap();
            let sql = insert_statement(&table, "people").unwrap();

            let expected_header = format!("INSERT INTO people ({}) VALUES ", order.join(","));
            assert!(sql.starts_with(&expected_header), "{}", sql);

            let first_row: Vec<String> = order
                .iter()
                .map(|c| sql_literal(base.get(0, c).unwrap()))
                .collect();
            assert!(sql.contains(&format!("({})", first_row.join(", "))), "{}", sql);
        }
    }

    #[test]
    fn test_insert_statement_rejects_empty_tables() {
        assert!(matches!(
            insert_statement(&Table::new(["id"]), "t"),
            Err(AppError::Table(_))
        ));
        assert!(matches!(
            insert_statement(&Table::empty(), "t"),
            Err(AppError::Table(_))
        ));
    }

    #[test]
    fn test_insert_placeholders() {
        let table = Table::with_rows(
            ["id", "name"],
            vec![
                vec![Value::Int(1), Value::from("a")],
                vec![Value::Int(2), Value::Null],
            ],
        )
        .unwrap();
        let (sql, params) = insert_placeholders(&table, "t").unwrap();
        assert_eq!(sql, "INSERT INTO t (id,name) VALUES ($1, $2), ($3, $4)");
        assert_eq!(
            params,
            vec![Value::Int(1), Value::from("a"), Value::Int(2), Value::Null]
        );
    }
}
