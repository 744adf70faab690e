//! Provides the PostgreSQL `Connector` built on a single `sqlx` connection.
//!
//! Includes establishing the session (autocommit, session time zone), running
//! SELECT / INSERT / UPDATE statements as raw text or with bound parameters, and
//! inserting a whole `Table`. Raw text goes through the simple-query protocol,
//! so one string may hold several `;`-separated statements; bound parameters use
//! the extended protocol, which allows exactly one. Also contains integration tests for database
//! operations (requires the `integration-tests` feature).

use super::convert::{bind_value, bound, decode_cell, decode_row};
use crate::config::ConnectionConfig;
use crate::error::{AppError, Result};
use crate::models::{Table, Value};
use crate::sql::insert_placeholders;
use sqlx::postgres::PgConnection;
use sqlx::{Column, Connection, Executor, Row, Statement};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, error, info, warn};

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Future returned by the body passed to [`Connector::scoped`].
pub type ScopedFuture<'c, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'c>>;

/// Result of [`Connector::run_insert`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The statement ran without a RETURNING fetch.
    Applied { rows_affected: u64 },
    /// First column of the first returned row.
    Returned(Value),
    /// A RETURNING fetch was requested but the statement produced no row.
    NoRow,
}

/// A single PostgreSQL session in autocommit mode.
///
/// Owned by one caller at a time; every execution method takes `&mut self`.
/// Dropping a `Connector` closes the socket without the protocol goodbye; prefer
/// [`Connector::close`] or [`Connector::scoped`].
pub struct Connector {
    conn: PgConnection,
}

impl Connector {
    /// Opens a session and sets its time zone.
    ///
    /// The session stays in autocommit mode: no transaction is ever opened, so
    /// every statement commits on its own.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the connection cannot be established or the
    /// time zone is rejected by the server.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        info!(
            "Connecting to database {} at {}:{}...",
            config.database, config.host, config.port
        );

        let conn = PgConnection::connect_with(&config.connect_options())
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                AppError::from(e)
            })?;

        let connector = Self::from_connection(conn, &config.timezone).await?;
        info!("Connected to database successfully");
        Ok(connector)
    }

    /// Wraps an already open connection, applying the session time zone.
    pub async fn from_connection(conn: PgConnection, timezone: &str) -> Result<Self> {
        let mut connector = Self { conn };
        connector.set_timezone(timezone).await?;
        Ok(connector)
    }

    async fn set_timezone(&mut self, timezone: &str) -> Result<()> {
        sqlx::query("SELECT set_config('TimeZone', $1, false)")
            .bind(timezone)
            .execute(&mut self.conn)
            .await
            .map_err(|e| {
                error!("Failed to set session time zone to {}: {}", timezone, e);
                AppError::from(e)
            })?;
        debug!("Session time zone set to {}", timezone);
        Ok(())
    }

    /// The session's current `TimeZone` setting.
    pub async fn timezone(&mut self) -> Result<String> {
        let row = sqlx::query("SELECT current_setting('TimeZone')")
            .fetch_one(&mut self.conn)
            .await?;
        Ok(row.try_get::<String, _>(0)?)
    }

    /// Opens a connection, runs `body` against it and closes it again.
    ///
    /// The connection is closed whether `body` succeeds or fails; the body's
    /// result is returned unchanged. A failure while closing is logged, not
    /// returned.
    ///
    /// ```ignore
    /// let table = Connector::scoped(&config, |db| {
    ///     Box::pin(async move { db.run_select("SELECT 1 AS one").await })
    /// })
    /// .await?;
    /// ```
    pub async fn scoped<T, F>(config: &ConnectionConfig, body: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Connector) -> ScopedFuture<'c, T>,
    {
        let mut connector = Self::connect(config).await?;
        let outcome = body(&mut connector).await;
        if let Err(e) = connector.close().await {
            warn!("Connection did not close cleanly: {}", e);
        }
        outcome
    }

    /// Gracefully terminates the session.
    pub async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(|e| {
            error!("Failed to close database connection: {}", e);
            AppError::from(e)
        })?;
        info!("Database connection closed");
        Ok(())
    }

    /// Runs a query and collects every row into a `Table`.
    ///
    /// Column names come from the first row, or from the statement description
    /// when no row comes back, so a query matching no rows still yields a table
    /// with the right columns. Text holding several statements that returns no
    /// rows cannot be described and yields a table without columns.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails and `AppError::UnsupportedType`
    /// if a result column cannot be represented as a `Value`.
    pub async fn run_select(&mut self, query: &str) -> Result<Table> {
        self.run_select_with(query, &[]).await
    }

    /// [`run_select`](Self::run_select) with `$n` parameters bound from `params`.
    pub async fn run_select_with(&mut self, query: &str, params: &[Value]) -> Result<Table> {
        debug!("Executing select: {}", query);

        let (columns, rows) = if params.is_empty() {
            let rows = (&mut self.conn).fetch_all(query).await.map_err(|e| {
                error!("Failed to execute select: {}", e);
                AppError::from(e)
            })?;
            let columns = match rows.first() {
                Some(row) => column_names(row.columns()),
                None => self.describe_columns(query).await,
            };
            (columns, rows)
        } else {
            let statement = (&mut self.conn).prepare(query).await.map_err(|e| {
                error!("Failed to prepare select: {}", e);
                AppError::from(e)
            })?;
            let columns = column_names(statement.columns());
            let rows = params
                .iter()
                .fold(statement.query(), bind_value)
                .fetch_all(&mut self.conn)
                .await
                .map_err(|e| {
                    error!("Failed to execute select: {}", e);
                    AppError::from(e)
                })?;
            (columns, rows)
        };

        let mut table = Table::new(columns);
        for row in &rows {
            table.push_row(decode_row(row).map_err(|e| {
                error!("Failed to decode select row: {}", e);
                e
            })?)?;
        }

        info!("Select returned {} rows", table.len());
        Ok(table)
    }

    /// Column names from the statement description; empty if it cannot be
    /// described.
    async fn describe_columns(&mut self, query: &str) -> Vec<String> {
        match (&mut self.conn).prepare(query).await {
            Ok(statement) => column_names(statement.columns()),
            Err(e) => {
                debug!("Could not describe columns of {}: {}", query, e);
                Vec::new()
            },
        }
    }

    /// Runs an INSERT.
    ///
    /// With `returning`, the first column of the first returned row is fetched
    /// (typically a generated id from `RETURNING id`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn run_insert(&mut self, query: &str, returning: bool) -> Result<InsertOutcome> {
        self.run_insert_with(query, &[], returning).await
    }

    /// [`run_insert`](Self::run_insert) with `$n` parameters bound from `params`.
    pub async fn run_insert_with(
        &mut self,
        query: &str,
        params: &[Value],
        returning: bool,
    ) -> Result<InsertOutcome> {
        debug!("Executing insert: {}", query);

        if !returning {
            let rows_affected = self.run_statement(query, params, "insert").await?;
            return Ok(InsertOutcome::Applied { rows_affected });
        }

        let row = if params.is_empty() {
            (&mut self.conn).fetch_optional(query).await
        } else {
            bound(query, params).fetch_optional(&mut self.conn).await
        };
        let row = row.map_err(|e| {
            error!("Failed to execute insert: {}", e);
            AppError::from(e)
        })?;

        match row {
            Some(row) if !row.columns().is_empty() => {
                let value = decode_cell(&row, 0)?;
                info!("Insert returned {}", value);
                Ok(InsertOutcome::Returned(value))
            },
            _ => {
                info!("Insert returned no row");
                Ok(InsertOutcome::NoRow)
            },
        }
    }

    /// Runs an UPDATE (or any statement without a result set) and returns the
    /// number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the statement fails.
    pub async fn run_update(&mut self, query: &str) -> Result<u64> {
        self.run_update_with(query, &[]).await
    }

    /// [`run_update`](Self::run_update) with `$n` parameters bound from `params`.
    pub async fn run_update_with(&mut self, query: &str, params: &[Value]) -> Result<u64> {
        debug!("Executing update: {}", query);
        self.run_statement(query, params, "update").await
    }

    /// Runs `query` for its rows-affected count. Without parameters the text may
    /// hold several statements, whose counts are summed.
    async fn run_statement(&mut self, query: &str, params: &[Value], kind: &str) -> Result<u64> {
        let result = if params.is_empty() {
            (&mut self.conn).execute(query).await
        } else {
            bound(query, params).execute(&mut self.conn).await
        };
        let result = result.map_err(|e| {
            error!("Failed to execute {}: {}", kind, e);
            AppError::from(e)
        })?;
        info!("{} affected {} rows", kind, result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Inserts every row of `table` into `target` with bound parameters.
    ///
    /// Rows are sent in as few statements as the bind-parameter limit allows.
    /// Each statement commits on its own, so a failure part-way leaves the
    /// earlier chunks in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Table` for a table with no columns or rows and
    /// `AppError::Db` if a statement fails.
    pub async fn insert_table(&mut self, target: &str, table: &Table) -> Result<u64> {
        if table.column_count() == 0 || table.is_empty() {
            return Err(AppError::Table(format!("nothing to insert into {}", target)));
        }
        info!(
            "Inserting {} rows into {} with bound parameters",
            table.len(),
            target
        );

        let mut total = 0;
        for chunk in table.rows().chunks(rows_per_statement(table.column_count())) {
            let part = Table::with_rows(table.columns().iter().cloned(), chunk.to_vec())?;
            let (sql, params) = insert_placeholders(&part, target)?;
            total += self.run_statement(&sql, &params, "insert").await?;
        }
        Ok(total)
    }

    // --- Sentinel-compatible helpers ---
    // These keep the "empty / zero / false on failure" contract for callers that
    // rely on it. They log the swallowed error at warn level.

    /// [`run_select`](Self::run_select), returning `Table::empty()` on failure.
    ///
    /// A failed query and a query matching no rows are only distinguishable
    /// here by the missing column list.
    pub async fn select_or_empty(&mut self, query: &str) -> Table {
        match self.run_select(query).await {
            Ok(table) => table,
            Err(e) => {
                warn!("Select failed, returning empty table: {}", e);
                Table::empty()
            },
        }
    }

    /// [`run_insert`](Self::run_insert) with `returning`, returning the integral
    /// first column, or `0` on failure, on no row, or on a non-integral value.
    pub async fn insert_or_zero(&mut self, query: &str) -> i64 {
        match self.run_insert(query, true).await {
            Ok(InsertOutcome::Returned(value)) => value.as_i64().unwrap_or(0),
            Ok(_) => 0,
            Err(e) => {
                warn!("Insert failed, returning 0: {}", e);
                0
            },
        }
    }

    /// [`run_insert`](Self::run_insert) without `returning`; `true` iff no error.
    pub async fn insert_succeeded(&mut self, query: &str) -> bool {
        match self.run_insert(query, false).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Insert failed: {}", e);
                false
            },
        }
    }

    /// [`run_update`](Self::run_update); `true` iff no error.
    pub async fn update_succeeded(&mut self, query: &str) -> bool {
        match self.run_update(query).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Update failed: {}", e);
                false
            },
        }
    }
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

/// Largest row count whose parameters fit in one statement.
fn rows_per_statement(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).max(1)
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rows_per_statement(1), MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(3), 21_845);
        assert_eq!(rows_per_statement(0), MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(MAX_BIND_PARAMS + 1), 1);
    }
}
