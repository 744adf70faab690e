//! A thin PostgreSQL convenience wrapper.
//!
//! Open one autocommit session with [`db::Connector`], run SELECT / INSERT /
//! UPDATE statements, collect results into a [`models::Table`], and turn a table
//! back into an INSERT statement with [`sql::insert_statement`].

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sql;

pub use config::ConnectionConfig;
pub use db::{Connector, InsertOutcome};
pub use error::{AppError, Result};
pub use models::{Table, Value};
