//! Provides database interaction functionalities.
//!
//! `postgres` holds the `Connector`; `convert` maps between PostgreSQL values
//! and `Value`.

mod convert;
mod postgres;

pub use postgres::*;
