//! Defines the data structures used throughout the crate.
//!
//! `Table` and `Value` are the in-memory form of query results and of the input
//! to the INSERT statement generator.

mod table;

pub use table::*;
