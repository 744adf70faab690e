//! SQL text generation from tables.

mod statement;

pub use statement::*;
