//! Handles Command Line Interface (CLI) related functionalities.
//!
//! Includes defining commands, resolving connection settings from flags and the
//! environment, running commands against a lazily opened connection, and the
//! interactive menu.

mod commands;
mod prompts;

pub use commands::*;
pub use prompts::*;
