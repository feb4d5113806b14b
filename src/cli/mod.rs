//! CLI module for durable-cell
//!
//! Provides a command-line interface over a JSON value file:
//! - get: print the stored value
//! - set: commit a new value
//! - reset: commit null, replacing a corrupt file
//! - check: classify the file without modifying it

mod args;
mod commands;
mod errors;
mod io;

pub use args::{CellArgs, Cli, Command};
pub use commands::{check, get, reset, run, run_command, set};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_json;
