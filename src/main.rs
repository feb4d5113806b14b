//! durable-cell CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`. Errors go to
//! stderr with a non-zero exit code.

use durable_cell::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
