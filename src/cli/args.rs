//! CLI argument definitions using clap
//!
//! Commands:
//! - durable-cell get --path <path>
//! - durable-cell set --path <path> --value <json>
//! - durable-cell reset --path <path>
//! - durable-cell check --path <path>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// durable-cell - inspect and edit a JSON value stored by a durable cell
#[derive(Parser, Debug)]
#[command(name = "durable-cell")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct CellArgs {
    /// Absolute path of the value file
    #[arg(long)]
    pub path: PathBuf,

    /// Optional JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the stored value
    Get {
        #[command(flatten)]
        cell: CellArgs,
    },

    /// Store a new value
    Set {
        #[command(flatten)]
        cell: CellArgs,

        /// New value as a JSON document
        #[arg(long)]
        value: String,
    },

    /// Store the default value (null), replacing a corrupt file if needed
    Reset {
        #[command(flatten)]
        cell: CellArgs,
    },

    /// Report whether the file is ok, missing or corrupt without changing it
    Check {
        #[command(flatten)]
        cell: CellArgs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let cli = Cli::try_parse_from([
            "durable-cell",
            "set",
            "--path",
            "/tmp/a.json",
            "--value",
            "{\"a\":1}",
        ])
        .unwrap();
        match cli.command {
            Command::Set { cell, value } => {
                assert_eq!(cell.path, PathBuf::from("/tmp/a.json"));
                assert!(cell.config.is_none());
                assert_eq!(value, "{\"a\":1}");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_path_is_required() {
        assert!(Cli::try_parse_from(["durable-cell", "get"]).is_err());
    }
}
