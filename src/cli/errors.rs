//! CLI-specific error types

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::engine::CellError;
use crate::storage::StorageError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, runtime)
    IoError,
    /// `--value` is not valid JSON
    InvalidValue,
    /// The cell refused the operation
    CellFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "CELL_CLI_CONFIG_ERROR",
            Self::IoError => "CELL_CLI_IO_ERROR",
            Self::InvalidValue => "CELL_CLI_INVALID_VALUE",
            Self::CellFailed => "CELL_CLI_CELL_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidValue, msg)
    }

    pub fn cell_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::CellFailed, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<CellError> for CliError {
    fn from(e: CellError) -> Self {
        match e.cause() {
            Some(cause) => Self::cell_failed(format!("{} ({})", e, cause)),
            None => Self::cell_failed(e.to_string()),
        }
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        Self::cell_failed(e.to_string())
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
