//! Cell error types
//!
//! Error codes:
//! - CELL_IO_FAILURE (ERROR severity)
//! - CELL_DATA_CORRUPTION (ERROR severity)
//! - CELL_TRANSFORM_FAILED (ERROR severity, local to one update)
//! - CELL_CONFIG_INVALID (ERROR severity)
//! - CELL_COLLABORATOR_FAILED (ERROR severity)
//! - CELL_TERMINAL (FATAL severity)
//! - CELL_CANCELLED (ERROR severity)
//! - CELL_CLOSED (ERROR severity)
//! - CELL_INTERNAL (ERROR severity)
//!
//! `CellError` is `Clone`: once a cell is final the same terminal error is
//! handed to every caller and subscriber.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::codec::{BoxError, CodecError};
use crate::config::ConfigError;
use crate::observability::Severity;
use crate::storage::StorageError;

type SharedSource = Arc<dyn Error + Send + Sync + 'static>;

/// Cell error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellErrorCode {
    /// Reading, writing or renaming the value file failed
    IoFailure,
    /// Stored bytes could not be decoded and no handler was configured
    DataCorruption,
    /// An update's transform returned an error
    TransformFailed,
    /// The cell was set up incorrectly (bad path, path in use, bad config)
    ConfigInvalid,
    /// A corruption handler or migration returned an error
    CollaboratorFailed,
    /// The cell is final; see `cause()`
    Terminal,
    /// The update was abandoned before it ran
    Cancelled,
    /// The cell was closed
    Closed,
    /// The worker failed unexpectedly
    Internal,
}

impl CellErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            CellErrorCode::IoFailure => "CELL_IO_FAILURE",
            CellErrorCode::DataCorruption => "CELL_DATA_CORRUPTION",
            CellErrorCode::TransformFailed => "CELL_TRANSFORM_FAILED",
            CellErrorCode::ConfigInvalid => "CELL_CONFIG_INVALID",
            CellErrorCode::CollaboratorFailed => "CELL_COLLABORATOR_FAILED",
            CellErrorCode::Terminal => "CELL_TERMINAL",
            CellErrorCode::Cancelled => "CELL_CANCELLED",
            CellErrorCode::Closed => "CELL_CLOSED",
            CellErrorCode::Internal => "CELL_INTERNAL",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            CellErrorCode::Terminal => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for CellErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Cell error with code, message, optional details and source
#[derive(Debug, Clone)]
pub struct CellError {
    code: CellErrorCode,
    message: String,
    details: Option<String>,
    cause: Option<Box<CellError>>,
    source: Option<SharedSource>,
}

impl CellError {
    fn new(code: CellErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            cause: None,
            source: None,
        }
    }

    fn with_source(mut self, source: SharedSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Stored bytes are corrupt and nothing could replace them
    pub fn data_corruption(error: CodecError) -> Self {
        Self::new(
            CellErrorCode::DataCorruption,
            "Stored value is corrupt and no corruption handler is configured",
        )
        .with_source(Arc::new(error))
    }

    /// The codec failed for a reason other than corruption
    pub fn codec_failed(error: CodecError) -> Self {
        Self::new(CellErrorCode::IoFailure, format!("Codec failed: {}", error))
            .with_source(Arc::new(error))
    }

    /// A transform returned an error
    pub fn transform_failed(error: BoxError) -> Self {
        Self::new(
            CellErrorCode::TransformFailed,
            format!("Transform failed: {}", error),
        )
        .with_source(Arc::from(error))
    }

    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(CellErrorCode::ConfigInvalid, message)
    }

    /// A user-supplied collaborator failed
    pub fn collaborator_failed(collaborator: impl Into<String>, error: BoxError) -> Self {
        let collaborator = collaborator.into();
        Self::new(
            CellErrorCode::CollaboratorFailed,
            format!("{} failed: {}", collaborator, error),
        )
        .with_source(Arc::from(error))
        .with_details(format!("collaborator: {}", collaborator))
    }

    /// Wrap the error that made the cell final
    pub fn terminal(cause: CellError) -> Self {
        Self {
            code: CellErrorCode::Terminal,
            message: format!("Cell is final: {}", cause.message),
            details: None,
            cause: Some(Box::new(cause)),
            source: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(
            CellErrorCode::Cancelled,
            "Update was cancelled before it ran",
        )
    }

    pub fn closed() -> Self {
        Self::new(CellErrorCode::Closed, "Cell is closed")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(CellErrorCode::Internal, message)
    }

    /// Add details to an error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> CellErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// For a terminal error, the error that caused the transition
    pub fn cause(&self) -> Option<&CellError> {
        self.cause.as_deref()
    }

    /// Whether this error means the cell is permanently unusable
    pub fn is_terminal(&self) -> bool {
        self.code == CellErrorCode::Terminal
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Find a source error of a concrete type, e.g. `StorageError`
    pub fn downcast_source<E: Error + 'static>(&self) -> Option<&E> {
        self.source.as_deref().and_then(|e| e.downcast_ref::<E>())
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code.code(), self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref cause) = self.cause {
            write!(f, " (caused by: {})", cause.code())?;
        } else if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl Error for CellError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Some(ref cause) = self.cause {
            return Some(cause.as_ref() as &(dyn Error + 'static));
        }
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<StorageError> for CellError {
    fn from(error: StorageError) -> Self {
        let code = if error.code().is_configuration() {
            CellErrorCode::ConfigInvalid
        } else {
            CellErrorCode::IoFailure
        };
        Self::new(code, error.message().to_string())
            .with_details(error.code().code())
            .with_source(Arc::new(error))
    }
}

impl From<ConfigError> for CellError {
    fn from(error: ConfigError) -> Self {
        Self::new(CellErrorCode::ConfigInvalid, error.to_string()).with_source(Arc::new(error))
    }
}

/// Result type for cell operations
pub type CellResult<T> = Result<T, CellError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageErrorCode;
    use std::io;
    use std::path::Path;

    #[test]
    fn test_error_codes() {
        assert_eq!(CellError::closed().code().code(), "CELL_CLOSED");
        assert_eq!(CellError::cancelled().code().code(), "CELL_CANCELLED");
        assert_eq!(
            CellError::config_invalid("x").code().code(),
            "CELL_CONFIG_INVALID"
        );
    }

    #[test]
    fn test_terminal_wraps_cause() {
        let cause = CellError::from(StorageError::rename_failed(
            Path::new("/a.tmp"),
            Path::new("/a"),
            io::Error::new(io::ErrorKind::Other, "disk gone"),
        ));
        let terminal = CellError::terminal(cause);

        assert!(terminal.is_terminal());
        assert_eq!(terminal.severity(), Severity::Fatal);
        assert_eq!(terminal.cause().unwrap().code(), CellErrorCode::IoFailure);
        assert!(Error::source(&terminal).is_some());

        let storage = terminal
            .cause()
            .unwrap()
            .downcast_source::<StorageError>()
            .unwrap();
        assert_eq!(storage.code(), StorageErrorCode::RenameFailed);
    }

    #[test]
    fn test_clone_shares_source() {
        let err = CellError::transform_failed("nope".into());
        let copy = err.clone();
        assert_eq!(copy.code(), CellErrorCode::TransformFailed);
        assert!(format!("{}", copy).contains("nope"));
    }

    #[test]
    fn test_path_in_use_is_configuration() {
        let err = CellError::from(StorageError::path_in_use(Path::new("/x/y.json")));
        assert_eq!(err.code(), CellErrorCode::ConfigInvalid);
        assert_eq!(err.details(), Some("CELL_STORAGE_PATH_IN_USE"));
    }

    #[test]
    fn test_display_format() {
        let err = CellError::collaborator_failed("migration 'v2'", "bad field".into());
        let display = format!("{}", err);
        assert!(display.starts_with("[ERROR] CELL_COLLABORATOR_FAILED"));
        assert!(display.contains("migration 'v2'"));
        assert!(display.contains("bad field"));
    }
}
