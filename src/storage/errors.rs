//! Storage error types
//!
//! Error codes:
//! - CELL_STORAGE_READ_FAILED (ERROR severity)
//! - CELL_STORAGE_WRITE_FAILED (ERROR severity)
//! - CELL_STORAGE_RENAME_FAILED (ERROR severity)
//! - CELL_STORAGE_INVALID_PATH (ERROR severity)
//! - CELL_STORAGE_PATH_IN_USE (ERROR severity)
//!
//! A missing file is not an error at this layer; `read` reports it as `None`.

use std::fmt;
use std::io;
use std::path::Path;

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Reading the value file failed for a reason other than absence
    ReadFailed,
    /// Directory creation, scratch write or fsync failed
    WriteFailed,
    /// Publishing the scratch file over the real path failed
    RenameFailed,
    /// Path is relative or has no parent directory
    InvalidPath,
    /// Another live cell in this process owns the path
    PathInUse,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::ReadFailed => "CELL_STORAGE_READ_FAILED",
            StorageErrorCode::WriteFailed => "CELL_STORAGE_WRITE_FAILED",
            StorageErrorCode::RenameFailed => "CELL_STORAGE_RENAME_FAILED",
            StorageErrorCode::InvalidPath => "CELL_STORAGE_INVALID_PATH",
            StorageErrorCode::PathInUse => "CELL_STORAGE_PATH_IN_USE",
        }
    }

    /// Whether the failure comes from how the store was set up rather than
    /// from the disk
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StorageErrorCode::InvalidPath | StorageErrorCode::PathInUse
        )
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code, message and optional I/O source
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StorageError {
    /// Create a read failed error
    pub fn read_failed(path: &Path, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::ReadFailed,
            message: format!("Failed to read: {}", path.display()),
            details: None,
            source: Some(source),
        }
    }

    /// Create a write failed error
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::WriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a rename failed error
    pub fn rename_failed(from: &Path, to: &Path, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::RenameFailed,
            message: format!("Failed to rename {} onto {}", from.display(), to.display()),
            details: None,
            source: Some(source),
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::InvalidPath,
            message: reason.into(),
            details: Some(format!("path: {}", path.display())),
            source: None,
        }
    }

    /// Create a path-in-use error
    pub fn path_in_use(path: &Path) -> Self {
        Self {
            code: StorageErrorCode::PathInUse,
            message: format!(
                "There are multiple cells active for the same file: {}. Keep one cell per \
                 file and close it before opening another",
                path.display()
            ),
            details: None,
            source: None,
        }
    }

    /// Add details to an error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
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

    /// Returns the kind of the underlying I/O error, if any
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.source.as_ref().map(|e| e.kind())
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code.code(), self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
