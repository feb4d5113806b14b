//! Atomic file store
//!
//! Commits one serialized value with the following sequence:
//!
//! 1. Create the parent directory if missing
//! 2. Write the bytes in full to `<path><scratch_suffix>`
//! 3. fsync the scratch file
//! 4. Rename the scratch file onto `<path>`
//! 5. fsync the parent directory (when enabled)
//!
//! The real path is only ever touched by the rename, so a reader sees either
//! the previous complete file or the new complete file. Any failure before or
//! at the rename removes the scratch file and leaves the real path as it was.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::crash_point::{maybe_crash, points};
use crate::fs::FileSystem;

use super::errors::{StorageError, StorageResult};

/// Default suffix of the scratch file written before each rename
pub const DEFAULT_SCRATCH_SUFFIX: &str = ".tmp";

/// Options for the durable write path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Appended to the value path to name the scratch file
    pub scratch_suffix: String,
    /// fsync the parent directory after the rename
    pub sync_directory: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            scratch_suffix: DEFAULT_SCRATCH_SUFFIX.to_string(),
            sync_directory: true,
        }
    }
}

/// Check that `path` is absolute and has a parent directory
pub fn validate_path(path: &Path) -> StorageResult<()> {
    if !path.is_absolute() {
        return Err(StorageError::invalid_path(
            path,
            "Path supplied must be an absolute path",
        ));
    }
    match path.parent() {
        Some(parent) if path.file_name().is_some() && parent != Path::new("") => Ok(()),
        _ => Err(StorageError::invalid_path(
            path,
            "Path supplied must have a parent directory",
        )),
    }
}

/// Durable byte-level storage of one value at one path
#[derive(Debug)]
pub struct AtomicFileStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    scratch_path: PathBuf,
    sync_directory: bool,
}

impl AtomicFileStore {
    /// Create a store for `path`.
    ///
    /// Fails with `CELL_STORAGE_INVALID_PATH` if the path is relative or has
    /// no parent.
    pub fn new(fs: Arc<dyn FileSystem>, path: PathBuf, options: &StoreOptions) -> StorageResult<Self> {
        validate_path(&path)?;
        let mut scratch: OsString = path.clone().into_os_string();
        scratch.push(&options.scratch_suffix);
        Ok(Self {
            fs,
            path,
            scratch_path: PathBuf::from(scratch),
            sync_directory: options.sync_directory,
        })
    }

    /// The real path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The scratch file path
    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    /// Parent directory of the real path
    pub fn parent(&self) -> &Path {
        // validate_path guarantees a parent
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// Whether the real path exists
    pub fn exists(&self) -> bool {
        self.fs.exists(&self.path)
    }

    /// Read the stored bytes.
    ///
    /// Returns `Ok(None)` when there is no file. A not-found report for a
    /// file that does exist is an I/O failure.
    pub fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        match self.fs.read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.fs.exists(&self.path) {
                    Err(StorageError::read_failed(&self.path, e))
                } else {
                    Ok(None)
                }
            }
            Err(e) => Err(StorageError::read_failed(&self.path, e)),
        }
    }

    /// Commit `bytes` as the new content of the real path.
    ///
    /// A failure before the rename leaves the real path untouched. A
    /// directory sync failure is reported after the rename, so the new
    /// content may already be in place when this returns an error.
    pub fn write(&self, bytes: &[u8]) -> StorageResult<()> {
        let parent = self.parent();
        self.fs.create_dir_all(parent).map_err(|e| {
            StorageError::write_failed(
                format!("Unable to create parent directories of {}", self.path.display()),
                e,
            )
        })?;

        maybe_crash(points::STORE_BEFORE_SCRATCH_WRITE);

        if let Err(e) = self.write_scratch(bytes) {
            self.discard_scratch();
            return Err(e);
        }

        maybe_crash(points::STORE_AFTER_SCRATCH_FSYNC);
        maybe_crash(points::STORE_BEFORE_RENAME);

        if let Err(e) = self.fs.rename(&self.scratch_path, &self.path) {
            self.discard_scratch();
            return Err(StorageError::rename_failed(&self.scratch_path, &self.path, e));
        }

        maybe_crash(points::STORE_AFTER_RENAME);

        if self.sync_directory {
            self.fs.sync_dir(parent).map_err(|e| {
                StorageError::write_failed(
                    format!("fsync directory failed: {}", parent.display()),
                    e,
                )
            })?;
        }

        Ok(())
    }

    fn write_scratch(&self, bytes: &[u8]) -> StorageResult<()> {
        let scratch = &self.scratch_path;
        let mut handle = self.fs.create(scratch).map_err(|e| {
            StorageError::write_failed(
                format!("Failed to create scratch file: {}", scratch.display()),
                e,
            )
        })?;

        handle.write_all(bytes).map_err(|e| {
            StorageError::write_failed(
                format!("Failed to write scratch file: {}", scratch.display()),
                e,
            )
        })?;

        // fsync is mandatory
        handle.sync().map_err(|e| {
            StorageError::write_failed(format!("fsync failed for: {}", scratch.display()), e)
        })
    }

    /// Remove the scratch file (cleanup on failure)
    fn discard_scratch(&self) {
        if self.fs.exists(&self.scratch_path) {
            // Best effort removal - we're already in an error path
            let _ = self.fs.remove_file(&self.scratch_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{MemoryFileSystem, NativeFileSystem};
    use crate::storage::StorageErrorCode;
    use tempfile::TempDir;

    fn memory_store(path: &str) -> (MemoryFileSystem, AtomicFileStore) {
        let fs = MemoryFileSystem::new();
        let store = AtomicFileStore::new(
            Arc::new(fs.clone()),
            PathBuf::from(path),
            &StoreOptions::default(),
        )
        .unwrap();
        (fs, store)
    }

    #[test]
    fn test_relative_path_rejected() {
        let result = AtomicFileStore::new(
            Arc::new(MemoryFileSystem::new()),
            PathBuf::from("relative/value"),
            &StoreOptions::default(),
        );
        assert_eq!(result.unwrap_err().code(), StorageErrorCode::InvalidPath);
    }

    #[test]
    fn test_root_path_rejected() {
        assert!(validate_path(Path::new("/")).is_err());
        assert!(validate_path(Path::new("/value")).is_ok());
    }

    #[test]
    fn test_scratch_path_uses_suffix() {
        let (_, store) = memory_store("/data/value.json");
        assert_eq!(store.scratch_path(), Path::new("/data/value.json.tmp"));

        let custom = AtomicFileStore::new(
            Arc::new(MemoryFileSystem::new()),
            PathBuf::from("/data/value.json"),
            &StoreOptions {
                scratch_suffix: ".scratch".to_string(),
                sync_directory: false,
            },
        )
        .unwrap();
        assert_eq!(custom.scratch_path(), Path::new("/data/value.json.scratch"));
    }

    #[test]
    fn test_read_missing_is_none() {
        let (_, store) = memory_store("/data/value");
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_write_creates_parent_and_publishes() {
        let (fs, store) = memory_store("/a/b/c/value");
        store.write(b"one").unwrap();

        assert_eq!(fs.contents("/a/b/c/value").unwrap(), b"one");
        assert!(!fs.exists(store.scratch_path()));
        assert_eq!(store.read().unwrap().unwrap(), b"one");
    }

    #[test]
    fn test_failed_sync_keeps_previous_value() {
        let (fs, store) = memory_store("/data/value");
        store.write(b"old").unwrap();

        fs.fail_next_sync();
        let err = store.write(b"new").unwrap_err();

        assert_eq!(err.code(), StorageErrorCode::WriteFailed);
        assert_eq!(fs.contents("/data/value").unwrap(), b"old");
        assert!(!fs.exists(store.scratch_path()));
    }

    #[test]
    fn test_torn_scratch_write_keeps_previous_value() {
        let (fs, store) = memory_store("/data/value");
        store.write(b"old").unwrap();

        fs.fail_next_write();
        assert!(store.write(b"brand new").is_err());

        assert_eq!(fs.contents("/data/value").unwrap(), b"old");
        assert!(!fs.exists(store.scratch_path()));
    }

    #[test]
    fn test_failed_rename_keeps_previous_value() {
        let (fs, store) = memory_store("/data/value");
        store.write(b"old").unwrap();

        fs.fail_next_rename();
        let err = store.write(b"new").unwrap_err();

        assert_eq!(err.code(), StorageErrorCode::RenameFailed);
        assert_eq!(fs.contents("/data/value").unwrap(), b"old");
        assert_eq!(fs.files(), vec![PathBuf::from("/data/value")]);
    }

    #[test]
    fn test_failed_directory_sync_reports_after_rename() {
        let (fs, store) = memory_store("/data/value");
        store.write(b"old").unwrap();

        fs.fail_next_sync_dir();
        let err = store.write(b"new").unwrap_err();

        assert_eq!(err.code(), StorageErrorCode::WriteFailed);
        assert_eq!(fs.contents("/data/value").unwrap(), b"new");
        assert!(!fs.exists(store.scratch_path()));
    }

    #[test]
    fn test_failed_directory_creation() {
        let (fs, store) = memory_store("/data/value");
        fs.fail_next_create_dir();

        let err = store.write(b"x").unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::WriteFailed);
        assert!(fs.files().is_empty());
    }

    #[test]
    fn test_native_round_trip_with_directory_sync() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/value.bin");
        let store = AtomicFileStore::new(
            Arc::new(NativeFileSystem::new()),
            path.clone(),
            &StoreOptions::default(),
        )
        .unwrap();

        store.write(b"first").unwrap();
        store.write(b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!store.scratch_path().exists());
    }
}
