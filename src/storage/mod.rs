//! Storage subsystem for durable-cell
//!
//! Holds the persisted bytes of one value and guards against two owners of
//! the same file in one process.
//!
//! # Design Principles
//!
//! - The real path is replaced only by rename
//! - Scratch files never outlive a failed write
//! - A missing file is a normal outcome, not an error
//! - One live owner per path per process

mod atomic;
mod errors;
pub mod registry;

use std::path::PathBuf;
use std::sync::Arc;

use crate::fs::FileSystem;

pub use atomic::{validate_path, AtomicFileStore, StoreOptions, DEFAULT_SCRATCH_SUFFIX};
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use registry::PathGuard;

/// An atomic store together with its registry entry
#[derive(Debug)]
pub struct ExclusiveStore {
    pub store: Arc<AtomicFileStore>,
    pub guard: PathGuard,
}

/// Validate `path`, claim it in the active-path registry and build a store
/// for it.
pub fn open_exclusive(
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    options: &StoreOptions,
) -> StorageResult<ExclusiveStore> {
    validate_path(&path)?;
    let key = fs.canonical_key(&path);
    let guard = registry::acquire(&key)?;
    let store = AtomicFileStore::new(fs, path, options)?;
    Ok(ExclusiveStore {
        store: Arc::new(store),
        guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn test_open_exclusive_twice_fails() {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFileSystem::new());
        let path = PathBuf::from("/storage-unit/exclusive.json");

        let first = open_exclusive(Arc::clone(&fs), path.clone(), &StoreOptions::default()).unwrap();
        let err = open_exclusive(Arc::clone(&fs), path.clone(), &StoreOptions::default()).unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::PathInUse);

        drop(first);
        assert!(open_exclusive(fs, path, &StoreOptions::default()).is_ok());
    }

    #[test]
    fn test_open_exclusive_matches_normalized_paths() {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFileSystem::new());
        let _first = open_exclusive(
            Arc::clone(&fs),
            PathBuf::from("/storage-unit/a/b.json"),
            &StoreOptions::default(),
        )
        .unwrap();

        let err = open_exclusive(
            fs,
            PathBuf::from("/storage-unit/x/../a/./b.json"),
            &StoreOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::PathInUse);
    }

    #[test]
    fn test_invalid_path_never_registers() {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFileSystem::new());
        let err = open_exclusive(fs, PathBuf::from("relative.json"), &StoreOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::InvalidPath);
        assert!(!registry::is_active(std::path::Path::new("relative.json")));
    }
}
