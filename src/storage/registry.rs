//! Active-path registry
//!
//! Process-wide set of paths owned by a live cell. Two cells on one file
//! would each cache their own value and rename over each other, so a second
//! owner is refused when it is constructed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use super::errors::{StorageError, StorageResult};

static ACTIVE_PATHS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

fn active_paths() -> MutexGuard<'static, HashSet<PathBuf>> {
    // The set is valid after any panic: insert/remove are single steps
    ACTIVE_PATHS
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Ownership of one registry entry. Dropping it releases the path.
#[derive(Debug)]
pub struct PathGuard {
    path: PathBuf,
}

impl PathGuard {
    /// The registered key
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        release(&self.path);
    }
}

/// Register `path` as owned.
///
/// Fails with `CELL_STORAGE_PATH_IN_USE` if it is already registered.
pub fn acquire(path: &Path) -> StorageResult<PathGuard> {
    let mut active = active_paths();
    if !active.insert(path.to_path_buf()) {
        return Err(StorageError::path_in_use(path));
    }
    Ok(PathGuard {
        path: path.to_path_buf(),
    })
}

/// Remove `path` from the registry. Idempotent.
pub fn release(path: &Path) {
    active_paths().remove(path);
}

/// Whether `path` is currently owned
pub fn is_active(path: &Path) -> bool {
    active_paths().contains(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageErrorCode;

    #[test]
    fn test_acquire_then_duplicate_fails() {
        let path = Path::new("/registry-unit/dup.json");
        let _guard = acquire(path).unwrap();

        let err = acquire(path).unwrap_err();
        assert_eq!(err.code(), StorageErrorCode::PathInUse);
    }

    #[test]
    fn test_guard_drop_releases() {
        let path = Path::new("/registry-unit/drop.json");
        {
            let _guard = acquire(path).unwrap();
            assert!(is_active(path));
        }
        assert!(!is_active(path));
        assert!(acquire(path).is_ok());
    }

    #[test]
    fn test_release_is_idempotent() {
        let path = Path::new("/registry-unit/idem.json");
        let guard = acquire(path).unwrap();
        release(path);
        release(path);
        assert!(!is_active(path));
        drop(guard);
        assert!(!is_active(path));
    }
}
