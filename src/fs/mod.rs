//! # File System Backends
//!
//! The atomic store only needs a handful of structural primitives from the
//! file system: whole-file read, create-for-write with an explicit sync,
//! directory creation, rename, delete and an existence check.
//!
//! - [`NativeFileSystem`]: `std::fs` on the host
//! - [`MemoryFileSystem`]: in-process map with fault injection, for tests

mod memory;
mod native;

pub use memory::MemoryFileSystem;
pub use native::NativeFileSystem;

use std::fmt;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

/// Backend trait for the file system a cell persists to
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Read the whole file.
    ///
    /// A missing file must surface as `io::ErrorKind::NotFound`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create `path` for writing, truncating any previous content
    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteHandle>>;

    /// Create `path` and all missing ancestors
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Atomically replace `to` with `from`
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Delete a file
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Check if path exists
    fn exists(&self, path: &Path) -> bool;

    /// Make entries created or renamed inside `dir` durable.
    ///
    /// Backends without directory handles have nothing to do here.
    fn sync_dir(&self, _dir: &Path) -> io::Result<()> {
        Ok(())
    }

    /// Key under which `path` is registered as active
    fn canonical_key(&self, path: &Path) -> PathBuf {
        normalize_path(path)
    }
}

/// An open file being written.
///
/// Closing happens on drop.
pub trait WriteHandle: Write + Send {
    /// Force everything written so far to durable storage
    fn sync(&mut self) -> io::Result<()>;
}

/// Lexically normalize a path: drops `.` and resolves `..` against the
/// preceding component. Symlinks are not consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
