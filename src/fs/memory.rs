//! # In-Memory File System
//!
//! A file system held in a map, shared between clones. Every primitive can be
//! told to fail once, which is how tests interrupt the durable write path at
//! a chosen step without killing the process.
//!
//! Each instance (and its clones) is its own namespace in the active-path
//! registry: two unrelated memory file systems may both hold `/a/value`.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use super::{normalize_path, FileSystem, WriteHandle};

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
}

/// One-shot failures armed by tests
#[derive(Debug, Default)]
struct FaultPlan {
    read: AtomicBool,
    write: AtomicBool,
    sync: AtomicBool,
    rename: AtomicBool,
    create_dir: AtomicBool,
    sync_dir: AtomicBool,
}

impl FaultPlan {
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct OperationCounts {
    reads: AtomicU64,
    renames: AtomicU64,
}

/// Registry namespace shared by an instance and its clones
#[derive(Debug)]
struct Namespace(Uuid);

impl Default for Namespace {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

/// In-memory file system backend
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultPlan>,
    counts: Arc<OperationCounts>,
    namespace: Arc<Namespace>,
}

fn injected(operation: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("injected {} failure", operation),
    )
}

fn is_root(path: &Path) -> bool {
    path.parent().is_none()
}

impl MemoryFileSystem {
    /// Create an empty file system
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory file system lock poisoned"))
    }

    fn parent_exists(state: &MemoryState, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) => is_root(parent) || state.dirs.contains(parent),
        }
    }

    fn add_dirs(state: &mut MemoryState, path: &Path) {
        let mut current = Some(path);
        while let Some(dir) = current {
            if is_root(dir) {
                break;
            }
            state.dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }

    /// Seed a file, creating its parent directories
    pub fn put(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = normalize_path(path.as_ref());
        if let Ok(mut state) = self.lock() {
            if let Some(parent) = path.parent() {
                Self::add_dirs(&mut state, parent);
            }
            state.files.insert(path, contents.into());
        }
    }

    /// Current contents of a file
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = normalize_path(path.as_ref());
        self.lock().ok()?.files.get(&path).cloned()
    }

    /// All file paths, sorted
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .lock()
            .map(|state| state.files.keys().cloned().collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    /// Number of `read` calls so far
    pub fn read_count(&self) -> u64 {
        self.counts.reads.load(Ordering::SeqCst)
    }

    /// Number of successful renames so far
    pub fn rename_count(&self) -> u64 {
        self.counts.renames.load(Ordering::SeqCst)
    }

    /// Make the next `read` fail
    pub fn fail_next_read(&self) {
        self.faults.read.store(true, Ordering::SeqCst);
    }

    /// Make the next write on any handle fail after writing half its buffer
    pub fn fail_next_write(&self) {
        self.faults.write.store(true, Ordering::SeqCst);
    }

    /// Make the next handle `sync` fail
    pub fn fail_next_sync(&self) {
        self.faults.sync.store(true, Ordering::SeqCst);
    }

    /// Make the next `rename` fail
    pub fn fail_next_rename(&self) {
        self.faults.rename.store(true, Ordering::SeqCst);
    }

    /// Make the next `create_dir_all` fail
    pub fn fail_next_create_dir(&self) {
        self.faults.create_dir.store(true, Ordering::SeqCst);
    }

    /// Make the next `sync_dir` fail
    pub fn fail_next_sync_dir(&self) {
        self.faults.sync_dir.store(true, Ordering::SeqCst);
    }
}

struct MemoryWriteHandle {
    fs: MemoryFileSystem,
    path: PathBuf,
}

impl Write for MemoryWriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let torn = FaultPlan::take(&self.fs.faults.write);
        let mut state = self.fs.lock()?;
        let file = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file removed while open"))?;
        if torn {
            file.extend_from_slice(&buf[..buf.len() / 2]);
            return Err(injected("write"));
        }
        file.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteHandle for MemoryWriteHandle {
    fn sync(&mut self) -> io::Result<()> {
        if FaultPlan::take(&self.fs.faults.sync) {
            return Err(injected("sync"));
        }
        Ok(())
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.counts.reads.fetch_add(1, Ordering::SeqCst);
        if FaultPlan::take(&self.faults.read) {
            return Err(injected("read"));
        }
        let path = normalize_path(path);
        self.lock()?.files.get(&path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteHandle>> {
        let path = normalize_path(path);
        {
            let mut state = self.lock()?;
            if !Self::parent_exists(&state, &path) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("parent directory missing: {}", path.display()),
                ));
            }
            state.files.insert(path.clone(), Vec::new());
        }
        Ok(Box::new(MemoryWriteHandle {
            fs: self.clone(),
            path,
        }))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if FaultPlan::take(&self.faults.create_dir) {
            return Err(injected("create_dir"));
        }
        let path = normalize_path(path);
        let mut state = self.lock()?;
        Self::add_dirs(&mut state, &path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if FaultPlan::take(&self.faults.rename) {
            return Err(injected("rename"));
        }
        let (from, to) = (normalize_path(from), normalize_path(to));
        let mut state = self.lock()?;
        if !Self::parent_exists(&state, &to) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("parent directory missing: {}", to.display()),
            ));
        }
        let contents = state.files.remove(&from).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", from.display()),
            )
        })?;
        state.files.insert(to, contents);
        self.counts.renames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = normalize_path(path);
        self.lock()?
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn exists(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.lock()
            .map(|state| state.files.contains_key(&path) || state.dirs.contains(&path))
            .unwrap_or(false)
    }

    fn sync_dir(&self, _dir: &Path) -> io::Result<()> {
        if FaultPlan::take(&self.faults.sync_dir) {
            return Err(injected("sync_dir"));
        }
        Ok(())
    }

    fn canonical_key(&self, path: &Path) -> PathBuf {
        let normalized = normalize_path(path);
        let relative = normalized
            .strip_prefix("/")
            .unwrap_or(normalized.as_path());
        PathBuf::from(format!("/memory-{}", self.namespace.0)).join(relative)
    }
}
