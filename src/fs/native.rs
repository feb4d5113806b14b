//! # Native File System Backend

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{normalize_path, FileSystem, WriteHandle};

/// Host file system via `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFileSystem;

impl NativeFileSystem {
    /// Create a new native backend
    pub fn new() -> Self {
        Self
    }
}

/// Buffered handle over a file opened for writing
struct NativeWriteHandle {
    writer: BufWriter<File>,
}

impl Write for NativeWriteHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl WriteHandle for NativeWriteHandle {
    fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }
}

impl FileSystem for NativeFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn WriteHandle>> {
        let file = File::create(path)?;
        Ok(Box::new(NativeWriteHandle {
            writer: BufWriter::new(file),
        }))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)?;
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("Unable to create directory: {}", path.display()),
            ));
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    #[cfg(unix)]
    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        OpenOptions::new().read(true).open(dir)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self, _dir: &Path) -> io::Result<()> {
        // Directory handles cannot be fsynced here
        Ok(())
    }

    fn canonical_key(&self, path: &Path) -> PathBuf {
        let normalized = normalize_path(path);
        match (normalized.parent(), normalized.file_name()) {
            (Some(parent), Some(name)) => match fs::canonicalize(parent) {
                Ok(parent) => parent.join(name),
                Err(_) => normalized,
            },
            _ => normalized,
        }
    }
}
