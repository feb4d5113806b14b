//! Shared helpers for cell integration tests

#![allow(dead_code)]

use std::convert::Infallible;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use durable_cell::storage::registry;
use durable_cell::{Codec, CodecError, DurableCell, FileSystem, MemoryFileSystem};

/// Stores an `i64` as decimal text. Anything else is corruption.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Codec;

impl Codec<i64> for I64Codec {
    fn default_value(&self) -> i64 {
        0
    }

    fn decode(&self, input: &mut dyn Read) -> Result<i64, CodecError> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        text.trim().parse().map_err(|e| {
            CodecError::corruption_with_source(format!("not an integer: {:?}", text), e)
        })
    }

    fn encode(&self, value: &i64, output: &mut dyn Write) -> Result<(), CodecError> {
        write!(output, "{}", value)?;
        Ok(())
    }
}

/// A unique absolute path for an in-memory cell
pub fn memory_path(test: &str) -> PathBuf {
    PathBuf::from(format!("/cells/{}/{}.num", test, uuid::Uuid::new_v4()))
}

/// An integer cell over an in-memory file system
pub fn memory_cell(fs: &MemoryFileSystem, path: &Path) -> DurableCell<i64> {
    DurableCell::builder(I64Codec)
        .path(path)
        .file_system(fs.clone())
        .build()
        .expect("build cell")
}

/// Decoded contents of an in-memory file
pub fn stored_i64(fs: &MemoryFileSystem, path: &Path) -> Option<i64> {
    fs.contents(path)
        .map(|bytes| String::from_utf8(bytes).unwrap().trim().parse().unwrap())
}

/// Whether a cell currently owns `path` on `fs`
pub fn registered(fs: &MemoryFileSystem, path: &Path) -> bool {
    registry::is_active(&fs.canonical_key(path))
}

/// Transform adding `n` to the current value
pub fn add(n: i64) -> impl FnOnce(&i64) -> Result<i64, Infallible> + Send + 'static {
    move |v: &i64| Ok(v + n)
}
