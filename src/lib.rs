//! durable-cell - a typed, durable, single-value store
//!
//! One value of an application-defined type is persisted to one file and
//! served to in-process consumers as a stream of committed values. Updates
//! are serialized through a single worker per cell and committed with a
//! write-to-scratch-then-rename sequence, so the file always holds a
//! complete value.
//!
//! # Modules
//!
//! - `fs`: file-system backends (native, in-memory with fault injection)
//! - `storage`: atomic file store and active-path registry
//! - `codec`: value serialization contract and a JSON codec
//! - `engine`: the cell itself, migrations and corruption handling
//! - `config`: cell configuration files
//! - `observability`: JSON logging and counters
//! - `crash_point`: crash injection for durability tests
//! - `cli`: the `durable-cell` binary

pub mod cli;
pub mod codec;
pub mod config;
pub mod crash_point;
pub mod engine;
pub mod fs;
pub mod observability;
pub mod storage;

pub use codec::{BoxError, Codec, CodecError, JsonCodec};
pub use config::{CellConfig, ConfigError};
pub use engine::{
    CellBuilder, CellError, CellErrorCode, CellResult, CellState, CellValue, CorruptionHandler,
    DurableCell, FnMigration, Migration, ReplaceOnCorruption, Subscription,
};
pub use fs::{FileSystem, MemoryFileSystem, NativeFileSystem};
