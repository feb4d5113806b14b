//! Coordination engine
//!
//! A [`DurableCell`] owns one value of type `T` persisted at one path. All
//! reads and updates go through a single worker task, so updates commit in
//! the order they were submitted and subscribers see every commit exactly
//! once.
//!
//! # Lifecycle
//!
//! 1. `build()` claims the path in the active-path registry
//! 2. The first `update` or subscription reads the file, recovers from
//!    corruption and runs migrations, once
//! 3. Each update commits through the atomic file store, then publishes
//! 4. A failed commit or initialization makes the cell final; every later
//!    call returns the same `CELL_TERMINAL` error
//! 5. `close()` or dropping every handle releases the path
//!
//! ```ignore
//! let cell = DurableCell::builder(JsonCodec::new(0u64))
//!     .path("/var/lib/app/counter.json")
//!     .build()?;
//! let next = cell.update(|n| Ok::<_, Infallible>(n + 1)).await?;
//! ```

mod builder;
mod cell;
mod errors;
mod handler;
mod migration;
mod state;
mod subscription;
mod worker;

pub use builder::CellBuilder;
pub use cell::DurableCell;
pub use errors::{CellError, CellErrorCode, CellResult};
pub use handler::{CorruptionHandler, ReplaceOnCorruption};
pub use migration::{FnMigration, Migration};
pub use state::CellState;
pub use subscription::Subscription;

/// Bounds on a value held by a cell.
///
/// Equality is used to skip writes that would not change the stored value.
pub trait CellValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> CellValue for T where T: Clone + PartialEq + Send + Sync + 'static {}
