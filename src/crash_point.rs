//! Crash point injection for testing durability
//!
//! A crash point is enabled through the `DURABLE_CELL_CRASH_POINT`
//! environment variable. When the named point is reached the process
//! terminates via `std::process::abort()`: no cleanup, no unwinding.
//!
//! # Usage
//!
//! ```ignore
//! use durable_cell::crash_point::{maybe_crash, points};
//!
//! maybe_crash(points::STORE_BEFORE_RENAME);
//! ```
//!
//! # Testing
//!
//! ```bash
//! DURABLE_CELL_CRASH_POINT=store_before_rename durable-cell set --path /tmp/c.json --value 1
//! ```

use std::sync::OnceLock;

/// Environment variable naming the enabled crash point
pub const CRASH_POINT_ENV: &str = "DURABLE_CELL_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Check if a specific crash point is enabled
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled.
///
/// No-op when `DURABLE_CELL_CRASH_POINT` is unset or names another point.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Atomic store write path
    pub const STORE_BEFORE_SCRATCH_WRITE: &str = "store_before_scratch_write";
    pub const STORE_AFTER_SCRATCH_FSYNC: &str = "store_after_scratch_fsync";
    pub const STORE_BEFORE_RENAME: &str = "store_before_rename";
    pub const STORE_AFTER_RENAME: &str = "store_after_rename";

    // Initialization
    pub const INIT_AFTER_CORRUPTION_COMMIT: &str = "init_after_corruption_commit";
    pub const INIT_AFTER_MIGRATION_COMMIT: &str = "init_after_migration_commit";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            STORE_BEFORE_SCRATCH_WRITE,
            STORE_AFTER_SCRATCH_FSYNC,
            STORE_BEFORE_RENAME,
            STORE_AFTER_RENAME,
            INIT_AFTER_CORRUPTION_COMMIT,
            INIT_AFTER_MIGRATION_COMMIT,
        ]
    }
}
