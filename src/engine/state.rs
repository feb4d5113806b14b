//! Cell state machine
//!
//! ```text
//! Uninitialized -> Initializing -> Ready(v, 0) -> Ready(v', 1) -> ...
//!                        |              |
//!                        +----> Final <-+
//! ```
//!
//! `Final` is sticky. `Closed` is reached from any state by closing the cell.

use super::errors::{CellError, CellErrorCode};

/// State owned by the worker
#[derive(Debug)]
pub(crate) enum State<T> {
    Uninitialized,
    Ready { value: T, version: u64 },
    /// Holds the terminal error handed to every later caller
    Final(CellError),
}

/// Observable snapshot of a cell's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Nothing has been read yet
    Uninitialized,
    /// First read, corruption recovery and migrations in progress
    Initializing,
    /// Serving a committed value; `version` counts commits since initialization
    Ready { version: u64 },
    /// Permanently failed; `code` is the code of the original cause
    Final { code: CellErrorCode },
    /// Closed; the path has been released
    Closed,
}

impl CellState {
    pub fn is_ready(&self) -> bool {
        matches!(self, CellState::Ready { .. })
    }

    pub fn is_final(&self) -> bool {
        matches!(self, CellState::Final { .. })
    }

    /// Committed version, if ready
    pub fn version(&self) -> Option<u64> {
        match self {
            CellState::Ready { version } => Some(*version),
            _ => None,
        }
    }
}

impl<T> State<T> {
    pub(crate) fn snapshot(&self) -> CellState {
        match self {
            State::Uninitialized => CellState::Uninitialized,
            State::Ready { version, .. } => CellState::Ready { version: *version },
            State::Final(terminal) => CellState::Final {
                code: terminal
                    .cause()
                    .map(|cause| cause.code())
                    .unwrap_or_else(|| terminal.code()),
            },
        }
    }
}
