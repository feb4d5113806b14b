//! Observable cell lifecycle events

use std::fmt;

/// Observable events in a cell's life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Cell constructed and worker started
    CellOpened,
    /// Worker stopped and path released
    CellClosed,
    /// Cell entered its terminal state (FATAL)
    CellFinal,

    // Initialization
    /// Stored bytes could not be decoded
    CorruptionDetected,
    /// Replacement value from the corruption handler committed
    CorruptionRecovered,
    /// One migration changed the value
    MigrationApplied,
    /// A migration clean-up step failed
    MigrationCleanUpFailed,

    // Updates
    /// New value durably committed
    Commit,
    /// Transform returned a failure
    TransformFailed,
    /// Queued update dropped by its caller before it ran
    UpdateCancelled,
    /// Live subscriber count crossed the warning threshold
    SubscribersHigh,

    // Configuration
    /// Configuration file loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CellOpened => "CELL_OPENED",
            Event::CellClosed => "CELL_CLOSED",
            Event::CellFinal => "CELL_FINAL",

            Event::CorruptionDetected => "CELL_CORRUPTION_DETECTED",
            Event::CorruptionRecovered => "CELL_CORRUPTION_RECOVERED",
            Event::MigrationApplied => "CELL_MIGRATION_APPLIED",
            Event::MigrationCleanUpFailed => "CELL_MIGRATION_CLEANUP_FAILED",

            Event::Commit => "CELL_COMMIT",
            Event::TransformFailed => "CELL_TRANSFORM_FAILED",
            Event::UpdateCancelled => "CELL_UPDATE_CANCELLED",
            Event::SubscribersHigh => "CELL_SUBSCRIBERS_HIGH",

            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::CellFinal)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
