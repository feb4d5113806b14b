//! Observability for durable-cell
//!
//! - Structured JSON logging, filtered by `DURABLE_CELL_LOG`
//! - Per-cell counters
//! - Begin/complete scopes around initialization
//!
//! Observability never changes what a cell does. Logging failures are
//! swallowed.

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity, LOG_LEVEL_ENV};
pub use metrics::{CellMetrics, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event at INFO, or FATAL for fatal events
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
