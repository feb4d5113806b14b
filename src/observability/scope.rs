//! ObservationScope for begin/complete logging around a unit of work
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` or `{name}_FAILED` when closed explicitly
//! - `{name}_INCOMPLETE` when dropped without either, e.g. on panic

use std::time::Instant;

use super::logger::{Logger, Severity};

/// A scope that logs start and end events with a shared set of fields
///
/// ```ignore
/// let scope = ObservationScope::with_fields("CELL_INIT", &[("path", "/data/a.json")]);
/// // ... do work ...
/// scope.complete_with_fields(&[("version", "1")]);
/// ```
pub struct ObservationScope {
    name: &'static str,
    completed: bool,
    fields: Vec<(&'static str, String)>,
    timer: Timer,
}

impl ObservationScope {
    /// Open a scope with no fields
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Open a scope whose fields are repeated on every event it logs
    pub fn with_fields(name: &'static str, fields: &[(&'static str, &str)]) -> Self {
        let scope = Self {
            name,
            completed: false,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            timer: Timer::new(),
        };
        scope.emit(Severity::Info, "BEGIN", &[]);
        scope
    }

    /// Logs `{name}_COMPLETE` at INFO level
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Logs `{name}_COMPLETE` with extra fields
    pub fn complete_with_fields(mut self, extra_fields: &[(&str, &str)]) {
        self.completed = true;
        self.emit(Severity::Info, "COMPLETE", extra_fields);
    }

    /// Logs `{name}_FAILED` at ERROR level
    pub fn fail(mut self, reason: &str) {
        self.completed = true;
        self.emit(Severity::Error, "FAILED", &[("reason", reason)]);
    }

    /// Logs `{name}_FAILED` at FATAL level
    pub fn fail_fatal(mut self, reason: &str) {
        self.completed = true;
        self.emit(Severity::Fatal, "FAILED", &[("reason", reason)]);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn emit(&self, severity: Severity, suffix: &str, extra_fields: &[(&str, &str)]) {
        if !Logger::enabled(severity) {
            return;
        }
        let event = format!("{}_{}", self.name, suffix);
        let elapsed = self.timer.elapsed_ms();
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        if suffix != "BEGIN" {
            fields.push(("elapsed_ms", elapsed.as_str()));
        }
        fields.extend(extra_fields.iter().copied());
        Logger::log(severity, &event, &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed {
            self.emit(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// A simple duration timer for logging elapsed time
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed milliseconds as a string
    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
