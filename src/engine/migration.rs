//! Initialization-time migrations
//!
//! Migrations run in order before the first value is handed out. Whether a
//! migration runs is decided from the value alone: nothing records that a
//! migration has already been applied, so `should_migrate` must return
//! false once its work is visible in the value.

use crate::codec::BoxError;

/// A one-time value transform applied during initialization
pub trait Migration<T>: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str {
        "migration"
    }

    /// Whether `current` still needs this migration
    fn should_migrate(&self, current: &T) -> Result<bool, BoxError>;

    /// Produce the migrated value
    fn migrate(&self, current: T) -> Result<T, BoxError>;

    /// Side effects once the migrated value is durable, e.g. removing a
    /// legacy file. Only called for migrations that ran.
    fn clean_up(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

type CleanUpFn = Box<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

/// A migration assembled from closures
pub struct FnMigration<S, M> {
    name: String,
    should_migrate: S,
    migrate: M,
    clean_up: Option<CleanUpFn>,
}

impl<S, M> FnMigration<S, M> {
    pub fn new(name: impl Into<String>, should_migrate: S, migrate: M) -> Self {
        Self {
            name: name.into(),
            should_migrate,
            migrate,
            clean_up: None,
        }
    }

    /// Run `clean_up` after the migrated value has been committed
    pub fn with_clean_up<C>(mut self, clean_up: C) -> Self
    where
        C: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.clean_up = Some(Box::new(clean_up));
        self
    }
}

impl<T, S, M> Migration<T> for FnMigration<S, M>
where
    S: Fn(&T) -> bool + Send + Sync,
    M: Fn(T) -> Result<T, BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn should_migrate(&self, current: &T) -> Result<bool, BoxError> {
        Ok((self.should_migrate)(current))
    }

    fn migrate(&self, current: T) -> Result<T, BoxError> {
        (self.migrate)(current)
    }

    fn clean_up(&self) -> Result<(), BoxError> {
        match self.clean_up {
            Some(ref clean_up) => clean_up(),
            None => Ok(()),
        }
    }
}
