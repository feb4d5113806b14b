//! Cell construction

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::codec::Codec;
use crate::config::CellConfig;
use crate::fs::{FileSystem, NativeFileSystem};
use crate::observability::{log_event_with_fields, CellMetrics, Event};
use crate::storage::open_exclusive;

use super::cell::DurableCell;
use super::errors::{CellError, CellResult};
use super::handler::CorruptionHandler;
use super::migration::Migration;
use super::state::CellState;
use super::worker::{Collaborators, PathProducer, Target, Worker, DEFERRED_PATH};
use super::CellValue;

enum PathSource {
    Path(PathBuf),
    Producer(PathProducer),
}

/// Builder for [`DurableCell`]
pub struct CellBuilder<T> {
    codec: Arc<dyn Codec<T>>,
    source: Option<PathSource>,
    fs: Option<Arc<dyn FileSystem>>,
    corruption_handler: Option<Arc<dyn CorruptionHandler<T>>>,
    migrations: Vec<Arc<dyn Migration<T>>>,
    config: CellConfig,
}

impl<T: CellValue> CellBuilder<T> {
    pub fn new(codec: impl Codec<T> + 'static) -> Self {
        Self {
            codec: Arc::new(codec),
            source: None,
            fs: None,
            corruption_handler: None,
            migrations: Vec::new(),
            config: CellConfig::default(),
        }
    }

    /// Store the value at `path`. The path is claimed when `build` runs.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(PathSource::Path(path.into()));
        self
    }

    /// Compute the path on first use. `produce` runs at most once.
    pub fn produce_path<F>(mut self, produce: F) -> Self
    where
        F: FnOnce() -> PathBuf + Send + 'static,
    {
        self.source = Some(PathSource::Producer(Box::new(produce)));
        self
    }

    /// Storage backend; the native file system by default
    pub fn file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Some(Arc::new(fs));
        self
    }

    /// Without a handler, corrupt stored bytes make the cell final
    pub fn corruption_handler(mut self, handler: impl CorruptionHandler<T> + 'static) -> Self {
        self.corruption_handler = Some(Arc::new(handler));
        self
    }

    /// Append a migration; migrations run in the order added
    pub fn migration(mut self, migration: impl Migration<T> + 'static) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    pub fn migrations<I, M>(mut self, migrations: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Migration<T> + 'static,
    {
        for migration in migrations {
            self.migrations.push(Arc::new(migration));
        }
        self
    }

    pub fn config(mut self, config: CellConfig) -> Self {
        self.config = config;
        self
    }

    /// Claim the path and start the worker on the current tokio runtime.
    ///
    /// Fails with `CELL_CONFIG_INVALID` outside a runtime, for an invalid
    /// configuration or path, or when another live cell owns the path.
    pub fn build(self) -> CellResult<DurableCell<T>> {
        let runtime = Handle::try_current().map_err(|_| {
            CellError::config_invalid("a cell must be built inside a tokio runtime")
        })?;
        self.config.validate()?;

        let fs = self
            .fs
            .unwrap_or_else(|| Arc::new(NativeFileSystem::new()));
        let options = self.config.store_options();

        let (target, path) = match self.source {
            Some(PathSource::Path(path)) => {
                let exclusive = open_exclusive(Arc::clone(&fs), path, &options)?;
                let label = exclusive.store.path().display().to_string();
                (Target::Open(exclusive), label)
            }
            Some(PathSource::Producer(produce)) => {
                (Target::Deferred(produce), DEFERRED_PATH.to_string())
            }
            None => {
                return Err(CellError::config_invalid(
                    "no path configured; call path() or produce_path()",
                ))
            }
        };

        let instance = Uuid::new_v4().to_string();
        let metrics = Arc::new(CellMetrics::new());
        let migration_count = self.migrations.len().to_string();
        let collaborators = Arc::new(Collaborators {
            instance: instance.clone(),
            codec: self.codec,
            corruption_handler: self.corruption_handler,
            migrations: self.migrations,
            metrics: Arc::clone(&metrics),
        });

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(CellState::Uninitialized);

        let worker = Worker::new(
            collaborators,
            fs,
            options,
            target,
            self.config.subscriber_warn_threshold,
            requests_rx,
            state_tx,
        );

        log_event_with_fields(
            Event::CellOpened,
            &[
                ("instance", &instance),
                ("path", &path),
                ("migrations", &migration_count),
            ],
        );

        runtime.spawn(worker.run());

        Ok(DurableCell::new(requests_tx, state_rx, metrics, instance))
    }
}
