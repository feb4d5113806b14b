//! Cell worker
//!
//! One task per cell owns the cached value and handles requests one at a
//! time, in arrival order. Initialization and commits run on the blocking
//! pool and are awaited before the next request is taken, so a commit that
//! has started always finishes even if its caller has gone away.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::codec::{decode_from_slice, encode_to_vec, BoxError, Codec, CodecError};
use crate::crash_point::{maybe_crash, points};
use crate::fs::FileSystem;
use crate::observability::{CellMetrics, Event, Logger, ObservationScope, Severity};
use crate::storage::{open_exclusive, AtomicFileStore, ExclusiveStore, StoreOptions};

use super::errors::CellError;
use super::handler::CorruptionHandler;
use super::migration::Migration;
use super::state::{CellState, State};
use super::subscription::Sink;
use super::CellValue;

/// Log label for a path that has not been produced yet
pub(crate) const DEFERRED_PATH: &str = "<deferred>";

pub(crate) type Transform<T> = Box<dyn FnOnce(&T) -> Result<T, BoxError> + Send>;
pub(crate) type PathProducer = Box<dyn FnOnce() -> PathBuf + Send>;

pub(crate) enum Request<T> {
    Update {
        transform: Transform<T>,
        reply: oneshot::Sender<Result<T, CellError>>,
    },
    Read {
        reply: oneshot::Sender<Result<T, CellError>>,
    },
    Subscribe {
        sink: Sink<T>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// Everything initialization and commits need, shared with the blocking pool
pub(crate) struct Collaborators<T> {
    pub instance: String,
    pub codec: Arc<dyn Codec<T>>,
    pub corruption_handler: Option<Arc<dyn CorruptionHandler<T>>>,
    pub migrations: Vec<Arc<dyn Migration<T>>>,
    pub metrics: Arc<CellMetrics>,
}

impl<T> Collaborators<T> {
    fn log(&self, path: &str, severity: Severity, event: Event, extra: &[(&str, &str)]) {
        if !Logger::enabled(severity) {
            return;
        }
        let mut fields = Vec::with_capacity(extra.len() + 2);
        fields.push(("instance", self.instance.as_str()));
        fields.push(("path", path));
        fields.extend_from_slice(extra);
        Logger::log(severity, event.as_str(), &fields);
    }
}

/// Where the value lives
pub(crate) enum Target {
    Open(ExclusiveStore),
    Deferred(PathProducer),
    Unavailable,
}

pub(crate) struct Worker<T> {
    collaborators: Arc<Collaborators<T>>,
    fs: Arc<dyn FileSystem>,
    options: StoreOptions,
    target: Target,
    path: String,
    state: State<T>,
    subscribers: Vec<Sink<T>>,
    subscriber_warn_threshold: usize,
    subscribers_high: bool,
    requests: mpsc::UnboundedReceiver<Request<T>>,
    state_tx: watch::Sender<CellState>,
}

impl<T: CellValue> Worker<T> {
    pub(crate) fn new(
        collaborators: Arc<Collaborators<T>>,
        fs: Arc<dyn FileSystem>,
        options: StoreOptions,
        target: Target,
        subscriber_warn_threshold: usize,
        requests: mpsc::UnboundedReceiver<Request<T>>,
        state_tx: watch::Sender<CellState>,
    ) -> Self {
        let path = match target {
            Target::Open(ref exclusive) => exclusive.store.path().display().to_string(),
            _ => DEFERRED_PATH.to_string(),
        };
        Self {
            collaborators,
            fs,
            options,
            target,
            path,
            state: State::Uninitialized,
            subscribers: Vec::new(),
            subscriber_warn_threshold,
            subscribers_high: false,
            requests,
            state_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            match request {
                Request::Update { transform, reply } => self.handle_update(transform, reply).await,
                Request::Read { reply } => self.handle_read(reply).await,
                Request::Subscribe { sink } => self.handle_subscribe(sink).await,
                Request::Close { ack } => {
                    self.shutdown().await;
                    let _ = ack.send(());
                    return;
                }
            }
        }
        // Every handle was dropped
        self.shutdown().await;
    }

    async fn handle_update(
        &mut self,
        transform: Transform<T>,
        reply: oneshot::Sender<Result<T, CellError>>,
    ) {
        if reply.is_closed() {
            self.collaborators.metrics.increment_updates_cancelled();
            self.log(Severity::Info, Event::UpdateCancelled, &[]);
            return;
        }
        let result = self.apply_update(transform).await;
        let _ = reply.send(result);
    }

    async fn apply_update(&mut self, transform: Transform<T>) -> Result<T, CellError> {
        self.ensure_ready().await?;

        let (next, version) = match self.state {
            State::Ready {
                ref value,
                version,
            } => {
                let next = match catch_panic(|| transform(value)) {
                    Ok(next) => next,
                    Err(error) => {
                        self.collaborators.metrics.increment_transform_failures();
                        let failure = CellError::transform_failed(error);
                        self.log(
                            Severity::Warn,
                            Event::TransformFailed,
                            &[("reason", failure.message())],
                        );
                        return Err(failure);
                    }
                };
                if next == *value {
                    self.collaborators.metrics.increment_updates_unchanged();
                    return Ok(next);
                }
                (next, version + 1)
            }
            State::Final(ref terminal) => return Err(terminal.clone()),
            State::Uninitialized => {
                return Err(CellError::internal("update reached an uninitialized cell"))
            }
        };

        self.commit(next, version).await
    }

    async fn handle_read(&mut self, reply: oneshot::Sender<Result<T, CellError>>) {
        if reply.is_closed() {
            return;
        }
        let result = match self.ensure_ready().await {
            Ok(()) => match self.state {
                State::Ready { ref value, .. } => Ok(value.clone()),
                State::Final(ref terminal) => Err(terminal.clone()),
                State::Uninitialized => {
                    Err(CellError::internal("read reached an uninitialized cell"))
                }
            },
            Err(terminal) => Err(terminal),
        };
        let _ = reply.send(result);
    }

    async fn handle_subscribe(&mut self, sink: Sink<T>) {
        if sink.is_closed() {
            return;
        }
        if let Err(terminal) = self.ensure_ready().await {
            let _ = sink.send(Err(terminal));
            return;
        }
        if let State::Ready { ref value, .. } = self.state {
            if sink.send(Ok(value.clone())).is_ok() {
                // Subscriptions dropped since the last commit
                self.subscribers.retain(|live| !live.is_closed());
                self.subscribers.push(sink);
                self.collaborators.metrics.increment_subscribers();
                self.check_subscriber_count();
            }
        }
    }

    /// Run initialization if it has not run yet.
    ///
    /// Returns the terminal error if the cell is, or becomes, final.
    async fn ensure_ready(&mut self) -> Result<(), CellError> {
        match self.state {
            State::Ready { .. } => return Ok(()),
            State::Final(ref terminal) => return Err(terminal.clone()),
            State::Uninitialized => {}
        }

        self.state_tx.send_replace(CellState::Initializing);

        let outcome = match self.resolve_store() {
            Ok(store) => {
                let collaborators = Arc::clone(&self.collaborators);
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || initialize(&collaborators, &store, &path))
                    .await
                    .unwrap_or_else(|e| {
                        Err(CellError::internal(format!("initialization task failed: {}", e)))
                    })
            }
            Err(cause) => Err(cause),
        };

        match outcome {
            Ok(value) => {
                self.state = State::Ready { value, version: 0 };
                self.state_tx.send_replace(self.state.snapshot());
                Ok(())
            }
            Err(cause) => Err(self.enter_final(cause)),
        }
    }

    /// The open store, resolving a deferred path on first use
    fn resolve_store(&mut self) -> Result<Arc<AtomicFileStore>, CellError> {
        match std::mem::replace(&mut self.target, Target::Unavailable) {
            Target::Open(exclusive) => {
                let store = Arc::clone(&exclusive.store);
                self.target = Target::Open(exclusive);
                Ok(store)
            }
            Target::Deferred(produce) => {
                let path = produce();
                self.path = path.display().to_string();
                let exclusive = open_exclusive(Arc::clone(&self.fs), path, &self.options)?;
                let store = Arc::clone(&exclusive.store);
                self.target = Target::Open(exclusive);
                Ok(store)
            }
            Target::Unavailable => Err(CellError::closed()),
        }
    }

    async fn commit(&mut self, value: T, version: u64) -> Result<T, CellError> {
        let store = match self.target {
            Target::Open(ref exclusive) => Arc::clone(&exclusive.store),
            _ => return Err(self.enter_final(CellError::internal("commit without a store"))),
        };
        let collaborators = Arc::clone(&self.collaborators);

        let outcome = tokio::task::spawn_blocking(move || {
            write_value(&collaborators, &store, &value).map(|bytes| (value, bytes))
        })
        .await
        .unwrap_or_else(|e| Err(CellError::internal(format!("commit task failed: {}", e))));

        match outcome {
            Ok((value, bytes)) => {
                self.log(
                    Severity::Info,
                    Event::Commit,
                    &[
                        ("version", &version.to_string()),
                        ("bytes", &bytes.to_string()),
                    ],
                );
                self.state = State::Ready {
                    value: value.clone(),
                    version,
                };
                self.state_tx.send_replace(self.state.snapshot());
                self.publish(&value);
                Ok(value)
            }
            Err(cause) => Err(self.enter_final(cause)),
        }
    }

    fn publish(&mut self, value: &T) {
        self.subscribers
            .retain(|sink| sink.send(Ok(value.clone())).is_ok());
        self.check_subscriber_count();
    }

    fn check_subscriber_count(&mut self) {
        let live = self.subscribers.len();
        self.collaborators.metrics.set_subscribers_live(live);
        if live <= self.subscriber_warn_threshold {
            self.subscribers_high = false;
            return;
        }
        if !self.subscribers_high {
            self.subscribers_high = true;
            self.log(
                Severity::Warn,
                Event::SubscribersHigh,
                &[
                    ("subscribers", &live.to_string()),
                    ("threshold", &self.subscriber_warn_threshold.to_string()),
                ],
            );
        }
    }

    /// Enter the terminal state. Subscribers receive the error and are dropped.
    fn enter_final(&mut self, cause: CellError) -> CellError {
        let terminal = CellError::terminal(cause);
        if let Some(cause) = terminal.cause() {
            self.log(
                Severity::Fatal,
                Event::CellFinal,
                &[("code", cause.code().code()), ("reason", &cause.to_string())],
            );
        }
        for sink in self.subscribers.drain(..) {
            let _ = sink.send(Err(terminal.clone()));
        }
        self.collaborators.metrics.set_subscribers_live(0);
        self.state = State::Final(terminal.clone());
        self.state_tx.send_replace(self.state.snapshot());
        terminal
    }

    /// Release the path, end every subscription and refuse queued requests
    async fn shutdown(&mut self) {
        self.subscribers.clear();
        self.collaborators.metrics.set_subscribers_live(0);
        self.target = Target::Unavailable;
        self.state_tx.send_replace(CellState::Closed);
        self.log(Severity::Info, Event::CellClosed, &[]);

        self.requests.close();
        while let Some(request) = self.requests.recv().await {
            match request {
                Request::Update { reply, .. } | Request::Read { reply } => {
                    let _ = reply.send(Err(CellError::closed()));
                }
                Request::Subscribe { sink } => {
                    let _ = sink.send(Err(CellError::closed()));
                }
                Request::Close { ack } => {
                    let _ = ack.send(());
                }
            }
        }
    }

    fn log(&self, severity: Severity, event: Event, extra: &[(&str, &str)]) {
        self.collaborators.log(&self.path, severity, event, extra);
    }
}

/// Encode and durably write `value`. Returns the payload size.
fn write_value<T>(
    collaborators: &Collaborators<T>,
    store: &AtomicFileStore,
    value: &T,
) -> Result<u64, CellError> {
    let bytes =
        encode_to_vec(collaborators.codec.as_ref(), value).map_err(CellError::codec_failed)?;
    store.write(&bytes)?;
    let len = bytes.len() as u64;
    collaborators.metrics.record_commit(len);
    Ok(len)
}

/// First read, corruption recovery and migrations. Runs on the blocking pool.
fn initialize<T: CellValue>(
    collaborators: &Collaborators<T>,
    store: &AtomicFileStore,
    path: &str,
) -> Result<T, CellError> {
    let scope = ObservationScope::with_fields(
        "CELL_INIT",
        &[("instance", collaborators.instance.as_str()), ("path", path)],
    );

    let result = read_initial(collaborators, store, path)
        .and_then(|value| apply_migrations(collaborators, store, path, value));

    match result {
        Ok(value) => {
            scope.complete();
            Ok(value)
        }
        Err(e) => {
            scope.fail(&e.to_string());
            Err(e)
        }
    }
}

fn read_initial<T: CellValue>(
    collaborators: &Collaborators<T>,
    store: &AtomicFileStore,
    path: &str,
) -> Result<T, CellError> {
    let bytes = match store.read()? {
        Some(bytes) => bytes,
        None => return Ok(collaborators.codec.default_value()),
    };

    match decode_from_slice(collaborators.codec.as_ref(), &bytes) {
        Ok(value) => Ok(value),
        Err(error) if error.is_corruption() => recover(collaborators, store, path, error),
        Err(error) => Err(CellError::codec_failed(error)),
    }
}

/// Replace a corrupt payload with the handler's value, committed before the
/// cell becomes ready
fn recover<T: CellValue>(
    collaborators: &Collaborators<T>,
    store: &AtomicFileStore,
    path: &str,
    error: CodecError,
) -> Result<T, CellError> {
    collaborators.log(
        path,
        Severity::Warn,
        Event::CorruptionDetected,
        &[("reason", &error.to_string())],
    );

    let handler = match collaborators.corruption_handler {
        Some(ref handler) => handler,
        None => return Err(CellError::data_corruption(error)),
    };

    let replacement = catch_panic(|| handler.handle_corruption(&error))
        .map_err(|e| CellError::collaborator_failed("corruption handler", e))?;

    let bytes = write_value(collaborators, store, &replacement)?;
    maybe_crash(points::INIT_AFTER_CORRUPTION_COMMIT);

    collaborators.metrics.increment_corruption_recoveries();
    collaborators.log(
        path,
        Severity::Warn,
        Event::CorruptionRecovered,
        &[("bytes", &bytes.to_string())],
    );
    Ok(replacement)
}

/// Run every migration in order, commit once if the value changed, then run
/// the clean-ups of the migrations that ran
fn apply_migrations<T: CellValue>(
    collaborators: &Collaborators<T>,
    store: &AtomicFileStore,
    path: &str,
    mut value: T,
) -> Result<T, CellError> {
    if collaborators.migrations.is_empty() {
        return Ok(value);
    }

    let original = value.clone();
    let mut applied: Vec<&Arc<dyn Migration<T>>> = Vec::new();

    for migration in &collaborators.migrations {
        let failed = |e: BoxError| {
            CellError::collaborator_failed(format!("migration '{}'", migration.name()), e)
        };
        if !catch_panic(|| migration.should_migrate(&value)).map_err(failed)? {
            continue;
        }
        value = catch_panic(|| migration.migrate(value)).map_err(failed)?;
        applied.push(migration);
        collaborators.log(
            path,
            Severity::Info,
            Event::MigrationApplied,
            &[("migration", migration.name())],
        );
    }

    if applied.is_empty() {
        return Ok(value);
    }

    if value != original {
        let bytes = write_value(collaborators, store, &value)?;
        maybe_crash(points::INIT_AFTER_MIGRATION_COMMIT);
        collaborators.log(
            path,
            Severity::Info,
            Event::Commit,
            &[("version", "0"), ("bytes", &bytes.to_string())],
        );
    }
    collaborators
        .metrics
        .add_migrations_applied(applied.len() as u64);

    run_clean_ups(collaborators, path, &applied)?;
    Ok(value)
}

/// Every clean-up runs; the first failure is returned
fn run_clean_ups<T>(
    collaborators: &Collaborators<T>,
    path: &str,
    applied: &[&Arc<dyn Migration<T>>],
) -> Result<(), CellError> {
    let mut first_failure = None;

    for migration in applied {
        if let Err(error) = catch_panic(|| migration.clean_up()) {
            collaborators.log(
                path,
                Severity::Error,
                Event::MigrationCleanUpFailed,
                &[("migration", migration.name()), ("reason", &error.to_string())],
            );
            if first_failure.is_none() {
                first_failure = Some(CellError::collaborator_failed(
                    format!("clean-up of migration '{}'", migration.name()),
                    error,
                ));
            }
        }
    }

    match first_failure {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

/// Run collaborator code, turning a panic into an error
fn catch_panic<R>(f: impl FnOnce() -> Result<R, BoxError>) -> Result<R, BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
