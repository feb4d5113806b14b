//! The cell handle

use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::codec::{BoxError, Codec};
use crate::observability::{CellMetrics, MetricsSnapshot};

use super::builder::CellBuilder;
use super::errors::{CellError, CellResult};
use super::state::CellState;
use super::subscription::Subscription;
use super::worker::{Request, Transform};
use super::CellValue;

/// Handle to a durable single-value store.
///
/// Cheap to clone; all clones talk to the same worker. The cell closes and
/// releases its path when `close` is called or the last handle is dropped.
pub struct DurableCell<T> {
    requests: mpsc::UnboundedSender<Request<T>>,
    state: watch::Receiver<CellState>,
    metrics: Arc<CellMetrics>,
    instance: Arc<str>,
}

impl<T> Clone for DurableCell<T> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            state: self.state.clone(),
            metrics: Arc::clone(&self.metrics),
            instance: Arc::clone(&self.instance),
        }
    }
}

impl<T> std::fmt::Debug for DurableCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCell")
            .field("instance", &self.instance)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl<T: CellValue> DurableCell<T> {
    /// Start configuring a cell stored with `codec`
    pub fn builder(codec: impl Codec<T> + 'static) -> CellBuilder<T> {
        CellBuilder::new(codec)
    }

    pub(crate) fn new(
        requests: mpsc::UnboundedSender<Request<T>>,
        state: watch::Receiver<CellState>,
        metrics: Arc<CellMetrics>,
        instance: String,
    ) -> Self {
        Self {
            requests,
            state,
            metrics,
            instance: Arc::from(instance),
        }
    }

    /// Subscribe to committed values.
    ///
    /// The first item is the latest committed value (initializing the cell
    /// if nothing has yet); each later commit follows in order.
    pub fn data(&self) -> Subscription<T> {
        let (sink, subscription) = Subscription::channel();
        if let Err(mpsc::error::SendError(Request::Subscribe { sink })) =
            self.requests.send(Request::Subscribe { sink })
        {
            let _ = sink.send(Err(CellError::closed()));
        }
        subscription
    }

    /// The latest committed value, initializing the cell if needed.
    ///
    /// Does not attach a subscription.
    pub async fn current(&self) -> CellResult<T> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Read { reply })
            .map_err(|_| CellError::closed())?;

        response.await.unwrap_or_else(|_| Err(CellError::closed()))
    }

    /// Queue `transform` and wait for it to be applied and committed.
    ///
    /// `transform` receives the latest committed value. An error from it is
    /// returned to this caller only and nothing is written. Dropping the
    /// returned future before the update starts cancels it.
    pub async fn update<F, E>(&self, transform: F) -> CellResult<T>
    where
        F: FnOnce(&T) -> Result<T, E> + Send + 'static,
        E: Into<BoxError>,
    {
        let transform: Transform<T> =
            Box::new(move |current: &T| transform(current).map_err(Into::into));
        let (reply, response) = oneshot::channel();

        self.requests
            .send(Request::Update { transform, reply })
            .map_err(|_| CellError::closed())?;

        response.await.unwrap_or_else(|_| Err(CellError::closed()))
    }

    /// Replace the value
    pub async fn set(&self, value: T) -> CellResult<T> {
        self.update(move |_: &T| Ok::<T, Infallible>(value)).await
    }

    /// Finish queued requests, release the path and stop the worker.
    ///
    /// Requests made after this fail with `CELL_CLOSED`. Closing twice is a
    /// no-op.
    pub async fn close(&self) -> CellResult<()> {
        let (ack, done) = oneshot::channel();
        if self.requests.send(Request::Close { ack }).is_err() {
            return Ok(());
        }
        // A dropped ack means the worker already shut down
        let _ = done.await;
        Ok(())
    }

    pub fn state(&self) -> CellState {
        *self.state.borrow()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Identifier carried in every log line of this cell
    pub fn instance_id(&self) -> &str {
        &self.instance
    }
}
