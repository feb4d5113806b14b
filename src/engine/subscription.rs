//! Subscriptions to committed values
//!
//! A subscription first yields the value current when it attached, then
//! every later commit in order. If the cell becomes final it yields the
//! terminal error once and ends. Closing the cell ends it without an error.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use super::errors::CellError;

pub(crate) type Sink<T> = mpsc::UnboundedSender<Result<T, CellError>>;

/// Live sequence of committed values
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<Result<T, CellError>>,
}

impl<T> Subscription<T> {
    pub(crate) fn channel() -> (Sink<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next value. `None` once the cell is closed or final.
    pub async fn recv(&mut self) -> Option<Result<T, CellError>> {
        self.rx.recv().await
    }

    /// Take an already delivered value without waiting
    pub fn try_recv(&mut self) -> Option<Result<T, CellError>> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, CellError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
