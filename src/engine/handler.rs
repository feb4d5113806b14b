//! Corruption handlers
//!
//! Consulted once, during initialization, when the stored bytes fail to
//! decode. The returned value is committed over the corrupt file before the
//! cell becomes ready. An error from the handler makes the cell final.

use crate::codec::{BoxError, CodecError};

/// Produces a replacement when the stored value is corrupt
pub trait CorruptionHandler<T>: Send + Sync {
    fn handle_corruption(&self, error: &CodecError) -> Result<T, BoxError>;
}

/// Replaces a corrupt value with whatever `produce` returns
pub struct ReplaceOnCorruption<F> {
    produce: F,
}

impl<F> ReplaceOnCorruption<F> {
    pub fn new(produce: F) -> Self {
        Self { produce }
    }
}

impl<T, F> CorruptionHandler<T> for ReplaceOnCorruption<F>
where
    F: Fn(&CodecError) -> T + Send + Sync,
{
    fn handle_corruption(&self, error: &CodecError) -> Result<T, BoxError> {
        Ok((self.produce)(error))
    }
}
