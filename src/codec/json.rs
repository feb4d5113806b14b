//! # JSON Codec

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Codec, CodecError};

/// Stores a value as a JSON document via serde
#[derive(Debug, Clone)]
pub struct JsonCodec<T> {
    default: T,
    pretty: bool,
}

impl<T> JsonCodec<T> {
    /// Create a codec whose default value is `default`
    pub fn new(default: T) -> Self {
        Self {
            default,
            pretty: false,
        }
    }

    /// Write indented JSON
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }
}

impl<T: Default> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn default_value(&self) -> T {
        self.default.clone()
    }

    fn decode(&self, input: &mut dyn Read) -> Result<T, CodecError> {
        serde_json::from_reader(input).map_err(|e| {
            if e.is_io() {
                CodecError::Io(e.into())
            } else {
                CodecError::corruption_with_source(
                    format!("invalid JSON at line {} column {}", e.line(), e.column()),
                    e,
                )
            }
        })
    }

    fn encode(&self, value: &T, output: &mut dyn Write) -> Result<(), CodecError> {
        let result = if self.pretty {
            serde_json::to_writer_pretty(&mut *output, value)
        } else {
            serde_json::to_writer(&mut *output, value)
        };
        result.map_err(|e| {
            if e.is_io() {
                CodecError::Io(e.into())
            } else {
                CodecError::Encode(e.to_string())
            }
        })
    }
}
