//! # Codecs
//!
//! A codec converts a cell value to and from the bytes stored on disk. The
//! stored layout is exactly the codec's output; the store adds no framing.
//!
//! `decode` must report structurally invalid bytes as
//! [`CodecError::Corruption`], which is what routes a payload to the
//! corruption handler. Any other failure is treated as an I/O problem.

mod json;

pub use json::JsonCodec;

use std::io::{self, Read, Write};

use thiserror::Error;

/// Boxed error used for failures raised by user callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// The stored bytes cannot be decoded
    #[error("Corrupted payload: {message}")]
    Corruption {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The value cannot be encoded
    #[error("Failed to encode value: {0}")]
    Encode(String),

    /// The underlying reader or writer failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Create a corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        CodecError::Corruption {
            message: message.into(),
            source: None,
        }
    }

    /// Create a corruption error with the decoder's own error as source
    pub fn corruption_with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CodecError::Corruption {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Whether this is the corruption signal
    pub fn is_corruption(&self) -> bool {
        matches!(self, CodecError::Corruption { .. })
    }
}

/// Serialization contract for a cell value
pub trait Codec<T>: Send + Sync {
    /// Value used when nothing is stored yet
    fn default_value(&self) -> T;

    /// Unmarshal a value from `input`
    fn decode(&self, input: &mut dyn Read) -> Result<T, CodecError>;

    /// Marshal `value` to `output`
    fn encode(&self, value: &T, output: &mut dyn Write) -> Result<(), CodecError>;
}

/// Encode `value` into a fresh buffer
pub fn encode_to_vec<T>(codec: &dyn Codec<T>, value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buffer = Vec::new();
    codec.encode(value, &mut buffer)?;
    Ok(buffer)
}

/// Decode a value from an in-memory buffer
pub fn decode_from_slice<T>(codec: &dyn Codec<T>, mut bytes: &[u8]) -> Result<T, CodecError> {
    codec.decode(&mut bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LineCodec;

    impl Codec<String> for LineCodec {
        fn default_value(&self) -> String {
            String::new()
        }

        fn decode(&self, input: &mut dyn Read) -> Result<String, CodecError> {
            let mut text = String::new();
            input
                .read_to_string(&mut text)
                .map_err(|e| CodecError::corruption_with_source("not UTF-8", e))?;
            Ok(text)
        }

        fn encode(&self, value: &String, output: &mut dyn Write) -> Result<(), CodecError> {
            output.write_all(value.as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn test_encode_decode_helpers() {
        let bytes = encode_to_vec(&LineCodec, &"hello".to_string()).unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(decode_from_slice(&LineCodec, &bytes).unwrap(), "hello");
    }

    #[test]
    fn test_invalid_utf8_is_corruption() {
        let err = decode_from_slice(&LineCodec, &[0xff, 0xfe]).unwrap_err();
        assert!(err.is_corruption());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_io_error_is_not_corruption() {
        let err = CodecError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!err.is_corruption());
        assert!(format!("{}", err).contains("boom"));
    }
}
