//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes into a value.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// Input ended before the value was complete.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input contained bytes after the end of the value.
    #[error("trailing bytes after value")]
    TrailingBytes,

    /// Text string was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Integer does not fit the target type.
    #[error("integer overflow")]
    IntegerOverflow,

    /// Wire type is not supported by this codec.
    #[error("unsupported type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported wire type.
        type_name: String,
    },
}

impl CodecError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}
