//! # DuraQ Codec
//!
//! Self-describing binary encoding for queue records.
//!
//! Records stored by the queue are opaque length-prefixed payloads; this
//! crate defines what goes inside the payload. The wire form is a CBOR
//! subset chosen for two properties the queue relies on:
//!
//! - `decode(encode(v)) == v` for every encodable value
//! - encoded output is never empty, so a record frame's length is never
//!   zero (a zero length is reserved for tombstones)
//!
//! ## Usage
//!
//! Concrete record types implement [`Encode`] and [`Decode`]. The traits
//! are also implemented for the primitive types a queue commonly carries,
//! and for the dynamic [`Value`] when the schema is open:
//!
//! ```
//! use duraq_codec::{Decode, Encode};
//!
//! let bytes = "Hello 1".to_string().encode().unwrap();
//! assert_eq!(String::decode(&bytes).unwrap(), "Hello 1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::from_bytes;
pub use encoder::to_bytes;
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Trait for record types that can be serialised for storage.
pub trait Encode {
    /// Encodes this record to its binary wire form.
    ///
    /// The output must be non-empty and deterministic.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for record types that can be reconstructed from storage.
pub trait Decode: Sized {
    /// Decodes a record from its binary wire form.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_bytes(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_bytes(bytes)
    }
}

impl Encode for String {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_bytes(&Value::Text(self.clone()))
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        match from_bytes(bytes)? {
            Value::Text(s) => Ok(s),
            other => Err(CodecError::decoding_failed(format!(
                "expected text, got {other:?}"
            ))),
        }
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_bytes(&Value::Bytes(self.clone()))
    }
}

impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        match from_bytes(bytes)? {
            Value::Bytes(b) => Ok(b),
            other => Err(CodecError::decoding_failed(format!(
                "expected bytes, got {other:?}"
            ))),
        }
    }
}

impl Encode for i64 {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_bytes(&Value::Integer(*self))
    }
}

impl Decode for i64 {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        match from_bytes(bytes)? {
            Value::Integer(n) => Ok(n),
            other => Err(CodecError::decoding_failed(format!(
                "expected integer, got {other:?}"
            ))),
        }
    }
}

impl Encode for u64 {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        let n = i64::try_from(*self).map_err(|_| CodecError::IntegerOverflow)?;
        to_bytes(&Value::Integer(n))
    }
}

impl Decode for u64 {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        match from_bytes(bytes)? {
            Value::Integer(n) => u64::try_from(n).map_err(|_| CodecError::IntegerOverflow),
            other => Err(CodecError::decoding_failed(format!(
                "expected integer, got {other:?}"
            ))),
        }
    }
}

impl Encode for bool {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_bytes(&Value::Bool(*self))
    }
}

impl Decode for bool {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        match from_bytes(bytes)? {
            Value::Bool(b) => Ok(b),
            other => Err(CodecError::decoding_failed(format!(
                "expected bool, got {other:?}"
            ))),
        }
    }
}
