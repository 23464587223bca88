//! Binary decoder.
//!
//! Decoding is strict about structure: truncated input is
//! [`CodecError::UnexpectedEof`] and bytes left over after the value is
//! [`CodecError::TrailingBytes`]. The queue frames records itself, so a
//! record payload must decode to exactly one value.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Decodes a single value from its binary wire form.
///
/// The entire input must be consumed; a payload that contains more than
/// one value is rejected.
///
/// # Errors
///
/// Returns an error on truncated input, trailing bytes, invalid UTF-8 in
/// text strings, or wire types this codec does not support.
pub fn from_bytes(bytes: &[u8]) -> CodecResult<Value> {
    let mut cursor = Cursor::new(bytes);
    let value = cursor.read_value()?;
    if !cursor.is_at_end() {
        return Err(CodecError::TrailingBytes);
    }
    Ok(value)
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos == self.input.len()
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or(CodecError::IntegerOverflow)?;
        if end > self.input.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_byte(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_value(&mut self) -> CodecResult<Value> {
        let initial = self.take_byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => {
                let n = self.read_argument(info)?;
                let n = i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?;
                Ok(Value::Integer(n))
            }
            1 => {
                let n = self.read_argument(info)?;
                let n = i64::try_from(n).map_err(|_| CodecError::IntegerOverflow)?;
                Ok(Value::Integer(-1 - n))
            }
            2 => {
                let len = self.read_length(info)?;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            3 => {
                let len = self.read_length(info)?;
                let raw = self.take(len)?;
                let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => {
                let len = self.read_length(info)?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.read_value()?);
                }
                Ok(Value::Array(items))
            }
            5 => {
                let len = self.read_length(info)?;
                let mut pairs = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    let key = self.read_value()?;
                    let value = self.read_value()?;
                    pairs.push((key, value));
                }
                Ok(Value::Map(pairs))
            }
            7 => match info {
                20 => Ok(Value::Bool(false)),
                21 => Ok(Value::Bool(true)),
                22 => Ok(Value::Null),
                _ => Err(CodecError::unsupported_type(format!("simple value {info}"))),
            },
            _ => Err(CodecError::unsupported_type(format!("major type {major}"))),
        }
    }

    /// Reads the argument encoded by the additional-info bits.
    fn read_argument(&mut self, info: u8) -> CodecResult<u64> {
        match info {
            0..=23 => Ok(u64::from(info)),
            24 => Ok(u64::from(self.take_byte()?)),
            25 => {
                let raw = self.take(2)?;
                Ok(u64::from(u16::from_be_bytes([raw[0], raw[1]])))
            }
            26 => {
                let raw = self.take(4)?;
                Ok(u64::from(u32::from_be_bytes([
                    raw[0], raw[1], raw[2], raw[3],
                ])))
            }
            27 => {
                let raw = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                Ok(u64::from_be_bytes(buf))
            }
            // 28-30 are reserved, 31 is indefinite length.
            _ => Err(CodecError::unsupported_type(format!(
                "additional info {info}"
            ))),
        }
    }

    fn read_length(&mut self, info: u8) -> CodecResult<usize> {
        let n = self.read_argument(info)?;
        usize::try_from(n).map_err(|_| CodecError::IntegerOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_bytes;

    fn roundtrip(value: Value) {
        let bytes = to_bytes(&value).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn roundtrip_every_kind() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Integer(0));
        roundtrip(Value::Integer(i64::MAX));
        roundtrip(Value::Integer(i64::MIN));
        roundtrip(Value::Bytes(vec![0, 1, 2, 255]));
        roundtrip(Value::Text("temperature".into()));
        roundtrip(Value::Array(vec![Value::Integer(1), Value::from("two")]));
        roundtrip(Value::Map(vec![
            (Value::from("device"), Value::from("sensor-9")),
            (Value::from("reading"), Value::Integer(-40)),
        ]));
    }

    #[test]
    fn roundtrip_nested() {
        roundtrip(Value::Map(vec![(
            Value::from("batch"),
            Value::Array(vec![
                Value::Map(vec![(Value::from("seq"), Value::Integer(1))]),
                Value::Map(vec![(Value::from("seq"), Value::Integer(2))]),
            ]),
        )]));
    }

    #[test]
    fn empty_input_is_eof() {
        assert_eq!(from_bytes(&[]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn truncated_text_is_eof() {
        // Header claims 5 bytes of text, only 2 present.
        assert_eq!(
            from_bytes(&[0x65, b'h', b'i']),
            Err(CodecError::UnexpectedEof)
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(from_bytes(&[0x01, 0x02]), Err(CodecError::TrailingBytes));
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert_eq!(
            from_bytes(&[0x62, 0xff, 0xfe]),
            Err(CodecError::InvalidUtf8)
        );
    }

    #[test]
    fn indefinite_length_rejected() {
        // 0x5f = bytes, indefinite length.
        assert!(matches!(
            from_bytes(&[0x5f]),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn floats_rejected() {
        // 0xfb = double-precision float header.
        assert!(matches!(
            from_bytes(&[0xfb, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn u64_overflowing_i64_rejected() {
        let mut bytes = vec![0x1b];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(from_bytes(&bytes), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn non_shortest_form_accepted_on_input() {
        // 1 encoded with a one-byte argument instead of in the initial byte.
        assert_eq!(from_bytes(&[0x18, 0x01]).unwrap(), Value::Integer(1));
    }
}
