//! Binary encoder.
//!
//! The wire form is a CBOR subset: major types 0-5 plus the simple values
//! for `false`, `true`, and `null`. Lengths are always definite and use
//! the shortest form, so identical values produce identical bytes.

use crate::error::CodecResult;
use crate::value::Value;

/// Encodes a value to its binary wire form.
///
/// The output is deterministic: the same value always produces the same
/// bytes, and the output is never empty.
///
/// # Errors
///
/// Returns an error if a nested value cannot be encoded.
pub fn to_bytes(value: &Value) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(16);
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> CodecResult<()> {
    match value {
        Value::Null => out.push(0xf6),
        Value::Bool(false) => out.push(0xf4),
        Value::Bool(true) => out.push(0xf5),
        Value::Integer(n) => write_integer(out, *n),
        Value::Bytes(b) => {
            write_header(out, 2, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::Text(s) => {
            write_header(out, 3, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            write_header(out, 4, items.len() as u64);
            for item in items {
                write_value(out, item)?;
            }
        }
        Value::Map(pairs) => {
            write_header(out, 5, pairs.len() as u64);
            for (k, v) in pairs {
                write_value(out, k)?;
                write_value(out, v)?;
            }
        }
    }
    Ok(())
}

fn write_integer(out: &mut Vec<u8>, n: i64) {
    if n >= 0 {
        #[allow(clippy::cast_sign_loss)]
        write_header(out, 0, n as u64);
    } else {
        // Negative integers carry -1 - n as the argument: -1 -> 0, -2 -> 1.
        #[allow(clippy::cast_sign_loss)]
        write_header(out, 1, (-1 - n) as u64);
    }
}

/// Writes a major type and its argument in shortest form.
#[allow(clippy::cast_possible_truncation)]
fn write_header(out: &mut Vec<u8>, major: u8, argument: u64) {
    let tag = major << 5;
    if argument < 24 {
        out.push(tag | argument as u8);
    } else if argument <= u64::from(u8::MAX) {
        out.push(tag | 24);
        out.push(argument as u8);
    } else if argument <= u64::from(u16::MAX) {
        out.push(tag | 25);
        out.extend_from_slice(&(argument as u16).to_be_bytes());
    } else if argument <= u64::from(u32::MAX) {
        out.push(tag | 26);
        out.extend_from_slice(&(argument as u32).to_be_bytes());
    } else {
        out.push(tag | 27);
        out.extend_from_slice(&argument.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_are_one_byte() {
        assert_eq!(to_bytes(&Value::Integer(0)).unwrap(), vec![0x00]);
        assert_eq!(to_bytes(&Value::Integer(23)).unwrap(), vec![0x17]);
        assert_eq!(to_bytes(&Value::Integer(-1)).unwrap(), vec![0x20]);
    }

    #[test]
    fn integers_use_shortest_form() {
        assert_eq!(to_bytes(&Value::Integer(24)).unwrap(), vec![0x18, 24]);
        assert_eq!(to_bytes(&Value::Integer(256)).unwrap(), vec![0x19, 1, 0]);
        assert_eq!(
            to_bytes(&Value::Integer(65536)).unwrap(),
            vec![0x1a, 0, 1, 0, 0]
        );
    }

    #[test]
    fn text_is_length_prefixed() {
        assert_eq!(
            to_bytes(&Value::Text("abc".into())).unwrap(),
            vec![0x63, b'a', b'b', b'c']
        );
    }

    #[test]
    fn simple_values() {
        assert_eq!(to_bytes(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_bytes(&Value::Bool(false)).unwrap(), vec![0xf4]);
        assert_eq!(to_bytes(&Value::Bool(true)).unwrap(), vec![0xf5]);
    }

    #[test]
    fn output_is_never_empty() {
        for v in [
            Value::Null,
            Value::Text(String::new()),
            Value::Bytes(Vec::new()),
            Value::Array(Vec::new()),
            Value::Map(Vec::new()),
        ] {
            assert!(!to_bytes(&v).unwrap().is_empty());
        }
    }

    #[test]
    fn identical_values_encode_identically() {
        let a = Value::Map(vec![(Value::from("k"), Value::Integer(1))]);
        let b = a.clone();
        assert_eq!(to_bytes(&a).unwrap(), to_bytes(&b).unwrap());
    }
}
