//! Value encoding.

use crate::value::Value;

/// Encodes a value to its stored byte representation.
///
/// The format is one tag byte identifying the type followed by the
/// payload: integers and float bit patterns little-endian, strings as
/// UTF-8, byte arrays raw. Encoding is deterministic and lossless:
/// integers round-trip across the full `i64` range and floats keep
/// their exact bit pattern.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let tag = value.value_type().as_tag();
    match value {
        Value::String(s) => {
            let mut buf = Vec::with_capacity(1 + s.len());
            buf.push(tag);
            buf.extend_from_slice(s.as_bytes());
            buf
        }
        Value::Integer(n) => {
            let mut buf = Vec::with_capacity(9);
            buf.push(tag);
            buf.extend_from_slice(&n.to_le_bytes());
            buf
        }
        Value::Float(f) => {
            let mut buf = Vec::with_capacity(5);
            buf.push(tag);
            buf.extend_from_slice(&f.to_bits().to_le_bytes());
            buf
        }
        Value::ByteArray(b) => {
            let mut buf = Vec::with_capacity(1 + b.len());
            buf.push(tag);
            buf.extend_from_slice(b);
            buf
        }
        Value::Boolean(b) => vec![tag, u8::from(*b)],
        Value::Double(f) => {
            let mut buf = Vec::with_capacity(9);
            buf.push(tag);
            buf.extend_from_slice(&f.to_bits().to_le_bytes());
            buf
        }
    }
}
