//! Value decoding.

use crate::error::{CodecError, CodecResult};
use crate::value::{Value, ValueType};

/// Decodes stored bytes into the value they were encoded from.
///
/// The type is taken from the leading tag byte. Malformed input (empty
/// buffer, unknown tag, wrong payload length, invalid UTF-8) is reported
/// as [`CodecError::Corrupted`].
pub fn decode(bytes: &[u8]) -> CodecResult<Value> {
    let (&tag, payload) = bytes
        .split_first()
        .ok_or_else(|| CodecError::corrupted("empty value bytes"))?;
    let value_type = ValueType::from_tag(tag)
        .ok_or_else(|| CodecError::corrupted(format!("unknown value tag {tag:#04x}")))?;

    match value_type {
        ValueType::String => {
            let s = std::str::from_utf8(payload)
                .map_err(|_| CodecError::corrupted("string payload is not valid UTF-8"))?;
            Ok(Value::String(s.to_string()))
        }
        ValueType::Integer => {
            let bits = fixed_payload::<8>(payload, "integer")?;
            Ok(Value::Integer(i64::from_le_bytes(bits)))
        }
        ValueType::Float => {
            let bits = fixed_payload::<4>(payload, "float")?;
            Ok(Value::Float(f32::from_bits(u32::from_le_bytes(bits))))
        }
        ValueType::ByteArray => Ok(Value::ByteArray(payload.to_vec())),
        ValueType::Boolean => {
            let bits = fixed_payload::<1>(payload, "boolean")?;
            match bits[0] {
                0 => Ok(Value::Boolean(false)),
                1 => Ok(Value::Boolean(true)),
                other => Err(CodecError::corrupted(format!(
                    "invalid boolean payload {other:#04x}"
                ))),
            }
        }
        ValueType::Double => {
            let bits = fixed_payload::<8>(payload, "double")?;
            Ok(Value::Double(f64::from_bits(u64::from_le_bytes(bits))))
        }
    }
}

/// Decodes stored bytes, requiring the stored type to match `expected`.
///
/// A valid value of a different type is a [`CodecError::TypeMismatch`],
/// never a silent coercion.
pub fn decode_as(bytes: &[u8], expected: ValueType) -> CodecResult<Value> {
    let value = decode(bytes)?;
    let actual = value.value_type();
    if actual != expected {
        return Err(CodecError::TypeMismatch { expected, actual });
    }
    Ok(value)
}

fn fixed_payload<const N: usize>(payload: &[u8], what: &str) -> CodecResult<[u8; N]> {
    payload.try_into().map_err(|_| {
        CodecError::corrupted(format!(
            "{what} payload must be {N} bytes, got {}",
            payload.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;

    #[test]
    fn empty_input_is_corrupted() {
        assert!(matches!(decode(&[]), Err(CodecError::Corrupted { .. })));
    }

    #[test]
    fn unknown_tag_is_corrupted() {
        assert!(matches!(decode(&[0xFF]), Err(CodecError::Corrupted { .. })));
    }

    #[test]
    fn truncated_integer_is_corrupted() {
        let mut bytes = encode(&Value::Integer(42));
        bytes.pop();
        assert!(matches!(decode(&bytes), Err(CodecError::Corrupted { .. })));
    }

    #[test]
    fn trailing_bytes_on_boolean_are_corrupted() {
        let mut bytes = encode(&Value::Boolean(true));
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(CodecError::Corrupted { .. })));
    }

    #[test]
    fn invalid_utf8_string_is_corrupted() {
        let bytes = vec![ValueType::String.as_tag(), 0xFF, 0xFE];
        assert!(matches!(decode(&bytes), Err(CodecError::Corrupted { .. })));
    }

    #[test]
    fn decode_as_rejects_wrong_type() {
        let bytes = encode(&Value::ByteArray(vec![1, 2, 3]));
        let err = decode_as(&bytes, ValueType::String).unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch {
                expected: ValueType::String,
                actual: ValueType::ByteArray,
            }
        );
    }

    #[test]
    fn decode_as_accepts_matching_type() {
        let bytes = encode(&Value::Double(1.5));
        assert_eq!(
            decode_as(&bytes, ValueType::Double).unwrap(),
            Value::Double(1.5)
        );
    }

    #[test]
    fn float_and_double_do_not_coerce() {
        let bytes = encode(&Value::Float(1.0));
        assert!(matches!(
            decode_as(&bytes, ValueType::Double),
            Err(CodecError::TypeMismatch { .. })
        ));
    }
}
