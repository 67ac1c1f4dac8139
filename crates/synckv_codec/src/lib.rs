//! # synckv Codec
//!
//! Deterministic encoding and decoding of typed values, and the key
//! ordering used by the storage engine.
//!
//! Every stored value is a tagged byte string: one tag byte naming the
//! type, then the payload. Decoding returns exactly the type that was
//! written; asking for a different type is a [`CodecError::TypeMismatch`],
//! never a coercion. Keys are non-empty UTF-8 strings ordered by their
//! bytes, which is the order prefix scans and cursors observe.
//!
//! ## Usage
//!
//! ```
//! use synckv_codec::{decode, encode, Value};
//!
//! let bytes = encode(&Value::Integer(i64::MAX));
//! assert_eq!(decode(&bytes).unwrap(), Value::Integer(i64::MAX));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod entry;
mod error;
mod value;

pub use decoder::{decode, decode_as};
pub use encoder::encode;
pub use entry::{Entry, Key, MAX_KEY_LENGTH};
pub use error::{CodecError, CodecResult};
pub use value::{Value, ValueType};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(value: Value) {
        let bytes = encode(&value);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, value);
        let typed = decode_as(&bytes, value.value_type()).unwrap();
        assert_eq!(typed, value);
    }

    #[test]
    fn roundtrip_integer_boundaries() {
        for n in [0, 1, -1, i64::from(i32::MIN), i64::from(i32::MAX), i64::MIN, i64::MAX] {
            roundtrip(Value::Integer(n));
        }
    }

    #[test]
    fn roundtrip_double_boundaries() {
        for f in [0.0, -0.0, f64::MIN, f64::MAX, f64::MIN_POSITIVE, f64::EPSILON] {
            let bytes = encode(&Value::Double(f));
            match decode(&bytes).unwrap() {
                Value::Double(back) => assert_eq!(back.to_bits(), f.to_bits()),
                other => panic!("decoded {other:?}"),
            }
        }
    }

    #[test]
    fn roundtrip_float_boundaries() {
        for f in [0.0f32, f32::MIN, f32::MAX, f32::MIN_POSITIVE] {
            roundtrip(Value::Float(f));
        }
    }

    #[test]
    fn roundtrip_nan_preserves_bits() {
        let bytes = encode(&Value::Double(f64::NAN));
        match decode(&bytes).unwrap() {
            Value::Double(back) => assert_eq!(back.to_bits(), f64::NAN.to_bits()),
            other => panic!("decoded {other:?}"),
        }
    }

    #[test]
    fn roundtrip_strings() {
        roundtrip(Value::String(String::new()));
        roundtrip(Value::String("value-string-001".to_string()));
        roundtrip(Value::String("héllo wörld \u{1F600}".to_string()));
        roundtrip(Value::String("x".repeat(64 * 1024)));
    }

    #[test]
    fn roundtrip_byte_arrays() {
        roundtrip(Value::ByteArray(Vec::new()));
        roundtrip(Value::ByteArray(vec![0, 255, 1, 254]));
        roundtrip(Value::ByteArray(vec![0xAB; 4096]));
    }

    #[test]
    fn roundtrip_booleans() {
        roundtrip(Value::Boolean(true));
        roundtrip(Value::Boolean(false));
    }

    proptest! {
        #[test]
        fn prop_integer_roundtrip(n in any::<i64>()) {
            roundtrip(Value::Integer(n));
        }

        #[test]
        fn prop_double_roundtrip(bits in any::<u64>()) {
            let f = f64::from_bits(bits);
            let bytes = encode(&Value::Double(f));
            match decode(&bytes).unwrap() {
                Value::Double(back) => prop_assert_eq!(back.to_bits(), bits),
                other => prop_assert!(false, "decoded {:?}", other),
            }
        }

        #[test]
        fn prop_string_roundtrip(s in ".*") {
            roundtrip(Value::String(s));
        }

        #[test]
        fn prop_bytes_roundtrip(b in proptest::collection::vec(any::<u8>(), 0..512)) {
            roundtrip(Value::ByteArray(b));
        }
    }
}
