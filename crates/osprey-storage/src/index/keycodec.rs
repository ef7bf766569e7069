//! Order-preserving key encoding.
//!
//! Keys are stored as byte strings whose memcmp order equals the typed
//! order of the values they encode: integers are sign-flipped big-endian,
//! reals use the monotone IEEE-754 transform (matching `f64::total_cmp`),
//! strings are their UTF-8 bytes.

use bytes::Bytes;
use osprey_common::{AttrType, OspreyError, Result, Value};

const SIGN_BIT: u64 = 1 << 63;

/// Encodes a value as an order-preserving key.
///
/// The value's type must match the index's declared attribute type.
pub fn encode_key(attr: AttrType, value: &Value) -> Result<Bytes> {
    if value.attr_type() != attr {
        return Err(OspreyError::TypeMismatch {
            expected: attr.to_string(),
            actual: value.attr_type().to_string(),
        });
    }

    let bytes = match value {
        Value::Int(v) => {
            let flipped = (*v as u64) ^ SIGN_BIT;
            Bytes::copy_from_slice(&flipped.to_be_bytes())
        }
        Value::Real(v) => {
            let bits = v.to_bits();
            // Negative floats reverse order under raw bit comparison
            let mono = if bits & SIGN_BIT != 0 { !bits } else { bits | SIGN_BIT };
            Bytes::copy_from_slice(&mono.to_be_bytes())
        }
        Value::Str(s) => Bytes::copy_from_slice(s.as_bytes()),
    };
    Ok(bytes)
}

/// Decodes an order-preserving key back into a value.
pub fn decode_key(attr: AttrType, key: &[u8]) -> Result<Value> {
    match attr {
        AttrType::Int => {
            let raw = fixed8(key)?;
            Ok(Value::Int((u64::from_be_bytes(raw) ^ SIGN_BIT) as i64))
        }
        AttrType::Real => {
            let mono = u64::from_be_bytes(fixed8(key)?);
            let bits = if mono & SIGN_BIT != 0 { mono ^ SIGN_BIT } else { !mono };
            Ok(Value::Real(f64::from_bits(bits)))
        }
        AttrType::Str => {
            let s = std::str::from_utf8(key)
                .map_err(|e| OspreyError::Format(format!("string key: {e}")))?;
            Ok(Value::Str(s.to_string()))
        }
    }
}

fn fixed8(key: &[u8]) -> Result<[u8; 8]> {
    key.try_into()
        .map_err(|_| OspreyError::IndexCorrupted(format!("numeric key of {} bytes", key.len())))
}
