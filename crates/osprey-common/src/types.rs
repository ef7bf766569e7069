//! Attribute types and typed values for OspreyDB columns.

use crate::error::{OspreyError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Identifier for the attribute types OspreyDB columns can hold.
///
/// Attribute types are stored in the relation catalog and in index
/// metadata pages to drive key encoding and value comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttrType {
    /// 64-bit signed integer.
    Int = 0,
    /// 64-bit IEEE-754 floating point.
    Real = 1,
    /// Variable-length UTF-8 string with a fixed on-disk width.
    Str = 2,
}

impl AttrType {
    /// Decodes an attribute type byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(AttrType::Int),
            1 => Ok(AttrType::Real),
            2 => Ok(AttrType::Str),
            other => Err(OspreyError::Format(format!(
                "unknown attribute type byte {other}"
            ))),
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttrType::Int => "INT",
            AttrType::Real => "REAL",
            AttrType::Str => "STRING",
        };
        write!(f, "{}", name)
    }
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Real(f64),
    Str(String),
}

impl Value {
    /// Returns the attribute type of this value.
    pub fn attr_type(&self) -> AttrType {
        match self {
            Value::Int(_) => AttrType::Int,
            Value::Real(_) => AttrType::Real,
            Value::Str(_) => AttrType::Str,
        }
    }

    /// Compares two values under their declared type ordering.
    ///
    /// Integers and strings use their natural total order; reals use
    /// `f64::total_cmp` so the ordering is total even for NaN. Comparing
    /// values of different types is a `TypeMismatch` error.
    pub fn try_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Real(a), Value::Real(b)) => Ok(a.total_cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (a, b) => Err(OspreyError::TypeMismatch {
                expected: a.attr_type().to_string(),
                actual: b.attr_type().to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_type_display() {
        assert_eq!(AttrType::Int.to_string(), "INT");
        assert_eq!(AttrType::Real.to_string(), "REAL");
        assert_eq!(AttrType::Str.to_string(), "STRING");
    }

    #[test]
    fn test_attr_type_from_u8() {
        assert_eq!(AttrType::from_u8(0).unwrap(), AttrType::Int);
        assert_eq!(AttrType::from_u8(2).unwrap(), AttrType::Str);
        assert!(AttrType::from_u8(9).is_err());
    }

    #[test]
    fn test_value_attr_type() {
        assert_eq!(Value::Int(1).attr_type(), AttrType::Int);
        assert_eq!(Value::Real(1.5).attr_type(), AttrType::Real);
        assert_eq!(Value::from("x").attr_type(), AttrType::Str);
    }

    #[test]
    fn test_int_ordering() {
        assert_eq!(
            Value::Int(-3).try_cmp(&Value::Int(7)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Int(7).try_cmp(&Value::Int(7)).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_real_ordering_is_total() {
        assert_eq!(
            Value::Real(-0.5).try_cmp(&Value::Real(0.5)).unwrap(),
            Ordering::Less
        );
        // total_cmp orders NaN deterministically instead of panicking
        assert!(Value::Real(f64::NAN).try_cmp(&Value::Real(1.0)).is_ok());
    }

    #[test]
    fn test_string_ordering_is_lexical() {
        assert_eq!(
            Value::from("apple").try_cmp(&Value::from("banana")).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::from("b").try_cmp(&Value::from("b")).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_cross_type_comparison_fails() {
        let err = Value::Int(1).try_cmp(&Value::from("1")).unwrap_err();
        assert!(matches!(err, OspreyError::TypeMismatch { .. }));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Real(2.5).to_string(), "2.5");
        assert_eq!(Value::from("osprey").to_string(), "osprey");
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = Value::Str("hello".to_string());
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
