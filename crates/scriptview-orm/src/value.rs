// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dynamic field values and their coercion into declared field kinds

use crate::error::{OrmError, Result};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use std::fmt;

const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
const U64_BOUND: f64 = 18_446_744_073_709_551_616.0;

/// Storage kind of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// i8, i16, i32, i64
    Int,
    /// u8, u16, u32, u64
    UInt,
    /// f32, f64
    Float,
    /// bool
    Bool,
    /// String
    Text,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Int => "integer",
            FieldKind::UInt => "unsigned integer",
            FieldKind::Float => "float",
            FieldKind::Bool => "boolean",
            FieldKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// A value crossing the boundary between scripts and typed records
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// SQL NULL / script null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
}

impl FieldValue {
    /// Short name of the value's kind, for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) => "integer",
            FieldValue::UInt(_) => "unsigned integer",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
        }
    }

    /// Coerce into the representation of `kind`.
    ///
    /// Scripts hand every number over as a float; integer kinds truncate it
    /// toward zero. Null passes through untouched so nullable fields can
    /// decide for themselves.
    pub fn coerce(self, field: &str, kind: FieldKind) -> Result<FieldValue> {
        let mismatch = |found: &'static str| OrmError::TypeMismatch {
            field: field.to_string(),
            expected: kind,
            found,
        };
        let out_of_range = |value: String| OrmError::OutOfRange {
            field: field.to_string(),
            value,
        };

        match (self, kind) {
            (FieldValue::Null, _) => Ok(FieldValue::Null),

            (FieldValue::Int(i), FieldKind::Int) => Ok(FieldValue::Int(i)),
            (FieldValue::UInt(u), FieldKind::Int) => i64::try_from(u)
                .map(FieldValue::Int)
                .map_err(|_| out_of_range(u.to_string())),
            (FieldValue::Float(f), FieldKind::Int) => {
                let t = f.trunc();
                // 2^63 is exactly representable; `as` would saturate past it
                if t >= -I64_BOUND && t < I64_BOUND {
                    Ok(FieldValue::Int(t as i64))
                } else {
                    Err(out_of_range(f.to_string()))
                }
            }

            (FieldValue::UInt(u), FieldKind::UInt) => Ok(FieldValue::UInt(u)),
            (FieldValue::Int(i), FieldKind::UInt) => u64::try_from(i)
                .map(FieldValue::UInt)
                .map_err(|_| out_of_range(i.to_string())),
            (FieldValue::Float(f), FieldKind::UInt) => {
                let t = f.trunc();
                if t >= 0.0 && t < U64_BOUND {
                    Ok(FieldValue::UInt(t as u64))
                } else {
                    Err(out_of_range(f.to_string()))
                }
            }

            (FieldValue::Float(f), FieldKind::Float) => Ok(FieldValue::Float(f)),
            (FieldValue::Int(i), FieldKind::Float) => Ok(FieldValue::Float(i as f64)),
            (FieldValue::UInt(u), FieldKind::Float) => Ok(FieldValue::Float(u as f64)),

            (FieldValue::Bool(b), FieldKind::Bool) => Ok(FieldValue::Bool(b)),
            // SQLite stores booleans as 0/1
            (FieldValue::Int(i), FieldKind::Bool) => Ok(FieldValue::Bool(i != 0)),

            (FieldValue::Text(s), FieldKind::Text) => Ok(FieldValue::Text(s)),

            (other, _) => Err(mismatch(other.kind_name())),
        }
    }

    /// Read a column value handed back by SQLite
    pub fn from_sql(value: ValueRef<'_>) -> FieldValue {
        match value {
            ValueRef::Null => FieldValue::Null,
            ValueRef::Integer(i) => FieldValue::Int(i),
            ValueRef::Real(f) => FieldValue::Float(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                FieldValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }

    /// Render as the plain string a raw query returns
    pub fn to_plain_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Int(i) => i.to_string(),
            FieldValue::UInt(u) => u.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            FieldValue::Null => SqlValue::Null,
            FieldValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
            FieldValue::Int(i) => SqlValue::Integer(*i),
            FieldValue::UInt(u) => SqlValue::Integer(
                i64::try_from(*u)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            ),
            FieldValue::Float(f) => SqlValue::Real(*f),
            FieldValue::Text(s) => return Ok(ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Rust types that can back a record field
pub trait FieldType: Sized {
    /// Declared kind
    const KIND: FieldKind;

    /// Read the field as a dynamic value
    fn to_value(&self) -> FieldValue;

    /// Store an already coerced dynamic value
    fn from_value(field: &str, value: FieldValue) -> Result<Self>;
}

fn unexpected(field: &str, kind: FieldKind, value: &FieldValue) -> OrmError {
    OrmError::TypeMismatch {
        field: field.to_string(),
        expected: kind,
        found: value.kind_name(),
    }
}

macro_rules! signed_field {
    ($($ty:ty),*) => {$(
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::Int;

            fn to_value(&self) -> FieldValue {
                FieldValue::Int(i64::from(*self))
            }

            fn from_value(field: &str, value: FieldValue) -> Result<Self> {
                match value.coerce(field, Self::KIND)? {
                    FieldValue::Int(i) => <$ty>::try_from(i).map_err(|_| OrmError::OutOfRange {
                        field: field.to_string(),
                        value: i.to_string(),
                    }),
                    other => Err(unexpected(field, Self::KIND, &other)),
                }
            }
        }
    )*};
}

macro_rules! unsigned_field {
    ($($ty:ty),*) => {$(
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::UInt;

            fn to_value(&self) -> FieldValue {
                FieldValue::UInt(u64::from(*self))
            }

            fn from_value(field: &str, value: FieldValue) -> Result<Self> {
                match value.coerce(field, Self::KIND)? {
                    FieldValue::UInt(u) => <$ty>::try_from(u).map_err(|_| OrmError::OutOfRange {
                        field: field.to_string(),
                        value: u.to_string(),
                    }),
                    other => Err(unexpected(field, Self::KIND, &other)),
                }
            }
        }
    )*};
}

signed_field!(i8, i16, i32, i64);
unsigned_field!(u8, u16, u32, u64);

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_value(field: &str, value: FieldValue) -> Result<Self> {
        match value.coerce(field, Self::KIND)? {
            FieldValue::Float(f) => Ok(f),
            other => Err(unexpected(field, Self::KIND, &other)),
        }
    }
}

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::Float;

    fn to_value(&self) -> FieldValue {
        FieldValue::Float(f64::from(*self))
    }

    fn from_value(field: &str, value: FieldValue) -> Result<Self> {
        f64::from_value(field, value).map(|f| f as f32)
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_value(field: &str, value: FieldValue) -> Result<Self> {
        match value.coerce(field, Self::KIND)? {
            FieldValue::Bool(b) => Ok(b),
            other => Err(unexpected(field, Self::KIND, &other)),
        }
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_value(field: &str, value: FieldValue) -> Result<Self> {
        match value.coerce(field, Self::KIND)? {
            FieldValue::Text(s) => Ok(s),
            other => Err(unexpected(field, Self::KIND, &other)),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn to_value(&self) -> FieldValue {
        match self {
            Some(v) => v.to_value(),
            None => FieldValue::Null,
        }
    }

    fn from_value(field: &str, value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_value(field, other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_truncates_into_integer_kinds() {
        assert_eq!(
            FieldValue::Float(3.0).coerce("count", FieldKind::Int).unwrap(),
            FieldValue::Int(3)
        );
        assert_eq!(
            FieldValue::Float(-2.7).coerce("delta", FieldKind::Int).unwrap(),
            FieldValue::Int(-2)
        );
        assert_eq!(
            FieldValue::Float(7.9).coerce("visits", FieldKind::UInt).unwrap(),
            FieldValue::UInt(7)
        );
    }

    #[test]
    fn test_negative_into_unsigned_is_rejected() {
        assert!(matches!(
            FieldValue::Int(-1).coerce("visits", FieldKind::UInt),
            Err(OrmError::OutOfRange { .. })
        ));
        assert!(FieldValue::Float(-3.5).coerce("visits", FieldKind::UInt).is_err());
    }

    #[test]
    fn test_huge_floats_are_out_of_range() {
        assert!(matches!(
            FieldValue::Float(1e30).coerce("id", FieldKind::Int),
            Err(OrmError::OutOfRange { .. })
        ));
        assert!(matches!(
            FieldValue::Float(-1e19).coerce("id", FieldKind::Int),
            Err(OrmError::OutOfRange { .. })
        ));
        assert!(matches!(
            FieldValue::Float(2e19).coerce("visits", FieldKind::UInt),
            Err(OrmError::OutOfRange { .. })
        ));
        assert!(FieldValue::Float(f64::NAN).coerce("id", FieldKind::Int).is_err());
        assert_eq!(
            FieldValue::Float(-9.0e18).coerce("id", FieldKind::Int).unwrap(),
            FieldValue::Int(-9_000_000_000_000_000_000)
        );
    }

    #[test]
    fn test_non_numeric_is_assigned_directly() {
        assert_eq!(
            FieldValue::from("bob").coerce("name", FieldKind::Text).unwrap(),
            FieldValue::from("bob")
        );
        assert!(matches!(
            FieldValue::from("bob").coerce("age", FieldKind::Int),
            Err(OrmError::TypeMismatch { found: "text", .. })
        ));
    }

    #[test]
    fn test_field_types_round_through_values() {
        assert_eq!(i32::from_value("a", FieldValue::Float(3.0)).unwrap(), 3);
        assert_eq!(u16::from_value("a", FieldValue::Float(3.0)).unwrap(), 3);
        assert!(u8::from_value("a", FieldValue::Int(300)).is_err());
        assert_eq!(Option::<i64>::from_value("a", FieldValue::Null).unwrap(), None);
        assert!(i64::from_value("a", FieldValue::Null).is_err());
        assert!(bool::from_value("a", FieldValue::Int(1)).unwrap());
    }
}
