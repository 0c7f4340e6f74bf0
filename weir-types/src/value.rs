//! Tagged runtime value.

use core::fmt;
use core::str::Utf8Error;

use crate::datetime::{Date, TimeOfDay, TimePoint};
use crate::decimal::Triple;
use crate::error::ErrorKind;
use crate::lob::LobReference;

/// A character-string value.
///
/// Text is byte-backed: the engine compares strings as raw bytes and the wire
/// may carry payloads that fail UTF-8 validation, which specific operations
/// (LIKE) map to NULL rather than rejecting up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Text(Box<[u8]>);

impl Text {
    /// Creates text from raw bytes.
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The value as a string slice, validating UTF-8.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        core::str::from_utf8(&self.0)
    }

    /// Byte length of the value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the value holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenation of two text values.
    pub fn concat(&self, other: &Text) -> Text {
        let mut buf = Vec::with_capacity(self.0.len() + other.0.len());
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&other.0);
        Text(buf.into())
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().into())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Self(s.into_bytes().into())
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// An octet-string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Octet(Box<[u8]>);

impl Octet {
    /// Creates an octet string from raw bytes.
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte length of the value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the value holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Octet {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl From<Vec<u8>> for Octet {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl fmt::Display for Octet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Discriminant of a [`Value`], including the non-value states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueIndex {
    /// SQL NULL.
    Null,
    /// Evaluation failure sentinel.
    Error,
    /// Boolean payload.
    Boolean,
    /// 32-bit integer payload (also carries int1/int2 at runtime).
    Int4,
    /// 64-bit integer payload.
    Int8,
    /// binary32 payload.
    Float4,
    /// binary64 payload.
    Float8,
    /// Decimal triple payload.
    Decimal,
    /// Character payload.
    Character,
    /// Octet payload.
    Octet,
    /// Date payload.
    Date,
    /// Time-of-day payload.
    TimeOfDay,
    /// Time-point payload.
    TimePoint,
    /// Blob reference payload.
    Blob,
    /// Clob reference payload.
    Clob,
}

/// The tagged variant flowing between expression nodes and operators.
///
/// `Null` (operand missing) and `Error` (evaluation failed) are distinct
/// states and never conflated: combinators must test [`Value::is_error`]
/// before [`Value::is_null`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Evaluation failure; the kind describes what went wrong.
    Error(ErrorKind),
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer value. `int1`/`int2` widen to this at runtime.
    Int4(i32),
    /// 64-bit integer value.
    Int8(i64),
    /// binary32 value.
    Float4(f32),
    /// binary64 value.
    Float8(f64),
    /// Finite decimal value in reduced form.
    Decimal(Triple),
    /// Character string.
    Character(Text),
    /// Octet string.
    Octet(Octet),
    /// Calendar date.
    Date(Date),
    /// Time of day.
    TimeOfDay(TimeOfDay),
    /// Point in time.
    TimePoint(TimePoint),
    /// Binary large object reference.
    Blob(LobReference),
    /// Character large object reference.
    Clob(LobReference),
}

impl Value {
    /// True iff the value is SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True iff the value carries an evaluation error.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// True iff the value is neither NULL nor an error.
    pub const fn has_value(&self) -> bool {
        !self.is_null() && !self.is_error()
    }

    /// The discriminant of the stored state.
    pub const fn type_index(&self) -> ValueIndex {
        match self {
            Self::Null => ValueIndex::Null,
            Self::Error(_) => ValueIndex::Error,
            Self::Boolean(_) => ValueIndex::Boolean,
            Self::Int4(_) => ValueIndex::Int4,
            Self::Int8(_) => ValueIndex::Int8,
            Self::Float4(_) => ValueIndex::Float4,
            Self::Float8(_) => ValueIndex::Float8,
            Self::Decimal(_) => ValueIndex::Decimal,
            Self::Character(_) => ValueIndex::Character,
            Self::Octet(_) => ValueIndex::Octet,
            Self::Date(_) => ValueIndex::Date,
            Self::TimeOfDay(_) => ValueIndex::TimeOfDay,
            Self::TimePoint(_) => ValueIndex::TimePoint,
            Self::Blob(_) => ValueIndex::Blob,
            Self::Clob(_) => ValueIndex::Clob,
        }
    }

    /// The error kind, when the value is an error.
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Unchecked boolean accessor. A kind mismatch is a caller bug.
    #[track_caller]
    pub fn to_boolean(&self) -> bool {
        match self {
            Self::Boolean(v) => *v,
            other => mismatch("boolean", other),
        }
    }

    /// Unchecked int4 accessor.
    #[track_caller]
    pub fn to_int4(&self) -> i32 {
        match self {
            Self::Int4(v) => *v,
            other => mismatch("int4", other),
        }
    }

    /// Unchecked int8 accessor.
    #[track_caller]
    pub fn to_int8(&self) -> i64 {
        match self {
            Self::Int8(v) => *v,
            other => mismatch("int8", other),
        }
    }

    /// Unchecked float4 accessor.
    #[track_caller]
    pub fn to_float4(&self) -> f32 {
        match self {
            Self::Float4(v) => *v,
            other => mismatch("float4", other),
        }
    }

    /// Unchecked float8 accessor.
    #[track_caller]
    pub fn to_float8(&self) -> f64 {
        match self {
            Self::Float8(v) => *v,
            other => mismatch("float8", other),
        }
    }

    /// Unchecked decimal accessor.
    #[track_caller]
    pub fn to_decimal(&self) -> Triple {
        match self {
            Self::Decimal(v) => *v,
            other => mismatch("decimal", other),
        }
    }

    /// Unchecked character accessor.
    #[track_caller]
    pub fn to_character(&self) -> &Text {
        match self {
            Self::Character(v) => v,
            other => mismatch("character", other),
        }
    }

    /// Unchecked octet accessor.
    #[track_caller]
    pub fn to_octet(&self) -> &Octet {
        match self {
            Self::Octet(v) => v,
            other => mismatch("octet", other),
        }
    }

    /// Unchecked date accessor.
    #[track_caller]
    pub fn to_date(&self) -> Date {
        match self {
            Self::Date(v) => *v,
            other => mismatch("date", other),
        }
    }

    /// Unchecked time-of-day accessor.
    #[track_caller]
    pub fn to_time_of_day(&self) -> TimeOfDay {
        match self {
            Self::TimeOfDay(v) => *v,
            other => mismatch("time_of_day", other),
        }
    }

    /// Unchecked time-point accessor.
    #[track_caller]
    pub fn to_time_point(&self) -> TimePoint {
        match self {
            Self::TimePoint(v) => *v,
            other => mismatch("time_point", other),
        }
    }

    /// Unchecked LOB accessor; accepts both blob and clob.
    #[track_caller]
    pub fn to_lob(&self) -> &LobReference {
        match self {
            Self::Blob(v) | Self::Clob(v) => v,
            other => mismatch("blob/clob", other),
        }
    }
}

#[track_caller]
fn mismatch(expected: &str, got: &Value) -> ! {
    panic!("value kind mismatch: expected {expected}, got {:?}", got.type_index())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::Error(kind) => write!(f, "<error:{kind}>"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int4(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Float4(v) => write!(f, "{v}"),
            Self::Float8(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Character(v) => write!(f, "{v}"),
            Self::Octet(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::TimeOfDay(v) => write!(f, "{v}"),
            Self::TimePoint(v) => write!(f, "{v}"),
            Self::Blob(v) => write!(f, "blob({})", v.id),
            Self::Clob(v) => write!(f, "clob({})", v.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_error_are_distinct() {
        assert!(Value::Null.is_null());
        assert!(!Value::Null.is_error());
        let e = Value::Error(ErrorKind::ArithmeticError);
        assert!(e.is_error());
        assert!(!e.is_null());
        assert_eq!(e.error_kind(), Some(ErrorKind::ArithmeticError));
    }

    #[test]
    fn text_compares_as_raw_bytes() {
        let a = Text::from("abc");
        let b = Text::from("abd");
        assert!(a < b);
        assert_eq!(a, Text::from_bytes(*b"abc"));
    }

    #[test]
    #[should_panic(expected = "value kind mismatch")]
    fn accessor_mismatch_panics() {
        let _ = Value::Int4(1).to_boolean();
    }
}
