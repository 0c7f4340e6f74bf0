//! Logical SQL type descriptors.

use core::fmt;

/// Maximum precision a decimal column may declare.
pub const DECIMAL_MAX_PRECISION: usize = 38;

/// Default precision assumed when a decimal declares a scale but no precision.
pub const DECIMAL_DEFAULT_PRECISION: usize = DECIMAL_MAX_PRECISION;

/// Kind tag of the fourteen logical types carried by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter)]
#[repr(u8)]
pub enum TypeKind {
    /// SQL BOOLEAN.
    Boolean,
    /// 8-bit integer (TINYINT). Runtime representation widens to `i32`.
    Int1,
    /// 16-bit integer (SMALLINT). Runtime representation widens to `i32`.
    Int2,
    /// 32-bit integer (INT).
    Int4,
    /// 64-bit integer (BIGINT).
    Int8,
    /// IEEE-754 binary32 (REAL).
    Float4,
    /// IEEE-754 binary64 (DOUBLE).
    Float8,
    /// Arbitrary-precision decimal with optional precision/scale.
    Decimal,
    /// Character string, fixed or varying.
    Character,
    /// Octet string, fixed or varying.
    Octet,
    /// Calendar date.
    Date,
    /// Time of day.
    TimeOfDay,
    /// Point in time (date + time of day).
    TimePoint,
    /// Binary large object reference.
    Blob,
    /// Character large object reference.
    Clob,
}

impl TypeKind {
    /// Returns true for the exact and approximate numeric kinds.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int1
                | Self::Int2
                | Self::Int4
                | Self::Int8
                | Self::Float4
                | Self::Float8
                | Self::Decimal
        )
    }

    /// Returns true for `float4`/`float8`.
    pub const fn is_approximate(&self) -> bool {
        matches!(self, Self::Float4 | Self::Float8)
    }

    /// Returns the lower-case name used in plans and diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int1 => "int1",
            Self::Int2 => "int2",
            Self::Int4 => "int4",
            Self::Int8 => "int8",
            Self::Float4 => "float4",
            Self::Float8 => "float8",
            Self::Decimal => "decimal",
            Self::Character => "character",
            Self::Octet => "octet",
            Self::Date => "date",
            Self::TimeOfDay => "time_of_day",
            Self::TimePoint => "time_point",
            Self::Blob => "blob",
            Self::Clob => "clob",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical type with its parameters, as fixed at plan-compile time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// BOOLEAN.
    Boolean,
    /// TINYINT.
    Int1,
    /// SMALLINT.
    Int2,
    /// INT.
    Int4,
    /// BIGINT.
    Int8,
    /// REAL.
    Float4,
    /// DOUBLE.
    Float8,
    /// DECIMAL(p, s). Precision is capped at [`DECIMAL_MAX_PRECISION`].
    Decimal {
        /// Total number of digits, if declared.
        precision: Option<usize>,
        /// Digits right of the decimal point, if declared.
        scale: Option<usize>,
    },
    /// CHAR(n) / VARCHAR(n).
    Character {
        /// Declared length in characters, if any.
        length: Option<usize>,
        /// True for VARCHAR, false for the padded CHAR.
        varying: bool,
    },
    /// BINARY(n) / VARBINARY(n).
    Octet {
        /// Declared length in bytes, if any.
        length: Option<usize>,
        /// True for VARBINARY, false for the padded BINARY.
        varying: bool,
    },
    /// DATE.
    Date,
    /// TIME.
    TimeOfDay,
    /// TIMESTAMP.
    TimePoint,
    /// BLOB.
    Blob,
    /// CLOB.
    Clob,
}

impl DataType {
    /// Shorthand for an unparameterized decimal.
    pub const fn decimal() -> Self {
        Self::Decimal { precision: None, scale: None }
    }

    /// Shorthand for `DECIMAL(p, s)`.
    pub const fn decimal_ps(precision: usize, scale: usize) -> Self {
        Self::Decimal { precision: Some(precision), scale: Some(scale) }
    }

    /// Shorthand for `VARCHAR(n)`.
    pub const fn varchar(length: usize) -> Self {
        Self::Character { length: Some(length), varying: true }
    }

    /// Shorthand for unbounded varying characters.
    pub const fn character_varying() -> Self {
        Self::Character { length: None, varying: true }
    }

    /// Shorthand for `CHAR(n)`.
    pub const fn char_fixed(length: usize) -> Self {
        Self::Character { length: Some(length), varying: false }
    }

    /// Shorthand for `VARBINARY(n)`.
    pub const fn varbinary(length: usize) -> Self {
        Self::Octet { length: Some(length), varying: true }
    }

    /// The kind tag of this type.
    pub const fn kind(&self) -> TypeKind {
        match self {
            Self::Boolean => TypeKind::Boolean,
            Self::Int1 => TypeKind::Int1,
            Self::Int2 => TypeKind::Int2,
            Self::Int4 => TypeKind::Int4,
            Self::Int8 => TypeKind::Int8,
            Self::Float4 => TypeKind::Float4,
            Self::Float8 => TypeKind::Float8,
            Self::Decimal { .. } => TypeKind::Decimal,
            Self::Character { .. } => TypeKind::Character,
            Self::Octet { .. } => TypeKind::Octet,
            Self::Date => TypeKind::Date,
            Self::TimeOfDay => TypeKind::TimeOfDay,
            Self::TimePoint => TypeKind::TimePoint,
            Self::Blob => TypeKind::Blob,
            Self::Clob => TypeKind::Clob,
        }
    }

    /// True when values of this type carry a variable-length payload.
    pub const fn is_varlen(&self) -> bool {
        matches!(self.kind(), TypeKind::Character | TypeKind::Octet)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal { precision: Some(p), scale: Some(s) } => {
                write!(f, "decimal({p}, {s})")
            }
            Self::Character { length: Some(n), varying } => {
                write!(f, "{}({n})", if *varying { "varchar" } else { "char" })
            }
            Self::Octet { length: Some(n), varying } => {
                write!(f, "{}({n})", if *varying { "varbinary" } else { "binary" })
            }
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trip() {
        assert_eq!(DataType::decimal_ps(38, 2).kind(), TypeKind::Decimal);
        assert_eq!(DataType::varchar(10).kind(), TypeKind::Character);
        assert!(DataType::varchar(10).is_varlen());
        assert!(!DataType::Int4.is_varlen());
    }

    #[test]
    fn display_forms() {
        assert_eq!(DataType::decimal_ps(3, 2).to_string(), "decimal(3, 2)");
        assert_eq!(DataType::char_fixed(4).to_string(), "char(4)");
        assert_eq!(DataType::Int8.to_string(), "int8");
    }
}
