//! Operator enumerations of the scalar IR.

use core::fmt;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum UnaryOp {
    /// `+e` — pass the operand through unchanged.
    Plus,
    /// `-e` — numeric sign inversion.
    SignInversion,
    /// `NOT e` — three-valued negation.
    ConditionalNot,
    /// `LENGTH(e)` — byte length of a character value.
    Length,
    /// `e IS NULL`.
    IsNull,
    /// `e IS TRUE`.
    IsTrue,
    /// `e IS FALSE`.
    IsFalse,
    /// `e IS UNKNOWN`.
    IsUnknown,
}

impl UnaryOp {
    /// True for the `IS ...` predicates, which accept NULL operands.
    pub const fn accepts_null(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsTrue | Self::IsFalse | Self::IsUnknown)
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum BinaryOp {
    /// `l + r`.
    Add,
    /// `l - r`.
    Subtract,
    /// `l * r`.
    Multiply,
    /// `l / r`.
    Divide,
    /// `l % r` (int4/int8/decimal only).
    Remainder,
    /// `l || r` string concatenation.
    Concat,
    /// Three-valued `AND`.
    ConditionalAnd,
    /// Three-valued `OR`.
    ConditionalOr,
}

impl BinaryOp {
    /// True for `AND`/`OR`, which handle NULL operands themselves.
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::ConditionalAnd | Self::ConditionalOr)
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum CompareOp {
    /// `=`.
    Equal,
    /// `<>`.
    NotEqual,
    /// `>`.
    Greater,
    /// `>=`.
    GreaterEqual,
    /// `<`.
    Less,
    /// `<=`.
    LessEqual,
}

/// Pattern-match flavor of a match node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    /// SQL `LIKE`.
    Like,
    /// SQL `SIMILAR TO`; in the parser's operator set but unsupported by the
    /// evaluator.
    Similar,
}

/// Policy applied when a cast would lose precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum LossPolicy {
    /// Return the modified value silently.
    Ignore,
    /// Round down (currently unsupported).
    Floor,
    /// Round up (currently unsupported).
    Ceil,
    /// Return NULL to indicate the inexact conversion.
    Unknown,
    /// Emit a diagnostic and return the modified value.
    Warn,
    /// Assignment-conversion rules: like `Error`, and additionally forbids
    /// approximate-to-exact numeric casts outright.
    Implicit,
    /// Return a `lost_precision` error.
    #[default]
    Error,
}

impl LossPolicy {
    /// The lower-case name used in diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Unknown => "unknown",
            Self::Warn => "warn",
            Self::Implicit => "implicit",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LossPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(UnaryOp::IsNull, true; "is null")]
    #[test_case(UnaryOp::IsTrue, true; "is true")]
    #[test_case(UnaryOp::IsFalse, true; "is false")]
    #[test_case(UnaryOp::IsUnknown, true; "is unknown")]
    #[test_case(UnaryOp::Plus, false; "plus")]
    #[test_case(UnaryOp::Length, false; "length")]
    fn null_acceptance(op: UnaryOp, expected: bool) {
        assert_eq!(op.accepts_null(), expected);
    }

    #[test]
    fn conditional_binaries() {
        assert!(BinaryOp::ConditionalAnd.is_conditional());
        assert!(BinaryOp::ConditionalOr.is_conditional());
        assert!(!BinaryOp::Add.is_conditional());
    }

    #[test]
    fn default_loss_policy_is_error() {
        assert_eq!(LossPolicy::default(), LossPolicy::Error);
        assert_eq!(LossPolicy::Implicit.to_string(), "implicit");
    }
}
