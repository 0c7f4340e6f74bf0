//! Evaluation error taxonomy.

use core::fmt;

/// Kind of an evaluation failure carried inside a [`crate::Value`].
///
/// The evaluator never attaches payloads here; richer diagnostics accumulate
/// in the evaluator context on the execution side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[repr(u8)]
pub enum ErrorKind {
    /// Error kind is undefined or unknown to the caller.
    Undefined = 0,
    /// Arithmetic operation failed (division by zero, invalid decimal
    /// operation, NaN where a finite value is required).
    ArithmeticError,
    /// Value overflows the target representation.
    Overflow,
    /// Cast modified the value and the active loss policy forbids it.
    LostPrecision,
    /// Character/octet value is too long for the target length.
    LostPrecisionValueTooLong,
    /// String or other external representation failed to parse.
    FormatError,
    /// The expression uses a feature the engine does not support.
    Unsupported,
    /// A malformed input value was detected (e.g. a LIKE escape clause equal
    /// to the whole pattern).
    InvalidInputValue,
    /// Detailed error information has been recorded in the evaluator context.
    ErrorInfoProvided,
    /// Reading or writing a LOB file failed.
    LobFileIoError,
    /// A LOB reference does not resolve to a registered object.
    LobReferenceInvalid,
    /// Unexpected internal fault; surfaced instead of aborting in release.
    Unknown,
}

impl ErrorKind {
    /// Returns the lower-case name used in diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::ArithmeticError => "arithmetic_error",
            Self::Overflow => "overflow",
            Self::LostPrecision => "lost_precision",
            Self::LostPrecisionValueTooLong => "lost_precision_value_too_long",
            Self::FormatError => "format_error",
            Self::Unsupported => "unsupported",
            Self::InvalidInputValue => "invalid_input_value",
            Self::ErrorInfoProvided => "error_info_provided",
            Self::LobFileIoError => "lob_file_io_error",
            Self::LobReferenceInvalid => "lob_reference_invalid",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in ErrorKind::iter() {
            assert!(seen.insert(kind.as_str()), "duplicate name {kind}");
        }
    }
}
