//! Thread-local decimal context.
//!
//! The decimal machinery keeps per-thread status bits and a rounding mode,
//! IEEE-decimal128-shaped but widened: internal precision 38, adjusted
//! exponent range [−24575, 24576]. Every worker entry point MUST call
//! [`ensure_decimal_context`] before the first decimal operation; the call is
//! idempotent per thread. Using decimals on a thread that skipped the call is
//! a programming error and aborts in debug builds.

use core::cell::Cell;

use bitflags::bitflags;

bitflags! {
    /// Status bits accumulated by decimal operations.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct DecimalStatus: u32 {
        /// The operation was invalid (digit overflow, 0/0, NaN input).
        const INVALID_OPERATION = 1;
        /// Rounding discarded non-zero digits.
        const INEXACT = 1 << 1;
        /// Rounding discarded digits (possibly all zero).
        const ROUNDED = 1 << 2;
        /// The adjusted exponent exceeded the context range.
        const OVERFLOW = 1 << 3;
    }
}

/// Rounding mode applied when digits are discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundingMode {
    /// Round to nearest, ties to even (the context default).
    #[default]
    HalfEven,
    /// Round toward zero.
    Down,
}

/// Largest adjusted exponent the context accepts.
pub const EMAX: i64 = 24576;

/// Smallest adjusted exponent the context accepts.
pub const EMIN: i64 = -24575;

/// Number of significant digits carried internally.
pub const MAX_DIGITS: u32 = 38;

thread_local! {
    static INITIALIZED: Cell<bool> = const { Cell::new(false) };
    static STATUS: Cell<DecimalStatus> = const { Cell::new(DecimalStatus::empty()) };
    static ROUNDING: Cell<RoundingMode> = const { Cell::new(RoundingMode::HalfEven) };
}

/// Initializes the calling thread's decimal context. Idempotent.
pub fn ensure_decimal_context() {
    INITIALIZED.with(|c| {
        if !c.get() {
            STATUS.with(|s| s.set(DecimalStatus::empty()));
            ROUNDING.with(|r| r.set(RoundingMode::HalfEven));
            c.set(true);
        }
    });
}

pub(crate) fn assert_initialized() {
    debug_assert!(
        INITIALIZED.with(Cell::get),
        "decimal context used before ensure_decimal_context()"
    );
    // release builds fall through; status accumulates from the default state
}

/// Returns the accumulated status bits of the calling thread.
pub fn status() -> DecimalStatus {
    STATUS.with(Cell::get)
}

/// Clears the calling thread's status bits.
pub fn clear_status() {
    STATUS.with(|s| s.set(DecimalStatus::empty()));
}

/// Clears the status bits and returns the previous value.
pub fn reset_status() -> DecimalStatus {
    STATUS.with(|s| s.replace(DecimalStatus::empty()))
}

pub(crate) fn raise(bits: DecimalStatus) {
    assert_initialized();
    STATUS.with(|s| s.set(s.get() | bits));
}

pub(crate) fn rounding() -> RoundingMode {
    ROUNDING.with(Cell::get)
}

/// Scoped override of the rounding mode; restores the previous mode on drop.
#[derive(Debug)]
pub struct RoundingGuard {
    saved: RoundingMode,
}

impl RoundingGuard {
    /// Installs `mode` for the current thread until the guard drops.
    pub fn new(mode: RoundingMode) -> Self {
        let saved = ROUNDING.with(|r| r.replace(mode));
        Self { saved }
    }
}

impl Drop for RoundingGuard {
    fn drop(&mut self) {
        ROUNDING.with(|r| r.set(self.saved));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accumulates_and_resets() {
        ensure_decimal_context();
        clear_status();
        raise(DecimalStatus::INEXACT);
        raise(DecimalStatus::ROUNDED);
        assert!(status().contains(DecimalStatus::INEXACT));
        assert!(status().contains(DecimalStatus::ROUNDED));
        assert!(!status().contains(DecimalStatus::INVALID_OPERATION));
        let prev = reset_status();
        assert!(prev.contains(DecimalStatus::INEXACT));
        assert!(status().is_empty());
    }

    #[test]
    fn rounding_guard_restores() {
        ensure_decimal_context();
        assert_eq!(rounding(), RoundingMode::HalfEven);
        {
            let _guard = RoundingGuard::new(RoundingMode::Down);
            assert_eq!(rounding(), RoundingMode::Down);
        }
        assert_eq!(rounding(), RoundingMode::HalfEven);
    }
}
