//! Arbitrary-precision decimal arithmetic.
//!
//! Values are carried as a [`Triple`]: a 128-bit unsigned coefficient with the
//! sign held separately, plus a base-10 exponent. Computation goes through
//! [`Decimal`], which additionally represents the special values (`±Infinity`,
//! `NaN`) that arise mid-conversion but are never stored. All operations work
//! against the thread-local [`context`]: 38 significant digits, adjusted
//! exponent range [−24575, 24576], status bits checked after each operation.

use core::cmp::Ordering;
use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Rem, Sub};

use ethnum::U256;

pub mod coding;
pub mod context;

pub use context::{
    clear_status, ensure_decimal_context, reset_status, status, DecimalStatus, RoundingGuard,
    RoundingMode, EMAX, EMIN, MAX_DIGITS,
};

/// Largest coefficient value with [`MAX_DIGITS`] digits (38 nines).
pub const MAX_COEFFICIENT: u128 = 10u128.pow(MAX_DIGITS) - 1;

// a 38-digit coefficient always fits the 128-bit representation with room
// for one carry digit during rounding
static_assertions::const_assert!(MAX_COEFFICIENT < u128::MAX / 2);

/// Largest finite value the context can represent.
pub const TRIPLE_MAX: Triple = Triple::from_parts(1, MAX_COEFFICIENT, (EMAX as i32) - 37);

/// Smallest (most negative) finite value the context can represent.
pub const TRIPLE_MIN: Triple = Triple::from_parts(-1, MAX_COEFFICIENT, (EMAX as i32) - 37);

/// A finite decimal value: sign, 128-bit coefficient and base-10 exponent.
///
/// A triple held in a value store is always reduced (no trailing-zero
/// coefficient); intermediate results may carry artefacts until the producing
/// operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triple {
    sign: i8,
    coefficient: u128,
    exponent: i32,
}

impl Triple {
    /// Creates a triple from the sign and the two coefficient halves.
    pub const fn new(sign: i8, coefficient_high: u64, coefficient_low: u64, exponent: i32) -> Self {
        let coefficient = ((coefficient_high as u128) << 64) | coefficient_low as u128;
        Self::from_parts(sign, coefficient, exponent)
    }

    /// Creates a triple from the sign and the full coefficient.
    pub const fn from_parts(sign: i8, coefficient: u128, exponent: i32) -> Self {
        let sign = if coefficient == 0 {
            0
        } else if sign < 0 {
            -1
        } else {
            1
        };
        Self { sign, coefficient, exponent }
    }

    /// Creates a triple from a signed 64-bit integer.
    pub const fn from_i64(value: i64) -> Self {
        let sign = if value < 0 { -1 } else { 1 };
        Self::from_parts(sign, value.unsigned_abs() as u128, 0)
    }

    /// Creates a triple from a signed 128-bit integer.
    pub const fn from_i128(value: i128) -> Self {
        let sign = if value < 0 { -1 } else { 1 };
        Self::from_parts(sign, value.unsigned_abs(), 0)
    }

    /// Sign of the value: −1, 0 or +1.
    pub const fn sign(&self) -> i8 {
        self.sign
    }

    /// The full 128-bit coefficient.
    pub const fn coefficient(&self) -> u128 {
        self.coefficient
    }

    /// Upper 64 bits of the coefficient.
    pub const fn coefficient_high(&self) -> u64 {
        (self.coefficient >> 64) as u64
    }

    /// Lower 64 bits of the coefficient.
    pub const fn coefficient_low(&self) -> u64 {
        self.coefficient as u64
    }

    /// Base-10 exponent.
    pub const fn exponent(&self) -> i32 {
        self.exponent
    }

    /// True when the value is zero.
    pub const fn is_zero(&self) -> bool {
        self.coefficient == 0
    }

    /// Number of decimal digits in the coefficient (1 for zero).
    pub fn digits(&self) -> u32 {
        digits_u128(self.coefficient)
    }

    /// Adjusted exponent: `exponent + digits − 1`.
    pub fn adjusted_exponent(&self) -> i64 {
        self.exponent as i64 + self.digits() as i64 - 1
    }

    /// Canonical representative: trailing-zero coefficient digits moved into
    /// the exponent; zero normalizes to exponent 0.
    #[must_use]
    pub fn reduce(&self) -> Self {
        if self.coefficient == 0 {
            return Self { sign: 0, coefficient: 0, exponent: 0 };
        }
        let mut coefficient = self.coefficient;
        let mut exponent = self.exponent;
        while coefficient % 10 == 0 {
            coefficient /= 10;
            exponent += 1;
        }
        Self { sign: self.sign, coefficient, exponent }
    }
}

impl Default for Triple {
    fn default() -> Self {
        Self::from_parts(0, 0, 0)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Decimal::Finite(*self).to_sci())
    }
}

impl From<i64> for Triple {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

/// A decimal value under computation: finite, infinite or NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decimal {
    /// A finite value.
    Finite(Triple),
    /// Positive (`+1`) or negative (`−1`) infinity.
    Infinity(i8),
    /// Not a number.
    NaN,
}

impl Decimal {
    /// Zero with exponent 0.
    pub const ZERO: Self = Self::Finite(Triple::from_parts(0, 0, 0));

    /// One.
    pub const ONE: Self = Self::Finite(Triple::from_parts(1, 1, 0));

    /// True for finite values.
    pub const fn is_finite(&self) -> bool {
        matches!(self, Self::Finite(_))
    }

    /// True for NaN.
    pub const fn is_nan(&self) -> bool {
        matches!(self, Self::NaN)
    }

    /// True for ±infinity.
    pub const fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinity(_))
    }

    /// True for NaN and ±infinity.
    pub const fn is_special(&self) -> bool {
        !self.is_finite()
    }

    /// True for finite zero.
    pub const fn is_zero(&self) -> bool {
        matches!(self, Self::Finite(t) if t.is_zero())
    }

    /// Sign of the value: −1, 0 or +1 (NaN reports +1).
    pub const fn sign(&self) -> i8 {
        match self {
            Self::Finite(t) => t.sign(),
            Self::Infinity(s) => *s,
            Self::NaN => 1,
        }
    }

    /// The triple behind a finite value.
    pub const fn as_triple(&self) -> Option<Triple> {
        match self {
            Self::Finite(t) => Some(*t),
            _ => None,
        }
    }

    /// Creates a finite decimal from a signed 64-bit integer.
    pub const fn from_i64(value: i64) -> Self {
        Self::Finite(Triple::from_i64(value))
    }

    /// Returns the same value with the sign of `other`.
    #[must_use]
    pub fn copy_sign(&self, other: &Self) -> Self {
        let negative = other.sign() < 0;
        match *self {
            Self::Finite(t) => {
                let sign = if t.is_zero() {
                    0
                } else if negative {
                    -1
                } else {
                    1
                };
                Self::Finite(Triple { sign, ..t })
            }
            Self::Infinity(_) => Self::Infinity(if negative { -1 } else { 1 }),
            Self::NaN => Self::NaN,
        }
    }

    /// Canonical representative (see [`Triple::reduce`]); specials unchanged.
    #[must_use]
    pub fn reduce(&self) -> Self {
        match self {
            Self::Finite(t) => Self::Finite(t.reduce()),
            other => *other,
        }
    }

    /// Number of coefficient digits; specials report 1.
    pub fn digits(&self) -> u32 {
        match self {
            Self::Finite(t) => t.digits(),
            _ => 1,
        }
    }

    /// Adjusted exponent of a finite value; specials report 0.
    pub fn adjusted_exponent(&self) -> i64 {
        match self {
            Self::Finite(t) => t.adjusted_exponent(),
            _ => 0,
        }
    }

    /// Rescales to the given exponent under the context rounding mode.
    ///
    /// Raising the exponent discards digits (`ROUNDED`, plus `INEXACT` when a
    /// non-zero digit is lost); lowering it expands the coefficient and raises
    /// `INVALID_OPERATION` when the expansion exceeds 38 digits. Rescaling a
    /// special raises `INVALID_OPERATION`.
    #[must_use]
    pub fn rescale(&self, new_exponent: i32) -> Self {
        context::assert_initialized();
        let t = match self {
            Self::Finite(t) => t,
            _ => {
                context::raise(DecimalStatus::INVALID_OPERATION);
                return Self::NaN;
            }
        };
        if t.is_zero() {
            return Self::Finite(Triple { sign: 0, coefficient: 0, exponent: new_exponent });
        }
        match new_exponent.cmp(&t.exponent) {
            Ordering::Equal => Self::Finite(*t),
            Ordering::Less => {
                let shift = (t.exponent as i64 - new_exponent as i64) as u32;
                if shift > MAX_DIGITS || t.digits() + shift > MAX_DIGITS {
                    context::raise(DecimalStatus::INVALID_OPERATION);
                    return Self::NaN;
                }
                let coefficient = t.coefficient * 10u128.pow(shift);
                Self::Finite(Triple { sign: t.sign, coefficient, exponent: new_exponent })
            }
            Ordering::Greater => {
                let shift = (new_exponent as i64 - t.exponent as i64) as u64;
                let (coefficient, lost_nonzero) = discard_digits(t.coefficient, shift);
                context::raise(DecimalStatus::ROUNDED);
                if lost_nonzero {
                    context::raise(DecimalStatus::INEXACT);
                }
                let sign = if coefficient == 0 { 0 } else { t.sign };
                Self::Finite(Triple { sign, coefficient, exponent: new_exponent })
            }
        }
    }

    /// Rounds to an integral value (exponent ≥ 0) under the context rounding
    /// mode, raising `INEXACT` when a fractional part is discarded.
    #[must_use]
    pub fn to_integral_exact(&self) -> Self {
        match self {
            Self::Finite(t) if t.exponent < 0 => self.rescale(0),
            other => *other,
        }
    }

    /// Numeric absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        match *self {
            Self::Finite(t) => {
                Self::Finite(Triple { sign: if t.is_zero() { 0 } else { 1 }, ..t })
            }
            Self::Infinity(_) => Self::Infinity(1),
            Self::NaN => Self::NaN,
        }
    }

    /// Approximates the value as a binary64 float.
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Finite(_) => self.to_sci().parse().unwrap_or(f64::NAN),
            Self::Infinity(s) if *s < 0 => f64::NEG_INFINITY,
            Self::Infinity(_) => f64::INFINITY,
            Self::NaN => f64::NAN,
        }
    }

    /// Scientific-notation rendering, plain form when `exponent ≤ 0` and the
    /// adjusted exponent is at least −6 (the conventional to-scientific-string
    /// algorithm).
    pub fn to_sci(&self) -> String {
        let t = match self {
            Self::Finite(t) => t,
            Self::Infinity(s) if *s < 0 => return "-Infinity".into(),
            Self::Infinity(_) => return "Infinity".into(),
            Self::NaN => return "NaN".into(),
        };
        let digits = t.coefficient.to_string();
        let adjusted = t.exponent as i64 + digits.len() as i64 - 1;
        let mut out = String::new();
        if t.sign < 0 {
            out.push('-');
        }
        if t.exponent <= 0 && adjusted >= -6 {
            if t.exponent == 0 {
                out.push_str(&digits);
            } else if adjusted >= 0 {
                let point = (adjusted + 1) as usize;
                out.push_str(&digits[..point]);
                out.push('.');
                out.push_str(&digits[point..]);
            } else {
                out.push_str("0.");
                for _ in 0..(-1 - adjusted) {
                    out.push('0');
                }
                out.push_str(&digits);
            }
        } else {
            out.push_str(&digits[..1]);
            if digits.len() > 1 {
                out.push('.');
                out.push_str(&digits[1..]);
            }
            if adjusted >= 0 {
                out.push_str("E+");
            } else {
                out.push_str("E-");
            }
            out.push_str(&adjusted.abs().to_string());
        }
        out
    }

    /// Numeric comparison. `None` when either side is NaN.
    pub fn cmp_numeric(&self, other: &Self) -> Option<Ordering> {
        use Decimal::*;
        match (self, other) {
            (NaN, _) | (_, NaN) => None,
            (Infinity(a), Infinity(b)) => Some(a.cmp(b)),
            (Infinity(a), Finite(_)) => Some(if *a < 0 { Ordering::Less } else { Ordering::Greater }),
            (Finite(_), Infinity(b)) => Some(if *b < 0 { Ordering::Greater } else { Ordering::Less }),
            (Finite(l), Finite(r)) => Some(cmp_finite(l, r)),
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sci())
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.cmp_numeric(other)
    }
}

impl From<Triple> for Decimal {
    fn from(value: Triple) -> Self {
        Self::Finite(value)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        match self {
            Self::Finite(t) => Self::Finite(Triple::from_parts(-t.sign, t.coefficient, t.exponent)),
            Self::Infinity(s) => Self::Infinity(-s),
            Self::NaN => Self::NaN,
        }
    }
}

impl Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        add_impl(self, rhs)
    }
}

impl Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        add_impl(self, -rhs)
    }
}

impl Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        mul_impl(self, rhs)
    }
}

impl Div for Decimal {
    type Output = Decimal;

    fn div(self, rhs: Decimal) -> Decimal {
        div_impl(self, rhs)
    }
}

impl Rem for Decimal {
    type Output = Decimal;

    fn rem(self, rhs: Decimal) -> Decimal {
        rem_impl(self, rhs)
    }
}

fn digits_u128(v: u128) -> u32 {
    v.checked_ilog10().map_or(1, |l| l + 1)
}

fn digits_u256(v: U256) -> u32 {
    let mut v = v;
    let mut count = 1;
    while v >= U256::from(10u8) {
        v /= U256::from(10u8);
        count += 1;
    }
    count
}

fn pow10_u256(n: u32) -> U256 {
    let mut v = U256::ONE;
    for _ in 0..n {
        v *= U256::from(10u8);
    }
    v
}

/// Discards `shift` trailing digits of `coefficient` under the context
/// rounding mode, returning the rounded value and whether a non-zero digit was
/// lost.
fn discard_digits(coefficient: u128, shift: u64) -> (u128, bool) {
    if shift == 0 {
        return (coefficient, false);
    }
    if shift > MAX_DIGITS as u64 {
        return (0, coefficient != 0);
    }
    let divisor = 10u128.pow(shift as u32);
    let quotient = coefficient / divisor;
    let remainder = coefficient % divisor;
    let lost_nonzero = remainder != 0;
    let rounded = match context::rounding() {
        RoundingMode::Down => quotient,
        RoundingMode::HalfEven => {
            let half = divisor / 2;
            if remainder > half || (remainder == half && quotient % 2 == 1) {
                quotient + 1
            } else {
                quotient
            }
        }
    };
    (rounded, lost_nonzero)
}

fn discard_digits_u256(value: U256, shift: u32, sticky: bool) -> (U256, bool) {
    if shift == 0 {
        return (value, sticky);
    }
    let divisor = pow10_u256(shift);
    let quotient = value / divisor;
    let remainder = value % divisor;
    let lost_nonzero = sticky || remainder != U256::ZERO;
    let rounded = match context::rounding() {
        RoundingMode::Down => quotient,
        RoundingMode::HalfEven => {
            let half = divisor / U256::from(2u8);
            let round_up = remainder > half
                || (remainder == half && sticky)
                || (remainder == half && quotient % U256::from(2u8) == U256::ONE);
            if round_up {
                quotient + U256::ONE
            } else {
                quotient
            }
        }
    };
    (rounded, lost_nonzero)
}

/// Builds a finite result from an exact 256-bit magnitude, rounding to the
/// context precision and range-checking the adjusted exponent.
fn finite_from_u256(sign: i8, magnitude: U256, mut exponent: i64, sticky: bool) -> Decimal {
    let mut magnitude = magnitude;
    let digits = digits_u256(magnitude);
    let mut lost = sticky;
    if digits > MAX_DIGITS {
        let shift = digits - MAX_DIGITS;
        let (rounded, lost_nonzero) = discard_digits_u256(magnitude, shift, sticky);
        context::raise(DecimalStatus::ROUNDED);
        lost = lost_nonzero;
        magnitude = rounded;
        exponent += shift as i64;
        // rounding all-nines up adds a digit back
        if digits_u256(magnitude) > MAX_DIGITS {
            magnitude /= U256::from(10u8);
            exponent += 1;
        }
    }
    if lost {
        context::raise(DecimalStatus::INEXACT);
    }
    let coefficient = magnitude.as_u128();
    if coefficient == 0 {
        return Decimal::Finite(Triple::from_parts(0, 0, exponent.clamp(i32::MIN as i64, i32::MAX as i64) as i32));
    }
    let adjusted = exponent + digits_u128(coefficient) as i64 - 1;
    if adjusted > EMAX {
        context::raise(DecimalStatus::OVERFLOW | DecimalStatus::INEXACT | DecimalStatus::ROUNDED);
        return Decimal::Infinity(sign);
    }
    if adjusted < EMIN {
        // flush to zero; the range is wide enough that real workloads never
        // reach this
        context::raise(DecimalStatus::INEXACT | DecimalStatus::ROUNDED);
        return Decimal::Finite(Triple::from_parts(0, 0, 0));
    }
    Decimal::Finite(Triple::from_parts(sign, coefficient, exponent as i32))
}

fn cmp_finite(l: &Triple, r: &Triple) -> Ordering {
    match l.sign.cmp(&r.sign) {
        Ordering::Equal => {}
        other => return other,
    }
    if l.sign == 0 {
        return Ordering::Equal;
    }
    let magnitude = cmp_magnitude(l, r);
    if l.sign < 0 {
        magnitude.reverse()
    } else {
        magnitude
    }
}

fn cmp_magnitude(l: &Triple, r: &Triple) -> Ordering {
    // quick path on adjusted exponents before the exact comparison
    let la = l.adjusted_exponent();
    let ra = r.adjusted_exponent();
    if l.coefficient != 0 && r.coefficient != 0 && la != ra {
        return la.cmp(&ra);
    }
    let e = l.exponent.min(r.exponent);
    let lm = U256::from(l.coefficient) * pow10_u256((l.exponent - e) as u32);
    let rm = U256::from(r.coefficient) * pow10_u256((r.exponent - e) as u32);
    lm.cmp(&rm)
}

fn add_impl(l: Decimal, r: Decimal) -> Decimal {
    context::assert_initialized();
    use Decimal::*;
    match (l, r) {
        (NaN, _) | (_, NaN) => NaN,
        (Infinity(a), Infinity(b)) => {
            if a == b {
                Infinity(a)
            } else {
                context::raise(DecimalStatus::INVALID_OPERATION);
                NaN
            }
        }
        (Infinity(a), Finite(_)) => Infinity(a),
        (Finite(_), Infinity(b)) => Infinity(b),
        (Finite(lt), Finite(rt)) => {
            if lt.is_zero() {
                return Finite(rt);
            }
            if rt.is_zero() {
                return Finite(lt);
            }
            // when the operands are further apart than the precision, the
            // smaller one contributes only a sticky digit to rounding
            let gap = lt.adjusted_exponent() - rt.adjusted_exponent();
            if gap > (MAX_DIGITS as i64) + 1 {
                return finite_from_u256(lt.sign, U256::from(lt.coefficient), lt.exponent as i64, true);
            }
            if gap < -((MAX_DIGITS as i64) + 1) {
                return finite_from_u256(rt.sign, U256::from(rt.coefficient), rt.exponent as i64, true);
            }
            let e = lt.exponent.min(rt.exponent);
            let lm = U256::from(lt.coefficient) * pow10_u256((lt.exponent - e) as u32);
            let rm = U256::from(rt.coefficient) * pow10_u256((rt.exponent - e) as u32);
            let (sign, magnitude) = if lt.sign == rt.sign {
                (lt.sign, lm + rm)
            } else {
                match lm.cmp(&rm) {
                    Ordering::Equal => (0, U256::ZERO),
                    Ordering::Greater => (lt.sign, lm - rm),
                    Ordering::Less => (rt.sign, rm - lm),
                }
            };
            finite_from_u256(sign, magnitude, e as i64, false)
        }
    }
}

fn mul_impl(l: Decimal, r: Decimal) -> Decimal {
    context::assert_initialized();
    use Decimal::*;
    match (l, r) {
        (NaN, _) | (_, NaN) => NaN,
        (Infinity(a), Infinity(b)) => Infinity(a * b),
        (Infinity(a), Finite(t)) | (Finite(t), Infinity(a)) => {
            if t.is_zero() {
                context::raise(DecimalStatus::INVALID_OPERATION);
                NaN
            } else {
                Infinity(a * t.sign)
            }
        }
        (Finite(lt), Finite(rt)) => {
            let magnitude = U256::from(lt.coefficient) * U256::from(rt.coefficient);
            let sign = lt.sign * rt.sign;
            finite_from_u256(sign, magnitude, lt.exponent as i64 + rt.exponent as i64, false)
        }
    }
}

fn div_impl(l: Decimal, r: Decimal) -> Decimal {
    context::assert_initialized();
    use Decimal::*;
    match (l, r) {
        (NaN, _) | (_, NaN) => NaN,
        (Infinity(_), Infinity(_)) => {
            context::raise(DecimalStatus::INVALID_OPERATION);
            NaN
        }
        (Infinity(a), Finite(t)) => Infinity(a * if t.sign < 0 { -1 } else { 1 }),
        (Finite(t), Infinity(_)) => Finite(Triple::from_parts(0, 0, t.exponent)),
        (Finite(lt), Finite(rt)) => {
            if rt.is_zero() {
                context::raise(DecimalStatus::INVALID_OPERATION);
                return NaN;
            }
            if lt.is_zero() {
                return Finite(Triple::from_parts(0, 0, lt.exponent - rt.exponent));
            }
            let ideal_exponent = lt.exponent as i64 - rt.exponent as i64;
            // scale the dividend so the raw quotient carries 38 or 39
            // significant digits
            let shift = (rt.digits() + MAX_DIGITS) as i64 - lt.digits() as i64;
            debug_assert!(shift >= 0);
            let numerator = U256::from(lt.coefficient) * pow10_u256(shift as u32);
            let denominator = U256::from(rt.coefficient);
            let quotient = numerator / denominator;
            let remainder = numerator % denominator;
            let sign = lt.sign * rt.sign;
            let mut exponent = ideal_exponent - shift;
            if remainder == U256::ZERO {
                // exact: pull trailing zeros back up to the ideal exponent
                let mut q = quotient;
                while exponent < ideal_exponent && q % U256::from(10u8) == U256::ZERO {
                    q /= U256::from(10u8);
                    exponent += 1;
                }
                return finite_from_u256(sign, q, exponent, false);
            }
            // inexact: round the 38/39-digit quotient at context precision
            let digits = digits_u256(quotient);
            let drop = digits.saturating_sub(MAX_DIGITS);
            let mut rounded = if drop == 0 {
                // the remainder decides the final digit directly
                let double = remainder * U256::from(2u8);
                let round_up = match (double.cmp(&denominator), context::rounding()) {
                    (_, RoundingMode::Down) => false,
                    (Ordering::Greater, RoundingMode::HalfEven) => true,
                    (Ordering::Equal, RoundingMode::HalfEven) => {
                        quotient % U256::from(2u8) == U256::ONE
                    }
                    (Ordering::Less, RoundingMode::HalfEven) => false,
                };
                if round_up {
                    quotient + U256::ONE
                } else {
                    quotient
                }
            } else {
                discard_digits_u256(quotient, drop, true).0
            };
            exponent += drop as i64;
            if digits_u256(rounded) > MAX_DIGITS {
                rounded /= U256::from(10u8);
                exponent += 1;
            }
            context::raise(DecimalStatus::INEXACT | DecimalStatus::ROUNDED);
            finite_from_u256(sign, rounded, exponent, false)
        }
    }
}

fn rem_impl(l: Decimal, r: Decimal) -> Decimal {
    context::assert_initialized();
    use Decimal::*;
    match (l, r) {
        (NaN, _) | (_, NaN) => NaN,
        (Infinity(_), _) => {
            context::raise(DecimalStatus::INVALID_OPERATION);
            NaN
        }
        (Finite(t), Infinity(_)) => Finite(t),
        (Finite(lt), Finite(rt)) => {
            if rt.is_zero() {
                context::raise(DecimalStatus::INVALID_OPERATION);
                return NaN;
            }
            if lt.is_zero() {
                return Finite(Triple::from_parts(0, 0, lt.exponent.min(rt.exponent)));
            }
            if cmp_magnitude(&lt, &rt) == Ordering::Less {
                return Finite(lt);
            }
            // |l| ≥ |r|: the integral quotient must fit the precision
            if lt.adjusted_exponent() - rt.adjusted_exponent() > MAX_DIGITS as i64 {
                context::raise(DecimalStatus::INVALID_OPERATION);
                return NaN;
            }
            let e = lt.exponent.min(rt.exponent);
            let lm = U256::from(lt.coefficient) * pow10_u256((lt.exponent - e) as u32);
            let rm = U256::from(rt.coefficient) * pow10_u256((rt.exponent - e) as u32);
            let remainder = lm % rm;
            if digits_u256(remainder) > MAX_DIGITS {
                context::raise(DecimalStatus::INVALID_OPERATION);
                return NaN;
            }
            // the remainder takes the dividend's sign
            let sign = if remainder == U256::ZERO { 0 } else { lt.sign };
            Finite(Triple::from_parts(sign, remainder.as_u128(), e))
        }
    }
}

/// Error parsing a decimal from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseDecimalError {
    /// The text is not a valid decimal literal.
    #[error("invalid decimal literal")]
    InvalidFormat,
    /// The adjusted exponent falls outside [−24575, 24576].
    #[error("adjusted exponent out of range")]
    ExponentOutOfRange,
}

/// Result of parsing a decimal literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedDecimal {
    /// The parsed value; may be a special.
    pub value: Decimal,
    /// True when significant digits beyond the 38-digit precision were
    /// discarded (round-down), i.e. the caller's loss policy applies.
    pub truncated: bool,
}

impl Decimal {
    /// Parses a decimal literal.
    ///
    /// Accepts optional sign, digits with an optional point, an optional
    /// `e`/`E` exponent, and the spellings `Inf`, `Infinity` and `NaN`
    /// (case-insensitive, optionally signed). Coefficients beyond 38 digits
    /// are truncated toward zero into the exponent with
    /// [`ParsedDecimal::truncated`] flagging a non-zero loss.
    pub fn parse(input: &str) -> Result<ParsedDecimal, ParseDecimalError> {
        let mut s = input;
        let mut negative = false;
        if let Some(rest) = s.strip_prefix('+') {
            s = rest;
        } else if let Some(rest) = s.strip_prefix('-') {
            negative = true;
            s = rest;
        }
        if s.eq_ignore_ascii_case("nan") {
            return Ok(ParsedDecimal { value: Decimal::NaN, truncated: false });
        }
        if s.eq_ignore_ascii_case("inf") || s.eq_ignore_ascii_case("infinity") {
            let sign = if negative { -1 } else { 1 };
            return Ok(ParsedDecimal { value: Decimal::Infinity(sign), truncated: false });
        }

        let (mantissa, exp_part) = match s.find(['e', 'E']) {
            Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
            None => (s, None),
        };
        let explicit_exponent: i64 = match exp_part {
            Some(e) => {
                let digits = e
                    .strip_prefix('+')
                    .or_else(|| e.strip_prefix('-'))
                    .unwrap_or(e);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ParseDecimalError::InvalidFormat);
                }
                e.parse().map_err(|_| ParseDecimalError::ExponentOutOfRange)?
            }
            None => 0,
        };

        let (int_part, frac_part) = match mantissa.find('.') {
            Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseDecimalError::InvalidFormat);
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseDecimalError::InvalidFormat);
        }

        let mut coefficient: u128 = 0;
        let mut kept = 0u32;
        let mut dropped = 0i64;
        let mut dropped_nonzero = false;
        let mut seen_significant = false;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            let digit = b - b'0';
            if !seen_significant && digit == 0 {
                continue;
            }
            seen_significant = true;
            if kept < MAX_DIGITS {
                coefficient = coefficient * 10 + u128::from(digit);
                kept += 1;
            } else {
                dropped += 1;
                if digit != 0 {
                    dropped_nonzero = true;
                }
            }
        }

        let fraction_digits = frac_part.len() as i64;
        let exponent = explicit_exponent
            .checked_sub(fraction_digits)
            .and_then(|e| e.checked_add(dropped))
            .ok_or(ParseDecimalError::ExponentOutOfRange)?;

        if coefficient == 0 {
            // zero can carry an arbitrarily large exponent; normalize it
            return Ok(ParsedDecimal { value: Decimal::ZERO, truncated: dropped_nonzero });
        }

        let adjusted = exponent + digits_u128(coefficient) as i64 - 1;
        if !(EMIN..=EMAX).contains(&adjusted) {
            return Err(ParseDecimalError::ExponentOutOfRange);
        }
        let sign = if negative { -1 } else { 1 };
        let value = Decimal::Finite(Triple::from_parts(sign, coefficient, exponent as i32));
        Ok(ParsedDecimal { value, truncated: dropped_nonzero })
    }

    /// Converts a binary64 float through its shortest decimal rendering.
    /// The input must be finite.
    pub fn from_f64_exact(value: f64) -> Result<ParsedDecimal, ParseDecimalError> {
        debug_assert!(value.is_finite());
        Self::parse(&format!("{value:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn dec(s: &str) -> Decimal {
        Decimal::parse(s).expect("parse").value
    }

    fn setup() {
        ensure_decimal_context();
        clear_status();
    }

    #[test]
    fn reduce_strips_trailing_zeros() {
        let t = Triple::from_parts(1, 12_300, -2);
        assert_eq!(t.reduce(), Triple::from_parts(1, 123, 0));
        assert_eq!(Triple::from_parts(-1, 0, 5).reduce(), Triple::from_parts(0, 0, 0));
    }

    #[test]
    fn reduce_is_idempotent() {
        let t = Triple::from_parts(1, 4_200, -3).reduce();
        assert_eq!(t, t.reduce());
    }

    #[test]
    fn add_basic() {
        setup();
        assert_eq!(dec("1.1") + dec("2.2"), dec("3.3"));
        assert_eq!(dec("1") + dec("-1"), Decimal::ZERO);
        assert_eq!(dec("1e30") + dec("1e30"), dec("2e30"));
    }

    #[test]
    fn add_rounds_at_precision() {
        setup();
        let big = Decimal::Finite(Triple::from_parts(1, MAX_COEFFICIENT, 0));
        let r = big + Decimal::from_i64(1);
        // 38 nines + 1 = 1E+38; the dropped digit is zero so only ROUNDED
        assert_eq!(r, Decimal::Finite(Triple::from_parts(1, MAX_COEFFICIENT / 10 + 1, 1)));
        assert!(status().contains(DecimalStatus::ROUNDED));
        assert!(!status().contains(DecimalStatus::INVALID_OPERATION));
    }

    #[test]
    fn rescale_down_overflows_precision() {
        setup();
        // 1E+38 cannot be rescaled to exponent 0 within 38 digits
        let v = Decimal::Finite(Triple::from_parts(1, 1, 38));
        let r = v.rescale(0);
        assert!(r.is_nan());
        assert!(status().contains(DecimalStatus::INVALID_OPERATION));
    }

    #[test]
    fn rescale_up_rounds_down_when_guarded() {
        setup();
        let _guard = RoundingGuard::new(RoundingMode::Down);
        let r = dec("1.2345").rescale(-2);
        assert_eq!(r, Decimal::Finite(Triple::from_parts(1, 123, -2)));
        assert!(status().contains(DecimalStatus::INEXACT));
    }

    #[test]
    fn mul_and_sign() {
        setup();
        assert_eq!(dec("-1.5") * dec("2"), dec("-3.0"));
        assert_eq!(dec("0.5") * dec("0.5"), dec("0.25"));
    }

    #[test]
    fn div_exact_prefers_ideal_exponent() {
        setup();
        let r = dec("10") / dec("4");
        assert_eq!(r, dec("2.5"));
        assert_eq!(dec("10") / dec("2"), dec("5"));
    }

    #[test]
    fn div_inexact_sets_status() {
        setup();
        let r = dec("1") / dec("3");
        assert!(status().contains(DecimalStatus::INEXACT));
        let Decimal::Finite(t) = r else { panic!("expected finite") };
        assert_eq!(t.digits(), MAX_DIGITS);
        assert_eq!(t.coefficient() % 10, 3);
        // 2/3 rounds the final digit up under half-even
        let Decimal::Finite(t) = dec("2") / dec("3") else { panic!("expected finite") };
        assert_eq!(t.coefficient() % 10, 7);
    }

    #[test]
    fn div_by_zero_is_invalid() {
        setup();
        let r = dec("1") / Decimal::ZERO;
        assert!(r.is_nan());
        assert!(status().contains(DecimalStatus::INVALID_OPERATION));
    }

    #[test]
    fn rem_takes_dividend_sign() {
        setup();
        assert_eq!(dec("7") % dec("3"), dec("1"));
        assert_eq!(dec("-7") % dec("3"), dec("-1"));
        assert_eq!(dec("7.5") % dec("2"), dec("1.5"));
    }

    #[test]
    fn compare_across_exponents() {
        setup();
        assert!(dec("1e3") > dec("999.9"));
        assert!(dec("-1e3") < dec("0"));
        assert_eq!(dec("1.00").cmp_numeric(&dec("1")), Some(Ordering::Equal));
        assert!(Decimal::NaN.cmp_numeric(&dec("1")).is_none());
    }

    #[test]
    fn parse_specials_and_signs() {
        assert_eq!(dec("NaN"), Decimal::NaN);
        assert_eq!(dec("+nan"), Decimal::NaN);
        assert_eq!(dec("-Inf"), Decimal::Infinity(-1));
        assert_eq!(dec("Infinity"), Decimal::Infinity(1));
        assert!(Decimal::parse("abc").is_err());
        assert!(Decimal::parse("1e").is_err());
        assert!(Decimal::parse("").is_err());
    }

    #[test]
    fn parse_truncates_beyond_precision() {
        let parsed = Decimal::parse("123456789012345678901234567890123456789").expect("parse");
        assert!(parsed.truncated);
        let Decimal::Finite(t) = parsed.value else { panic!("expected finite") };
        assert_eq!(t.digits(), MAX_DIGITS);
        assert_eq!(t.exponent(), 1);

        let parsed = Decimal::parse("100000000000000000000000000000000000000000").expect("parse");
        assert!(!parsed.truncated);
    }

    #[test]
    fn parse_rejects_out_of_range_exponent() {
        assert_eq!(
            Decimal::parse("1e999999"),
            Err(ParseDecimalError::ExponentOutOfRange)
        );
        assert!(Decimal::parse("1e24576").is_ok());
    }

    #[test]
    fn to_sci_forms() {
        assert_eq!(dec("123.45").to_sci(), "123.45");
        assert_eq!(dec("-0.00012").to_sci(), "-0.00012");
        assert_eq!(dec("1.5e40").to_sci(), "1.5E+40");
        assert_eq!(Decimal::Finite(Triple::from_parts(1, 12, -9)).to_sci(), "1.2E-8");
        assert_eq!(Decimal::ZERO.to_sci(), "0");
        assert_eq!(Decimal::NaN.to_sci(), "NaN");
        assert_eq!(Decimal::Infinity(-1).to_sci(), "-Infinity");
    }

    #[test]
    fn triple_max_is_38_nines() {
        assert_eq!(TRIPLE_MAX.coefficient_high(), 5_421_010_862_427_522_170);
        assert_eq!(TRIPLE_MAX.coefficient_low(), 687_399_551_400_673_279);
        assert_eq!(TRIPLE_MAX.adjusted_exponent(), EMAX);
    }

    #[quickcheck]
    fn parse_format_round_trip(value: i64, scale: u8) -> bool {
        setup();
        let scale = i32::from(scale % 20);
        let t = Triple::from_parts(
            if value < 0 { -1 } else { 1 },
            value.unsigned_abs() as u128,
            -scale,
        )
        .reduce();
        let formatted = Decimal::Finite(t).to_sci();
        match Decimal::parse(&formatted) {
            Ok(parsed) => parsed.value.reduce() == Decimal::Finite(t) && !parsed.truncated,
            Err(_) => false,
        }
    }

    #[quickcheck]
    fn add_is_commutative(a: i64, b: i64) -> bool {
        setup();
        Decimal::from_i64(a) + Decimal::from_i64(b) == Decimal::from_i64(b) + Decimal::from_i64(a)
    }
}
