//! The cast matrix.
//!
//! `conduct_cast` dispatches on the source kind, then the target kind,
//! honoring the active loss-of-precision policy. Feature gates for boolean,
//! small-integer and blob/clob casts run before anything else, even for NULL
//! inputs; the `implicit` policy additionally forbids approximate-to-exact
//! numeric casts outright.

use std::fmt::Display;

use weir_plan::LossPolicy;
use weir_types::decimal::{self, DecimalStatus, RoundingGuard, RoundingMode, TRIPLE_MAX, TRIPLE_MIN};
use weir_types::types::DECIMAL_DEFAULT_PRECISION;
use weir_types::{
    DataType, Decimal, ErrorKind, LobReference, Octet, ParsedDecimal, Text, Triple, TypeKind, Value,
};

use super::context::{DiagnosticRecord, EvaluatorContext};
use super::return_unsupported;
use crate::lob;

/// Rendering "NaN" regardless of the float's sign bit.
const STRING_POSITIVE_NAN: &str = "NaN";
const STRING_POSITIVE_INFINITY: &str = "Infinity";
const STRING_NEGATIVE_INFINITY: &str = "-Infinity";

fn error_value(kind: ErrorKind) -> Value {
    Value::Error(kind)
}

fn supports_small_integers(ctx: &mut EvaluatorContext) -> Option<Value> {
    if ctx.config().support_smallint {
        return None;
    }
    ctx.add_error(DiagnosticRecord::new(
        ErrorKind::Unsupported,
        "smaller integral types are unsupported",
    ));
    Some(error_value(ErrorKind::Unsupported))
}

fn supports_boolean(ctx: &mut EvaluatorContext) -> Option<Value> {
    if ctx.config().support_boolean {
        return None;
    }
    ctx.add_error(DiagnosticRecord::new(ErrorKind::Unsupported, "boolean type is unsupported"));
    Some(error_value(ErrorKind::Unsupported))
}

fn supports_lobs(ctx: &mut EvaluatorContext) -> Option<Value> {
    if ctx.config().enable_blob_cast {
        return None;
    }
    ctx.add_error(DiagnosticRecord::new(
        ErrorKind::Unsupported,
        "cast with blob/clob types are unsupported",
    ));
    Some(error_value(ErrorKind::Unsupported))
}

/// Applies the loss policy after a conversion modified the value.
///
/// `None` means the caller proceeds with the modified value; `Some` is the
/// cast result (NULL under `unknown`, an error under `implicit`/`error`).
fn handle_precision_lost(
    ctx: &mut EvaluatorContext,
    src: impl Display,
    modified: impl Display,
) -> Option<Value> {
    ctx.set_lost_precision(true);
    match ctx.loss_policy() {
        LossPolicy::Ignore => None,
        LossPolicy::Floor => {
            ctx.add_error(DiagnosticRecord::new(
                ErrorKind::Unsupported,
                "loss precision policy `floor` is unsupported",
            ));
            Some(error_value(ErrorKind::Unsupported))
        }
        LossPolicy::Ceil => {
            ctx.add_error(DiagnosticRecord::new(
                ErrorKind::Unsupported,
                "loss precision policy `ceil` is unsupported",
            ));
            Some(error_value(ErrorKind::Unsupported))
        }
        LossPolicy::Unknown => Some(Value::Null),
        LossPolicy::Warn => {
            ctx.add_error(DiagnosticRecord::new(
                ErrorKind::LostPrecision,
                "value loses precision by conversion",
            ))
            .new_argument(src)
            .new_argument(modified);
            None
        }
        LossPolicy::Implicit | LossPolicy::Error => {
            ctx.add_error(DiagnosticRecord::new(
                ErrorKind::LostPrecision,
                "value loses precision by conversion",
            ))
            .new_argument(src)
            .new_argument(modified);
            Some(error_value(ErrorKind::LostPrecision))
        }
    }
}

/// Applies the loss policy when the thread status reports an inexact
/// operation.
fn handle_inexact_conversion(
    ctx: &mut EvaluatorContext,
    src: &Decimal,
    modified: &Decimal,
) -> Option<Value> {
    if decimal::status().contains(DecimalStatus::INEXACT) {
        return handle_precision_lost(ctx, src, modified);
    }
    None
}

fn unknown_error(ctx: &mut EvaluatorContext, message: &str, args: &[String]) -> Value {
    let record = ctx.add_error(DiagnosticRecord::new(ErrorKind::Unknown, message));
    for a in args {
        record.new_argument(a);
    }
    error_value(ErrorKind::Unknown)
}

// ---------------------------------------------------------------------------
// length handling for character/octet targets

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarlenKind {
    Character,
    Octet,
}

fn build_varlen(kind: VarlenKind, bytes: Vec<u8>) -> Value {
    match kind {
        VarlenKind::Character => Value::Character(Text::from_bytes(bytes)),
        VarlenKind::Octet => Value::Octet(Octet::from(bytes)),
    }
}

/// Largest UTF-8 character boundary not exceeding `limit`.
fn utf8_boundary_at_most(bytes: &[u8], limit: usize) -> usize {
    let mut i = 0usize;
    loop {
        let size = match bytes.get(i) {
            None => break,
            Some(b) if *b < 0x80 => 1,
            Some(b) if *b & 0xe0 == 0xc0 => 2,
            Some(b) if *b & 0xf0 == 0xe0 => 3,
            Some(b) if *b & 0xf8 == 0xf0 => 4,
            // invalid lead byte: cut bytewise from here on
            Some(_) => 1,
        };
        if i + size > limit {
            break;
        }
        i += size;
    }
    i
}

/// Applies target-length handling: truncate at a character boundary, pad
/// fixed-length targets, and run the loss policy when bytes were dropped.
///
/// `lenient_remove_padding` marks a padded (non-varying) source whose
/// trailing pad bytes may be dropped without counting as a loss.
fn handle_length(
    ctx: &mut EvaluatorContext,
    src: &[u8],
    len: Option<usize>,
    add_padding: bool,
    lenient_remove_padding: bool,
    kind: VarlenKind,
) -> Value {
    let Some(dlen) = len else {
        return build_varlen(kind, src.to_vec());
    };
    let pad: u8 = match kind {
        VarlenKind::Character => b' ',
        VarlenKind::Octet => 0x00,
    };
    let mut lost_precision = false;
    let mut out: Vec<u8>;
    if src.len() > dlen {
        let cut = match kind {
            VarlenKind::Character => utf8_boundary_at_most(src, dlen),
            VarlenKind::Octet => dlen,
        };
        let removed = &src[cut..];
        let removed_only_padding = removed.iter().all(|b| *b == pad);
        if !(lenient_remove_padding && removed_only_padding) {
            lost_precision = true;
        }
        out = src[..cut].to_vec();
    } else {
        out = src.to_vec();
    }
    if add_padding && out.len() < dlen {
        out.resize(dlen, pad);
    }
    if lost_precision {
        ctx.set_lost_precision(true);
        match ctx.loss_policy() {
            LossPolicy::Ignore => {}
            LossPolicy::Floor => {
                ctx.add_error(DiagnosticRecord::new(
                    ErrorKind::Unsupported,
                    "loss precision policy `floor` is unsupported",
                ));
                return error_value(ErrorKind::Unsupported);
            }
            LossPolicy::Ceil => {
                ctx.add_error(DiagnosticRecord::new(
                    ErrorKind::Unsupported,
                    "loss precision policy `ceil` is unsupported",
                ));
                return error_value(ErrorKind::Unsupported);
            }
            LossPolicy::Unknown => return Value::Null,
            LossPolicy::Warn => {
                ctx.add_error(DiagnosticRecord::new(
                    ErrorKind::LostPrecisionValueTooLong,
                    format!(
                        "value is too long to convert source length:{} target length:{dlen}",
                        src.len()
                    ),
                ))
                .new_argument(String::from_utf8_lossy(src));
            }
            LossPolicy::Implicit | LossPolicy::Error => {
                ctx.add_error(DiagnosticRecord::new(
                    ErrorKind::LostPrecisionValueTooLong,
                    format!(
                        "value is too long to convert source length:{} target length:{dlen}",
                        src.len()
                    ),
                ))
                .new_argument(String::from_utf8_lossy(src));
                return error_value(ErrorKind::LostPrecisionValueTooLong);
            }
        }
    }
    build_varlen(kind, out)
}

// ---------------------------------------------------------------------------
// numeric helpers

/// Integer targets of narrowing conversions. int1/int2 validate against their
/// own range but store as the int4 runtime representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntTarget {
    Int1,
    Int2,
    Int4,
    Int8,
}

impl IntTarget {
    const fn min(&self) -> i64 {
        match self {
            Self::Int1 => i8::MIN as i64,
            Self::Int2 => i16::MIN as i64,
            Self::Int4 => i32::MIN as i64,
            Self::Int8 => i64::MIN,
        }
    }

    const fn max(&self) -> i64 {
        match self {
            Self::Int1 => i8::MAX as i64,
            Self::Int2 => i16::MAX as i64,
            Self::Int4 => i32::MAX as i64,
            Self::Int8 => i64::MAX,
        }
    }

    fn build(&self, v: i64) -> Value {
        match self {
            Self::Int1 | Self::Int2 | Self::Int4 => Value::Int4(v as i32),
            Self::Int8 => Value::Int8(v),
        }
    }
}

fn validate_integer_range_from_integer(
    ctx: &mut EvaluatorContext,
    src: i64,
    target: IntTarget,
) -> Value {
    if src > target.max() {
        let m = target.max();
        if let Some(v) = handle_precision_lost(ctx, src, m) {
            return v;
        }
        return target.build(m);
    }
    if src < target.min() {
        let m = target.min();
        if let Some(v) = handle_precision_lost(ctx, src, m) {
            return v;
        }
        return target.build(m);
    }
    target.build(src)
}

/// An integral triple (exponent ≥ 0) as an i64; the caller has range-checked.
fn triple_to_i64(t: Triple) -> i64 {
    debug_assert!(t.exponent() >= 0);
    let mut v = t.coefficient() as i128;
    for _ in 0..t.exponent() {
        v *= 10;
    }
    if t.sign() < 0 {
        v = -v;
    }
    v as i64
}

fn validate_integer_range_from_decimal(
    ctx: &mut EvaluatorContext,
    src: &Decimal,
    target: IntTarget,
) -> Value {
    if src.is_nan() {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::ArithmeticError,
            "NaN is not supported for integer conversion",
        ))
        .new_argument(src);
        return error_value(ErrorKind::ArithmeticError);
    }
    let max_tgt = Decimal::from_i64(target.max());
    let min_tgt = Decimal::from_i64(target.min());
    // src can be +INF/-INF
    if max_tgt < *src {
        let m = target.max();
        if let Some(v) = handle_precision_lost(ctx, src, m) {
            return v;
        }
        return target.build(m);
    }
    if *src < min_tgt {
        let m = target.min();
        if let Some(v) = handle_precision_lost(ctx, src, m) {
            return v;
        }
        return target.build(m);
    }
    decimal::clear_status();
    let rounded = {
        let _guard = RoundingGuard::new(RoundingMode::Down);
        decimal::clear_status();
        let rounded = src.to_integral_exact();
        if decimal::status().contains(DecimalStatus::INVALID_OPERATION) {
            return unknown_error(
                ctx,
                "unexpected error in converting decimal to integer",
                &[src.to_string(), rounded.to_string()],
            );
        }
        if let Some(v) = handle_inexact_conversion(ctx, src, &rounded) {
            return v;
        }
        rounded
    };
    match rounded.as_triple() {
        Some(t) => target.build(triple_to_i64(t)),
        None => unknown_error(ctx, "unexpected special value after rounding", &[src.to_string()]),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FloatSource {
    Float4,
    Float8,
}

/// The largest integral float still below the integer maximum; the float
/// value next above it crosses the maximum.
fn max_integral_float_convertible(src: FloatSource, target: IntTarget) -> f64 {
    match (src, target) {
        (FloatSource::Float4, IntTarget::Int1) => f64::from(i8::MAX),
        (FloatSource::Float4, IntTarget::Int2) => f64::from(i16::MAX),
        (FloatSource::Float4, IntTarget::Int4) => f64::from((i32::MAX - 127) as f32),
        (FloatSource::Float4, IntTarget::Int8) => {
            f64::from((i64::MAX - (512i64 * 1024 * 1024 * 1024 - 1)) as f32)
        }
        (FloatSource::Float8, IntTarget::Int1) => f64::from(i8::MAX),
        (FloatSource::Float8, IntTarget::Int2) => f64::from(i16::MAX),
        (FloatSource::Float8, IntTarget::Int4) => f64::from(i32::MAX),
        (FloatSource::Float8, IntTarget::Int8) => (i64::MAX - 1023) as f64,
    }
}

fn min_integral_float_convertible(target: IntTarget) -> f64 {
    // the minima are powers of two, exactly representable in both widths
    target.min() as f64
}

fn validate_integer_range_from_float(
    ctx: &mut EvaluatorContext,
    src: f64,
    source: FloatSource,
    target: IntTarget,
) -> Value {
    if src.is_nan() {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::ArithmeticError,
            "NaN is not supported for integer conversion",
        ))
        .new_argument(src);
        return error_value(ErrorKind::ArithmeticError);
    }
    let max_tgt = max_integral_float_convertible(source, target);
    let min_tgt = min_integral_float_convertible(target);
    if max_tgt < src {
        let m = target.max();
        if let Some(v) = handle_precision_lost(ctx, src, m) {
            return v;
        }
        return target.build(m);
    }
    if src < min_tgt {
        let m = target.min();
        if let Some(v) = handle_precision_lost(ctx, src, m) {
            return v;
        }
        return target.build(m);
    }
    let truncated = src.trunc();
    if src != truncated {
        let m = truncated as i64;
        if let Some(v) = handle_precision_lost(ctx, src, m) {
            return v;
        }
        return target.build(m);
    }
    target.build(src as i64)
}

fn as_triple(ctx: &mut EvaluatorContext, d: &Decimal) -> Value {
    decimal::clear_status();
    let reduced = d.reduce();
    if decimal::status().contains(DecimalStatus::INVALID_OPERATION) {
        return unknown_error(
            ctx,
            "unknown error in reducing decimal value",
            &[d.to_string(), reduced.to_string()],
        );
    }
    match reduced.as_triple() {
        Some(t) => Value::Decimal(t),
        None => unknown_error(ctx, "special value is not convertible to decimal", &[d.to_string()]),
    }
}

fn create_max_decimal(precision: usize, scale: usize) -> Decimal {
    debug_assert!((1..=decimal::MAX_DIGITS as usize).contains(&precision));
    let coefficient = 10u128.pow(precision as u32) - 1;
    Decimal::Finite(Triple::from_parts(1, coefficient, -(scale as i32)))
}

/// Applies decimal(p,s) handling: reduce, expand positive exponents, clamp on
/// integer-digit overflow, rescale to the target scale with round-down.
fn handle_ps(
    ctx: &mut EvaluatorContext,
    src: &Decimal,
    precision: Option<usize>,
    scale: Option<usize>,
) -> Value {
    debug_assert!(src.is_finite(), "special value is not supported");
    if !src.is_finite() {
        return error_value(ErrorKind::Undefined);
    }
    if precision.is_some() && scale.is_none() {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::Unsupported,
            format!("unsupported decimal conversion: scale:* precision:{}", precision.expect("checked")),
        ));
        return error_value(ErrorKind::Unsupported);
    }
    let Some(scale) = scale else {
        return as_triple(ctx, src);
    };
    let precision = precision.unwrap_or(DECIMAL_DEFAULT_PRECISION);
    debug_assert!(precision >= scale, "precision must be greater than or equal to scale");

    decimal::clear_status();
    let mut d = src.reduce();
    if decimal::status().contains(DecimalStatus::INVALID_OPERATION) {
        return unknown_error(ctx, "unknown error in reducing decimal value", &[src.to_string()]);
    }
    let exponent = match d {
        Decimal::Finite(t) => t.exponent(),
        _ => return error_value(ErrorKind::Undefined),
    };
    if exponent > 0 {
        // extend the integral part to full digits, e.g. 1.0E3 -> 1000
        decimal::clear_status();
        let expanded = d.rescale(0);
        if decimal::status().contains(DecimalStatus::INVALID_OPERATION) {
            // the integral expansion exceeds the context precision
            ctx.add_error(DiagnosticRecord::new(
                ErrorKind::ArithmeticError,
                "value out of range for decimal conversion",
            ))
            .new_argument(&d);
            return error_value(ErrorKind::ArithmeticError);
        }
        if let Some(v) = handle_inexact_conversion(ctx, &d, &expanded) {
            return v;
        }
        d = expanded;
    }
    let digits = d.digits() as i64;
    let digits_prec = match d {
        Decimal::Finite(t) => -(t.exponent() as i64),
        _ => 0,
    };
    if ((precision.saturating_sub(scale)) as i64) < digits - digits_prec && !d.is_zero() {
        // zero is the exception: its integral part is one digit but any
        // decimal(p,s) can hold it
        if let Some(v) = handle_precision_lost(ctx, src, &d) {
            return v;
        }
        let mx = create_max_decimal(precision, scale).copy_sign(&d);
        return as_triple(ctx, &mx);
    }

    decimal::clear_status();
    let rescaled = {
        let _guard = RoundingGuard::new(RoundingMode::Down);
        decimal::clear_status();
        let rescaled = d.rescale(-(scale as i32));
        if decimal::status().contains(DecimalStatus::INVALID_OPERATION) {
            return unknown_error(
                ctx,
                "unexpected error in rescaling decimal value",
                &[d.to_string(), rescaled.to_string()],
            );
        }
        rescaled
    };
    if let Some(v) = handle_inexact_conversion(ctx, &d, &rescaled) {
        return v;
    }
    as_triple(ctx, &rescaled)
}

fn int_to_decimal(
    ctx: &mut EvaluatorContext,
    src: i64,
    precision: Option<usize>,
    scale: Option<usize>,
) -> Value {
    handle_ps(ctx, &Decimal::from_i64(src), precision, scale)
}

fn float_to_decimal(
    ctx: &mut EvaluatorContext,
    src: f64,
    precision: Option<usize>,
    scale: Option<usize>,
) -> Value {
    if src.is_nan() {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::ArithmeticError,
            "invalid value for conversion - NaN to decimal",
        ))
        .new_argument(src);
        return error_value(ErrorKind::ArithmeticError);
    }
    if src.is_infinite() {
        let tgt = if src.is_sign_negative() { TRIPLE_MIN } else { TRIPLE_MAX };
        if let Some(v) = handle_precision_lost(ctx, src, tgt) {
            return v;
        }
        return Value::Decimal(tgt);
    }
    match Decimal::from_f64_exact(src) {
        Ok(ParsedDecimal { value, .. }) => handle_ps(ctx, &value, precision, scale),
        Err(e) => unknown_error(
            ctx,
            "unexpected error in converting float value to decimal",
            &[src.to_string(), e.to_string()],
        ),
    }
}

fn decimal_to_f64(d: &Decimal) -> f64 {
    d.to_f64()
}

fn decimal_to_float4(d: &Decimal) -> Value {
    // overflow and underflow saturate to ±infinity / signed zero without
    // counting as precision loss
    let wide = decimal_to_f64(d);
    if wide.is_nan() {
        return Value::Float4(f32::NAN);
    }
    Value::Float4(wide as f32)
}

fn decimal_to_float8(d: &Decimal) -> Value {
    let v = decimal_to_f64(d);
    Value::Float8(if v.is_nan() { f64::NAN } else { v })
}

// ---------------------------------------------------------------------------
// string parsing

fn trim_spaces(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|b| *b != b' ').unwrap_or(s.len());
    let end = s.iter().rposition(|b| *b != b' ').map_or(start, |p| p + 1);
    &s[start..end]
}

fn is_valid_nan(s: &str) -> bool {
    // a sign on NaN is not meaningful, but accepted for usability
    s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("+nan") || s.eq_ignore_ascii_case("-nan")
}

/// Parses a trimmed string into a decimal, applying the loss policy when
/// digits beyond the precision were discarded.
fn string_to_decimal_internal(ctx: &mut EvaluatorContext, s: &str) -> Result<Decimal, Value> {
    match Decimal::parse(s) {
        Err(_) => {
            ctx.add_error(DiagnosticRecord::new(
                ErrorKind::FormatError,
                "invalid string passed for conversion",
            ))
            .new_argument(s);
            Err(error_value(ErrorKind::FormatError))
        }
        Ok(ParsedDecimal { value, truncated }) => {
            if truncated {
                if let Some(v) = handle_precision_lost(ctx, s, value) {
                    return Err(v);
                }
            }
            Ok(value)
        }
    }
}

fn string_view(ctx: &mut EvaluatorContext, txt: &Text) -> Result<String, Value> {
    match txt.as_str() {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            ctx.add_error(DiagnosticRecord::new(
                ErrorKind::FormatError,
                "invalid utf-8 sequence in character value",
            ));
            Err(error_value(ErrorKind::FormatError))
        }
    }
}

fn string_to_int(ctx: &mut EvaluatorContext, s: &str, target: IntTarget) -> Value {
    let d = match string_to_decimal_internal(ctx, s) {
        Ok(d) => d,
        Err(v) => return v,
    };
    if d.is_special() {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::FormatError,
            "special value passed for conversion to integral type",
        ))
        .new_argument(s)
        .new_argument(&d);
        return error_value(ErrorKind::FormatError);
    }
    validate_integer_range_from_decimal(ctx, &d, target)
}

fn string_to_float4(ctx: &mut EvaluatorContext, s: &str) -> Value {
    let d = match string_to_decimal_internal(ctx, s) {
        Ok(d) => d,
        Err(v) => return v,
    };
    if d.is_nan() && !is_valid_nan(s) {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::FormatError,
            "invalid string passed for conversion to float4",
        ))
        .new_argument(s);
        return error_value(ErrorKind::FormatError);
    }
    decimal_to_float4(&d)
}

fn string_to_float8(ctx: &mut EvaluatorContext, s: &str) -> Value {
    let d = match string_to_decimal_internal(ctx, s) {
        Ok(d) => d,
        Err(v) => return v,
    };
    if d.is_nan() && !is_valid_nan(s) {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::FormatError,
            "invalid string passed for conversion to float8",
        ))
        .new_argument(s);
        return error_value(ErrorKind::FormatError);
    }
    decimal_to_float8(&d)
}

fn string_to_decimal(
    ctx: &mut EvaluatorContext,
    s: &str,
    precision: Option<usize>,
    scale: Option<usize>,
) -> Value {
    let d = match string_to_decimal_internal(ctx, s) {
        Ok(d) => d,
        Err(v) => return v,
    };
    if d.is_special() {
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::FormatError,
            "invalid input since conversion generated special value that is not convertible to decimal",
        ))
        .new_argument(s)
        .new_argument(&d);
        return error_value(ErrorKind::FormatError);
    }
    handle_ps(ctx, &d, precision, scale)
}

fn string_to_boolean(ctx: &mut EvaluatorContext, s: &str) -> Value {
    let trimmed = s.trim_matches(' ');
    if trimmed.len() <= "true".len() && "true"[..trimmed.len()].eq_ignore_ascii_case(trimmed) && !trimmed.is_empty()
    {
        return Value::Boolean(true);
    }
    if trimmed.len() <= "false".len()
        && "false"[..trimmed.len()].eq_ignore_ascii_case(trimmed)
        && !trimmed.is_empty()
    {
        return Value::Boolean(false);
    }
    ctx.add_error(DiagnosticRecord::new(
        ErrorKind::FormatError,
        "invalid string passed for conversion to boolean",
    ))
    .new_argument(s);
    error_value(ErrorKind::FormatError)
}

fn hex_to_octet(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let hi = (bytes[i] as char).to_digit(16)?;
        let lo = (bytes[i + 1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
        i += 2;
    }
    Some(out)
}

fn octet_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

// ---------------------------------------------------------------------------
// LOB handling

fn lob_to_bytes(ctx: &mut EvaluatorContext, reference: &LobReference) -> Result<Vec<u8>, Value> {
    let service = lob::relay();
    match service.read_lob(reference) {
        Ok(bytes) => Ok(bytes),
        Err(info) => {
            ctx.set_error_info(info);
            Err(error_value(ErrorKind::ErrorInfoProvided))
        }
    }
}

// ---------------------------------------------------------------------------
// per-source dispatch

fn cast_from_boolean(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    match tgt {
        DataType::Boolean => value.clone(),
        DataType::Character { length, varying } => {
            let s: &[u8] = if value.to_boolean() { b"true" } else { b"false" };
            handle_length(ctx, s, *length, !varying, false, VarlenKind::Character)
        }
        _ => return_unsupported(),
    }
}

fn cast_from_int4(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    let src = value.to_int4();
    match tgt {
        DataType::Int1 => validate_integer_range_from_integer(ctx, i64::from(src), IntTarget::Int1),
        DataType::Int2 => validate_integer_range_from_integer(ctx, i64::from(src), IntTarget::Int2),
        DataType::Int4 => value.clone(),
        DataType::Int8 => Value::Int8(i64::from(src)),
        DataType::Float4 => Value::Float4(src as f32),
        DataType::Float8 => Value::Float8(f64::from(src)),
        DataType::Decimal { precision, scale } => {
            int_to_decimal(ctx, i64::from(src), *precision, *scale)
        }
        DataType::Character { length, varying } => handle_length(
            ctx,
            src.to_string().as_bytes(),
            *length,
            !varying,
            false,
            VarlenKind::Character,
        ),
        _ => return_unsupported(),
    }
}

fn cast_from_int8(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    let src = value.to_int8();
    match tgt {
        DataType::Int1 => validate_integer_range_from_integer(ctx, src, IntTarget::Int1),
        DataType::Int2 => validate_integer_range_from_integer(ctx, src, IntTarget::Int2),
        DataType::Int4 => validate_integer_range_from_integer(ctx, src, IntTarget::Int4),
        DataType::Int8 => value.clone(),
        DataType::Float4 => Value::Float4(src as f32),
        DataType::Float8 => Value::Float8(src as f64),
        DataType::Decimal { precision, scale } => int_to_decimal(ctx, src, *precision, *scale),
        DataType::Character { length, varying } => handle_length(
            ctx,
            src.to_string().as_bytes(),
            *length,
            !varying,
            false,
            VarlenKind::Character,
        ),
        _ => return_unsupported(),
    }
}

fn float_to_string(v: f64, is_f32: bool) -> String {
    if v.is_nan() {
        return STRING_POSITIVE_NAN.into();
    }
    if v.is_infinite() {
        return if v.is_sign_negative() {
            STRING_NEGATIVE_INFINITY.into()
        } else {
            STRING_POSITIVE_INFINITY.into()
        };
    }
    if is_f32 {
        format!("{:?}", v as f32)
    } else {
        format!("{v:?}")
    }
}

fn cast_from_float4(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    let src = value.to_float4();
    match tgt {
        DataType::Int1 => {
            validate_integer_range_from_float(ctx, f64::from(src), FloatSource::Float4, IntTarget::Int1)
        }
        DataType::Int2 => {
            validate_integer_range_from_float(ctx, f64::from(src), FloatSource::Float4, IntTarget::Int2)
        }
        DataType::Int4 => {
            validate_integer_range_from_float(ctx, f64::from(src), FloatSource::Float4, IntTarget::Int4)
        }
        DataType::Int8 => {
            validate_integer_range_from_float(ctx, f64::from(src), FloatSource::Float4, IntTarget::Int8)
        }
        DataType::Float4 => Value::Float4(if src.is_nan() { f32::NAN } else { src }),
        DataType::Float8 => Value::Float8(if src.is_nan() { f64::NAN } else { f64::from(src) }),
        DataType::Decimal { precision, scale } => {
            float_to_decimal(ctx, f64::from(src), *precision, *scale)
        }
        DataType::Character { length, varying } => handle_length(
            ctx,
            float_to_string(f64::from(src), true).as_bytes(),
            *length,
            !varying,
            false,
            VarlenKind::Character,
        ),
        _ => return_unsupported(),
    }
}

fn cast_from_float8(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    let src = value.to_float8();
    match tgt {
        DataType::Int1 => {
            validate_integer_range_from_float(ctx, src, FloatSource::Float8, IntTarget::Int1)
        }
        DataType::Int2 => {
            validate_integer_range_from_float(ctx, src, FloatSource::Float8, IntTarget::Int2)
        }
        DataType::Int4 => {
            validate_integer_range_from_float(ctx, src, FloatSource::Float8, IntTarget::Int4)
        }
        DataType::Int8 => {
            validate_integer_range_from_float(ctx, src, FloatSource::Float8, IntTarget::Int8)
        }
        DataType::Float4 => {
            if src.is_nan() {
                return Value::Float4(f32::NAN);
            }
            if !src.is_infinite() {
                // overflow and underflow do not lose precision: saturate to
                // ±infinity, flush tiny magnitudes to signed zero
                let max_tgt = f64::from(f32::MAX);
                let min_tgt = f64::from(f32::MIN);
                if max_tgt < src {
                    return Value::Float4(f32::INFINITY);
                }
                if src < min_tgt {
                    return Value::Float4(f32::NEG_INFINITY);
                }
                let low_bound = f64::from(f32::MIN_POSITIVE);
                if src < low_bound && -low_bound < src {
                    return Value::Float4(if src.is_sign_negative() { -0.0 } else { 0.0 });
                }
            }
            Value::Float4(src as f32)
        }
        DataType::Float8 => Value::Float8(if src.is_nan() { f64::NAN } else { src }),
        DataType::Decimal { precision, scale } => float_to_decimal(ctx, src, *precision, *scale),
        DataType::Character { length, varying } => handle_length(
            ctx,
            float_to_string(src, false).as_bytes(),
            *length,
            !varying,
            false,
            VarlenKind::Character,
        ),
        _ => return_unsupported(),
    }
}

fn cast_from_decimal(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    let src = Decimal::Finite(value.to_decimal());
    match tgt {
        DataType::Int1 => validate_integer_range_from_decimal(ctx, &src, IntTarget::Int1),
        DataType::Int2 => validate_integer_range_from_decimal(ctx, &src, IntTarget::Int2),
        DataType::Int4 => validate_integer_range_from_decimal(ctx, &src, IntTarget::Int4),
        DataType::Int8 => validate_integer_range_from_decimal(ctx, &src, IntTarget::Int8),
        DataType::Float4 => decimal_to_float4(&src),
        DataType::Float8 => decimal_to_float8(&src),
        DataType::Decimal { precision, scale } => handle_ps(ctx, &src, *precision, *scale),
        DataType::Character { length, varying } => handle_length(
            ctx,
            src.to_sci().as_bytes(),
            *length,
            !varying,
            false,
            VarlenKind::Character,
        ),
        _ => return_unsupported(),
    }
}

fn cast_from_character(
    ctx: &mut EvaluatorContext,
    tgt: &DataType,
    value: &Value,
    src_padded: bool,
) -> Value {
    let txt = value.to_character();
    match tgt {
        DataType::Boolean
        | DataType::Int1
        | DataType::Int2
        | DataType::Int4
        | DataType::Int8
        | DataType::Float4
        | DataType::Float8
        | DataType::Decimal { .. } => {
            let s = match string_view(ctx, txt) {
                Ok(s) => s,
                Err(v) => return v,
            };
            let trimmed = s.trim_matches(' ');
            match tgt {
                DataType::Boolean => string_to_boolean(ctx, &s),
                DataType::Int1 => string_to_int(ctx, trimmed, IntTarget::Int1),
                DataType::Int2 => string_to_int(ctx, trimmed, IntTarget::Int2),
                DataType::Int4 => string_to_int(ctx, trimmed, IntTarget::Int4),
                DataType::Int8 => string_to_int(ctx, trimmed, IntTarget::Int8),
                DataType::Float4 => string_to_float4(ctx, trimmed),
                DataType::Float8 => string_to_float8(ctx, trimmed),
                DataType::Decimal { precision, scale } => {
                    string_to_decimal(ctx, trimmed, *precision, *scale)
                }
                _ => return_unsupported(),
            }
        }
        DataType::Character { length, varying } => handle_length(
            ctx,
            txt.as_bytes(),
            *length,
            !varying,
            src_padded,
            VarlenKind::Character,
        ),
        DataType::Octet { length, varying } => {
            let s = match string_view(ctx, txt) {
                Ok(s) => s,
                Err(v) => return v,
            };
            let trimmed = s.trim_matches(' ');
            match hex_to_octet(trimmed) {
                Some(bytes) => {
                    handle_length(ctx, &bytes, *length, !varying, src_padded, VarlenKind::Octet)
                }
                None => {
                    ctx.add_error(DiagnosticRecord::new(
                        ErrorKind::FormatError,
                        "invalid hexadecimal string passed for conversion",
                    ))
                    .new_argument(&s);
                    error_value(ErrorKind::FormatError)
                }
            }
        }
        DataType::Clob => {
            let reference = lob::relay().register_generated(txt.as_bytes().to_vec());
            Value::Clob(reference)
        }
        _ => return_unsupported(),
    }
}

fn cast_from_octet(
    ctx: &mut EvaluatorContext,
    tgt: &DataType,
    value: &Value,
    src_padded: bool,
) -> Value {
    let octet = value.to_octet();
    match tgt {
        DataType::Character { length, varying } => handle_length(
            ctx,
            octet_to_hex(octet.as_bytes()).as_bytes(),
            *length,
            !varying,
            src_padded,
            VarlenKind::Character,
        ),
        DataType::Octet { length, varying } => handle_length(
            ctx,
            octet.as_bytes(),
            *length,
            !varying,
            src_padded,
            VarlenKind::Octet,
        ),
        DataType::Blob => {
            let reference = lob::relay().register_generated(octet.as_bytes().to_vec());
            Value::Blob(reference)
        }
        _ => return_unsupported(),
    }
}

fn cast_from_blob(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    match tgt {
        DataType::Octet { length, varying } => {
            let bytes = match lob_to_bytes(ctx, value.to_lob()) {
                Ok(b) => b,
                Err(v) => return v,
            };
            handle_length(ctx, &bytes, *length, !varying, false, VarlenKind::Octet)
        }
        DataType::Blob => value.clone(),
        _ => return_unsupported(),
    }
}

fn cast_from_clob(ctx: &mut EvaluatorContext, tgt: &DataType, value: &Value) -> Value {
    match tgt {
        DataType::Character { length, varying } => {
            let bytes = match lob_to_bytes(ctx, value.to_lob()) {
                Ok(b) => b,
                Err(v) => return v,
            };
            handle_length(ctx, &bytes, *length, !varying, false, VarlenKind::Character)
        }
        DataType::Clob => value.clone(),
        _ => return_unsupported(),
    }
}

/// Casts `value` from `src` to `tgt` under the context's loss policy.
pub fn conduct_cast(
    ctx: &mut EvaluatorContext,
    src: &DataType,
    tgt: &DataType,
    value: &Value,
) -> Value {
    let src_kind = src.kind();
    let tgt_kind = tgt.kind();
    // feature-gated types are validated even for NULL inputs
    if src_kind == TypeKind::Boolean || tgt_kind == TypeKind::Boolean {
        if let Some(v) = supports_boolean(ctx) {
            return v;
        }
    } else if matches!(src_kind, TypeKind::Int1 | TypeKind::Int2)
        || matches!(tgt_kind, TypeKind::Int1 | TypeKind::Int2)
    {
        if let Some(v) = supports_small_integers(ctx) {
            return v;
        }
    } else if matches!(src_kind, TypeKind::Blob | TypeKind::Clob)
        || matches!(tgt_kind, TypeKind::Blob | TypeKind::Clob)
    {
        if let Some(v) = supports_lobs(ctx) {
            return v;
        }
    }
    if src_kind.is_approximate()
        && matches!(
            tgt_kind,
            TypeKind::Int1 | TypeKind::Int2 | TypeKind::Int4 | TypeKind::Int8 | TypeKind::Decimal
        )
        && ctx.loss_policy() == LossPolicy::Implicit
    {
        // assignment conversion is not allowed from approximate numeric
        // types to exact numeric types
        ctx.add_error(DiagnosticRecord::new(
            ErrorKind::Unsupported,
            format!("unsupported type conversion source:{src_kind} target:{tgt_kind}"),
        ));
        return error_value(ErrorKind::Unsupported);
    }
    if value.is_null() {
        return Value::Null;
    }
    match src {
        DataType::Boolean => cast_from_boolean(ctx, tgt, value),
        DataType::Int1 | DataType::Int2 | DataType::Int4 => cast_from_int4(ctx, tgt, value),
        DataType::Int8 => cast_from_int8(ctx, tgt, value),
        DataType::Float4 => cast_from_float4(ctx, tgt, value),
        DataType::Float8 => cast_from_float8(ctx, tgt, value),
        DataType::Decimal { .. } => cast_from_decimal(ctx, tgt, value),
        DataType::Character { varying, .. } => cast_from_character(ctx, tgt, value, !varying),
        DataType::Octet { varying, .. } => cast_from_octet(ctx, tgt, value, !varying),
        DataType::Blob => cast_from_blob(ctx, tgt, value),
        DataType::Clob => cast_from_clob(ctx, tgt, value),
        DataType::Date | DataType::TimeOfDay | DataType::TimePoint => return_unsupported(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;
    use test_case::test_case;
    use weir_types::decimal::{clear_status, ensure_decimal_context};

    fn ctx_with(policy: LossPolicy) -> EvaluatorContext {
        ensure_decimal_context();
        clear_status();
        let mut ctx = EvaluatorContext::new(Arc::new(Config::default()));
        ctx.set_loss_policy(policy);
        ctx
    }

    fn cast(
        ctx: &mut EvaluatorContext,
        src: DataType,
        tgt: DataType,
        value: Value,
    ) -> Value {
        conduct_cast(ctx, &src, &tgt, &value)
    }

    fn varchar_n(n: usize) -> DataType {
        DataType::varchar(n)
    }

    fn text(s: &str) -> Value {
        Value::Character(Text::from(s))
    }

    #[test]
    fn decimal_cast_loss_follows_policy() {
        // CAST('1.2345' AS DECIMAL(3,2)) would need to truncate to 1.23
        let mut ctx = ctx_with(LossPolicy::Error);
        let v = cast(&mut ctx, varchar_n(10), DataType::decimal_ps(3, 2), text("1.2345"));
        assert_eq!(v.error_kind(), Some(ErrorKind::LostPrecision));

        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(&mut ctx, varchar_n(10), DataType::decimal_ps(3, 2), text("1.2345"));
        assert_eq!(v, Value::Decimal(Triple::from_parts(1, 123, -2)));
        assert!(ctx.lost_precision());

        let mut ctx = ctx_with(LossPolicy::Unknown);
        let v = cast(&mut ctx, varchar_n(10), DataType::decimal_ps(3, 2), text("1.2345"));
        assert!(v.is_null());
    }

    #[test]
    fn float_infinity_to_int_clamps_under_ignore() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(&mut ctx, DataType::Float4, DataType::Int4, Value::Float4(f32::INFINITY));
        assert_eq!(v, Value::Int4(i32::MAX));
        let v = cast(&mut ctx, DataType::Float4, DataType::Int4, Value::Float4(f32::NEG_INFINITY));
        assert_eq!(v, Value::Int4(i32::MIN));

        let mut ctx = ctx_with(LossPolicy::Error);
        let v = cast(&mut ctx, DataType::Float4, DataType::Int4, Value::Float4(f32::INFINITY));
        assert_eq!(v.error_kind(), Some(ErrorKind::LostPrecision));
    }

    #[test]
    fn float_nan_to_int_is_arithmetic_error() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(&mut ctx, DataType::Float8, DataType::Int8, Value::Float8(f64::NAN));
        assert_eq!(v.error_kind(), Some(ErrorKind::ArithmeticError));
    }

    #[test]
    fn float_to_int_bound_uses_largest_integral_float() {
        // the f32 value nearest i32::MAX is 2^31, which is out of range
        let mut ctx = ctx_with(LossPolicy::Error);
        let boundary = (i32::MAX - 127) as f32;
        let v = cast(&mut ctx, DataType::Float4, DataType::Int4, Value::Float4(boundary));
        assert_eq!(v, Value::Int4(i32::MAX - 127));
        let above = 2f32.powi(31);
        let v = cast(&mut ctx, DataType::Float4, DataType::Int4, Value::Float4(above));
        assert_eq!(v.error_kind(), Some(ErrorKind::LostPrecision));
    }

    #[test]
    fn float_truncates_toward_zero() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        assert_eq!(
            cast(&mut ctx, DataType::Float8, DataType::Int4, Value::Float8(3.9)),
            Value::Int4(3)
        );
        assert_eq!(
            cast(&mut ctx, DataType::Float8, DataType::Int4, Value::Float8(-3.9)),
            Value::Int4(-3)
        );
    }

    #[test]
    fn implicit_policy_forbids_float_to_exact() {
        let mut ctx = ctx_with(LossPolicy::Implicit);
        let v = cast(&mut ctx, DataType::Float8, DataType::Int8, Value::Float8(1.0));
        assert_eq!(v.error_kind(), Some(ErrorKind::Unsupported));
        let v = cast(&mut ctx, DataType::Float8, DataType::decimal_ps(10, 0), Value::Float8(1.0));
        assert_eq!(v.error_kind(), Some(ErrorKind::Unsupported));
        // exact to exact narrows normally
        let v = cast(&mut ctx, DataType::Int8, DataType::Int4, Value::Int8(5));
        assert_eq!(v, Value::Int4(5));
    }

    #[test]
    fn null_passes_through_after_gates() {
        let mut ctx = ctx_with(LossPolicy::Error);
        assert!(cast(&mut ctx, DataType::Int8, DataType::Int4, Value::Null).is_null());
        // gated types reject even NULL while disabled
        let v = cast(&mut ctx, DataType::Boolean, varchar_n(5), Value::Null);
        assert_eq!(v.error_kind(), Some(ErrorKind::Unsupported));
    }

    #[test]
    fn smallint_gate_honors_configuration() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(&mut ctx, DataType::Int4, DataType::Int2, Value::Int4(1));
        assert_eq!(v.error_kind(), Some(ErrorKind::Unsupported));

        ensure_decimal_context();
        let config = Config { support_smallint: true, ..Config::default() };
        let mut ctx = EvaluatorContext::new(Arc::new(config));
        let v = cast(&mut ctx, DataType::Int4, DataType::Int2, Value::Int4(70_000));
        // int2 range-clamps but stores the int4 runtime representation
        assert_eq!(v, Value::Int4(i64::from(i16::MAX) as i32));
    }

    #[test]
    fn string_to_numeric_trims_and_validates() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        assert_eq!(cast(&mut ctx, varchar_n(10), DataType::Int4, text("  42  ")), Value::Int4(42));
        assert_eq!(
            cast(&mut ctx, varchar_n(10), DataType::Int8, text("1e3")),
            Value::Int8(1000)
        );
        let v = cast(&mut ctx, varchar_n(10), DataType::Int4, text("abc"));
        assert_eq!(v.error_kind(), Some(ErrorKind::FormatError));
        // NaN spellings are only valid for float targets
        let v = cast(&mut ctx, varchar_n(10), DataType::Int4, text("NaN"));
        assert_eq!(v.error_kind(), Some(ErrorKind::FormatError));
        let v = cast(&mut ctx, varchar_n(10), DataType::Float8, text("-NaN"));
        assert!(matches!(v, Value::Float8(f) if f.is_nan()));
    }

    #[test]
    fn string_to_boolean_accepts_prefixes() {
        ensure_decimal_context();
        let config = Config { support_boolean: true, ..Config::default() };
        let mut ctx = EvaluatorContext::new(Arc::new(config));
        assert_eq!(
            cast(&mut ctx, varchar_n(5), DataType::Boolean, text("t")),
            Value::Boolean(true)
        );
        assert_eq!(
            cast(&mut ctx, varchar_n(5), DataType::Boolean, text("FALSE")),
            Value::Boolean(false)
        );
        let v = cast(&mut ctx, varchar_n(5), DataType::Boolean, text("yes"));
        assert_eq!(v.error_kind(), Some(ErrorKind::FormatError));
    }

    #[test]
    fn varchar_truncation_respects_policy_and_idempotence() {
        let mut ctx = ctx_with(LossPolicy::Error);
        let v = cast(&mut ctx, varchar_n(10), varchar_n(3), text("abcdef"));
        assert_eq!(v.error_kind(), Some(ErrorKind::LostPrecisionValueTooLong));

        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(&mut ctx, varchar_n(10), varchar_n(3), text("abcdef"));
        assert_eq!(v, text("abc"));

        // casting again to the same length changes nothing
        let again = cast(&mut ctx, varchar_n(3), varchar_n(3), v.clone());
        assert_eq!(again, v);
    }

    #[test]
    fn varchar_truncation_cuts_at_utf8_boundary() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        // "日" is three bytes; a 4-byte limit keeps exactly one character
        let v = cast(&mut ctx, varchar_n(10), varchar_n(4), text("日本"));
        assert_eq!(v, text("日"));
    }

    #[test]
    fn char_fixed_pads_with_spaces() {
        let mut ctx = ctx_with(LossPolicy::Error);
        let v = cast(&mut ctx, varchar_n(5), DataType::char_fixed(4), text("ab"));
        assert_eq!(v, text("ab  "));
        // truncating a padded source's trailing spaces is not a loss
        let v = cast(&mut ctx, DataType::char_fixed(4), varchar_n(2), text("ab  "));
        assert_eq!(v, text("ab"));
    }

    #[test]
    fn octet_hex_round_trip() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(
            &mut ctx,
            DataType::varbinary(4),
            varchar_n(10),
            Value::Octet(Octet::from(vec![0xde, 0xad])),
        );
        assert_eq!(v, text("dead"));
        let v = cast(&mut ctx, varchar_n(10), DataType::varbinary(4), text("DEAD"));
        assert_eq!(v, Value::Octet(Octet::from(vec![0xde, 0xad])));
        let v = cast(&mut ctx, varchar_n(10), DataType::varbinary(4), text("xyz"));
        assert_eq!(v.error_kind(), Some(ErrorKind::FormatError));
    }

    #[test]
    fn decimal_to_decimal_clamps_to_max() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        // 123.4 into decimal(3,2): integer digits exceed p-s, clamp to 9.99
        let v = cast(
            &mut ctx,
            DataType::decimal(),
            DataType::decimal_ps(3, 2),
            Value::Decimal(Triple::from_parts(1, 1234, -1)),
        );
        assert_eq!(v, Value::Decimal(Triple::from_parts(1, 999, -2)));
        // zero always fits
        let mut ctx = ctx_with(LossPolicy::Error);
        let v = cast(
            &mut ctx,
            DataType::decimal(),
            DataType::decimal_ps(3, 2),
            Value::Decimal(Triple::from_parts(0, 0, 0)),
        );
        assert_eq!(v, Value::Decimal(Triple::from_parts(0, 0, 0)));
    }

    #[test]
    fn float_infinity_to_decimal_clamps_to_triple_extremes() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(
            &mut ctx,
            DataType::Float8,
            DataType::decimal_ps(10, 0),
            Value::Float8(f64::INFINITY),
        );
        assert_eq!(v, Value::Decimal(TRIPLE_MAX));
        let v = cast(
            &mut ctx,
            DataType::Float8,
            DataType::decimal_ps(10, 0),
            Value::Float8(f64::NEG_INFINITY),
        );
        assert_eq!(v, Value::Decimal(TRIPLE_MIN));
        let v = cast(
            &mut ctx,
            DataType::Float8,
            DataType::decimal_ps(10, 0),
            Value::Float8(f64::NAN),
        );
        assert_eq!(v.error_kind(), Some(ErrorKind::ArithmeticError));
    }

    #[test_case(Value::Int4(42), DataType::Int4, "42"; "int4")]
    #[test_case(Value::Float8(1.5), DataType::Float8, "1.5"; "float8")]
    #[test_case(Value::Float8(f64::NAN), DataType::Float8, "NaN"; "nan never prints a sign")]
    #[test_case(Value::Float4(f32::NEG_INFINITY), DataType::Float4, "-Infinity"; "negative infinity")]
    #[test_case(Value::Decimal(Triple::from_parts(1, 123, -2)), DataType::decimal(), "1.23"; "decimal")]
    fn to_character_renderings(value: Value, src: DataType, expected: &str) {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(&mut ctx, src, DataType::character_varying(), value);
        assert_eq!(v, text(expected));
    }

    #[test]
    fn character_to_clob_generates_reference() {
        let mut ctx = ctx_with(LossPolicy::Ignore);
        let v = cast(&mut ctx, varchar_n(5), DataType::Clob, text("lobby"));
        let Value::Clob(reference) = &v else { panic!("expected clob, got {v:?}") };
        let bytes = crate::lob::relay().read_lob(reference).unwrap();
        assert_eq!(bytes, b"lobby");
        // and back through clob -> character
        let v2 = cast(&mut ctx, DataType::Clob, varchar_n(10), v.clone());
        assert_eq!(v2, text("lobby"));
    }

    #[test]
    fn warn_policy_records_diagnostic_and_returns_value() {
        let mut ctx = ctx_with(LossPolicy::Warn);
        let v = cast(&mut ctx, DataType::Float8, DataType::Int4, Value::Float8(1.5));
        assert_eq!(v, Value::Int4(1));
        assert!(ctx.lost_precision());
        assert_eq!(ctx.errors().last().map(|d| d.kind), Some(ErrorKind::LostPrecision));
    }

    #[test]
    fn floor_and_ceil_policies_are_unsupported() {
        for policy in [LossPolicy::Floor, LossPolicy::Ceil] {
            let mut ctx = ctx_with(policy);
            let v = cast(&mut ctx, DataType::Float8, DataType::Int4, Value::Float8(1.5));
            assert_eq!(v.error_kind(), Some(ErrorKind::Unsupported));
        }
    }
}
