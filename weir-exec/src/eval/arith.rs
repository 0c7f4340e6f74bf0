//! Binary arithmetic, concatenation, three-valued logic and comparisons.
//!
//! Integer arithmetic wraps on overflow; callers wanting saturation cast to
//! decimal first. Division and remainder by zero yield `arithmetic_error`.
//! Remainder is defined for int4/int8/decimal only.

use weir_plan::CompareOp;
use weir_types::decimal::{self, DecimalStatus};
use weir_types::{Decimal, ErrorKind, Triple, Value, ValueIndex};

use super::promote::promote_binary_numeric;
use super::return_unsupported;

/// Finishes a decimal operation: checks the status bits and reduces the
/// result into value-store canonical form.
fn decimal_result(d: Decimal) -> Value {
    let status = decimal::status();
    if status.contains(DecimalStatus::INVALID_OPERATION) {
        return Value::Error(ErrorKind::ArithmeticError);
    }
    if status.contains(DecimalStatus::OVERFLOW) {
        return Value::Error(ErrorKind::Overflow);
    }
    match d.reduce() {
        Decimal::Finite(t) => Value::Decimal(t),
        _ => Value::Error(ErrorKind::ArithmeticError),
    }
}

fn decimal_binary(l: Triple, r: Triple, f: impl FnOnce(Decimal, Decimal) -> Decimal) -> Value {
    decimal::clear_status();
    decimal_result(f(Decimal::Finite(l), Decimal::Finite(r)))
}

/// `l + r` after numeric promotion.
pub fn add_values(l: &Value, r: &Value) -> Value {
    debug_assert!(l.has_value() && r.has_value());
    let (l, r) = promote_binary_numeric(l, r);
    match l.type_index() {
        ValueIndex::Int4 => Value::Int4(l.to_int4().wrapping_add(r.to_int4())),
        ValueIndex::Int8 => Value::Int8(l.to_int8().wrapping_add(r.to_int8())),
        ValueIndex::Float4 => Value::Float4(l.to_float4() + r.to_float4()),
        ValueIndex::Float8 => Value::Float8(l.to_float8() + r.to_float8()),
        ValueIndex::Decimal => decimal_binary(l.to_decimal(), r.to_decimal(), |a, b| a + b),
        _ => return_unsupported(),
    }
}

/// `l - r` after numeric promotion.
pub fn subtract_values(l: &Value, r: &Value) -> Value {
    debug_assert!(l.has_value() && r.has_value());
    let (l, r) = promote_binary_numeric(l, r);
    match l.type_index() {
        ValueIndex::Int4 => Value::Int4(l.to_int4().wrapping_sub(r.to_int4())),
        ValueIndex::Int8 => Value::Int8(l.to_int8().wrapping_sub(r.to_int8())),
        ValueIndex::Float4 => Value::Float4(l.to_float4() - r.to_float4()),
        ValueIndex::Float8 => Value::Float8(l.to_float8() - r.to_float8()),
        ValueIndex::Decimal => decimal_binary(l.to_decimal(), r.to_decimal(), |a, b| a - b),
        _ => return_unsupported(),
    }
}

/// `l * r` after numeric promotion.
pub fn multiply_values(l: &Value, r: &Value) -> Value {
    debug_assert!(l.has_value() && r.has_value());
    let (l, r) = promote_binary_numeric(l, r);
    match l.type_index() {
        ValueIndex::Int4 => Value::Int4(l.to_int4().wrapping_mul(r.to_int4())),
        ValueIndex::Int8 => Value::Int8(l.to_int8().wrapping_mul(r.to_int8())),
        ValueIndex::Float4 => Value::Float4(l.to_float4() * r.to_float4()),
        ValueIndex::Float8 => Value::Float8(l.to_float8() * r.to_float8()),
        ValueIndex::Decimal => decimal_binary(l.to_decimal(), r.to_decimal(), |a, b| a * b),
        _ => return_unsupported(),
    }
}

/// `l / r` after numeric promotion; division by zero is `arithmetic_error`.
pub fn divide_values(l: &Value, r: &Value) -> Value {
    debug_assert!(l.has_value() && r.has_value());
    let (l, r) = promote_binary_numeric(l, r);
    match l.type_index() {
        ValueIndex::Int4 => {
            if r.to_int4() == 0 {
                return Value::Error(ErrorKind::ArithmeticError);
            }
            Value::Int4(l.to_int4().wrapping_div(r.to_int4()))
        }
        ValueIndex::Int8 => {
            if r.to_int8() == 0 {
                return Value::Error(ErrorKind::ArithmeticError);
            }
            Value::Int8(l.to_int8().wrapping_div(r.to_int8()))
        }
        ValueIndex::Float4 => Value::Float4(l.to_float4() / r.to_float4()),
        ValueIndex::Float8 => Value::Float8(l.to_float8() / r.to_float8()),
        ValueIndex::Decimal => {
            if r.to_decimal().is_zero() {
                return Value::Error(ErrorKind::ArithmeticError);
            }
            decimal_binary(l.to_decimal(), r.to_decimal(), |a, b| a / b)
        }
        _ => return_unsupported(),
    }
}

/// `l % r` after numeric promotion; defined for int4/int8/decimal only.
pub fn remainder_values(l: &Value, r: &Value) -> Value {
    debug_assert!(l.has_value() && r.has_value());
    let (l, r) = promote_binary_numeric(l, r);
    match l.type_index() {
        ValueIndex::Int4 => {
            if r.to_int4() == 0 {
                return Value::Error(ErrorKind::ArithmeticError);
            }
            Value::Int4(l.to_int4().wrapping_rem(r.to_int4()))
        }
        ValueIndex::Int8 => {
            if r.to_int8() == 0 {
                return Value::Error(ErrorKind::ArithmeticError);
            }
            Value::Int8(l.to_int8().wrapping_rem(r.to_int8()))
        }
        ValueIndex::Decimal => {
            if r.to_decimal().is_zero() {
                return Value::Error(ErrorKind::ArithmeticError);
            }
            decimal_binary(l.to_decimal(), r.to_decimal(), |a, b| a % b)
        }
        _ => return_unsupported(),
    }
}

/// `l || r`; character strings only.
pub fn concat_values(l: &Value, r: &Value) -> Value {
    debug_assert!(l.has_value() && r.has_value());
    match (l, r) {
        (Value::Character(a), Value::Character(b)) => Value::Character(a.concat(b)),
        _ => return_unsupported(),
    }
}

/// Three-valued `AND`. FALSE dominates regardless of NULL on the other side.
pub fn conditional_and(l: &Value, r: &Value) -> Value {
    for side in [l, r] {
        if side.has_value() {
            if side.type_index() != ValueIndex::Boolean {
                return return_unsupported();
            }
            if !side.to_boolean() {
                return side.clone();
            }
        }
    }
    // both are TRUE or NULL
    if l.is_null() || r.is_null() {
        return Value::Null;
    }
    Value::Boolean(true)
}

/// Three-valued `OR`. TRUE dominates regardless of NULL on the other side.
pub fn conditional_or(l: &Value, r: &Value) -> Value {
    for side in [l, r] {
        if side.has_value() {
            if side.type_index() != ValueIndex::Boolean {
                return return_unsupported();
            }
            if side.to_boolean() {
                return side.clone();
            }
        }
    }
    // both are FALSE or NULL
    if l.is_null() || r.is_null() {
        return Value::Null;
    }
    Value::Boolean(false)
}

/// Comparison built from `equal` and `less` primitives, so the float results
/// match IEEE semantics: `NaN <> x` holds, `NaN >= x` holds (not-less), every
/// other comparison with NaN fails.
fn compare_with<T>(op: CompareOp, l: T, r: T, equal: impl Fn(&T, &T) -> bool, less: impl Fn(&T, &T) -> bool) -> Value {
    let result = match op {
        CompareOp::Equal => equal(&l, &r),
        CompareOp::NotEqual => !equal(&l, &r),
        CompareOp::Greater => less(&r, &l),
        CompareOp::GreaterEqual => !less(&l, &r),
        CompareOp::Less => less(&l, &r),
        CompareOp::LessEqual => !less(&r, &l),
    };
    Value::Boolean(result)
}

/// Compares two values after numeric promotion. Strings and octets compare
/// as raw bytes.
pub fn compare_values(op: CompareOp, l: &Value, r: &Value) -> Value {
    debug_assert!(l.has_value() && r.has_value());
    let (l, r) = promote_binary_numeric(l, r);
    match l.type_index() {
        ValueIndex::Int4 => compare_with(op, l.to_int4(), r.to_int4(), |a, b| a == b, |a, b| a < b),
        ValueIndex::Int8 => compare_with(op, l.to_int8(), r.to_int8(), |a, b| a == b, |a, b| a < b),
        ValueIndex::Float4 => {
            compare_with(op, l.to_float4(), r.to_float4(), |a, b| a == b, |a, b| a < b)
        }
        ValueIndex::Float8 => {
            compare_with(op, l.to_float8(), r.to_float8(), |a, b| a == b, |a, b| a < b)
        }
        ValueIndex::Decimal => compare_with(
            op,
            Decimal::Finite(l.to_decimal()),
            Decimal::Finite(r.to_decimal()),
            |a, b| a.cmp_numeric(b) == Some(core::cmp::Ordering::Equal),
            |a, b| a.cmp_numeric(b) == Some(core::cmp::Ordering::Less),
        ),
        ValueIndex::Character => {
            compare_with(op, l.to_character(), r.to_character(), |a, b| a == b, |a, b| a < b)
        }
        ValueIndex::Octet => {
            compare_with(op, l.to_octet(), r.to_octet(), |a, b| a == b, |a, b| a < b)
        }
        ValueIndex::Date => compare_with(op, l.to_date(), r.to_date(), |a, b| a == b, |a, b| a < b),
        ValueIndex::TimeOfDay => {
            compare_with(op, l.to_time_of_day(), r.to_time_of_day(), |a, b| a == b, |a, b| a < b)
        }
        ValueIndex::TimePoint => {
            compare_with(op, l.to_time_point(), r.to_time_point(), |a, b| a == b, |a, b| a < b)
        }
        _ => return_unsupported(),
    }
}

/// Numeric sign inversion; integers wrap at the type minimum.
pub fn sign_inversion(v: &Value) -> Value {
    debug_assert!(v.has_value());
    match v {
        Value::Int4(x) => Value::Int4(x.wrapping_neg()),
        Value::Int8(x) => Value::Int8(x.wrapping_neg()),
        Value::Float4(x) => Value::Float4(-x),
        Value::Float8(x) => Value::Float8(-x),
        Value::Decimal(t) => match -Decimal::Finite(*t) {
            Decimal::Finite(n) => Value::Decimal(n),
            _ => Value::Error(ErrorKind::ArithmeticError),
        },
        _ => return_unsupported(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use weir_types::decimal::ensure_decimal_context;

    fn t(v: i64) -> Value {
        Value::Decimal(Triple::from_i64(v))
    }

    #[test]
    fn int4_overflow_wraps() {
        assert_eq!(add_values(&Value::Int4(i32::MAX), &Value::Int4(1)), Value::Int4(i32::MIN));
        assert_eq!(
            multiply_values(&Value::Int4(i32::MAX), &Value::Int4(2)),
            Value::Int4(-2)
        );
        assert_eq!(sign_inversion(&Value::Int4(i32::MIN)), Value::Int4(i32::MIN));
    }

    #[test]
    fn division_by_zero_is_arithmetic_error() {
        ensure_decimal_context();
        for (l, r) in [
            (Value::Int4(1), Value::Int4(0)),
            (Value::Int8(1), Value::Int8(0)),
            (t(1), t(0)),
        ] {
            assert_eq!(divide_values(&l, &r).error_kind(), Some(ErrorKind::ArithmeticError));
            assert_eq!(remainder_values(&l, &r).error_kind(), Some(ErrorKind::ArithmeticError));
        }
    }

    #[test]
    fn float_division_by_zero_is_infinite() {
        let v = divide_values(&Value::Float8(1.0), &Value::Float8(0.0));
        assert_eq!(v, Value::Float8(f64::INFINITY));
    }

    #[test]
    fn remainder_rejects_floats() {
        let v = remainder_values(&Value::Float8(7.0), &Value::Float8(2.0));
        assert_eq!(v.error_kind(), Some(ErrorKind::Unsupported));
    }

    #[test]
    fn decimal_add_reduces() {
        ensure_decimal_context();
        let a = Value::Decimal(Triple::from_parts(1, 110, -2));
        let b = Value::Decimal(Triple::from_parts(1, 190, -2));
        // 1.10 + 1.90 = 3, reduced
        assert_eq!(add_values(&a, &b), Value::Decimal(Triple::from_i64(3)));
    }

    // three-valued logic truth tables
    #[test_case(Value::Boolean(true), Value::Null, Value::Null; "true and null")]
    #[test_case(Value::Boolean(false), Value::Null, Value::Boolean(false); "false and null")]
    #[test_case(Value::Null, Value::Null, Value::Null; "null and null")]
    #[test_case(Value::Null, Value::Boolean(false), Value::Boolean(false); "null and false")]
    #[test_case(Value::Boolean(true), Value::Boolean(true), Value::Boolean(true); "true and true")]
    fn and_table(l: Value, r: Value, expected: Value) {
        assert_eq!(conditional_and(&l, &r), expected);
    }

    #[test_case(Value::Boolean(false), Value::Null, Value::Null; "false or null")]
    #[test_case(Value::Boolean(true), Value::Null, Value::Boolean(true); "true or null")]
    #[test_case(Value::Null, Value::Null, Value::Null; "null or null")]
    #[test_case(Value::Null, Value::Boolean(true), Value::Boolean(true); "null or true")]
    #[test_case(Value::Boolean(false), Value::Boolean(false), Value::Boolean(false); "false or false")]
    fn or_table(l: Value, r: Value, expected: Value) {
        assert_eq!(conditional_or(&l, &r), expected);
    }

    #[test]
    fn nan_comparisons_follow_primitive_semantics() {
        let nan = Value::Float8(f64::NAN);
        let one = Value::Float8(1.0);
        assert_eq!(compare_values(CompareOp::Equal, &nan, &one), Value::Boolean(false));
        assert_eq!(compare_values(CompareOp::NotEqual, &nan, &one), Value::Boolean(true));
        assert_eq!(compare_values(CompareOp::Less, &nan, &one), Value::Boolean(false));
        // not-less encodes greater-equal
        assert_eq!(compare_values(CompareOp::GreaterEqual, &nan, &one), Value::Boolean(true));
    }

    #[test]
    fn mixed_numeric_comparison_promotes() {
        ensure_decimal_context();
        assert_eq!(
            compare_values(CompareOp::Less, &Value::Int4(1), &t(2)),
            Value::Boolean(true)
        );
        assert_eq!(
            compare_values(CompareOp::Equal, &Value::Float4(1.5), &Value::Float8(1.5)),
            Value::Boolean(true)
        );
    }

    #[test]
    fn strings_compare_as_raw_bytes() {
        let a = Value::Character(weir_types::Text::from("ab"));
        let b = Value::Character(weir_types::Text::from("b"));
        assert_eq!(compare_values(CompareOp::Less, &a, &b), Value::Boolean(true));
    }

    #[test]
    fn concat_is_character_only() {
        let a = Value::Character(weir_types::Text::from("ab"));
        let b = Value::Character(weir_types::Text::from("cd"));
        assert_eq!(concat_values(&a, &b), Value::Character(weir_types::Text::from("abcd")));
        assert!(concat_values(&Value::Int4(1), &Value::Int4(2)).is_error());
    }
}
