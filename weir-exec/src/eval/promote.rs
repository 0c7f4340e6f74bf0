//! Binary numeric promotion.
//!
//! The lattice: `int4 < int8 < decimal`; mixing an integer with a float
//! promotes to `float8`, as does mixing a float with a decimal (triple to
//! double). `float4` against `float4` also widens to `float8`. Strings, dates
//! and times never promote: both sides must already carry the same kind.

use weir_types::{Decimal, Triple, Value, ValueIndex};

use super::return_unsupported;

fn triple_from_i64(v: i64) -> Value {
    Value::Decimal(Triple::from_i64(v))
}

fn triple_to_double(t: Triple) -> f64 {
    Decimal::Finite(t).to_f64()
}

/// Promotes `l` so that it matches the joined type of `(l, r)`.
fn promote_left(l: &Value, r: &Value) -> Value {
    use ValueIndex as I;
    match l.type_index() {
        I::Int4 => {
            let v = l.to_int4();
            match r.type_index() {
                I::Int4 => l.clone(),
                I::Int8 => Value::Int8(i64::from(v)),
                I::Float4 => Value::Float8(f64::from(v)),
                I::Float8 => Value::Float8(f64::from(v)),
                I::Decimal => triple_from_i64(i64::from(v)),
                _ => return_unsupported(),
            }
        }
        I::Int8 => {
            let v = l.to_int8();
            match r.type_index() {
                I::Int4 | I::Int8 => l.clone(),
                I::Float4 | I::Float8 => Value::Float8(v as f64),
                I::Decimal => triple_from_i64(v),
                _ => return_unsupported(),
            }
        }
        I::Float4 => {
            let v = l.to_float4();
            match r.type_index() {
                // float4 against float4 joins at float8
                I::Int4 | I::Int8 | I::Float4 | I::Float8 | I::Decimal => {
                    Value::Float8(f64::from(v))
                }
                _ => return_unsupported(),
            }
        }
        I::Float8 => match r.type_index() {
            I::Int4 | I::Int8 | I::Float4 | I::Float8 | I::Decimal => l.clone(),
            _ => return_unsupported(),
        },
        I::Decimal => match r.type_index() {
            I::Int4 | I::Int8 | I::Decimal => l.clone(),
            I::Float4 | I::Float8 => Value::Float8(triple_to_double(l.to_decimal())),
            _ => return_unsupported(),
        },
        I::Character | I::Octet | I::Date | I::TimeOfDay | I::TimePoint => {
            if l.type_index() != r.type_index() {
                return return_unsupported();
            }
            l.clone()
        }
        _ => return_unsupported(),
    }
}

/// Promotes both operands to their joined numeric type.
///
/// Either output may be the `unsupported` error sentinel; for all valid
/// pairs both outputs share one `type_index`.
pub fn promote_binary_numeric(l: &Value, r: &Value) -> (Value, Value) {
    (promote_left(l, r), promote_left(r, l))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use weir_types::ErrorKind;

    #[test_case(Value::Int4(1), Value::Int8(2), ValueIndex::Int8; "int4 int8")]
    #[test_case(Value::Int4(1), Value::Int4(2), ValueIndex::Int4; "int4 int4")]
    #[test_case(Value::Int8(1), Value::Decimal(Triple::from_i64(2)), ValueIndex::Decimal; "int8 decimal")]
    #[test_case(Value::Float4(1.0), Value::Float4(2.0), ValueIndex::Float8; "float4 float4 widens")]
    #[test_case(Value::Float4(1.0), Value::Int4(2), ValueIndex::Float8; "float4 int4")]
    #[test_case(Value::Decimal(Triple::from_i64(1)), Value::Float4(2.0), ValueIndex::Float8; "decimal float4")]
    #[test_case(Value::Float8(1.0), Value::Decimal(Triple::from_i64(2)), ValueIndex::Float8; "float8 decimal")]
    fn joined_types(l: Value, r: Value, expected: ValueIndex) {
        weir_types::decimal::ensure_decimal_context();
        let (pl, pr) = promote_binary_numeric(&l, &r);
        assert_eq!(pl.type_index(), expected);
        assert_eq!(pr.type_index(), expected);
    }

    #[test]
    fn strings_must_match() {
        let l = Value::Character(weir_types::Text::from("a"));
        let r = Value::Character(weir_types::Text::from("b"));
        let (pl, pr) = promote_binary_numeric(&l, &r);
        assert_eq!(pl, l);
        assert_eq!(pr, r);

        let (pl, _) = promote_binary_numeric(&l, &Value::Int4(1));
        assert_eq!(pl.error_kind(), Some(ErrorKind::Unsupported));
    }

    #[test]
    fn promoted_pair_shares_type_index_or_unsupported() {
        let candidates = [
            Value::Int4(3),
            Value::Int8(-4),
            Value::Float4(0.5),
            Value::Float8(2.5),
            Value::Decimal(Triple::from_i64(7)),
        ];
        for l in &candidates {
            for r in &candidates {
                let (pl, pr) = promote_binary_numeric(l, r);
                assert!(!pl.is_error() && !pr.is_error());
                assert_eq!(pl.type_index(), pr.type_index());
            }
        }
    }
}
