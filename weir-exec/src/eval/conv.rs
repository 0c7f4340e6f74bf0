//! Unifying conversion of conditional/coalesce branches.
//!
//! The selected branch's value is converted to the node's declared result
//! type. The conversion never applies the caller's loss policy: it runs the
//! cast matrix with the policy forced to `ignore` and restores it afterwards.

use weir_plan::LossPolicy;
use weir_types::{DataType, Value};

use super::cast::conduct_cast;
use super::context::EvaluatorContext;

/// True when a value of `src` needs converting to land in `dst`.
pub fn requires_conversion(src: &DataType, dst: &DataType) -> bool {
    src != dst
}

/// Converts `value` from `src` to `dst` when they differ.
pub fn unifying_convert(
    ctx: &mut EvaluatorContext,
    src: &DataType,
    dst: &DataType,
    value: Value,
) -> Value {
    if !requires_conversion(src, dst) {
        return value;
    }
    let original = ctx.set_loss_policy(LossPolicy::Ignore);
    let converted = conduct_cast(ctx, src, dst, &value);
    ctx.set_loss_policy(original);
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;
    use weir_types::decimal::ensure_decimal_context;

    #[test]
    fn identical_types_pass_through() {
        let mut ctx = EvaluatorContext::new(Arc::new(Config::default()));
        let v = unifying_convert(&mut ctx, &DataType::Int4, &DataType::Int4, Value::Int4(1));
        assert_eq!(v, Value::Int4(1));
    }

    #[test]
    fn widening_applies_cast() {
        ensure_decimal_context();
        let mut ctx = EvaluatorContext::new(Arc::new(Config::default()));
        let v = unifying_convert(&mut ctx, &DataType::Int4, &DataType::Int8, Value::Int4(7));
        assert_eq!(v, Value::Int8(7));
        // the caller's policy survives the conversion
        assert_eq!(ctx.loss_policy(), weir_plan::LossPolicy::Ignore);
    }
}
