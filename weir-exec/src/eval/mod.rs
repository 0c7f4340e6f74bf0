//! The expression evaluator.
//!
//! A recursive interpreter over the closed scalar node set. Every visit
//! returns a [`Value`]: a runtime value, NULL, or an error sentinel. NULL
//! operands propagate except through the `IS ...` predicates, three-valued
//! AND/OR, conditional and coalesce.

pub mod arith;
pub mod cast;
pub mod context;
pub mod conv;
pub mod like;
pub mod promote;

use std::panic::{catch_unwind, AssertUnwindSafe};

use weir_plan::{BinaryOp, Expression, ExpressionKind, MatchKind, UnaryOp};
use weir_types::decimal::ensure_decimal_context;
use weir_types::{ErrorKind, LobProvider, Value, ValueIndex};

use crate::function::scalar_function_repository;
use crate::lob;
use crate::process::variable_table::VariableTable;

pub use context::{DiagnosticRecord, EvaluatorContext};

pub(crate) fn return_unsupported() -> Value {
    Value::Error(ErrorKind::Unsupported)
}

pub(crate) fn return_invalid_input_value() -> Value {
    Value::Error(ErrorKind::InvalidInputValue)
}

/// Evaluator bound to one expression and an optional host-variable table.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    expression: &'a Expression,
    host_variables: Option<&'a VariableTable>,
}

impl<'a> Evaluator<'a> {
    /// Binds the evaluator to `expression`.
    pub fn new(expression: &'a Expression) -> Self {
        Self { expression, host_variables: None }
    }

    /// Binds the evaluator with host variables (statement parameters).
    pub fn with_host_variables(expression: &'a Expression, host: &'a VariableTable) -> Self {
        Self { expression, host_variables: Some(host) }
    }

    /// Evaluates the expression against `variables`.
    ///
    /// Internal faults (poisoned decimal state and the like) are caught at
    /// this boundary and surfaced as `undefined` with a diagnostic.
    pub fn evaluate(&self, ctx: &mut EvaluatorContext, variables: &VariableTable) -> Value {
        ensure_decimal_context();
        let result = catch_unwind(AssertUnwindSafe(|| {
            dispatch(ctx, self.expression, variables, self.host_variables)
        }));
        match result {
            Ok(value) => value,
            Err(_) => {
                ctx.add_error(DiagnosticRecord::new(
                    ErrorKind::Undefined,
                    "unexpected error occurred during expression evaluation",
                ));
                Value::Error(ErrorKind::Undefined)
            }
        }
    }
}

/// Evaluates a predicate: errors propagate, NULL maps to FALSE.
pub fn evaluate_bool(
    ctx: &mut EvaluatorContext,
    evaluator: &Evaluator<'_>,
    variables: &VariableTable,
) -> Value {
    let v = evaluator.evaluate(ctx, variables);
    if v.is_error() {
        return v;
    }
    Value::Boolean(v.has_value() && v.to_boolean())
}

fn dispatch(
    ctx: &mut EvaluatorContext,
    expression: &Expression,
    variables: &VariableTable,
    host: Option<&VariableTable>,
) -> Value {
    match &expression.kind {
        ExpressionKind::Immediate(value) => value.clone(),
        ExpressionKind::VariableReference(variable) => {
            let table = if variables.info().exists(*variable) {
                variables
            } else if let Some(h) = host.filter(|h| h.info().exists(*variable)) {
                h
            } else {
                debug_assert!(false, "unresolved variable {variable}");
                return Value::Error(ErrorKind::Undefined);
            };
            materialize(ctx, table.get(*variable))
        }
        ExpressionKind::Unary { op, operand } => {
            let v = dispatch(ctx, operand, variables, host);
            if v.is_error() {
                return v;
            }
            if v.is_null() && !op.accepts_null() {
                return v;
            }
            match op {
                UnaryOp::Plus => v,
                UnaryOp::SignInversion => arith::sign_inversion(&v),
                UnaryOp::ConditionalNot => match &v {
                    Value::Boolean(b) => Value::Boolean(!b),
                    _ => return_unsupported(),
                },
                UnaryOp::Length => match &v {
                    Value::Character(t) => Value::Int4(t.len() as i32),
                    _ => return_unsupported(),
                },
                UnaryOp::IsNull => Value::Boolean(v.is_null()),
                UnaryOp::IsTrue => {
                    if v.is_null() {
                        return Value::Boolean(false);
                    }
                    match &v {
                        Value::Boolean(_) => v,
                        _ => return_unsupported(),
                    }
                }
                UnaryOp::IsFalse => {
                    if v.is_null() {
                        return Value::Boolean(false);
                    }
                    match &v {
                        Value::Boolean(b) => Value::Boolean(!b),
                        _ => return_unsupported(),
                    }
                }
                UnaryOp::IsUnknown => Value::Boolean(v.is_null()),
            }
        }
        ExpressionKind::Binary { op, left, right } => {
            let l = dispatch(ctx, left, variables, host);
            let r = dispatch(ctx, right, variables, host);
            if l.is_error() {
                return l;
            }
            if r.is_error() {
                return r;
            }
            if !op.is_conditional() {
                // except AND/OR, a NULL operand makes the result NULL
                if l.is_null() {
                    return l;
                }
                if r.is_null() {
                    return r;
                }
            }
            match op {
                BinaryOp::Add => arith::add_values(&l, &r),
                BinaryOp::Subtract => arith::subtract_values(&l, &r),
                BinaryOp::Multiply => arith::multiply_values(&l, &r),
                BinaryOp::Divide => arith::divide_values(&l, &r),
                BinaryOp::Remainder => arith::remainder_values(&l, &r),
                BinaryOp::Concat => arith::concat_values(&l, &r),
                BinaryOp::ConditionalAnd => arith::conditional_and(&l, &r),
                BinaryOp::ConditionalOr => arith::conditional_or(&l, &r),
            }
        }
        ExpressionKind::Compare { op, left, right } => {
            let l = dispatch(ctx, left, variables, host);
            let r = dispatch(ctx, right, variables, host);
            if l.is_error() {
                return l;
            }
            if r.is_error() {
                return r;
            }
            if l.is_null() {
                return l;
            }
            if r.is_null() {
                return r;
            }
            arith::compare_values(*op, &l, &r)
        }
        ExpressionKind::Cast { policy, operand } => {
            let v = dispatch(ctx, operand, variables, host);
            if !v.has_value() {
                return v;
            }
            let original = ctx.set_loss_policy(*policy);
            let result = cast::conduct_cast(ctx, &operand.data_type, &expression.data_type, &v);
            ctx.set_loss_policy(original);
            result
        }
        ExpressionKind::Match { kind, input, pattern, escape } => {
            let escape_val = dispatch(ctx, escape, variables, host);
            let input_val = dispatch(ctx, input, variables, host);
            let pattern_val = dispatch(ctx, pattern, variables, host);
            if escape_val.is_error() {
                return escape_val;
            }
            if input_val.is_error() {
                return input_val;
            }
            if pattern_val.is_error() {
                return pattern_val;
            }
            if escape_val.is_null() || input_val.is_null() || pattern_val.is_null() {
                return Value::Null;
            }
            if escape_val.type_index() != ValueIndex::Character
                || input_val.type_index() != ValueIndex::Character
                || pattern_val.type_index() != ValueIndex::Character
            {
                return return_unsupported();
            }
            match kind {
                MatchKind::Like => like::evaluate_like(
                    input_val.to_character(),
                    pattern_val.to_character(),
                    escape_val.to_character(),
                ),
                MatchKind::Similar => like::evaluate_similar(
                    input_val.to_character(),
                    pattern_val.to_character(),
                    escape_val.to_character(),
                ),
            }
        }
        ExpressionKind::Conditional { alternatives, default } => {
            for alternative in alternatives {
                let b = dispatch(ctx, &alternative.condition, variables, host);
                if b.is_error() {
                    return b;
                }
                if b.is_null() || !b.to_boolean() {
                    continue;
                }
                let v = dispatch(ctx, &alternative.body, variables, host);
                return conv::unifying_convert(
                    ctx,
                    &alternative.body.data_type,
                    &expression.data_type,
                    v,
                );
            }
            if let Some(default) = default {
                let v = dispatch(ctx, default, variables, host);
                return conv::unifying_convert(ctx, &default.data_type, &expression.data_type, v);
            }
            // no matching condition and no default clause
            Value::Null
        }
        ExpressionKind::Coalesce { alternatives } => {
            for alternative in alternatives {
                let v = dispatch(ctx, alternative, variables, host);
                if v.is_error() {
                    return v;
                }
                if v.is_null() {
                    continue;
                }
                return conv::unifying_convert(
                    ctx,
                    &alternative.data_type,
                    &expression.data_type,
                    v,
                );
            }
            Value::Null
        }
        ExpressionKind::Let { .. } => return_unsupported(),
        ExpressionKind::FunctionCall { definition_id, arguments } => {
            let mut inputs = Vec::with_capacity(arguments.len());
            for argument in arguments {
                let v = dispatch(ctx, argument, variables, host);
                if v.is_error() {
                    return v;
                }
                inputs.push(v);
            }
            match scalar_function_repository().find(*definition_id) {
                Some(info) => {
                    if ctx.transaction().is_none() {
                        debug_assert!(false, "function call without transaction");
                        return Value::Error(ErrorKind::Undefined);
                    }
                    (info.body)(ctx, &inputs)
                }
                None => {
                    debug_assert!(false, "unknown function definition {definition_id}");
                    ctx.add_error(DiagnosticRecord::new(
                        ErrorKind::Undefined,
                        format!("scalar function {definition_id} is not registered"),
                    ));
                    Value::Error(ErrorKind::Undefined)
                }
            }
        }
        ExpressionKind::Extension => return_unsupported(),
    }
}

/// Materializes a `provided` LOB reference into the datastore on first touch;
/// every other value passes through.
fn materialize(ctx: &mut EvaluatorContext, value: &Value) -> Value {
    match value {
        Value::Blob(reference) if reference.is_provided() => match &reference.provider {
            LobProvider::Provided(path) => match lob::relay().assign_lob_id(path) {
                Ok(assigned) => Value::Blob(assigned),
                Err(info) => {
                    ctx.set_error_info(info);
                    Value::Error(ErrorKind::ErrorInfoProvided)
                }
            },
            _ => value.clone(),
        },
        Value::Clob(reference) if reference.is_provided() => match &reference.provider {
            LobProvider::Provided(path) => match lob::relay().assign_lob_id(path) {
                Ok(assigned) => Value::Clob(assigned),
                Err(info) => {
                    ctx.set_error_info(info);
                    Value::Error(ErrorKind::ErrorInfoProvided)
                }
            },
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::process::variable_table::VariableTableInfo;
    use std::sync::Arc;
    use test_case::test_case;
    use weir_plan::{CompareOp, LossPolicy, VariableId};
    use weir_types::{DataType, Text, Triple};

    fn ctx() -> EvaluatorContext {
        EvaluatorContext::new(Arc::new(Config::default()))
    }

    fn empty_table() -> VariableTable {
        VariableTable::new(Arc::new(VariableTableInfo::new([])))
    }

    fn int4(v: i32) -> Expression {
        Expression::immediate(Value::Int4(v), DataType::Int4)
    }

    fn boolean(v: Option<bool>) -> Expression {
        let value = match v {
            Some(b) => Value::Boolean(b),
            None => Value::Null,
        };
        Expression::immediate(value, DataType::Boolean)
    }

    fn eval(e: &Expression) -> Value {
        let mut c = ctx();
        Evaluator::new(e).evaluate(&mut c, &empty_table())
    }

    #[test]
    fn immediate_and_binary() {
        let e = Expression::binary(BinaryOp::Add, int4(1), int4(2), DataType::Int4);
        assert_eq!(eval(&e), Value::Int4(3));
    }

    #[test]
    fn variable_reference_reads_table() {
        let info = Arc::new(VariableTableInfo::new([(VariableId(0), DataType::Int8)]));
        let mut table = VariableTable::new(Arc::clone(&info));
        table.set(VariableId(0), Value::Int8(9));
        let e = Expression::variable(VariableId(0), DataType::Int8);
        let mut c = ctx();
        assert_eq!(Evaluator::new(&e).evaluate(&mut c, &table), Value::Int8(9));
    }

    #[test]
    fn null_propagates_through_arithmetic() {
        let e = Expression::binary(
            BinaryOp::Add,
            Expression::immediate(Value::Null, DataType::Int4),
            int4(1),
            DataType::Int4,
        );
        assert_eq!(eval(&e), Value::Null);
    }

    #[test_case(UnaryOp::IsNull, Value::Null, Value::Boolean(true); "is null of null")]
    #[test_case(UnaryOp::IsNull, Value::Int4(1), Value::Boolean(false); "is null of value")]
    #[test_case(UnaryOp::IsUnknown, Value::Null, Value::Boolean(true); "is unknown of null")]
    fn is_predicates(op: UnaryOp, operand: Value, expected: Value) {
        let data_type = match operand {
            Value::Int4(_) => DataType::Int4,
            _ => DataType::Boolean,
        };
        let e = Expression::unary(
            op,
            Expression::immediate(operand, data_type),
            DataType::Boolean,
        );
        assert_eq!(eval(&e), expected);
    }

    #[test]
    fn double_negation_is_identity() {
        for b in [true, false] {
            let e = Expression::unary(
                UnaryOp::ConditionalNot,
                Expression::unary(UnaryOp::ConditionalNot, boolean(Some(b)), DataType::Boolean),
                DataType::Boolean,
            );
            assert_eq!(eval(&e), Value::Boolean(b));
        }
    }

    #[test]
    fn compare_null_yields_null() {
        let e = Expression::compare(CompareOp::Equal, boolean(None), boolean(Some(true)));
        assert_eq!(eval(&e), Value::Null);
    }

    #[test]
    fn cast_restores_policy() {
        let mut c = ctx();
        c.set_loss_policy(LossPolicy::Warn);
        let e = Expression::cast(
            Expression::immediate(Value::Character(Text::from("1.5")), DataType::character_varying()),
            DataType::Int4,
            LossPolicy::Ignore,
        );
        let v = Evaluator::new(&e).evaluate(&mut c, &empty_table());
        assert_eq!(v, Value::Int4(1));
        assert_eq!(c.loss_policy(), LossPolicy::Warn);
    }

    #[test]
    fn coalesce_returns_first_non_null() {
        let e = Expression::coalesce(
            vec![
                Expression::immediate(Value::Null, DataType::Int4),
                int4(5),
                int4(6),
            ],
            DataType::Int4,
        );
        assert_eq!(eval(&e), Value::Int4(5));
        let all_null = Expression::coalesce(
            vec![Expression::immediate(Value::Null, DataType::Int4)],
            DataType::Int4,
        );
        assert_eq!(eval(&all_null), Value::Null);
    }

    #[test]
    fn coalesce_is_idempotent_for_pure_operands() {
        let e1 = Expression::coalesce(vec![int4(7), int4(7)], DataType::Int4);
        assert_eq!(eval(&e1), eval(&int4(7)));
    }

    #[test]
    fn conditional_picks_first_true_branch() {
        let e = Expression {
            data_type: DataType::Int8,
            kind: ExpressionKind::Conditional {
                alternatives: vec![
                    weir_plan::ConditionalAlternative {
                        condition: boolean(None),
                        body: int4(1),
                    },
                    weir_plan::ConditionalAlternative {
                        condition: boolean(Some(true)),
                        body: int4(2),
                    },
                ],
                default: Some(Box::new(int4(3))),
            },
        };
        // the branch value unifies to the declared int8 result type
        assert_eq!(eval(&e), Value::Int8(2));
    }

    #[test]
    fn let_and_extension_are_unsupported() {
        let e = Expression {
            data_type: DataType::Int4,
            kind: ExpressionKind::Extension,
        };
        assert_eq!(eval(&e).error_kind(), Some(ErrorKind::Unsupported));
    }

    #[test]
    fn like_dispatches_three_operands() {
        let text = |s: &str| {
            Expression::immediate(Value::Character(Text::from(s)), DataType::character_varying())
        };
        let e = Expression::like(text("abcde"), text("a%de"), text("\\"));
        assert_eq!(eval(&e), Value::Boolean(true));
        let null_escape = Expression::like(
            text("abc"),
            text("a%"),
            Expression::immediate(Value::Null, DataType::character_varying()),
        );
        assert_eq!(eval(&null_escape), Value::Null);
    }

    #[test]
    fn evaluate_bool_maps_null_to_false() {
        let mut c = ctx();
        let e = boolean(None);
        let v = evaluate_bool(&mut c, &Evaluator::new(&e), &empty_table());
        assert_eq!(v, Value::Boolean(false));
    }

    #[test]
    fn decimal_overflow_surfaces_through_cast() {
        let mut c = ctx();
        let max = Expression::immediate(
            Value::Decimal(Triple::from_parts(1, 10u128.pow(38) - 1, 0)),
            DataType::decimal_ps(38, 0),
        );
        let sum = Expression::binary(
            BinaryOp::Add,
            max,
            Expression::immediate(Value::Decimal(Triple::from_i64(1)), DataType::decimal_ps(38, 0)),
            DataType::decimal(),
        );
        let e = Expression::cast(sum, DataType::decimal_ps(38, 0), LossPolicy::Error);
        let v = Evaluator::new(&e).evaluate(&mut c, &empty_table());
        assert_eq!(v.error_kind(), Some(ErrorKind::ArithmeticError));
    }
}
