//! Typed scalar-expression tree.

use weir_types::{DataType, Value};

use crate::operator::{BinaryOp, CompareOp, LossPolicy, MatchKind, UnaryOp};
use crate::variable::{FunctionDefinitionId, VariableId};

/// A typed expression node.
///
/// Every node carries the static type the planner computed for it; the
/// evaluator relies on it for variable materialization, cast sources and the
/// unifying conversion of conditional/coalesce branches.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Planner-computed static type of the node.
    pub data_type: DataType,
    /// The node itself.
    pub kind: ExpressionKind,
}

/// One `WHEN condition THEN body` arm of a conditional.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalAlternative {
    /// The boolean guard.
    pub condition: Expression,
    /// The value produced when the guard is the first to hold.
    pub body: Expression,
}

/// The closed node set of the scalar IR.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    /// A literal value.
    Immediate(Value),
    /// A reference to a block or host variable.
    VariableReference(VariableId),
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expression>,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// A comparison.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// A cast to the node's type.
    Cast {
        /// Loss-of-precision policy.
        policy: LossPolicy,
        /// The value being cast.
        operand: Box<Expression>,
    },
    /// A pattern match (`LIKE` / `SIMILAR TO`).
    Match {
        /// Match flavor.
        kind: MatchKind,
        /// The matched input.
        input: Box<Expression>,
        /// The pattern.
        pattern: Box<Expression>,
        /// The escape clause (empty string for none).
        escape: Box<Expression>,
    },
    /// SQL `CASE`: alternatives visited in order, first true branch wins.
    Conditional {
        /// The `WHEN ... THEN ...` arms.
        alternatives: Vec<ConditionalAlternative>,
        /// The `ELSE` expression, if present.
        default: Option<Box<Expression>>,
    },
    /// `COALESCE(e1, ..., en)`: first non-NULL alternative.
    Coalesce {
        /// The alternatives in order.
        alternatives: Vec<Expression>,
    },
    /// `LET` binding; accepted by the IR, unsupported by the evaluator.
    Let {
        /// The bound variables.
        declarations: Vec<(VariableId, Expression)>,
        /// The body.
        body: Box<Expression>,
    },
    /// A scalar function call resolved through the global registry.
    FunctionCall {
        /// Registry id of the function.
        definition_id: FunctionDefinitionId,
        /// Evaluated and passed in order.
        arguments: Vec<Expression>,
    },
    /// Planner extension point; unsupported by the evaluator.
    Extension,
}

impl Expression {
    /// A literal node.
    pub fn immediate(value: Value, data_type: DataType) -> Self {
        Self { data_type, kind: ExpressionKind::Immediate(value) }
    }

    /// A variable-reference node.
    pub fn variable(variable: VariableId, data_type: DataType) -> Self {
        Self { data_type, kind: ExpressionKind::VariableReference(variable) }
    }

    /// A unary node.
    pub fn unary(op: UnaryOp, operand: Expression, data_type: DataType) -> Self {
        Self { data_type, kind: ExpressionKind::Unary { op, operand: Box::new(operand) } }
    }

    /// A binary node.
    pub fn binary(op: BinaryOp, left: Expression, right: Expression, data_type: DataType) -> Self {
        Self {
            data_type,
            kind: ExpressionKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// A comparison node (always boolean-typed).
    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Self {
            data_type: DataType::Boolean,
            kind: ExpressionKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// A cast node to `target`.
    pub fn cast(operand: Expression, target: DataType, policy: LossPolicy) -> Self {
        Self { data_type: target, kind: ExpressionKind::Cast { policy, operand: Box::new(operand) } }
    }

    /// A `LIKE` node.
    pub fn like(input: Expression, pattern: Expression, escape: Expression) -> Self {
        Self {
            data_type: DataType::Boolean,
            kind: ExpressionKind::Match {
                kind: MatchKind::Like,
                input: Box::new(input),
                pattern: Box::new(pattern),
                escape: Box::new(escape),
            },
        }
    }

    /// A `COALESCE` node.
    pub fn coalesce(alternatives: Vec<Expression>, data_type: DataType) -> Self {
        Self { data_type, kind: ExpressionKind::Coalesce { alternatives } }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_type_nodes() {
        let lhs = Expression::variable(VariableId(0), DataType::Int4);
        let rhs = Expression::immediate(Value::Int4(1), DataType::Int4);
        let sum = Expression::binary(BinaryOp::Add, lhs, rhs, DataType::Int4);
        assert_eq!(sum.data_type, DataType::Int4);
        let cmp = Expression::compare(
            CompareOp::GreaterEqual,
            sum,
            Expression::immediate(Value::Int4(0), DataType::Int4),
        );
        assert_eq!(cmp.data_type, DataType::Boolean);
    }
}
