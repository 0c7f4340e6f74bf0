//! Compiled-plan intermediate representation.
//!
//! The SQL parser and logical planner are external collaborators; what they
//! hand the executor is the typed scalar-expression tree and the small
//! descriptors defined here. The node set is closed: evaluation dispatches
//! over [`ExpressionKind`] with no open extension.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod expression;
mod operator;
mod variable;

pub use expression::{ConditionalAlternative, Expression, ExpressionKind};
pub use operator::{BinaryOp, CompareOp, LossPolicy, MatchKind, UnaryOp};
pub use variable::{
    AggregateColumnSpec, AggregateDefinitionId, ColumnMapping, FunctionDefinitionId, KeyOrdering,
    SortDirection, VariableId,
};
