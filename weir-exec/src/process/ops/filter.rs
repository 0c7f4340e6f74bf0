//! Filter operator.

use weir_plan::Expression;

use crate::eval::{evaluate_bool, Evaluator};
use crate::process::context::ContextCore;
use crate::process::TaskContext;

use super::{
    record_expression_error, OperationStatus, OperatorContext, OperatorIndex, OperatorKind,
    RecordOperator,
};

/// Per-task filter state.
#[derive(Debug, Default)]
pub struct FilterContext {
    /// Shared context core.
    pub core: ContextCore,
}

impl FilterContext {
    /// Creates an active context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Evaluates a boolean predicate per record and forwards matches downstream.
pub struct Filter {
    index: OperatorIndex,
    predicate: Expression,
    downstream: Option<Box<dyn RecordOperator>>,
}

impl Filter {
    /// Creates a filter at `index` with the given predicate.
    pub fn new(
        index: OperatorIndex,
        predicate: Expression,
        downstream: Option<Box<dyn RecordOperator>>,
    ) -> Self {
        Self { index, predicate, downstream }
    }
}

impl RecordOperator for Filter {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::Filter(FilterContext::new()));
        if op_ctx.core().inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        let checkpoint = ctx.resource.checkpoint();
        let evaluator = Evaluator::new(&self.predicate);
        let v = evaluate_bool(&mut ctx.eval_ctx, &evaluator, &ctx.variables);
        ctx.resource.rewind(checkpoint);
        if v.is_error() {
            record_expression_error(ctx, &v);
            op_ctx.core_mut().abort();
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        ctx.contexts.put(self.index, op_ctx);
        if v.to_boolean() {
            if let Some(downstream) = &self.downstream {
                return downstream.process_record(ctx);
            }
        }
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        if let Some(downstream) = &self.downstream {
            downstream.finish(ctx);
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Filter
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
