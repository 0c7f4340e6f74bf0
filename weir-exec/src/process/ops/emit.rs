//! Emit operator: projection into the result writer.

use weir_plan::VariableId;
use weir_types::Record;

use crate::error::{ExecError, Status};
use crate::process::context::ContextCore;
use crate::process::TaskContext;

use super::{OperationStatus, OperatorContext, OperatorIndex, OperatorKind, RecordOperator};

/// Per-task emit state: the small record buffer and the release latch.
#[derive(Debug)]
pub struct EmitContext {
    /// Shared context core.
    pub core: ContextCore,
    buffer: Record,
    released: bool,
}

impl EmitContext {
    fn new(width: usize) -> Self {
        Self { core: ContextCore::new(), buffer: Record::nulls(width), released: false }
    }
}

/// Copies a projected subset of the variable table into the result writer.
pub struct Emit {
    index: OperatorIndex,
    columns: Vec<VariableId>,
}

impl Emit {
    /// Creates an emit at `index` projecting `columns` in order.
    pub fn new(index: OperatorIndex, columns: Vec<VariableId>) -> Self {
        Self { index, columns }
    }

    /// The projected variables in output order.
    pub fn columns(&self) -> &[VariableId] {
        &self.columns
    }
}

impl RecordOperator for Emit {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::Emit(EmitContext::new(self.columns.len())));
        let OperatorContext::Emit(emit_ctx) = &mut op_ctx else {
            unreachable!("context kind mismatch");
        };
        if emit_ctx.core.inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        for (slot, variable) in self.columns.iter().enumerate() {
            emit_ctx.buffer.set(slot, ctx.variables.get(*variable).clone());
        }
        let record = emit_ctx.buffer.clone();
        match ctx.result_writer.as_mut() {
            Some(writer) => writer.write(record),
            None => {
                ctx.record_error(ExecError::new(Status::Internal, "emit without a result writer"));
                emit_ctx.core.abort();
                ctx.contexts.put(self.index, op_ctx);
                return OperationStatus::Aborted;
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        let Some(mut op_ctx) = ctx.contexts.take(self.index) else {
            return;
        };
        if let OperatorContext::Emit(emit_ctx) = &mut op_ctx {
            if !emit_ctx.released {
                if let Some(writer) = ctx.result_writer.as_mut() {
                    writer.flush();
                    writer.release();
                }
                emit_ctx.released = true;
            }
        }
        ctx.contexts.put(self.index, op_ctx);
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Emit
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
