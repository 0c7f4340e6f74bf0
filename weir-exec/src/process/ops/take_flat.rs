//! Take-flat operator: pull records from a record reader.

use weir_plan::VariableId;

use crate::error::{ExecError, Status};
use crate::io::RecordReader;
use crate::process::context::ContextCore;
use crate::process::{ReaderHandle, TaskContext};

use super::{OperationStatus, OperatorContext, OperatorIndex, OperatorKind, RecordOperator};

/// Per-task take-flat state; owns the reader once acquired.
pub struct TakeFlatContext {
    /// Shared context core.
    pub core: ContextCore,
    reader: Option<Box<dyn RecordReader>>,
}

impl TakeFlatContext {
    fn new() -> Self {
        Self { core: ContextCore::new(), reader: None }
    }
}

impl core::fmt::Debug for TakeFlatContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TakeFlatContext")
            .field("core", &self.core)
            .field("reader", &self.reader.is_some())
            .finish()
    }
}

/// Drains a record reader into the output variable table, invoking the
/// downstream chain once per record.
pub struct TakeFlat {
    index: OperatorIndex,
    reader_index: usize,
    columns: Vec<(usize, VariableId)>,
    downstream: Option<Box<dyn RecordOperator>>,
}

impl TakeFlat {
    /// Creates the operator; `columns` maps reader fields to variables.
    pub fn new(
        index: OperatorIndex,
        reader_index: usize,
        columns: Vec<(usize, VariableId)>,
        downstream: Option<Box<dyn RecordOperator>>,
    ) -> Self {
        Self { index, reader_index, columns, downstream }
    }
}

impl RecordOperator for TakeFlat {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::TakeFlat(TakeFlatContext::new()));
        let OperatorContext::TakeFlat(take_ctx) = &mut op_ctx else {
            unreachable!("context kind mismatch");
        };
        if take_ctx.core.inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        if take_ctx.reader.is_none() {
            match ctx.take_reader(self.reader_index) {
                Some(ReaderHandle::Record(reader)) => take_ctx.reader = Some(reader),
                _ => {
                    ctx.record_error(ExecError::new(
                        Status::Internal,
                        format!("record reader {} is missing", self.reader_index),
                    ));
                    take_ctx.core.abort();
                    ctx.contexts.put(self.index, op_ctx);
                    return OperationStatus::Aborted;
                }
            }
        }
        let reader = take_ctx.reader.as_mut().expect("acquired above");
        loop {
            if ctx.cancel.is_cancelled() {
                ctx.record_error(ExecError::aborted("request cancelled"));
                take_ctx.core.abort();
                ctx.contexts.put(self.index, op_ctx);
                self.finish(ctx);
                return OperationStatus::Aborted;
            }
            let Some(record) = reader.next_record() else {
                break;
            };
            for (field, variable) in &self.columns {
                ctx.variables.set(*variable, record.get(*field).clone());
            }
            if let Some(downstream) = &self.downstream {
                if !downstream.process_record(ctx).is_ok() {
                    take_ctx.core.abort();
                    ctx.contexts.put(self.index, op_ctx);
                    self.finish(ctx);
                    return OperationStatus::Aborted;
                }
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        if let Some(mut op_ctx) = ctx.contexts.take(self.index) {
            if let OperatorContext::TakeFlat(take_ctx) = &mut op_ctx {
                take_ctx.reader = None;
            }
            ctx.contexts.put(self.index, op_ctx);
        }
        if let Some(downstream) = &self.downstream {
            downstream.finish(ctx);
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::TakeFlat
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
