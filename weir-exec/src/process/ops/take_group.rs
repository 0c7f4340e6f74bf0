//! Take-group operator: pull key-grouped records from a group reader.

use weir_plan::VariableId;

use crate::error::{ExecError, Status};
use crate::io::GroupReader;
use crate::process::context::ContextCore;
use crate::process::{ReaderHandle, TaskContext};

use super::{
    GroupOperator, OperationStatus, OperatorContext, OperatorIndex, OperatorKind, RecordOperator,
};

/// Per-task take-group state; owns the reader once acquired.
pub struct TakeGroupContext {
    /// Shared context core.
    pub core: ContextCore,
    reader: Option<Box<dyn GroupReader>>,
}

impl TakeGroupContext {
    fn new() -> Self {
        Self { core: ContextCore::new(), reader: None }
    }
}

impl core::fmt::Debug for TakeGroupContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TakeGroupContext")
            .field("core", &self.core)
            .field("reader", &self.reader.is_some())
            .finish()
    }
}

/// Reads group boundaries from a group reader, binding key fields once per
/// group and value fields per member; the downstream group operator receives
/// a `last_member` flag on the terminal member.
pub struct TakeGroup {
    index: OperatorIndex,
    reader_index: usize,
    key_columns: Vec<(usize, VariableId)>,
    value_columns: Vec<(usize, VariableId)>,
    downstream: Option<Box<dyn GroupOperator>>,
}

impl TakeGroup {
    /// Creates the operator; the column lists map reader key/value fields to
    /// variables.
    pub fn new(
        index: OperatorIndex,
        reader_index: usize,
        key_columns: Vec<(usize, VariableId)>,
        value_columns: Vec<(usize, VariableId)>,
        downstream: Option<Box<dyn GroupOperator>>,
    ) -> Self {
        Self { index, reader_index, key_columns, value_columns, downstream }
    }
}

impl RecordOperator for TakeGroup {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::TakeGroup(TakeGroupContext::new()));
        let OperatorContext::TakeGroup(take_ctx) = &mut op_ctx else {
            unreachable!("context kind mismatch");
        };
        if take_ctx.core.inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        if take_ctx.reader.is_none() {
            match ctx.take_reader(self.reader_index) {
                Some(ReaderHandle::Group(reader)) => take_ctx.reader = Some(reader),
                _ => {
                    ctx.record_error(ExecError::new(
                        Status::Internal,
                        format!("group reader {} is missing", self.reader_index),
                    ));
                    take_ctx.core.abort();
                    ctx.contexts.put(self.index, op_ctx);
                    return OperationStatus::Aborted;
                }
            }
        }
        let reader = take_ctx.reader.as_mut().expect("acquired above");
        while reader.next_group() {
            if ctx.cancel.is_cancelled() {
                ctx.record_error(ExecError::aborted("request cancelled"));
                take_ctx.core.abort();
                ctx.contexts.put(self.index, op_ctx);
                self.finish(ctx);
                return OperationStatus::Aborted;
            }
            let key = reader.get_group();
            for (field, variable) in &self.key_columns {
                ctx.variables.set(*variable, key.get(*field).clone());
            }
            let mut has_member = reader.next_member();
            while has_member {
                let member = reader.get_member();
                for (field, variable) in &self.value_columns {
                    ctx.variables.set(*variable, member.get(*field).clone());
                }
                has_member = reader.next_member();
                if let Some(downstream) = &self.downstream {
                    if !downstream.process_group(ctx, !has_member).is_ok() {
                        take_ctx.core.abort();
                        ctx.contexts.put(self.index, op_ctx);
                        self.finish(ctx);
                        return OperationStatus::Aborted;
                    }
                }
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        if let Some(mut op_ctx) = ctx.contexts.take(self.index) {
            if let OperatorContext::TakeGroup(take_ctx) = &mut op_ctx {
                take_ctx.reader = None;
            }
            ctx.contexts.put(self.index, op_ctx);
        }
        if let Some(downstream) = &self.downstream {
            downstream.finish(ctx);
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::TakeGroup
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
