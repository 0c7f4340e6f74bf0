//! Find operator: point lookup with a fully bound key.

use weir_plan::{Expression, VariableId};
use weir_storage::KeyValueStore;
use weir_types::Value;

use crate::error::{ExecError, Status};
use crate::eval::Evaluator;
use crate::kvs::{self, TableDef};
use crate::process::context::ContextCore;
use crate::process::TaskContext;

use super::{
    record_expression_error, OperationStatus, OperatorContext, OperatorIndex, OperatorKind,
    RecordOperator,
};

/// Per-task find state.
#[derive(Debug, Default)]
pub struct FindContext {
    /// Shared context core.
    pub core: ContextCore,
}

impl FindContext {
    /// Creates an active context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Performs a point lookup on the primary index (optionally through a
/// secondary-index pointer) and invokes the downstream chain per matching
/// row. Zero matches finish silently.
pub struct Find {
    index: OperatorIndex,
    table: TableDef,
    secondary: Option<usize>,
    key: Vec<Expression>,
    columns: Vec<(usize, VariableId)>,
    downstream: Option<Box<dyn RecordOperator>>,
}

impl Find {
    /// Creates a find over the table's primary index; `key` binds every key
    /// column in order.
    pub fn new(
        index: OperatorIndex,
        table: TableDef,
        key: Vec<Expression>,
        columns: Vec<(usize, VariableId)>,
        downstream: Option<Box<dyn RecordOperator>>,
    ) -> Self {
        Self { index, table, secondary: None, key, columns, downstream }
    }

    /// Looks the key up in the secondary index at `secondary` instead.
    #[must_use]
    pub fn via_secondary(mut self, secondary: usize) -> Self {
        self.secondary = Some(secondary);
        self
    }

    fn abort(
        &self,
        ctx: &mut TaskContext,
        mut op_ctx: OperatorContext,
        error: Option<ExecError>,
    ) -> OperationStatus {
        if let Some(error) = error {
            ctx.record_error(error);
        }
        op_ctx.core_mut().abort();
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Aborted
    }

    fn evaluate_key(&self, ctx: &mut TaskContext) -> Result<Vec<Value>, ()> {
        let checkpoint = ctx.resource.checkpoint();
        let mut values = Vec::with_capacity(self.key.len());
        for expression in &self.key {
            let v = Evaluator::new(expression).evaluate(&mut ctx.eval_ctx, &ctx.variables);
            if v.is_error() {
                record_expression_error(ctx, &v);
                ctx.resource.rewind(checkpoint);
                return Err(());
            }
            values.push(v);
        }
        ctx.resource.rewind(checkpoint);
        Ok(values)
    }

    fn deliver(&self, ctx: &mut TaskContext, row: &weir_types::Record) -> OperationStatus {
        for (column, variable) in &self.columns {
            ctx.variables.set(*variable, row.get(*column).clone());
        }
        match &self.downstream {
            Some(downstream) => downstream.process_record(ctx),
            None => OperationStatus::Ok,
        }
    }
}

impl RecordOperator for Find {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::Find(FindContext::new()));
        if op_ctx.core().inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        if ctx.cancel.is_cancelled() {
            return self.abort(ctx, op_ctx, Some(ExecError::aborted("request cancelled")));
        }
        let Ok(key_values) = self.evaluate_key(ctx) else {
            return self.abort(ctx, op_ctx, None);
        };
        let Some(database) = ctx.database.clone() else {
            return self.abort(
                ctx,
                op_ctx,
                Some(ExecError::new(Status::Internal, "find without a database")),
            );
        };
        let primary = match database.get_storage(&self.table.name) {
            Ok(storage) => storage,
            Err(e) => return self.abort(ctx, op_ctx, Some(e.into())),
        };

        match self.secondary {
            None => {
                let key = match self.table.encode_key_values(&key_values) {
                    Ok(key) => key,
                    Err(e) => return self.abort(ctx, op_ctx, Some(e)),
                };
                match primary.get(&key) {
                    Ok(Some(value)) => match self.table.decode_entry(&key, &value) {
                        Ok(row) => {
                            op_ctx = match self.deliver_row(ctx, op_ctx, &row) {
                                Ok(c) => c,
                                Err(status) => return status,
                            };
                        }
                        Err(e) => return self.abort(ctx, op_ctx, Some(e)),
                    },
                    Ok(None) => {}
                    Err(e) => return self.abort(ctx, op_ctx, Some(e.into())),
                }
            }
            Some(s) => {
                let index = &self.table.secondaries[s];
                let mut prefix = Vec::new();
                for (value, &column) in key_values.iter().zip(&index.key_columns) {
                    if let Err(e) = kvs::encode_key_field(
                        value,
                        self.table.columns.field_type(column),
                        &mut prefix,
                    ) {
                        return self.abort(ctx, op_ctx, Some(e));
                    }
                }
                let storage = match database.get_storage(&index.name) {
                    Ok(storage) => storage,
                    Err(e) => return self.abort(ctx, op_ctx, Some(e.into())),
                };
                let mut iter = match storage.scan(weir_storage::ScanRange::prefix(&prefix)) {
                    Ok(iter) => iter,
                    Err(e) => return self.abort(ctx, op_ctx, Some(e.into())),
                };
                loop {
                    let entry = match iter.next_entry() {
                        Ok(entry) => entry,
                        Err(e) => return self.abort(ctx, op_ctx, Some(e.into())),
                    };
                    let Some((_, pointer)) = entry else {
                        break;
                    };
                    let row = match primary.get(&pointer) {
                        Ok(Some(value)) => match self.table.decode_entry(&pointer, &value) {
                            Ok(row) => row,
                            Err(e) => return self.abort(ctx, op_ctx, Some(e)),
                        },
                        Ok(None) => {
                            return self.abort(
                                ctx,
                                op_ctx,
                                Some(ExecError::new(
                                    Status::IoError,
                                    "dangling secondary index entry",
                                )),
                            )
                        }
                        Err(e) => return self.abort(ctx, op_ctx, Some(e.into())),
                    };
                    op_ctx = match self.deliver_row(ctx, op_ctx, &row) {
                        Ok(c) => c,
                        Err(status) => return status,
                    };
                }
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        if let Some(downstream) = &self.downstream {
            downstream.finish(ctx);
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Find
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}

impl Find {
    fn deliver_row(
        &self,
        ctx: &mut TaskContext,
        mut op_ctx: OperatorContext,
        row: &weir_types::Record,
    ) -> Result<OperatorContext, OperationStatus> {
        if !self.deliver(ctx, row).is_ok() {
            op_ctx.core_mut().abort();
            ctx.contexts.put(self.index, op_ctx);
            self.finish(ctx);
            return Err(OperationStatus::Aborted);
        }
        Ok(op_ctx)
    }
}
