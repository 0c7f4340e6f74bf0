//! Write operators: update and delete through the primary storage.
//!
//! Secondary-index consistency: stale secondary entries are deleted before
//! the new ones are inserted, and a key-changing update removes the old
//! primary entry first.

use weir_plan::VariableId;
use weir_storage::KeyValueStore;
use weir_types::{Record, Value};

use crate::error::{ExecError, Result, Status};
use crate::kvs::TableDef;
use crate::process::context::ContextCore;
use crate::process::TaskContext;

use super::{OperationStatus, OperatorContext, OperatorIndex, OperatorKind, RecordOperator};

/// Per-task write state.
#[derive(Debug, Default)]
pub struct WriteContext {
    /// Shared context core.
    pub core: ContextCore,
}

impl WriteContext {
    /// Creates an active context.
    pub fn new() -> Self {
        Self::default()
    }
}

fn key_values(ctx: &TaskContext, key_variables: &[VariableId]) -> Vec<Value> {
    key_variables.iter().map(|v| ctx.variables.get(*v).clone()).collect()
}

fn fetch_existing(
    ctx: &TaskContext,
    table: &TableDef,
    key_variables: &[VariableId],
) -> Result<Option<(Vec<u8>, Record)>> {
    let database = ctx
        .database
        .as_ref()
        .ok_or_else(|| ExecError::new(Status::Internal, "write without a database"))?;
    let primary = database.get_storage(&table.name)?;
    let key = table.encode_key_values(&key_values(ctx, key_variables))?;
    match primary.get(&key)? {
        Some(value) => {
            let row = table.decode_entry(&key, &value)?;
            Ok(Some((key, row)))
        }
        None => Ok(None),
    }
}

fn check_writable(ctx: &TaskContext) -> Result<()> {
    match &ctx.transaction {
        Some(strand) => strand.with_serialized(|tx| tx.check_writable()).map_err(Into::into),
        None => Ok(()),
    }
}

fn apply_update(
    ctx: &TaskContext,
    table: &TableDef,
    old_key: &[u8],
    old_row: &Record,
    updates: &[(usize, VariableId)],
) -> Result<()> {
    let database = ctx.database.as_ref().expect("checked by fetch_existing");
    let primary = database.get_storage(&table.name)?;
    let mut new_row = old_row.clone();
    for (column, variable) in updates {
        new_row.set(*column, ctx.variables.get(*variable).clone());
    }
    let new_key = table.encode_primary_key(&new_row)?;
    table.remove_secondary_entries(database, old_row, old_key)?;
    if new_key != old_key {
        primary.remove(old_key)?;
    }
    primary.put(&new_key, &table.encode_value(&new_row))?;
    table.insert_secondary_entries(database, &new_row, &new_key)?;
    Ok(())
}

fn apply_delete(
    ctx: &TaskContext,
    table: &TableDef,
    key: &[u8],
    row: &Record,
) -> Result<()> {
    let database = ctx.database.as_ref().expect("checked by fetch_existing");
    let primary = database.get_storage(&table.name)?;
    table.remove_secondary_entries(database, row, key)?;
    primary.remove(key)?;
    Ok(())
}

macro_rules! write_operator_frame {
    ($self:ident, $ctx:ident, $body:expr) => {{
        let mut op_ctx = $ctx
            .contexts
            .take($self.index)
            .unwrap_or_else(|| OperatorContext::Write(WriteContext::new()));
        if op_ctx.core().inactive() {
            $ctx.contexts.put($self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        if $ctx.cancel.is_cancelled() {
            $ctx.record_error(ExecError::aborted("request cancelled"));
            op_ctx.core_mut().abort();
            $ctx.contexts.put($self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        match $body {
            Ok(()) => {
                $ctx.contexts.put($self.index, op_ctx);
                OperationStatus::Ok
            }
            Err(e) => {
                $ctx.record_error(e);
                op_ctx.core_mut().abort();
                $ctx.contexts.put($self.index, op_ctx);
                OperationStatus::Aborted
            }
        }
    }};
}

/// Updates an existing row identified by its bound primary key.
pub struct WriteExisting {
    index: OperatorIndex,
    table: TableDef,
    key_variables: Vec<VariableId>,
    updates: Vec<(usize, VariableId)>,
}

impl WriteExisting {
    /// Creates the operator; `key_variables` bind the primary-key columns in
    /// order, `updates` pair row columns with their new-value variables.
    pub fn new(
        index: OperatorIndex,
        table: TableDef,
        key_variables: Vec<VariableId>,
        updates: Vec<(usize, VariableId)>,
    ) -> Self {
        Self { index, table, key_variables, updates }
    }
}

impl RecordOperator for WriteExisting {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        write_operator_frame!(self, ctx, {
            check_writable(ctx).and_then(|()| {
                match fetch_existing(ctx, &self.table, &self.key_variables)? {
                    Some((key, row)) => apply_update(ctx, &self.table, &key, &row, &self.updates),
                    None => Err(ExecError::not_found("row to update does not exist")),
                }
            })
        })
    }

    fn finish(&self, _ctx: &mut TaskContext) {}

    fn kind(&self) -> OperatorKind {
        OperatorKind::WriteExisting
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}

/// Flavor of a partial write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePartialKind {
    /// Update the listed columns of the matching row, skipping silently when
    /// absent.
    Update,
    /// Delete the matching row, skipping silently when absent.
    Delete,
}

/// Partial update or delete identified by the bound primary key.
pub struct WritePartial {
    index: OperatorIndex,
    table: TableDef,
    kind: WritePartialKind,
    key_variables: Vec<VariableId>,
    updates: Vec<(usize, VariableId)>,
}

impl WritePartial {
    /// Creates the operator; `updates` is ignored for deletes.
    pub fn new(
        index: OperatorIndex,
        table: TableDef,
        kind: WritePartialKind,
        key_variables: Vec<VariableId>,
        updates: Vec<(usize, VariableId)>,
    ) -> Self {
        Self { index, table, kind, key_variables, updates }
    }
}

impl RecordOperator for WritePartial {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        write_operator_frame!(self, ctx, {
            check_writable(ctx).and_then(|()| {
                match fetch_existing(ctx, &self.table, &self.key_variables)? {
                    Some((key, row)) => match self.kind {
                        WritePartialKind::Update => {
                            apply_update(ctx, &self.table, &key, &row, &self.updates)
                        }
                        WritePartialKind::Delete => apply_delete(ctx, &self.table, &key, &row),
                    },
                    None => Ok(()),
                }
            })
        })
    }

    fn finish(&self, _ctx: &mut TaskContext) {}

    fn kind(&self) -> OperatorKind {
        OperatorKind::WritePartial
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
