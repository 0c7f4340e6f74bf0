//! Scan operator: range scan over a primary or secondary index.

use std::ops::Bound;
use std::time::{Duration, Instant};

use weir_plan::VariableId;
use weir_storage::{KeyValueStore, KvsIterator, ScanRange};
use weir_types::Value;

use crate::error::{ExecError, Status};
use crate::kvs::{self, TableDef};
use crate::process::context::ContextCore;
use crate::process::TaskContext;

use super::{OperationStatus, OperatorContext, OperatorIndex, OperatorKind, RecordOperator};

/// One endpoint of a scan range: bound key-prefix values plus the
/// inclusive/exclusive flag.
#[derive(Debug, Clone)]
pub struct ScanBound {
    /// Values of the leading key columns.
    pub key: Vec<Value>,
    /// Whether the endpoint itself is part of the range.
    pub inclusive: bool,
}

/// Scan range over the target index.
#[derive(Debug, Clone, Default)]
pub struct ScanBounds {
    /// Lower endpoint; unbounded when absent.
    pub lower: Option<ScanBound>,
    /// Upper endpoint; unbounded when absent.
    pub upper: Option<ScanBound>,
}

/// Per-task scan state; holds the open iterator across yields.
pub struct ScanContext {
    /// Shared context core.
    pub core: ContextCore,
    iterator: Option<Box<dyn KvsIterator + Send>>,
    slice_started: Option<Instant>,
}

impl ScanContext {
    fn new() -> Self {
        Self { core: ContextCore::new(), iterator: None, slice_started: None }
    }
}

impl core::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScanContext")
            .field("core", &self.core)
            .field("iterator", &self.iterator.is_some())
            .finish()
    }
}

/// Opens a KVS iterator over a key range and decodes entries into the output
/// variable table, yielding cooperatively by record count and elapsed time.
pub struct Scan {
    index: OperatorIndex,
    table: TableDef,
    secondary: Option<usize>,
    bounds: ScanBounds,
    columns: Vec<(usize, VariableId)>,
    downstream: Option<Box<dyn RecordOperator>>,
}

impl Scan {
    /// Creates a scan over the table's primary index.
    pub fn new(
        index: OperatorIndex,
        table: TableDef,
        bounds: ScanBounds,
        columns: Vec<(usize, VariableId)>,
        downstream: Option<Box<dyn RecordOperator>>,
    ) -> Self {
        Self { index, table, secondary: None, bounds, columns, downstream }
    }

    /// Scans through the secondary index at `secondary` instead, following
    /// each entry's pointer to fetch the primary row.
    #[must_use]
    pub fn via_secondary(mut self, secondary: usize) -> Self {
        self.secondary = Some(secondary);
        self
    }

    fn key_types_for_bound(&self) -> Vec<&weir_types::DataType> {
        match self.secondary {
            Some(s) => self.table.secondaries[s]
                .key_columns
                .iter()
                .map(|&c| self.table.columns.field_type(c))
                .collect(),
            None => self.table.key_types(),
        }
    }

    fn encode_bound(&self, bound: &ScanBound) -> crate::error::Result<Vec<u8>> {
        let types = self.key_types_for_bound();
        debug_assert!(bound.key.len() <= types.len());
        let mut out = Vec::new();
        for (value, data_type) in bound.key.iter().zip(types) {
            kvs::encode_key_field(value, data_type, &mut out)?;
        }
        Ok(out)
    }

    /// Encodes the plan-level bounds into the storage scan range.
    ///
    /// Bound keys are treated as prefixes: an exclusive lower (or inclusive
    /// upper) endpoint skips (or covers) every key extending the prefix.
    fn scan_range(&self) -> crate::error::Result<ScanRange> {
        let lower = match &self.bounds.lower {
            None => Bound::Unbounded,
            Some(b) => {
                let bytes = self.encode_bound(b)?;
                if b.inclusive {
                    Bound::Included(bytes)
                } else {
                    match kvs::prefix_successor(&bytes) {
                        Some(next) => Bound::Included(next),
                        None => Bound::Excluded(bytes),
                    }
                }
            }
        };
        let upper = match &self.bounds.upper {
            None => Bound::Unbounded,
            Some(b) => {
                let bytes = self.encode_bound(b)?;
                if b.inclusive {
                    match kvs::prefix_successor(&bytes) {
                        Some(next) => Bound::Excluded(next),
                        None => Bound::Unbounded,
                    }
                } else {
                    Bound::Excluded(bytes)
                }
            }
        };
        Ok(ScanRange { lower, upper })
    }

    fn storage_name(&self) -> &str {
        match self.secondary {
            Some(s) => &self.table.secondaries[s].name,
            None => &self.table.name,
        }
    }

    fn abort(
        &self,
        ctx: &mut TaskContext,
        mut op_ctx: OperatorContext,
        error: ExecError,
    ) -> OperationStatus {
        ctx.record_error(error);
        op_ctx.core_mut().abort();
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Aborted
    }
}

impl RecordOperator for Scan {
    fn process_record(&self, ctx: &mut TaskContext) -> OperationStatus {
        let mut op_ctx = ctx
            .contexts
            .take(self.index)
            .unwrap_or_else(|| OperatorContext::Scan(ScanContext::new()));
        {
            let OperatorContext::Scan(scan_ctx) = &mut op_ctx else {
                unreachable!("context kind mismatch");
            };
            if scan_ctx.core.inactive() {
                ctx.contexts.put(self.index, op_ctx);
                return OperationStatus::Aborted;
            }
            if scan_ctx.iterator.is_none() {
                let Some(database) = ctx.database.clone() else {
                    return self.abort(
                        ctx,
                        op_ctx,
                        ExecError::new(Status::Internal, "scan without a database"),
                    );
                };
                let opened = self
                    .scan_range()
                    .and_then(|range| Ok(database.get_storage(self.storage_name())?.scan(range)?));
                match opened {
                    Ok(iterator) => scan_ctx.iterator = Some(iterator),
                    Err(e) => return self.abort(ctx, op_ctx, e),
                }
            }
            scan_ctx.slice_started = Some(Instant::now());
        }

        let block_size = ctx.config.scan_block_size.max(1);
        let yield_interval = Duration::from_millis(ctx.config.scan_yield_interval_ms.max(1));
        let mut scanned: u64 = 0;
        loop {
            let OperatorContext::Scan(scan_ctx) = &mut op_ctx else {
                unreachable!("context kind mismatch");
            };
            if ctx.cancel.is_cancelled() {
                return self.abort(ctx, op_ctx, ExecError::aborted("request cancelled"));
            }
            let entry = match scan_ctx.iterator.as_mut().expect("opened above").next_entry() {
                Ok(entry) => entry,
                Err(e) => return self.abort(ctx, op_ctx, e.into()),
            };
            let Some((key, value)) = entry else {
                break;
            };
            let row = if self.secondary.is_some() {
                // the secondary entry's value is the primary-key pointer
                let database = ctx.database.as_ref().expect("checked on open");
                let primary = match database.get_storage(&self.table.name) {
                    Ok(p) => p,
                    Err(e) => return self.abort(ctx, op_ctx, e.into()),
                };
                match primary.get(&value) {
                    Ok(Some(primary_value)) => {
                        match self.table.decode_entry(&value, &primary_value) {
                            Ok(row) => row,
                            Err(e) => return self.abort(ctx, op_ctx, e),
                        }
                    }
                    Ok(None) => {
                        return self.abort(
                            ctx,
                            op_ctx,
                            ExecError::new(Status::IoError, "dangling secondary index entry"),
                        )
                    }
                    Err(e) => return self.abort(ctx, op_ctx, e.into()),
                }
            } else {
                match self.table.decode_entry(&key, &value) {
                    Ok(row) => row,
                    Err(e) => return self.abort(ctx, op_ctx, e),
                }
            };
            for (column, variable) in &self.columns {
                ctx.variables.set(*variable, row.get(*column).clone());
            }
            if let Some(downstream) = &self.downstream {
                if !downstream.process_record(ctx).is_ok() {
                    let OperatorContext::Scan(scan_ctx) = &mut op_ctx else {
                        unreachable!("context kind mismatch");
                    };
                    scan_ctx.core.abort();
                    ctx.contexts.put(self.index, op_ctx);
                    self.finish(ctx);
                    return OperationStatus::Aborted;
                }
            }
            scanned += 1;
            let OperatorContext::Scan(scan_ctx) = &mut op_ctx else {
                unreachable!("context kind mismatch");
            };
            let elapsed =
                scan_ctx.slice_started.map_or(Duration::ZERO, |started| started.elapsed());
            if scanned >= block_size || elapsed >= yield_interval {
                ctx.contexts.put(self.index, op_ctx);
                return OperationStatus::Yield;
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        self.finish(ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        if let Some(mut op_ctx) = ctx.contexts.take(self.index) {
            if let OperatorContext::Scan(scan_ctx) = &mut op_ctx {
                scan_ctx.iterator = None;
            }
            ctx.contexts.put(self.index, op_ctx);
        }
        if let Some(downstream) = &self.downstream {
            downstream.finish(ctx);
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Scan
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
