//! Aggregate-group operator.

use std::sync::Arc;

use weir_plan::{AggregateColumnSpec, VariableId};
use weir_types::DataType;

use crate::data::ValueStore;
use crate::error::ExecError;
use crate::function::aggregate::{aggregate_function_repository, AggregateFunctionInfo};
use crate::process::context::ContextCore;
use crate::process::TaskContext;

use super::{
    GroupOperator, OperationStatus, OperatorContext, OperatorIndex, OperatorKind, RecordOperator,
};

struct AggregateColumn {
    function: Arc<AggregateFunctionInfo>,
    argument_indices: Vec<usize>,
    destination: VariableId,
}

/// Per-task aggregate state: one value store per distinct argument variable.
#[derive(Debug)]
pub struct AggregateGroupContext {
    /// Shared context core.
    pub core: ContextCore,
    stores: Vec<ValueStore>,
}

impl AggregateGroupContext {
    fn new(argument_types: &[DataType]) -> Self {
        Self {
            core: ContextCore::new(),
            stores: argument_types.iter().cloned().map(ValueStore::new).collect(),
        }
    }
}

/// Accumulates member argument values per group and materializes each
/// aggregate column on the terminal member. An empty shuffle input produces
/// the aggregates' empty values on `finish`.
pub struct AggregateGroup {
    index: OperatorIndex,
    arguments: Vec<VariableId>,
    argument_types: Vec<DataType>,
    columns: Vec<AggregateColumn>,
    downstream: Option<Box<dyn RecordOperator>>,
}

impl AggregateGroup {
    /// Creates the operator, resolving every aggregate in the global
    /// registry. `argument_types` gives each argument variable's type.
    pub fn new(
        index: OperatorIndex,
        specs: &[AggregateColumnSpec],
        argument_types: impl Fn(VariableId) -> DataType,
        downstream: Option<Box<dyn RecordOperator>>,
    ) -> crate::error::Result<Self> {
        // distinct argument variables share one store each
        let mut arguments: Vec<VariableId> = Vec::new();
        for spec in specs {
            for a in &spec.arguments {
                if !arguments.contains(a) {
                    arguments.push(*a);
                }
            }
        }
        let repository = aggregate_function_repository();
        let mut columns = Vec::with_capacity(specs.len());
        for spec in specs {
            let function = repository.find(spec.definition_id).ok_or_else(|| {
                ExecError::not_found(format!(
                    "aggregate function {} is not registered",
                    spec.definition_id
                ))
            })?;
            let argument_indices = spec
                .arguments
                .iter()
                .map(|a| arguments.iter().position(|x| x == a).expect("collected above"))
                .collect();
            columns.push(AggregateColumn {
                function,
                argument_indices,
                destination: spec.destination,
            });
        }
        let argument_types = arguments.iter().map(|&a| argument_types(a)).collect();
        Ok(Self { index, arguments, argument_types, columns, downstream })
    }

    fn aggregate_into_output(
        &self,
        ctx: &mut TaskContext,
        stores: &[ValueStore],
    ) -> OperationStatus {
        for column in &self.columns {
            let refs: Vec<&ValueStore> =
                column.argument_indices.iter().map(|&i| &stores[i]).collect();
            let value = (column.function.aggregator)(&refs);
            if value.is_error() {
                super::record_expression_error(ctx, &value);
                return OperationStatus::Aborted;
            }
            ctx.variables.set(column.destination, value);
        }
        OperationStatus::Ok
    }
}

impl GroupOperator for AggregateGroup {
    fn process_group(&self, ctx: &mut TaskContext, last_member: bool) -> OperationStatus {
        let mut op_ctx = ctx.contexts.take(self.index).unwrap_or_else(|| {
            OperatorContext::AggregateGroup(AggregateGroupContext::new(&self.argument_types))
        });
        let OperatorContext::AggregateGroup(agg_ctx) = &mut op_ctx else {
            unreachable!("context kind mismatch");
        };
        if agg_ctx.core.inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return OperationStatus::Aborted;
        }
        for (i, variable) in self.arguments.iter().enumerate() {
            agg_ctx.stores[i].append(ctx.variables.get(*variable).clone());
        }
        if last_member {
            let status = self.aggregate_into_output(ctx, &agg_ctx.stores);
            if !status.is_ok() {
                agg_ctx.core.abort();
                ctx.contexts.put(self.index, op_ctx);
                return OperationStatus::Aborted;
            }
            if let Some(downstream) = &self.downstream {
                if !downstream.process_record(ctx).is_ok() {
                    agg_ctx.core.abort();
                    ctx.contexts.put(self.index, op_ctx);
                    return OperationStatus::Aborted;
                }
            }
            for store in &mut agg_ctx.stores {
                store.reset();
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        OperationStatus::Ok
    }

    fn finish(&self, ctx: &mut TaskContext) {
        let mut op_ctx = ctx.contexts.take(self.index).unwrap_or_else(|| {
            OperatorContext::AggregateGroup(AggregateGroupContext::new(&self.argument_types))
        });
        let OperatorContext::AggregateGroup(agg_ctx) = &mut op_ctx else {
            unreachable!("context kind mismatch");
        };
        if agg_ctx.core.inactive() {
            ctx.contexts.put(self.index, op_ctx);
            return;
        }
        if ctx.empty_input_from_shuffle {
            for column in &self.columns {
                ctx.variables.set(column.destination, (column.function.empty_value_generator)());
            }
            if let Some(downstream) = &self.downstream {
                if !downstream.process_record(ctx).is_ok() {
                    agg_ctx.core.abort();
                }
            }
        }
        ctx.contexts.put(self.index, op_ctx);
        if let Some(downstream) = &self.downstream {
            downstream.finish(ctx);
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::AggregateGroup
    }

    fn index(&self) -> OperatorIndex {
        self.index
    }
}
