//! Aggregate function registry.
//!
//! An aggregate is a pair of plain function pointers: the *aggregator* folds
//! the accumulated argument stores into one scalar, and the *empty-value
//! generator* produces the result of aggregating an empty input group.

use std::sync::{Arc, OnceLock, RwLock};

use hashbrown::HashMap;
use weir_plan::{AggregateDefinitionId, CompareOp};
use weir_types::Value;

use crate::data::ValueStore;
use crate::eval::arith;

/// Folds the accumulated argument stores into the aggregate result.
pub type Aggregator = fn(&[&ValueStore]) -> Value;

/// Produces the result of aggregating an empty input group.
pub type EmptyValueGenerator = fn() -> Value;

/// Registered aggregate function.
#[derive(Debug, Clone)]
pub struct AggregateFunctionInfo {
    /// Registry id.
    pub definition_id: AggregateDefinitionId,
    /// Name used in diagnostics.
    pub name: &'static str,
    /// Number of arguments the aggregator expects.
    pub arity: usize,
    /// The aggregator body.
    pub aggregator: Aggregator,
    /// The empty-group result.
    pub empty_value_generator: EmptyValueGenerator,
}

/// Process-global aggregate function repository.
#[derive(Debug, Default)]
pub struct AggregateFunctionRepository {
    functions: RwLock<HashMap<AggregateDefinitionId, Arc<AggregateFunctionInfo>>>,
}

impl AggregateFunctionRepository {
    /// Registers (or replaces) an aggregate.
    pub fn register(&self, info: AggregateFunctionInfo) {
        self.functions
            .write()
            .expect("poisoned")
            .insert(info.definition_id, Arc::new(info));
    }

    /// Looks an aggregate up by id.
    pub fn find(&self, id: AggregateDefinitionId) -> Option<Arc<AggregateFunctionInfo>> {
        self.functions.read().expect("poisoned").get(&id).cloned()
    }
}

static AGGREGATE_REPOSITORY: OnceLock<AggregateFunctionRepository> = OnceLock::new();

/// Definition id of builtin `SUM`.
pub const SUM_ID: AggregateDefinitionId = 1;
/// Definition id of builtin `COUNT`.
pub const COUNT_ID: AggregateDefinitionId = 2;
/// Definition id of builtin `AVG`.
pub const AVG_ID: AggregateDefinitionId = 3;
/// Definition id of builtin `MIN`.
pub const MIN_ID: AggregateDefinitionId = 4;
/// Definition id of builtin `MAX`.
pub const MAX_ID: AggregateDefinitionId = 5;

/// The global aggregate function repository with builtins registered.
pub fn aggregate_function_repository() -> &'static AggregateFunctionRepository {
    AGGREGATE_REPOSITORY.get_or_init(|| {
        let repo = AggregateFunctionRepository::default();
        repo.register(AggregateFunctionInfo {
            definition_id: SUM_ID,
            name: "sum",
            arity: 1,
            aggregator: sum,
            empty_value_generator: null_value,
        });
        repo.register(AggregateFunctionInfo {
            definition_id: COUNT_ID,
            name: "count",
            arity: 1,
            aggregator: count,
            empty_value_generator: zero_count,
        });
        repo.register(AggregateFunctionInfo {
            definition_id: AVG_ID,
            name: "avg",
            arity: 1,
            aggregator: avg,
            empty_value_generator: null_value,
        });
        repo.register(AggregateFunctionInfo {
            definition_id: MIN_ID,
            name: "min",
            arity: 1,
            aggregator: min,
            empty_value_generator: null_value,
        });
        repo.register(AggregateFunctionInfo {
            definition_id: MAX_ID,
            name: "max",
            arity: 1,
            aggregator: max,
            empty_value_generator: null_value,
        });
        repo
    })
}

fn null_value() -> Value {
    Value::Null
}

fn zero_count() -> Value {
    Value::Int8(0)
}

fn sum(args: &[&ValueStore]) -> Value {
    let mut acc: Option<Value> = None;
    for v in args[0].values() {
        if v.is_null() {
            continue;
        }
        acc = Some(match acc {
            None => v.clone(),
            Some(a) => {
                let s = arith::add_values(&a, v);
                if s.is_error() {
                    return s;
                }
                s
            }
        });
    }
    acc.unwrap_or(Value::Null)
}

fn count(args: &[&ValueStore]) -> Value {
    let n = args[0].values().iter().filter(|v| !v.is_null()).count();
    Value::Int8(n as i64)
}

fn avg(args: &[&ValueStore]) -> Value {
    let total = sum(args);
    if total.is_null() || total.is_error() {
        return total;
    }
    let n = args[0].values().iter().filter(|v| !v.is_null()).count();
    arith::divide_values(&total, &Value::Int8(n as i64))
}

fn extreme(args: &[&ValueStore], keep_left: CompareOp) -> Value {
    let mut best: Option<Value> = None;
    for v in args[0].values() {
        if v.is_null() {
            continue;
        }
        best = Some(match best {
            None => v.clone(),
            Some(b) => {
                let keep = arith::compare_values(keep_left, &b, v);
                if keep.is_error() {
                    return keep;
                }
                if keep.to_boolean() {
                    b
                } else {
                    v.clone()
                }
            }
        });
    }
    best.unwrap_or(Value::Null)
}

fn min(args: &[&ValueStore]) -> Value {
    extreme(args, CompareOp::LessEqual)
}

fn max(args: &[&ValueStore]) -> Value {
    extreme(args, CompareOp::GreaterEqual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_types::decimal::ensure_decimal_context;
    use weir_types::DataType;

    fn store(values: Vec<Value>) -> ValueStore {
        let mut s = ValueStore::new(DataType::Float8);
        for v in values {
            s.append(v);
        }
        s
    }

    #[test]
    fn sum_skips_nulls() {
        ensure_decimal_context();
        let s = store(vec![Value::Float8(1.0), Value::Null, Value::Float8(2.5)]);
        assert_eq!(sum(&[&s]), Value::Float8(3.5));
        let empty = store(vec![Value::Null]);
        assert_eq!(sum(&[&empty]), Value::Null);
    }

    #[test]
    fn count_counts_non_null() {
        let s = store(vec![Value::Float8(1.0), Value::Null]);
        assert_eq!(count(&[&s]), Value::Int8(1));
        assert_eq!(zero_count(), Value::Int8(0));
    }

    #[test]
    fn avg_divides_by_non_null_count() {
        ensure_decimal_context();
        let s = store(vec![Value::Float8(1.0), Value::Float8(3.0), Value::Null]);
        assert_eq!(avg(&[&s]), Value::Float8(2.0));
    }

    #[test]
    fn min_max_scan_all_members() {
        ensure_decimal_context();
        let s = store(vec![Value::Float8(3.0), Value::Float8(1.0), Value::Float8(2.0)]);
        assert_eq!(min(&[&s]), Value::Float8(1.0));
        assert_eq!(max(&[&s]), Value::Float8(3.0));
    }

    #[test]
    fn builtins_are_registered() {
        let repo = aggregate_function_repository();
        for id in [SUM_ID, COUNT_ID, AVG_ID, MIN_ID, MAX_ID] {
            assert!(repo.find(id).is_some());
        }
    }
}
