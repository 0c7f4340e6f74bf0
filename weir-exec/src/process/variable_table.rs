//! Variable tables.
//!
//! A variable table is a record buffer plus the mapping from plan variable
//! ids to field indices. Each operator block has one input and one output
//! table; they may alias (the same table instance serves both roles).

use std::sync::Arc;

use hashbrown::HashMap;
use weir_plan::VariableId;
use weir_types::{DataType, Record, RecordMeta, Value};

/// Static shape of a variable table: layout plus the variable map.
#[derive(Debug, Clone)]
pub struct VariableTableInfo {
    meta: Arc<RecordMeta>,
    index_by_variable: HashMap<VariableId, usize>,
    variables: Vec<VariableId>,
}

impl VariableTableInfo {
    /// Builds table info from `(variable, type)` pairs in field order.
    pub fn new(columns: impl IntoIterator<Item = (VariableId, DataType)>) -> Self {
        let mut types = Vec::new();
        let mut variables = Vec::new();
        let mut index_by_variable = HashMap::new();
        for (i, (variable, data_type)) in columns.into_iter().enumerate() {
            types.push(data_type);
            variables.push(variable);
            let replaced = index_by_variable.insert(variable, i);
            debug_assert!(replaced.is_none(), "duplicate variable {variable}");
        }
        Self { meta: Arc::new(RecordMeta::new(types)), index_by_variable, variables }
    }

    /// The record layout behind the table.
    pub fn meta(&self) -> &Arc<RecordMeta> {
        &self.meta
    }

    /// True when the table maps `variable`.
    pub fn exists(&self, variable: VariableId) -> bool {
        self.index_by_variable.contains_key(&variable)
    }

    /// Field index of `variable`.
    pub fn index_of(&self, variable: VariableId) -> Option<usize> {
        self.index_by_variable.get(&variable).copied()
    }

    /// Declared type of `variable`.
    pub fn type_of(&self, variable: VariableId) -> Option<&DataType> {
        self.index_of(variable).map(|i| self.meta.field_type(i))
    }

    /// The variables in field order.
    pub fn variables(&self) -> &[VariableId] {
        &self.variables
    }

    /// Number of mapped variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True for a table with no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// A mutable record addressed by plan variables.
#[derive(Debug, Clone)]
pub struct VariableTable {
    info: Arc<VariableTableInfo>,
    record: Record,
}

impl VariableTable {
    /// Creates an all-NULL table over `info`.
    pub fn new(info: Arc<VariableTableInfo>) -> Self {
        let record = Record::nulls(info.len());
        Self { info, record }
    }

    /// The table's static shape.
    pub fn info(&self) -> &VariableTableInfo {
        &self.info
    }

    /// The current record.
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Reads the value bound to `variable`.
    ///
    /// The variable must be mapped; the planner guarantees references are
    /// resolvable.
    pub fn get(&self, variable: VariableId) -> &Value {
        let index = self
            .info
            .index_of(variable)
            .unwrap_or_else(|| panic!("unmapped variable {variable}"));
        self.record.get(index)
    }

    /// Binds `value` to `variable`.
    pub fn set(&mut self, variable: VariableId, value: Value) {
        let index = self
            .info
            .index_of(variable)
            .unwrap_or_else(|| panic!("unmapped variable {variable}"));
        self.record.set(index, value);
    }

    /// Binds the field at `index` directly.
    pub fn set_by_index(&mut self, index: usize, value: Value) {
        self.record.set(index, value);
    }

    /// Resets every field to NULL.
    pub fn clear(&mut self) {
        self.record = Record::nulls(self.info.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> Arc<VariableTableInfo> {
        Arc::new(VariableTableInfo::new([
            (VariableId(10), DataType::Int8),
            (VariableId(11), DataType::Float8),
        ]))
    }

    #[test]
    fn set_get_round_trip() {
        let mut table = VariableTable::new(info());
        assert!(table.get(VariableId(10)).is_null());
        table.set(VariableId(10), Value::Int8(5));
        table.set(VariableId(11), Value::Float8(2.5));
        assert_eq!(table.get(VariableId(10)), &Value::Int8(5));
        assert_eq!(table.get(VariableId(11)), &Value::Float8(2.5));
        table.clear();
        assert!(table.get(VariableId(11)).is_null());
    }

    #[test]
    fn info_lookup() {
        let info = info();
        assert!(info.exists(VariableId(10)));
        assert!(!info.exists(VariableId(99)));
        assert_eq!(info.type_of(VariableId(11)), Some(&DataType::Float8));
    }
}
