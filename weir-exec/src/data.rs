//! Record and value stores.

use std::sync::Arc;

use weir_types::{DataType, Record, RecordMeta, Value};

use crate::memory::{LifoPagedMemoryResource, PagePool, SliceRef};

/// Append-only store of serialized records backed by pooled pages.
///
/// Records are encoded through their [`RecordMeta`] into the store's own
/// paged resource; iteration and sorting work on the pointer list, not the
/// payload bytes. Pages go back to the pool when the store is dropped or
/// reset.
#[derive(Debug)]
pub struct IterableRecordStore {
    meta: Arc<RecordMeta>,
    resource: LifoPagedMemoryResource,
    records: Vec<SliceRef>,
}

impl IterableRecordStore {
    /// Creates an empty store for records of the given layout.
    pub fn new(pool: Arc<PagePool>, meta: Arc<RecordMeta>) -> Self {
        Self { meta, resource: LifoPagedMemoryResource::new(pool), records: Vec::new() }
    }

    /// The record layout.
    pub fn meta(&self) -> &Arc<RecordMeta> {
        &self.meta
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record, returning its index.
    pub fn append(&mut self, record: &Record) -> usize {
        let bytes = self.meta.encode_to_vec(record);
        let slice = self.resource.append(&bytes);
        self.records.push(slice);
        self.records.len() - 1
    }

    /// Appends an already-serialized record.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> usize {
        let slice = self.resource.append(bytes);
        self.records.push(slice);
        self.records.len() - 1
    }

    /// Serialized bytes of the record at `index`.
    pub fn bytes_at(&self, index: usize) -> &[u8] {
        self.resource.read(self.records[index])
    }

    /// Decoded record at `index`.
    pub fn record_at(&self, index: usize) -> Record {
        self.meta.decode(self.bytes_at(index))
    }

    /// Decoded single field of the record at `index`.
    pub fn field_at(&self, index: usize, field: usize) -> Value {
        self.meta.decode_field(self.bytes_at(index), field)
    }

    /// Iterator over decoded records.
    pub fn iter(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.len()).map(|i| self.record_at(i))
    }

    /// Stable-sorts the pointer list with `compare` over serialized records.
    pub fn sort_by(&mut self, mut compare: impl FnMut(&[u8], &[u8]) -> core::cmp::Ordering) {
        let resource = &self.resource;
        self.records
            .sort_by(|a, b| compare(resource.read(*a), resource.read(*b)));
    }

    /// Drops all records and returns the pages to the pool.
    pub fn reset(&mut self) {
        self.records.clear();
        self.resource.rewind(crate::memory::INITIAL_CHECKPOINT);
    }
}

/// Column of values accumulated per aggregate-function argument.
#[derive(Debug)]
pub struct ValueStore {
    data_type: DataType,
    values: Vec<Value>,
}

impl ValueStore {
    /// Creates an empty store for values of `data_type`.
    pub fn new(data_type: DataType) -> Self {
        Self { data_type, values: Vec::new() }
    }

    /// The value type.
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Appends a value; NULL is recorded as such.
    pub fn append(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Appends a NULL.
    pub fn append_null(&mut self) {
        self.values.push(Value::Null);
    }

    /// Number of accumulated values including NULLs.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when nothing was accumulated.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The accumulated values in append order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Clears the store for the next group.
    pub fn reset(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::global_page_pool;
    use weir_types::Text;

    fn meta() -> Arc<RecordMeta> {
        Arc::new(RecordMeta::new([DataType::Int8, DataType::character_varying()]))
    }

    fn rec(k: i64, v: &str) -> Record {
        Record::new(vec![Value::Int8(k), Value::Character(Text::from(v))])
    }

    #[test]
    fn append_iterate_round_trip() {
        let mut store = IterableRecordStore::new(global_page_pool(), meta());
        store.append(&rec(1, "a"));
        store.append(&rec(2, "bb"));
        let collected: Vec<Record> = store.iter().collect();
        assert_eq!(collected, vec![rec(1, "a"), rec(2, "bb")]);
    }

    #[test]
    fn sort_reorders_pointers_only() {
        let m = meta();
        let mut store = IterableRecordStore::new(global_page_pool(), Arc::clone(&m));
        store.append(&rec(3, "c"));
        store.append(&rec(1, "a"));
        store.append(&rec(2, "b"));
        let key_meta = Arc::clone(&m);
        store.sort_by(|a, b| {
            let ka = key_meta.decode_field(a, 0).to_int8();
            let kb = key_meta.decode_field(b, 0).to_int8();
            ka.cmp(&kb)
        });
        let keys: Vec<i64> = (0..store.len()).map(|i| store.field_at(i, 0).to_int8()).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn reset_returns_pages() {
        let mut store = IterableRecordStore::new(global_page_pool(), meta());
        store.append(&rec(1, "x"));
        assert_eq!(store.len(), 1);
        store.reset();
        assert!(store.is_empty());
    }

    #[test]
    fn value_store_accumulates() {
        let mut vs = ValueStore::new(DataType::Float8);
        vs.append(Value::Float8(1.0));
        vs.append_null();
        vs.append(Value::Float8(2.0));
        assert_eq!(vs.len(), 3);
        assert!(vs.values()[1].is_null());
        vs.reset();
        assert!(vs.is_empty());
    }
}
