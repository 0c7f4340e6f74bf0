//! Group (shuffle) exchange: input partitions and the merging group reader.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BinaryHeap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use weir_plan::{KeyOrdering, SortDirection};
use weir_types::{Decimal, Record, RecordMeta, Value};

use crate::data::IterableRecordStore;
use crate::io::{GroupReader, RecordWriter};
use crate::memory::PagePool;

/// Shuffle metadata fixed at plan-compile time: the input record layout, the
/// key columns with their ordering directions, and the derived key/value
/// layouts.
#[derive(Debug)]
pub struct GroupShuffleInfo {
    record_meta: Arc<RecordMeta>,
    key_orderings: Vec<KeyOrdering>,
    value_columns: Vec<usize>,
    key_meta: Arc<RecordMeta>,
    value_meta: Arc<RecordMeta>,
}

impl GroupShuffleInfo {
    /// Shuffle on the given key columns, all ascending.
    pub fn new(record_meta: Arc<RecordMeta>, key_columns: Vec<usize>) -> Self {
        Self::with_orderings(
            record_meta,
            key_columns.into_iter().map(KeyOrdering::ascending).collect(),
        )
    }

    /// Shuffle with explicit per-column ordering directions.
    pub fn with_orderings(record_meta: Arc<RecordMeta>, key_orderings: Vec<KeyOrdering>) -> Self {
        let key_set: Vec<usize> = key_orderings.iter().map(|k| k.column).collect();
        let value_columns: Vec<usize> =
            (0..record_meta.field_count()).filter(|i| !key_set.contains(i)).collect();
        let key_meta = Arc::new(RecordMeta::new(
            key_set.iter().map(|&i| record_meta.field_type(i).clone()),
        ));
        let value_meta = Arc::new(RecordMeta::new(
            value_columns.iter().map(|&i| record_meta.field_type(i).clone()),
        ));
        Self { record_meta, key_orderings, value_columns, key_meta, value_meta }
    }

    /// The full input record layout.
    pub fn record_meta(&self) -> &Arc<RecordMeta> {
        &self.record_meta
    }

    /// The derived key layout.
    pub fn key_meta(&self) -> &Arc<RecordMeta> {
        &self.key_meta
    }

    /// The derived value layout.
    pub fn value_meta(&self) -> &Arc<RecordMeta> {
        &self.value_meta
    }

    /// Key columns with directions.
    pub fn key_orderings(&self) -> &[KeyOrdering] {
        &self.key_orderings
    }

    /// Extracts the key record of `record`.
    pub fn key_record(&self, record: &Record) -> Record {
        Record::new(self.key_orderings.iter().map(|k| record.get(k.column).clone()).collect())
    }

    /// Extracts the value record of `record`.
    pub fn value_record(&self, record: &Record) -> Record {
        Record::new(self.value_columns.iter().map(|&i| record.get(i).clone()).collect())
    }

    /// Hash of the key columns, used for partition routing.
    pub fn key_hash(&self, record: &Record) -> u64 {
        let key = self.key_record(record);
        let bytes = self.key_meta.encode_to_vec(&key);
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        hasher.finish()
    }

    /// Compares two serialized full records by key, honoring directions.
    pub fn compare_serialized(&self, a: &[u8], b: &[u8]) -> Ordering {
        for k in &self.key_orderings {
            let va = self.record_meta.decode_field(a, k.column);
            let vb = self.record_meta.decode_field(b, k.column);
            let ord = compare_field_values(&va, &vb);
            let ord = match k.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Compares two key records, honoring directions.
    pub fn compare_keys(&self, a: &Record, b: &Record) -> Ordering {
        for (i, k) in self.key_orderings.iter().enumerate() {
            let ord = compare_field_values(a.get(i), b.get(i));
            let ord = match k.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Total order over same-kind field values: NULL first, NaN last among
/// floats.
pub fn compare_field_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Int4(x), Value::Int4(y)) => x.cmp(y),
        (Value::Int8(x), Value::Int8(y)) => x.cmp(y),
        (Value::Float4(x), Value::Float4(y)) => x.total_cmp(y),
        (Value::Float8(x), Value::Float8(y)) => x.total_cmp(y),
        (Value::Decimal(x), Value::Decimal(y)) => Decimal::Finite(*x)
            .cmp_numeric(&Decimal::Finite(*y))
            .unwrap_or(Ordering::Equal),
        (Value::Character(x), Value::Character(y)) => x.cmp(y),
        (Value::Octet(x), Value::Octet(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::TimeOfDay(x), Value::TimeOfDay(y)) => x.cmp(y),
        (Value::TimePoint(x), Value::TimePoint(y)) => x.cmp(y),
        (x, y) => {
            debug_assert!(false, "mismatched key kinds {:?} / {:?}", x.type_index(), y.type_index());
            Ordering::Equal
        }
    }
}

/// One shuffle partition on the write side.
///
/// Writes append serialized records; `flush` sorts them by key (stable, so
/// equal-key members keep insertion order) and freezes the partition. Between
/// `write` and `flush` iteration is forbidden; after `flush` the partition is
/// read-only.
#[derive(Debug)]
pub struct InputPartition {
    info: Arc<GroupShuffleInfo>,
    store: IterableRecordStore,
    flushed: bool,
}

impl InputPartition {
    /// Creates an empty partition.
    pub fn new(pool: Arc<PagePool>, info: Arc<GroupShuffleInfo>) -> Self {
        let meta = Arc::clone(info.record_meta());
        Self { info, store: IterableRecordStore::new(pool, meta), flushed: false }
    }

    /// Appends one record.
    pub fn write(&mut self, record: &Record) {
        debug_assert!(!self.flushed, "write after flush");
        self.store.append(record);
    }

    /// Sorts by key and freezes the partition.
    pub fn flush(&mut self) {
        debug_assert!(!self.flushed, "double flush");
        let info = Arc::clone(&self.info);
        self.store.sort_by(|a, b| info.compare_serialized(a, b));
        self.flushed = true;
    }

    /// Number of records written.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True when no records were written.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// True once the partition is frozen.
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// The shuffle metadata.
    pub fn info(&self) -> &Arc<GroupShuffleInfo> {
        &self.info
    }

    fn key_at(&self, index: usize) -> Record {
        debug_assert!(self.flushed, "iteration before flush");
        self.info.key_record(&self.store.record_at(index))
    }

    fn value_at(&self, index: usize) -> Record {
        debug_assert!(self.flushed, "iteration before flush");
        self.info.value_record(&self.store.record_at(index))
    }
}

/// The shared data plane of one group exchange.
///
/// Writer tasks donate their flushed partition sets; reader tasks merge the
/// column of partitions belonging to their downstream partition index.
#[derive(Debug)]
pub struct GroupExchange {
    info: Arc<GroupShuffleInfo>,
    partition_count: usize,
    pool: Arc<PagePool>,
    donated: Mutex<Vec<Vec<Arc<InputPartition>>>>,
}

impl GroupExchange {
    /// Creates the exchange with `partition_count` downstream partitions.
    pub fn new(info: Arc<GroupShuffleInfo>, partition_count: usize, pool: Arc<PagePool>) -> Self {
        debug_assert!(partition_count > 0);
        Self { info, partition_count, pool, donated: Mutex::new(Vec::new()) }
    }

    /// The shuffle metadata.
    pub fn info(&self) -> &Arc<GroupShuffleInfo> {
        &self.info
    }

    /// Number of downstream partitions.
    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// Creates a writer for one upstream task.
    pub fn writer(self: &Arc<Self>) -> GroupExchangeWriter {
        let partitions = (0..self.partition_count)
            .map(|_| InputPartition::new(Arc::clone(&self.pool), Arc::clone(&self.info)))
            .collect();
        GroupExchangeWriter { exchange: Arc::clone(self), partitions: Some(partitions) }
    }

    /// Creates the merging reader for downstream partition `index`.
    ///
    /// All writers must have released before readers are created; the DAG
    /// controller sequences the steps accordingly.
    pub fn reader(&self, index: usize) -> ShuffleGroupReader {
        debug_assert!(index < self.partition_count);
        let donated = self.donated.lock().expect("poisoned");
        let partitions: Vec<Arc<InputPartition>> =
            donated.iter().map(|set| Arc::clone(&set[index])).collect();
        ShuffleGroupReader::new(Arc::clone(&self.info), partitions)
    }

    /// True when no writer donated any record for any partition.
    pub fn is_empty(&self) -> bool {
        self.donated
            .lock()
            .expect("poisoned")
            .iter()
            .all(|set| set.iter().all(|p| p.is_empty()))
    }

    fn donate(&self, partitions: Vec<Arc<InputPartition>>) {
        self.donated.lock().expect("poisoned").push(partitions);
    }
}

/// Per-task writer routing records into hash partitions.
#[derive(Debug)]
pub struct GroupExchangeWriter {
    exchange: Arc<GroupExchange>,
    partitions: Option<Vec<InputPartition>>,
}

impl RecordWriter for GroupExchangeWriter {
    fn write(&mut self, record: Record) {
        let partitions = self.partitions.as_mut().expect("writer released");
        let index = (self.exchange.info.key_hash(&record) % partitions.len() as u64) as usize;
        partitions[index].write(&record);
    }

    fn flush(&mut self) {}

    fn release(&mut self) {
        if let Some(mut partitions) = self.partitions.take() {
            for p in &mut partitions {
                p.flush();
            }
            self.exchange.donate(partitions.into_iter().map(Arc::new).collect());
        }
    }
}

struct HeapEntry {
    key: Record,
    input: usize,
    info: Arc<GroupShuffleInfo>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap, we need the smallest key (with
        // the smallest input index for determinism) on top
        self.info
            .compare_keys(&self.key, &other.key)
            .then_with(|| self.input.cmp(&other.input))
            .reverse()
    }
}

struct PartitionCursor {
    partition: Arc<InputPartition>,
    pos: usize,
}

/// Merges N flushed partitions into globally key-ordered groups.
pub struct ShuffleGroupReader {
    info: Arc<GroupShuffleInfo>,
    cursors: Vec<PartitionCursor>,
    heap: BinaryHeap<HeapEntry>,
    current_key: Option<Record>,
    members: Vec<Record>,
    member_pos: usize,
}

impl ShuffleGroupReader {
    fn new(info: Arc<GroupShuffleInfo>, partitions: Vec<Arc<InputPartition>>) -> Self {
        let mut reader = Self {
            info,
            cursors: partitions
                .into_iter()
                .map(|partition| PartitionCursor { partition, pos: 0 })
                .collect(),
            heap: BinaryHeap::new(),
            current_key: None,
            members: Vec::new(),
            member_pos: 0,
        };
        for input in 0..reader.cursors.len() {
            reader.push_cursor_key(input);
        }
        reader
    }

    fn push_cursor_key(&mut self, input: usize) {
        let cursor = &self.cursors[input];
        if cursor.pos < cursor.partition.len() {
            self.heap.push(HeapEntry {
                key: cursor.partition.key_at(cursor.pos),
                input,
                info: Arc::clone(&self.info),
            });
        }
    }

    /// Drains every record of `input` whose key equals `key`.
    fn drain_equal(&mut self, input: usize, key: &Record) {
        loop {
            let cursor = &mut self.cursors[input];
            if cursor.pos >= cursor.partition.len() {
                return;
            }
            let candidate = cursor.partition.key_at(cursor.pos);
            if self.info.compare_keys(&candidate, key) != Ordering::Equal {
                return;
            }
            self.members.push(cursor.partition.value_at(cursor.pos));
            cursor.pos += 1;
        }
    }
}

impl GroupReader for ShuffleGroupReader {
    fn next_group(&mut self) -> bool {
        self.members.clear();
        self.member_pos = 0;
        let Some(top) = self.heap.pop() else {
            self.current_key = None;
            return false;
        };
        let key = top.key;
        self.drain_equal(top.input, &key);
        self.push_cursor_key(top.input);
        // pull every other input holding the same key
        while let Some(peek) = self.heap.peek() {
            if self.info.compare_keys(&peek.key, &key) != Ordering::Equal {
                break;
            }
            let entry = self.heap.pop().expect("peeked");
            self.drain_equal(entry.input, &key);
            self.push_cursor_key(entry.input);
        }
        debug_assert!(!self.members.is_empty());
        self.current_key = Some(key);
        true
    }

    fn get_group(&self) -> Record {
        self.current_key.clone().expect("no current group")
    }

    fn next_member(&mut self) -> bool {
        if self.member_pos < self.members.len() {
            self.member_pos += 1;
            true
        } else {
            false
        }
    }

    fn get_member(&self) -> Record {
        self.members[self.member_pos - 1].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::global_page_pool;
    use weir_types::DataType;

    fn info() -> Arc<GroupShuffleInfo> {
        Arc::new(GroupShuffleInfo::new(
            Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8])),
            vec![0],
        ))
    }

    fn rec(k: i64, v: f64) -> Record {
        Record::new(vec![Value::Int8(k), Value::Float8(v)])
    }

    #[test]
    fn partition_sorts_stably_on_flush() {
        let mut p = InputPartition::new(global_page_pool(), info());
        p.write(&rec(3, 3.0));
        p.write(&rec(1, 1.0));
        p.write(&rec(1, 2.0));
        p.write(&rec(2, 4.0));
        p.flush();
        assert!(p.is_flushed());
        let keys: Vec<i64> = (0..p.len()).map(|i| p.key_at(i).get(0).to_int8()).collect();
        assert_eq!(keys, vec![1, 1, 2, 3]);
        // equal keys keep insertion order
        assert_eq!(p.value_at(0).get(0), &Value::Float8(1.0));
        assert_eq!(p.value_at(1).get(0), &Value::Float8(2.0));
    }

    #[test]
    fn reader_merges_two_partitions() {
        let i = info();
        let mut p1 = InputPartition::new(global_page_pool(), Arc::clone(&i));
        let mut p2 = InputPartition::new(global_page_pool(), Arc::clone(&i));
        p1.write(&rec(3, 3.0));
        p1.write(&rec(1, 2.0));
        p1.flush();
        p2.write(&rec(1, 1.0));
        p2.flush();

        let mut r = ShuffleGroupReader::new(Arc::clone(&i), vec![Arc::new(p1), Arc::new(p2)]);
        assert!(r.next_group());
        assert_eq!(r.get_group().get(0), &Value::Int8(1));
        let mut members = Vec::new();
        while r.next_member() {
            members.push(r.get_member().get(0).to_float8());
        }
        members.sort_by(f64::total_cmp);
        assert_eq!(members, vec![1.0, 2.0]);

        assert!(r.next_group());
        assert_eq!(r.get_group().get(0), &Value::Int8(3));
        assert!(r.next_member());
        assert_eq!(r.get_member().get(0), &Value::Float8(3.0));
        assert!(!r.next_member());
        assert!(!r.next_group());
    }

    #[test]
    fn merge_keys_are_monotone() {
        let i = info();
        let mut partitions = Vec::new();
        for chunk in [[5i64, 2, 9], [1, 7, 2], [8, 3, 3]] {
            let mut p = InputPartition::new(global_page_pool(), Arc::clone(&i));
            for k in chunk {
                p.write(&rec(k, k as f64));
            }
            p.flush();
            partitions.push(Arc::new(p));
        }
        let mut r = ShuffleGroupReader::new(Arc::clone(&i), partitions);
        let mut prev: Option<i64> = None;
        let mut total = 0usize;
        while r.next_group() {
            let key = r.get_group().get(0).to_int8();
            if let Some(p) = prev {
                assert!(p < key, "keys must strictly increase across groups");
            }
            prev = Some(key);
            while r.next_member() {
                total += 1;
            }
        }
        assert_eq!(total, 9);
    }

    #[test]
    fn descending_ordering_reverses_groups() {
        let meta = Arc::new(RecordMeta::new([DataType::Int8, DataType::Float8]));
        let i = Arc::new(GroupShuffleInfo::with_orderings(
            meta,
            vec![KeyOrdering::descending(0)],
        ));
        let mut p = InputPartition::new(global_page_pool(), Arc::clone(&i));
        for k in [1i64, 3, 2] {
            p.write(&rec(k, 0.0));
        }
        p.flush();
        let mut r = ShuffleGroupReader::new(Arc::clone(&i), vec![Arc::new(p)]);
        let mut keys = Vec::new();
        while r.next_group() {
            keys.push(r.get_group().get(0).to_int8());
        }
        assert_eq!(keys, vec![3, 2, 1]);
    }

    #[test]
    fn writer_routes_equal_keys_to_one_partition() {
        let pool = global_page_pool();
        let exchange = Arc::new(GroupExchange::new(info(), 4, pool));
        let mut w = exchange.writer();
        for k in [1i64, 2, 1, 3, 1] {
            w.write(rec(k, k as f64));
        }
        w.release();
        // all records with key 1 must land in the same downstream partition
        let mut found = 0;
        for p in 0..4 {
            let mut r = exchange.reader(p);
            while r.next_group() {
                if r.get_group().get(0).to_int8() == 1 {
                    let mut members = 0;
                    while r.next_member() {
                        members += 1;
                    }
                    assert_eq!(members, 3);
                    found += 1;
                }
            }
        }
        assert_eq!(found, 1);
    }
}
