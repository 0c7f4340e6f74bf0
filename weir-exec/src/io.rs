//! Reader and writer contracts between operators, exchanges and sinks.

use std::sync::{Arc, Mutex};

use weir_types::Record;

/// Pull-based source of records.
pub trait RecordReader: Send {
    /// The next record, or `None` at the end of input.
    fn next_record(&mut self) -> Option<Record>;
}

/// Push-based sink of records.
pub trait RecordWriter: Send {
    /// Appends one record; delivery order within one task is call order.
    fn write(&mut self, record: Record);

    /// Makes buffered records visible to the consumer.
    fn flush(&mut self);

    /// Releases the writer; no further calls are made.
    fn release(&mut self);
}

/// Pull-based source of key-grouped records.
///
/// The protocol is `next_group` / (`get_group`, then `next_member` /
/// `get_member` until exhausted), repeated until `next_group` is false.
pub trait GroupReader: Send {
    /// Advances to the next group.
    fn next_group(&mut self) -> bool;

    /// The key record of the current group.
    fn get_group(&self) -> Record;

    /// Advances to the next member of the current group.
    fn next_member(&mut self) -> bool;

    /// The value record of the current member.
    fn get_member(&self) -> Record;
}

/// Record reader over a pre-built vector.
#[derive(Debug)]
pub struct VecRecordReader {
    records: std::vec::IntoIter<Record>,
}

impl VecRecordReader {
    /// Creates a reader over `records`.
    pub fn new(records: Vec<Record>) -> Self {
        Self { records: records.into_iter() }
    }
}

impl RecordReader for VecRecordReader {
    fn next_record(&mut self) -> Option<Record> {
        self.records.next()
    }
}

/// Shared sink collecting written records; the result writer of tests and
/// the in-process service.
#[derive(Debug, Clone, Default)]
pub struct CollectingWriter {
    records: Arc<Mutex<Vec<Record>>>,
    released: Arc<Mutex<bool>>,
}

impl CollectingWriter {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().expect("poisoned").clone()
    }

    /// True once some writer handle was released.
    pub fn is_released(&self) -> bool {
        *self.released.lock().expect("poisoned")
    }
}

impl RecordWriter for CollectingWriter {
    fn write(&mut self, record: Record) {
        self.records.lock().expect("poisoned").push(record);
    }

    fn flush(&mut self) {}

    fn release(&mut self) {
        *self.released.lock().expect("poisoned") = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_types::Value;

    #[test]
    fn vec_reader_drains_in_order() {
        let mut r = VecRecordReader::new(vec![
            Record::new(vec![Value::Int4(1)]),
            Record::new(vec![Value::Int4(2)]),
        ]);
        assert_eq!(r.next_record().unwrap().get(0), &Value::Int4(1));
        assert_eq!(r.next_record().unwrap().get(0), &Value::Int4(2));
        assert!(r.next_record().is_none());
    }

    #[test]
    fn collecting_writer_shares_output() {
        let sink = CollectingWriter::new();
        let mut handle = sink.clone();
        handle.write(Record::new(vec![Value::Int4(7)]));
        handle.flush();
        handle.release();
        assert_eq!(sink.records().len(), 1);
        assert!(sink.is_released());
    }
}
