//! Forward and broadcast exchanges.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use weir_types::Record;

use crate::io::{RecordReader, RecordWriter};

/// Pass-through exchange: writers push, a single consumer pulls in arrival
/// order. Order across writer tasks is unspecified.
#[derive(Debug, Default)]
pub struct ForwardExchange {
    queue: Mutex<VecDeque<Record>>,
}

impl ForwardExchange {
    /// Creates an empty exchange.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer handle.
    pub fn writer(self: &Arc<Self>) -> ForwardWriter {
        ForwardWriter { exchange: Arc::clone(self) }
    }

    /// Creates the consuming reader.
    pub fn reader(self: &Arc<Self>) -> ForwardReader {
        ForwardReader { exchange: Arc::clone(self) }
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("poisoned").len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writer side of a forward exchange.
#[derive(Debug)]
pub struct ForwardWriter {
    exchange: Arc<ForwardExchange>,
}

impl RecordWriter for ForwardWriter {
    fn write(&mut self, record: Record) {
        self.exchange.queue.lock().expect("poisoned").push_back(record);
    }

    fn flush(&mut self) {}

    fn release(&mut self) {}
}

/// Reader side of a forward exchange.
#[derive(Debug)]
pub struct ForwardReader {
    exchange: Arc<ForwardExchange>,
}

impl RecordReader for ForwardReader {
    fn next_record(&mut self) -> Option<Record> {
        self.exchange.queue.lock().expect("poisoned").pop_front()
    }
}

/// Broadcast exchange: every record is cloned into each consumer's queue.
#[derive(Debug)]
pub struct BroadcastExchange {
    queues: Vec<Arc<Mutex<VecDeque<Record>>>>,
}

impl BroadcastExchange {
    /// Creates the exchange with `consumers` downstream readers.
    pub fn new(consumers: usize) -> Self {
        Self { queues: (0..consumers).map(|_| Arc::new(Mutex::new(VecDeque::new()))).collect() }
    }

    /// Number of consumers.
    pub fn consumer_count(&self) -> usize {
        self.queues.len()
    }

    /// Creates a writer handle feeding every consumer.
    pub fn writer(&self) -> BroadcastWriter {
        BroadcastWriter { queues: self.queues.clone() }
    }

    /// Creates the reader for consumer `index`.
    pub fn reader(&self, index: usize) -> BroadcastReader {
        BroadcastReader { queue: Arc::clone(&self.queues[index]) }
    }
}

/// Writer side of a broadcast exchange.
#[derive(Debug)]
pub struct BroadcastWriter {
    queues: Vec<Arc<Mutex<VecDeque<Record>>>>,
}

impl RecordWriter for BroadcastWriter {
    fn write(&mut self, record: Record) {
        for q in &self.queues {
            q.lock().expect("poisoned").push_back(record.clone());
        }
    }

    fn flush(&mut self) {}

    fn release(&mut self) {}
}

/// Reader side of a broadcast exchange.
#[derive(Debug)]
pub struct BroadcastReader {
    queue: Arc<Mutex<VecDeque<Record>>>,
}

impl RecordReader for BroadcastReader {
    fn next_record(&mut self) -> Option<Record> {
        self.queue.lock().expect("poisoned").pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_types::Value;

    fn rec(v: i32) -> Record {
        Record::new(vec![Value::Int4(v)])
    }

    #[test]
    fn forward_is_fifo_per_writer() {
        let exchange = Arc::new(ForwardExchange::new());
        let mut w = exchange.writer();
        w.write(rec(1));
        w.write(rec(2));
        let mut r = exchange.reader();
        assert_eq!(r.next_record().unwrap().get(0), &Value::Int4(1));
        assert_eq!(r.next_record().unwrap().get(0), &Value::Int4(2));
        assert!(r.next_record().is_none());
    }

    #[test]
    fn broadcast_clones_to_all_consumers() {
        let exchange = BroadcastExchange::new(3);
        let mut w = exchange.writer();
        w.write(rec(7));
        for i in 0..3 {
            let mut r = exchange.reader(i);
            assert_eq!(r.next_record().unwrap().get(0), &Value::Int4(7));
            assert!(r.next_record().is_none());
        }
    }
}
