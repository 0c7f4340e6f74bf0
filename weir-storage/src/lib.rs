//! Key-value storage contracts for the weir execution core.
//!
//! The execution core reads and writes through these traits; the durable
//! storage engine behind them is an external collaborator. The crate ships a
//! [`MemoryStore`]-backed [`Database`] as the reference implementation used by
//! the executor tests and the in-process service.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod error;
mod memory;
mod transaction;

pub use error::StorageError;
pub use memory::{MemoryIterator, MemoryStore};
pub use transaction::{Strand, Transaction, TransactionId};

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

/// Result alias for storage operations.
pub type Result<T> = core::result::Result<T, StorageError>;

/// A byte-key range with per-endpoint inclusive/exclusive bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    /// Lower endpoint.
    pub lower: Bound<Vec<u8>>,
    /// Upper endpoint.
    pub upper: Bound<Vec<u8>>,
}

impl Default for ScanRange {
    fn default() -> Self {
        Self::full()
    }
}

impl ScanRange {
    /// The unbounded full range.
    pub fn full() -> Self {
        Self { lower: Bound::Unbounded, upper: Bound::Unbounded }
    }

    /// A range over all keys starting with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        let mut upper = prefix.to_vec();
        loop {
            match upper.last() {
                Some(&0xff) => {
                    upper.pop();
                }
                Some(_) => {
                    let last = upper.len() - 1;
                    upper[last] += 1;
                    return Self {
                        lower: Bound::Included(prefix.to_vec()),
                        upper: Bound::Excluded(upper),
                    };
                }
                None => {
                    return Self { lower: Bound::Included(prefix.to_vec()), upper: Bound::Unbounded }
                }
            }
        }
    }

    /// True when `key` falls inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        let lower_ok = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(b) => key >= b.as_slice(),
            Bound::Excluded(b) => key > b.as_slice(),
        };
        let upper_ok = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(b) => key <= b.as_slice(),
            Bound::Excluded(b) => key < b.as_slice(),
        };
        lower_ok && upper_ok
    }
}

/// Streaming iterator over `(key, value)` entries in key order.
///
/// Implementations release any engine-side cursor when dropped.
pub trait KvsIterator {
    /// Advances to the next entry, returning `None` at the end of the range.
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>>;
}

/// A single ordered key-value storage (one table index).
pub trait KeyValueStore: Send + Sync {
    /// Point lookup.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Inserts or replaces an entry, returning the replaced value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Removes an entry, returning the removed value.
    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Opens a key-ordered iterator over `range`.
    ///
    /// The iterator owns its cursor state, so callers may hold it across
    /// task slices.
    fn scan(&self, range: ScanRange) -> Result<Box<dyn KvsIterator + Send>>;
}

/// A database: a set of named storages (primary and secondary indexes).
#[derive(Clone, Default)]
pub struct Database {
    storages: Arc<RwLock<HashMap<String, Arc<MemoryStore>>>>,
}

impl Database {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage with the given name.
    pub fn create_storage(&self, name: &str) -> Result<Arc<MemoryStore>> {
        let mut storages = self.storages.write().expect("poisoned");
        if storages.contains_key(name) {
            return Err(StorageError::AlreadyExists { name: name.into() });
        }
        let storage = Arc::new(MemoryStore::default());
        storages.insert(name.into(), Arc::clone(&storage));
        tracing::debug!(name, "storage created");
        Ok(storage)
    }

    /// Returns the storage with the given name.
    pub fn get_storage(&self, name: &str) -> Result<Arc<MemoryStore>> {
        self.storages
            .read()
            .expect("poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { name: name.into() })
    }

    /// Returns the storage with the given name, creating it when absent.
    pub fn get_or_create_storage(&self, name: &str) -> Arc<MemoryStore> {
        if let Ok(existing) = self.get_storage(name) {
            return existing;
        }
        match self.create_storage(name) {
            Ok(storage) => storage,
            // lost the race; the other creator's storage is now present
            Err(_) => self.get_storage(name).expect("storage exists after race"),
        }
    }

    /// Drops the storage with the given name.
    pub fn drop_storage(&self, name: &str) -> Result<()> {
        let mut storages = self.storages.write().expect("poisoned");
        storages
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound { name: name.into() })
    }

    /// Names of all storages, unordered.
    pub fn storage_names(&self) -> Vec<String> {
        self.storages.read().expect("poisoned").keys().cloned().collect()
    }
}

impl core::fmt::Debug for Database {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let count = self.storages.read().map(|s| s.len()).unwrap_or(0);
        write!(f, "Database {{ storages: {count} }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_range_excludes_next_sibling() {
        let r = ScanRange::prefix(b"ab");
        assert!(r.contains(b"ab"));
        assert!(r.contains(b"ab\x00"));
        assert!(r.contains(b"ab\xff\xff"));
        assert!(!r.contains(b"ac"));
        assert!(!r.contains(b"aa\xff"));
    }

    #[test]
    fn prefix_of_all_ff_is_open_ended() {
        let r = ScanRange::prefix(b"\xff\xff");
        assert_eq!(r.upper, Bound::Unbounded);
        assert!(r.contains(b"\xff\xff\x01"));
    }

    #[test]
    fn database_storage_lifecycle() {
        let db = Database::new();
        db.create_storage("t0").unwrap();
        assert!(db.create_storage("t0").is_err());
        assert!(db.get_storage("t0").is_ok());
        db.drop_storage("t0").unwrap();
        assert!(db.get_storage("t0").is_err());
    }
}
