//! In-memory reference storage.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use crate::{KeyValueStore, KvsIterator, Result, ScanRange};

/// `BTreeMap`-backed ordered storage.
///
/// Scans snapshot the matching range eagerly, so an open iterator never
/// observes concurrent writes. That is a stronger guarantee than the storage
/// contract requires, and keeps iteration free of lock juggling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().expect("poisoned").len()
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().expect("poisoned").get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .write()
            .expect("poisoned")
            .insert(key.to_vec(), value.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.write().expect("poisoned").remove(key))
    }

    fn scan(&self, range: ScanRange) -> Result<Box<dyn KvsIterator + Send>> {
        let entries = self.entries.read().expect("poisoned");
        let lower: Bound<Vec<u8>> = range.lower;
        let upper: Bound<Vec<u8>> = range.upper;
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = entries
            .range((lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(MemoryIterator { entries: snapshot.into_iter() }))
    }
}

/// Iterator over a snapshotted scan range.
pub struct MemoryIterator {
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl KvsIterator for MemoryIterator {
    fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self.entries.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.put(b"k1", b"v1").unwrap(), None);
        assert_eq!(store.put(b"k1", b"v2").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.remove(b"k1").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(store.get(b"k1").unwrap(), None);
    }

    #[test]
    fn scan_respects_bounds() {
        let store = MemoryStore::new();
        for k in [b"a", b"b", b"c", b"d"] {
            store.put(k, b"v").unwrap();
        }
        let range = ScanRange {
            lower: Bound::Excluded(b"a".to_vec()),
            upper: Bound::Included(b"c".to_vec()),
        };
        let mut iter = store.scan(range).unwrap();
        let mut keys = Vec::new();
        while let Some((k, _)) = iter.next_entry().unwrap() {
            keys.push(k);
        }
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn scan_is_key_ordered() {
        let store = MemoryStore::new();
        store.put(b"z", b"").unwrap();
        store.put(b"a", b"").unwrap();
        store.put(b"m", b"").unwrap();
        let mut iter = store.scan(ScanRange::full()).unwrap();
        let mut prev: Option<Vec<u8>> = None;
        while let Some((k, _)) = iter.next_entry().unwrap() {
            if let Some(p) = &prev {
                assert!(p < &k);
            }
            prev = Some(k);
        }
    }
}
