//! Transaction and strand handles.
//!
//! Storage objects are shared read-only across threads; a transaction is not.
//! Threads that must touch the same transaction go through a [`Strand`],
//! which serializes operations on the shared handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Result, StorageError};

/// Identifier of a transaction within the process.
pub type TransactionId = u64;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct TransactionState {
    write_preserves: Vec<String>,
}

/// A transaction handle.
///
/// The in-memory reference engine applies writes directly; the handle tracks
/// lifecycle so the executor observes the same commit/abort contract a real
/// engine imposes.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    readonly: bool,
    long: bool,
    active: AtomicBool,
    state: Mutex<TransactionState>,
}

impl Transaction {
    /// Begins a transaction.
    pub fn begin(readonly: bool, long: bool, write_preserves: Vec<String>) -> Arc<Self> {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, readonly, long, "transaction begin");
        Arc::new(Self {
            id,
            readonly,
            long,
            active: AtomicBool::new(true),
            state: Mutex::new(TransactionState { write_preserves }),
        })
    }

    /// The transaction id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// True for read-only transactions.
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// True for long (batch) transactions.
    pub fn is_long(&self) -> bool {
        self.long
    }

    /// Storage names this long transaction preserves for writing.
    pub fn write_preserves(&self) -> Vec<String> {
        self.state.lock().expect("poisoned").write_preserves.clone()
    }

    /// True until commit or rollback.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Commits the transaction.
    pub fn commit(&self) -> Result<()> {
        self.finish("commit")
    }

    /// Rolls the transaction back.
    pub fn rollback(&self) -> Result<()> {
        self.finish("rollback")
    }

    fn finish(&self, op: &str) -> Result<()> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Err(StorageError::InvalidState {
                message: format!("{op} on finished transaction {}", self.id),
            });
        }
        tracing::debug!(id = self.id, op, "transaction finished");
        Ok(())
    }

    /// Fails unless the transaction is still active and writable.
    pub fn check_writable(&self) -> Result<()> {
        if !self.is_active() {
            return Err(StorageError::Aborted);
        }
        if self.readonly {
            return Err(StorageError::InvalidState {
                message: format!("write in readonly transaction {}", self.id),
            });
        }
        Ok(())
    }
}

/// Per-thread serialized view over a shared transaction.
#[derive(Debug, Clone)]
pub struct Strand {
    transaction: Arc<Transaction>,
    serial: Arc<Mutex<()>>,
}

impl Strand {
    /// Wraps a transaction into a strand.
    pub fn new(transaction: Arc<Transaction>) -> Self {
        Self { transaction, serial: Arc::new(Mutex::new(())) }
    }

    /// The underlying transaction.
    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }

    /// Runs `f` while holding the strand's serialization lock.
    pub fn with_serialized<T>(&self, f: impl FnOnce(&Transaction) -> T) -> T {
        let _guard: MutexGuard<'_, ()> = self.serial.lock().expect("poisoned");
        f(&self.transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_is_single_shot() {
        let tx = Transaction::begin(false, false, vec![]);
        assert!(tx.is_active());
        tx.commit().unwrap();
        assert!(!tx.is_active());
        assert!(tx.commit().is_err());
        assert!(tx.rollback().is_err());
    }

    #[test]
    fn readonly_rejects_writes() {
        let tx = Transaction::begin(true, false, vec![]);
        assert!(matches!(tx.check_writable(), Err(StorageError::InvalidState { .. })));
    }

    #[test]
    fn strand_serializes_access() {
        let tx = Transaction::begin(false, true, vec!["t0".into()]);
        let strand = Strand::new(tx);
        let id = strand.with_serialized(|tx| tx.id());
        assert!(id > 0);
        assert_eq!(strand.transaction().write_preserves(), vec!["t0".to_string()]);
    }
}
