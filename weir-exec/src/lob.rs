//! LOB session relay.
//!
//! The relay is a process-wide singleton brought up and torn down by the boot
//! sequence. It owns the mapping from LOB ids to their backing bytes: files
//! registered out of caller-provided paths, and values generated by casts
//! during evaluation. Evaluation materializes a `provided` reference into a
//! `datastore` one the first time the value is touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use weir_types::{LobId, LobProvider, LobReference};

use crate::error::{ExecError, Result, Status};

#[derive(Debug)]
enum LobEntry {
    File(PathBuf),
    Generated(Vec<u8>),
}

/// Process-wide LOB registry.
#[derive(Debug, Default)]
pub struct RelayService {
    entries: Mutex<HashMap<LobId, LobEntry>>,
    next_id: AtomicU64,
}

static RELAY: OnceLock<RelayService> = OnceLock::new();

/// Initializes the relay. Idempotent; called by the boot sequence.
pub fn init() -> &'static RelayService {
    RELAY.get_or_init(RelayService::default)
}

/// The relay instance.
pub fn relay() -> &'static RelayService {
    init()
}

/// Drops all registered sessions. Called by the shutdown sequence; the
/// singleton itself stays allocated.
pub fn teardown() {
    if let Some(service) = RELAY.get() {
        service.entries.lock().expect("poisoned").clear();
    }
}

impl RelayService {
    fn allocate_id(&self) -> LobId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Registers a caller-provided file, returning a datastore reference.
    pub fn assign_lob_id(&self, path: &Path) -> Result<LobReference> {
        if !path.exists() {
            return Err(ExecError::new(
                Status::IoError,
                format!("lob file not found: {}", path.display()),
            ));
        }
        let id = self.allocate_id();
        self.entries
            .lock()
            .expect("poisoned")
            .insert(id, LobEntry::File(path.to_path_buf()));
        tracing::trace!(id, path = %path.display(), "lob registered");
        Ok(LobReference::datastore(id))
    }

    /// Registers bytes generated mid-evaluation, returning their reference.
    pub fn register_generated(&self, bytes: Vec<u8>) -> LobReference {
        let id = self.allocate_id();
        self.entries.lock().expect("poisoned").insert(id, LobEntry::Generated(bytes));
        LobReference::generated(id)
    }

    /// Resolves the file path behind a datastore reference.
    pub fn find_path_by_lob_id(&self, id: LobId) -> Result<PathBuf> {
        match self.entries.lock().expect("poisoned").get(&id) {
            Some(LobEntry::File(path)) => Ok(path.clone()),
            Some(LobEntry::Generated(_)) => Err(ExecError::invalid_argument(format!(
                "lob {id} is generated and has no file path"
            ))),
            None => Err(ExecError::not_found(format!("lob reference invalid: {id}"))),
        }
    }

    /// Reads the bytes behind any registered reference.
    pub fn read_lob(&self, reference: &LobReference) -> Result<Vec<u8>> {
        match &reference.provider {
            LobProvider::Provided(path) => read_lob_file(path),
            LobProvider::Datastore | LobProvider::Generated => {
                let entries = self.entries.lock().expect("poisoned");
                match entries.get(&reference.id) {
                    Some(LobEntry::File(path)) => {
                        let path = path.clone();
                        drop(entries);
                        read_lob_file(&path)
                    }
                    Some(LobEntry::Generated(bytes)) => Ok(bytes.clone()),
                    None => Err(ExecError::not_found(format!(
                        "lob reference invalid: {}",
                        reference.id
                    ))),
                }
            }
        }
    }
}

/// Reads a LOB file from disk.
pub fn read_lob_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ExecError::new(Status::IoError, format!("lob file io error: {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_round_trip() {
        let service = relay();
        let reference = service.register_generated(b"payload".to_vec());
        assert!(matches!(reference.provider, LobProvider::Generated));
        assert_eq!(service.read_lob(&reference).unwrap(), b"payload");
        assert!(service.find_path_by_lob_id(reference.id).is_err());
    }

    #[test]
    fn unknown_reference_is_invalid() {
        let service = relay();
        let missing = LobReference::datastore(u64::MAX);
        assert!(service.read_lob(&missing).is_err());
    }

    #[test]
    fn assign_missing_file_is_io_error() {
        let service = relay();
        let err = service.assign_lob_id(Path::new("/nonexistent/weir-lob")).unwrap_err();
        assert_eq!(err.status, Status::IoError);
    }
}
