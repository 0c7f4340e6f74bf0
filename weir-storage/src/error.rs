//! Storage error variants.

/// Errors surfaced by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The named storage does not exist.
    #[error("storage not found: {name}")]
    NotFound {
        /// The requested storage name.
        name: String,
    },
    /// A storage with the name already exists.
    #[error("storage already exists: {name}")]
    AlreadyExists {
        /// The conflicting storage name.
        name: String,
    },
    /// The underlying engine reported an I/O failure.
    #[error("storage io error: {message}")]
    Io {
        /// Engine-provided detail.
        message: String,
    },
    /// The transaction was aborted and its handles are no longer usable.
    #[error("transaction aborted")]
    Aborted,
    /// The operation is not valid in the current transaction state.
    #[error("invalid transaction state: {message}")]
    InvalidState {
        /// What was attempted.
        message: String,
    },
}
