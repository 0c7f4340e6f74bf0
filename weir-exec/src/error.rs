//! Engine status codes and the executor error type.

use weir_storage::StorageError;
use weir_types::ErrorKind;

/// Status code space used at API boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum Status {
    /// Success.
    Ok,
    /// Storage or file I/O failed.
    IoError,
    /// A scalar or aggregate expression failed to evaluate.
    ExpressionEvaluationFailure,
    /// The request or task was aborted (cancellation or upstream failure).
    Aborted,
    /// A referenced object does not exist.
    NotFound,
    /// A request argument is malformed.
    InvalidArgument,
    /// The request uses an unsupported feature.
    Unsupported,
    /// Unexpected internal fault.
    Internal,
}

impl Status {
    /// Exit code observable from the command-line front-ends.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::IoError => 2,
            Self::ExpressionEvaluationFailure => 3,
            Self::Aborted => 4,
            Self::NotFound => 5,
            Self::InvalidArgument => 6,
            Self::Unsupported => 7,
            Self::Internal => -1,
        }
    }
}

/// Error carried across executor boundaries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{status:?}: {message}")]
pub struct ExecError {
    /// The status code.
    pub status: Status,
    /// Human-readable detail.
    pub message: String,
}

impl ExecError {
    /// Creates an error with the given status and message.
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// An `Aborted` error.
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Status::Aborted, message)
    }

    /// An `Unsupported` error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(Status::Unsupported, message)
    }

    /// An `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Status::InvalidArgument, message)
    }

    /// A `NotFound` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Status::NotFound, message)
    }
}

impl From<StorageError> for ExecError {
    fn from(e: StorageError) -> Self {
        let status = match &e {
            StorageError::NotFound { .. } => Status::NotFound,
            StorageError::AlreadyExists { .. } => Status::InvalidArgument,
            StorageError::Io { .. } => Status::IoError,
            StorageError::Aborted => Status::Aborted,
            StorageError::InvalidState { .. } => Status::InvalidArgument,
        };
        Self::new(status, e.to_string())
    }
}

/// Maps an evaluation error kind to the boundary status.
pub fn status_for_error_kind(kind: ErrorKind) -> Status {
    match kind {
        ErrorKind::LobFileIoError => Status::IoError,
        ErrorKind::Unsupported => Status::Unsupported,
        _ => Status::ExpressionEvaluationFailure,
    }
}

/// Result alias for executor operations.
pub type Result<T> = core::result::Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(Status::Ok.exit_code(), 0);
        assert_eq!(Status::Internal.exit_code(), -1);
        assert_ne!(Status::Aborted.exit_code(), 0);
    }

    #[test]
    fn storage_error_mapping() {
        let e: ExecError = StorageError::Aborted.into();
        assert_eq!(e.status, Status::Aborted);
    }
}
