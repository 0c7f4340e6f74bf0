//! Large-object references.

use std::path::PathBuf;

/// Identifier assigned to a LOB registered with the datastore relay.
pub type LobId = u64;

/// Where the bytes behind a LOB reference live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LobProvider {
    /// A caller-side file that has not been registered yet. Evaluation
    /// materializes it into the datastore on first touch.
    Provided(PathBuf),
    /// Registered with the transaction's LOB session; resolve via the relay.
    Datastore,
    /// Produced by a cast during evaluation; bytes are held by the evaluator
    /// context until the statement completes.
    Generated,
}

/// A blob/clob value: an id plus the provider that owns the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LobReference {
    /// Object id; meaningful for `Datastore` and `Generated` providers.
    pub id: LobId,
    /// Owner of the referenced bytes.
    pub provider: LobProvider,
}

impl LobReference {
    /// A reference to a caller-provided file.
    pub fn provided(path: impl Into<PathBuf>) -> Self {
        Self { id: 0, provider: LobProvider::Provided(path.into()) }
    }

    /// A reference resolved through the datastore relay.
    pub const fn datastore(id: LobId) -> Self {
        Self { id, provider: LobProvider::Datastore }
    }

    /// A reference generated mid-evaluation.
    pub const fn generated(id: LobId) -> Self {
        Self { id, provider: LobProvider::Generated }
    }

    /// True when the reference still points at a caller-side file.
    pub const fn is_provided(&self) -> bool {
        matches!(self.provider, LobProvider::Provided(_))
    }
}
