//! Exchanges: the data plane between process steps.
//!
//! A *group* (shuffle) exchange partitions records by key hash, sorts each
//! partition by key, and serves key-merged groups to downstream tasks. A
//! *forward* exchange passes records through unordered; *broadcast* clones
//! every record to all consumers.

pub mod forward;
pub mod group;

pub use forward::{BroadcastExchange, ForwardExchange};
pub use group::{GroupExchange, GroupShuffleInfo, InputPartition, ShuffleGroupReader};

/// Data-transfer flavor of an exchange step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Partitioned shuffle grouped by key.
    Shuffle,
    /// Pass-through to a single consumer.
    Forward,
    /// Clone to every consumer.
    Broadcast,
}
