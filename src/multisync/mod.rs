//! Multi-sync: pull-based replication of repository metadata between hub
//! instances, keyed by a monotonically increasing version cursor.

mod client;
mod replicator;
mod types;

pub use client::{HttpSyncPeer, SyncPeer};
pub use replicator::{MultiSyncComponent, MAX_PAGE_LIMIT};
pub use types::{PeerCommit, PeerFile, PeerRepo, PeerResponse, PeerTag, PeerUser, SyncVersion, SyncVersionPage};
