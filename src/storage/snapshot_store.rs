//! SnapshotStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::records::{ActorId, Snapshot};

/// Interface for snapshot persistence.
///
/// Snapshots bound replay: an actor is rebuilt from its latest snapshot plus
/// the events after `last_event_id`. Snapshots are never deleted.
///
/// Implementations:
/// - `RecordStore<E, Snapshot>`: SQL storage (SQLite, PostgreSQL)
/// - `MemoryStorage`: in-memory storage for tests
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot. A duplicate snapshot id is `DuplicateKey`.
    async fn add(&self, actor_type: &str, snapshot: &Snapshot) -> Result<()>;

    /// The snapshot with the highest version.
    ///
    /// When several share that version the most recently added one wins.
    /// Returns `None` if the actor has no snapshot.
    async fn fetch_latest(&self, actor_type: &str, actor_id: ActorId) -> Result<Option<Snapshot>>;
}
