//! EventStore trait definition.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use super::error::{OpContext, StorageError};
use super::Result;
use crate::records::{ActorId, EventRecord};

/// Lazily paged stream of events, oldest first.
pub type EventStream<'a> = BoxStream<'a, Result<EventRecord>>;

/// Interface for event persistence.
///
/// Each actor owns an append-only log. Events are ordered by a per-actor
/// `sequence` assigned on append, starting at 1, with no gaps.
///
/// Implementations:
/// - `RecordStore<E, EventRecord>`: SQL storage (SQLite, PostgreSQL)
/// - `MemoryStorage`: in-memory storage for tests
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch of events for one actor.
    ///
    /// The batch commits atomically and in order. Every event must carry the
    /// same `actor_id` (otherwise `MixedActors`); caller-supplied `sequence`
    /// values are ignored. Returns the stored events with their sequences.
    /// An empty batch is a no-op.
    async fn append(&self, actor_type: &str, events: &[EventRecord]) -> Result<Vec<EventRecord>>;

    /// Append only if the actor's last sequence is still `expected`.
    ///
    /// Fails with `SequenceConflict` and writes nothing otherwise.
    async fn append_expecting(
        &self,
        actor_type: &str,
        events: &[EventRecord],
        expected: u64,
    ) -> Result<Vec<EventRecord>>;

    /// Events of `actor_id` strictly after the event `since`, oldest first.
    ///
    /// A nil `since` starts at genesis. The stream fetches one page at a
    /// time as it is polled; re-invoking with the id of the last consumed
    /// event resumes where it stopped. A `since` that is not an event of
    /// this actor yields `NotFound` as the first item.
    fn fetch_events_since<'a>(
        &'a self,
        actor_type: &'a str,
        actor_id: ActorId,
        since: Uuid,
    ) -> EventStream<'a>;

    /// Highest sequence of the actor, 0 when it has no events.
    async fn last_sequence(&self, actor_type: &str, actor_id: ActorId) -> Result<u64>;
}

/// Check that every event of a batch belongs to the same actor.
pub(crate) fn batch_actor(context: &OpContext, events: &[EventRecord]) -> Result<Option<ActorId>> {
    let Some(first) = events.first() else {
        return Ok(None);
    };
    if let Some(other) = events.iter().find(|e| e.actor_id != first.actor_id) {
        return Err(StorageError::MixedActors {
            context: context.clone(),
            expected: first.actor_id,
            found: other.actor_id,
        });
    }
    Ok(Some(first.actor_id))
}
