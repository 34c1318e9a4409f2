//! In-memory storage.
//!
//! Implements all four store traits behind tokio `RwLock`s. Nothing is
//! persisted; intended for tests and for runtimes that do not need
//! durability. Accepts any valid actor type without registration.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{OpContext, Operation};
use super::event_store::{batch_actor, EventStream};
use super::schema::ActorType;
use super::{
    CommandStore, EventStore, IdMapStore, Result, SnapshotStore, StorageError, DEFAULT_PAGE_SIZE,
};
use crate::records::{ActorId, CommandRecord, EventRecord, Handled, IdentifierSet, Snapshot};

type ActorKey = (ActorType, ActorId);

#[derive(Default)]
struct EventLog {
    streams: HashMap<ActorKey, Vec<EventRecord>>,
    ids: HashSet<(ActorType, Uuid)>,
}

#[derive(Default)]
struct SnapshotLog {
    /// Per actor, in insertion order.
    snapshots: HashMap<ActorKey, Vec<Snapshot>>,
    ids: HashSet<(ActorType, Uuid)>,
}

/// In-memory implementation of every store trait.
pub struct MemoryStorage {
    id_map: RwLock<HashMap<(ActorType, IdentifierSet), ActorId>>,
    commands: RwLock<HashMap<(ActorType, Uuid), CommandRecord>>,
    events: RwLock<EventLog>,
    snapshots: RwLock<SnapshotLog>,
    page_size: u32,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            id_map: RwLock::default(),
            commands: RwLock::default(),
            events: RwLock::default(),
            snapshots: RwLock::default(),
            page_size: page_size.max(1),
        }
    }

    /// Events after `after`, at most one page.
    async fn page(&self, key: &ActorKey, after: u64) -> Vec<EventRecord> {
        let log = self.events.read().await;
        let Some(events) = log.streams.get(key) else {
            return Vec::new();
        };
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(events.len());
        let end = start.saturating_add(self.page_size as usize).min(events.len());
        events[start..end].to_vec()
    }
}

#[async_trait]
impl IdMapStore for MemoryStorage {
    async fn resolve(
        &self,
        actor_type: &str,
        identifiers: &IdentifierSet,
    ) -> Result<Option<ActorId>> {
        let actor_type = OpContext::new(Operation::Resolve, actor_type).parse_actor_type()?;
        let map = self.id_map.read().await;
        Ok(map.get(&(actor_type, identifiers.clone())).copied())
    }

    async fn register(
        &self,
        actor_type: &str,
        identifiers: &IdentifierSet,
        actor_id: ActorId,
    ) -> Result<()> {
        let context = OpContext::new(Operation::Register, actor_type).with_subject(identifiers);
        let actor_type = context.parse_actor_type()?;
        let mut map = self.id_map.write().await;
        match map.get(&(actor_type.clone(), identifiers.clone())) {
            Some(existing) if *existing == actor_id => Ok(()),
            Some(existing) => {
                warn!(%identifiers, bound_to = %existing, "Identifiers bound to another actor");
                Err(context.duplicate())
            }
            None => {
                map.insert((actor_type, identifiers.clone()), actor_id);
                debug!(%identifiers, %actor_id, "Registered identifiers");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl CommandStore for MemoryStorage {
    async fn record(&self, actor_type: &str, command: &CommandRecord) -> Result<()> {
        let context = OpContext::new(Operation::RecordCommand, actor_type).with_subject(command.id);
        let actor_type = context.parse_actor_type()?;
        let mut commands = self.commands.write().await;
        let key = (actor_type, command.id);
        if commands.contains_key(&key) {
            return Err(context.duplicate());
        }
        commands.insert(key, command.clone());
        Ok(())
    }

    async fn fetch(&self, actor_type: &str, id: Uuid) -> Result<Option<CommandRecord>> {
        let actor_type = OpContext::new(Operation::FetchCommand, actor_type).parse_actor_type()?;
        let commands = self.commands.read().await;
        Ok(commands.get(&(actor_type, id)).cloned())
    }

    async fn mark_handled(&self, actor_type: &str, id: Uuid, handled: Handled) -> Result<()> {
        let context = OpContext::new(Operation::MarkHandled, actor_type).with_subject(id);
        let actor_type = context.parse_actor_type()?;
        let mut commands = self.commands.write().await;
        let command = commands
            .get_mut(&(actor_type, id))
            .ok_or_else(|| context.not_found())?;
        match command.handled {
            None => {
                command.handled = Some(handled);
                Ok(())
            }
            Some(stored) if stored == handled => Ok(()),
            Some(_) => Err(StorageError::AlreadyHandled { context }),
        }
    }
}

impl MemoryStorage {
    async fn write_batch(
        &self,
        actor_type: &str,
        events: &[EventRecord],
        expected: Option<u64>,
    ) -> Result<Vec<EventRecord>> {
        let mut context = OpContext::new(Operation::AppendEvents, actor_type);
        let actor_type = context.parse_actor_type()?;
        let Some(actor_id) = batch_actor(&context, events)? else {
            return Ok(Vec::new());
        };
        context = context.with_subject(actor_id);

        let mut log = self.events.write().await;
        let mut batch_ids = HashSet::new();
        for event in events {
            if log.ids.contains(&(actor_type.clone(), event.id)) || !batch_ids.insert(event.id) {
                return Err(context.duplicate());
            }
        }

        let key = (actor_type.clone(), actor_id);
        let previous = log.streams.get(&key).map_or(0, |s| s.len() as u64);
        if let Some(expected) = expected {
            if previous != expected {
                return Err(StorageError::SequenceConflict {
                    context,
                    expected,
                    actual: previous,
                });
            }
        }

        let stored: Vec<EventRecord> = events
            .iter()
            .zip(previous + 1..)
            .map(|(event, sequence)| EventRecord {
                sequence,
                ..event.clone()
            })
            .collect();
        log.ids
            .extend(stored.iter().map(|e| (actor_type.clone(), e.id)));
        log.streams.entry(key).or_default().extend(stored.iter().cloned());
        Ok(stored)
    }
}

#[async_trait]
impl EventStore for MemoryStorage {
    async fn append(&self, actor_type: &str, events: &[EventRecord]) -> Result<Vec<EventRecord>> {
        self.write_batch(actor_type, events, None).await
    }

    async fn append_expecting(
        &self,
        actor_type: &str,
        events: &[EventRecord],
        expected: u64,
    ) -> Result<Vec<EventRecord>> {
        self.write_batch(actor_type, events, Some(expected)).await
    }

    fn fetch_events_since<'a>(
        &'a self,
        actor_type: &'a str,
        actor_id: ActorId,
        since: Uuid,
    ) -> EventStream<'a> {
        let context = OpContext::new(Operation::FetchEvents, actor_type)
            .with_subject(format!("{} after {}", actor_id, since));

        stream::try_unfold(None, move |after: Option<u64>| {
            let context = context.clone();
            async move {
                let key = (context.parse_actor_type()?, actor_id);
                let after = match after {
                    Some(after) => after,
                    None if since.is_nil() => 0,
                    None => {
                        let log = self.events.read().await;
                        log.streams
                            .get(&key)
                            .and_then(|events| events.iter().find(|e| e.id == since))
                            .map(|e| e.sequence)
                            .ok_or_else(|| context.not_found())?
                    }
                };
                let page = self.page(&key, after).await;
                let next = page.last().map(|last| last.sequence);
                Ok::<_, StorageError>(next.map(|next| (page, Some(next))))
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StorageError>)))
        .try_flatten()
        .boxed()
    }

    async fn last_sequence(&self, actor_type: &str, actor_id: ActorId) -> Result<u64> {
        let context = OpContext::new(Operation::LastSequence, actor_type);
        let key = (context.parse_actor_type()?, actor_id);
        let log = self.events.read().await;
        Ok(log.streams.get(&key).map_or(0, |s| s.len() as u64))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStorage {
    async fn add(&self, actor_type: &str, snapshot: &Snapshot) -> Result<()> {
        let context =
            OpContext::new(Operation::AddSnapshot, actor_type).with_subject(snapshot.actor_id);
        let actor_type = context.parse_actor_type()?;
        let mut log = self.snapshots.write().await;
        if !log.ids.insert((actor_type.clone(), snapshot.id)) {
            return Err(context.duplicate());
        }
        log.snapshots
            .entry((actor_type, snapshot.actor_id))
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn fetch_latest(&self, actor_type: &str, actor_id: ActorId) -> Result<Option<Snapshot>> {
        let context = OpContext::new(Operation::FetchSnapshot, actor_type);
        let key = (context.parse_actor_type()?, actor_id);
        let log = self.snapshots.read().await;
        // max_by_key keeps the last of equal maxima, so the latest insert wins ties.
        Ok(log
            .snapshots
            .get(&key)
            .and_then(|snapshots| snapshots.iter().max_by_key(|s| s.version))
            .cloned())
    }
}
