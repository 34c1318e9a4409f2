//! Event store over the record-store engine.
//!
//! Sequences are assigned by the insert statement itself
//! (`COALESCE(MAX(sequence), 0) + 1` over the actor's rows), inside a
//! transaction that holds the actor's write lock: the database write lock
//! on SQLite, where the insert is the transaction's first statement, and a
//! transaction-scoped advisory lock on PostgreSQL.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use sea_query::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::engine::{RecordEngine, RecordTx};
use super::record_store::RecordStore;
use super::rows::{int_value, uuid_value, LastSequence, SequenceNumber};
use crate::records::{ActorId, EventRecord};
use crate::storage::error::{OpContext, Operation, Result, StorageError};
use crate::storage::event_store::{batch_actor, EventStream};
use crate::storage::schema::Column;
use crate::storage::templates::QueryKey;
use crate::storage::EventStore;

/// Where the next page of a fetch starts.
enum Cursor {
    Start,
    After(u64),
    Done,
}

impl<E: RecordEngine> RecordStore<E, EventRecord> {
    async fn write_batch(
        &self,
        actor_type: &str,
        events: &[EventRecord],
        expected: Option<u64>,
    ) -> Result<Vec<EventRecord>> {
        let mut context = OpContext::new(Operation::AppendEvents, actor_type);
        let templates = self.templates(&context)?;
        let Some(actor_id) = batch_actor(&context, events)? else {
            return Ok(Vec::new());
        };
        context = context.with_subject(actor_id);

        let mut tx = self.engine().begin(&context).await?;
        tx.lock(&Self::lock_key(templates, actor_id)).await?;
        for event in events {
            Self::insert_in(&mut tx, templates, event, &context).await?;
        }
        let last: Option<LastSequence> = tx
            .fetch_optional(
                templates.get(QueryKey::SelectLastSequence),
                vec![uuid_value(actor_id)],
            )
            .await?;
        let last = last.map_or(0, |last| last.0);

        let count = events.len() as u64;
        let previous = last.saturating_sub(count);
        if let Some(expected) = expected {
            if previous != expected {
                warn!(expected, actual = previous, "Sequence conflict, rolling back");
                return Err(StorageError::SequenceConflict {
                    context,
                    expected,
                    actual: previous,
                });
            }
        }
        tx.commit().await?;

        debug!(count, first = previous + 1, last, "Appended events");
        Ok(events
            .iter()
            .zip(previous + 1..)
            .map(|(event, sequence)| EventRecord {
                sequence,
                ..event.clone()
            })
            .collect())
    }

    /// One page of a fetch, and where the next one starts.
    async fn fetch_page(
        &self,
        context: &OpContext,
        actor_id: ActorId,
        since: Uuid,
        cursor: Cursor,
    ) -> Result<Option<(Vec<EventRecord>, Cursor)>> {
        let templates = self.templates(context)?;
        let after = match cursor {
            Cursor::Done => return Ok(None),
            Cursor::After(sequence) => sequence,
            Cursor::Start if since.is_nil() => 0,
            Cursor::Start => {
                let marker: Option<SequenceNumber> = self
                    .fetch_one(
                        context,
                        templates,
                        QueryKey::SelectEventMarker,
                        vec![uuid_value(actor_id), uuid_value(since)],
                    )
                    .await?;
                marker.ok_or_else(|| context.not_found())?.0
            }
        };

        let page_size = self.page_size();
        let params = vec![
            uuid_value(actor_id),
            int_value(Column::Sequence, after).map_err(|e| e.into_storage(context))?,
            Value::from(i64::from(page_size)),
        ];
        let page: Vec<EventRecord> = self
            .engine()
            .fetch_all(context, templates.get(QueryKey::SelectEventsAfter), params)
            .await?;
        debug!(after, fetched = page.len(), "Fetched event page");

        let next = match page.last() {
            Some(last) if page.len() as u64 == u64::from(page_size) => Cursor::After(last.sequence),
            Some(_) => Cursor::Done,
            None => return Ok(None),
        };
        Ok(Some((page, next)))
    }
}

#[async_trait]
impl<E: RecordEngine> EventStore for RecordStore<E, EventRecord> {
    #[tracing::instrument(name = "event.append", skip_all, fields(%actor_type, count = events.len()))]
    async fn append(&self, actor_type: &str, events: &[EventRecord]) -> Result<Vec<EventRecord>> {
        self.write_batch(actor_type, events, None).await
    }

    #[tracing::instrument(name = "event.append_expecting", skip_all, fields(%actor_type, count = events.len(), expected))]
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

        stream::try_unfold(Cursor::Start, move |cursor| {
            let context = context.clone();
            async move {
                self.fetch_page(&context, actor_id, since, cursor).await
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StorageError>)))
        .try_flatten()
        .boxed()
    }

    #[tracing::instrument(name = "event.last_sequence", skip_all, fields(%actor_type, %actor_id))]
    async fn last_sequence(&self, actor_type: &str, actor_id: ActorId) -> Result<u64> {
        let context = OpContext::new(Operation::LastSequence, actor_type).with_subject(actor_id);
        let templates = self.templates(&context)?;
        let last: Option<LastSequence> = self
            .fetch_one(
                &context,
                templates,
                QueryKey::SelectLastSequence,
                vec![uuid_value(actor_id)],
            )
            .await?;
        Ok(last.map_or(0, |last| last.0))
    }
}
