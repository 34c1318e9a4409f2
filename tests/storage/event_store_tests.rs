//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests.

use futures::{StreamExt, TryStreamExt};
use uuid::Uuid;

use actorstore::storage::EventStore;
use actorstore::{EventRecord, StorageError};

use super::{make_event, make_nested_event, Moved, ACTOR_TYPE};

async fn fetch_all<S: EventStore + ?Sized>(
    store: &S,
    actor_id: Uuid,
    since: Uuid,
) -> Vec<EventRecord> {
    store
        .fetch_events_since(ACTOR_TYPE, actor_id, since)
        .try_collect()
        .await
        .expect("fetch should succeed")
}

fn ids(events: &[EventRecord]) -> Vec<Uuid> {
    events.iter().map(|e| e.id).collect()
}

fn sequences(events: &[EventRecord]) -> Vec<u64> {
    events.iter().map(|e| e.sequence).collect()
}

// =============================================================================
// EventStore::append tests
// =============================================================================

/// Append two events, fetch from genesis: both come back in order.
pub async fn test_append_two_and_fetch<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let events = vec![make_event(actor_id, 1), make_event(actor_id, 2)];

    let stored = store
        .append(ACTOR_TYPE, &events)
        .await
        .expect("append should succeed");
    assert_eq!(sequences(&stored), vec![1, 2]);

    let fetched = fetch_all(store, actor_id, Uuid::nil()).await;
    assert_eq!(ids(&fetched), ids(&events));
    assert_eq!(sequences(&fetched), vec![1, 2]);
    assert_eq!(fetched, stored);
    assert_eq!(
        fetched[1].decode::<Moved>().expect("decode"),
        Moved { x: 2, y: -2 }
    );
}

pub async fn test_append_batches_continue_sequence<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let mut all = Vec::new();
    for batch in 0..3 {
        let events: Vec<_> = (0..4).map(|n| make_event(actor_id, batch * 4 + n)).collect();
        store
            .append(ACTOR_TYPE, &events)
            .await
            .expect("append should succeed");
        all.extend(events);
    }

    let fetched = fetch_all(store, actor_id, Uuid::nil()).await;
    assert_eq!(ids(&fetched), ids(&all), "events must come back in append order");
    assert_eq!(sequences(&fetched), (1..=12).collect::<Vec<u64>>());
    assert_eq!(
        store.last_sequence(ACTOR_TYPE, actor_id).await.expect("last_sequence"),
        12
    );
}

pub async fn test_append_ignores_caller_sequence<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let mut event = make_event(actor_id, 1);
    event.sequence = 99;

    let stored = store.append(ACTOR_TYPE, &[event]).await.expect("append");
    assert_eq!(stored[0].sequence, 1);
}

pub async fn test_append_empty_batch<S: EventStore + ?Sized>(store: &S) {
    let stored = store.append(ACTOR_TYPE, &[]).await.expect("append");
    assert!(stored.is_empty());
}

pub async fn test_append_mixed_actors<S: EventStore + ?Sized>(store: &S) {
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let events = vec![make_event(first, 1), make_event(second, 2)];

    let err = store
        .append(ACTOR_TYPE, &events)
        .await
        .expect_err("mixed batch should fail");
    assert!(
        matches!(err, StorageError::MixedActors { expected, found, .. } if expected == first && found == second),
        "expected MixedActors, got {err:?}"
    );
    assert!(fetch_all(store, first, Uuid::nil()).await.is_empty());
}

/// A failing event rolls back the whole batch.
pub async fn test_append_duplicate_id_is_atomic<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let existing = make_event(actor_id, 1);
    store
        .append(ACTOR_TYPE, &[existing.clone()])
        .await
        .expect("append");

    let mut duplicate = make_event(actor_id, 3);
    duplicate.id = existing.id;
    let err = store
        .append(ACTOR_TYPE, &[make_event(actor_id, 2), duplicate])
        .await
        .expect_err("duplicate event id should fail");
    assert!(
        matches!(err, StorageError::DuplicateKey { .. }),
        "expected DuplicateKey, got {err:?}"
    );

    let fetched = fetch_all(store, actor_id, Uuid::nil()).await;
    assert_eq!(ids(&fetched), vec![existing.id], "no partial batch may be visible");
}

pub async fn test_append_preserves_nested_payload<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let event = make_nested_event(actor_id);
    store
        .append(ACTOR_TYPE, &[event.clone(), make_event(actor_id, 1)])
        .await
        .expect("append");

    let fetched = fetch_all(store, actor_id, Uuid::nil()).await;
    assert_eq!(fetched[0].data, event.data);
    assert_eq!(fetched[0].created_by, "gamemaster");
    assert_eq!(fetched[0].created_by_id, event.created_by_id);
    assert_eq!(fetched[0].created_on, event.created_on);
    assert_eq!(fetched[1].event_type, "Moved");
}

pub async fn test_append_preserves_foreign_author<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let wizard_id = Uuid::new_v4();
    let own = make_event(actor_id, 1);
    let cast = make_event(actor_id, 2).created_by("wizard", wizard_id);
    store
        .append(ACTOR_TYPE, &[own, cast.clone()])
        .await
        .expect("append");

    let fetched = fetch_all(store, actor_id, Uuid::nil()).await;
    assert_eq!(fetched[0].created_by, ACTOR_TYPE);
    assert_eq!(fetched[0].created_by_id, actor_id);
    assert_eq!(fetched[1].id, cast.id);
    assert_eq!(fetched[1].created_by, "wizard");
    assert_eq!(fetched[1].created_by_id, wizard_id);
    assert_eq!(fetched[1].actor_id, actor_id);
}

pub async fn test_actors_have_independent_sequences<S: EventStore + ?Sized>(store: &S) {
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    store
        .append(ACTOR_TYPE, &[make_event(first, 1), make_event(first, 2)])
        .await
        .expect("append first");
    let stored = store
        .append(ACTOR_TYPE, &[make_event(second, 1)])
        .await
        .expect("append second");

    assert_eq!(stored[0].sequence, 1);
    assert_eq!(fetch_all(store, first, Uuid::nil()).await.len(), 2);
    assert_eq!(fetch_all(store, second, Uuid::nil()).await.len(), 1);
}

// =============================================================================
// EventStore::append_expecting tests
// =============================================================================

pub async fn test_append_expecting<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let stored = store
        .append_expecting(ACTOR_TYPE, &[make_event(actor_id, 1)], 0)
        .await
        .expect("expecting 0 on a new actor should succeed");
    assert_eq!(stored[0].sequence, 1);

    let stored = store
        .append_expecting(ACTOR_TYPE, &[make_event(actor_id, 2), make_event(actor_id, 3)], 1)
        .await
        .expect("expecting the current sequence should succeed");
    assert_eq!(sequences(&stored), vec![2, 3]);
}

pub async fn test_append_expecting_conflict<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    store
        .append(ACTOR_TYPE, &[make_event(actor_id, 1), make_event(actor_id, 2)])
        .await
        .expect("append");

    let err = store
        .append_expecting(ACTOR_TYPE, &[make_event(actor_id, 3)], 1)
        .await
        .expect_err("stale expectation should fail");
    assert!(
        matches!(err, StorageError::SequenceConflict { expected: 1, actual: 2, .. }),
        "expected SequenceConflict, got {err:?}"
    );
    assert_eq!(
        store.last_sequence(ACTOR_TYPE, actor_id).await.expect("last_sequence"),
        2,
        "nothing may be written on conflict"
    );
}

// =============================================================================
// EventStore::fetch_events_since tests
// =============================================================================

pub async fn test_fetch_unknown_actor<S: EventStore + ?Sized>(store: &S) {
    assert!(fetch_all(store, Uuid::new_v4(), Uuid::nil()).await.is_empty());
}

/// Resuming from the last consumed event returns only later events.
pub async fn test_fetch_since_marker<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let first: Vec<_> = (0..3).map(|n| make_event(actor_id, n)).collect();
    store.append(ACTOR_TYPE, &first).await.expect("append");

    let consumed = fetch_all(store, actor_id, Uuid::nil()).await;
    let marker = consumed.last().expect("events").id;
    assert!(fetch_all(store, actor_id, marker).await.is_empty());

    let later: Vec<_> = (3..5).map(|n| make_event(actor_id, n)).collect();
    store.append(ACTOR_TYPE, &later).await.expect("append");

    let resumed = fetch_all(store, actor_id, marker).await;
    assert_eq!(ids(&resumed), ids(&later));
    assert_eq!(sequences(&resumed), vec![4, 5]);

    let from_middle = fetch_all(store, actor_id, first[0].id).await;
    assert_eq!(sequences(&from_middle), vec![2, 3, 4, 5]);
}

/// Logs longer than one page are streamed across pages without gaps.
pub async fn test_fetch_spans_pages<S: EventStore + ?Sized>(store: &S, page_size: u32) {
    let actor_id = Uuid::new_v4();
    let total = i64::from(page_size) * 2 + 1;
    let events: Vec<_> = (0..total).map(|n| make_event(actor_id, n)).collect();
    store.append(ACTOR_TYPE, &events).await.expect("append");

    let fetched = fetch_all(store, actor_id, Uuid::nil()).await;
    assert_eq!(ids(&fetched), ids(&events));

    // Stopping part way and resuming from the last consumed id.
    let head: Vec<EventRecord> = store
        .fetch_events_since(ACTOR_TYPE, actor_id, Uuid::nil())
        .take(page_size as usize + 1)
        .try_collect()
        .await
        .expect("partial fetch");
    let tail = fetch_all(store, actor_id, head.last().expect("head").id).await;
    assert_eq!(head.len() + tail.len(), events.len());
    assert_eq!(tail[0].sequence, u64::from(page_size) + 2);
}

pub async fn test_fetch_unknown_marker<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    store
        .append(ACTOR_TYPE, &[make_event(actor_id, 1)])
        .await
        .expect("append");

    let mut stream = store.fetch_events_since(ACTOR_TYPE, actor_id, Uuid::new_v4());
    let first = stream.next().await.expect("stream should yield an error");
    assert!(
        matches!(first, Err(StorageError::NotFound { .. })),
        "expected NotFound, got {first:?}"
    );
}

/// A marker belonging to another actor is not a valid resume point.
pub async fn test_fetch_marker_of_other_actor<S: EventStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let other = Uuid::new_v4();
    store
        .append(ACTOR_TYPE, &[make_event(actor_id, 1)])
        .await
        .expect("append");
    let stored = store
        .append(ACTOR_TYPE, &[make_event(other, 1)])
        .await
        .expect("append other");

    let result: Result<Vec<EventRecord>, _> = store
        .fetch_events_since(ACTOR_TYPE, actor_id, stored[0].id)
        .try_collect()
        .await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

pub async fn test_last_sequence_of_new_actor<S: EventStore + ?Sized>(store: &S) {
    assert_eq!(
        store
            .last_sequence(ACTOR_TYPE, Uuid::new_v4())
            .await
            .expect("last_sequence"),
        0
    );
}

#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr, $page_size:expr) => {
        use $crate::storage::event_store_tests::*;

        // append tests
        test_append_two_and_fetch($store).await;
        println!("  test_append_two_and_fetch: PASSED");

        test_append_batches_continue_sequence($store).await;
        println!("  test_append_batches_continue_sequence: PASSED");

        test_append_ignores_caller_sequence($store).await;
        println!("  test_append_ignores_caller_sequence: PASSED");

        test_append_empty_batch($store).await;
        println!("  test_append_empty_batch: PASSED");

        test_append_mixed_actors($store).await;
        println!("  test_append_mixed_actors: PASSED");

        test_append_duplicate_id_is_atomic($store).await;
        println!("  test_append_duplicate_id_is_atomic: PASSED");

        test_append_preserves_nested_payload($store).await;
        println!("  test_append_preserves_nested_payload: PASSED");

        test_append_preserves_foreign_author($store).await;
        println!("  test_append_preserves_foreign_author: PASSED");

        test_actors_have_independent_sequences($store).await;
        println!("  test_actors_have_independent_sequences: PASSED");

        // append_expecting tests
        test_append_expecting($store).await;
        println!("  test_append_expecting: PASSED");

        test_append_expecting_conflict($store).await;
        println!("  test_append_expecting_conflict: PASSED");

        // fetch_events_since tests
        test_fetch_unknown_actor($store).await;
        println!("  test_fetch_unknown_actor: PASSED");

        test_fetch_since_marker($store).await;
        println!("  test_fetch_since_marker: PASSED");

        test_fetch_spans_pages($store, $page_size).await;
        println!("  test_fetch_spans_pages: PASSED");

        test_fetch_unknown_marker($store).await;
        println!("  test_fetch_unknown_marker: PASSED");

        test_fetch_marker_of_other_actor($store).await;
        println!("  test_fetch_marker_of_other_actor: PASSED");

        test_last_sequence_of_new_actor($store).await;
        println!("  test_last_sequence_of_new_actor: PASSED");
    };
}
