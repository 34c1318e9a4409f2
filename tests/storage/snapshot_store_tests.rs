//! SnapshotStore interface tests.
//!
//! These tests verify the contract of the SnapshotStore trait.
//! Each storage implementation should run these tests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use actorstore::storage::SnapshotStore;
use actorstore::{Payload, Snapshot, StorageError};

use super::command_store_tests::make_command;
use super::{make_event, ACTOR_TYPE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
    pub moves: u64,
}

impl Payload for Position {
    const TYPE: &'static str = "Position";
}

fn make_snapshot(actor_id: Uuid, version: u64, events_applied: u64) -> Snapshot {
    let mut snapshot = Snapshot::new(
        Uuid::new_v4(),
        actor_id,
        version,
        &Position {
            x: events_applied as i64,
            y: 0,
            moves: events_applied,
        },
    )
    .expect("encode snapshot");
    snapshot.events_applied = events_applied;
    snapshot
}

// =============================================================================
// SnapshotStore::fetch_latest tests
// =============================================================================

pub async fn test_fetch_latest_none<S: SnapshotStore + ?Sized>(store: &S) {
    let latest = store
        .fetch_latest(ACTOR_TYPE, Uuid::new_v4())
        .await
        .expect("fetch should succeed");
    assert!(latest.is_none());
}

pub async fn test_fetch_latest_highest_version<S: SnapshotStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    for version in [2, 5, 3] {
        store
            .add(ACTOR_TYPE, &make_snapshot(actor_id, version, version * 10))
            .await
            .expect("add should succeed");
    }

    let latest = store
        .fetch_latest(ACTOR_TYPE, actor_id)
        .await
        .expect("fetch should succeed")
        .expect("snapshot should exist");
    assert_eq!(latest.version, 5);
    assert_eq!(latest.events_applied, 50);
    assert_eq!(
        latest.decode::<Position>().expect("decode"),
        Position {
            x: 50,
            y: 0,
            moves: 50
        }
    );
}

/// Among snapshots of equal version, the most recently added wins.
pub async fn test_fetch_latest_equal_versions<S: SnapshotStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let first = make_snapshot(actor_id, 0, 1);
    let second = make_snapshot(actor_id, 0, 2);
    store.add(ACTOR_TYPE, &first).await.expect("add first");
    store.add(ACTOR_TYPE, &second).await.expect("add second");

    let latest = store
        .fetch_latest(ACTOR_TYPE, actor_id)
        .await
        .expect("fetch should succeed")
        .expect("snapshot should exist");
    assert_eq!(latest.id, second.id);
    assert_eq!(latest.events_applied, 2);
}

pub async fn test_snapshots_scoped_by_actor<S: SnapshotStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let other = Uuid::new_v4();
    store
        .add(ACTOR_TYPE, &make_snapshot(other, 9, 9))
        .await
        .expect("add other");
    store
        .add(ACTOR_TYPE, &make_snapshot(actor_id, 1, 1))
        .await
        .expect("add");

    let latest = store
        .fetch_latest(ACTOR_TYPE, actor_id)
        .await
        .expect("fetch should succeed")
        .expect("snapshot should exist");
    assert_eq!(latest.actor_id, actor_id);
    assert_eq!(latest.version, 1);
}

// =============================================================================
// SnapshotStore::add tests
// =============================================================================

pub async fn test_add_duplicate_id<S: SnapshotStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let snapshot = make_snapshot(actor_id, 1, 1);
    store.add(ACTOR_TYPE, &snapshot).await.expect("add");

    let mut again = make_snapshot(actor_id, 2, 2);
    again.id = snapshot.id;
    let err = store
        .add(ACTOR_TYPE, &again)
        .await
        .expect_err("duplicate snapshot id should fail");
    assert!(
        matches!(err, StorageError::DuplicateKey { .. }),
        "expected DuplicateKey, got {err:?}"
    );
}

/// Every field survives storage, including the optional timestamps.
pub async fn test_add_preserves_fields<S: SnapshotStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let event = make_event(actor_id, 7);
    let command = make_command("Gandalf the White");
    let snapshot = make_snapshot(actor_id, 4, 0)
        .after_event(&event, 7)
        .after_command(&command);
    store.add(ACTOR_TYPE, &snapshot).await.expect("add");

    let latest = store
        .fetch_latest(ACTOR_TYPE, actor_id)
        .await
        .expect("fetch should succeed")
        .expect("snapshot should exist");
    assert_eq!(latest, snapshot);
    assert_eq!(latest.last_event_id, event.id);
    assert_eq!(latest.last_event_on, Some(event.created_on));
    assert_eq!(latest.last_command_id, command.id);
    assert_eq!(latest.last_command_on, Some(command.received_on));
}

pub async fn test_add_without_history<S: SnapshotStore + ?Sized>(store: &S) {
    let actor_id = Uuid::new_v4();
    let snapshot = make_snapshot(actor_id, 0, 0);
    store.add(ACTOR_TYPE, &snapshot).await.expect("add");

    let latest = store
        .fetch_latest(ACTOR_TYPE, actor_id)
        .await
        .expect("fetch should succeed")
        .expect("snapshot should exist");
    assert!(latest.last_event_id.is_nil());
    assert!(latest.last_command_id.is_nil());
    assert!(latest.last_event_on.is_none());
    assert!(latest.last_command_on.is_none());
}

#[macro_export]
macro_rules! run_snapshot_store_tests {
    ($store:expr) => {
        use $crate::storage::snapshot_store_tests::*;

        // fetch_latest tests
        test_fetch_latest_none($store).await;
        println!("  test_fetch_latest_none: PASSED");

        test_fetch_latest_highest_version($store).await;
        println!("  test_fetch_latest_highest_version: PASSED");

        test_fetch_latest_equal_versions($store).await;
        println!("  test_fetch_latest_equal_versions: PASSED");

        test_snapshots_scoped_by_actor($store).await;
        println!("  test_snapshots_scoped_by_actor: PASSED");

        // add tests
        test_add_duplicate_id($store).await;
        println!("  test_add_duplicate_id: PASSED");

        test_add_preserves_fields($store).await;
        println!("  test_add_preserves_fields: PASSED");

        test_add_without_history($store).await;
        println!("  test_add_without_history: PASSED");
    };
}
