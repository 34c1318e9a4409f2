//! CommandStore interface tests.
//!
//! These tests verify the contract of the CommandStore trait.
//! Each storage implementation should run these tests.

use chrono::{Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use actorstore::storage::CommandStore;
use actorstore::{CommandRecord, Handled, Payload, StorageError};

use super::ACTOR_TYPE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rename {
    pub name: String,
    pub reason: Option<String>,
}

impl Payload for Rename {
    const TYPE: &'static str = "Rename";
}

pub fn make_command(name: &str) -> CommandRecord {
    let received = Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 0).unwrap() + Duration::nanoseconds(123_456_789);
    CommandRecord::new(
        Uuid::new_v4(),
        &Rename {
            name: name.to_string(),
            reason: None,
        },
    )
    .expect("encode command")
    .received_on(received)
}

fn handled(version: u64) -> Handled {
    Handled {
        by: Uuid::new_v4(),
        on: Utc.with_ymd_and_hms(2024, 5, 4, 10, 0, 1).unwrap() + Duration::microseconds(42),
        version,
    }
}

// =============================================================================
// CommandStore::record tests
// =============================================================================

pub async fn test_record_and_fetch<S: CommandStore + ?Sized>(store: &S) {
    let command = make_command("Strider");

    store
        .record(ACTOR_TYPE, &command)
        .await
        .expect("record should succeed");

    let fetched = store
        .fetch(ACTOR_TYPE, command.id)
        .await
        .expect("fetch should succeed")
        .expect("command should exist");
    assert_eq!(fetched, command);
    assert!(fetched.handled.is_none());
    assert_eq!(
        fetched.decode::<Rename>().expect("decode"),
        Rename {
            name: "Strider".into(),
            reason: None
        }
    );
}

pub async fn test_fetch_unknown<S: CommandStore + ?Sized>(store: &S) {
    let fetched = store
        .fetch(ACTOR_TYPE, Uuid::new_v4())
        .await
        .expect("fetch should succeed");
    assert!(fetched.is_none());
}

pub async fn test_record_duplicate<S: CommandStore + ?Sized>(store: &S) {
    let command = make_command("Aragorn");
    store
        .record(ACTOR_TYPE, &command)
        .await
        .expect("first record should succeed");

    let mut second = make_command("Elessar");
    second.id = command.id;
    let err = store
        .record(ACTOR_TYPE, &second)
        .await
        .expect_err("recording the same id twice should fail");
    assert!(
        matches!(err, StorageError::DuplicateKey { .. }),
        "expected DuplicateKey, got {err:?}"
    );

    let fetched = store
        .fetch(ACTOR_TYPE, command.id)
        .await
        .expect("fetch")
        .expect("command should exist");
    assert_eq!(fetched, command, "first record must be unaffected");
}

// =============================================================================
// CommandStore::mark_handled tests
// =============================================================================

pub async fn test_mark_handled<S: CommandStore + ?Sized>(store: &S) {
    let command = make_command("Legolas");
    store.record(ACTOR_TYPE, &command).await.expect("record");

    let outcome = handled(4);
    store
        .mark_handled(ACTOR_TYPE, command.id, outcome)
        .await
        .expect("mark_handled should succeed");

    let fetched = store
        .fetch(ACTOR_TYPE, command.id)
        .await
        .expect("fetch")
        .expect("command should exist");
    assert_eq!(fetched.handled, Some(outcome));
    assert_eq!(fetched.data, command.data, "payload must be unchanged");
    assert_eq!(fetched.received_on, command.received_on);
}

pub async fn test_mark_handled_repeat_is_noop<S: CommandStore + ?Sized>(store: &S) {
    let command = make_command("Gimli");
    store.record(ACTOR_TYPE, &command).await.expect("record");

    let outcome = handled(2);
    store
        .mark_handled(ACTOR_TYPE, command.id, outcome)
        .await
        .expect("first mark_handled");
    store
        .mark_handled(ACTOR_TYPE, command.id, outcome)
        .await
        .expect("repeating the same outcome should succeed");
}

pub async fn test_mark_handled_different_outcome<S: CommandStore + ?Sized>(store: &S) {
    let command = make_command("Faramir");
    store.record(ACTOR_TYPE, &command).await.expect("record");

    let first = handled(1);
    store
        .mark_handled(ACTOR_TYPE, command.id, first)
        .await
        .expect("first mark_handled");

    let err = store
        .mark_handled(ACTOR_TYPE, command.id, handled(9))
        .await
        .expect_err("a different outcome should fail");
    assert!(
        matches!(err, StorageError::AlreadyHandled { .. }),
        "expected AlreadyHandled, got {err:?}"
    );

    let fetched = store
        .fetch(ACTOR_TYPE, command.id)
        .await
        .expect("fetch")
        .expect("command should exist");
    assert_eq!(fetched.handled, Some(first), "stored outcome must be kept");
}

pub async fn test_mark_handled_unknown<S: CommandStore + ?Sized>(store: &S) {
    let err = store
        .mark_handled(ACTOR_TYPE, Uuid::new_v4(), handled(1))
        .await
        .expect_err("unknown command should fail");
    assert!(
        matches!(err, StorageError::NotFound { .. }),
        "expected NotFound, got {err:?}"
    );
}

#[macro_export]
macro_rules! run_command_store_tests {
    ($store:expr) => {
        use $crate::storage::command_store_tests::*;

        // record tests
        test_record_and_fetch($store).await;
        println!("  test_record_and_fetch: PASSED");

        test_fetch_unknown($store).await;
        println!("  test_fetch_unknown: PASSED");

        test_record_duplicate($store).await;
        println!("  test_record_duplicate: PASSED");

        // mark_handled tests
        test_mark_handled($store).await;
        println!("  test_mark_handled: PASSED");

        test_mark_handled_repeat_is_noop($store).await;
        println!("  test_mark_handled_repeat_is_noop: PASSED");

        test_mark_handled_different_outcome($store).await;
        println!("  test_mark_handled_different_outcome: PASSED");

        test_mark_handled_unknown($store).await;
        println!("  test_mark_handled_unknown: PASSED");
    };
}
