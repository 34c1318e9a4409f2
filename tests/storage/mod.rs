//! Shared storage integration tests.
//!
//! Tests the IdMapStore, CommandStore, EventStore and SnapshotStore
//! contracts against every backend. Each backend's test binary builds its
//! stores and runs these functions through the `run_*_tests!` macros.
//!
//! Every test uses fresh random actor and command ids, so the tests share
//! one database without cleanup.

#![allow(dead_code)]

pub mod command_store_tests;
pub mod event_store_tests;
pub mod snapshot_store_tests;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use actorstore::{ActorId, EventRecord, Payload};

/// Actor type registered by every backend's test setup.
pub const ACTOR_TYPE: &str = "player";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moved {
    pub x: i64,
    pub y: i64,
}

impl Payload for Moved {
    const TYPE: &'static str = "Moved";
}

/// Event `n` of `actor_id`, with a payload carrying `n`.
pub fn make_event(actor_id: ActorId, n: i64) -> EventRecord {
    EventRecord::new(Uuid::new_v4(), ACTOR_TYPE, actor_id, &Moved { x: n, y: -n })
        .expect("encode event")
}

/// An event with a nested, heterogeneous payload.
pub fn make_nested_event(actor_id: ActorId) -> EventRecord {
    EventRecord {
        id: Uuid::new_v4(),
        actor_id,
        actor_type: ACTOR_TYPE.to_string(),
        created_by: "gamemaster".to_string(),
        created_by_id: Uuid::new_v4(),
        event_type: "InventoryChanged".to_string(),
        data: json!({
            "items": [
                {"name": "staff", "charges": 3, "tags": ["wooden", "magic"]},
                {"name": "pipe", "charges": null}
            ],
            "weight": 12.5,
            "accuracy": 1.0997786443906645,
            "unicode": "Mithrandir \u{1F9D9}",
            "empty": {}
        }),
        sequence: 0,
        created_on: Utc::now(),
    }
}
