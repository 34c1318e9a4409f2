//! Record types persisted by the stores.
//!
//! Every record carries an opaque `data` payload held as a
//! [`serde_json::Value`]. The stores never look inside it; callers decode it
//! into their own types through [`crate::payload`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::payload::{self, Payload, PayloadError};

/// Canonical identifier of one actor instance.
pub type ActorId = Uuid;

/// Business identifiers naming an actor (e.g. `{Name: "Gandalf", Title: "The Grey"}`).
///
/// Keys are kept sorted so the serialized form is canonical: two sets with
/// the same pairs always serialize to the same text, which is what the
/// identifier map matches on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierSet(BTreeMap<String, String>);

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one identifier, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical compact JSON text (sorted keys).
    pub fn canonical(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    pub fn from_canonical(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for IdentifierSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for IdentifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        f.write_str("}")
    }
}

/// One identifier-set → actor id binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMapping {
    pub identifiers: IdentifierSet,
    pub actor_id: ActorId,
}

/// Outcome of handling a command: which actor handled it, when, and at which
/// actor version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handled {
    pub by: ActorId,
    pub on: DateTime<Utc>,
    pub version: u64,
}

/// An inbound command, recorded before it is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub command_type: String,
    pub data: Value,
    pub received_on: DateTime<Utc>,
    pub created_on: DateTime<Utc>,
    /// Populated exactly once, when handling completes.
    pub handled: Option<Handled>,
}

impl CommandRecord {
    /// Build an unhandled command record from a typed payload.
    pub fn new<P: Payload>(id: Uuid, command: &P) -> Result<Self, PayloadError> {
        let now = Utc::now();
        Ok(Self {
            id,
            command_type: P::TYPE.to_string(),
            data: payload::encode(P::TYPE, command)?,
            received_on: now,
            created_on: now,
            handled: None,
        })
    }

    pub fn received_on(mut self, received_on: DateTime<Utc>) -> Self {
        self.received_on = received_on;
        self
    }

    pub fn decode<P: Payload>(&self) -> Result<P, PayloadError> {
        payload::decode_typed(&self.command_type, &self.data)
    }
}

/// An immutable fact in one actor's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub actor_id: ActorId,
    pub actor_type: String,
    pub created_by: String,
    pub created_by_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    /// Per-actor position, assigned by the store on append (starting at 1).
    /// Ignored on input.
    #[serde(default)]
    pub sequence: u64,
    pub created_on: DateTime<Utc>,
}

impl EventRecord {
    /// Build an event raised by the actor itself.
    pub fn new<P: Payload>(
        id: Uuid,
        actor_type: &str,
        actor_id: ActorId,
        event: &P,
    ) -> Result<Self, PayloadError> {
        Ok(Self {
            id,
            actor_id,
            actor_type: actor_type.to_string(),
            created_by: actor_type.to_string(),
            created_by_id: actor_id,
            event_type: P::TYPE.to_string(),
            data: payload::encode(P::TYPE, event)?,
            sequence: 0,
            created_on: Utc::now(),
        })
    }

    /// Attribute the event to another actor (e.g. one acting on this actor).
    pub fn created_by(mut self, created_by: impl Into<String>, created_by_id: Uuid) -> Self {
        self.created_by = created_by.into();
        self.created_by_id = created_by_id;
        self
    }

    pub fn decode<P: Payload>(&self) -> Result<P, PayloadError> {
        payload::decode_typed(&self.event_type, &self.data)
    }
}

/// Materialized actor state at a point in its event log.
///
/// `last_event_id` is the id of the last event folded into `data`;
/// [`Uuid::nil`] means no event has been applied yet, so replay starts from
/// genesis either way by passing it to `fetch_events_since`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub actor_id: ActorId,
    #[serde(rename = "type")]
    pub snapshot_type: String,
    pub version: u64,
    pub created_on: DateTime<Utc>,
    pub events_applied: u64,
    pub last_event_id: Uuid,
    pub last_command_id: Uuid,
    pub last_command_on: Option<DateTime<Utc>>,
    pub last_event_on: Option<DateTime<Utc>>,
    pub data: Value,
}

impl Snapshot {
    pub fn new<S: Payload>(
        id: Uuid,
        actor_id: ActorId,
        version: u64,
        state: &S,
    ) -> Result<Self, PayloadError> {
        Ok(Self {
            id,
            actor_id,
            snapshot_type: S::TYPE.to_string(),
            version,
            created_on: Utc::now(),
            events_applied: 0,
            last_event_id: Uuid::nil(),
            last_command_id: Uuid::nil(),
            last_command_on: None,
            last_event_on: None,
            data: payload::encode(S::TYPE, state)?,
        })
    }

    /// Record the last event folded into this snapshot.
    pub fn after_event(mut self, event: &EventRecord, events_applied: u64) -> Self {
        self.last_event_id = event.id;
        self.last_event_on = Some(event.created_on);
        self.events_applied = events_applied;
        self
    }

    /// Record the last command whose events are folded into this snapshot.
    pub fn after_command(mut self, command: &CommandRecord) -> Self {
        self.last_command_id = command.id;
        self.last_command_on = Some(command.received_on);
        self
    }

    pub fn decode<S: Payload>(&self) -> Result<S, PayloadError> {
        payload::decode_typed(&self.snapshot_type, &self.data)
    }
}
