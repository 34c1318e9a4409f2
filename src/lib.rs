//! actorstore - Persistence for event-sourced actors
//!
//! Stores the four things an event-sourced actor runtime needs per actor
//! type: an identifier map resolving business identifiers to actor ids, a
//! command journal, an append-only event log and periodic snapshots.
//!
//! ```text
//! resolve ids -> latest snapshot -> events since snapshot -> replay
//!   command -> record -> handle -> append events -> (snapshot)
//! ```
//!
//! Backends: SQLite (default), PostgreSQL (`postgres` feature) and an
//! in-memory store for tests.

pub mod config;
pub mod facade;
pub mod ids;
pub mod payload;
pub mod records;
pub mod storage;
pub mod utils;

pub use facade::{ActorHistory, ActorStorage, Storage, StorageBackend};
pub use ids::{IdGenerator, UuidV4Generator};
pub use payload::{Payload, PayloadError, PayloadRegistry};
pub use records::{
    ActorId, CommandRecord, EventRecord, Handled, IdMapping, IdentifierSet, Snapshot,
};
pub use storage::{ErrorKind, Result, StorageError};
