//! Storage implementations.
//!
//! Four stores make up an actor's persistence: the identifier map, the
//! command journal, the event log and the snapshot store. Each is a trait
//! here; `sql` implements all four on one generic record-store engine
//! (SQLite, PostgreSQL) and `memory` keeps them in process for tests.

pub mod command_store;
pub mod error;
pub mod event_store;
pub mod id_map_store;
pub mod memory;
pub mod schema;
pub mod snapshot_store;
pub mod sql;
pub mod templates;

pub use command_store::CommandStore;
pub use error::{ErrorKind, OpContext, Operation, Result, StorageError};
pub use event_store::{EventStore, EventStream};
pub use id_map_store::IdMapStore;
pub use memory::MemoryStorage;
pub use schema::ActorType;
pub use snapshot_store::SnapshotStore;
pub use sql::{RecordEngine, RecordStore, SqlTemplates};
pub use templates::{QueryKey, QueryTemplates, StaticTemplates, TemplateCatalog, TemplateSet};

/// Events fetched per round trip when none is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
