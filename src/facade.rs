//! Storage façade.
//!
//! [`Storage`] owns one backend (SQLite, PostgreSQL or in-memory) and the
//! id generator. [`ActorStorage`] binds it to one actor type and exposes the
//! contract the actor runtime consumes: resolve an actor, load it from its
//! latest snapshot plus later events, record commands, append events and
//! write snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};
use crate::ids::{IdGenerator, UuidV4Generator};
use crate::payload::{Payload, PayloadError};
use crate::records::{
    ActorId, CommandRecord, EventRecord, Handled, IdMapping, IdentifierSet, Snapshot,
};
use crate::storage::{
    ActorType, CommandStore, EventStore, EventStream, IdMapStore, MemoryStorage, OpContext,
    Operation, QueryTemplates, RecordEngine, RecordStore, Result, SnapshotStore, StorageError,
    TemplateCatalog,
};

/// Backend lifecycle: schema bootstrap, actor type checks and shutdown.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fail unless this backend serves the actor type of `context`.
    fn check_actor_type(&self, context: &OpContext) -> Result<()>;

    /// Create the actor type's relations if they do not exist.
    async fn ensure_schema(&self, actor_type: &ActorType) -> Result<()>;

    async fn close(&self);
}

/// SQL backend: an engine plus the templates compiled for it.
struct SqlBackend<E> {
    engine: Arc<E>,
    catalog: Arc<TemplateCatalog>,
}

#[async_trait]
impl<E: RecordEngine> StorageBackend for SqlBackend<E> {
    fn name(&self) -> &'static str {
        self.engine.name()
    }

    fn check_actor_type(&self, context: &OpContext) -> Result<()> {
        self.catalog.get(context).map(|_| ())
    }

    async fn ensure_schema(&self, actor_type: &ActorType) -> Result<()> {
        let context = OpContext::new(Operation::EnsureSchema, actor_type.as_str());
        let statements = self.engine.schema(actor_type);
        self.engine.execute_script(&context, &statements).await?;
        debug!(%actor_type, statements = statements.len(), "Ensured schema");
        Ok(())
    }

    async fn close(&self) {
        self.engine.close().await;
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn check_actor_type(&self, context: &OpContext) -> Result<()> {
        context.parse_actor_type().map(|_| ())
    }

    async fn ensure_schema(&self, _actor_type: &ActorType) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

/// The four stores over one backend.
#[derive(Clone)]
pub struct Storage {
    id_map: Arc<dyn IdMapStore>,
    commands: Arc<dyn CommandStore>,
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    backend: Arc<dyn StorageBackend>,
    ids: Arc<dyn IdGenerator>,
}

impl Storage {
    /// Build storage over a record engine.
    ///
    /// Templates are rendered and validated for every actor type up front;
    /// a missing template or invalid actor type fails here.
    pub fn with_engine<E, S>(
        engine: E,
        templates: &dyn QueryTemplates,
        actor_types: &[S],
        page_size: u32,
    ) -> Result<Self>
    where
        E: RecordEngine,
        S: AsRef<str>,
    {
        let catalog = Arc::new(TemplateCatalog::compile(templates, actor_types)?);
        let engine = Arc::new(engine);
        let events: RecordStore<E, EventRecord> =
            RecordStore::new(Arc::clone(&engine), Arc::clone(&catalog), page_size);

        Ok(Self {
            id_map: Arc::new(events.sibling::<IdMapping>()),
            commands: Arc::new(events.sibling::<CommandRecord>()),
            snapshots: Arc::new(events.sibling::<Snapshot>()),
            events: Arc::new(events),
            backend: Arc::new(SqlBackend { engine, catalog }),
            ids: Arc::new(UuidV4Generator),
        })
    }

    /// SQLite storage over an existing pool, with the default templates.
    #[cfg(feature = "sqlite")]
    pub fn sqlite<S: AsRef<str>>(
        pool: sqlx::SqlitePool,
        actor_types: &[S],
        page_size: u32,
    ) -> Result<Self> {
        use crate::storage::sql::sqlite::{Sqlite, SqliteEngine};
        use crate::storage::SqlTemplates;

        Self::with_engine(
            SqliteEngine::new(pool),
            &SqlTemplates::<Sqlite>::new(),
            actor_types,
            page_size,
        )
    }

    /// PostgreSQL storage over an existing pool, with the default templates.
    #[cfg(feature = "postgres")]
    pub fn postgres<S: AsRef<str>>(
        pool: sqlx::PgPool,
        actor_types: &[S],
        page_size: u32,
    ) -> Result<Self> {
        use crate::storage::sql::postgres::{Postgres, PostgresEngine};
        use crate::storage::SqlTemplates;

        Self::with_engine(
            PostgresEngine::new(pool),
            &SqlTemplates::<Postgres>::new(),
            actor_types,
            page_size,
        )
    }

    /// Non-durable storage serving any actor type.
    pub fn in_memory(page_size: u32) -> Self {
        let memory = Arc::new(MemoryStorage::with_page_size(page_size));
        Self {
            id_map: memory.clone(),
            commands: memory.clone(),
            events: memory.clone(),
            snapshots: memory.clone(),
            backend: memory,
            ids: Arc::new(UuidV4Generator),
        }
    }

    /// Open the pool described by `config` and build storage over it.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        info!(
            backend = %config.storage_type,
            actor_types = ?config.actor_types,
            "Connecting storage"
        );
        match config.storage_type {
            StorageType::Sqlite => connect_sqlite(config).await,
            StorageType::Postgres => connect_postgres(config).await,
            StorageType::Memory => Ok(Self::in_memory(config.page_size)),
        }
    }

    /// Replace the id generator used for new actors and records.
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn id_map(&self) -> &dyn IdMapStore {
        self.id_map.as_ref()
    }

    pub fn commands(&self) -> &dyn CommandStore {
        self.commands.as_ref()
    }

    pub fn events(&self) -> &dyn EventStore {
        self.events.as_ref()
    }

    pub fn snapshots(&self) -> &dyn SnapshotStore {
        self.snapshots.as_ref()
    }

    pub fn next_id(&self) -> Uuid {
        self.ids.next_id()
    }

    /// Storage bound to one actor type.
    pub fn actor(&self, actor_type: &str) -> Result<ActorStorage> {
        let context = OpContext::new(Operation::BindActor, actor_type);
        let actor_type = context.parse_actor_type()?;
        self.backend.check_actor_type(&context)?;
        Ok(ActorStorage {
            storage: self.clone(),
            actor_type,
        })
    }

    /// Create the relations of `actor_type` if missing.
    pub async fn ensure_schema(&self, actor_type: &str) -> Result<()> {
        let actor_type = OpContext::new(Operation::EnsureSchema, actor_type).parse_actor_type()?;
        self.backend.ensure_schema(&actor_type).await
    }

    /// Close the pool. Operations started afterwards fail with a connection
    /// failure.
    pub async fn close(&self) {
        self.backend.close().await;
        info!(backend = self.backend.name(), "Storage closed");
    }
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(config: &StorageConfig) -> Result<Storage> {
    use std::str::FromStr;
    use std::time::Duration;

    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

    let context = OpContext::new(Operation::Connect, "*").with_subject(&config.sqlite.uri);
    let options = SqliteConnectOptions::from_str(&config.sqlite.uri)
        .map_err(|e| context.classify(e))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.sqlite.busy_timeout_ms));
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| context.classify(e))?;

    Storage::sqlite(pool, &config.actor_types, config.page_size)
}

#[cfg(not(feature = "sqlite"))]
async fn connect_sqlite(_config: &StorageConfig) -> Result<Storage> {
    Err(StorageError::BackendUnavailable("sqlite"))
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &StorageConfig) -> Result<Storage> {
    use std::time::Duration;

    use sqlx::postgres::PgPoolOptions;

    let context = OpContext::new(Operation::Connect, "*").with_subject("postgres");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.postgres.uri)
        .await
        .map_err(|e| context.classify(e))?;

    Storage::postgres(pool, &config.actor_types, config.page_size)
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &StorageConfig) -> Result<Storage> {
    Err(StorageError::BackendUnavailable("postgres"))
}

/// An actor rebuilt from storage: its latest snapshot, if any, and the
/// events recorded after it.
pub struct ActorHistory<'a> {
    pub snapshot: Option<Snapshot>,
    pub events: EventStream<'a>,
}

impl ActorHistory<'_> {
    /// Drain the event stream.
    pub async fn into_parts(self) -> Result<(Option<Snapshot>, Vec<EventRecord>)> {
        let events = self.events.try_collect().await?;
        Ok((self.snapshot, events))
    }
}

/// Storage bound to one actor type.
#[derive(Clone)]
pub struct ActorStorage {
    storage: Storage,
    actor_type: ActorType,
}

impl ActorStorage {
    pub fn actor_type(&self) -> &ActorType {
        &self.actor_type
    }

    fn name(&self) -> &str {
        self.actor_type.as_str()
    }

    pub async fn resolve(&self, identifiers: &IdentifierSet) -> Result<Option<ActorId>> {
        self.storage.id_map.resolve(self.name(), identifiers).await
    }

    pub async fn register(&self, identifiers: &IdentifierSet, actor_id: ActorId) -> Result<()> {
        self.storage
            .id_map
            .register(self.name(), identifiers, actor_id)
            .await
    }

    /// Resolve `identifiers`, registering a fresh actor id on a miss.
    ///
    /// When another caller registers the same set concurrently, its id wins
    /// and is returned.
    pub async fn resolve_or_register(&self, identifiers: &IdentifierSet) -> Result<ActorId> {
        if let Some(actor_id) = self.resolve(identifiers).await? {
            return Ok(actor_id);
        }
        let candidate = self.storage.next_id();
        match self.register(identifiers, candidate).await {
            Ok(()) => {
                debug!(actor_type = %self.actor_type, %identifiers, actor_id = %candidate, "New actor");
                Ok(candidate)
            }
            Err(StorageError::DuplicateKey { context }) => self
                .resolve(identifiers)
                .await?
                .ok_or(StorageError::DuplicateKey { context }),
            Err(e) => Err(e),
        }
    }

    pub async fn record_command(&self, command: &CommandRecord) -> Result<()> {
        self.storage.commands.record(self.name(), command).await
    }

    pub async fn fetch_command(&self, id: Uuid) -> Result<Option<CommandRecord>> {
        self.storage.commands.fetch(self.name(), id).await
    }

    pub async fn mark_handled(&self, id: Uuid, handled: Handled) -> Result<()> {
        self.storage
            .commands
            .mark_handled(self.name(), id, handled)
            .await
    }

    pub async fn append(&self, events: &[EventRecord]) -> Result<Vec<EventRecord>> {
        self.storage.events.append(self.name(), events).await
    }

    pub async fn append_expecting(
        &self,
        events: &[EventRecord],
        expected: u64,
    ) -> Result<Vec<EventRecord>> {
        self.storage
            .events
            .append_expecting(self.name(), events, expected)
            .await
    }

    pub fn fetch_events_since(&self, actor_id: ActorId, since: Uuid) -> EventStream<'_> {
        self.storage
            .events
            .fetch_events_since(self.name(), actor_id, since)
    }

    pub async fn last_sequence(&self, actor_id: ActorId) -> Result<u64> {
        self.storage.events.last_sequence(self.name(), actor_id).await
    }

    pub async fn add_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.storage.snapshots.add(self.name(), snapshot).await
    }

    pub async fn fetch_latest_snapshot(&self, actor_id: ActorId) -> Result<Option<Snapshot>> {
        self.storage
            .snapshots
            .fetch_latest(self.name(), actor_id)
            .await
    }

    /// Latest snapshot plus a stream of the events after it.
    pub async fn load(&self, actor_id: ActorId) -> Result<ActorHistory<'_>> {
        let snapshot = self.fetch_latest_snapshot(actor_id).await?;
        let since = snapshot
            .as_ref()
            .map_or(Uuid::nil(), |snapshot| snapshot.last_event_id);
        Ok(ActorHistory {
            snapshot,
            events: self.fetch_events_since(actor_id, since),
        })
    }

    /// New event raised by `actor_id`, with a generated id.
    pub fn new_event<P: Payload>(
        &self,
        actor_id: ActorId,
        event: &P,
    ) -> std::result::Result<EventRecord, PayloadError> {
        EventRecord::new(self.storage.next_id(), self.name(), actor_id, event)
    }

    /// New unhandled command, with a generated id.
    pub fn new_command<P: Payload>(
        &self,
        command: &P,
    ) -> std::result::Result<CommandRecord, PayloadError> {
        CommandRecord::new(self.storage.next_id(), command)
    }

    /// New snapshot of `state` at `version`, with a generated id.
    pub fn new_snapshot<P: Payload>(
        &self,
        actor_id: ActorId,
        version: u64,
        state: &P,
    ) -> std::result::Result<Snapshot, PayloadError> {
        Snapshot::new(self.storage.next_id(), actor_id, version, state)
    }
}
