//! Storage errors.
//!
//! Every failure raised on behalf of a store operation carries an
//! [`OpContext`] naming the operation, the actor type and the subject (actor
//! id, command id, identifier set) so callers can decide whether to retry.
//! The stores never retry internally.

use std::fmt;

use uuid::Uuid;

use super::schema::ActorType;
use super::templates::QueryKey;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Store operation names, used in error context and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Resolve,
    Register,
    RecordCommand,
    FetchCommand,
    MarkHandled,
    AppendEvents,
    FetchEvents,
    LastSequence,
    AddSnapshot,
    FetchSnapshot,
    EnsureSchema,
    Connect,
    CompileTemplates,
    BindActor,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Resolve => "resolve",
            Operation::Register => "register",
            Operation::RecordCommand => "record_command",
            Operation::FetchCommand => "fetch_command",
            Operation::MarkHandled => "mark_handled",
            Operation::AppendEvents => "append_events",
            Operation::FetchEvents => "fetch_events",
            Operation::LastSequence => "last_sequence",
            Operation::AddSnapshot => "add_snapshot",
            Operation::FetchSnapshot => "fetch_snapshot",
            Operation::EnsureSchema => "ensure_schema",
            Operation::Connect => "connect",
            Operation::CompileTemplates => "compile_templates",
            Operation::BindActor => "bind_actor",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was being attempted when an error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpContext {
    pub operation: Operation,
    pub actor_type: String,
    pub subject: Option<String>,
}

impl OpContext {
    pub fn new(operation: Operation, actor_type: impl Into<String>) -> Self {
        Self {
            operation,
            actor_type: actor_type.into(),
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl fmt::Display) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Map a driver error onto the storage taxonomy.
    pub fn classify(&self, err: sqlx::Error) -> StorageError {
        let context = self.clone();
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StorageError::DuplicateKey { context }
            }
            sqlx::Error::PoolTimedOut => StorageError::Timeout {
                context,
                source: None,
            },
            sqlx::Error::Database(ref db)
                if db.code().is_some_and(|code| is_contention(&code)) =>
            {
                StorageError::Timeout {
                    context,
                    source: Some(err),
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::ConnectionFailure {
                context,
                source: err,
            },
            other => StorageError::Database {
                context,
                source: other,
            },
        }
    }

    pub fn not_found(&self) -> StorageError {
        StorageError::NotFound {
            context: self.clone(),
        }
    }

    pub fn duplicate(&self) -> StorageError {
        StorageError::DuplicateKey {
            context: self.clone(),
        }
    }

    /// Parse this context's actor type.
    pub fn parse_actor_type(&self) -> Result<ActorType> {
        ActorType::parse(&self.actor_type).ok_or_else(|| self.invalid_actor_type())
    }

    pub fn invalid_actor_type(&self) -> StorageError {
        StorageError::InvalidActorType {
            context: self.clone(),
        }
    }

    pub fn unregistered_actor_type(&self) -> StorageError {
        StorageError::UnregisteredActorType {
            context: self.clone(),
        }
    }

    pub fn serialization(&self, source: serde_json::Error) -> StorageError {
        StorageError::Serialization {
            context: self.clone(),
            source,
        }
    }
}

/// Driver codes reporting a lock wait that gave up or a transaction aborted
/// by contention. Retrying the whole operation may succeed.
///
/// SQLite (extended result codes): `SQLITE_BUSY` and its `RECOVERY`,
/// `SNAPSHOT` and `TIMEOUT` forms, `SQLITE_LOCKED` and its shared-cache
/// form. PostgreSQL (SQLSTATE): `lock_not_available`, `query_canceled`
/// (statement or lock timeout), `serialization_failure`,
/// `deadlock_detected`.
const CONTENTION_CODES: &[&str] = &[
    "5", "261", "517", "773", "6", "262", "55P03", "57014", "40001", "40P01",
];

pub(crate) fn is_contention(code: &str) -> bool {
    CONTENTION_CODES.contains(&code)
}

impl fmt::Display for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.operation, self.actor_type)?;
        if let Some(subject) = &self.subject {
            write!(f, " {}", subject)?;
        }
        Ok(())
    }
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    DuplicateKey,
    Conflict,
    ConnectionFailure,
    Timeout,
    Serialization,
    Database,
    Setup,
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {context}")]
    NotFound { context: OpContext },

    #[error("Duplicate key: {context}")]
    DuplicateKey { context: OpContext },

    #[error("Command already handled with different outcome: {context}")]
    AlreadyHandled { context: OpContext },

    #[error("Sequence conflict: {context}: expected {expected}, got {actual}")]
    SequenceConflict {
        context: OpContext,
        expected: u64,
        actual: u64,
    },

    #[error("Batch mixes actors: {context}: expected {expected}, found {found}")]
    MixedActors {
        context: OpContext,
        expected: Uuid,
        found: Uuid,
    },

    #[error("Connection failure: {context}: {source}")]
    ConnectionFailure {
        context: OpContext,
        #[source]
        source: sqlx::Error,
    },

    /// Pool acquire timed out, or the database gave up waiting on a lock.
    #[error("Timed out: {context}")]
    Timeout {
        context: OpContext,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Serialization failure: {context}: {source}")]
    Serialization {
        context: OpContext,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid stored value: {context}: column {column} = {value:?}")]
    InvalidColumn {
        context: OpContext,
        column: String,
        value: String,
    },

    #[error("Database error: {context}: {source}")]
    Database {
        context: OpContext,
        #[source]
        source: sqlx::Error,
    },

    #[error("Missing query template {key} for actor type {actor_type}")]
    MissingTemplate { key: QueryKey, actor_type: String },

    #[error("Invalid actor type: {context}")]
    InvalidActorType { context: OpContext },

    #[error("Actor type not registered with this storage: {context}")]
    UnregisteredActorType { context: OpContext },

    #[error("Storage backend not compiled in: {0}")]
    BackendUnavailable(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            StorageError::AlreadyHandled { .. }
            | StorageError::SequenceConflict { .. }
            | StorageError::MixedActors { .. } => ErrorKind::Conflict,
            StorageError::ConnectionFailure { .. } => ErrorKind::ConnectionFailure,
            StorageError::Timeout { .. } => ErrorKind::Timeout,
            StorageError::Serialization { .. } | StorageError::InvalidColumn { .. } => {
                ErrorKind::Serialization
            }
            StorageError::Database { .. } => ErrorKind::Database,
            StorageError::MissingTemplate { .. }
            | StorageError::InvalidActorType { .. }
            | StorageError::UnregisteredActorType { .. }
            | StorageError::BackendUnavailable(_)
            | StorageError::Config(_) => ErrorKind::Setup,
        }
    }

    /// Connection failures and timeouts. Idempotent operations (`register`,
    /// `record` with the same id, `mark_handled` with the same arguments) are
    /// safe to retry on these; plain `append` is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionFailure | ErrorKind::Timeout
        )
    }

    pub fn context(&self) -> Option<&OpContext> {
        match self {
            StorageError::NotFound { context }
            | StorageError::DuplicateKey { context }
            | StorageError::AlreadyHandled { context }
            | StorageError::SequenceConflict { context, .. }
            | StorageError::MixedActors { context, .. }
            | StorageError::ConnectionFailure { context, .. }
            | StorageError::Timeout { context, .. }
            | StorageError::Serialization { context, .. }
            | StorageError::InvalidColumn { context, .. }
            | StorageError::Database { context, .. }
            | StorageError::InvalidActorType { context }
            | StorageError::UnregisteredActorType { context } => Some(context),
            _ => None,
        }
    }
}
