//! Storage configuration types.

use serde::Deserialize;

use crate::storage::DEFAULT_PAGE_SIZE;

/// Storage backend discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Postgres,
    Memory,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageType::Sqlite => "sqlite",
            StorageType::Postgres => "postgres",
            StorageType::Memory => "memory",
        })
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to connect to.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
    /// Pool size upper bound.
    pub max_connections: u32,
    /// How long an operation waits for a pooled connection.
    pub acquire_timeout_secs: u64,
    /// Events fetched per round trip by `fetch_events_since`.
    pub page_size: u32,
    /// Actor types served; query templates are compiled for each at startup.
    pub actor_types: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            sqlite: SqliteConfig::default(),
            postgres: PostgresConfig::default(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            page_size: DEFAULT_PAGE_SIZE,
            actor_types: Vec::new(),
        }
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database URI; the file is created if missing.
    pub uri: String,
    /// How long a writer waits on the database lock.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            uri: "sqlite://actorstore.db".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URI.
    pub uri: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/actorstore".to_string(),
        }
    }
}
