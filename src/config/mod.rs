//! Configuration.
//!
//! Loaded in layers, later sources overriding earlier ones:
//! `config.yaml` and `actorstore.yaml` in the working directory (optional),
//! an explicit path, the file named by `ACTORSTORE_CONFIG`, then
//! `ACTORSTORE__*` environment variables (`__` separates nesting, e.g.
//! `ACTORSTORE__STORAGE__PAGE_SIZE=500`).

mod storage;

use serde::Deserialize;

pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType};

use crate::storage::Result;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "ACTORSTORE_CONFIG";

/// Prefix of environment variable overrides.
pub const CONFIG_ENV_PREFIX: &str = "ACTORSTORE";

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "actorstore";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from files and environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("storage.actor_types"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
