//! actorstore-schema: Schema bootstrap
//!
//! Connects to the configured backend, compiles and validates the query
//! templates of every configured actor type, creates their relations if
//! missing, then closes the pool. Run before starting an actor runtime
//! against a fresh database.
//!
//! ## Configuration
//! - `config.yaml` / `actorstore.yaml` in the working directory
//! - ACTORSTORE_CONFIG: Path to a config file
//! - ACTORSTORE__STORAGE__*: Overrides (e.g. ACTORSTORE__STORAGE__ACTOR_TYPES=player,wizard)
//! - ACTORSTORE_LOG: Tracing filter (default: info)
//!
//! An optional first argument names a config file.

use tracing::{info, warn};

use actorstore::config::Config;
use actorstore::utils::bootstrap::{connect_with_retry, init_tracing, RetryPolicy};
use actorstore::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;
    let storage_config = &config.storage;

    if storage_config.actor_types.is_empty() {
        warn!("No actor types configured, nothing to do");
        return Ok(());
    }

    let storage = connect_with_retry(
        &storage_config.storage_type.to_string(),
        RetryPolicy::default(),
        || Storage::connect(storage_config),
    )
    .await?;

    for actor_type in &storage_config.actor_types {
        storage.ensure_schema(actor_type).await?;
        info!(%actor_type, "Schema ready");
    }

    storage.close().await;
    info!(
        backend = storage.backend_name(),
        actor_types = storage_config.actor_types.len(),
        "actorstore-schema finished"
    );
    Ok(())
}
