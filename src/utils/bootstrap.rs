//! Bootstrap utilities for actorstore binaries.

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::storage::Result;

/// Environment variable holding the tracing filter.
pub const LOG_ENV_VAR: &str = "ACTORSTORE_LOG";

/// Initialize tracing with the ACTORSTORE_LOG environment variable.
///
/// Defaults to "info" level if ACTORSTORE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Backoff for [`connect_with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Connect to a database that may still be starting up.
///
/// Retries with exponential backoff while `connect` fails with a transient
/// error (connection failure, pool timeout); any other error is returned
/// at once. Store operations themselves never retry.
pub async fn connect_with_retry<T, F, Fut>(
    backend: &str,
    policy: RetryPolicy,
    connect: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect().await {
            Ok(connected) => {
                tracing::info!(backend, attempt, "Connected to storage");
                return Ok(connected);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    "Failed to connect to {} (attempt {}/{}): {}. Retrying in {:?}...",
                    backend, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
            Err(e) => {
                tracing::error!(backend, attempt, error = %e, "Failed to connect to storage");
                return Err(e);
            }
        }
    }
}
