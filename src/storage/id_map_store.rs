//! IdMapStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::records::{ActorId, IdentifierSet};

/// Interface for the identifier map.
///
/// Resolves a set of business identifiers (e.g. name and title) to the one
/// canonical actor id for an actor type. Bindings are append-only: once a
/// set is bound it is never reassigned or removed.
///
/// Implementations:
/// - `RecordStore<E, IdMapping>`: SQL storage (SQLite, PostgreSQL)
/// - `MemoryStorage`: in-memory storage for tests
#[async_trait]
pub trait IdMapStore: Send + Sync {
    /// Exact-match lookup on the full key/value combination.
    ///
    /// Returns `None` when the set has never been registered.
    async fn resolve(
        &self,
        actor_type: &str,
        identifiers: &IdentifierSet,
    ) -> Result<Option<ActorId>>;

    /// Bind `identifiers` to `actor_id`.
    ///
    /// Registering the identical pair again succeeds. Registering a set that
    /// is bound to a different id fails with `DuplicateKey` and leaves the
    /// existing binding untouched.
    async fn register(
        &self,
        actor_type: &str,
        identifiers: &IdentifierSet,
        actor_id: ActorId,
    ) -> Result<()>;
}
