//! CommandStore trait definition.

use async_trait::async_trait;
use uuid::Uuid;

use super::Result;
use crate::records::{CommandRecord, Handled};

/// Interface for the command journal.
///
/// Commands are recorded on receipt, before they are handled, and updated
/// exactly once when handling completes.
///
/// Implementations:
/// - `RecordStore<E, CommandRecord>`: SQL storage (SQLite, PostgreSQL)
/// - `MemoryStorage`: in-memory storage for tests
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Insert a new command. A command with the same id already recorded
    /// fails with `DuplicateKey`.
    async fn record(&self, actor_type: &str, command: &CommandRecord) -> Result<()>;

    /// Read a recorded command back.
    async fn fetch(&self, actor_type: &str, id: Uuid) -> Result<Option<CommandRecord>>;

    /// Record how and when a command was handled.
    ///
    /// Repeating the call with the same outcome is a no-op. An unknown id is
    /// `NotFound`; a different outcome for an already handled command is
    /// `AlreadyHandled`, and the stored outcome is kept.
    async fn mark_handled(&self, actor_type: &str, id: Uuid, handled: Handled) -> Result<()>;
}
