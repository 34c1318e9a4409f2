//! Id generation.

use uuid::Uuid;

/// Source of globally unique actor, event, command and snapshot ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Random (v4) UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> Uuid + Send + Sync,
{
    fn next_id(&self) -> Uuid {
        self()
    }
}
