//! Snapshot store over the record-store engine.

use async_trait::async_trait;
use sea_query::Value;
use tracing::debug;

use super::engine::{RecordEngine, RecordTx};
use super::record_store::RecordStore;
use super::rows::uuid_value;
use crate::records::{ActorId, Snapshot};
use crate::storage::error::{OpContext, Operation, Result};
use crate::storage::templates::QueryKey;
use crate::storage::SnapshotStore;

#[async_trait]
impl<E: RecordEngine> SnapshotStore for RecordStore<E, Snapshot> {
    #[tracing::instrument(name = "snapshot.add", skip_all, fields(%actor_type, actor_id = %snapshot.actor_id, version = snapshot.version))]
    async fn add(&self, actor_type: &str, snapshot: &Snapshot) -> Result<()> {
        let context =
            OpContext::new(Operation::AddSnapshot, actor_type).with_subject(snapshot.actor_id);
        let templates = self.templates(&context)?;

        let mut tx = self.engine().begin(&context).await?;
        tx.lock(&Self::lock_key(templates, snapshot.actor_id)).await?;
        Self::insert_in(&mut tx, templates, snapshot, &context).await?;
        tx.commit().await?;

        debug!(snapshot_id = %snapshot.id, "Stored snapshot");
        Ok(())
    }

    #[tracing::instrument(name = "snapshot.fetch_latest", skip_all, fields(%actor_type, %actor_id))]
    async fn fetch_latest(&self, actor_type: &str, actor_id: ActorId) -> Result<Option<Snapshot>> {
        let context = OpContext::new(Operation::FetchSnapshot, actor_type).with_subject(actor_id);
        let templates = self.templates(&context)?;

        let snapshot: Option<Snapshot> = self
            .fetch_one(
                &context,
                templates,
                QueryKey::SelectLatestSnapshot,
                vec![uuid_value(actor_id), Value::from(1i64)],
            )
            .await?;
        if let Some(snapshot) = &snapshot {
            debug!(version = snapshot.version, "Retrieved snapshot");
        }
        Ok(snapshot)
    }
}
