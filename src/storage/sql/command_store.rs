//! Command journal over the record-store engine.

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::engine::{RecordEngine, RecordTx};
use super::record_store::RecordStore;
use super::rows::{int_value, timestamp_value, uuid_value};
use crate::records::{CommandRecord, Handled};
use crate::storage::error::{OpContext, Operation, Result, StorageError};
use crate::storage::schema::Column;
use crate::storage::templates::QueryKey;
use crate::storage::CommandStore;

#[async_trait]
impl<E: RecordEngine> CommandStore for RecordStore<E, CommandRecord> {
    #[tracing::instrument(name = "command.record", skip_all, fields(%actor_type, command_id = %command.id))]
    async fn record(&self, actor_type: &str, command: &CommandRecord) -> Result<()> {
        let context = OpContext::new(Operation::RecordCommand, actor_type).with_subject(command.id);
        let templates = self.templates(&context)?;

        let mut tx = self.engine().begin(&context).await?;
        match Self::insert_in(&mut tx, templates, command, &context).await {
            Ok(_) => {}
            Err(e @ StorageError::DuplicateKey { .. }) => {
                warn!("Command already recorded");
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        tx.commit().await?;

        debug!(command_type = %command.command_type, "Recorded command");
        Ok(())
    }

    #[tracing::instrument(name = "command.fetch", skip_all, fields(%actor_type, command_id = %id))]
    async fn fetch(&self, actor_type: &str, id: Uuid) -> Result<Option<CommandRecord>> {
        let context = OpContext::new(Operation::FetchCommand, actor_type).with_subject(id);
        let templates = self.templates(&context)?;
        self.fetch_one(&context, templates, QueryKey::SelectCommand, vec![uuid_value(id)])
            .await
    }

    #[tracing::instrument(name = "command.mark_handled", skip_all, fields(%actor_type, command_id = %id, handled_by = %handled.by))]
    async fn mark_handled(&self, actor_type: &str, id: Uuid, handled: Handled) -> Result<()> {
        let context = OpContext::new(Operation::MarkHandled, actor_type).with_subject(id);
        let templates = self.templates(&context)?;
        let params = vec![
            uuid_value(handled.by),
            timestamp_value(&handled.on),
            int_value(Column::HandledVersion, handled.version)
                .map_err(|e| e.into_storage(&context))?,
            uuid_value(id),
        ];

        let mut tx = self.engine().begin(&context).await?;
        let updated = tx
            .execute(templates.get(QueryKey::MarkCommandHandled), params)
            .await?;
        if updated == 0 {
            let existing: Option<CommandRecord> = tx
                .fetch_optional(templates.get(QueryKey::SelectCommand), vec![uuid_value(id)])
                .await?;
            return match existing {
                None => Err(context.not_found()),
                Some(CommandRecord {
                    handled: Some(stored),
                    ..
                }) if stored == handled => {
                    debug!("Command already marked handled");
                    Ok(())
                }
                Some(_) => {
                    warn!("Command already handled with a different outcome");
                    Err(StorageError::AlreadyHandled { context })
                }
            };
        }
        tx.commit().await?;

        debug!(version = handled.version, "Marked command handled");
        Ok(())
    }
}
