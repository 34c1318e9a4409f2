//! Identifier map over the record-store engine.

use async_trait::async_trait;
use sea_query::Value;
use tracing::{debug, warn};

use super::engine::{RecordEngine, RecordTx};
use super::record_store::{Record, RecordStore};
use crate::records::{ActorId, IdMapping, IdentifierSet};
use crate::storage::error::{OpContext, Operation, Result};
use crate::storage::schema::Column;
use crate::storage::templates::QueryKey;
use crate::storage::IdMapStore;

fn identifiers_param(context: &OpContext, identifiers: &IdentifierSet) -> Result<Value> {
    identifiers
        .canonical()
        .map(Value::from)
        .map_err(|e| context.serialization(e))
}

#[async_trait]
impl<E: RecordEngine> IdMapStore for RecordStore<E, IdMapping> {
    #[tracing::instrument(name = "id_map.resolve", skip_all, fields(%actor_type, %identifiers))]
    async fn resolve(
        &self,
        actor_type: &str,
        identifiers: &IdentifierSet,
    ) -> Result<Option<ActorId>> {
        let context = OpContext::new(Operation::Resolve, actor_type).with_subject(identifiers);
        let templates = self.templates(&context)?;
        let key = identifiers_param(&context, identifiers)?;

        let found: Option<IdMapping> = self
            .fetch_one(&context, templates, QueryKey::SelectIdentifiers, vec![key])
            .await?;
        Ok(found.map(|mapping| mapping.actor_id))
    }

    #[tracing::instrument(name = "id_map.register", skip_all, fields(%actor_type, %identifiers, %actor_id))]
    async fn register(
        &self,
        actor_type: &str,
        identifiers: &IdentifierSet,
        actor_id: ActorId,
    ) -> Result<()> {
        let context = OpContext::new(Operation::Register, actor_type).with_subject(identifiers);
        let templates = self.templates(&context)?;
        let mapping = IdMapping {
            identifiers: identifiers.clone(),
            actor_id,
        };

        let mut tx = self.engine().begin(&context).await?;
        let inserted = Self::insert_in(&mut tx, templates, &mapping, &context).await?;
        if inserted == 0 {
            // The set is already bound; the insert left it untouched.
            let key = mapping
                .column(Column::Identifiers)
                .map_err(|e| e.into_storage(&context))?;
            let existing: Option<IdMapping> = tx
                .fetch_optional(templates.get(QueryKey::SelectIdentifiers), vec![key])
                .await?;
            match existing {
                Some(existing) if existing.actor_id == actor_id => {
                    debug!("Identifiers already registered to this actor");
                    return Ok(());
                }
                Some(existing) => {
                    warn!(bound_to = %existing.actor_id, "Identifiers bound to another actor");
                    return Err(context.duplicate());
                }
                None => return Err(context.duplicate()),
            }
        }
        tx.commit().await?;

        debug!("Registered identifiers");
        Ok(())
    }
}
