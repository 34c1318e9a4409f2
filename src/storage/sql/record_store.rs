//! Generic record-store engine.
//!
//! A [`RecordStore`] is instantiated once per record type and shares one
//! engine and one template catalog with its siblings. The relation a record
//! lives in is described by [`Record::relation`]; the store traits are
//! implemented on top of the helpers here.

use std::marker::PhantomData;
use std::sync::Arc;

use sea_query::Value;

use super::engine::{ColumnError, FromRow, RecordEngine, RecordTx};
use crate::records::ActorId;
use crate::storage::error::{OpContext, Result};
use crate::storage::schema::{Column, Relation};
use crate::storage::templates::{QueryKey, TemplateCatalog, TemplateSet};

/// A row type of one relation.
pub trait Record: FromRow + Clone + Sync {
    /// Insert statement for this record.
    const INSERT: QueryKey;

    fn relation() -> &'static Relation;

    /// Encoded value of one of the relation's columns.
    fn column(&self, column: Column) -> std::result::Result<Value, ColumnError>;

    /// Bind parameters of [`Record::INSERT`]: the inserted columns in order,
    /// then the ordinal scope for relations that have one.
    fn insert_params(&self) -> std::result::Result<Vec<Value>, ColumnError> {
        let relation = Self::relation();
        let mut params = relation
            .inserted_columns()
            .map(|column| self.column(column))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if let Some(ordinal) = relation.ordinal {
            params.push(self.column(ordinal.scope)?);
        }
        Ok(params)
    }
}

/// Record store for records of type `R` on engine `E`.
pub struct RecordStore<E, R> {
    engine: Arc<E>,
    catalog: Arc<TemplateCatalog>,
    page_size: u32,
    _record: PhantomData<fn() -> R>,
}

impl<E, R> Clone for RecordStore<E, R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            catalog: Arc::clone(&self.catalog),
            page_size: self.page_size,
            _record: PhantomData,
        }
    }
}

impl<E: RecordEngine, R: Record> RecordStore<E, R> {
    pub fn new(engine: Arc<E>, catalog: Arc<TemplateCatalog>, page_size: u32) -> Self {
        Self {
            engine,
            catalog,
            page_size: page_size.max(1),
            _record: PhantomData,
        }
    }

    /// A store for another record type over the same engine and catalog.
    pub fn sibling<S: Record>(&self) -> RecordStore<E, S> {
        RecordStore::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.catalog),
            self.page_size,
        )
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub(crate) fn templates(&self, context: &OpContext) -> Result<&TemplateSet> {
        self.catalog.get(context)
    }

    /// Key serializing writers of one actor's rows in `R`'s relation.
    pub(crate) fn lock_key(templates: &TemplateSet, actor_id: ActorId) -> String {
        format!(
            "{}_{}:{}",
            templates.actor_type(),
            R::relation().suffix,
            actor_id
        )
    }

    /// Insert one record inside `tx`. Returns rows affected.
    pub(crate) async fn insert_in(
        tx: &mut E::Tx,
        templates: &TemplateSet,
        record: &R,
        context: &OpContext,
    ) -> Result<u64> {
        let params = record
            .insert_params()
            .map_err(|e| e.into_storage(context))?;
        tx.execute(templates.get(R::INSERT), params).await
    }

    pub(crate) async fn fetch_one<T: FromRow>(
        &self,
        context: &OpContext,
        templates: &TemplateSet,
        key: QueryKey,
        params: Vec<Value>,
    ) -> Result<Option<T>> {
        self.engine
            .fetch_optional(context, templates.get(key), params)
            .await
    }
}
