//! Backend-specific execution for the record-store engine.
//!
//! [`RecordEngine`] and [`RecordTx`] are the only places that touch sqlx
//! connections. Both are implemented for each SQL backend by
//! `impl_record_engine!`, so the stores above them stay backend-agnostic.

use std::marker::PhantomData;

use async_trait::async_trait;
use sea_query::Value;

use super::SqlDatabase;
use crate::storage::error::{OpContext, Result, StorageError};

/// Failure reading or writing one column.
#[derive(Debug)]
pub enum ColumnError {
    Driver(sqlx::Error),
    Invalid { column: String, value: String },
    Payload(serde_json::Error),
    /// The record type has no value for a column of its relation.
    Unmapped(&'static str),
}

impl ColumnError {
    pub fn invalid(column: &str, value: impl ToString) -> Self {
        ColumnError::Invalid {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn into_storage(self, context: &OpContext) -> StorageError {
        match self {
            ColumnError::Driver(e) => context.classify(e),
            ColumnError::Invalid { column, value } => StorageError::InvalidColumn {
                context: context.clone(),
                column,
                value,
            },
            ColumnError::Payload(e) => context.serialization(e),
            ColumnError::Unmapped(column) => StorageError::InvalidColumn {
                context: context.clone(),
                column: column.to_string(),
                value: String::new(),
            },
        }
    }
}

/// Backend-neutral access to one result row, by column name.
pub trait RowReader {
    fn text(&self, column: &str) -> std::result::Result<String, ColumnError>;
    fn opt_text(&self, column: &str) -> std::result::Result<Option<String>, ColumnError>;
    fn int(&self, column: &str) -> std::result::Result<i64, ColumnError>;
    fn opt_int(&self, column: &str) -> std::result::Result<Option<i64>, ColumnError>;
}

/// Decode a value from a row.
pub trait FromRow: Sized + Send + 'static {
    fn from_row(row: &dyn RowReader) -> std::result::Result<Self, ColumnError>;
}

/// Pooled query execution.
#[async_trait]
pub trait RecordEngine: Send + Sync + 'static {
    type Tx: RecordTx;

    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Start a transaction on a pooled connection. Dropping the returned
    /// transaction without committing rolls it back and releases the
    /// connection.
    async fn begin(&self, context: &OpContext) -> Result<Self::Tx>;

    async fn fetch_optional<R: FromRow>(
        &self,
        context: &OpContext,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Option<R>>;

    async fn fetch_all<R: FromRow>(
        &self,
        context: &OpContext,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<R>>;

    /// Run parameterless statements (schema bootstrap), one at a time.
    async fn execute_script(&self, context: &OpContext, statements: &[String]) -> Result<()>;

    /// Render the schema bootstrap statements for an actor type.
    fn schema(&self, actor_type: &crate::storage::schema::ActorType) -> Vec<String>;

    /// Close the pool, waiting for checked-out connections to return.
    async fn close(&self);
}

/// One open transaction.
#[async_trait]
pub trait RecordTx: Send {
    /// Returns rows affected.
    async fn execute(&mut self, sql: &str, params: Vec<Value>) -> Result<u64>;

    async fn fetch_optional<R: FromRow>(&mut self, sql: &str, params: Vec<Value>)
        -> Result<Option<R>>;

    /// Serialize writers of `key` for the rest of this transaction.
    async fn lock(&mut self, key: &str) -> Result<()>;

    async fn commit(self) -> Result<()>;
}

/// Record engine over an sqlx pool.
pub struct SqlEngine<DB: SqlDatabase> {
    pool: sqlx::Pool<DB::Database>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlEngine<DB> {
    pub fn new(pool: sqlx::Pool<DB::Database>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }
}

/// Transaction handed out by [`SqlEngine::begin`].
pub struct SqlTx<DB: SqlDatabase> {
    tx: sqlx::Transaction<'static, DB::Database>,
    context: OpContext,
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn schema_statements<DB: SqlDatabase>(
    actor_type: &crate::storage::schema::ActorType,
) -> Vec<String> {
    use crate::storage::schema::{COMMANDS, EVENTS, ID_MAP, SNAPSHOTS};

    let mut statements = Vec::new();
    for relation in [&EVENTS, &COMMANDS, &SNAPSHOTS, &ID_MAP] {
        statements.push(DB::build_table(&relation.create_table(actor_type)));
        statements.extend(
            relation
                .create_indexes(actor_type)
                .iter()
                .map(DB::build_index),
        );
    }
    statements
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
fn bind(params: Vec<Value>) -> sea_query_binder::SqlxValues {
    sea_query_binder::SqlxValues(sea_query::Values(params))
}

/// Implement row access, [`RecordEngine`] and [`RecordTx`] for one backend.
macro_rules! impl_record_engine {
    ($marker:ty, $db:ty, $row:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl RowReader for $row {
            fn text(&self, column: &str) -> std::result::Result<String, ColumnError> {
                sqlx::Row::try_get(self, column).map_err(ColumnError::Driver)
            }

            fn opt_text(&self, column: &str) -> std::result::Result<Option<String>, ColumnError> {
                sqlx::Row::try_get(self, column).map_err(ColumnError::Driver)
            }

            fn int(&self, column: &str) -> std::result::Result<i64, ColumnError> {
                sqlx::Row::try_get(self, column).map_err(ColumnError::Driver)
            }

            fn opt_int(&self, column: &str) -> std::result::Result<Option<i64>, ColumnError> {
                sqlx::Row::try_get(self, column).map_err(ColumnError::Driver)
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait]
        impl RecordEngine for SqlEngine<$marker> {
            type Tx = SqlTx<$marker>;

            fn name(&self) -> &'static str {
                <$marker as SqlDatabase>::NAME
            }

            async fn begin(&self, context: &OpContext) -> Result<Self::Tx> {
                let tx = self.pool.begin().await.map_err(|e| context.classify(e))?;
                Ok(SqlTx {
                    tx,
                    context: context.clone(),
                })
            }

            async fn fetch_optional<R: FromRow>(
                &self,
                context: &OpContext,
                sql: &str,
                params: Vec<Value>,
            ) -> Result<Option<R>> {
                let row = sqlx::query_with::<$db, _>(sql, bind(params))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| context.classify(e))?;
                row.map(|row| R::from_row(&row).map_err(|e| e.into_storage(context)))
                    .transpose()
            }

            async fn fetch_all<R: FromRow>(
                &self,
                context: &OpContext,
                sql: &str,
                params: Vec<Value>,
            ) -> Result<Vec<R>> {
                let rows = sqlx::query_with::<$db, _>(sql, bind(params))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| context.classify(e))?;
                rows.iter()
                    .map(|row| R::from_row(row).map_err(|e| e.into_storage(context)))
                    .collect()
            }

            async fn execute_script(
                &self,
                context: &OpContext,
                statements: &[String],
            ) -> Result<()> {
                let mut conn = self.pool.acquire().await.map_err(|e| context.classify(e))?;
                for statement in statements {
                    sqlx::query::<$db>(statement)
                        .execute(&mut *conn)
                        .await
                        .map_err(|e| context.classify(e))?;
                }
                Ok(())
            }

            fn schema(&self, actor_type: &crate::storage::schema::ActorType) -> Vec<String> {
                schema_statements::<$marker>(actor_type)
            }

            async fn close(&self) {
                self.pool.close().await;
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait]
        impl RecordTx for SqlTx<$marker> {
            async fn execute(&mut self, sql: &str, params: Vec<Value>) -> Result<u64> {
                let result = sqlx::query_with::<$db, _>(sql, bind(params))
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| self.context.classify(e))?;
                Ok(result.rows_affected())
            }

            async fn fetch_optional<R: FromRow>(
                &mut self,
                sql: &str,
                params: Vec<Value>,
            ) -> Result<Option<R>> {
                let row = sqlx::query_with::<$db, _>(sql, bind(params))
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(|e| self.context.classify(e))?;
                let context = &self.context;
                row.map(|row| R::from_row(&row).map_err(|e| e.into_storage(context)))
                    .transpose()
            }

            async fn lock(&mut self, key: &str) -> Result<()> {
                if let Some(sql) = <$marker as SqlDatabase>::actor_lock() {
                    sqlx::query::<$db>(sql)
                        .bind(key.to_string())
                        .execute(&mut *self.tx)
                        .await
                        .map_err(|e| self.context.classify(e))?;
                }
                Ok(())
            }

            async fn commit(self) -> Result<()> {
                let context = self.context;
                self.tx.commit().await.map_err(|e| context.classify(e))
            }
        }
    };
}

impl_record_engine!(
    super::sqlite::Sqlite,
    sqlx::Sqlite,
    sqlx::sqlite::SqliteRow,
    "sqlite"
);
impl_record_engine!(
    super::postgres::Postgres,
    sqlx::Postgres,
    sqlx::postgres::PgRow,
    "postgres"
);
