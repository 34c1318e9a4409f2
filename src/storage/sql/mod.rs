//! Unified SQL storage implementation.
//!
//! One record-store engine ([`RecordStore`]) serves all four relations. It
//! is parameterized by a database backend through the `SqlDatabase` trait
//! and by a record type through [`Record`]; the per-backend pieces (row
//! access, transactions) are generated by a macro in `engine`.

mod command_store;
mod engine;
mod event_store;
mod id_map_store;
mod record_store;
mod rows;
mod snapshot_store;

use std::marker::PhantomData;

use sea_query::{IndexCreateStatement, TableCreateStatement};

use super::schema::{self, ActorType, Column};
use super::templates::{QueryKey, QueryTemplates};

pub use engine::{ColumnError, FromRow, RecordEngine, RecordTx, RowReader, SqlEngine, SqlTx};
pub use record_store::{Record, RecordStore};
pub use rows::LAST_SEQUENCE;

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the driver type and query rendering.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The sqlx driver for this database.
    type Database: sqlx::Database;

    /// Backend name for logs.
    const NAME: &'static str;

    /// Render a sea-query statement as parameterized text.
    fn build<S: sea_query::QueryStatementWriter>(stmt: &S) -> String;

    fn build_table(stmt: &TableCreateStatement) -> String;

    fn build_index(stmt: &IndexCreateStatement) -> String;

    /// Statement serializing writers of one actor inside a transaction,
    /// taking the lock key as its only parameter. `None` when the backend's
    /// write lock already serializes them.
    fn actor_lock() -> Option<&'static str>;
}

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::{
        IndexCreateStatement, PostgresQueryBuilder, QueryStatementWriter, TableCreateStatement,
    };

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Database = sqlx::Postgres;

        const NAME: &'static str = "postgres";

        fn build<S: QueryStatementWriter>(stmt: &S) -> String {
            stmt.build(PostgresQueryBuilder).0
        }

        fn build_table(stmt: &TableCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_index(stmt: &IndexCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn actor_lock() -> Option<&'static str> {
            Some("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        }
    }

    /// PostgreSQL record engine.
    pub type PostgresEngine = super::SqlEngine<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::{
        IndexCreateStatement, QueryStatementWriter, SqliteQueryBuilder, TableCreateStatement,
    };

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Database = sqlx::Sqlite;

        const NAME: &'static str = "sqlite";

        fn build<S: QueryStatementWriter>(stmt: &S) -> String {
            stmt.build(SqliteQueryBuilder).0
        }

        fn build_table(stmt: &TableCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_index(stmt: &IndexCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        // Every write transaction opens with a write statement, which takes
        // the database-wide write lock.
        fn actor_lock() -> Option<&'static str> {
            None
        }
    }

    /// SQLite record engine.
    pub type SqliteEngine = super::SqlEngine<Sqlite>;
}

/// Default templates, rendered from the relation descriptors with sea-query.
pub struct SqlTemplates<DB: SqlDatabase> {
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlTemplates<DB> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<DB: SqlDatabase> Default for SqlTemplates<DB> {
    fn default() -> Self {
        Self::new()
    }
}

impl<DB: SqlDatabase> QueryTemplates for SqlTemplates<DB> {
    fn render(&self, key: QueryKey, actor: &ActorType) -> Option<String> {
        use sea_query::{Alias, Expr, Order, Query};

        let text = match key {
            QueryKey::InsertIdentifiers => DB::build(&schema::ID_MAP.insert(actor)?),
            QueryKey::SelectIdentifiers => DB::build(&schema::ID_MAP.select_by_key(actor)),
            QueryKey::InsertCommand => DB::build(&schema::COMMANDS.insert(actor)?),
            QueryKey::SelectCommand => DB::build(&schema::COMMANDS.select_by_key(actor)),
            QueryKey::MarkCommandHandled => {
                let stmt = Query::update()
                    .table(actor.table(&schema::COMMANDS))
                    .value(Column::HandledBy, "")
                    .value(Column::HandledOn, "")
                    .value(Column::HandledVersion, 0i64)
                    .and_where(Expr::col(Column::Id).eq(""))
                    .and_where(Expr::col(Column::HandledBy).is_null())
                    .to_owned();
                DB::build(&stmt)
            }
            QueryKey::InsertEvent => DB::build(&schema::EVENTS.insert(actor)?),
            QueryKey::SelectEventMarker => {
                let stmt = Query::select()
                    .column(Column::Sequence)
                    .from(actor.table(&schema::EVENTS))
                    .and_where(Expr::col(Column::ActorId).eq(""))
                    .and_where(Expr::col(Column::Id).eq(""))
                    .to_owned();
                DB::build(&stmt)
            }
            QueryKey::SelectEventsAfter => {
                let stmt = schema::EVENTS
                    .select_all(actor)
                    .and_where(Expr::col(Column::ActorId).eq(""))
                    .and_where(Expr::col(Column::Sequence).gt(0i64))
                    .order_by(Column::Sequence, Order::Asc)
                    .limit(1)
                    .to_owned();
                DB::build(&stmt)
            }
            QueryKey::SelectLastSequence => {
                let stmt = Query::select()
                    .expr_as(
                        Expr::col(Column::Sequence).max(),
                        Alias::new(rows::LAST_SEQUENCE),
                    )
                    .from(actor.table(&schema::EVENTS))
                    .and_where(Expr::col(Column::ActorId).eq(""))
                    .to_owned();
                DB::build(&stmt)
            }
            QueryKey::InsertSnapshot => DB::build(&schema::SNAPSHOTS.insert(actor)?),
            QueryKey::SelectLatestSnapshot => {
                let stmt = schema::SNAPSHOTS
                    .select_latest(actor, &[Column::Version, Column::Position])
                    .limit(1)
                    .to_owned();
                DB::build(&stmt)
            }
        };
        Some(text)
    }
}
