//! Relation descriptors.
//!
//! Each actor type owns four relations, named `<actor_type>_<suffix>`. A
//! [`Relation`] describes one of them (suffix, columns, key, indexes) and
//! produces the sea-query statements the record-store engine needs, so the
//! four stores share one engine instead of four hand-written ones.

use std::fmt;

use sea_query::{
    Alias, ColumnDef, Expr, Iden, Index, IndexCreateStatement, InsertStatement, Order, Query,
    SelectStatement, Table, TableCreateStatement,
};

/// Normalized actor type name.
///
/// Actor types are case-insensitive: `"Player"` and `"player"` address the
/// same relations. Names must start with an ASCII letter and contain only
/// ASCII alphanumerics or `_`, since they become part of table names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorType(String);

impl ActorType {
    /// `None` for names that cannot be table prefixes. Store operations
    /// go through [`OpContext::parse_actor_type`](super::OpContext::parse_actor_type),
    /// which reports the failing operation.
    pub fn parse(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        valid.then(|| Self(name.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Table name for one of this actor type's relations.
    pub fn table(&self, relation: &Relation) -> Alias {
        Alias::new(format!("{}_{}", self.0, relation.suffix))
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every column used by any relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    ActorId,
    ActorType,
    CreatedBy,
    CreatedById,
    Type,
    Sequence,
    Data,
    CreatedOn,
    ReceivedOn,
    HandledBy,
    HandledOn,
    HandledVersion,
    Version,
    Position,
    EventsApplied,
    LastEventId,
    LastCommandId,
    LastCommandOn,
    LastEventOn,
    Identifiers,
}

/// Column kinds, mapped to portable SQL types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    /// UUIDs, names, RFC 3339 timestamps, JSON payloads.
    Text,
    Integer,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::ActorId => "actor_id",
            Column::ActorType => "actor_type",
            Column::CreatedBy => "created_by",
            Column::CreatedById => "created_by_id",
            Column::Type => "type",
            Column::Sequence => "sequence",
            Column::Data => "data",
            Column::CreatedOn => "created_on",
            Column::ReceivedOn => "received_on",
            Column::HandledBy => "handled_by",
            Column::HandledOn => "handled_on",
            Column::HandledVersion => "handled_version",
            Column::Version => "version",
            Column::Position => "position",
            Column::EventsApplied => "events_applied",
            Column::LastEventId => "last_event_id",
            Column::LastCommandId => "last_command_id",
            Column::LastCommandOn => "last_command_on",
            Column::LastEventOn => "last_event_on",
            Column::Identifiers => "identifiers",
        }
    }

    fn kind(self) -> ColumnKind {
        match self {
            Column::Sequence
            | Column::HandledVersion
            | Column::Version
            | Column::Position
            | Column::EventsApplied => ColumnKind::Integer,
            _ => ColumnKind::Text,
        }
    }

    fn nullable(self) -> bool {
        matches!(
            self,
            Column::HandledBy
                | Column::HandledOn
                | Column::HandledVersion
                | Column::LastCommandOn
                | Column::LastEventOn
        )
    }

    fn def(self) -> ColumnDef {
        let mut def = ColumnDef::new(self);
        match self.kind() {
            ColumnKind::Text => def.text(),
            ColumnKind::Integer => def.big_integer(),
        };
        if self.nullable() {
            def.null();
        } else {
            def.not_null();
        }
        def
    }
}

impl Iden for Column {
    fn unquoted(&self, s: &mut dyn fmt::Write) {
        // Writing to the query builder's String buffer cannot fail.
        let _ = s.write_str(self.as_str());
    }
}

/// A per-actor ordinal assigned inside the insert statement as
/// `MAX(column) + 1` over the rows sharing `scope`.
#[derive(Debug, Clone, Copy)]
pub struct Ordinal {
    pub column: Column,
    pub scope: Column,
}

/// Secondary index on a relation.
#[derive(Debug, Clone, Copy)]
pub struct IndexSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub unique: bool,
}

/// Table/column/key descriptor for one relation family.
#[derive(Debug)]
pub struct Relation {
    pub suffix: &'static str,
    /// All columns, in select order.
    pub columns: &'static [Column],
    pub primary_key: &'static [Column],
    pub indexes: &'static [IndexSpec],
    pub ordinal: Option<Ordinal>,
    /// Insert as `ON CONFLICT (primary key) DO NOTHING`.
    pub insert_ignores_conflict: bool,
}

/// `<actor>_events`
pub static EVENTS: Relation = Relation {
    suffix: "events",
    columns: &[
        Column::Id,
        Column::ActorId,
        Column::ActorType,
        Column::CreatedBy,
        Column::CreatedById,
        Column::Type,
        Column::Sequence,
        Column::Data,
        Column::CreatedOn,
    ],
    primary_key: &[Column::ActorId, Column::Sequence],
    indexes: &[IndexSpec {
        name: "id",
        columns: &[Column::Id],
        unique: true,
    }],
    ordinal: Some(Ordinal {
        column: Column::Sequence,
        scope: Column::ActorId,
    }),
    insert_ignores_conflict: false,
};

/// `<actor>_commands`
pub static COMMANDS: Relation = Relation {
    suffix: "commands",
    columns: &[
        Column::Id,
        Column::Type,
        Column::Data,
        Column::ReceivedOn,
        Column::CreatedOn,
        Column::HandledBy,
        Column::HandledOn,
        Column::HandledVersion,
    ],
    primary_key: &[Column::Id],
    indexes: &[],
    ordinal: None,
    insert_ignores_conflict: false,
};

/// `<actor>_snapshots`
pub static SNAPSHOTS: Relation = Relation {
    suffix: "snapshots",
    columns: &[
        Column::Id,
        Column::ActorId,
        Column::Type,
        Column::Version,
        Column::Position,
        Column::CreatedOn,
        Column::EventsApplied,
        Column::LastEventId,
        Column::LastCommandId,
        Column::LastCommandOn,
        Column::LastEventOn,
        Column::Data,
    ],
    primary_key: &[Column::Id],
    indexes: &[IndexSpec {
        name: "latest",
        columns: &[Column::ActorId, Column::Version, Column::Position],
        unique: false,
    }],
    ordinal: Some(Ordinal {
        column: Column::Position,
        scope: Column::ActorId,
    }),
    insert_ignores_conflict: false,
};

/// `<actor>_id_map`
pub static ID_MAP: Relation = Relation {
    suffix: "id_map",
    columns: &[Column::Identifiers, Column::ActorId],
    primary_key: &[Column::Identifiers],
    indexes: &[IndexSpec {
        name: "actor",
        columns: &[Column::ActorId],
        unique: false,
    }],
    ordinal: None,
    insert_ignores_conflict: true,
};

/// Placeholder bound in statements rendered as parameterized text.
fn param() -> Expr {
    Expr::val("")
}

impl Relation {
    /// Columns supplied by the caller on insert (everything but the ordinal).
    pub fn inserted_columns(&self) -> impl Iterator<Item = Column> + '_ {
        let ordinal = self.ordinal.map(|o| o.column);
        self.columns
            .iter()
            .copied()
            .filter(move |c| Some(*c) != ordinal)
    }

    pub fn create_table(&self, actor: &ActorType) -> TableCreateStatement {
        let mut stmt = Table::create();
        stmt.table(actor.table(self)).if_not_exists();
        for column in self.columns {
            stmt.col(column.def());
        }
        let mut pk = Index::create();
        for column in self.primary_key {
            pk.col(*column);
        }
        stmt.primary_key(&mut pk);
        stmt
    }

    pub fn create_indexes(&self, actor: &ActorType) -> Vec<IndexCreateStatement> {
        self.indexes
            .iter()
            .map(|spec| {
                let mut stmt = Index::create();
                stmt.if_not_exists()
                    .name(format!("idx_{}_{}_{}", actor, self.suffix, spec.name))
                    .table(actor.table(self));
                for column in spec.columns {
                    stmt.col(*column);
                }
                if spec.unique {
                    stmt.unique();
                }
                stmt
            })
            .collect()
    }

    /// Insert one row.
    ///
    /// Parameters: the inserted columns in order, then (for relations with an
    /// ordinal) the scope value once more for the `MAX` subquery.
    pub fn insert(&self, actor: &ActorType) -> Option<InsertStatement> {
        let table = actor.table(self);
        let mut stmt = Query::insert();
        stmt.into_table(table.clone());

        match self.ordinal {
            Some(ordinal) => {
                stmt.columns(self.inserted_columns().chain([ordinal.column]));
                let mut select = Query::select();
                for _ in self.inserted_columns() {
                    select.expr(param());
                }
                select
                    .expr(Expr::cust(format!(
                        "COALESCE(MAX(\"{}\"), 0) + 1",
                        ordinal.column.as_str()
                    )))
                    .from(table)
                    .and_where(Expr::col(ordinal.scope).eq(""));
                stmt.select_from(select).ok()?;
            }
            None => {
                stmt.columns(self.inserted_columns());
                stmt.values(self.inserted_columns().map(|_| param().into()))
                    .ok()?;
                if self.insert_ignores_conflict {
                    let mut on_conflict =
                        sea_query::OnConflict::columns(self.primary_key.iter().copied());
                    on_conflict.do_nothing();
                    stmt.on_conflict(on_conflict);
                }
            }
        }
        Some(stmt)
    }

    /// Select all columns of the row matching the primary key.
    ///
    /// Parameters: the primary key columns in order.
    pub fn select_by_key(&self, actor: &ActorType) -> SelectStatement {
        let mut stmt = self.select_all(actor);
        for column in self.primary_key {
            stmt.and_where(Expr::col(*column).eq(""));
        }
        stmt
    }

    /// Select all columns, no filter.
    pub fn select_all(&self, actor: &ActorType) -> SelectStatement {
        let mut stmt = Query::select();
        stmt.columns(self.columns.iter().copied())
            .from(actor.table(self));
        stmt
    }

    /// Rows of one scope (actor) ordered by `order` descending, newest first.
    pub fn select_latest(&self, actor: &ActorType, order: &[Column]) -> SelectStatement {
        let mut stmt = self.select_all(actor);
        if let Some(ordinal) = self.ordinal {
            stmt.and_where(Expr::col(ordinal.scope).eq(""));
        }
        for column in order {
            stmt.order_by(*column, Order::Desc);
        }
        stmt
    }
}
