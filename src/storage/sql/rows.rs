//! Column encoding for the four record types.
//!
//! Ids are stored as hyphenated UUID text, timestamps as RFC 3339 text with
//! nanosecond precision, counters as BIGINT and payloads as JSON text, so
//! the same rows read back identically on every backend.

use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::Value;
use uuid::Uuid;

use super::engine::{ColumnError, FromRow, RowReader};
use super::record_store::Record;
use crate::records::{CommandRecord, EventRecord, Handled, IdMapping, IdentifierSet, Snapshot};
use crate::storage::schema::{self, Column, Relation};
use crate::storage::templates::QueryKey;

type ColumnResult<T> = std::result::Result<T, ColumnError>;

/// Alias of the `MAX(sequence)` column in [`QueryKey::SelectLastSequence`].
pub const LAST_SEQUENCE: &str = "last_sequence";

pub(crate) fn uuid_value(id: Uuid) -> Value {
    Value::from(id.to_string())
}

pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn timestamp_value(at: &DateTime<Utc>) -> Value {
    Value::from(format_timestamp(at))
}

fn opt_timestamp_value(at: Option<&DateTime<Utc>>) -> Value {
    Value::from(at.map(format_timestamp))
}

pub(crate) fn int_value(column: Column, n: u64) -> ColumnResult<Value> {
    i64::try_from(n)
        .map(Value::from)
        .map_err(|_| ColumnError::invalid(column.as_str(), n))
}

fn json_value(data: &serde_json::Value) -> ColumnResult<Value> {
    serde_json::to_string(data)
        .map(Value::from)
        .map_err(ColumnError::Payload)
}

fn parse_uuid(column: Column, text: String) -> ColumnResult<Uuid> {
    Uuid::parse_str(&text).map_err(|_| ColumnError::invalid(column.as_str(), text))
}

fn parse_timestamp(column: Column, text: String) -> ColumnResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| ColumnError::invalid(column.as_str(), text))
}

fn to_u64(column: Column, n: i64) -> ColumnResult<u64> {
    u64::try_from(n).map_err(|_| ColumnError::invalid(column.as_str(), n))
}

fn read_uuid(row: &dyn RowReader, column: Column) -> ColumnResult<Uuid> {
    parse_uuid(column, row.text(column.as_str())?)
}

fn read_opt_uuid(row: &dyn RowReader, column: Column) -> ColumnResult<Option<Uuid>> {
    row.opt_text(column.as_str())?
        .map(|text| parse_uuid(column, text))
        .transpose()
}

fn read_timestamp(row: &dyn RowReader, column: Column) -> ColumnResult<DateTime<Utc>> {
    parse_timestamp(column, row.text(column.as_str())?)
}

fn read_opt_timestamp(row: &dyn RowReader, column: Column) -> ColumnResult<Option<DateTime<Utc>>> {
    row.opt_text(column.as_str())?
        .map(|text| parse_timestamp(column, text))
        .transpose()
}

fn read_u64(row: &dyn RowReader, column: Column) -> ColumnResult<u64> {
    to_u64(column, row.int(column.as_str())?)
}

fn read_opt_u64(row: &dyn RowReader, column: Column) -> ColumnResult<Option<u64>> {
    row.opt_int(column.as_str())?
        .map(|n| to_u64(column, n))
        .transpose()
}

fn read_json(row: &dyn RowReader, column: Column) -> ColumnResult<serde_json::Value> {
    serde_json::from_str(&row.text(column.as_str())?).map_err(ColumnError::Payload)
}

/// Sequence of one event, as read by [`QueryKey::SelectEventMarker`].
pub struct SequenceNumber(pub u64);

impl FromRow for SequenceNumber {
    fn from_row(row: &dyn RowReader) -> ColumnResult<Self> {
        read_u64(row, Column::Sequence).map(Self)
    }
}

/// Highest sequence of an actor, 0 when it has no events.
pub struct LastSequence(pub u64);

impl FromRow for LastSequence {
    fn from_row(row: &dyn RowReader) -> ColumnResult<Self> {
        let last = row
            .opt_int(LAST_SEQUENCE)?
            .map(|n| to_u64(Column::Sequence, n))
            .transpose()?;
        Ok(Self(last.unwrap_or(0)))
    }
}

impl FromRow for IdMapping {
    fn from_row(row: &dyn RowReader) -> ColumnResult<Self> {
        let identifiers = IdentifierSet::from_canonical(&row.text(Column::Identifiers.as_str())?)
            .map_err(ColumnError::Payload)?;
        Ok(Self {
            identifiers,
            actor_id: read_uuid(row, Column::ActorId)?,
        })
    }
}

impl Record for IdMapping {
    const INSERT: QueryKey = QueryKey::InsertIdentifiers;

    fn relation() -> &'static Relation {
        &schema::ID_MAP
    }

    fn column(&self, column: Column) -> ColumnResult<Value> {
        match column {
            Column::Identifiers => self
                .identifiers
                .canonical()
                .map(Value::from)
                .map_err(ColumnError::Payload),
            Column::ActorId => Ok(uuid_value(self.actor_id)),
            other => Err(ColumnError::Unmapped(other.as_str())),
        }
    }
}

impl FromRow for CommandRecord {
    fn from_row(row: &dyn RowReader) -> ColumnResult<Self> {
        let handled = match (
            read_opt_uuid(row, Column::HandledBy)?,
            read_opt_timestamp(row, Column::HandledOn)?,
            read_opt_u64(row, Column::HandledVersion)?,
        ) {
            (Some(by), Some(on), Some(version)) => Some(Handled { by, on, version }),
            (None, None, None) => None,
            _ => {
                return Err(ColumnError::invalid(
                    Column::HandledBy.as_str(),
                    "partially populated handled_* columns",
                ))
            }
        };
        Ok(Self {
            id: read_uuid(row, Column::Id)?,
            command_type: row.text(Column::Type.as_str())?,
            data: read_json(row, Column::Data)?,
            received_on: read_timestamp(row, Column::ReceivedOn)?,
            created_on: read_timestamp(row, Column::CreatedOn)?,
            handled,
        })
    }
}

impl Record for CommandRecord {
    const INSERT: QueryKey = QueryKey::InsertCommand;

    fn relation() -> &'static Relation {
        &schema::COMMANDS
    }

    fn column(&self, column: Column) -> ColumnResult<Value> {
        match column {
            Column::Id => Ok(uuid_value(self.id)),
            Column::Type => Ok(Value::from(self.command_type.clone())),
            Column::Data => json_value(&self.data),
            Column::ReceivedOn => Ok(timestamp_value(&self.received_on)),
            Column::CreatedOn => Ok(timestamp_value(&self.created_on)),
            Column::HandledBy => Ok(Value::from(self.handled.map(|h| h.by.to_string()))),
            Column::HandledOn => Ok(opt_timestamp_value(self.handled.as_ref().map(|h| &h.on))),
            Column::HandledVersion => match self.handled {
                Some(h) => int_value(column, h.version),
                None => Ok(Value::from(None::<i64>)),
            },
            other => Err(ColumnError::Unmapped(other.as_str())),
        }
    }
}

impl FromRow for EventRecord {
    fn from_row(row: &dyn RowReader) -> ColumnResult<Self> {
        Ok(Self {
            id: read_uuid(row, Column::Id)?,
            actor_id: read_uuid(row, Column::ActorId)?,
            actor_type: row.text(Column::ActorType.as_str())?,
            created_by: row.text(Column::CreatedBy.as_str())?,
            created_by_id: read_uuid(row, Column::CreatedById)?,
            event_type: row.text(Column::Type.as_str())?,
            data: read_json(row, Column::Data)?,
            sequence: read_u64(row, Column::Sequence)?,
            created_on: read_timestamp(row, Column::CreatedOn)?,
        })
    }
}

impl Record for EventRecord {
    const INSERT: QueryKey = QueryKey::InsertEvent;

    fn relation() -> &'static Relation {
        &schema::EVENTS
    }

    fn column(&self, column: Column) -> ColumnResult<Value> {
        match column {
            Column::Id => Ok(uuid_value(self.id)),
            Column::ActorId => Ok(uuid_value(self.actor_id)),
            Column::ActorType => Ok(Value::from(self.actor_type.clone())),
            Column::CreatedBy => Ok(Value::from(self.created_by.clone())),
            Column::CreatedById => Ok(uuid_value(self.created_by_id)),
            Column::Type => Ok(Value::from(self.event_type.clone())),
            Column::Data => json_value(&self.data),
            Column::CreatedOn => Ok(timestamp_value(&self.created_on)),
            other => Err(ColumnError::Unmapped(other.as_str())),
        }
    }
}

impl FromRow for Snapshot {
    fn from_row(row: &dyn RowReader) -> ColumnResult<Self> {
        Ok(Self {
            id: read_uuid(row, Column::Id)?,
            actor_id: read_uuid(row, Column::ActorId)?,
            snapshot_type: row.text(Column::Type.as_str())?,
            version: read_u64(row, Column::Version)?,
            created_on: read_timestamp(row, Column::CreatedOn)?,
            events_applied: read_u64(row, Column::EventsApplied)?,
            last_event_id: read_uuid(row, Column::LastEventId)?,
            last_command_id: read_uuid(row, Column::LastCommandId)?,
            last_command_on: read_opt_timestamp(row, Column::LastCommandOn)?,
            last_event_on: read_opt_timestamp(row, Column::LastEventOn)?,
            data: read_json(row, Column::Data)?,
        })
    }
}

impl Record for Snapshot {
    const INSERT: QueryKey = QueryKey::InsertSnapshot;

    fn relation() -> &'static Relation {
        &schema::SNAPSHOTS
    }

    fn column(&self, column: Column) -> ColumnResult<Value> {
        match column {
            Column::Id => Ok(uuid_value(self.id)),
            Column::ActorId => Ok(uuid_value(self.actor_id)),
            Column::Type => Ok(Value::from(self.snapshot_type.clone())),
            Column::Version => int_value(column, self.version),
            Column::CreatedOn => Ok(timestamp_value(&self.created_on)),
            Column::EventsApplied => int_value(column, self.events_applied),
            Column::LastEventId => Ok(uuid_value(self.last_event_id)),
            Column::LastCommandId => Ok(uuid_value(self.last_command_id)),
            Column::LastCommandOn => Ok(opt_timestamp_value(self.last_command_on.as_ref())),
            Column::LastEventOn => Ok(opt_timestamp_value(self.last_event_on.as_ref())),
            Column::Data => json_value(&self.data),
            other => Err(ColumnError::Unmapped(other.as_str())),
        }
    }
}
