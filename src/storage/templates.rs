//! Query templates.
//!
//! Query text is a pure function of `(QueryKey, actor type)`. A
//! [`QueryTemplates`] source renders it; [`TemplateSet::compile`] renders
//! every key for one actor type up front so that a missing template fails
//! when storage is built, never in the middle of an operation.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::debug;

use super::schema::ActorType;
use super::error::{OpContext, Operation};
use super::{Result, StorageError};

/// Every statement the stores issue.
///
/// The doc comment of each key lists its bind parameters in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// identifiers, actor_id
    InsertIdentifiers,
    /// identifiers
    SelectIdentifiers,
    /// id, type, data, received_on, created_on, handled_by, handled_on, handled_version
    InsertCommand,
    /// id
    SelectCommand,
    /// handled_by, handled_on, handled_version, id (only while unhandled)
    MarkCommandHandled,
    /// id, actor_id, actor_type, created_by, created_by_id, type, data, created_on, actor_id
    InsertEvent,
    /// actor_id, id
    SelectEventMarker,
    /// actor_id, after_sequence, limit
    SelectEventsAfter,
    /// actor_id
    SelectLastSequence,
    /// id, actor_id, type, version, created_on, events_applied, last_event_id,
    /// last_command_id, last_command_on, last_event_on, data, actor_id
    InsertSnapshot,
    /// actor_id, limit
    SelectLatestSnapshot,
}

impl QueryKey {
    pub const ALL: [QueryKey; 11] = [
        QueryKey::InsertIdentifiers,
        QueryKey::SelectIdentifiers,
        QueryKey::InsertCommand,
        QueryKey::SelectCommand,
        QueryKey::MarkCommandHandled,
        QueryKey::InsertEvent,
        QueryKey::SelectEventMarker,
        QueryKey::SelectEventsAfter,
        QueryKey::SelectLastSequence,
        QueryKey::InsertSnapshot,
        QueryKey::SelectLatestSnapshot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryKey::InsertIdentifiers => "insert_identifiers",
            QueryKey::SelectIdentifiers => "select_identifiers",
            QueryKey::InsertCommand => "insert_command",
            QueryKey::SelectCommand => "select_command",
            QueryKey::MarkCommandHandled => "mark_command_handled",
            QueryKey::InsertEvent => "insert_event",
            QueryKey::SelectEventMarker => "select_event_marker",
            QueryKey::SelectEventsAfter => "select_events_after",
            QueryKey::SelectLastSequence => "select_last_sequence",
            QueryKey::InsertSnapshot => "insert_snapshot",
            QueryKey::SelectLatestSnapshot => "select_latest_snapshot",
        }
    }

    /// File name used by [`StaticTemplates::load_dir`].
    pub fn file_name(self) -> String {
        format!("{}.sql", self.as_str())
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of parameterized query text.
pub trait QueryTemplates: Send + Sync {
    /// Render `key` for `actor_type`, or `None` if this source has no
    /// template for it.
    fn render(&self, key: QueryKey, actor_type: &ActorType) -> Option<String>;
}

/// Placeholder substituted with the actor type in static templates.
pub const ACTOR_PLACEHOLDER: &str = "{actor}";

/// Caller-supplied template text, `{actor}` standing for the actor type.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplates {
    templates: HashMap<QueryKey, String>,
}

impl StaticTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: QueryKey, text: impl Into<String>) -> Self {
        self.templates.insert(key, text.into());
        self
    }

    /// Load `<key>.sql` files from a directory. Keys without a file are left
    /// out and reported by [`TemplateSet::compile`].
    pub fn load_dir(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let mut templates = HashMap::new();
        for key in QueryKey::ALL {
            let path = dir.join(key.file_name());
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    templates.insert(key, text);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        debug!(dir = %dir.display(), count = templates.len(), "Loaded query templates");
        Ok(Self { templates })
    }
}

impl QueryTemplates for StaticTemplates {
    fn render(&self, key: QueryKey, actor_type: &ActorType) -> Option<String> {
        self.templates
            .get(&key)
            .map(|text| text.replace(ACTOR_PLACEHOLDER, actor_type.as_str()))
    }
}

/// All query text for one actor type, rendered and validated.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    actor_type: ActorType,
    queries: Vec<String>,
}

impl TemplateSet {
    pub fn compile(templates: &dyn QueryTemplates, actor_type: &ActorType) -> Result<Self> {
        let queries = QueryKey::ALL
            .iter()
            .map(|&key| {
                templates
                    .render(key, actor_type)
                    .ok_or_else(|| StorageError::MissingTemplate {
                        key,
                        actor_type: actor_type.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            actor_type: actor_type.clone(),
            queries,
        })
    }

    pub fn actor_type(&self) -> &ActorType {
        &self.actor_type
    }

    pub fn get(&self, key: QueryKey) -> &str {
        &self.queries[key.index()]
    }
}

/// Compiled template sets for every actor type a storage serves.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    sets: HashMap<ActorType, TemplateSet>,
}

impl TemplateCatalog {
    pub fn compile<S: AsRef<str>>(
        templates: &dyn QueryTemplates,
        actor_types: &[S],
    ) -> Result<Self> {
        let mut sets = HashMap::new();
        for name in actor_types {
            let actor_type =
                OpContext::new(Operation::CompileTemplates, name.as_ref()).parse_actor_type()?;
            let set = TemplateSet::compile(templates, &actor_type)?;
            sets.insert(actor_type, set);
        }
        Ok(Self { sets })
    }

    /// Template set for the actor type of `context`, which must be
    /// registered. Errors carry `context`.
    pub fn get(&self, context: &OpContext) -> Result<&TemplateSet> {
        let parsed = context.parse_actor_type()?;
        self.sets
            .get(&parsed)
            .ok_or_else(|| context.unregistered_actor_type())
    }
}
