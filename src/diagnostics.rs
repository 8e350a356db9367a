//! Explicit diagnostics sink.
//!
//! Core components (differ, classifier, reconciliation engine) never log on
//! their own. They push structured records into a [`Diagnostics`] value passed
//! by the caller, which later forwards them to `tracing` and attaches them to
//! command output.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a diagnostic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
}

/// What kind of condition a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Security note not in the canonical `bug NNNN` form
    NoteFormat,
    /// Card references a bug absent from the tracker snapshot
    UnresolvedReference,
    /// More than one candidate, needs manual intervention
    Ambiguity,
    /// Tracker bug not linked to any card
    Orphan,
    /// Card list carries no parseable Firefox version
    Unversioned,
    /// Unknown status, resolution or label name
    UnrecognizedValue,
    /// Card points at a list missing from the snapshot
    DroppedList,
    /// Bug URL carries extra path segments
    LongUrl,
    /// Item deliberately left alone
    Skip,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::NoteFormat => "note-format",
            Category::UnresolvedReference => "unresolved-reference",
            Category::Ambiguity => "ambiguity",
            Category::Orphan => "orphan",
            Category::Unversioned => "unversioned",
            Category::UnrecognizedValue => "unrecognized-value",
            Category::DroppedList => "dropped-list",
            Category::LongUrl => "long-url",
            Category::Skip => "skip",
        };
        f.write_str(s)
    }
}

/// A single structured diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub level: Level,
    pub category: Category,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl Record {
    /// Attach a context key/value pair.
    pub fn with(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// Collects diagnostic records in emission order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    records: Vec<Record>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a record and return a handle for attaching context.
    pub fn push(
        &mut self,
        level: Level,
        category: Category,
        message: impl Into<String>,
    ) -> &mut Record {
        self.records.push(Record {
            level,
            category,
            message: message.into(),
            context: BTreeMap::new(),
        });
        let last = self.records.len() - 1;
        &mut self.records[last]
    }

    pub fn debug(&mut self, category: Category, message: impl Into<String>) -> &mut Record {
        self.push(Level::Debug, category, message)
    }

    pub fn info(&mut self, category: Category, message: impl Into<String>) -> &mut Record {
        self.push(Level::Info, category, message)
    }

    pub fn warn(&mut self, category: Category, message: impl Into<String>) -> &mut Record {
        self.push(Level::Warn, category, message)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Records of a given category.
    pub fn of(&self, category: Category) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.category == category)
    }

    /// Forward every record to `tracing` at its level.
    pub fn emit(&self) {
        for record in &self.records {
            let context = format_context(&record.context);
            let category = record.category;
            let message = &record.message;
            match record.level {
                Level::Debug => {
                    tracing::debug!(category = %category, context = %context, "{}", message)
                }
                Level::Info => {
                    tracing::info!(category = %category, context = %context, "{}", message)
                }
                Level::Warn => {
                    tracing::warn!(category = %category, context = %context, "{}", message)
                }
            }
        }
    }
}

fn format_context(context: &BTreeMap<String, String>) -> String {
    context
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}
