//! Data models for board and tracker snapshots.
//!
//! This module defines the core data structures:
//! - `Snapshot` - An immutable point-in-time capture of the board (and optionally the tracker)
//! - `Card`, `List`, `Label`, `CustomField` - Board entities, keyed by their Trello ids
//! - `Bug` - A tracker issue, keyed by its numeric id rendered as a string
//! - `Handle` - The identifier of a stored (or live) snapshot
//!
//! Every entity keeps the fields the API returned but we don't model in an
//! `extra` map, so the structural differ still sees them.

pub mod parse;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// `strftime` format of a stored snapshot handle (UTC).
pub const HANDLE_FORMAT: &str = "%Y-%m-%dZ%H-%M-%S";

/// Sentinel handle name for a live fetch that is never persisted.
pub const ONLINE_HANDLE: &str = "online";

/// Name of the custom field holding the tracker reference.
pub const SECURITY_NOTES_FIELD: &str = "Security Notes";

/// Prefix shared by all triage labels.
pub const TRIAGE_LABEL_PREFIX: &str = "Security Triage:";

/// Well-known label names.
pub const LABEL_OK: &str = "Security Triage: OK";
pub const LABEL_ACTION_REQUIRED: &str = "Security Triage: Action required";

/// Identifier of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Handle {
    /// A snapshot persisted in the store, named after its capture time.
    Stored(String),
    /// Fetch live, do not persist.
    Online,
}

impl Handle {
    /// Parse a handle string, validating the timestamp format.
    pub fn parse(s: &str) -> Result<Self> {
        if s == ONLINE_HANDLE {
            return Ok(Handle::Online);
        }
        NaiveDateTime::parse_from_str(s, HANDLE_FORMAT)
            .map_err(|_| Error::InvalidHandle(s.to_string()))?;
        Ok(Handle::Stored(s.to_string()))
    }

    /// Derive the handle of a snapshot captured at `at`.
    pub fn from_time(at: DateTime<Utc>) -> Self {
        Handle::Stored(at.format(HANDLE_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Handle::Stored(s) => s,
            Handle::Online => ONLINE_HANDLE,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Handle::Online)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capture metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// When the snapshot was taken (UTC)
    pub captured_at: DateTime<Utc>,

    /// The board object as returned by the API
    #[serde(default)]
    pub board: BoardMeta,
}

/// Board-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardMeta {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An immutable point-in-time capture of the board, optionally combined with tracker data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,

    #[serde(default)]
    pub cards: BTreeMap<String, Card>,

    #[serde(default)]
    pub lists: BTreeMap<String, List>,

    #[serde(default)]
    pub labels: BTreeMap<String, Label>,

    #[serde(default)]
    pub custom_fields: BTreeMap<String, CustomField>,

    /// Tracker issues, present when the snapshot was combined with tracker data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bugs: BTreeMap<String, Bug>,
}

impl Snapshot {
    /// Create an empty snapshot captured at `captured_at`.
    pub fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            meta: SnapshotMeta {
                captured_at,
                board: BoardMeta::default(),
            },
            cards: BTreeMap::new(),
            lists: BTreeMap::new(),
            labels: BTreeMap::new(),
            custom_fields: BTreeMap::new(),
            bugs: BTreeMap::new(),
        }
    }

    /// The handle this snapshot is stored under.
    pub fn handle(&self) -> Handle {
        Handle::from_time(self.meta.captured_at)
    }

    /// Name of the list a card sits in, if that list is part of this snapshot.
    pub fn list_name_of(&self, card: &Card) -> Option<&str> {
        self.lists.get(&card.id_list).map(|l| l.name.as_str())
    }

    /// Insert a card, keyed by its id.
    pub fn add_card(&mut self, card: Card) {
        self.cards.insert(card.id.clone(), card);
    }

    /// Insert a list, keyed by its id.
    pub fn add_list(&mut self, list: List) {
        self.lists.insert(list.id.clone(), list);
    }

    /// Insert a label, keyed by its id.
    pub fn add_label(&mut self, label: Label) {
        self.labels.insert(label.id.clone(), label);
    }

    /// Insert a custom field, keyed by its id.
    pub fn add_custom_field(&mut self, field: CustomField) {
        self.custom_fields.insert(field.id.clone(), field);
    }

    /// Insert a bug, keyed by its id.
    pub fn add_bug(&mut self, bug: Bug) {
        self.bugs.insert(bug.id.to_string(), bug);
    }

    /// Whether tracker data was merged into this snapshot.
    pub fn has_tracker_data(&self) -> bool {
        !self.bugs.is_empty()
    }

    /// Combine tracker data into this board snapshot, replacing any previous bugs.
    pub fn merge_tracker(&mut self, tracker: TrackerSnapshot) {
        self.bugs = tracker.bugs;
    }

    /// The tracker part of this snapshot.
    pub fn tracker(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            captured_at: self.meta.captured_at,
            bugs: self.bugs.clone(),
        }
    }
}

/// Tracker bugs fetched at one instant. May be a filtered subset of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub captured_at: DateTime<Utc>,

    #[serde(default)]
    pub bugs: BTreeMap<String, Bug>,
}

impl TrackerSnapshot {
    pub fn new(captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            bugs: BTreeMap::new(),
        }
    }

    pub fn add_bug(&mut self, bug: Bug) {
        self.bugs.insert(bug.id.to_string(), bug);
    }
}

/// A unit of work on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Free-text description
    #[serde(default, rename = "desc")]
    pub description: String,

    #[serde(default)]
    pub short_url: String,

    /// Owning list
    #[serde(default)]
    pub id_list: String,

    /// Archived
    #[serde(default)]
    pub closed: bool,

    #[serde(default)]
    pub labels: Vec<LabelRef>,

    #[serde(default)]
    pub custom_field_items: Vec<CustomFieldItem>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Card {
    /// Create a card in `id_list` with no labels or custom field values.
    pub fn new(id: impl Into<String>, name: impl Into<String>, id_list: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            short_url: format!("https://trello.com/c/{}", id),
            id,
            name: name.into(),
            description: String::new(),
            id_list: id_list.into(),
            closed: false,
            labels: Vec::new(),
            custom_field_items: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Text value of a custom field, if set on this card.
    pub fn custom_text(&self, field_id: &str) -> Option<&str> {
        self.custom_field_items
            .iter()
            .find(|item| item.id_custom_field == field_id)
            .and_then(|item| item.text())
    }

    /// Names of all labels on this card.
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

/// A label as embedded in a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRef {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LabelRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }

    /// Whether this is one of the `Security Triage:` labels.
    pub fn is_triage_label(&self) -> bool {
        self.name.starts_with(TRIAGE_LABEL_PREFIX)
    }
}

/// A custom field value attached to a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldItem {
    pub id_custom_field: String,

    /// Typed value object, e.g. `{"text": "bug 1234"}`
    #[serde(default)]
    pub value: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomFieldItem {
    /// A text-valued item.
    pub fn text_item(field_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id_custom_field: field_id.into(),
            value: serde_json::json!({ "text": text.into() }),
            extra: Map::new(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.value.get("text").and_then(Value::as_str)
    }
}

/// A named column on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub closed: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl List {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            closed: false,
            extra: Map::new(),
        }
    }
}

/// A board label definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Label {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// A board custom field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomField {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }
}

/// A tracker issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bug {
    pub id: u64,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub resolution: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub target_milestone: String,

    /// See-also URL, expected to point at the card
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub summary: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bug {
    /// Create an open bug with no URL and unspecified version.
    pub fn new(id: u64, summary: impl Into<String>) -> Self {
        Self {
            id,
            status: "NEW".to_string(),
            resolution: String::new(),
            version: "unspecified".to_string(),
            target_milestone: "---".to_string(),
            url: String::new(),
            summary: summary.into(),
            extra: Map::new(),
        }
    }

    /// Short link to the bug, used in messages.
    pub fn link(&self) -> String {
        bug_link(&self.id.to_string())
    }
}

/// Short link to a bug id.
pub fn bug_link(id: &str) -> String {
    format!("https://bugzil.la/{}", id)
}
