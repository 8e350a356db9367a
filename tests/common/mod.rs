//! Common test utilities for trellosa integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.trellosa` directory, plus fixture snapshots written
//! through the library.

#![allow(dead_code)]

use assert_cmd::Command;
use chrono::{TimeZone, Utc};
pub use tempfile::TempDir;

use trellosa::models::{
    Card, CustomField, CustomFieldItem, LABEL_ACTION_REQUIRED, LABEL_OK, Label, LabelRef, List,
    SECURITY_NOTES_FIELD, Snapshot,
};
use trellosa::storage::{SnapshotStore, TagStore};

pub const NOTES_FIELD_ID: &str = "cf-notes";
pub const OK_LABEL_ID: &str = "lb-ok";
pub const ACTION_LABEL_ID: &str = "lb-action";

/// A test environment with an isolated working directory.
///
/// The `trellosa()` method returns a `Command` that sets `TRELLOSA_WORKDIR`
/// per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub work_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with an empty working directory.
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a test environment holding the given fixture snapshots.
    pub fn with_snapshots(snapshots: &[Snapshot]) -> Self {
        let env = Self::new();
        let store = SnapshotStore::open(env.path()).unwrap();
        for snapshot in snapshots {
            store.write(snapshot).unwrap();
        }
        env
    }

    /// Get a Command for the trellosa binary with isolated working directory.
    ///
    /// Token variables from the caller's environment are removed.
    pub fn trellosa(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_trellosa"));
        cmd.env("TRELLOSA_WORKDIR", self.work_dir.path());
        cmd.env_remove("TRELLOSA_TRELLO_TOKEN");
        cmd.env_remove("TRELLOSA_BUGZILLA_TOKEN");
        cmd.env_remove("TRELLOSA_LOG");
        cmd
    }

    pub fn path(&self) -> &std::path::Path {
        self.work_dir.path()
    }

    pub fn tag(&self, tag: &str, handle: &str) {
        let mut tags = TagStore::open(self.path()).unwrap();
        tags.add(tag, &trellosa::models::Handle::parse(handle).unwrap())
            .unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle of the fixture board captured at `minute`.
pub fn handle(minute: u32) -> String {
    format!("2021-08-02Z09-{:02}-00", minute)
}

/// A small board with the well-known labels, the notes field, and four lists.
pub fn board(minute: u32) -> Snapshot {
    let mut snapshot = Snapshot::new(Utc.with_ymd_and_hms(2021, 8, 2, 9, minute, 0).unwrap());
    snapshot.meta.board.id = "board".to_string();
    snapshot.meta.board.name = "Firefox".to_string();
    snapshot.add_label(Label::new(OK_LABEL_ID, LABEL_OK));
    snapshot.add_label(Label::new(ACTION_LABEL_ID, LABEL_ACTION_REQUIRED));
    snapshot.add_custom_field(CustomField::new(NOTES_FIELD_ID, SECURITY_NOTES_FIELD));
    snapshot.add_list(List::new("l-backlog", "Backlog"));
    snapshot.add_list(List::new("l-about", "About:This Board"));
    snapshot.add_list(List::new("l-91", "Fx91 Beta"));
    snapshot.add_list(List::new("l-92", "Fx 92"));
    snapshot
}

/// A card in `list`, optionally carrying a security note and a label.
pub fn card(id: &str, name: &str, list: &str, note: Option<&str>, label: Option<&str>) -> Card {
    let mut card = Card::new(id, name, list);
    if let Some(note) = note {
        card.custom_field_items
            .push(CustomFieldItem::text_item(NOTES_FIELD_ID, note));
    }
    if let Some(label_id) = label {
        let name = if label_id == OK_LABEL_ID {
            LABEL_OK
        } else {
            LABEL_ACTION_REQUIRED
        };
        card.labels.push(LabelRef::new(label_id, name));
    }
    card
}
