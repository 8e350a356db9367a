//! `trellosa log`: list stored snapshots or dump one.

use serde::Serialize;

use super::{Context, Output, json_of};
use crate::Result;
use crate::models::Snapshot;
use crate::storage::{SnapshotStore, TagStore};

/// One stored snapshot. `number` is its reference number, 1 being the latest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub number: usize,
    pub handle: String,
    pub tags: Vec<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum LogResult {
    List { snapshots: Vec<LogEntry> },
    Show { handle: String, snapshot: Snapshot },
}

impl Output for LogResult {
    fn to_json(&self) -> String {
        match self {
            LogResult::Show { snapshot, .. } => json_of(snapshot),
            list => json_of(list),
        }
    }

    fn to_human(&self) -> String {
        match self {
            LogResult::List { snapshots } if snapshots.is_empty() => {
                "No snapshots stored. Run `trellosa pull` first.".to_string()
            }
            LogResult::List { snapshots } => snapshots
                .iter()
                .map(|e| {
                    if e.tags.is_empty() {
                        format!("{}: {}", e.number, e.handle)
                    } else {
                        format!("{}: {} [{}]", e.number, e.handle, e.tags.join(","))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
            LogResult::Show { snapshot, .. } => {
                serde_json::to_string_pretty(snapshot).unwrap_or_default()
            }
        }
    }
}

/// Stored snapshots oldest first, numbered so the latest is 1.
pub fn entries(store: &SnapshotStore, tags: &TagStore) -> Result<Vec<LogEntry>> {
    let handles = store.list()?;
    let total = handles.len();
    Ok(handles
        .iter()
        .enumerate()
        .map(|(i, handle)| LogEntry {
            number: total - i,
            handle: handle.to_string(),
            tags: tags.handle_to_tags(handle),
        })
        .collect())
}

pub fn log(ctx: &Context, show: Option<&str>) -> Result<LogResult> {
    let store = ctx.store()?;
    let tags = ctx.tags()?;
    match show {
        None => Ok(LogResult::List {
            snapshots: entries(&store, &tags)?,
        }),
        Some(reference) => {
            let (handle, snapshot) = ctx.load(&store, &tags, reference, false)?;
            Ok(LogResult::Show {
                handle: handle.to_string(),
                snapshot,
            })
        }
    }
}
