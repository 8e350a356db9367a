//! `trellosa tag`: manage snapshot tags.

use serde::Serialize;

use super::{Context, Output, json_of};
use crate::models::Handle;
use crate::storage::resolve_reference;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagEntry {
    pub tag: String,
    pub handle: String,
}

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TagResult {
    Added { tag: String, handle: String },
    Removed { tag: String, existed: bool },
    List { tags: Vec<TagEntry> },
}

impl Output for TagResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        match self {
            TagResult::Added { tag, handle } => format!("Tagged `{}` as `{}`", handle, tag),
            TagResult::Removed { tag, existed: true } => format!("Removed tag `{}`", tag),
            TagResult::Removed { tag, existed: false } => format!("No tag `{}`", tag),
            TagResult::List { tags } if tags.is_empty() => "No tags.".to_string(),
            TagResult::List { tags } => tags
                .iter()
                .map(|t| format!("{}\t{}", t.tag, t.handle))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Add or remove a tag, or list tags (optionally only those of `snapshot`).
pub fn tag(
    ctx: &Context,
    add: Option<&str>,
    remove: Option<&str>,
    snapshot: Option<&str>,
) -> Result<TagResult> {
    let store = ctx.store()?;
    let mut tags = ctx.tags()?;

    match (add, remove) {
        (Some(_), Some(_)) => Err(Error::InvalidInput(
            "`--add` and `--remove` are mutually exclusive".to_string(),
        )),
        (Some(name), None) => {
            let handle = resolve_reference(&store, &tags, snapshot.unwrap_or("1"))?;
            tracing::info!("Setting `{}` tag for snapshot `{}`", name, handle);
            tags.add(name, &handle)?;
            Ok(TagResult::Added {
                tag: name.to_string(),
                handle: handle.to_string(),
            })
        }
        (None, Some(name)) => {
            let existed = tags.remove(name)?;
            if !existed {
                tracing::warn!("Tag `{}` does not exist", name);
            }
            Ok(TagResult::Removed {
                tag: name.to_string(),
                existed,
            })
        }
        (None, None) => {
            let filter = match snapshot {
                Some(reference) => Some(resolve_reference(&store, &tags, reference)?),
                None => None,
            };
            let entries = tags
                .list()
                .into_iter()
                .filter(|(_, handle)| match &filter {
                    Some(h @ Handle::Stored(_)) => h.as_str() == handle,
                    Some(Handle::Online) => false,
                    None => true,
                })
                .map(|(tag, handle)| TagEntry { tag, handle })
                .collect();
            Ok(TagResult::List { tags: entries })
        }
    }
}
