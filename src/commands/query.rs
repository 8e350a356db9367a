//! `trellosa query`: find an entity by id.

use serde::Serialize;
use serde_json::Value;

use super::{Context, Output, json_of};
use crate::Result;
use crate::diff::filter::META_CATEGORY;
use crate::models::Snapshot;

#[derive(Serialize)]
pub struct QueryResult {
    pub handle: String,
    pub id: String,
    /// Collection the entity was found in, e.g. `cards`
    pub collection: Option<String>,
    pub entity: Option<Value>,
}

impl Output for QueryResult {
    fn to_json(&self) -> String {
        json_of(self)
    }

    fn to_human(&self) -> String {
        match (&self.collection, &self.entity) {
            (Some(collection), Some(entity)) => format!(
                "{} in {} of {}:\n{}",
                self.id,
                collection,
                self.handle,
                serde_json::to_string_pretty(entity).unwrap_or_default()
            ),
            _ => format!("No entity with id `{}` in {}", self.id, self.handle),
        }
    }
}

/// Look `id` up in every keyed collection of `snapshot`.
pub fn find(snapshot: &Snapshot, id: &str) -> Result<Option<(String, Value)>> {
    let Value::Object(root) = serde_json::to_value(snapshot)? else {
        return Ok(None);
    };
    Ok(root
        .into_iter()
        .filter(|(collection, _)| collection != META_CATEGORY)
        .find_map(|(collection, value)| match value {
            Value::Object(mut entries) => entries.remove(id).map(|e| (collection, e)),
            _ => None,
        }))
}

pub fn query(ctx: &Context, id: &str, snapshot: &str) -> Result<QueryResult> {
    let store = ctx.store()?;
    let tags = ctx.tags()?;
    let (handle, content) = ctx.load(&store, &tags, snapshot, true)?;

    let found = find(&content, id)?;
    if found.is_none() {
        tracing::warn!("No entity with id `{}` in {}", id, handle);
    }
    let (collection, entity) = found.unzip();
    Ok(QueryResult {
        handle: handle.to_string(),
        id: id.to_string(),
        collection,
        entity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{bug, board, card};

    #[test]
    fn test_find_in_any_collection() {
        let mut snapshot = board(1);
        snapshot.add_card(card("c1", "Shiny", "l-91", Some("bug 7")));
        snapshot.add_bug(bug(7, "NEW", "", ""));

        let (collection, entity) = find(&snapshot, "c1").unwrap().unwrap();
        assert_eq!(collection, "cards");
        assert_eq!(entity["name"], "Shiny");

        let (collection, _) = find(&snapshot, "l-92").unwrap().unwrap();
        assert_eq!(collection, "lists");

        let (collection, entity) = find(&snapshot, "7").unwrap().unwrap();
        assert_eq!(collection, "bugs");
        assert_eq!(entity["status"], "NEW");

        assert!(find(&snapshot, "nope").unwrap().is_none());
    }
}
