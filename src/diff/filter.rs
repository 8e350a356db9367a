//! Noise filter for structural diffs.
//!
//! Some fields change all the time without meaning anything for triage:
//! capture timestamps, computed badges, label usage counts, last-activity
//! stamps, descriptions, and the order labels happen to be listed in. In
//! `Minimal` mode those are stripped and branches left empty are pruned.
//! `Everything` mode is the identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::{Diff, ObjectDiff};

/// Top-level category holding capture metadata rather than a keyed collection.
pub const META_CATEGORY: &str = "meta";

/// Top-level category holding tracker bugs. Board-only captures omit it.
pub const TRACKER_CATEGORY: &str = "bugs";

/// Filtering mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Strip known noise
    #[default]
    Minimal,
    /// Show every change
    Everything,
}

/// Denylist of noisy fields, per top-level category.
///
/// For keyed collections (`cards`, `labels`, ...) field paths are relative to
/// each entity. For `meta` they are relative to the category itself. Paths
/// use dots to reach nested fields, e.g. `board.dateLastActivity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseFilter {
    denylist: BTreeMap<String, BTreeSet<String>>,
    unordered: BTreeMap<String, BTreeSet<String>>,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        let mut filter = Self::empty();
        filter
            .deny(META_CATEGORY, "captured_at")
            .deny(META_CATEGORY, "board.dateLastActivity")
            .deny(META_CATEGORY, "board.dateLastView")
            .deny("cards", "badges")
            .deny("cards", "dateLastActivity")
            .deny("cards", "desc")
            .deny("labels", "uses")
            .unordered("cards", "labels")
            .unordered("cards", "idLabels");
        filter
    }
}

impl NoiseFilter {
    /// A filter that strips nothing.
    pub fn empty() -> Self {
        Self {
            denylist: BTreeMap::new(),
            unordered: BTreeMap::new(),
        }
    }

    /// Treat changes to `field` of entities in `category` as noise.
    pub fn deny(&mut self, category: &str, field: &str) -> &mut Self {
        self.denylist
            .entry(category.to_string())
            .or_default()
            .insert(field.to_string());
        self
    }

    /// Ignore reorderings of the array `field` of entities in `category`.
    pub fn unordered(&mut self, category: &str, field: &str) -> &mut Self {
        self.unordered
            .entry(category.to_string())
            .or_default()
            .insert(field.to_string());
        self
    }

    /// Filter a diff according to `mode`.
    pub fn apply(&self, diff: &Diff, mode: FilterMode) -> Diff {
        if mode == FilterMode::Everything {
            return diff.clone();
        }
        let Diff::Object(root) = diff else {
            return diff.clone();
        };

        let mut root = root.clone();
        // Tracker data present on one side only means one capture was board-only
        root.inserted.remove(TRACKER_CATEGORY);
        root.deleted.remove(TRACKER_CATEGORY);
        let categories: Vec<String> = root.changed.keys().cloned().collect();
        for category in categories {
            let Some(Diff::Object(cat)) = root.changed.get_mut(&category) else {
                continue;
            };
            if category == META_CATEGORY {
                self.strip_entity(&category, cat);
            } else {
                let ids: Vec<String> = cat.changed.keys().cloned().collect();
                for id in ids {
                    if let Some(Diff::Object(entity)) = cat.changed.get_mut(&id) {
                        self.strip_entity(&category, entity);
                        if entity.is_empty() {
                            cat.changed.remove(&id);
                        }
                    }
                }
            }
            if cat.is_empty() {
                root.changed.remove(&category);
            }
        }
        root.into_diff()
    }

    fn strip_entity(&self, category: &str, entity: &mut ObjectDiff) {
        if let Some(fields) = self.denylist.get(category) {
            for field in fields {
                let path: Vec<&str> = field.split('.').collect();
                strip_path(entity, &path);
            }
        }
        if let Some(fields) = self.unordered.get(category) {
            for field in fields {
                let reordered = match entity.changed.get(field) {
                    Some(Diff::Update { old, new }) => same_elements(old, new),
                    _ => false,
                };
                if reordered {
                    entity.changed.remove(field);
                }
            }
        }
    }
}

/// Filter a diff with the default denylist.
pub fn filter(diff: &Diff, mode: FilterMode) -> Diff {
    NoiseFilter::default().apply(diff, mode)
}

fn strip_path(obj: &mut ObjectDiff, path: &[&str]) {
    match path {
        [] => {}
        [last] => {
            obj.changed.remove(*last);
            obj.inserted.remove(*last);
            obj.deleted.remove(*last);
        }
        [head, rest @ ..] => {
            let now_empty = match obj.changed.get_mut(*head) {
                Some(Diff::Object(child)) => {
                    strip_path(child, rest);
                    child.is_empty()
                }
                _ => false,
            };
            if now_empty {
                obj.changed.remove(*head);
            }
        }
    }
}

/// Both values are arrays holding the same elements, ignoring order.
fn same_elements(old: &Value, new: &Value) -> bool {
    let (Value::Array(old), Value::Array(new)) = (old, new) else {
        return false;
    };
    if old.len() != new.len() {
        return false;
    }
    let canonical = |items: &Vec<Value>| {
        let mut keys: Vec<String> = items.iter().map(Value::to_string).collect();
        keys.sort();
        keys
    };
    canonical(old) == canonical(new)
}
