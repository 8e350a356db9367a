//! Structural diff between two snapshot documents.
//!
//! Snapshots are compared as JSON trees. Objects are compared key by key:
//! keys only in the new tree are insertions, keys only in the old tree are
//! deletions, and keys in both with differing values recurse. Everything else
//! (scalars, arrays, type changes) becomes an `(old, new)` update leaf.
//!
//! The diff is symmetric: [`Diff::invert`] swaps insertions with deletions and
//! old with new values, so `diff(b, a) == diff(a, b).invert()`.
//!
//! Serialized form (the raw output of `trellosa diff --raw`):
//!
//! ```json
//! {"cards": {"$insert": {"c9": {...}}, "$delete": {"c1": {...}}, "c2": {"idList": ["l1", "l2"]}}}
//! ```

pub mod filter;

pub use filter::{FilterMode, NoiseFilter, filter};

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::models::Snapshot;
use crate::{Error, Result};

/// Key under which insertions are serialized.
pub const INSERT_MARKER: &str = "$insert";
/// Key under which deletions are serialized.
pub const DELETE_MARKER: &str = "$delete";

/// A node of the diff tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Both sides are equal
    Unchanged,
    /// Leaf change from `old` to `new`
    Update { old: Value, new: Value },
    /// Keyed comparison of two objects
    Object(ObjectDiff),
}

/// Differences between two objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectDiff {
    /// Keys present only in the new object, with their values
    pub inserted: BTreeMap<String, Value>,
    /// Keys present only in the old object, with their values
    pub deleted: BTreeMap<String, Value>,
    /// Keys present in both whose values differ. Never holds `Diff::Unchanged`.
    pub changed: BTreeMap<String, Diff>,
}

impl ObjectDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty() && self.changed.is_empty()
    }

    /// Sub-diff of an object-valued key that changed.
    pub fn child(&self, key: &str) -> Option<&ObjectDiff> {
        match self.changed.get(key) {
            Some(Diff::Object(obj)) => Some(obj),
            _ => None,
        }
    }

    fn invert(&self) -> ObjectDiff {
        ObjectDiff {
            inserted: self.deleted.clone(),
            deleted: self.inserted.clone(),
            changed: self
                .changed
                .iter()
                .map(|(k, d)| (k.clone(), d.invert()))
                .collect(),
        }
    }

    /// Collapse an empty object diff into `Diff::Unchanged`.
    pub fn into_diff(self) -> Diff {
        if self.is_empty() {
            Diff::Unchanged
        } else {
            Diff::Object(self)
        }
    }
}

/// One flattened change, addressed by its key path.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: Vec<String>,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Insert(Value),
    Delete(Value),
    Update { old: Value, new: Value },
}

impl Change {
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

/// Diff two snapshots.
pub fn diff(a: &Snapshot, b: &Snapshot) -> Result<Diff> {
    let a = serde_json::to_value(a)?;
    let b = serde_json::to_value(b)?;
    Ok(diff_values(&a, &b))
}

/// Diff two JSON trees.
pub fn diff_values(a: &Value, b: &Value) -> Diff {
    if a == b {
        return Diff::Unchanged;
    }
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => diff_objects(a, b).into_diff(),
        _ => Diff::Update {
            old: a.clone(),
            new: b.clone(),
        },
    }
}

fn diff_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> ObjectDiff {
    let mut result = ObjectDiff::default();
    for (key, old) in a {
        match b.get(key) {
            None => {
                result.deleted.insert(key.clone(), old.clone());
            }
            Some(new) => {
                let child = diff_values(old, new);
                if child != Diff::Unchanged {
                    result.changed.insert(key.clone(), child);
                }
            }
        }
    }
    for (key, new) in b {
        if !a.contains_key(key) {
            result.inserted.insert(key.clone(), new.clone());
        }
    }
    result
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        matches!(self, Diff::Unchanged)
    }

    pub fn as_object(&self) -> Option<&ObjectDiff> {
        match self {
            Diff::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Sub-diff of a top-level category such as `cards`.
    pub fn child(&self, key: &str) -> Option<&ObjectDiff> {
        self.as_object().and_then(|obj| obj.child(key))
    }

    /// The same diff seen from the other side.
    pub fn invert(&self) -> Diff {
        match self {
            Diff::Unchanged => Diff::Unchanged,
            Diff::Update { old, new } => Diff::Update {
                old: new.clone(),
                new: old.clone(),
            },
            Diff::Object(obj) => Diff::Object(obj.invert()),
        }
    }

    /// Apply this diff to `base`, producing the new side.
    ///
    /// Fails if `base` is not the old side this diff was computed from.
    pub fn apply(&self, base: &Value) -> Result<Value> {
        match self {
            Diff::Unchanged => Ok(base.clone()),
            Diff::Update { old, new } => {
                if base != old {
                    return Err(Error::InvalidInput(format!(
                        "diff expects {} but found {}",
                        old, base
                    )));
                }
                Ok(new.clone())
            }
            Diff::Object(obj) => {
                let Value::Object(map) = base else {
                    return Err(Error::InvalidInput(format!(
                        "diff expects an object but found {}",
                        base
                    )));
                };
                let mut out = map.clone();
                for key in obj.deleted.keys() {
                    if out.remove(key).is_none() {
                        return Err(Error::InvalidInput(format!(
                            "cannot delete missing key `{}`",
                            key
                        )));
                    }
                }
                for (key, value) in &obj.inserted {
                    if out.insert(key.clone(), value.clone()).is_some() {
                        return Err(Error::InvalidInput(format!(
                            "cannot insert existing key `{}`",
                            key
                        )));
                    }
                }
                for (key, child) in &obj.changed {
                    let current = out.get(key).ok_or_else(|| {
                        Error::InvalidInput(format!("cannot update missing key `{}`", key))
                    })?;
                    let updated = child.apply(current)?;
                    out.insert(key.clone(), updated);
                }
                Ok(Value::Object(out))
            }
        }
    }

    /// Apply this diff to a snapshot.
    pub fn apply_to_snapshot(&self, base: &Snapshot) -> Result<Snapshot> {
        let value = self.apply(&serde_json::to_value(base)?)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Every leaf change in key order, insertions and deletions first at each level.
    pub fn changes(&self) -> Vec<Change> {
        let mut out = Vec::new();
        collect_changes(self, &mut Vec::new(), &mut out);
        out
    }
}

fn collect_changes(diff: &Diff, path: &mut Vec<String>, out: &mut Vec<Change>) {
    match diff {
        Diff::Unchanged => {}
        Diff::Update { old, new } => out.push(Change {
            path: path.clone(),
            kind: ChangeKind::Update {
                old: old.clone(),
                new: new.clone(),
            },
        }),
        Diff::Object(obj) => {
            for (key, value) in &obj.inserted {
                path.push(key.clone());
                out.push(Change {
                    path: path.clone(),
                    kind: ChangeKind::Insert(value.clone()),
                });
                path.pop();
            }
            for (key, value) in &obj.deleted {
                path.push(key.clone());
                out.push(Change {
                    path: path.clone(),
                    kind: ChangeKind::Delete(value.clone()),
                });
                path.pop();
            }
            for (key, child) in &obj.changed {
                path.push(key.clone());
                collect_changes(child, path, out);
                path.pop();
            }
        }
    }
}

impl Serialize for Diff {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Diff::Unchanged => serializer.serialize_map(Some(0))?.end(),
            Diff::Update { old, new } => (old, new).serialize(serializer),
            Diff::Object(obj) => obj.serialize(serializer),
        }
    }
}

impl Serialize for ObjectDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if !self.inserted.is_empty() {
            map.serialize_entry(INSERT_MARKER, &self.inserted)?;
        }
        if !self.deleted.is_empty() {
            map.serialize_entry(DELETE_MARKER, &self.deleted)?;
        }
        for (key, child) in &self.changed {
            map.serialize_entry(key, child)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Card, List};
    use crate::test_utils::{board, card};
    use serde_json::json;

    fn pair() -> (Snapshot, Snapshot) {
        let mut a = board(0);
        a.add_card(card("c1", "Stays", "l-91", None));
        a.add_card(card("c2", "Moves", "l-91", None));
        a.add_card(card("c3", "Deleted", "l-92", None));

        let mut b = board(5);
        b.add_card(card("c1", "Stays", "l-91", None));
        b.add_card(card("c2", "Moves", "l-92", None));
        b.add_card(card("c4", "New", "l-backlog", None));
        b.add_list(List::new("l-93", "Fx 93"));
        (a, b)
    }

    #[test]
    fn test_diff_identical_is_unchanged() {
        let (a, _) = pair();
        assert!(diff(&a, &a).unwrap().is_empty());
    }

    #[test]
    fn test_diff_keyed_insert_delete_update() {
        let (a, b) = pair();
        let d = diff(&a, &b).unwrap();
        let cards = d.child("cards").unwrap();

        assert!(cards.inserted.contains_key("c4"));
        assert!(cards.deleted.contains_key("c3"));
        assert_eq!(
            cards.child("c2").unwrap().changed.get("idList"),
            Some(&Diff::Update {
                old: json!("l-91"),
                new: json!("l-92")
            })
        );
        assert!(!cards.changed.contains_key("c1"));
        assert!(d.child("lists").unwrap().inserted.contains_key("l-93"));
    }

    #[test]
    fn test_diff_is_symmetric() {
        let (a, b) = pair();
        let forward = diff(&a, &b).unwrap();
        let backward = diff(&b, &a).unwrap();

        assert_eq!(forward.invert(), backward);
        let fwd_cards = forward.child("cards").unwrap();
        let bwd_cards = backward.child("cards").unwrap();
        assert_eq!(
            fwd_cards.inserted.keys().collect::<Vec<_>>(),
            bwd_cards.deleted.keys().collect::<Vec<_>>()
        );
        assert_eq!(
            fwd_cards.deleted.keys().collect::<Vec<_>>(),
            bwd_cards.inserted.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_apply_reconstructs_target() {
        let (a, b) = pair();
        let d = diff(&a, &b).unwrap();
        assert_eq!(d.apply_to_snapshot(&a).unwrap(), b);
        assert_eq!(d.invert().apply_to_snapshot(&b).unwrap(), a);
    }

    #[test]
    fn test_apply_rejects_wrong_base() {
        let (a, b) = pair();
        let d = diff(&a, &b).unwrap();
        assert!(d.apply_to_snapshot(&b).is_err());
    }

    #[test]
    fn test_scalar_type_change_is_update_leaf() {
        let d = diff_values(&json!({"x": 1}), &json!({"x": {"y": 1}}));
        assert_eq!(
            d.as_object().unwrap().changed.get("x"),
            Some(&Diff::Update {
                old: json!(1),
                new: json!({"y": 1})
            })
        );
    }

    #[test]
    fn test_arrays_are_compared_as_leaves() {
        let mut a = board(0);
        let mut c = Card::new("c1", "Card", "l-91");
        c.labels.push(crate::models::LabelRef::new("x", "X"));
        a.add_card(c);
        let mut b = a.clone();
        b.cards.get_mut("c1").unwrap().labels.clear();

        let d = diff(&a, &b).unwrap();
        let card_diff = d.child("cards").unwrap().child("c1").unwrap();
        assert!(matches!(card_diff.changed.get("labels"), Some(Diff::Update { .. })));
    }

    #[test]
    fn test_serialized_markers() {
        let (a, b) = pair();
        let value = serde_json::to_value(diff(&a, &b).unwrap()).unwrap();
        assert!(value["cards"][INSERT_MARKER]["c4"].is_object());
        assert!(value["cards"][DELETE_MARKER]["c3"].is_object());
        assert_eq!(value["cards"]["c2"]["idList"], json!(["l-91", "l-92"]));
        assert_eq!(
            serde_json::to_value(Diff::Unchanged).unwrap(),
            json!({})
        );
    }

    #[test]
    fn test_changes_flattened_with_paths() {
        let (a, b) = pair();
        let paths: Vec<String> = diff(&a, &b)
            .unwrap()
            .changes()
            .iter()
            .map(Change::dotted_path)
            .collect();
        assert!(paths.contains(&"cards.c4".to_string()));
        assert!(paths.contains(&"cards.c3".to_string()));
        assert!(paths.contains(&"cards.c2.idList".to_string()));
        assert!(paths.contains(&"meta.captured_at".to_string()));
    }
}
