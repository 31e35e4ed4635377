use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Deletion markers for one collection: top-level ids plus deleted child
/// ids per parent. A marked id stays hidden whatever its origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    #[serde(default)]
    pub ids: IndexSet<String>,
    #[serde(default, rename = "childIds")]
    pub child_ids: IndexMap<String, IndexSet<String>>,
}

impl Tombstone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn contains_child(&self, parent_id: &str, child_id: &str) -> bool {
        self.child_ids
            .get(parent_id)
            .is_some_and(|children| children.contains(child_id))
    }

    pub fn children_of(&self, parent_id: &str) -> Option<&IndexSet<String>> {
        self.child_ids.get(parent_id)
    }

    pub fn insert(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.ids.shift_remove(id)
    }

    pub fn insert_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        self.child_ids
            .entry(parent_id.to_string())
            .or_default()
            .insert(child_id.to_string())
    }

    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) -> bool {
        let Some(children) = self.child_ids.get_mut(parent_id) else {
            return false;
        };
        let removed = children.shift_remove(child_id);
        if children.is_empty() {
            self.child_ids.shift_remove(parent_id);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.child_ids.values().all(IndexSet::is_empty)
    }

    /// Reads a stored tombstone. Accepts the object form and a bare array
    /// of ids; non-string entries are dropped. `None` means unreadable.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw).ok()? {
            Value::Array(values) => Some(Self {
                ids: values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
                child_ids: IndexMap::new(),
            }),
            Value::Object(map) => {
                let mut tombstone = Self::new();
                if let Some(Value::Array(ids)) = map.get("ids") {
                    tombstone.ids = ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
                }
                if let Some(Value::Object(children)) = map.get("childIds") {
                    for (parent, list) in children {
                        let Value::Array(list) = list else { continue };
                        for child in list.iter().filter_map(Value::as_str) {
                            tombstone.insert_child(parent, child);
                        }
                    }
                }
                Some(tombstone)
            }
            _ => None,
        }
    }
}
