use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::item::{Item, Schema};

/// Explicit ordering for one collection, written only by move and reorder.
/// Listed ids come first in the listed order; everything else keeps its
/// merged position after them. Edits never touch it, so saving an item
/// cannot move a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOrder {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default, rename = "childIds")]
    pub child_ids: IndexMap<String, Vec<String>>,
}

impl ViewOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.child_ids.values().all(Vec::is_empty)
    }

    pub fn children_of(&self, parent_id: &str) -> Option<&[String]> {
        self.child_ids.get(parent_id).map(Vec::as_slice)
    }

    pub fn set_children(&mut self, parent_id: &str, ids: Vec<String>) {
        self.child_ids.insert(parent_id.to_string(), ids);
    }

    /// Reads a stored order. `None` means unreadable.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Arranges a merged view: top-level items first, then the children
    /// of every parent with a recorded child order.
    pub fn apply(&self, schema: &Schema, items: Vec<Item>) -> Vec<Item> {
        let mut items = arrange(items, &self.ids, |i| schema.id_of(i));
        let Some(child) = schema.children else {
            return items;
        };
        for item in &mut items {
            let Some(listed) = schema.id_of(item).and_then(|id| self.child_ids.get(id)) else {
                continue;
            };
            if !item.contains(child.field) {
                continue;
            }
            let children = arrange(item.children(child.field), listed, |c| c.get_str(child.id_field));
            item.set_children(child.field, children);
        }
        items
    }
}

/// Moves the entries named by `ids` to the front, in that order. Unknown
/// ids are skipped; unlisted entries keep their relative order at the end.
pub(crate) fn arrange<S, F>(entries: Vec<Item>, ids: &[S], id_of: F) -> Vec<Item>
where
    S: AsRef<str>,
    F: Fn(&Item) -> Option<&str>,
{
    if ids.is_empty() {
        return entries;
    }
    let positions: HashMap<String, usize> = entries
        .iter()
        .enumerate()
        .filter_map(|(pos, e)| id_of(e).map(|id| (id.to_string(), pos)))
        .collect();

    let mut slots: Vec<Option<Item>> = entries.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    for id in ids {
        let id: &str = id.as_ref();
        if let Some(&pos) = positions.get(id) {
            out.extend(slots[pos].take());
        }
    }
    out.extend(slots.into_iter().flatten());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn albums() -> Schema {
        Schema::nested("albums", "id", "songs", "id")
    }

    fn item(id: &str, songs: &[&str]) -> Item {
        let songs: Vec<serde_json::Value> = songs.iter().map(|s| json!({"id": s})).collect();
        Item::new().with("id", id).with("songs", songs)
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().filter_map(|i| i.get_str("id")).collect()
    }

    #[test]
    fn test_listed_first_rest_in_place() {
        let items = vec![item("a", &[]), item("b", &[]), item("c", &[]), item("d", &[])];
        let order = ViewOrder { ids: vec!["c".into(), "ghost".into(), "a".into()], ..ViewOrder::new() };
        assert_eq!(ids(&order.apply(&albums(), items)), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_child_order_per_parent() {
        let items = vec![item("a", &["x", "y", "z"]), item("b", &["x", "y"])];
        let mut order = ViewOrder::new();
        order.set_children("a", vec!["z".into(), "x".into()]);
        let arranged = order.apply(&albums(), items);
        let songs = |i: &Item| -> Vec<String> {
            i.children("songs").iter().filter_map(|s| s.get_str("id").map(str::to_string)).collect()
        };
        assert_eq!(songs(&arranged[0]), vec!["z", "x", "y"]);
        assert_eq!(songs(&arranged[1]), vec!["x", "y"]);
    }

    #[test]
    fn test_empty_order_is_identity() {
        let items = vec![item("b", &[]), item("a", &[])];
        assert_eq!(ViewOrder::new().apply(&albums(), items.clone()), items);
        assert!(ViewOrder::new().is_empty());
    }

    #[test]
    fn test_parse_shape() {
        let order = ViewOrder::parse(r#"{"ids": ["b", "a"], "childIds": {"a": ["s2"]}}"#).unwrap();
        assert_eq!(order.ids, vec!["b", "a"]);
        assert_eq!(order.children_of("a"), Some(&["s2".to_string()][..]));
        assert_eq!(ViewOrder::parse("{}"), Some(ViewOrder::new()));
        assert!(ViewOrder::parse("\"text\"").is_none());
    }
}
