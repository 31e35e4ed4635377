use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::trace;

use crate::item::{items_from_values, Item, Schema};
use crate::tombstone::Tombstone;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Default items that survived the tombstone filter.
    pub from_defaults: usize,
    /// Distinct local items that shadow a surviving default.
    pub overridden: usize,
    /// Distinct local items with no default counterpart.
    pub local_only: usize,
    /// Items (default or local) hidden by a top-level tombstone.
    pub hidden: usize,
    /// Entries dropped for lacking an id.
    pub malformed: usize,
}

impl MergeReport {
    pub fn visible(&self) -> usize {
        self.from_defaults + self.local_only
    }
}

/// Unions two lists keyed by id. Same-id overlay entries are folded into
/// the base entry in place through `combine`; new ids are appended in
/// overlay order. Overlay order never moves base entries. Entries without
/// an id are dropped.
pub fn merge_children<C, F, M>(base: Vec<C>, overlay: Vec<C>, id_of: F, mut combine: M) -> Vec<C>
where
    F: Fn(&C) -> Option<&str>,
    M: FnMut(&mut C, C),
{
    let mut merged: IndexMap<String, C> = IndexMap::with_capacity(base.len() + overlay.len());
    for entry in base {
        let Some(id) = id_of(&entry).map(str::to_string) else {
            continue;
        };
        merged.insert(id, entry);
    }

    for entry in overlay {
        let Some(id) = id_of(&entry).map(str::to_string) else {
            continue;
        };
        match merged.get_mut(&id) {
            Some(existing) => combine(existing, entry),
            None => {
                merged.insert(id, entry);
            }
        }
    }

    merged.into_values().collect()
}

/// Shallow `{...base, ...overlay}` overlay. Every field present on the
/// overlay wins, including empty strings; the children field is unioned by
/// child id with overlay children replacing same-id base children.
pub fn merge_item(schema: &Schema, base: &mut Item, overlay: Item) {
    let child_field = schema.children.map(|c| c.field);
    for (field, value) in overlay.into_fields() {
        if child_field == Some(field.as_str()) {
            let incoming = match value {
                Value::Array(values) => items_from_values(values),
                _ => Vec::new(),
            };
            let existing = base.children(&field);
            let children = merge_children(
                existing,
                incoming,
                |c| schema.child_id_of(c),
                |slot, child| *slot = child,
            );
            base.set_children(&field, children);
        } else {
            base.insert(&field, value);
        }
    }
}

/// Copies an item with tombstoned and id-less children removed.
fn prune_children(schema: &Schema, id: &str, item: &Item, deleted: &Tombstone) -> Item {
    let mut copy = item.clone();
    if let Some(child) = schema.children {
        if copy.contains(child.field) {
            let survivors = copy
                .children(child.field)
                .into_iter()
                .filter(|c| {
                    c.get_str(child.id_field)
                        .is_some_and(|cid| !deleted.contains_child(id, cid))
                })
                .collect();
            copy.set_children(child.field, survivors);
        }
    }
    copy
}

fn surviving(
    schema: &Schema,
    items: &[Item],
    deleted: &Tombstone,
    report: &mut MergeReport,
) -> Vec<Item> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(id) = schema.id_of(item) else {
            report.malformed += 1;
            continue;
        };
        if deleted.contains(id) {
            report.hidden += 1;
            continue;
        }
        out.push(prune_children(schema, id, item, deleted));
    }
    out
}

/// Materializes the visible collection: defaults overlaid with local items,
/// minus everything the tombstone names. Pure and infallible.
pub fn merge(schema: &Schema, defaults: &[Item], local: &[Item], deleted: &Tombstone) -> Vec<Item> {
    merge_with_report(schema, defaults, local, deleted).0
}

pub fn merge_with_report(
    schema: &Schema,
    defaults: &[Item],
    local: &[Item],
    deleted: &Tombstone,
) -> (Vec<Item>, MergeReport) {
    let mut report = MergeReport::default();
    let base = surviving(schema, defaults, deleted, &mut report);
    let overlay = surviving(schema, local, deleted, &mut report);

    let base_ids: IndexSet<&str> = base.iter().filter_map(|i| schema.id_of(i)).collect();
    report.from_defaults = base_ids.len();
    let overlay_ids: IndexSet<&str> = overlay.iter().filter_map(|i| schema.id_of(i)).collect();
    report.overridden = overlay_ids.iter().filter(|id| base_ids.contains(*id)).count();
    report.local_only = overlay_ids.len() - report.overridden;

    let merged = merge_children(
        base,
        overlay,
        |i| schema.id_of(i),
        |existing, incoming| merge_item(schema, existing, incoming),
    );

    trace!(
        collection = schema.key,
        visible = merged.len(),
        hidden = report.hidden,
        "merged view"
    );
    (merged, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn albums() -> Schema {
        Schema::nested("albums", "id", "songs", "id")
    }

    fn items(value: serde_json::Value) -> Vec<Item> {
        match value {
            serde_json::Value::Array(values) => items_from_values(values),
            _ => panic!("expected array"),
        }
    }

    fn ids(schema: &Schema, list: &[Item]) -> Vec<String> {
        list.iter().filter_map(|i| schema.id_of(i).map(str::to_string)).collect()
    }

    fn child_titles(item: &Item) -> Vec<String> {
        item.children("songs")
            .iter()
            .map(|s| s.get_str("title").unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_local_edit_and_new_song() {
        let defaults = items(json!([{"id": "alb1", "title": "A", "songs": [{"id": "s1", "title": "One"}]}]));
        let local = items(json!([{"id": "alb1", "title": "A", "songs": [
            {"id": "s1", "title": "One-Edited"},
            {"id": "s2", "title": "Two"}
        ]}]));
        let merged = merge(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].get_str("title"), Some("A"));
        assert_eq!(
            merged[0].get("songs"),
            Some(&json!([{"id": "s1", "title": "One-Edited"}, {"id": "s2", "title": "Two"}]))
        );
    }

    #[test]
    fn test_deleted_default_song_is_hidden() {
        let defaults = items(json!([{"id": "alb1", "title": "A", "songs": [{"id": "s1", "title": "One"}]}]));
        let local = items(json!([{"id": "alb1", "title": "A", "songs": [
            {"id": "s1", "title": "One-Edited"},
            {"id": "s2", "title": "Two"}
        ]}]));
        let mut deleted = Tombstone::new();
        deleted.insert_child("alb1", "s1");
        let merged = merge(&albums(), &defaults, &local, &deleted);
        assert_eq!(merged[0].get("songs"), Some(&json!([{"id": "s2", "title": "Two"}])));
    }

    #[test]
    fn test_partial_child_overlay_replaces_in_place() {
        let defaults = items(json!([{"id": "p", "songs": [
            {"id": "A", "title": "a"}, {"id": "B", "title": "b"}, {"id": "C", "title": "c"}
        ]}]));
        let local = items(json!([{"id": "p", "songs": [
            {"id": "B", "title": "b2"}, {"id": "D", "title": "d"}
        ]}]));
        let merged = merge(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(child_titles(&merged[0]), vec!["a", "b2", "c", "d"]);
    }

    #[test]
    fn test_overlay_order_never_moves_defaults() {
        let defaults = items(json!([{"id": "p", "songs": [
            {"id": "A", "title": "a"}, {"id": "B", "title": "b"}, {"id": "C", "title": "c"}
        ]}]));
        let local = items(json!([{"id": "p", "songs": [
            {"id": "C", "title": "c2"}, {"id": "A", "title": "a2"}, {"id": "B", "title": "b"}
        ]}]));
        let merged = merge(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(child_titles(&merged[0]), vec!["a2", "b", "c2"]);

        let again = merge(&albums(), &merged, &[], &Tombstone::new());
        assert_eq!(again, merged);
    }

    #[test]
    fn test_edit_order_does_not_reorder_items() {
        // b edited before a: both stay in default order.
        let defaults = items(json!([{"id": "a"}, {"id": "b"}]));
        let local = items(json!([{"id": "b", "title": "B"}, {"id": "a", "title": "A"}]));
        let merged = merge(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(ids(&albums(), &merged), vec!["a", "b"]);
    }

    #[test]
    fn test_scalar_overlay_is_shallow() {
        let defaults = items(json!([{"id": "alb1", "title": "A", "cover": "a.png", "year": 2020}]));
        let local = items(json!([{"id": "alb1", "title": "", "year": null}]));
        let merged = merge(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(merged[0].get_str("title"), Some(""));
        assert_eq!(merged[0].get_str("cover"), Some("a.png"));
        assert_eq!(merged[0].get("year"), Some(&json!(null)));
    }

    #[test]
    fn test_missing_children_field_keeps_defaults() {
        let defaults = items(json!([{"id": "alb1", "songs": [{"id": "s1"}]}]));
        let local = items(json!([{"id": "alb1", "title": "Renamed"}]));
        let merged = merge(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(merged[0].children("songs").len(), 1);
        assert_eq!(merged[0].get_str("title"), Some("Renamed"));
    }

    #[test]
    fn test_tombstone_hides_local_and_default() {
        let defaults = items(json!([{"id": "a"}, {"id": "b"}]));
        let local = items(json!([{"id": "b", "title": "x"}, {"id": "c"}]));
        let mut deleted = Tombstone::new();
        deleted.insert("b");
        deleted.insert("c");
        let (merged, report) = merge_with_report(&albums(), &defaults, &local, &deleted);
        assert_eq!(ids(&albums(), &merged), vec!["a"]);
        assert_eq!(report.hidden, 3);
        assert_eq!(report.visible(), 1);
    }

    #[test]
    fn test_defaults_precede_local_only_items() {
        let defaults = items(json!([{"id": "a"}, {"id": "b"}]));
        let local = items(json!([{"id": "z"}, {"id": "a", "title": "edited"}]));
        let (merged, report) = merge_with_report(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(ids(&albums(), &merged), vec!["a", "b", "z"]);
        assert_eq!(report.overridden, 1);
        assert_eq!(report.local_only, 1);
        assert_eq!(report.from_defaults, 2);
    }

    #[test]
    fn test_malformed_input_is_skipped() {
        let defaults = items(json!([{"title": "no id"}, {"id": 5}, {"id": "ok", "songs": "nope"}]));
        let local = items(json!([{"id": "ok", "songs": [{"title": "no id"}, {"id": "s"}]}]));
        let (merged, report) = merge_with_report(&albums(), &defaults, &local, &Tombstone::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(report.malformed, 2);
        assert_eq!(merged[0].get("songs"), Some(&json!([{"id": "s"}])));
    }

    #[test]
    fn test_flat_schema_ignores_children() {
        let poems = Schema::flat("poems", "slug");
        let defaults = items(json!([{"slug": "p1", "songs": [{"id": "x"}]}]));
        let local = items(json!([{"slug": "p1", "songs": []}]));
        let merged = merge(&poems, &defaults, &local, &Tombstone::new());
        assert_eq!(merged[0].get("songs"), Some(&json!([])));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_item(prefix: &'static str) -> impl Strategy<Value = Item> {
            (0u8..6, "[a-z]{0,4}", proptest::collection::vec((0u8..5, "[a-z]{1,3}"), 0..4)).prop_map(
                move |(id, title, songs)| {
                    let songs: Vec<serde_json::Value> = songs
                        .into_iter()
                        .map(|(sid, t)| json!({"id": format!("s{sid}"), "title": t}))
                        .collect();
                    Item::new()
                        .with("id", format!("{prefix}{id}"))
                        .with("title", title)
                        .with("songs", songs)
                },
            )
        }

        fn arb_tombstone() -> impl Strategy<Value = Tombstone> {
            (
                proptest::collection::vec(0u8..6, 0..3),
                proptest::collection::vec((0u8..6, 0u8..5), 0..4),
            )
                .prop_map(|(ids, children)| {
                    let mut t = Tombstone::new();
                    for id in ids {
                        t.insert(&format!("i{id}"));
                    }
                    for (parent, child) in children {
                        t.insert_child(&format!("i{parent}"), &format!("s{child}"));
                    }
                    t
                })
        }

        proptest! {
            #[test]
            fn prop_remerge_is_identity(
                defaults in proptest::collection::vec(arb_item("i"), 0..6),
                local in proptest::collection::vec(arb_item("i"), 0..6),
                deleted in arb_tombstone(),
            ) {
                let schema = albums();
                let once = merge(&schema, &defaults, &local, &deleted);
                let twice = merge(&schema, &once, &[], &Tombstone::new());
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn prop_tombstoned_ids_never_visible(
                defaults in proptest::collection::vec(arb_item("i"), 0..6),
                local in proptest::collection::vec(arb_item("i"), 0..6),
                deleted in arb_tombstone(),
            ) {
                let schema = albums();
                let merged = merge(&schema, &defaults, &local, &deleted);
                for item in &merged {
                    let id = schema.id_of(item).unwrap();
                    prop_assert!(!deleted.contains(id));
                    for song in item.children("songs") {
                        prop_assert!(!deleted.contains_child(id, song.get_str("id").unwrap()));
                    }
                }
            }
        }
    }
}
