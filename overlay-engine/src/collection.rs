use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::item::{ChildSchema, Item, Schema};
use crate::merge::{merge, merge_with_report, MergeReport};
use crate::order::{arrange, ViewOrder};
use crate::storage::{KvStore, StoreChange};
use crate::store::{collection_of_key, TombstoneStore};
use crate::tombstone::Tombstone;

/// Which deletion strategy a delete applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The id only existed locally and was dropped from the overlay.
    HardRemoved,
    /// A default carries the id, so a tombstone now hides it.
    Tombstoned(String),
    /// Nothing matched; the store is untouched.
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
enum ReversalStep {
    RestoreLocal { index: usize, item: Item },
    Untombstone { id: String },
    RestoreChild { parent_id: String, index: usize, child: Item },
    UntombstoneChild { parent_id: String, child_id: String },
}

/// The exact inverse of one delete, applied by [`Collection::restore`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reversal {
    steps: Vec<ReversalStep>,
}

impl Reversal {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteReceipt {
    pub outcome: DeleteOutcome,
    pub reversal: Reversal,
    /// The merged item (or child) as it was visible before the delete.
    pub removed: Option<Item>,
}

impl DeleteReceipt {
    fn missing() -> Self {
        Self { outcome: DeleteOutcome::Missing, reversal: Reversal::default(), removed: None }
    }
}

/// One editable collection: read-only defaults plus the persisted overlay.
/// Every read re-merges from the store; every mutation persists before it
/// returns. Mutations aimed at ids that are not visible are no-ops and
/// report `false`.
#[derive(Debug, Clone)]
pub struct Collection<S> {
    schema: Schema,
    defaults: Arc<Vec<Item>>,
    store: TombstoneStore<S>,
}

impl<S: KvStore> Collection<S> {
    pub fn new(schema: Schema, store: TombstoneStore<S>) -> Self {
        Self { schema, defaults: Arc::new(Vec::new()), store }
    }

    pub fn with_defaults(mut self, defaults: Vec<Item>) -> Self {
        self.set_defaults(defaults);
        self
    }

    pub fn set_defaults(&mut self, defaults: Vec<Item>) {
        self.defaults = Arc::new(defaults);
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key(&self) -> &'static str {
        self.schema.key
    }

    pub fn store(&self) -> &TombstoneStore<S> {
        &self.store
    }

    pub fn defaults(&self) -> &[Item] {
        &self.defaults
    }

    pub fn local(&self) -> Vec<Item> {
        self.store.load_local(self.key())
    }

    pub fn deleted(&self) -> Tombstone {
        self.store.load_deleted(self.key())
    }

    pub fn order(&self) -> ViewOrder {
        self.store.load_order(self.key())
    }

    /// The merged view, arranged by any order that move or reorder recorded.
    pub fn view(&self) -> Vec<Item> {
        self.view_with_report().0
    }

    pub fn view_with_report(&self) -> (Vec<Item>, MergeReport) {
        let (merged, report) = merge_with_report(&self.schema, &self.defaults, &self.local(), &self.deleted());
        (self.order().apply(&self.schema, merged), report)
    }

    pub fn get(&self, id: &str) -> Option<Item> {
        self.view().into_iter().find(|i| self.schema.id_of(i) == Some(id))
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.local().is_empty() || !self.deleted().is_empty() || !self.order().is_empty()
    }

    fn child_schema(&self) -> Option<ChildSchema> {
        self.schema.children
    }

    fn local_index(&self, local: &[Item], id: &str) -> Option<usize> {
        local.iter().position(|i| self.schema.id_of(i) == Some(id))
    }

    fn default_item(&self, id: &str) -> Option<&Item> {
        self.defaults.iter().find(|i| self.schema.id_of(i) == Some(id))
    }

    fn merged_item(&self, local: &[Item], deleted: &Tombstone, id: &str) -> Option<Item> {
        merge(&self.schema, &self.defaults, local, deleted)
            .into_iter()
            .find(|i| self.schema.id_of(i) == Some(id))
    }

    /// Index of the local entry for `id`, creating it from the merged view
    /// when absent so unrelated default fields carry over.
    fn seed(&self, local: &mut Vec<Item>, deleted: &Tombstone, id: &str) -> Option<usize> {
        if deleted.contains(id) {
            return None;
        }
        if let Some(idx) = self.local_index(local, id) {
            return Some(idx);
        }
        let merged = self.merged_item(local, deleted, id)?;
        local.push(merged);
        Some(local.len() - 1)
    }

    fn save_local(&self, local: &[Item]) -> Result<()> {
        self.store.save_local(self.key(), local)
    }

    fn save_deleted(&self, deleted: &Tombstone) -> Result<()> {
        self.store.save_deleted(self.key(), deleted)
    }

    fn save_order(&self, order: &ViewOrder) -> Result<()> {
        self.store.save_order(self.key(), order)
    }

    fn ids_of(&self, items: &[Item]) -> Vec<String> {
        items.iter().filter_map(|i| self.schema.id_of(i).map(str::to_string)).collect()
    }

    pub fn create(&self, item: Item) -> Result<bool> {
        let Some(id) = self.schema.id_of(&item).map(str::to_string) else {
            debug!(collection = self.key(), "create ignored: item has no id");
            return Ok(false);
        };
        let mut local = self.local();
        match self.local_index(&local, &id) {
            Some(idx) => local[idx] = item,
            None => local.push(item),
        }
        self.save_local(&local)?;
        debug!(collection = self.key(), id = %id, "created");
        Ok(true)
    }

    pub fn create_child(&self, parent_id: &str, child: Item) -> Result<bool> {
        let Some(cs) = self.child_schema() else {
            return Ok(false);
        };
        let Some(child_id) = child.get_str(cs.id_field).map(str::to_string) else {
            return Ok(false);
        };
        let mut local = self.local();
        let deleted = self.deleted();
        let Some(idx) = self.seed(&mut local, &deleted, parent_id) else {
            debug!(collection = self.key(), parent_id, "create_child ignored: no such parent");
            return Ok(false);
        };
        let mut children = local[idx].children(cs.field);
        match children.iter().position(|c| c.get_str(cs.id_field) == Some(child_id.as_str())) {
            Some(pos) => children[pos] = child,
            None => children.push(child),
        }
        local[idx].set_children(cs.field, children);
        self.save_local(&local)?;
        debug!(collection = self.key(), parent_id, child_id = %child_id, "created child");
        Ok(true)
    }

    /// Overlays `patch` onto the item. The id field is never rewritten.
    pub fn update(&self, id: &str, patch: Item) -> Result<bool> {
        let mut local = self.local();
        let deleted = self.deleted();
        let Some(idx) = self.seed(&mut local, &deleted, id) else {
            return Ok(false);
        };
        for (field, value) in patch.into_fields() {
            if field != self.schema.id_field {
                local[idx].insert(&field, value);
            }
        }
        self.save_local(&local)?;
        Ok(true)
    }

    pub fn update_child(&self, parent_id: &str, child_id: &str, patch: Item) -> Result<bool> {
        let Some(cs) = self.child_schema() else {
            return Ok(false);
        };
        let mut local = self.local();
        let deleted = self.deleted();
        let merged_child = self
            .merged_item(&local, &deleted, parent_id)
            .and_then(|p| p.children(cs.field).into_iter().find(|c| c.get_str(cs.id_field) == Some(child_id)));
        let Some(idx) = self.seed(&mut local, &deleted, parent_id) else {
            return Ok(false);
        };
        let mut children = local[idx].children(cs.field);
        let pos = match children.iter().position(|c| c.get_str(cs.id_field) == Some(child_id)) {
            Some(pos) => pos,
            None => {
                let Some(child) = merged_child else {
                    return Ok(false);
                };
                children.push(child);
                children.len() - 1
            }
        };
        for (field, value) in patch.into_fields() {
            if field != cs.id_field {
                children[pos].insert(&field, value);
            }
        }
        local[idx].set_children(cs.field, children);
        self.save_local(&local)?;
        Ok(true)
    }

    pub fn delete(&self, id: &str) -> Result<DeleteReceipt> {
        let mut local = self.local();
        let mut deleted = self.deleted();
        let removed = self.merged_item(&local, &deleted, id);
        let mut reversal = Reversal::default();

        let local_pos = self.local_index(&local, id);
        if let Some(index) = local_pos {
            let item = local.remove(index);
            reversal.steps.push(ReversalStep::RestoreLocal { index, item });
        }

        let mut newly_tombstoned = false;
        if self.default_item(id).is_some() && deleted.insert(id) {
            newly_tombstoned = true;
            reversal.steps.push(ReversalStep::Untombstone { id: id.to_string() });
        }

        let outcome = if self.default_item(id).is_some() && (newly_tombstoned || local_pos.is_some()) {
            DeleteOutcome::Tombstoned(id.to_string())
        } else if local_pos.is_some() {
            DeleteOutcome::HardRemoved
        } else {
            return Ok(DeleteReceipt::missing());
        };

        if local_pos.is_some() {
            self.save_local(&local)?;
        }
        if newly_tombstoned {
            self.save_deleted(&deleted)?;
        }
        debug!(collection = self.key(), id, ?outcome, "deleted");
        Ok(DeleteReceipt { outcome, reversal, removed })
    }

    pub fn delete_child(&self, parent_id: &str, child_id: &str) -> Result<DeleteReceipt> {
        let Some(cs) = self.child_schema() else {
            return Ok(DeleteReceipt::missing());
        };
        let mut local = self.local();
        let mut deleted = self.deleted();
        let removed = self
            .merged_item(&local, &deleted, parent_id)
            .and_then(|p| p.children(cs.field).into_iter().find(|c| c.get_str(cs.id_field) == Some(child_id)));
        let mut reversal = Reversal::default();

        let mut removed_locally = false;
        if let Some(pidx) = self.local_index(&local, parent_id) {
            let mut children = local[pidx].children(cs.field);
            if let Some(index) = children.iter().position(|c| c.get_str(cs.id_field) == Some(child_id)) {
                let child = children.remove(index);
                local[pidx].set_children(cs.field, children);
                reversal.steps.push(ReversalStep::RestoreChild {
                    parent_id: parent_id.to_string(),
                    index,
                    child,
                });
                removed_locally = true;
            }
        }

        let default_has_child = self.default_item(parent_id).is_some_and(|p| {
            p.children(cs.field)
                .iter()
                .any(|c| c.get_str(cs.id_field) == Some(child_id))
        });
        let mut newly_tombstoned = false;
        if default_has_child && deleted.insert_child(parent_id, child_id) {
            newly_tombstoned = true;
            reversal.steps.push(ReversalStep::UntombstoneChild {
                parent_id: parent_id.to_string(),
                child_id: child_id.to_string(),
            });
        }

        let outcome = if default_has_child && (newly_tombstoned || removed_locally) {
            DeleteOutcome::Tombstoned(child_id.to_string())
        } else if removed_locally {
            DeleteOutcome::HardRemoved
        } else {
            return Ok(DeleteReceipt::missing());
        };

        if removed_locally {
            self.save_local(&local)?;
        }
        if newly_tombstoned {
            self.save_deleted(&deleted)?;
        }
        debug!(collection = self.key(), parent_id, child_id, ?outcome, "deleted child");
        Ok(DeleteReceipt { outcome, reversal, removed })
    }

    /// Undoes a delete: re-adds removed local entries at their old
    /// positions and strips the tombstones it added.
    pub fn restore(&self, reversal: &Reversal) -> Result<bool> {
        if reversal.is_empty() {
            return Ok(false);
        }
        let mut local = self.local();
        let mut deleted = self.deleted();
        let mut local_dirty = false;
        let mut deleted_dirty = false;

        for step in reversal.steps.iter().rev() {
            match step {
                ReversalStep::Untombstone { id } => deleted_dirty |= deleted.remove(id),
                ReversalStep::UntombstoneChild { parent_id, child_id } => {
                    deleted_dirty |= deleted.remove_child(parent_id, child_id)
                }
                ReversalStep::RestoreLocal { index, item } => {
                    let id = self.schema.id_of(item).unwrap_or_default();
                    match self.local_index(&local, id) {
                        Some(existing) => local[existing] = item.clone(),
                        None => local.insert((*index).min(local.len()), item.clone()),
                    }
                    local_dirty = true;
                }
                ReversalStep::RestoreChild { parent_id, index, child } => {
                    let Some(cs) = self.child_schema() else { continue };
                    let Some(pidx) = self.seed(&mut local, &deleted, parent_id) else {
                        continue;
                    };
                    let child_id = child.get_str(cs.id_field);
                    let mut children = local[pidx].children(cs.field);
                    match children.iter().position(|c| c.get_str(cs.id_field) == child_id) {
                        Some(existing) => children[existing] = child.clone(),
                        None => children.insert((*index).min(children.len()), child.clone()),
                    }
                    local[pidx].set_children(cs.field, children);
                    local_dirty = true;
                }
            }
        }

        if local_dirty {
            self.save_local(&local)?;
        }
        if deleted_dirty {
            self.save_deleted(&deleted)?;
        }
        Ok(local_dirty || deleted_dirty)
    }

    /// Swaps the item with its neighbour in the visible order and records
    /// the whole resulting order.
    pub fn move_item(&self, id: &str, direction: Direction) -> Result<bool> {
        let mut view = self.view();
        let Some(pos) = view.iter().position(|i| self.schema.id_of(i) == Some(id)) else {
            return Ok(false);
        };
        let Some(target) = neighbour(pos, view.len(), direction) else {
            return Ok(false);
        };
        view.swap(pos, target);
        self.record_order(&view)
    }

    /// Records an explicit order. Unknown ids are ignored; items the list
    /// leaves out keep their relative order after the listed ones.
    pub fn reorder(&self, ids: &[&str]) -> Result<bool> {
        let view = self.view();
        let ordered = arrange(view.clone(), ids, |i| self.schema.id_of(i));
        if ordered == view {
            return Ok(false);
        }
        self.record_order(&ordered)
    }

    fn record_order(&self, items: &[Item]) -> Result<bool> {
        let mut order = self.order();
        order.ids = self.ids_of(items);
        self.save_order(&order)?;
        debug!(collection = self.key(), items = order.ids.len(), "order recorded");
        Ok(true)
    }

    pub fn move_child(&self, parent_id: &str, child_id: &str, direction: Direction) -> Result<bool> {
        let Some(cs) = self.child_schema() else {
            return Ok(false);
        };
        self.resequence_children(parent_id, |children| {
            let pos = children.iter().position(|c| c.get_str(cs.id_field) == Some(child_id))?;
            let target = neighbour(pos, children.len(), direction)?;
            let mut children = children.to_vec();
            children.swap(pos, target);
            Some(children)
        })
    }

    pub fn reorder_children(&self, parent_id: &str, ids: &[&str]) -> Result<bool> {
        let Some(cs) = self.child_schema() else {
            return Ok(false);
        };
        self.resequence_children(parent_id, |children| {
            let ordered = arrange(children.to_vec(), ids, |c| c.get_str(cs.id_field));
            (ordered != children).then_some(ordered)
        })
    }

    /// Records a new child order for a visible parent. The overlay itself is
    /// left alone, so reordering never copies a default into `local`.
    fn resequence_children<F>(&self, parent_id: &str, resequence: F) -> Result<bool>
    where
        F: FnOnce(&[Item]) -> Option<Vec<Item>>,
    {
        let Some(cs) = self.child_schema() else {
            return Ok(false);
        };
        let Some(parent) = self.get(parent_id) else {
            return Ok(false);
        };
        let Some(children) = resequence(&parent.children(cs.field)) else {
            return Ok(false);
        };
        let mut order = self.order();
        let ids = children.iter().filter_map(|c| c.get_str(cs.id_field).map(str::to_string)).collect();
        order.set_children(parent_id, ids);
        self.save_order(&order)?;
        debug!(collection = self.key(), parent_id, "child order recorded");
        Ok(true)
    }

    /// Explicit state wipe: forgets every staged edit, deletion and reorder.
    pub fn reset(&self) -> Result<()> {
        self.store.reset(self.key())
    }
}

fn neighbour(pos: usize, len: usize, direction: Direction) -> Option<usize> {
    match direction {
        Direction::Up => pos.checked_sub(1),
        Direction::Down => (pos + 1 < len).then_some(pos + 1),
    }
}

/// A collection view that follows the change feed, so edits made through
/// any handle on the same store show up here after [`LiveView::refresh`].
pub struct LiveView<S> {
    collection: Collection<S>,
    changes: Receiver<StoreChange>,
    items: Vec<Item>,
}

impl<S: KvStore> LiveView<S> {
    pub fn new(collection: Collection<S>) -> Self {
        let changes = collection.store().feed().subscribe();
        let items = collection.view();
        Self { collection, changes, items }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn collection(&self) -> &Collection<S> {
        &self.collection
    }

    pub fn set_defaults(&mut self, defaults: Vec<Item>) {
        self.collection.set_defaults(defaults);
        self.items = self.collection.view();
    }

    /// Drains pending notifications and re-merges if any concerned this
    /// collection. Returns whether the view was recomputed.
    pub fn refresh(&mut self) -> bool {
        let mut relevant = false;
        while let Ok(change) = self.changes.try_recv() {
            if collection_of_key(&change.key) == Some(self.collection.key()) {
                relevant = true;
            }
        }
        if relevant {
            self.items = self.collection.view();
        }
        relevant
    }
}
