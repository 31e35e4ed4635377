use serde_json::Value;
use tracing::warn;

use crate::error::Result;
use crate::item::{items_from_values, Item};
use crate::storage::{ChangeFeed, KvStore};
use crate::order::ViewOrder;
use crate::tombstone::Tombstone;

const KEY_PREFIX: &str = "airose";

pub fn local_key(collection: &str) -> String {
    format!("{KEY_PREFIX}:{collection}:local")
}

pub fn deleted_key(collection: &str) -> String {
    format!("{KEY_PREFIX}:{collection}:deleted")
}

pub fn order_key(collection: &str) -> String {
    format!("{KEY_PREFIX}:{collection}:order")
}

/// Collection a storage key belongs to, if it is one of ours.
pub fn collection_of_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(KEY_PREFIX)?.strip_prefix(':')?;
    [":local", ":deleted", ":order"]
        .iter()
        .find_map(|suffix| rest.strip_suffix(suffix))
}

/// Persisted overlay state for every collection: the local items, the
/// deletion markers and any explicit ordering. Reads never fail: missing,
/// unreadable or corrupt data is an empty overlay.
#[derive(Debug, Clone)]
pub struct TombstoneStore<S> {
    backend: S,
}

impl<S: KvStore> TombstoneStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn feed(&self) -> &ChangeFeed {
        self.backend.feed()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "overlay read failed, treating as empty");
                None
            }
        }
    }

    pub fn load_local(&self, collection: &str) -> Vec<Item> {
        let key = local_key(collection);
        let Some(raw) = self.read(&key) else {
            return Vec::new();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(values)) => items_from_values(values),
            Ok(_) | Err(_) => {
                warn!(key = %key, "corrupt local overlay, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn save_local(&self, collection: &str, items: &[Item]) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        self.backend.set(&local_key(collection), &raw)
    }

    pub fn load_deleted(&self, collection: &str) -> Tombstone {
        let key = deleted_key(collection);
        let Some(raw) = self.read(&key) else {
            return Tombstone::new();
        };
        Tombstone::parse(&raw).unwrap_or_else(|| {
            warn!(key = %key, "corrupt tombstone, treating as empty");
            Tombstone::new()
        })
    }

    pub fn save_deleted(&self, collection: &str, deleted: &Tombstone) -> Result<()> {
        let raw = serde_json::to_string(deleted)?;
        self.backend.set(&deleted_key(collection), &raw)
    }

    pub fn load_order(&self, collection: &str) -> ViewOrder {
        let key = order_key(collection);
        let Some(raw) = self.read(&key) else {
            return ViewOrder::new();
        };
        ViewOrder::parse(&raw).unwrap_or_else(|| {
            warn!(key = %key, "corrupt view order, treating as empty");
            ViewOrder::new()
        })
    }

    pub fn save_order(&self, collection: &str, order: &ViewOrder) -> Result<()> {
        let raw = serde_json::to_string(order)?;
        self.backend.set(&order_key(collection), &raw)
    }

    /// Drops all staged edits, deletions and reorders for the collection.
    pub fn reset(&self, collection: &str) -> Result<()> {
        self.backend.remove(&local_key(collection))?;
        self.backend.remove(&deleted_key(collection))?;
        self.backend.remove(&order_key(collection))
    }
}
