use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BlobStore, ChangeFeed, ChangeKind, KvStore, StoreChange};
use crate::error::Result;

/// In-process store. Clones share entries, blobs and the change feed, so
/// two clones behave like two views onto the same browser storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().len()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        self.feed.publish(StoreChange { key: key.to_string(), kind: ChangeKind::Set });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let existed = self.entries.lock().remove(key).is_some();
        if existed {
            self.feed.publish(StoreChange { key: key.to_string(), kind: ChangeKind::Removed });
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<_> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

impl BlobStore for MemoryStore {
    fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.lock().insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(id).cloned())
    }

    fn delete_blob(&self, id: &str) -> Result<()> {
        self.blobs.lock().remove(id);
        Ok(())
    }
}
