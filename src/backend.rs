//! Store selection from configuration: SQLite when `[store] path` is set,
//! otherwise an in-memory store that lasts for the session.

use anyhow::{Context, Result};
use overlay_engine::{BlobStore, ChangeFeed, KvStore, MemoryStore, SqliteStore};
use tracing::info;

use crate::config::StoreConfig;

#[derive(Debug, Clone)]
pub enum StudioStore {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl StudioStore {
    pub fn is_durable(&self) -> bool {
        matches!(self, StudioStore::Sqlite(_))
    }
}

pub fn open_store(config: &StoreConfig) -> Result<StudioStore> {
    match &config.path {
        Some(path) => {
            let store =
                SqliteStore::open(path).with_context(|| format!("Failed to open store {}", path.display()))?;
            info!(path = %path.display(), "opened sqlite store");
            Ok(StudioStore::Sqlite(store))
        }
        None => {
            info!("no store path configured, edits last for this session only");
            Ok(StudioStore::Memory(MemoryStore::new()))
        }
    }
}

impl KvStore for StudioStore {
    fn get(&self, key: &str) -> overlay_engine::Result<Option<String>> {
        match self {
            StudioStore::Memory(store) => store.get(key),
            StudioStore::Sqlite(store) => store.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> overlay_engine::Result<()> {
        match self {
            StudioStore::Memory(store) => store.set(key, value),
            StudioStore::Sqlite(store) => store.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> overlay_engine::Result<()> {
        match self {
            StudioStore::Memory(store) => store.remove(key),
            StudioStore::Sqlite(store) => store.remove(key),
        }
    }

    fn keys(&self) -> overlay_engine::Result<Vec<String>> {
        match self {
            StudioStore::Memory(store) => store.keys(),
            StudioStore::Sqlite(store) => store.keys(),
        }
    }

    fn feed(&self) -> &ChangeFeed {
        match self {
            StudioStore::Memory(store) => store.feed(),
            StudioStore::Sqlite(store) => store.feed(),
        }
    }
}

impl BlobStore for StudioStore {
    fn put_blob(&self, id: &str, bytes: &[u8]) -> overlay_engine::Result<()> {
        match self {
            StudioStore::Memory(store) => store.put_blob(id, bytes),
            StudioStore::Sqlite(store) => store.put_blob(id, bytes),
        }
    }

    fn get_blob(&self, id: &str) -> overlay_engine::Result<Option<Vec<u8>>> {
        match self {
            StudioStore::Memory(store) => store.get_blob(id),
            StudioStore::Sqlite(store) => store.get_blob(id),
        }
    }

    fn delete_blob(&self, id: &str) -> overlay_engine::Result<()> {
        match self {
            StudioStore::Memory(store) => store.delete_blob(id),
            StudioStore::Sqlite(store) => store.delete_blob(id),
        }
    }
}
