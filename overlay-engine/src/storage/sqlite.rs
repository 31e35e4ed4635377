use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{BlobStore, ChangeFeed, ChangeKind, KvStore, StoreChange};
use crate::error::Result;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS blobs (
    id TEXT PRIMARY KEY NOT NULL,
    bytes BLOB NOT NULL
) WITHOUT ROWID;

PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
"#;

/// Durable store: one `kv` table for overlay state and one `blobs` table
/// for attachments. Clones share the connection and change feed.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    feed: ChangeFeed,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_feed(path, ChangeFeed::new())
    }

    /// Opens another connection that reports into an existing feed, so
    /// handles on the same file observe each other's writes.
    pub fn open_with_feed(path: impl AsRef<Path>, feed: ChangeFeed) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch(INIT_SQL)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), feed })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        self.feed.publish(StoreChange { key: key.to_string(), kind: ChangeKind::Set });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let removed = self.conn.lock().execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        if removed > 0 {
            self.feed.publish(StoreChange { key: key.to_string(), kind: ChangeKind::Removed });
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

impl BlobStore for SqliteStore {
    fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO blobs (id, bytes) VALUES (?1, ?2)",
            params![id, bytes],
        )?;
        Ok(())
    }

    fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let bytes = self
            .conn
            .lock()
            .query_row("SELECT bytes FROM blobs WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(bytes)
    }

    fn delete_blob(&self, id: &str) -> Result<()> {
        self.conn.lock().execute("DELETE FROM blobs WHERE id = ?1", params![id])?;
        Ok(())
    }
}
