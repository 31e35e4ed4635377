#[cfg(feature = "sqlite")]
mod sqlite;
mod memory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use memory::MemoryStore;

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;
use crate::item::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub kind: ChangeKind,
}

/// Advisory change notifications shared by every handle onto one store.
/// Delivery is best effort; readers re-read the store on each change.
#[derive(Debug, Clone, Default)]
pub struct ChangeFeed {
    subscribers: Arc<Mutex<Vec<Sender<StoreChange>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StoreChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, change: StoreChange) {
        // dropped receivers fall out here
        self.subscribers.lock().retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// String-keyed persistence for serialized overlay state.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
    fn feed(&self) -> &ChangeFeed;
}

/// Binary attachments referenced from items as `idb://<id>`.
pub trait BlobStore {
    fn put_blob(&self, id: &str, bytes: &[u8]) -> Result<()>;
    fn get_blob(&self, id: &str) -> Result<Option<Vec<u8>>>;
    fn delete_blob(&self, id: &str) -> Result<()>;
}

pub const BLOB_SCHEME: &str = "idb://";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn parse(uri: &str) -> Option<Self> {
        uri.strip_prefix(BLOB_SCHEME)
            .filter(|id| !id.is_empty())
            .map(|id| Self(id.to_string()))
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn uri(&self) -> String {
        format!("{}{}", BLOB_SCHEME, self.0)
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", BLOB_SCHEME, self.0)
    }
}

/// Every blob reference anywhere in the item, children included.
pub fn blob_refs(item: &Item) -> Vec<BlobRef> {
    fn walk(value: &Value, out: &mut Vec<BlobRef>) {
        match value {
            Value::String(s) => {
                if let Some(blob) = BlobRef::parse(s) {
                    if !out.contains(&blob) {
                        out.push(blob);
                    }
                }
            }
            Value::Array(values) => values.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    for (_, value) in item.fields() {
        walk(value, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blob_ref_parse() {
        let blob = BlobRef::parse("idb://cover-1").unwrap();
        assert_eq!(blob.id(), "cover-1");
        assert_eq!(blob.uri(), "idb://cover-1");
        assert_eq!(blob.to_string(), "idb://cover-1");
        assert!(BlobRef::parse("idb://").is_none());
        assert!(BlobRef::parse("https://x/y.png").is_none());
    }

    #[test]
    fn test_blob_refs_walks_children() {
        let item = Item::from_value(json!({
            "id": "alb1",
            "cover": "idb://c1",
            "songs": [{"id": "s1", "audio": "idb://a1"}, {"id": "s2", "audio": "idb://c1"}]
        }))
        .unwrap();
        let refs: Vec<String> = blob_refs(&item).iter().map(|b| b.id().to_string()).collect();
        assert_eq!(refs, vec!["c1", "a1"]);
    }

    #[test]
    fn test_feed_prunes_dropped_subscribers() {
        let feed = ChangeFeed::new();
        let rx = feed.subscribe();
        {
            let _gone = feed.subscribe();
        }
        feed.publish(StoreChange { key: "k".into(), kind: ChangeKind::Set });
        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(rx.try_recv().unwrap().key, "k");
    }
}
