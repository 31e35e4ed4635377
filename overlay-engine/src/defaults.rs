use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{debug, warn};

use crate::item::{items_from_values, Item, Schema};

#[derive(Debug, thiserror::Error)]
pub enum DefaultsError {
    #[error("defaults unavailable: {0}")]
    Unavailable(String),
}

/// Where the baseline collection comes from: a bundled file, a published
/// JSON document, or anything else that yields a body.
pub trait DefaultsSource {
    fn fetch(&self, collection: &str) -> Result<String, DefaultsError>;
}

impl<F> DefaultsSource for F
where
    F: Fn(&str) -> Result<String, DefaultsError>,
{
    fn fetch(&self, collection: &str) -> Result<String, DefaultsError> {
        self(collection)
    }
}

/// A bundled document holding one or more collections.
#[derive(Debug, Clone)]
pub struct StaticDefaults {
    body: String,
}

impl StaticDefaults {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

impl DefaultsSource for StaticDefaults {
    fn fetch(&self, _collection: &str) -> Result<String, DefaultsError> {
        Ok(self.body.clone())
    }
}

/// Accepts `{ "<collection>": [...] }` or a bare array. Any other shape is
/// `None`.
pub fn parse_defaults(body: &str, collection: &str) -> Option<Vec<Item>> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Array(values) => Some(items_from_values(values)),
        Value::Object(mut map) => match map.remove(collection)? {
            Value::Array(values) => Some(items_from_values(values)),
            _ => None,
        },
        _ => None,
    }
}

/// Fetches and parses defaults, falling back on any failure.
pub fn load_defaults<D: DefaultsSource + ?Sized>(source: &D, schema: &Schema, fallback: &[Item]) -> Vec<Item> {
    let body = match source.fetch(schema.key) {
        Ok(body) => body,
        Err(e) => {
            warn!(collection = schema.key, error = %e, "using fallback defaults");
            return fallback.to_vec();
        }
    };
    match parse_defaults(&body, schema.key) {
        Some(items) => {
            debug!(collection = schema.key, count = items.len(), "loaded defaults");
            items
        }
        None => {
            warn!(collection = schema.key, "unreadable defaults document, using fallback");
            fallback.to_vec()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// Generation counter for in-flight requests: only the newest ticket may
/// land its result.
#[derive(Debug, Default)]
pub struct RequestTracker {
    latest: AtomicU64,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Holds the defaults last accepted for a collection.
#[derive(Debug, Default)]
pub struct DefaultsSlot {
    tracker: RequestTracker,
    items: Vec<Item>,
}

impl DefaultsSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        self.tracker.begin()
    }

    /// Stores `items` unless a newer request has started since `ticket`.
    pub fn accept(&mut self, ticket: Ticket, items: Vec<Item>) -> bool {
        if !self.tracker.is_current(ticket) {
            debug!("dropping stale defaults response");
            return false;
        }
        self.items = items;
        true
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::CollectionKind;

    #[test]
    fn test_parse_shapes() {
        let keyed = parse_defaults(r#"{"albums": [{"id": "a"}], "poems": []}"#, "albums").unwrap();
        assert_eq!(keyed.len(), 1);
        let bare = parse_defaults(r#"[{"slug": "p"}, 3]"#, "poems").unwrap();
        assert_eq!(bare.len(), 1);
        assert!(parse_defaults(r#"{"poems": []}"#, "albums").is_none());
        assert!(parse_defaults(r#"{"albums": {}}"#, "albums").is_none());
        assert!(parse_defaults("<html>502</html>", "albums").is_none());
    }

    #[test]
    fn test_load_falls_back() {
        let schema = CollectionKind::Albums.schema();
        let fallback = vec![Item::new().with("id", "bundled")];

        let down = |_: &str| -> Result<String, DefaultsError> { Err(DefaultsError::Unavailable("503".into())) };
        assert_eq!(load_defaults(&down, &schema, &fallback), fallback);

        let garbage = StaticDefaults::new("not json");
        assert_eq!(load_defaults(&garbage, &schema, &fallback), fallback);

        let good = StaticDefaults::new(r#"{"albums": [{"id": "remote"}]}"#);
        let loaded = load_defaults(&good, &schema, &fallback);
        assert_eq!(loaded[0].get_str("id"), Some("remote"));
    }

    #[test]
    fn test_stale_response_is_dropped() {
        let mut slot = DefaultsSlot::new();
        let first = slot.begin();
        let second = slot.begin();

        assert!(slot.accept(second, vec![Item::new().with("id", "new")]));
        assert!(!slot.accept(first, vec![Item::new().with("id", "old")]));
        assert_eq!(slot.items()[0].get_str("id"), Some("new"));
    }
}
