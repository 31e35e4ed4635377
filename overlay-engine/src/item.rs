use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A content record: a JSON object whose id lives under the collection's
/// id field. Field order is preserved through merges and serialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(Map<String, Value>);

impl Item {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Returns `None` for anything that is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn insert(&mut self, field: &str, value: Value) {
        self.0.insert(field.to_string(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> impl Iterator<Item = (String, Value)> {
        self.0.into_iter()
    }

    /// Lenient child list: a missing or non-array field is empty and
    /// non-object entries are dropped.
    pub fn children(&self, field: &str) -> Vec<Item> {
        match self.0.get(field) {
            Some(Value::Array(values)) => values.iter().cloned().filter_map(Item::from_value).collect(),
            _ => Vec::new(),
        }
    }

    pub fn set_children(&mut self, field: &str, children: Vec<Item>) {
        let values = children.into_iter().map(Item::into_value).collect();
        self.0.insert(field.to_string(), Value::Array(values));
    }
}

impl From<Map<String, Value>> for Item {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Parses a JSON array into items, skipping entries that are not objects.
pub fn items_from_values(values: Vec<Value>) -> Vec<Item> {
    values.into_iter().filter_map(Item::from_value).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildSchema {
    pub field: &'static str,
    pub id_field: &'static str,
}

/// Describes where a collection keeps ids and nested children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Schema {
    pub key: &'static str,
    pub id_field: &'static str,
    pub children: Option<ChildSchema>,
}

impl Schema {
    pub const fn flat(key: &'static str, id_field: &'static str) -> Self {
        Self { key, id_field, children: None }
    }

    pub const fn nested(
        key: &'static str,
        id_field: &'static str,
        child_field: &'static str,
        child_id_field: &'static str,
    ) -> Self {
        Self {
            key,
            id_field,
            children: Some(ChildSchema { field: child_field, id_field: child_id_field }),
        }
    }

    pub fn id_of<'a>(&self, item: &'a Item) -> Option<&'a str> {
        item.get_str(self.id_field)
    }

    pub fn child_id_of<'a>(&self, child: &'a Item) -> Option<&'a str> {
        self.children.and_then(|c| child.get_str(c.id_field))
    }

    pub fn children_of(&self, item: &Item) -> Vec<Item> {
        match self.children {
            Some(c) => item.children(c.field),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Albums,
    Poems,
    Novels,
    Blogs,
    Projects,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 5] = [
        CollectionKind::Albums,
        CollectionKind::Poems,
        CollectionKind::Novels,
        CollectionKind::Blogs,
        CollectionKind::Projects,
    ];

    pub const fn schema(self) -> Schema {
        match self {
            CollectionKind::Albums => Schema::nested("albums", "id", "songs", "id"),
            CollectionKind::Poems => Schema::flat("poems", "slug"),
            CollectionKind::Novels => Schema::nested("novels", "slug", "chapters", "slug"),
            CollectionKind::Blogs => Schema::flat("blogs", "slug"),
            CollectionKind::Projects => Schema::flat("projects", "slug"),
        }
    }

    pub const fn key(self) -> &'static str {
        self.schema().key
    }
}
