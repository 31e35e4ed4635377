//! Typed views over merged collections.
//!
//! The overlay engine works on untyped [`Item`]s so unknown fields survive
//! every merge. These structs are for callers that render or validate
//! content; unknown fields are ignored when converting.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::item::{CollectionKind, Item};

pub trait Content: DeserializeOwned + Serialize {
    const KIND: CollectionKind;

    fn id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Song {
    pub id: String,
    pub title: Option<String>,
    pub audio: Option<String>,
    pub lyrics: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Album {
    pub id: String,
    pub title: Option<String>,
    pub cover: Option<String>,
    pub year: Option<u16>,
    pub description: Option<String>,
    pub songs: Vec<Song>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Poem {
    pub slug: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Chapter {
    pub slug: String,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Novel {
    pub slug: String,
    pub title: Option<String>,
    pub synopsis: Option<String>,
    pub cover: Option<String>,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Blog {
    pub slug: String,
    pub title: Option<String>,
    pub date: Option<String>,
    pub body: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub slug: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub body: Option<String>,
    pub tags: Vec<String>,
}

macro_rules! content {
    ($ty:ty, $kind:expr, $id:ident) => {
        impl Content for $ty {
            const KIND: CollectionKind = $kind;

            fn id(&self) -> &str {
                &self.$id
            }
        }
    };
}

content!(Album, CollectionKind::Albums, id);
content!(Poem, CollectionKind::Poems, slug);
content!(Novel, CollectionKind::Novels, slug);
content!(Blog, CollectionKind::Blogs, slug);
content!(Project, CollectionKind::Projects, slug);

/// Converts merged items, dropping any that do not fit `T` or lack an id.
pub fn typed<T: Content>(items: &[Item]) -> Vec<T> {
    items
        .iter()
        .filter_map(|item| match serde_json::to_value(item).and_then(serde_json::from_value::<T>) {
            Ok(value) if !value.id().is_empty() => Some(value),
            Ok(_) => None,
            Err(e) => {
                debug!(collection = T::KIND.key(), error = %e, "skipping untyped item");
                None
            }
        })
        .collect()
}

pub fn to_item<T: Content>(value: &T) -> Option<Item> {
    serde_json::to_value(value).ok().and_then(Item::from_value)
}
