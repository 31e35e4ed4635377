#![allow(dead_code)]

use overlay_engine::{Collection, CollectionKind, Item, KvStore, MemoryStore, SqliteStore, Tombstone, TombstoneStore};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::json;

pub const SEED: u64 = 0x5eed;

pub fn generate_album(idx: usize, songs: usize) -> Item {
    let genres = ["ambient", "synthwave", "folk", "lofi", "post-rock"];
    let songs: Vec<_> = (0..songs)
        .map(|s| {
            json!({
                "id": format!("alb{idx}-s{s}"),
                "title": format!("Track {s}"),
                "audio": format!("https://cdn.airose.studio/audio/{idx}/{s}.mp3"),
                "duration": format!("{}:{:02}", 2 + s % 4, (s * 17) % 60),
            })
        })
        .collect();
    Item::from_value(json!({
        "id": format!("alb{idx}"),
        "title": format!("Album {idx}"),
        "cover": format!("https://cdn.airose.studio/covers/{idx}.jpg"),
        "year": 2015 + idx % 10,
        "description": format!("A {} record", genres[idx % genres.len()]),
        "songs": songs,
    }))
    .unwrap_or_default()
}

pub fn create_defaults(albums: usize, songs: usize) -> Vec<Item> {
    (0..albums).map(|i| generate_album(i, songs)).collect()
}

/// Edits `edited` random albums, appends `created` new ones.
pub fn create_overlay(albums: usize, edited: usize, created: usize) -> Vec<Item> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut ids: Vec<usize> = (0..albums).collect();
    ids.shuffle(&mut rng);

    let mut overlay: Vec<Item> = ids
        .into_iter()
        .take(edited)
        .map(|i| {
            Item::new()
                .with("id", format!("alb{i}"))
                .with("title", format!("Album {i} (remaster)"))
                .with("songs", json!([{"id": format!("alb{i}-bonus"), "title": "Bonus"}]))
        })
        .collect();
    overlay.extend((0..created).map(|i| generate_album(albums + i, 4)));
    overlay
}

pub fn create_tombstone(albums: usize, hidden: usize) -> Tombstone {
    let mut rng = StdRng::seed_from_u64(SEED ^ 1);
    let mut ids: Vec<usize> = (0..albums).collect();
    ids.shuffle(&mut rng);

    let mut tombstone = Tombstone::new();
    for i in ids.into_iter().take(hidden) {
        if i % 2 == 0 {
            tombstone.insert(&format!("alb{i}"));
        } else {
            tombstone.insert_child(&format!("alb{i}"), &format!("alb{i}-s0"));
        }
    }
    tombstone
}

fn collection<S: KvStore>(backend: S, albums: usize) -> Collection<S> {
    Collection::new(CollectionKind::Albums.schema(), TombstoneStore::new(backend))
        .with_defaults(create_defaults(albums, 8))
}

pub fn memory_collection(albums: usize) -> Collection<MemoryStore> {
    collection(MemoryStore::new(), albums)
}

pub fn sqlite_collection(albums: usize) -> Collection<SqliteStore> {
    let store = SqliteStore::open_in_memory().unwrap();
    collection(store, albums)
}
