//! Editor data core for the Airose Studio portfolio.
//!
//! Published content is the read-only baseline; edits are staged as a local
//! overlay with tombstones, merged on every read, and published back as one
//! JSON file per collection.
//!
//! # Example
//! ```rust
//! use airose_studio::{StudioConfig, Studio};
//! use overlay_engine::{CollectionKind, ManualClock, MemoryStore, StaticDefaults};
//! # use overlay_engine::{CommitInfo, ContentsTransport, PutRequest, RemoteDocument, TransportError};
//! # struct Offline;
//! # impl ContentsTransport for Offline {
//! #     fn fetch(&self, _: &str, _: &str) -> Result<Option<RemoteDocument>, TransportError> { Ok(None) }
//! #     fn put(&self, _: &PutRequest) -> Result<CommitInfo, TransportError> {
//! #         Ok(CommitInfo { sha: "c0".into(), url: None })
//! #     }
//! # }
//!
//! let mut studio = Studio::new(MemoryStore::new(), Offline, ManualClock::new(0), &StudioConfig::default());
//! studio.refresh_defaults(&StaticDefaults::new(r#"{"poems": [{"slug": "rain", "title": "Rain"}]}"#));
//!
//! // Hiding a published poem leaves a tombstone instead of touching the baseline.
//! studio.delete(CollectionKind::Poems, "rain").unwrap();
//! assert!(studio.view(CollectionKind::Poems).is_empty());
//!
//! // The delete stays undoable while its toast is up.
//! assert!(studio.undo().unwrap());
//! assert_eq!(studio.view(CollectionKind::Poems).len(), 1);
//! ```

pub mod backend;
pub mod config;
pub mod github;
pub mod site;
pub mod telemetry;

pub use backend::{open_store, StudioStore};
pub use config::{load_config, StudioConfig};
pub use github::{GithubContents, HttpDefaults};
pub use site::{CollectionStatus, Studio};
