mod collection;
pub mod content;
mod defaults;
mod error;
mod item;
mod merge;
mod order;
pub mod storage;
mod store;
mod sync;
mod tombstone;
mod undo;

pub use collection::{Collection, DeleteOutcome, DeleteReceipt, Direction, LiveView, Reversal};
pub use defaults::{
    load_defaults, parse_defaults, DefaultsError, DefaultsSlot, DefaultsSource, RequestTracker, StaticDefaults,
    Ticket,
};
pub use error::{Error, Result};
pub use item::{items_from_values, ChildSchema, CollectionKind, Item, Schema};
pub use merge::{merge, merge_children, merge_item, merge_with_report, MergeReport};
pub use storage::{blob_refs, BlobRef, BlobStore, ChangeFeed, ChangeKind, KvStore, MemoryStore, StoreChange};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use order::ViewOrder;
pub use store::{collection_of_key, deleted_key, local_key, order_key, TombstoneStore};
pub use sync::{
    commit_message, document_path, encode_document, CommitInfo, ContentsTransport, PutRequest, RemoteDocument,
    RemoteSync, SyncError, SyncReport, SyncState, TransportError,
};
pub use tombstone::Tombstone;
pub use undo::{Clock, ManualClock, SystemClock, Toast, Tone, UndoCoordinator};
