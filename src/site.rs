use std::collections::HashSet;
use std::fmt::Display;

use overlay_engine::{
    blob_refs, load_defaults, BlobRef, BlobStore, Clock, Collection, CollectionKind, ContentsTransport,
    DefaultsSlot, DefaultsSource, DeleteOutcome, DeleteReceipt, Item, KvStore, RemoteSync, SyncError, SyncReport,
    SystemClock, Ticket, Toast, Tone, TombstoneStore, UndoCoordinator,
};
use tracing::{debug, info, warn};

use crate::backend::{open_store, StudioStore};
use crate::config::{StudioConfig, ToastConfig};
use crate::github::GithubContents;

const KINDS: usize = CollectionKind::ALL.len();

/// Status line for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStatus {
    pub kind: CollectionKind,
    pub visible: usize,
    pub pending: bool,
}

/// The editor's entry point: every collection over one shared store, the
/// toast/undo slot, and publishing to the remote.
pub struct Studio<S, T, C> {
    store: S,
    collections: [Collection<S>; KINDS],
    slots: [DefaultsSlot; KINDS],
    sync: RemoteSync<T>,
    undo: UndoCoordinator<C>,
    toasts: ToastConfig,
    next_blob: u64,
}

impl<S, T, C> Studio<S, T, C>
where
    S: KvStore + BlobStore + Clone + 'static,
    T: ContentsTransport,
    C: Clock,
{
    pub fn new(store: S, transport: T, clock: C, config: &StudioConfig) -> Self {
        let collections =
            CollectionKind::ALL.map(|kind| Collection::new(kind.schema(), TombstoneStore::new(store.clone())));
        Self {
            store,
            collections,
            slots: std::array::from_fn(|_| DefaultsSlot::new()),
            sync: RemoteSync::new(transport, &config.remote.branch, &config.remote.path_prefix),
            undo: UndoCoordinator::new(clock),
            toasts: config.toasts.clone(),
            next_blob: 0,
        }
    }

    pub fn collection(&self, kind: CollectionKind) -> &Collection<S> {
        &self.collections[kind as usize]
    }

    pub fn view(&self, kind: CollectionKind) -> Vec<Item> {
        self.collection(kind).view()
    }

    pub fn sync(&self) -> &RemoteSync<T> {
        &self.sync
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.undo.current_toast()
    }

    pub fn status(&self) -> Vec<CollectionStatus> {
        self.collections
            .iter()
            .zip(CollectionKind::ALL)
            .map(|(collection, kind)| CollectionStatus {
                kind,
                visible: collection.view().len(),
                pending: collection.has_pending_changes(),
            })
            .collect()
    }

    fn surface<V, E: Display>(&mut self, result: Result<V, E>) -> Result<V, E> {
        if let Err(e) = &result {
            self.undo.notify(e.to_string(), Tone::Error, self.toasts.sync_ms);
        }
        result
    }

    pub fn begin_defaults(&self, kind: CollectionKind) -> Ticket {
        self.slots[kind as usize].begin()
    }

    /// Installs defaults for `kind` unless a newer request has started.
    pub fn accept_defaults(&mut self, kind: CollectionKind, ticket: Ticket, items: Vec<Item>) -> bool {
        let slot = &mut self.slots[kind as usize];
        if !slot.accept(ticket, items) {
            return false;
        }
        let items = slot.items().to_vec();
        self.collections[kind as usize].set_defaults(items);
        true
    }

    /// Loads every collection's defaults, keeping the current ones for any
    /// collection whose source fails.
    pub fn refresh_defaults<D: DefaultsSource + ?Sized>(&mut self, source: &D) {
        for kind in CollectionKind::ALL {
            let ticket = self.begin_defaults(kind);
            let items = load_defaults(source, &kind.schema(), self.collection(kind).defaults());
            self.accept_defaults(kind, ticket, items);
        }
    }

    /// Creates the item, or patches it if its id is already visible. Ids
    /// hidden by a pending delete are refused until the delete is undone.
    pub fn save(&mut self, kind: CollectionKind, item: Item) -> overlay_engine::Result<bool> {
        let collection = self.collection(kind).clone();
        let Some(id) = collection.schema().id_of(&item).map(str::to_string) else {
            return Ok(false);
        };
        if collection.deleted().contains(&id) {
            debug!(collection = kind.key(), id = %id, "save ignored: id is deleted");
            return Ok(false);
        }
        let result = if collection.get(&id).is_some() {
            collection.update(&id, item)
        } else {
            collection.create(item)
        };
        let saved = self.surface(result)?;
        if saved {
            self.undo.notify("Saved", Tone::Success, self.toasts.save_ms);
        }
        Ok(saved)
    }

    pub fn delete(&mut self, kind: CollectionKind, id: &str) -> overlay_engine::Result<DeleteOutcome> {
        let result = self.collection(kind).delete(id);
        let receipt = self.surface(result)?;
        Ok(self.arm_undo(kind, receipt))
    }

    pub fn delete_child(
        &mut self,
        kind: CollectionKind,
        parent_id: &str,
        child_id: &str,
    ) -> overlay_engine::Result<DeleteOutcome> {
        let result = self.collection(kind).delete_child(parent_id, child_id);
        let receipt = self.surface(result)?;
        Ok(self.arm_undo(kind, receipt))
    }

    fn arm_undo(&mut self, kind: CollectionKind, receipt: DeleteReceipt) -> DeleteOutcome {
        if receipt.outcome == DeleteOutcome::Missing {
            return receipt.outcome;
        }
        let label = receipt
            .removed
            .as_ref()
            .and_then(|item| item.get_str("title"))
            .map(|title| format!("Deleted \"{title}\""))
            .unwrap_or_else(|| "Deleted".to_string());
        let orphans = receipt.removed.as_ref().map(blob_refs).unwrap_or_default();

        let collection = self.collection(kind).clone();
        let reversal = receipt.reversal;
        let collections = self.collections.clone();
        let blobs = self.store.clone();

        self.undo.arm(
            label,
            self.toasts.delete_undo_ms,
            move || collection.restore(&reversal).map(|_| ()),
            move || release_blobs(&blobs, &collections, &orphans),
        );
        receipt.outcome
    }

    /// Reverses the last delete if its toast is still up.
    pub fn undo(&mut self) -> overlay_engine::Result<bool> {
        let result = self.undo.undo();
        self.surface(result)
    }

    /// Advances toast and undo deadlines; call from the event loop.
    pub fn tick(&mut self) {
        self.undo.tick();
    }

    /// Stores an attachment and returns the reference to embed in an item.
    pub fn attach_blob(&mut self, bytes: &[u8]) -> overlay_engine::Result<BlobRef> {
        self.next_blob += 1;
        let blob = BlobRef::new(format!("{}-{}", self.undo.clock().now_millis(), self.next_blob));
        let result = self.store.put_blob(blob.id(), bytes);
        self.surface(result)?;
        Ok(blob)
    }

    pub fn blob(&self, blob: &BlobRef) -> overlay_engine::Result<Option<Vec<u8>>> {
        self.store.get_blob(blob.id())
    }

    /// Publishes the merged view of `kind`. Local edits stay staged either
    /// way.
    pub fn publish(&mut self, kind: CollectionKind) -> Result<SyncReport, SyncError> {
        let items = self.view(kind);
        let result = self.sync.publish(kind.key(), &items);
        let report = self.surface(result)?;
        info!(collection = kind.key(), attempts = report.attempts, "collection published");
        self.undo
            .notify(format!("Published {}", kind.key()), Tone::Success, self.toasts.sync_ms);
        Ok(report)
    }

    pub fn reset(&mut self, kind: CollectionKind) -> overlay_engine::Result<()> {
        let result = self.collection(kind).reset();
        self.surface(result)
    }
}

impl Studio<StudioStore, GithubContents, SystemClock> {
    /// Builds the studio the config describes: the configured store (or an
    /// in-memory one), the GitHub remote and the wall clock. Defaults are
    /// not fetched here; see [`Studio::refresh_defaults`].
    pub fn open(config: &StudioConfig) -> anyhow::Result<Self> {
        let store = open_store(&config.store)?;
        let remote = GithubContents::from_config(&config.remote);
        Ok(Self::new(store, remote, SystemClock, config))
    }
}

/// Deletes the blobs in `candidates` that no collection references any more.
fn release_blobs<S: KvStore + BlobStore>(
    blobs: &S,
    collections: &[Collection<S>],
    candidates: &[BlobRef],
) -> overlay_engine::Result<()> {
    if candidates.is_empty() {
        return Ok(());
    }
    let referenced: HashSet<BlobRef> = collections
        .iter()
        .flat_map(|c| c.view())
        .flat_map(|item| blob_refs(&item))
        .collect();
    for blob in candidates.iter().filter(|b| !referenced.contains(*b)) {
        debug!(blob = %blob, "releasing orphaned blob");
        if let Err(e) = blobs.delete_blob(blob.id()) {
            warn!(blob = %blob, error = %e, "could not release blob");
            return Err(e);
        }
    }
    Ok(())
}
