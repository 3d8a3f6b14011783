//! Store adapter: bootstrap load, debounced write-back, flush on shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::doc::{DocEvent, Origin, SharedDoc};
use crate::error::SyncResult;
use crate::events::{EventHub, StoreEvent};
use crate::types::DocName;

use super::{SnapshotStore, TableSpec};

/// Configuration for [`StoreAdapter`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Quiet period after the last mutation before the snapshot is written
    pub debounce: Duration,
    /// Where the snapshot rows live
    pub table: TableSpec,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            table: TableSpec::default(),
        }
    }
}

struct AdapterShared {
    doc: SharedDoc,
    store: Arc<dyn SnapshotStore>,
    name: DocName,
    options: StoreOptions,
    /// False until the initial load-merge-store cycle completes; monotonic
    synced: AtomicBool,
    destroyed: AtomicBool,
    /// Mutations observed since the last successful write began
    dirty: AtomicBool,
    hub: EventHub<StoreEvent>,
}

impl AdapterShared {
    /// Write the full current document state, replacing any prior row
    async fn flush(&self) -> SyncResult<()> {
        self.dirty.store(false, Ordering::SeqCst);
        let state = codec::encode(&self.doc.snapshot());
        debug!(doc = %self.name, bytes = state.len(), "Writing snapshot");
        self.store
            .upsert(&self.options.table, self.name.as_str(), &state)
            .await
    }
}

/// Durable store adapter for one shared document
///
/// Runs a background driver task that loads and merges the persisted
/// snapshot at construction, then debounces write-backs of the full
/// document state on every local mutation. The adapter destroys itself
/// when the document signals teardown, flushing anything pending.
///
/// # Example
///
/// ```ignore
/// use relaydoc_core::{SharedDoc, StoreAdapter, StoreOptions};
///
/// let doc = SharedDoc::new();
/// let adapter = StoreAdapter::start(doc.clone(), store, "notes", StoreOptions::default());
/// let mut events = adapter.subscribe();
///
/// // ... edit the document; snapshots are persisted automatically ...
///
/// adapter.destroy().await?;
/// ```
pub struct StoreAdapter {
    shared: Arc<AdapterShared>,
    cancel: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StoreAdapter {
    /// Start persisting `doc` under the row keyed by `name`
    ///
    /// The bootstrap load begins immediately in the background.
    pub fn start(
        doc: SharedDoc,
        store: Arc<dyn SnapshotStore>,
        name: impl Into<DocName>,
        options: StoreOptions,
    ) -> Self {
        let shared = Arc::new(AdapterShared {
            doc,
            store,
            name: name.into(),
            options,
            synced: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            hub: EventHub::new(),
        });
        let cancel = CancellationToken::new();

        info!(doc = %shared.name, "Store adapter starting");
        let task = tokio::spawn(drive(shared.clone(), cancel.clone()));

        Self {
            shared,
            cancel,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Subscribe to adapter notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.shared.hub.subscribe()
    }

    /// Whether the initial load-merge-store cycle has completed
    ///
    /// Monotonic: once true, never reverts. True even when bootstrap hit a
    /// recoverable fetch or write error — the document stays usable.
    pub fn synced(&self) -> bool {
        self.shared.synced.load(Ordering::SeqCst)
    }

    /// Whether the adapter has been destroyed
    pub fn destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    /// The document name this adapter persists
    pub fn name(&self) -> &DocName {
        &self.shared.name
    }

    /// Stop the adapter, flushing current state first
    ///
    /// The write-back is unconditional: a mutation may still be queued
    /// between the document and the driver task when destroy is called,
    /// so the pending-timer state cannot prove there is nothing to save.
    /// Safe to call more than once; subsequent calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Store` if the final flush fails. The adapter is
    /// destroyed regardless.
    pub async fn destroy(&self) -> SyncResult<()> {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_task().await;
        self.shared.flush().await?;
        info!(doc = %self.shared.name, "Store adapter destroyed");
        Ok(())
    }

    /// Destroy the adapter and delete the persisted row
    ///
    /// The driver task is fully stopped before the delete is issued and
    /// the final flush is skipped, so the delete cannot be overwritten by
    /// a late write.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Store` if the delete fails; the caller asked
    /// for removal and needs to know it did not happen.
    pub async fn remove(&self) -> SyncResult<()> {
        if !self.shared.destroyed.swap(true, Ordering::SeqCst) {
            self.stop_task().await;
        }
        self.shared
            .store
            .delete(&self.shared.options.table, self.shared.name.as_str())
            .await?;
        info!(doc = %self.shared.name, "Persisted snapshot removed");
        Ok(())
    }

    async fn stop_task(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!(doc = %self.shared.name, error = %e, "Driver task ended abnormally");
            }
        }
    }
}

/// Driver: bootstrap once, then debounce write-backs until teardown
async fn drive(shared: Arc<AdapterShared>, cancel: CancellationToken) {
    // Subscribe before the bootstrap fetch so edits made while it is in
    // flight are not missed
    let mut changes = shared.doc.changes();

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = bootstrap(&shared) => {}
    }

    let mut write_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            change = changes.recv() => match change {
                Ok(DocEvent::Updated { origin, .. }) if origin != Origin::Store => {
                    // Restart the single delay timer; a burst of edits
                    // inside one quiet period costs one write
                    shared.dirty.store(true, Ordering::SeqCst);
                    write_at = Some(Instant::now() + shared.options.debounce);
                }
                // Our own bootstrap apply must not re-persist
                Ok(DocEvent::Updated { .. }) => {}
                Ok(DocEvent::Closed) => {
                    if shared.destroyed.swap(true, Ordering::SeqCst) {
                        return;
                    }
                    if shared.dirty.load(Ordering::SeqCst) {
                        if let Err(e) = shared.flush().await {
                            warn!(doc = %shared.name, error = %e, "Final flush failed");
                            shared.hub.emit(StoreEvent::Error { message: e.to_string() });
                        }
                    }
                    debug!(doc = %shared.name, "Adapter destroyed on document teardown");
                    return;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The write reads the full current state, so lag only
                    // means we missed the notification, not the data
                    warn!(doc = %shared.name, skipped, "Lagged behind on document changes");
                    shared.dirty.store(true, Ordering::SeqCst);
                    write_at = Some(Instant::now() + shared.options.debounce);
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },

            _ = sleep_until_deadline(write_at), if write_at.is_some() => {
                write_at = None;
                if let Err(e) = shared.flush().await {
                    warn!(doc = %shared.name, error = %e, "Snapshot write failed");
                    shared.hub.emit(StoreEvent::Error { message: e.to_string() });
                }
            }
        }
    }
}

/// Load, merge, and seed the persisted row; mark the adapter synced
///
/// Every step is recoverable: fetch and write failures become error
/// notifications and the adapter still reaches `synced`.
async fn bootstrap(shared: &AdapterShared) {
    debug!(doc = %shared.name, "Loading persisted snapshot");
    match shared
        .store
        .fetch(&shared.options.table, shared.name.as_str())
        .await
    {
        Ok(Some(state)) => {
            let applied = codec::decode(&state)
                .and_then(|bytes| shared.doc.apply_update(&bytes, Origin::Store));
            match applied {
                Ok(()) => info!(doc = %shared.name, "Merged persisted snapshot"),
                Err(e) => {
                    warn!(doc = %shared.name, error = %e, "Persisted snapshot is corrupt");
                    shared.hub.emit(StoreEvent::Error { message: e.to_string() });
                }
            }
        }
        Ok(None) => debug!(doc = %shared.name, "No persisted snapshot (cold start)"),
        Err(e) => {
            warn!(doc = %shared.name, error = %e, "Failed to load persisted snapshot");
            shared.hub.emit(StoreEvent::Error { message: e.to_string() });
        }
    }

    // Unconditional write-back: seeds a cold-start row and folds any local
    // pre-existing content together with what was just loaded
    if let Err(e) = shared.flush().await {
        warn!(doc = %shared.name, error = %e, "Initial snapshot write failed");
        shared.hub.emit(StoreEvent::Error { message: e.to_string() });
    }

    shared.synced.store(true, Ordering::SeqCst);
    shared.hub.emit(StoreEvent::Synced);
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_options_defaults() {
        let options = StoreOptions::default();
        assert_eq!(options.debounce, Duration::from_millis(1000));
        assert_eq!(options.table, TableSpec::default());
    }
}
