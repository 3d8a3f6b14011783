//! Shared Automerge document with origin-tagged change notifications
//!
//! `SharedDoc` wraps an Automerge document behind a cheaply-cloneable
//! handle. The host application and the sync components all hold clones of
//! the same handle; nobody owns the document exclusively.
//!
//! Every apply carries an [`Origin`] tag, and every change notification
//! re-emits that tag. The tag is how the observers break the feedback
//! loop: the live engine never re-broadcasts `Origin::Remote` deltas, and
//! the store adapter never re-persists its own `Origin::Store` bootstrap
//! apply. Without the tags, apply → notify → rebroadcast/repersist →
//! apply elsewhere would cycle forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use automerge::{AutoCommit, ChangeHash};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::SyncResult;

/// Capacity of the per-document change notification channel
const DOC_EVENT_CAPACITY: usize = 256;

/// Who applied a delta to the document
///
/// Closed set; observers filter on this tag rather than on object
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The host application edited the document directly
    Local,
    /// The live sync engine applied a delta received from a peer
    Remote,
    /// The store adapter applied the persisted snapshot at bootstrap
    Store,
}

/// Change notification emitted by a [`SharedDoc`]
#[derive(Debug, Clone)]
pub enum DocEvent {
    /// A delta was applied to the document
    Updated {
        /// Who applied it
        origin: Origin,
        /// The delta bytes (Automerge incremental save)
        update: Vec<u8>,
    },
    /// The document was torn down by the host
    Closed,
}

struct DocInner {
    doc: Mutex<AutoCommit>,
    events: broadcast::Sender<DocEvent>,
    closed: AtomicBool,
}

/// Cloneable handle to a shared Automerge document
///
/// # Example
///
/// ```ignore
/// use automerge::{transaction::Transactable, ROOT};
/// use relaydoc_core::SharedDoc;
///
/// let doc = SharedDoc::new();
/// doc.edit(|d| d.put(ROOT, "title", "meeting notes"))?;
/// ```
#[derive(Clone)]
pub struct SharedDoc {
    inner: Arc<DocInner>,
}

impl SharedDoc {
    /// Create a new empty document
    pub fn new() -> Self {
        Self::from_doc(AutoCommit::new())
    }

    /// Load a document from full-save bytes
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Document` if the bytes are not a valid
    /// Automerge document.
    pub fn load(data: &[u8]) -> SyncResult<Self> {
        Ok(Self::from_doc(AutoCommit::load(data)?))
    }

    fn from_doc(doc: AutoCommit) -> Self {
        let (events, _) = broadcast::channel(DOC_EVENT_CAPACITY);
        Self {
            inner: Arc::new(DocInner {
                doc: Mutex::new(doc),
                events,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to change notifications
    ///
    /// Notifications fire synchronously with applies and in apply order.
    /// A subscriber that lags more than the channel capacity behind
    /// observes a lag error instead of the missed events; consumers
    /// recover through the normal reconciliation paths rather than
    /// assuming lossless delivery.
    pub fn changes(&self) -> broadcast::Receiver<DocEvent> {
        self.inner.events.subscribe()
    }

    /// Apply a host edit to the document
    ///
    /// Runs the closure against the document, derives the exact delta the
    /// edit produced, and notifies observers with `Origin::Local`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Document` if the transaction fails; no
    /// notification is emitted in that case.
    pub fn edit<F, T>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&mut AutoCommit) -> Result<T, automerge::AutomergeError>,
    {
        let mut doc = self.inner.doc.lock();
        let before = doc.get_heads();
        let value = f(&mut doc)?;
        let update = doc.save_after(&before);
        drop(doc);

        if !update.is_empty() {
            let _ = self.inner.events.send(DocEvent::Updated {
                origin: Origin::Local,
                update,
            });
        }
        Ok(value)
    }

    /// Apply a delta produced elsewhere, tagged with its origin
    ///
    /// Deltas are idempotent and commutative; applying one twice or out
    /// of arrival order converges to the same state.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Document` if the delta is corrupt; no
    /// notification is emitted in that case.
    pub fn apply_update(&self, update: &[u8], origin: Origin) -> SyncResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.inner.doc.lock().load_incremental(update)?;
        let _ = self.inner.events.send(DocEvent::Updated {
            origin,
            update: update.to_vec(),
        });
        Ok(())
    }

    /// Read from the document
    pub fn read<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&AutoCommit) -> T,
    {
        f(&self.inner.doc.lock())
    }

    /// Full document state as bytes
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.doc.lock().save()
    }

    /// Current document heads
    ///
    /// The heads summarize what this replica has seen; they are the
    /// state vector exchanged during reconciliation.
    pub fn heads(&self) -> Vec<ChangeHash> {
        self.inner.doc.lock().get_heads()
    }

    /// Delta containing everything this document has that the given heads
    /// do not reflect
    ///
    /// Empty when the other replica is missing nothing.
    pub fn missing_from(&self, heads: &[ChangeHash]) -> Vec<u8> {
        self.inner.doc.lock().save_after(heads)
    }

    /// Signal document teardown to all observers
    ///
    /// The store adapter reacts by flushing and destroying itself.
    /// Idempotent.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            let _ = self.inner.events.send(DocEvent::Closed);
        }
    }

    /// Whether the host has torn the document down
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Default for SharedDoc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automerge::{transaction::Transactable, ReadDoc, ROOT};

    fn text_at(doc: &SharedDoc, key: &str) -> Option<String> {
        doc.read(|d| {
            d.get(ROOT, key)
                .ok()
                .flatten()
                .and_then(|(v, _)| v.to_str().map(|s| s.to_string()))
        })
    }

    #[tokio::test]
    async fn test_edit_emits_local_delta() {
        let doc = SharedDoc::new();
        let mut rx = doc.changes();

        doc.edit(|d| d.put(ROOT, "title", "hello")).unwrap();

        match rx.recv().await.unwrap() {
            DocEvent::Updated { origin, update } => {
                assert_eq!(origin, Origin::Local);

                // The delta alone reproduces the edit on a fresh replica
                let other = SharedDoc::new();
                other.apply_update(&update, Origin::Remote).unwrap();
                assert_eq!(text_at(&other, "title").as_deref(), Some("hello"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_update_carries_origin() {
        let source = SharedDoc::new();
        source.edit(|d| d.put(ROOT, "k", "v")).unwrap();
        let delta = source.snapshot();

        let doc = SharedDoc::new();
        let mut rx = doc.changes();
        doc.apply_update(&delta, Origin::Store).unwrap();

        match rx.recv().await.unwrap() {
            DocEvent::Updated { origin, .. } => assert_eq!(origin, Origin::Store),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_apply_update_is_idempotent() {
        let source = SharedDoc::new();
        source.edit(|d| d.put(ROOT, "k", "v")).unwrap();
        let delta = source.snapshot();

        let doc = SharedDoc::new();
        doc.apply_update(&delta, Origin::Remote).unwrap();
        let once = doc.snapshot();
        doc.apply_update(&delta, Origin::Remote).unwrap();
        assert_eq!(doc.snapshot(), once);
    }

    #[test]
    fn test_apply_corrupt_update_fails_without_notification() {
        let doc = SharedDoc::new();
        let mut rx = doc.changes();

        assert!(doc.apply_update(&[0xde, 0xad, 0xbe, 0xef], Origin::Remote).is_err());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_missing_from_is_empty_when_converged() {
        let doc = SharedDoc::new();
        doc.edit(|d| d.put(ROOT, "k", "v")).unwrap();

        let heads = doc.heads();
        assert!(doc.missing_from(&heads).is_empty());
        assert!(!doc.missing_from(&[]).is_empty());
    }

    #[test]
    fn test_snapshot_load_roundtrip() {
        let doc = SharedDoc::new();
        doc.edit(|d| d.put(ROOT, "content", "persisted content")).unwrap();

        let loaded = SharedDoc::load(&doc.snapshot()).unwrap();
        assert_eq!(
            text_at(&loaded, "content").as_deref(),
            Some("persisted content")
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let doc = SharedDoc::new();
        let mut rx = doc.changes();

        doc.close();
        doc.close();

        assert!(matches!(rx.recv().await.unwrap(), DocEvent::Closed));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        assert!(doc.is_closed());
    }
}
