//! RelayDoc Core Library
//!
//! Broadcast-channel synchronization and durable snapshots for shared
//! Automerge documents.
//!
//! ## Overview
//!
//! RelayDoc keeps replicas of one shared CRDT document converged across
//! clients attached to the same fan-out broadcast channel, and persists
//! the merged document to a row store so late-joining or reconnecting
//! clients can bootstrap without any currently-connected peer.
//!
//! Two subsystems cooperate around a [`SharedDoc`]:
//!
//! - [`LiveSync`] reconciles divergent replicas over the channel using
//!   state-vector exchange, coalesces outgoing deltas, and reconnects
//!   with exponential backoff.
//! - [`StoreAdapter`] loads and merges the persisted snapshot on startup,
//!   debounces full-snapshot write-backs, and flushes on shutdown.
//!
//! The channel and the row store are trait seams ([`Transport`],
//! [`SnapshotStore`]); RelayDoc contains no network or database client.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use automerge::transaction::Transactable;
//! use relaydoc_core::{LiveSync, SharedDoc, StoreAdapter, StoreOptions, SyncOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let doc = SharedDoc::new();
//!
//!     // transport: Arc<dyn Transport>, store: Arc<dyn SnapshotStore>
//!     let sync = LiveSync::start(doc.clone(), transport, "notes", SyncOptions::default());
//!     let adapter = StoreAdapter::start(doc.clone(), store, "notes", StoreOptions::default());
//!
//!     doc.edit(|d| d.put(automerge::ROOT, "title", "shared notes"))?;
//!
//!     // ... peers converge, snapshots persist ...
//!
//!     sync.shutdown().await;
//!     adapter.destroy().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod doc;
pub mod error;
pub mod events;
pub mod store;
pub mod sync;
pub mod transport;
pub mod types;

// Re-exports
pub use doc::{DocEvent, Origin, SharedDoc};
pub use error::{SyncError, SyncResult};
pub use events::{ConnectionStatus, EventHub, StoreEvent, SyncEvent};
pub use store::{SnapshotStore, StoreAdapter, StoreOptions, TableSpec};
pub use sync::{LiveSync, SyncOptions};
pub use transport::{ChannelConnection, ChannelEvent, ChannelSender, ChannelStatus, Transport};
pub use types::{DocName, PeerId};
