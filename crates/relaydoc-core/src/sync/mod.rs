//! Live synchronization over a broadcast channel
//!
//! Keeps the local document converged with every peer subscribed to the
//! same channel, with bounded and predictable broadcast volume.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  LiveSync (one per document)                                    │
//! │  ├── driver task: joins the channel, runs the session loop      │
//! │  │   ├── channel events (status signals, peer messages)         │
//! │  │   ├── local document changes (origin-filtered)               │
//! │  │   ├── throttle deadline (coalesced broadcasts)               │
//! │  │   └── cancellation (shutdown)                                │
//! │  ├── reconnect loop: exponential backoff between sessions       │
//! │  └── EventHub<SyncEvent>: status / message / error notifications│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reconciliation
//!
//! On every (re)connect a replica broadcasts its state vector. A peer
//! receiving one for the first time in a connection epoch answers with
//! the delta the prober is missing, then re-advertises its own state
//! vector so the exchange runs symmetrically. Two peers converge in at
//! most one request/response round per connection epoch; repeated probes
//! from the same peer are idempotent no-ops.

pub mod engine;
pub mod protocol;

pub use engine::{LiveSync, SyncOptions};
pub use protocol::{ProbePayload, UpdatePayload, UserRef, MSG_STATE_VECTOR, MSG_UPDATE};
