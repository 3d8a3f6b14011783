//! Broadcast transport seam
//!
//! The live sync engine runs above an opaque, at-most-once, fan-out
//! broadcast transport. This module pins down the contract the engine
//! consumes: join a channel by name, send JSON payloads tagged with a
//! message kind, receive messages and connection-status signals, leave on
//! shutdown. Delivery may be out of order, duplicated, or looped back to
//! the sender; the engine is built not to care.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SyncResult;

/// Connection-status signal from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The subscription was acknowledged
    Subscribed,
    /// The channel faulted
    ChannelError,
    /// The subscription attempt or the channel timed out
    TimedOut,
    /// The channel was closed cleanly
    Closed,
}

/// Event delivered on a joined channel
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Connection-status change
    Status(ChannelStatus),
    /// Inbound broadcast message
    Message {
        /// Message-type tag
        kind: String,
        /// JSON payload as sent by the peer
        payload: serde_json::Value,
    },
}

/// Sending half of a joined channel
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Broadcast a payload tagged with a message kind to all subscribers
    ///
    /// The transport may loop the message back to this sender.
    async fn send(&self, kind: &str, payload: serde_json::Value) -> SyncResult<()>;

    /// Release the subscription
    async fn leave(&self) -> SyncResult<()>;
}

/// A joined channel: sender plus event stream
///
/// The receiver is owned by a single task, mirroring the split between
/// sending and receiving halves; the sender may be used from anywhere.
pub struct ChannelConnection {
    /// Sending half
    pub sender: Box<dyn ChannelSender>,
    /// Ordered stream of status signals and inbound messages; the stream
    /// ending is equivalent to `ChannelStatus::Closed`
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Broadcast transport: a namespace of named fan-out channels
#[async_trait]
pub trait Transport: Send + Sync {
    /// Join the channel with the given name
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Channel` if the subscription cannot be
    /// established.
    async fn join(&self, channel: &str) -> SyncResult<ChannelConnection>;
}
