//! Lifecycle notifications and the typed event hub
//!
//! Both the live sync engine and the store adapter expose what happens
//! inside their background tasks through an `EventHub`: a typed
//! publish/subscribe facility with no ordering guarantees beyond emission
//! order. Subscribers are plain broadcast receivers, so a subscriber can
//! drop out at any point (including while an emit is in flight) without
//! affecting the others.

use std::fmt;

use tokio::sync::broadcast;

/// Default capacity for event broadcast channels
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Typed publish/subscribe hub for lifecycle notifications
///
/// Emission is best-effort: events sent while no subscriber is attached
/// are dropped, and a slow subscriber that falls more than the channel
/// capacity behind observes a lag rather than blocking the emitter.
#[derive(Debug, Clone)]
pub struct EventHub<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventHub<E> {
    /// Create a new hub with the default capacity
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers
    pub fn emit(&self, event: E) {
        let _ = self.tx.send(event);
    }
}

impl<E: Clone> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection status of the live sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Establishing the channel subscription (initial, and re-entered on
    /// every reconnect attempt)
    Connecting,
    /// Subscription acknowledged by the transport
    Connected,
    /// Channel error, timeout, or clean close
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Events emitted by the live sync engine
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection status changed
    Status(ConnectionStatus),
    /// The channel subscription was acknowledged
    Connected,
    /// The channel was lost (fault or clean close)
    Disconnected,
    /// A content delta from a peer was applied to the local document
    Message {
        /// The raw (decoded) delta bytes
        update: Vec<u8>,
    },
    /// A recoverable fault occurred (codec, apply, or send failure)
    Error {
        /// Description of the fault
        message: String,
    },
}

/// Events emitted by the durable store adapter
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// The initial load-merge-store cycle completed
    Synced,
    /// A recoverable fault occurred (fetch, decode, or write failure)
    Error {
        /// Description of the fault
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", ConnectionStatus::Connecting), "Connecting");
        assert_eq!(format!("{}", ConnectionStatus::Connected), "Connected");
        assert_eq!(
            format!("{}", ConnectionStatus::Disconnected),
            "Disconnected"
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let hub: EventHub<SyncEvent> = EventHub::new();
        hub.emit(SyncEvent::Connected);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive() {
        let hub: EventHub<SyncEvent> = EventHub::new();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        hub.emit(SyncEvent::Connected);

        assert!(matches!(rx1.recv().await, Ok(SyncEvent::Connected)));
        assert!(matches!(rx2.recv().await, Ok(SyncEvent::Connected)));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_affect_others() {
        let hub: EventHub<SyncEvent> = EventHub::new();
        let rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        drop(rx1);
        hub.emit(SyncEvent::Disconnected);

        assert!(matches!(rx2.recv().await, Ok(SyncEvent::Disconnected)));
    }
}
