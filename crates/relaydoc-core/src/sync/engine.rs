//! Live sync engine driving one channel subscription

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::doc::{DocEvent, Origin, SharedDoc};
use crate::error::SyncResult;
use crate::events::{ConnectionStatus, EventHub, SyncEvent};
use crate::transport::{ChannelConnection, ChannelEvent, ChannelSender, ChannelStatus, Transport};
use crate::types::{DocName, PeerId};

use super::protocol::{self, ProbePayload, UpdatePayload, MSG_STATE_VECTOR, MSG_UPDATE};

/// Configuration for [`LiveSync`]
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Coalesce outbound deltas into one broadcast per interval.
    /// `None` broadcasts every mutation individually and immediately.
    pub throttle: Option<Duration>,
    /// Schedule reconnection after a lost channel
    pub auto_reconnect: bool,
    /// Stop reconnecting after this many consecutive attempts.
    /// `None` retries indefinitely.
    pub max_reconnect_attempts: Option<u32>,
    /// First reconnect delay; doubles per consecutive attempt
    pub base_reconnect_delay: Duration,
    /// Ceiling for the reconnect delay
    pub max_reconnect_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            throttle: None,
            auto_reconnect: true,
            max_reconnect_attempts: None,
            base_reconnect_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_millis(30_000),
        }
    }
}

/// Delay before reconnect attempt number `attempt + 1`
///
/// Exponential: `base * 2^attempt`, capped at `max`.
fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let delay = base_ms.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(delay.min(max_ms))
}

/// Why a channel session ended
enum SessionEnd {
    /// Shutdown requested; leave the state machine entirely
    Shutdown,
    /// Clean close by the transport
    Closed,
    /// Channel fault or timeout
    Fault(String),
}

struct EngineShared {
    doc: SharedDoc,
    transport: Arc<dyn Transport>,
    channel: DocName,
    peer_id: PeerId,
    options: SyncOptions,
    status: parking_lot::Mutex<ConnectionStatus>,
    hub: EventHub<SyncEvent>,
}

impl EngineShared {
    fn set_status(&self, status: ConnectionStatus) {
        let mut current = self.status.lock();
        if *current != status {
            *current = status;
            drop(current);
            self.hub.emit(SyncEvent::Status(status));
        }
    }
}

/// Live sync engine for one shared document on one broadcast channel
///
/// Owns a background driver task for the whole engine lifetime. The task
/// joins the channel, reconciles state vectors with peers, relays local
/// edits out and peer deltas in, and reconnects with exponential backoff
/// when the channel is lost.
///
/// # Example
///
/// ```ignore
/// use relaydoc_core::{LiveSync, SharedDoc, SyncOptions};
///
/// let doc = SharedDoc::new();
/// let sync = LiveSync::start(doc.clone(), transport, "notes", SyncOptions::default());
/// let mut events = sync.subscribe();
///
/// while let Ok(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// ```
pub struct LiveSync {
    shared: Arc<EngineShared>,
    cancel: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl LiveSync {
    /// Start syncing `doc` on the channel named by `channel`
    ///
    /// Spawns the driver task; the engine begins connecting immediately.
    pub fn start(
        doc: SharedDoc,
        transport: Arc<dyn Transport>,
        channel: impl Into<DocName>,
        options: SyncOptions,
    ) -> Self {
        let shared = Arc::new(EngineShared {
            doc,
            transport,
            channel: channel.into(),
            peer_id: PeerId::generate(),
            options,
            status: parking_lot::Mutex::new(ConnectionStatus::Connecting),
            hub: EventHub::new(),
        });
        let cancel = CancellationToken::new();

        info!(channel = %shared.channel, peer = %shared.peer_id, "Live sync starting");
        let task = tokio::spawn(drive(shared.clone(), cancel.clone()));

        Self {
            shared,
            cancel,
            task: parking_lot::Mutex::new(Some(task)),
        }
    }

    /// Subscribe to engine notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.hub.subscribe()
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.lock()
    }

    /// This replica's identity on the channel
    pub fn peer_id(&self) -> &PeerId {
        &self.shared.peer_id
    }

    /// The channel this engine is bound to
    pub fn channel(&self) -> &DocName {
        &self.shared.channel
    }

    /// Stop the engine
    ///
    /// Cancels any pending throttle flush and reconnect timer, releases
    /// the channel subscription, and detaches from document changes.
    /// Idempotent: calling shutdown on a stopped engine is a no-op.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!(channel = %self.shared.channel, error = %e, "Driver task ended abnormally");
            }
            info!(channel = %self.shared.channel, "Live sync shut down");
        }
    }
}

/// Connection loop: one session per iteration, backoff in between
async fn drive(shared: Arc<EngineShared>, cancel: CancellationToken) {
    let mut attempts: u32 = 0;

    loop {
        shared.set_status(ConnectionStatus::Connecting);
        debug!(channel = %shared.channel, attempts, "Joining channel");

        let joined = tokio::select! {
            _ = cancel.cancelled() => return,
            joined = shared.transport.join(shared.channel.as_str()) => joined,
        };

        let end = match joined {
            Ok(ChannelConnection { sender, mut events }) => {
                let end =
                    run_session(&shared, &cancel, sender.as_ref(), &mut events, &mut attempts)
                        .await;
                if let Err(e) = sender.leave().await {
                    debug!(channel = %shared.channel, error = %e, "Failed to leave channel");
                }
                end
            }
            Err(e) => SessionEnd::Fault(e.to_string()),
        };

        if matches!(end, SessionEnd::Shutdown) {
            return;
        }

        shared.set_status(ConnectionStatus::Disconnected);
        shared.hub.emit(SyncEvent::Disconnected);
        if let SessionEnd::Fault(message) = end {
            warn!(channel = %shared.channel, %message, "Channel lost");
            shared.hub.emit(SyncEvent::Error { message });
        }

        if !shared.options.auto_reconnect {
            debug!(channel = %shared.channel, "Auto-reconnect disabled, stopping");
            return;
        }
        if let Some(max) = shared.options.max_reconnect_attempts {
            if attempts >= max {
                warn!(channel = %shared.channel, attempts, "Reconnect attempt ceiling reached");
                return;
            }
        }

        let delay = reconnect_delay(
            attempts,
            shared.options.base_reconnect_delay,
            shared.options.max_reconnect_delay,
        );
        attempts += 1;
        debug!(channel = %shared.channel, attempt = attempts, ?delay, "Reconnect scheduled");

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One joined-channel session, from join until the channel is lost
async fn run_session(
    shared: &EngineShared,
    cancel: &CancellationToken,
    sender: &dyn ChannelSender,
    events: &mut mpsc::Receiver<ChannelEvent>,
    attempts: &mut u32,
) -> SessionEnd {
    let mut doc_rx = Some(shared.doc.changes());
    // Peers already answered with a reconciliation delta this connection
    let mut answered: HashSet<String> = HashSet::new();
    // Not-yet-broadcast local deltas, and the throttle deadline armed when
    // the buffer went from empty to non-empty
    let mut pending: Vec<Vec<u8>> = Vec::new();
    let mut flush_at: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Shutdown,

            event = events.recv() => {
                let Some(event) = event else {
                    return SessionEnd::Closed;
                };
                match event {
                    ChannelEvent::Status(ChannelStatus::Subscribed) => {
                        *attempts = 0;
                        answered.clear();
                        shared.set_status(ConnectionStatus::Connected);
                        info!(channel = %shared.channel, "Channel subscribed");
                        shared.hub.emit(SyncEvent::Connected);
                        // Advertise what we have so peers send what we lack
                        if let Err(e) = send_probe(shared, sender).await {
                            shared.hub.emit(SyncEvent::Error { message: e.to_string() });
                        }
                    }
                    ChannelEvent::Status(ChannelStatus::ChannelError) => {
                        return SessionEnd::Fault("channel error".to_string());
                    }
                    ChannelEvent::Status(ChannelStatus::TimedOut) => {
                        return SessionEnd::Fault("channel timed out".to_string());
                    }
                    ChannelEvent::Status(ChannelStatus::Closed) => {
                        return SessionEnd::Closed;
                    }
                    ChannelEvent::Message { kind, payload } => {
                        if let Err(e) =
                            handle_message(shared, sender, &mut answered, &kind, payload).await
                        {
                            shared.hub.emit(SyncEvent::Error { message: e.to_string() });
                        }
                    }
                }
            }

            change = recv_doc_event(&mut doc_rx), if doc_rx.is_some() => {
                match change {
                    Some(DocEvent::Updated { origin, update }) if origin != Origin::Remote => {
                        match shared.options.throttle {
                            None => {
                                if let Err(e) = send_update(shared, sender, update).await {
                                    shared.hub.emit(SyncEvent::Error { message: e.to_string() });
                                }
                            }
                            Some(interval) => {
                                if pending.is_empty() {
                                    flush_at = Some(Instant::now() + interval);
                                }
                                pending.push(update);
                            }
                        }
                    }
                    // Remote-origin applies must not be re-broadcast
                    Some(_) => {}
                    None => doc_rx = None,
                }
            }

            _ = sleep_until_deadline(flush_at), if flush_at.is_some() => {
                flush_at = None;
                let merged = merge_pending(&mut pending);
                if let Err(e) = send_update(shared, sender, merged).await {
                    shared.hub.emit(SyncEvent::Error { message: e.to_string() });
                }
            }
        }
    }
}

/// Next change notification, skipping over lag gaps
async fn recv_doc_event(rx: &mut Option<broadcast::Receiver<DocEvent>>) -> Option<DocEvent> {
    let receiver = rx.as_mut()?;
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Deltas lost to lag are recovered by the state-vector
                // exchange on the next connection
                warn!(skipped, "Lagged behind on document changes");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Collapse the pending buffer into one delta
///
/// Automerge incremental chunks concatenate into a single valid delta, so
/// a burst of N edits inside one throttle interval costs one broadcast.
fn merge_pending(pending: &mut Vec<Vec<u8>>) -> Vec<u8> {
    let mut merged = Vec::new();
    for update in pending.drain(..) {
        merged.extend_from_slice(&update);
    }
    merged
}

async fn send_update(
    shared: &EngineShared,
    sender: &dyn ChannelSender,
    update: Vec<u8>,
) -> SyncResult<()> {
    if update.is_empty() {
        return Ok(());
    }
    debug!(channel = %shared.channel, bytes = update.len(), "Broadcasting update");
    let payload = UpdatePayload::new(codec::encode(&update), &shared.peer_id);
    sender.send(MSG_UPDATE, serde_json::to_value(&payload)?).await
}

async fn send_probe(shared: &EngineShared, sender: &dyn ChannelSender) -> SyncResult<()> {
    let heads = shared.doc.heads();
    debug!(channel = %shared.channel, heads = heads.len(), "Broadcasting state vector");
    let encoded = protocol::encode_heads(&heads)?;
    let payload = ProbePayload::new(codec::encode(&encoded), &shared.peer_id);
    sender
        .send(MSG_STATE_VECTOR, serde_json::to_value(&payload)?)
        .await
}

/// Dispatch one inbound channel message
///
/// Failures are reported by the caller as error notifications; they never
/// terminate the connection or corrupt engine state.
async fn handle_message(
    shared: &EngineShared,
    sender: &dyn ChannelSender,
    answered: &mut HashSet<String>,
    kind: &str,
    payload: serde_json::Value,
) -> SyncResult<()> {
    match kind {
        MSG_UPDATE => {
            let payload: UpdatePayload = serde_json::from_value(payload)?;
            if payload.user.id == shared.peer_id.as_str() {
                debug!(channel = %shared.channel, "Discarding own echo");
                return Ok(());
            }
            let update = codec::decode(&payload.update)?;
            shared.doc.apply_update(&update, Origin::Remote)?;
            debug!(
                channel = %shared.channel,
                from = %payload.user.id,
                bytes = update.len(),
                "Applied remote update"
            );
            shared.hub.emit(SyncEvent::Message { update });
            Ok(())
        }
        MSG_STATE_VECTOR => {
            let payload: ProbePayload = serde_json::from_value(payload)?;
            if payload.user.id == shared.peer_id.as_str() {
                return Ok(());
            }
            // Decode before touching session state: a corrupt probe must
            // have no side effects
            let heads = protocol::decode_heads(&codec::decode(&payload.state_vector)?)?;
            if !answered.insert(payload.user.id.clone()) {
                debug!(
                    channel = %shared.channel,
                    from = %payload.user.id,
                    "Peer already answered this connection"
                );
                return Ok(());
            }
            let missing = shared.doc.missing_from(&heads);
            if !missing.is_empty() {
                debug!(
                    channel = %shared.channel,
                    to = %payload.user.id,
                    bytes = missing.len(),
                    "Answering probe with missing delta"
                );
                send_update(shared, sender, missing).await?;
            }
            // Symmetric half of the handshake: advertise our own state so
            // the peer sends back what we are missing
            send_probe(shared, sender).await
        }
        other => {
            debug!(channel = %shared.channel, kind = other, "Ignoring unknown message kind");
            Ok(())
        }
    }
}
