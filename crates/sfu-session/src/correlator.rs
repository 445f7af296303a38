//! Request/response correlation over one signaling channel.
//!
//! Every outbound request gets a fresh numeric id and a pending entry that
//! remembers the response type it expects. Entries are settled exactly once:
//! the settling path removes the entry from the table under the lock and only
//! then completes the waiter.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::channel::{ChannelEvent, SignalingChannel};
use crate::config::CorrelationMode;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{InboundMessage, RequestEnvelope, RequestKind};

const NOTIFICATION_CAPACITY: usize = 64;

type PendingTable = Mutex<BTreeMap<u64, PendingRequest>>;

struct PendingRequest {
    kind: RequestKind,
    expected: String,
    deadline: Instant,
    settle: oneshot::Sender<SessionResult<InboundMessage>>,
}

/// Removes the entry if the waiting future goes away before settlement.
struct PendingGuard<'a> {
    table: &'a PendingTable,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.lock().remove(&self.id);
    }
}

pub struct Correlator {
    channel: Arc<dyn SignalingChannel>,
    mode: CorrelationMode,
    next_id: AtomicU64,
    pending: PendingTable,
    notifications: broadcast::Sender<InboundMessage>,
}

impl Correlator {
    pub fn new(channel: Arc<dyn SignalingChannel>, mode: CorrelationMode) -> Arc<Self> {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Arc::new(Self {
            channel,
            mode,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(BTreeMap::new()),
            notifications,
        })
    }

    pub fn mode(&self) -> CorrelationMode {
        self.mode
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Server messages that did not answer any pending request.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<InboundMessage> {
        self.notifications.subscribe()
    }

    /// Feeds inbound channel events into the correlator until the channel
    /// closes, then rejects whatever is still pending.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> JoinHandle<()> {
        let correlator = Arc::clone(self);
        tokio::spawn(async move {
            let mut reason = None;
            while let Some(event) = events.recv().await {
                match event {
                    ChannelEvent::Message(text) => correlator.handle_text(&text),
                    ChannelEvent::Closed { reason: closed } => {
                        reason = closed;
                        break;
                    }
                }
            }
            let detail = match reason {
                Some(reason) => format!("signaling channel closed: {reason}"),
                None => "signaling channel closed".to_string(),
            };
            let rejected = correlator.fail_all(SessionError::Channel(detail));
            tracing::debug!(target: "sfu.correlator", rejected, "signaling dispatch finished");
        })
    }

    /// Sends one request and waits for its response, a server error, channel
    /// loss, or the timeout, whichever comes first.
    pub async fn request(
        &self,
        kind: RequestKind,
        payload: Value,
        timeout: Duration,
    ) -> SessionResult<InboundMessage> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let text = serde_json::to_string(&RequestEnvelope {
            id,
            kind: kind.as_str(),
            payload: &payload,
        })
        .map_err(|err| SessionError::Protocol(format!("encode {kind} request: {err}")))?;

        let deadline = Instant::now() + timeout;
        let expected = kind.response_kind().to_string();
        let (settle, mut settled) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingRequest {
                kind: kind.clone(),
                expected: expected.clone(),
                deadline,
                settle,
            },
        );
        let _guard = PendingGuard {
            table: &self.pending,
            id,
        };

        self.channel.send(text)?;
        tracing::trace!(
            target: "sfu.correlator",
            request_id = id,
            kind = %kind,
            expected = %expected,
            "signaling request sent"
        );

        match tokio::time::timeout_at(deadline, &mut settled).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Channel(
                "pending request dropped without a response".into(),
            )),
            Err(_) => {
                if self.pending.lock().remove(&id).is_some() {
                    tracing::warn!(
                        target: "sfu.correlator",
                        request_id = id,
                        kind = %kind,
                        timeout_ms = timeout.as_millis() as u64,
                        "signaling request timed out"
                    );
                    Err(SessionError::Timeout {
                        kind: kind.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                } else {
                    // Settled between the deadline firing and the removal.
                    settled.try_recv().unwrap_or_else(|_| {
                        Err(SessionError::Channel(
                            "pending request dropped without a response".into(),
                        ))
                    })
                }
            }
        }
    }

    pub fn handle_text(&self, text: &str) {
        match InboundMessage::parse(text) {
            Ok(message) => self.handle_message(message),
            Err(err) => {
                tracing::warn!(target: "sfu.correlator", len = text.len(), "ignoring signaling frame: {err}");
            }
        }
    }

    pub fn handle_message(&self, message: InboundMessage) {
        if message.is_error() {
            let error = message.error_message();
            let rejected = self.fail_all(SessionError::Protocol(error.clone()));
            tracing::warn!(
                target: "sfu.correlator",
                error = %error,
                rejected,
                "signaling server reported error"
            );
            return;
        }

        let matched = {
            let mut pending = self.pending.lock();
            self.match_key(&pending, &message)
                .and_then(|id| pending.remove(&id).map(|entry| (id, entry)))
        };

        match matched {
            Some((id, entry)) => {
                let remaining = entry.deadline.saturating_duration_since(Instant::now());
                tracing::trace!(
                    target: "sfu.correlator",
                    request_id = id,
                    kind = %entry.kind,
                    response = message.kind(),
                    remaining_ms = remaining.as_millis() as u64,
                    "signaling response matched"
                );
                let _ = entry.settle.send(Ok(message));
            }
            None => {
                tracing::debug!(
                    target: "sfu.correlator",
                    kind = message.kind(),
                    id = ?message.id(),
                    "unsolicited signaling message"
                );
                let _ = self.notifications.send(message);
            }
        }
    }

    fn match_key(
        &self,
        pending: &BTreeMap<u64, PendingRequest>,
        message: &InboundMessage,
    ) -> Option<u64> {
        // A body `id` can be a server object id; it only settles an entry
        // expecting this response type.
        if let Some(id) = message.id() {
            if pending
                .get(&id)
                .is_some_and(|entry| entry.expected == message.kind())
            {
                return Some(id);
            }
        }
        match self.mode {
            CorrelationMode::EchoedIds => None,
            // Ids grow monotonically, so the first match is the oldest.
            CorrelationMode::Auto => pending
                .iter()
                .find(|(_, entry)| entry.expected == message.kind())
                .map(|(id, _)| *id),
        }
    }

    /// Rejects every pending request with `error` and returns how many there
    /// were.
    pub fn fail_all(&self, error: SessionError) -> usize {
        let drained = std::mem::take(&mut *self.pending.lock());
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.settle.send(Err(error.clone()));
        }
        count
    }
}
