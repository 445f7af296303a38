use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capabilities::CapabilityNegotiator;
use crate::channel::{OpenedChannel, SignalingChannel, SignalingConnector, WsConnector};
use crate::config::SessionConfig;
use crate::consumer::{ConsumedTrack, ConsumerManager};
use crate::correlator::Correlator;
use crate::error::{SessionError, SessionResult};
use crate::protocol::InboundMessage;
use crate::runtime::{MediaConsumer, MediaRuntime, MediaTrack, RecvTransport};
use crate::transport::{EstablishedTransport, TransportEstablisher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    CapabilitiesReady,
    TransportCreated,
    TransportConnected,
    Consuming,
    Ready,
    Closed,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::CapabilitiesReady => "capabilities_ready",
            SessionState::TransportCreated => "transport_created",
            SessionState::TransportConnected => "transport_connected",
            SessionState::Consuming => "consuming",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stream a session consumes and where to negotiate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub signaling_url: String,
    pub room_id: String,
    pub producer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedStream {
    pub session_id: Uuid,
    pub transport_id: String,
    pub track: MediaTrack,
    /// False when the server refused to resume a paused consumer.
    pub resumed: bool,
}

#[derive(Default)]
struct Resources {
    channel: Option<Arc<dyn SignalingChannel>>,
    correlator: Option<Arc<Correlator>>,
    dispatch: Option<JoinHandle<()>>,
    transport: Option<Arc<dyn RecvTransport>>,
    consumer: Option<Arc<dyn MediaConsumer>>,
}

/// One receive-only media session against an SFU room.
///
/// A session owns its signaling channel, transport and consumer. `connect`
/// may run once; `disconnect` is valid at any point, including while
/// `connect` is in flight, and always leaves the session `Closed`.
pub struct Session {
    id: Uuid,
    params: SessionParams,
    config: SessionConfig,
    connector: Arc<dyn SignalingConnector>,
    runtime: Arc<dyn MediaRuntime>,
    state_tx: watch::Sender<SessionState>,
    transitions: Mutex<Vec<SessionState>>,
    resources: Mutex<Resources>,
    cancel: CancellationToken,
    connect_started: AtomicBool,
}

impl Session {
    pub fn new(
        params: SessionParams,
        config: SessionConfig,
        connector: Arc<dyn SignalingConnector>,
        runtime: Arc<dyn MediaRuntime>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            id: Uuid::new_v4(),
            params,
            config,
            connector,
            runtime,
            state_tx,
            transitions: Mutex::new(vec![SessionState::Idle]),
            resources: Mutex::new(Resources::default()),
            cancel: CancellationToken::new(),
            connect_started: AtomicBool::new(false),
        }
    }

    /// A session that signals over a real WebSocket.
    pub fn over_websocket(
        params: SessionParams,
        config: SessionConfig,
        runtime: Arc<dyn MediaRuntime>,
    ) -> Self {
        Self::new(params, config, Arc::new(WsConnector), runtime)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Every state the session has entered, in order, starting with `Idle`.
    pub fn transitions(&self) -> Vec<SessionState> {
        self.transitions.lock().clone()
    }

    /// Unsolicited server messages, available once the channel is open.
    pub fn notifications(&self) -> Option<broadcast::Receiver<InboundMessage>> {
        self.resources
            .lock()
            .correlator
            .as_ref()
            .map(|correlator| correlator.subscribe_notifications())
    }

    pub async fn connect(&self) -> SessionResult<ConnectedStream> {
        let state = self.state();
        if self.connect_started.swap(true, Ordering::SeqCst) || state != SessionState::Idle {
            return Err(SessionError::InvalidState(format!(
                "connect requires an idle session, current state is {state}"
            )));
        }
        self.set_state(SessionState::Connecting);
        tracing::info!(
            target: "sfu.session",
            session_id = %self.id,
            room_id = %self.params.room_id,
            producer_id = %self.params.producer_id,
            "session connecting"
        );

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(cancelled()),
            result = self.run_phases() => result,
        };

        match outcome {
            Ok(stream) => Ok(stream),
            Err(_) if self.cancel.is_cancelled() => {
                // disconnect() owns the final state; release whatever the
                // interrupted phase managed to register.
                self.release().await;
                tracing::info!(target: "sfu.session", session_id = %self.id, "connect cancelled");
                Err(cancelled())
            }
            Err(err) => {
                tracing::warn!(
                    target: "sfu.session",
                    session_id = %self.id,
                    state = %self.state(),
                    error_kind = err.kind(),
                    error = %err,
                    "session failed"
                );
                self.release().await;
                self.set_state(SessionState::Error);
                Err(err)
            }
        }
    }

    async fn run_phases(&self) -> SessionResult<ConnectedStream> {
        let timeout = self.config.request_timeout;
        let OpenedChannel { channel, events } =
            self.connector.open(&self.params.signaling_url).await?;
        let correlator = Correlator::new(Arc::clone(&channel), self.config.correlation);
        let dispatch = correlator.spawn_dispatch(events);
        {
            let mut resources = self.resources.lock();
            resources.channel = Some(channel);
            resources.correlator = Some(Arc::clone(&correlator));
            resources.dispatch = Some(dispatch);
        }
        tracing::debug!(target: "sfu.session", session_id = %self.id, "signaling channel open");

        let capabilities =
            CapabilityNegotiator::new(Arc::clone(&correlator), Arc::clone(&self.runtime), timeout)
                .negotiate(&self.params.room_id)
                .await?;
        self.set_state(SessionState::CapabilitiesReady);

        let EstablishedTransport {
            transport,
            descriptor,
            gate,
        } = TransportEstablisher::new(Arc::clone(&correlator), Arc::clone(&self.runtime), timeout)
            .create_recv_transport(&self.params.room_id)
            .await?;
        self.resources.lock().transport = Some(Arc::clone(&transport));
        self.set_state(SessionState::TransportCreated);

        gate.wait(self.config.connect_timeout).await?;
        self.set_state(SessionState::TransportConnected);

        let ConsumedTrack { track, resumed, .. } = ConsumerManager::new(correlator, timeout)
            .consume(
                transport.as_ref(),
                &self.params.producer_id,
                &capabilities.local,
                |consumer| {
                    self.resources.lock().consumer = Some(Arc::clone(consumer));
                    self.set_state(SessionState::Consuming);
                },
            )
            .await?;
        self.set_state(SessionState::Ready);
        tracing::info!(
            target: "sfu.session",
            session_id = %self.id,
            transport_id = %descriptor.id,
            track_id = %track.id,
            kind = track.kind.as_str(),
            resumed,
            "session ready"
        );

        Ok(ConnectedStream {
            session_id: self.id,
            transport_id: descriptor.id,
            track,
            resumed,
        })
    }

    /// Tears the session down. Interrupts an in-flight `connect`, which then
    /// fails with `Cancelled`. Calling it again is a no-op.
    pub async fn disconnect(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        self.cancel.cancel();
        self.release().await;
        self.set_state(SessionState::Closed);
        tracing::info!(target: "sfu.session", session_id = %self.id, "session closed");
    }

    /// Closes consumer, transport and channel, in that order. Each resource is
    /// taken out of the session before it is closed, so concurrent callers
    /// never close the same one twice.
    async fn release(&self) {
        let (consumer, transport, correlator, channel, dispatch) = {
            let mut resources = self.resources.lock();
            (
                resources.consumer.take(),
                resources.transport.take(),
                resources.correlator.take(),
                resources.channel.take(),
                resources.dispatch.take(),
            )
        };
        if let Some(consumer) = consumer {
            consumer.close().await;
            tracing::debug!(target: "sfu.session", session_id = %self.id, consumer_id = %consumer.id(), "consumer closed");
        }
        if let Some(transport) = transport {
            transport.close().await;
            tracing::debug!(target: "sfu.session", session_id = %self.id, transport_id = %transport.id(), "transport closed");
        }
        if let Some(correlator) = correlator {
            correlator.fail_all(SessionError::Cancelled("session released".into()));
        }
        if let Some(channel) = channel {
            channel.close().await;
            tracing::debug!(target: "sfu.session", session_id = %self.id, "signaling channel closed");
        }
        if let Some(dispatch) = dispatch {
            dispatch.abort();
        }
    }

    fn set_state(&self, next: SessionState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            self.transitions.lock().push(next);
            tracing::debug!(target: "sfu.session", session_id = %self.id, state = %next, "session state");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(dispatch) = self.resources.get_mut().dispatch.take() {
            dispatch.abort();
        }
    }
}

fn cancelled() -> SessionError {
    SessionError::Cancelled("session disconnected during connect".into())
}
