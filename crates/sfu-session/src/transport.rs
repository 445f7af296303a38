use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;

use crate::correlator::Correlator;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{DtlsParameters, RequestKind, TRANSPORT_FIELDS, TransportDescriptor};
use crate::runtime::{MediaRuntime, RecvTransport};

/// Handed to the media runtime with a new receive transport. Firing it sends
/// `connectWebRtcTransport` once; the outcome is returned to the runtime and
/// also released through the matching [`ConnectGate`].
#[derive(Clone)]
pub struct ConnectTrigger {
    inner: Arc<TriggerInner>,
}

struct TriggerInner {
    correlator: Arc<Correlator>,
    transport_id: String,
    timeout: Duration,
    fired: AtomicBool,
    gate: Mutex<Option<oneshot::Sender<SessionResult<()>>>>,
}

impl ConnectTrigger {
    fn new(
        correlator: Arc<Correlator>,
        transport_id: String,
        timeout: Duration,
    ) -> (Self, ConnectGate) {
        let (gate_tx, gate_rx) = oneshot::channel();
        let trigger = Self {
            inner: Arc::new(TriggerInner {
                correlator,
                transport_id: transport_id.clone(),
                timeout,
                fired: AtomicBool::new(false),
                gate: Mutex::new(Some(gate_tx)),
            }),
        };
        let gate = ConnectGate {
            transport_id,
            rx: gate_rx,
        };
        (trigger, gate)
    }

    pub fn transport_id(&self) -> &str {
        &self.inner.transport_id
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    pub async fn connect(&self, dtls: DtlsParameters) -> SessionResult<()> {
        let inner = &self.inner;
        if inner.fired.swap(true, Ordering::SeqCst) {
            return Err(SessionError::TransportConnect(format!(
                "connect already triggered for transport {}",
                inner.transport_id
            )));
        }

        let result = self.send_connect(dtls).await;
        match &result {
            Ok(()) => tracing::debug!(
                target: "sfu.transport",
                transport_id = %inner.transport_id,
                "transport connected"
            ),
            Err(err) => tracing::warn!(
                target: "sfu.transport",
                transport_id = %inner.transport_id,
                error = %err,
                "transport connect failed"
            ),
        }
        if let Some(gate) = inner.gate.lock().take() {
            let _ = gate.send(result.clone());
        }
        result
    }

    async fn send_connect(&self, dtls: DtlsParameters) -> SessionResult<()> {
        let inner = &self.inner;
        let dtls = serde_json::to_value(&dtls)
            .map_err(|err| SessionError::TransportConnect(format!("encode dtls parameters: {err}")))?;
        let payload = json!({
            "transportId": inner.transport_id,
            "dtlsParameters": dtls,
        });
        inner
            .correlator
            .request(RequestKind::ConnectWebRtcTransport, payload, inner.timeout)
            .await
            .map(|_| ())
            .map_err(|err| match err {
                SessionError::Cancelled(_) => err,
                other => SessionError::TransportConnect(other.to_string()),
            })
    }
}

/// Completes when the runtime's connect handshake has been answered.
pub struct ConnectGate {
    transport_id: String,
    rx: oneshot::Receiver<SessionResult<()>>,
}

impl ConnectGate {
    pub async fn wait(self, timeout: Duration) -> SessionResult<()> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::TransportConnect(format!(
                "runtime released transport {} without connecting",
                self.transport_id
            ))),
            Err(_) => Err(SessionError::TransportConnect(format!(
                "transport {} not connected within {}ms",
                self.transport_id,
                timeout.as_millis()
            ))),
        }
    }
}

pub struct EstablishedTransport {
    pub transport: Arc<dyn RecvTransport>,
    pub descriptor: TransportDescriptor,
    pub gate: ConnectGate,
}

pub struct TransportEstablisher {
    correlator: Arc<Correlator>,
    runtime: Arc<dyn MediaRuntime>,
    request_timeout: Duration,
}

impl TransportEstablisher {
    pub fn new(
        correlator: Arc<Correlator>,
        runtime: Arc<dyn MediaRuntime>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            correlator,
            runtime,
            request_timeout,
        }
    }

    /// Creates the server-side receive transport and its local counterpart.
    pub async fn create_recv_transport(&self, room_id: &str) -> SessionResult<EstablishedTransport> {
        let response = self
            .correlator
            .request(
                RequestKind::CreateWebRtcTransport,
                json!({ "roomId": room_id, "direction": "recv" }),
                self.request_timeout,
            )
            .await?;
        let descriptor = TransportDescriptor::from_value(&response.descriptor(&TRANSPORT_FIELDS))
            .map_err(SessionError::TransportCreation)?;
        tracing::debug!(
            target: "sfu.transport",
            transport_id = %descriptor.id,
            candidates = descriptor.ice_candidates.len(),
            "server transport created"
        );

        let (trigger, gate) = ConnectTrigger::new(
            Arc::clone(&self.correlator),
            descriptor.id.clone(),
            self.request_timeout,
        );
        let transport = self
            .runtime
            .create_recv_transport(&descriptor, trigger)
            .await
            .map_err(|err| SessionError::TransportCreation(err.to_string()))?;

        Ok(EstablishedTransport {
            transport: Arc::from(transport),
            descriptor,
            gate,
        })
    }
}
