#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use sfu_session::protocol::{DtlsFingerprint, DtlsRole};
use sfu_session::{
    ConnectTrigger, ConsumerDescriptor, DtlsParameters, MediaConsumer, MediaRuntime, MediaTrack,
    MemoryServer, RecvTransport, RtpCapabilities, RuntimeError, TransportDescriptor,
};

/// Routes session logs to the test harness; `RUST_LOG=sfu=trace` shows the
/// signaling exchange.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ordered record of what the runtime and channel were asked to do.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|seen| *seen == event).count()
    }

    /// Release events only, in the order they happened.
    pub fn releases(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|event| event.ends_with(".close"))
            .cloned()
            .collect()
    }
}

pub struct FakeRuntime {
    pub log: EventLog,
    pub load_error: Option<RuntimeError>,
    /// When false the runtime keeps the connect trigger without firing it.
    pub fire_trigger: bool,
    held_triggers: Mutex<Vec<ConnectTrigger>>,
}

impl FakeRuntime {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            load_error: None,
            fire_trigger: true,
            held_triggers: Mutex::new(Vec::new()),
        }
    }
}

pub fn client_dtls() -> DtlsParameters {
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".into(),
            value: "12:34".into(),
        }],
    }
}

#[async_trait]
impl MediaRuntime for FakeRuntime {
    async fn load(&self, router: &RtpCapabilities) -> Result<RtpCapabilities, RuntimeError> {
        self.log.push("runtime.load");
        if let Some(err) = &self.load_error {
            return Err(err.clone());
        }
        Ok(router.clone())
    }

    async fn create_recv_transport(
        &self,
        descriptor: &TransportDescriptor,
        trigger: ConnectTrigger,
    ) -> Result<Box<dyn RecvTransport>, RuntimeError> {
        self.log.push("runtime.create_transport");
        if self.fire_trigger {
            tokio::spawn(async move {
                let _ = trigger.connect(client_dtls()).await;
            });
        } else {
            self.held_triggers.lock().push(trigger);
        }
        Ok(Box::new(FakeTransport {
            id: descriptor.id.clone(),
            log: self.log.clone(),
        }))
    }
}

struct FakeTransport {
    id: String,
    log: EventLog,
}

#[async_trait]
impl RecvTransport for FakeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn consume(
        &self,
        descriptor: &ConsumerDescriptor,
    ) -> Result<Box<dyn MediaConsumer>, RuntimeError> {
        self.log.push("transport.consume");
        Ok(Box::new(FakeConsumer {
            track: MediaTrack {
                id: format!("track-{}", descriptor.id),
                kind: descriptor.kind,
                consumer_id: descriptor.id.clone(),
                producer_id: descriptor.producer_id.clone(),
            },
            paused: AtomicBool::new(descriptor.paused),
            log: self.log.clone(),
        }))
    }

    async fn close(&self) {
        self.log.push("transport.close");
    }
}

struct FakeConsumer {
    track: MediaTrack,
    paused: AtomicBool,
    log: EventLog,
}

#[async_trait]
impl MediaConsumer for FakeConsumer {
    fn id(&self) -> &str {
        &self.track.consumer_id
    }

    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<(), RuntimeError> {
        self.log.push("consumer.resume");
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.log.push("consumer.close");
    }
}

pub fn router_capabilities() -> Value {
    json!({
        "codecs": [
            { "kind": "video", "mimeType": "video/VP8", "clockRate": 90000, "preferredPayloadType": 101 },
            { "kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2 }
        ],
        "headerExtensions": []
    })
}

pub fn transport_info() -> Value {
    json!({
        "id": "transport-1",
        "iceParameters": { "usernameFragment": "frag", "password": "secret", "iceLite": true },
        "iceCandidates": [{
            "foundation": "udpcandidate",
            "priority": 1076302079u64,
            "ip": "10.1.0.8",
            "port": 40001,
            "protocol": "udp",
            "type": "host"
        }],
        "dtlsParameters": {
            "role": "auto",
            "fingerprints": [{ "algorithm": "sha-256", "value": "AB:CD:EF" }]
        }
    })
}

pub fn consumer_info(producer_id: &str, paused: bool) -> Value {
    json!({
        "id": "consumer-1",
        "producerId": producer_id,
        "kind": "video",
        "rtpParameters": { "codecs": [{ "mimeType": "video/VP8", "payloadType": 101 }] },
        "type": "simple",
        "producerPaused": false,
        "paused": paused
    })
}

/// What a well-behaved server answers. Responses carry no id, like the
/// deployed signaling server.
pub fn standard_reply(request: &Value) -> Option<Value> {
    let reply = match request["type"].as_str()? {
        "getRouterRtpCapabilities" => json!({
            "type": "routerRtpCapabilities",
            "rtpCapabilities": router_capabilities(),
        }),
        "createWebRtcTransport" => json!({
            "type": "webRtcTransportCreated",
            "transportInfo": transport_info(),
        }),
        "connectWebRtcTransport" => json!({ "type": "webRtcTransportConnected" }),
        "consume" => json!({
            "type": "consumerCreated",
            "consumerInfo": consumer_info(request["payload"]["producerId"].as_str()?, true),
        }),
        "resume" => json!({ "type": "consumerResumed" }),
        _ => return None,
    };
    Some(reply)
}

pub enum Reply {
    Send(Value),
    HangUp,
}

/// Plays the SFU on the server end of a memory channel until the client
/// closes it. Returns every request it saw.
pub fn spawn_sfu<F>(mut server: MemoryServer, mut handler: F) -> JoinHandle<Vec<Value>>
where
    F: FnMut(&Value) -> Vec<Reply> + Send + 'static,
{
    tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(request) = server.next_request().await {
            for reply in handler(&request) {
                match reply {
                    Reply::Send(message) => server.push(message),
                    Reply::HangUp => server.hang_up(Some("server shutdown")),
                }
            }
            seen.push(request);
        }
        seen
    })
}

/// Answers everything normally except requests of type `fail_on`, which get
/// `override_reply` (or nothing when `None`).
pub fn sfu_with_override(
    server: MemoryServer,
    fail_on: &'static str,
    override_reply: Option<Value>,
) -> JoinHandle<Vec<Value>> {
    spawn_sfu(server, move |request| {
        if request["type"] == fail_on {
            return override_reply.clone().map(Reply::Send).into_iter().collect();
        }
        standard_reply(request).map(Reply::Send).into_iter().collect()
    })
}

pub fn request_types(requests: &[Value]) -> Vec<String> {
    requests
        .iter()
        .filter_map(|request| request["type"].as_str().map(str::to_string))
        .collect()
}
