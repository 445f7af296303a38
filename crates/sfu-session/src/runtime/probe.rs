//! A signaling-only runtime. It checks the router's codecs against a supported
//! list, answers the DTLS handshake with freshly generated parameters and
//! reports the negotiated track, but never moves media. Used by the CLI to
//! verify that a room can be consumed.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use super::{MediaConsumer, MediaRuntime, MediaTrack, RecvTransport, RuntimeError};
use crate::protocol::{
    ConsumerDescriptor, DtlsFingerprint, DtlsParameters, DtlsRole, RtpCapabilities,
    TransportDescriptor,
};
use crate::transport::ConnectTrigger;

pub const DEFAULT_MIME_TYPES: [&str; 4] = ["video/VP8", "video/VP9", "video/H264", "audio/opus"];

#[derive(Debug, Clone)]
pub struct ProbeRuntime {
    mime_types: Vec<String>,
}

impl Default for ProbeRuntime {
    fn default() -> Self {
        Self::with_mime_types(DEFAULT_MIME_TYPES)
    }
}

impl ProbeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mime_types<I, S>(mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mime_types: mime_types.into_iter().map(Into::into).collect(),
        }
    }

    fn supports(&self, codec: &Value) -> bool {
        let Some(mime) = codec.get("mimeType").and_then(Value::as_str) else {
            return false;
        };
        self.mime_types
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(mime))
    }
}

#[async_trait]
impl MediaRuntime for ProbeRuntime {
    async fn load(&self, router: &RtpCapabilities) -> Result<RtpCapabilities, RuntimeError> {
        let codecs: Vec<Value> = router
            .codecs()
            .iter()
            .filter(|codec| self.supports(codec))
            .cloned()
            .collect();
        if codecs.is_empty() {
            return Err(RuntimeError::Unsupported(format!(
                "none of the router codecs [{}] are supported",
                router.mime_types().join(", ")
            )));
        }
        let header_extensions = router
            .0
            .get("headerExtensions")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(RtpCapabilities(json!({
            "codecs": codecs,
            "headerExtensions": header_extensions,
        })))
    }

    async fn create_recv_transport(
        &self,
        descriptor: &TransportDescriptor,
        trigger: ConnectTrigger,
    ) -> Result<Box<dyn RecvTransport>, RuntimeError> {
        if descriptor.dtls_parameters.fingerprints.is_empty() {
            return Err(RuntimeError::Failed(format!(
                "transport {} offered no dtls fingerprints",
                descriptor.id
            )));
        }
        let dtls = local_dtls_parameters();
        let connect = tokio::spawn(async move {
            if let Err(err) = trigger.connect(dtls).await {
                tracing::debug!(target: "sfu.runtime", "probe connect handshake failed: {err}");
            }
        });
        Ok(Box::new(ProbeTransport {
            id: descriptor.id.clone(),
            connect: Mutex::new(Some(connect)),
            closed: AtomicBool::new(false),
        }))
    }
}

fn local_dtls_parameters() -> DtlsParameters {
    let certificate: [u8; 32] = rand::random();
    let digest = Sha256::digest(certificate);
    let value = digest
        .iter()
        .map(|byte| hex::encode_upper([*byte]))
        .collect::<Vec<_>>()
        .join(":");
    DtlsParameters {
        role: DtlsRole::Client,
        fingerprints: vec![DtlsFingerprint {
            algorithm: "sha-256".into(),
            value,
        }],
    }
}

struct ProbeTransport {
    id: String,
    connect: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

#[async_trait]
impl RecvTransport for ProbeTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn consume(
        &self,
        descriptor: &ConsumerDescriptor,
    ) -> Result<Box<dyn MediaConsumer>, RuntimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RuntimeError::Failed(format!("transport {} is closed", self.id)));
        }
        let track = MediaTrack {
            id: format!("{}-{}", descriptor.kind.as_str(), descriptor.id),
            kind: descriptor.kind,
            consumer_id: descriptor.id.clone(),
            producer_id: descriptor.producer_id.clone(),
        };
        Ok(Box::new(ProbeConsumer {
            track,
            paused: AtomicBool::new(descriptor.paused),
        }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.connect.lock().take() {
            handle.abort();
        }
    }
}

struct ProbeConsumer {
    track: MediaTrack,
    paused: AtomicBool,
}

#[async_trait]
impl MediaConsumer for ProbeConsumer {
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
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_keeps_only_supported_codecs() {
        let runtime = ProbeRuntime::new();
        let router = RtpCapabilities(json!({
            "codecs": [
                { "mimeType": "video/H264", "clockRate": 90000 },
                { "mimeType": "video/AV1", "clockRate": 90000 },
                { "mimeType": "audio/OPUS", "clockRate": 48000 }
            ]
        }));
        let local = runtime.load(&router).await.unwrap();
        assert_eq!(local.mime_types(), vec!["video/H264", "audio/OPUS"]);
        assert_eq!(local.0["headerExtensions"], json!([]));
    }

    #[tokio::test]
    async fn load_rejects_router_without_common_codec() {
        let runtime = ProbeRuntime::with_mime_types(["video/VP8"]);
        let router = RtpCapabilities(json!({ "codecs": [{ "mimeType": "video/H265" }] }));
        let err = runtime.load(&router).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Unsupported(message) if message.contains("video/H265")));
    }

    #[test]
    fn local_fingerprint_is_colon_separated_sha256() {
        let dtls = local_dtls_parameters();
        let fingerprint = &dtls.fingerprints[0];
        assert_eq!(fingerprint.algorithm, "sha-256");
        assert_eq!(fingerprint.value.split(':').count(), 32);
        assert!(
            fingerprint
                .value
                .split(':')
                .all(|pair| pair.len() == 2 && pair.chars().all(|c| c.is_ascii_hexdigit()))
        );
        assert_eq!(dtls.role, DtlsRole::Client);
    }
}
