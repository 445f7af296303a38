use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::correlator::Correlator;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{CAPABILITY_FIELDS, RequestKind, RtpCapabilities};
use crate::runtime::{MediaRuntime, RuntimeError};

#[derive(Debug, Clone, PartialEq)]
pub struct NegotiatedCapabilities {
    /// What the router declared.
    pub router: RtpCapabilities,
    /// What the local runtime can receive; sent with every consume request.
    pub local: RtpCapabilities,
}

pub struct CapabilityNegotiator {
    correlator: Arc<Correlator>,
    runtime: Arc<dyn MediaRuntime>,
    request_timeout: Duration,
}

impl CapabilityNegotiator {
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

    pub async fn negotiate(&self, room_id: &str) -> SessionResult<NegotiatedCapabilities> {
        let response = self
            .correlator
            .request(
                RequestKind::GetRouterRtpCapabilities,
                json!({ "roomId": room_id }),
                self.request_timeout,
            )
            .await?;
        let router = response
            .first_field(&CAPABILITY_FIELDS)
            .cloned()
            .map(RtpCapabilities)
            .ok_or_else(|| {
                SessionError::Capability(format!(
                    "{} response carried no capabilities",
                    response.kind()
                ))
            })?;

        let local = self.runtime.load(&router).await.map_err(|err| match err {
            RuntimeError::Unsupported(reason) | RuntimeError::Failed(reason) => {
                SessionError::UnsupportedMedia(reason)
            }
        })?;
        tracing::debug!(
            target: "sfu.capabilities",
            room_id,
            router_codecs = router.codecs().len(),
            local_codecs = local.codecs().len(),
            "router capabilities loaded"
        );
        Ok(NegotiatedCapabilities { router, local })
    }
}
