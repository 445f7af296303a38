use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::correlator::Correlator;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{CONSUMER_FIELDS, ConsumerDescriptor, RequestKind, RtpCapabilities};
use crate::runtime::{MediaConsumer, MediaTrack, RecvTransport};

pub struct ConsumedTrack {
    pub track: MediaTrack,
    pub consumer: Arc<dyn MediaConsumer>,
    /// False when the consumer stayed paused because the resume request
    /// failed.
    pub resumed: bool,
}

pub struct ConsumerManager {
    correlator: Arc<Correlator>,
    request_timeout: Duration,
}

impl ConsumerManager {
    pub fn new(correlator: Arc<Correlator>, request_timeout: Duration) -> Self {
        Self {
            correlator,
            request_timeout,
        }
    }

    /// Creates the consumer and resumes it when the server made it paused.
    /// `on_created` sees the consumer before the resume request goes out, so
    /// the caller can take ownership of it for release.
    pub async fn consume(
        &self,
        transport: &dyn RecvTransport,
        producer_id: &str,
        capabilities: &RtpCapabilities,
        on_created: impl FnOnce(&Arc<dyn MediaConsumer>),
    ) -> SessionResult<ConsumedTrack> {
        let consumer = self
            .create_consumer(transport, producer_id, capabilities)
            .await?;
        on_created(&consumer);
        let resumed = self.resume_if_paused(consumer.as_ref()).await;
        Ok(ConsumedTrack {
            track: consumer.track(),
            consumer,
            resumed,
        })
    }

    /// Requests a server consumer for `producer_id` and instantiates it on the
    /// local transport.
    pub async fn create_consumer(
        &self,
        transport: &dyn RecvTransport,
        producer_id: &str,
        capabilities: &RtpCapabilities,
    ) -> SessionResult<Arc<dyn MediaConsumer>> {
        let response = self
            .correlator
            .request(
                RequestKind::Consume,
                json!({
                    "transportId": transport.id(),
                    "producerId": producer_id,
                    "rtpCapabilities": capabilities,
                }),
                self.request_timeout,
            )
            .await?;
        let mut descriptor = ConsumerDescriptor::from_value(&response.descriptor(&CONSUMER_FIELDS))
            .map_err(SessionError::ConsumerCreation)?;
        if descriptor.producer_id.is_empty() {
            descriptor.producer_id = producer_id.to_string();
        }

        let consumer = transport
            .consume(&descriptor)
            .await
            .map_err(|err| SessionError::ConsumerCreation(err.to_string()))?;
        tracing::debug!(
            target: "sfu.consumer",
            consumer_id = %descriptor.id,
            producer_id = %descriptor.producer_id,
            kind = descriptor.kind.as_str(),
            paused = consumer.paused(),
            "consumer created"
        );
        Ok(Arc::from(consumer))
    }

    /// Resumes a paused consumer. Returns whether media is flowing; a failed
    /// resume leaves the consumer paused and is not an error.
    pub async fn resume_if_paused(&self, consumer: &dyn MediaConsumer) -> bool {
        if !consumer.paused() {
            return true;
        }
        let result = self
            .correlator
            .request(
                RequestKind::Resume,
                json!({ "consumerId": consumer.id() }),
                self.request_timeout,
            )
            .await;
        if let Err(err) = result {
            tracing::warn!(
                target: "sfu.consumer",
                consumer_id = %consumer.id(),
                error = %err,
                "resume request failed; consumer stays paused"
            );
            return false;
        }
        match consumer.resume().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "sfu.consumer",
                    consumer_id = %consumer.id(),
                    error = %err,
                    "local resume failed"
                );
                false
            }
        }
    }
}
