//! The boundary to the native media engine. The session never touches media
//! itself: it loads capabilities, asks for a receive transport and a consumer,
//! and closes them again.

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{ConsumerDescriptor, MediaKind, RtpCapabilities, TransportDescriptor};
use crate::transport::ConnectTrigger;

pub mod probe;

pub use probe::ProbeRuntime;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The engine cannot handle what the server offered.
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Failed(String),
}

/// The remote media a consumer yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: MediaKind,
    pub consumer_id: String,
    pub producer_id: String,
}

#[async_trait]
pub trait MediaRuntime: Send + Sync {
    /// Loads the router capabilities and returns what the local engine can
    /// receive.
    async fn load(&self, router: &RtpCapabilities) -> Result<RtpCapabilities, RuntimeError>;

    /// Instantiates the local side of a receive transport. The runtime must
    /// call `trigger.connect` with its DTLS parameters once it has them,
    /// without waiting for a consumer.
    async fn create_recv_transport(
        &self,
        descriptor: &TransportDescriptor,
        trigger: ConnectTrigger,
    ) -> Result<Box<dyn RecvTransport>, RuntimeError>;
}

#[async_trait]
pub trait RecvTransport: Send + Sync {
    fn id(&self) -> &str;

    async fn consume(
        &self,
        descriptor: &ConsumerDescriptor,
    ) -> Result<Box<dyn MediaConsumer>, RuntimeError>;

    async fn close(&self);
}

#[async_trait]
pub trait MediaConsumer: Send + Sync {
    fn id(&self) -> &str;

    fn track(&self) -> MediaTrack;

    fn paused(&self) -> bool;

    /// Resumes local delivery after the server resumed the consumer.
    async fn resume(&self) -> Result<(), RuntimeError>;

    async fn close(&self);
}
