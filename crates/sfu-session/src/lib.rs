//! Receive-only WebRTC media sessions against a mediasoup-style SFU.
//!
//! A [`Session`] opens one JSON signaling channel, negotiates router
//! capabilities, creates and connects a receive transport, and consumes a
//! single producer. Media itself is handled by a [`MediaRuntime`]
//! implementation supplied by the caller.

pub mod capabilities;
pub mod channel;
pub mod config;
pub mod consumer;
pub mod correlator;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod transport;

pub use capabilities::{CapabilityNegotiator, NegotiatedCapabilities};
pub use channel::{
    ChannelEvent, MemoryConnector, MemoryServer, OpenedChannel, SignalingChannel,
    SignalingConnector, WsConnector, memory_channel,
};
pub use config::{CorrelationMode, SessionConfig};
pub use consumer::{ConsumedTrack, ConsumerManager};
pub use correlator::Correlator;
pub use error::{SessionError, SessionResult};
pub use protocol::{
    ConsumerDescriptor, DtlsParameters, InboundMessage, MediaKind, RequestKind, RtpCapabilities,
    TransportDescriptor,
};
pub use runtime::{MediaConsumer, MediaRuntime, MediaTrack, ProbeRuntime, RecvTransport, RuntimeError};
pub use session::{ConnectedStream, Session, SessionParams, SessionState};
pub use transport::{ConnectGate, ConnectTrigger, EstablishedTransport, TransportEstablisher};
