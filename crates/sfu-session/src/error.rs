use thiserror::Error;

/// Typed failures surfaced by every phase of a media session.
///
/// Values are `Clone` because a single server-pushed error is fanned out to
/// every pending request on the channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("signaling channel error: {0}")]
    Channel(String),
    #[error("request {kind} timed out after {timeout_ms}ms")]
    Timeout { kind: String, timeout_ms: u64 },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("capability negotiation failed: {0}")]
    Capability(String),
    #[error("unsupported media runtime: {0}")]
    UnsupportedMedia(String),
    #[error("transport creation failed: {0}")]
    TransportCreation(String),
    #[error("transport connect failed: {0}")]
    TransportConnect(String),
    #[error("consumer creation failed: {0}")]
    ConsumerCreation(String),
    #[error("session cancelled: {0}")]
    Cancelled(String),
    #[error("invalid session state: {0}")]
    InvalidState(String),
}

impl SessionError {
    /// Whether a caller may reasonably retry with a fresh session.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SessionError::UnsupportedMedia(_)
                | SessionError::Cancelled(_)
                | SessionError::InvalidState(_)
        )
    }

    /// Short machine-readable label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Channel(_) => "channel",
            SessionError::Timeout { .. } => "timeout",
            SessionError::Protocol(_) => "protocol",
            SessionError::Capability(_) => "capability",
            SessionError::UnsupportedMedia(_) => "unsupported_media",
            SessionError::TransportCreation(_) => "transport_creation",
            SessionError::TransportConnect(_) => "transport_connect",
            SessionError::ConsumerCreation(_) => "consumer_creation",
            SessionError::Cancelled(_) => "cancelled",
            SessionError::InvalidState(_) => "invalid_state",
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
