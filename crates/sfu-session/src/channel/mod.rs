//! The duplex signaling connection a session talks over.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SessionResult;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryChannel, MemoryConnector, MemoryServer, memory_channel};
pub use websocket::{WsChannel, WsConnector, derive_websocket_url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One inbound text frame.
    Message(String),
    /// The connection ended. Always the last event.
    Closed { reason: Option<String> },
}

#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Enqueues one serialized frame. Fails once the channel is no longer
    /// open rather than dropping the frame.
    fn send(&self, text: String) -> SessionResult<()>;

    fn is_open(&self) -> bool;

    /// Closes the connection. Safe to call more than once.
    async fn close(&self);
}

pub struct OpenedChannel {
    pub channel: Arc<dyn SignalingChannel>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

#[async_trait]
pub trait SignalingConnector: Send + Sync {
    /// Resolves once the connection is established.
    async fn open(&self, url: &str) -> SessionResult<OpenedChannel>;
}
