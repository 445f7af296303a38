//! In-process signaling pipe. The connector side plugs into a session; the
//! server side is driven by the test or tool that plays the SFU.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{ChannelEvent, OpenedChannel, SignalingChannel, SignalingConnector};
use crate::error::{SessionError, SessionResult};

type CloseHook = Box<dyn Fn() + Send + Sync>;

pub struct MemoryChannel {
    to_server: Mutex<Option<mpsc::UnboundedSender<String>>>,
    closed: AtomicBool,
    remote_closed: AtomicBool,
    close_calls: AtomicUsize,
    close_hook: Mutex<Option<CloseHook>>,
}

impl MemoryChannel {
    /// How many times `close()` was invoked, including repeated calls.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingChannel for MemoryChannel {
    fn send(&self, text: String) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::Channel("signaling channel is not open".into()));
        }
        let guard = self.to_server.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(SessionError::Channel("signaling channel is not open".into()));
        };
        sender
            .send(text)
            .map_err(|_| SessionError::Channel("signaling peer went away".into()))
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.remote_closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        drop(self.to_server.lock().take());
        if let Some(hook) = self.close_hook.lock().as_ref() {
            hook();
        }
    }
}

pub struct MemoryConnector {
    channel: Arc<MemoryChannel>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    refusal: Option<String>,
    opened: Mutex<Vec<String>>,
}

impl MemoryConnector {
    /// A connector whose `open` always fails with the given reason.
    pub fn refusing(reason: impl Into<String>) -> Self {
        let (connector, _server) = memory_channel();
        Self {
            refusal: Some(reason.into()),
            ..connector
        }
    }

    pub fn channel(&self) -> Arc<MemoryChannel> {
        Arc::clone(&self.channel)
    }

    /// Runs `hook` the first time the channel is closed.
    pub fn on_close(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.channel.close_hook.lock() = Some(Box::new(hook));
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SignalingConnector for MemoryConnector {
    async fn open(&self, url: &str) -> SessionResult<OpenedChannel> {
        if let Some(reason) = &self.refusal {
            return Err(SessionError::Channel(format!(
                "connect to {url} failed: {reason}"
            )));
        }
        let events = self
            .events
            .lock()
            .take()
            .ok_or_else(|| SessionError::Channel("memory channel already opened".into()))?;
        self.opened.lock().push(url.to_string());
        let channel: Arc<dyn SignalingChannel> = self.channel.clone();
        Ok(OpenedChannel { channel, events })
    }
}

pub struct MemoryServer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<ChannelEvent>,
    channel: Arc<MemoryChannel>,
}

impl MemoryServer {
    /// The next request the client sent, or `None` once the client closed.
    pub async fn next_request(&mut self) -> Option<Value> {
        loop {
            let text = self.from_client.recv().await?;
            match serde_json::from_str(&text) {
                Ok(value) => return Some(value),
                Err(err) => {
                    tracing::warn!(target: "sfu.channel", "memory server got invalid json: {err}");
                }
            }
        }
    }

    pub fn push(&self, message: Value) {
        self.push_text(message.to_string());
    }

    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(ChannelEvent::Message(text.into()));
    }

    /// Simulates the server dropping the connection.
    pub fn hang_up(&self, reason: Option<&str>) {
        self.channel.remote_closed.store(true, Ordering::SeqCst);
        let _ = self.to_client.send(ChannelEvent::Closed {
            reason: reason.map(str::to_string),
        });
    }

    pub fn client_closed(&self) -> bool {
        self.channel.closed.load(Ordering::SeqCst)
    }
}

pub fn memory_channel() -> (MemoryConnector, MemoryServer) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, events) = mpsc::unbounded_channel();
    let channel = Arc::new(MemoryChannel {
        to_server: Mutex::new(Some(to_server)),
        closed: AtomicBool::new(false),
        remote_closed: AtomicBool::new(false),
        close_calls: AtomicUsize::new(0),
        close_hook: Mutex::new(None),
    });
    let connector = MemoryConnector {
        channel: Arc::clone(&channel),
        events: Mutex::new(Some(events)),
        refusal: None,
        opened: Mutex::new(Vec::new()),
    };
    let server = MemoryServer {
        from_client,
        to_client,
        channel,
    };
    (connector, server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (connector, mut server) = memory_channel();
        let OpenedChannel {
            channel,
            mut events,
        } = connector.open("ws://sfu.test/").await.unwrap();

        channel.send(json!({ "type": "ping" }).to_string()).unwrap();
        assert_eq!(server.next_request().await, Some(json!({ "type": "ping" })));

        server.push(json!({ "type": "pong" }));
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message(r#"{"type":"pong"}"#.into()))
        );
        assert_eq!(connector.opened_urls(), vec!["ws://sfu.test/".to_string()]);
    }

    #[tokio::test]
    async fn send_after_close_fails_and_close_is_idempotent() {
        let (connector, mut server) = memory_channel();
        let opened = connector.open("ws://sfu.test/").await.unwrap();
        opened.channel.close().await;
        opened.channel.close().await;

        let err = opened.channel.send("{}".into()).unwrap_err();
        assert!(matches!(err, SessionError::Channel(_)));
        assert_eq!(connector.channel().close_calls(), 2);
        assert!(server.client_closed());
        assert_eq!(server.next_request().await, None);
    }

    #[tokio::test]
    async fn refusing_connector_reports_channel_error() {
        let connector = MemoryConnector::refusing("connection refused");
        let err = connector.open("ws://sfu.test/").await.err().unwrap();
        assert!(matches!(err, SessionError::Channel(message) if message.contains("refused")));
    }
}
