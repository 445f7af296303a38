use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message, error::ProtocolError},
};
use url::Url;

use super::{ChannelEvent, OpenedChannel, SignalingChannel, SignalingConnector};
use crate::error::{SessionError, SessionResult};

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl SignalingConnector for WsConnector {
    async fn open(&self, url: &str) -> SessionResult<OpenedChannel> {
        let (channel, events) = WsChannel::connect(url).await?;
        Ok(OpenedChannel { channel, events })
    }
}

/// A signaling connection over one WebSocket, driven by a writer task and a
/// reader task.
pub struct WsChannel {
    url: Url,
    send_tx: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    open: Arc<AtomicBool>,
    closed: AtomicBool,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsChannel {
    pub async fn connect(
        signaling_url: &str,
    ) -> SessionResult<(Arc<Self>, mpsc::UnboundedReceiver<ChannelEvent>)> {
        let websocket_url = derive_websocket_url(signaling_url)?;
        let (ws_stream, _) = connect_async(websocket_url.as_str())
            .await
            .map_err(|err| SessionError::Channel(format!("websocket connect failed: {err}")))?;
        tracing::debug!(
            target: "sfu.channel",
            url = %websocket_url,
            "signaling websocket connected"
        );
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let (send_tx, mut send_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ChannelEvent>();
        let open = Arc::new(AtomicBool::new(true));

        let writer_open = Arc::clone(&open);
        let writer = tokio::spawn(async move {
            while let Some(message) = send_rx.recv().await {
                if let Err(err) = ws_write.send(message).await {
                    tracing::warn!(target: "sfu.channel", "signaling websocket write failed: {err}");
                    writer_open.store(false, Ordering::SeqCst);
                    break;
                }
            }
            // Sender dropped: finish with a close frame.
            let _ = ws_write.close().await;
        });

        let reader_open = Arc::clone(&open);
        let reader = tokio::spawn(async move {
            let mut reason = None;
            while let Some(frame) = ws_read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        tracing::trace!(
                            target: "sfu.channel",
                            event = "ws_in",
                            kind = "text",
                            len = text.len()
                        );
                        if event_tx.send(ChannelEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        tracing::trace!(
                            target: "sfu.channel",
                            event = "ws_in",
                            kind = "binary",
                            len = data.len()
                        );
                        match String::from_utf8(data) {
                            Ok(text) => {
                                if event_tx.send(ChannelEvent::Message(text)).is_err() {
                                    break;
                                }
                            }
                            Err(_) => {
                                tracing::warn!(target: "sfu.channel", "dropping non-utf8 binary frame");
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        reason = frame
                            .map(|frame| frame.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        match &err {
                            WsError::ConnectionClosed
                            | WsError::AlreadyClosed
                            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                                tracing::debug!(target: "sfu.channel", "signaling websocket closed: {err}");
                            }
                            _ => {
                                tracing::warn!(target: "sfu.channel", "signaling websocket error: {err}");
                            }
                        }
                        reason = Some(err.to_string());
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            let _ = event_tx.send(ChannelEvent::Closed { reason });
        });

        let channel = Arc::new(Self {
            url: websocket_url,
            send_tx: Mutex::new(Some(send_tx)),
            open,
            closed: AtomicBool::new(false),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        });
        Ok((channel, event_rx))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SignalingChannel for WsChannel {
    fn send(&self, text: String) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::Channel("signaling channel is not open".into()));
        }
        let guard = self.send_tx.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(SessionError::Channel("signaling channel is not open".into()));
        };
        tracing::trace!(target: "sfu.channel", event = "ws_out", len = text.len());
        sender
            .send(Message::Text(text))
            .map_err(|_| SessionError::Channel("signaling writer stopped".into()))
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.open.store(false, Ordering::SeqCst);
        drop(self.send_tx.lock().take());

        let writer = self.writer.lock().take();
        if let Some(mut writer) = writer {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer)
                .await
                .is_err()
            {
                tracing::warn!(target: "sfu.channel", url = %self.url, "close frame not flushed in time");
                writer.abort();
            }
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        tracing::debug!(target: "sfu.channel", url = %self.url, "signaling websocket closed");
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        for slot in [&self.writer, &self.reader] {
            if let Some(handle) = slot.lock().take() {
                handle.abort();
            }
        }
    }
}

/// Normalizes a signaling URL to a WebSocket URL; `http(s)` become `ws(s)`.
pub fn derive_websocket_url(signaling_url: &str) -> SessionResult<Url> {
    let mut url = Url::parse(signaling_url).map_err(|err| {
        SessionError::Channel(format!("invalid signaling url {signaling_url}: {err}"))
    })?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(SessionError::Channel(format!(
                "unsupported signaling url scheme: {other}"
            )));
        }
    };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|_| SessionError::Channel("invalid websocket scheme".into()))?;
    }
    url.set_fragment(None);
    Ok(url)
}
