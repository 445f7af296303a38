//! Camera stream control under `{base}/cameras/{id}/...`.
//!
//! Starting a stream makes the media server publish the camera into an SFU
//! room; the response names the room, the video producer and, when the
//! deployment advertises it, the signaling WebSocket to consume from.

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::client::HttpCore;
use crate::error::{ApiError, ApiResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Producers {
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamStart {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub device_id: Option<Value>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub producers: Producers,
    #[serde(default)]
    pub websocket_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What a media session needs to consume a started stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub room_id: String,
    pub producer_id: String,
    pub signaling_url: Option<String>,
}

impl StreamStart {
    /// Fails when the service started the stream but did not report a
    /// room or a video producer.
    pub fn target(&self) -> ApiResult<StreamTarget> {
        let room_id = self
            .room_id
            .clone()
            .filter(|room| !room.is_empty())
            .ok_or_else(|| ApiError::Validation("stream response has no room_id".into()))?;
        let producer_id = self
            .producers
            .video
            .clone()
            .filter(|producer| !producer.is_empty())
            .ok_or_else(|| ApiError::Validation("no video producer found in stream data".into()))?;
        Ok(StreamTarget {
            room_id,
            producer_id,
            signaling_url: self.websocket_url.clone().filter(|url| !url.is_empty()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamStatus {
    #[serde(default)]
    pub camera_id: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone)]
pub struct StreamClient {
    core: HttpCore,
}

impl StreamClient {
    pub fn new(base_url: &str, token: Option<String>) -> ApiResult<Self> {
        Ok(Self {
            core: HttpCore::new(base_url, token, REQUEST_TIMEOUT)?,
        })
    }

    pub async fn start_stream(&self, camera_id: &str) -> ApiResult<StreamStart> {
        let path = camera_path(camera_id, "start-stream")?;
        let req = self.core.request(Method::POST, &path);
        let start: StreamStart = self.core.send_json(req).await?;
        tracing::info!(
            target: "vigil.api",
            camera_id,
            room_id = start.room_id.as_deref().unwrap_or(""),
            "camera stream started"
        );
        Ok(start)
    }

    pub async fn stop_stream(&self, camera_id: &str) -> ApiResult<Option<String>> {
        #[derive(Deserialize)]
        struct Stopped {
            #[serde(default)]
            message: Option<String>,
        }

        let path = camera_path(camera_id, "stop-stream")?;
        let req = self.core.request(Method::POST, &path);
        let stopped: Stopped = self.core.send_json(req).await?;
        Ok(stopped.message)
    }

    pub async fn stream_status(&self, camera_id: &str) -> ApiResult<StreamStatus> {
        let path = camera_path(camera_id, "stream-status")?;
        let req = self.core.request(Method::GET, &path);
        self.core.send_json(req).await
    }
}

/// Camera ids are opaque (numeric ids or device UUIDs) but must stay a
/// single path segment.
fn camera_path(camera_id: &str, action: &str) -> ApiResult<String> {
    let camera_id = camera_id.trim();
    if camera_id.is_empty() || camera_id.contains(['/', '?', '#']) {
        return Err(ApiError::Validation(format!(
            "invalid camera id '{camera_id}'"
        )));
    }
    Ok(format!("cameras/{camera_id}/{action}"))
}
