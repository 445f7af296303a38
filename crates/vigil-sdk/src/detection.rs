//! Client for the AI-detection backend plus a background health monitor.
//!
//! The backend reports itself healthy with `{"status": "healthy",
//! "models_loaded": N}` on `GET /health`; anything else (including a
//! transport failure) counts as unhealthy.

use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::HttpCore;
use crate::error::{ApiError, ApiResult};
use crate::wire::{check_positive, lenient_f64, wire_enum};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const DETECT_TIMEOUT: Duration = Duration::from_secs(30);

wire_enum! {
    /// Detection model a frame is evaluated against.
    pub enum DetectionModel as "model type" {
        WorkAtHeight => "work_at_height",
        FallDetection => "fall_detection",
    }
}

impl DetectionModel {
    pub fn endpoint(self) -> &'static str {
        match self {
            DetectionModel::WorkAtHeight => "detect/work-at-height",
            DetectionModel::FallDetection => "detect/fall",
        }
    }
}

impl Default for DetectionModel {
    fn default() -> Self {
        DetectionModel::WorkAtHeight
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub models_loaded: u32,
    #[serde(default)]
    pub available_models: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub model_type: Option<String>,
}

#[derive(Deserialize)]
struct ModelsEnvelope {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// One encoded frame submitted for detection.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    /// Base64-encoded image bytes.
    pub image_data: String,
    pub camera_id: u64,
    pub timestamp: String,
}

impl Frame {
    /// Stamps the frame with the current UTC time.
    pub fn now(camera_id: u64, image_data: impl Into<String>) -> ApiResult<Self> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| ApiError::Validation(format!("cannot format timestamp: {err}")))?;
        Ok(Self {
            image_data: image_data.into(),
            camera_id,
            timestamp,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub violations: Vec<Value>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub processing_time: f64,
    #[serde(default, alias = "model")]
    pub model_used: Option<String>,
    #[serde(default)]
    pub bounding_boxes: Vec<Value>,
    #[serde(default)]
    pub detection_data: Value,
}

impl DetectionResult {
    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}

#[derive(Clone)]
pub struct DetectionClient {
    core: HttpCore,
}

impl DetectionClient {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Ok(Self {
            core: HttpCore::new(base_url, None, DETECT_TIMEOUT)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.core.base_url()
    }

    pub async fn health(&self) -> ApiResult<HealthReport> {
        let req = self
            .core
            .request(Method::GET, "health")
            .timeout(HEALTH_TIMEOUT);
        self.core.send_json(req).await
    }

    pub async fn models(&self) -> ApiResult<Vec<ModelInfo>> {
        let req = self
            .core
            .request(Method::GET, "models")
            .timeout(HEALTH_TIMEOUT);
        let envelope: ModelsEnvelope = self.core.send_json(req).await?;
        Ok(envelope.models)
    }

    pub async fn detect(&self, model: DetectionModel, frame: &Frame) -> ApiResult<DetectionResult> {
        check_positive("camera_id", frame.camera_id).map_err(ApiError::Validation)?;
        if frame.image_data.is_empty() {
            return Err(ApiError::Validation("image_data must not be empty".into()));
        }
        let req = self.core.request(Method::POST, model.endpoint()).json(frame);
        let mut result: DetectionResult = self.core.send_json(req).await?;
        if result.model_used.is_none() {
            result.model_used = Some(model.as_str().to_string());
        }
        tracing::debug!(
            target: "vigil.detection",
            model = model.as_str(),
            camera_id = frame.camera_id,
            violations = result.violations.len(),
            "frame processed"
        );
        Ok(result)
    }
}

/// Latest view of the detection backend as seen by a [`HealthMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Unknown,
    Healthy {
        models_loaded: u32,
        available_models: Vec<String>,
        checked_at: Instant,
    },
    Unhealthy {
        reason: String,
        consecutive_failures: u32,
        checked_at: Instant,
    },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }

    fn failures(&self) -> u32 {
        match self {
            HealthStatus::Unhealthy {
                consecutive_failures,
                ..
            } => *consecutive_failures,
            _ => 0,
        }
    }
}

/// Polls `GET /health` on a fixed interval and publishes each outcome on a
/// watch channel until cancelled or dropped.
pub struct HealthMonitor {
    status: watch::Receiver<HealthStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn spawn(client: DetectionClient, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (tx, status) = watch::channel(HealthStatus::Unknown);
        let task = tokio::spawn(poll_health(client, interval, tx, cancel.clone()));
        Self {
            status,
            cancel,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status.clone()
    }

    pub fn latest(&self) -> HealthStatus {
        self.status.borrow().clone()
    }

    /// Stops polling and waits for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_health(
    client: DetectionClient,
    interval: Duration,
    tx: watch::Sender<HealthStatus>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = client.health() => outcome,
        };
        let checked_at = Instant::now();
        let next = match outcome {
            Ok(report) if report.is_healthy() => HealthStatus::Healthy {
                models_loaded: report.models_loaded,
                available_models: report.available_models,
                checked_at,
            },
            Ok(report) => HealthStatus::Unhealthy {
                reason: format!("service reported status '{}'", report.status),
                consecutive_failures: tx.borrow().failures() + 1,
                checked_at,
            },
            Err(err) => HealthStatus::Unhealthy {
                reason: err.to_string(),
                consecutive_failures: tx.borrow().failures() + 1,
                checked_at,
            },
        };
        let was_healthy = tx.borrow().is_healthy();
        match &next {
            HealthStatus::Healthy { models_loaded, .. } if !was_healthy => {
                tracing::info!(target: "vigil.detection", models_loaded, "detection service healthy");
            }
            HealthStatus::Unhealthy {
                reason,
                consecutive_failures,
                ..
            } => {
                tracing::warn!(
                    target: "vigil.detection",
                    consecutive_failures,
                    "detection service unhealthy: {reason}"
                );
            }
            _ => {}
        }
        if tx.send(next).is_err() {
            break;
        }
    }
    tracing::debug!(target: "vigil.detection", "health monitor stopped");
}
