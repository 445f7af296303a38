//! Violation service client: CRUD, workflow transitions, bulk updates,
//! export, statistics and AI processing control under `{base}/violations`.
//!
//! Requests are validated locally before anything goes on the wire, using
//! the same bounds the service enforces.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::HttpCore;
use crate::detection::DetectionModel;
use crate::error::{ApiError, ApiResult};
use crate::wire::{check_length, check_positive, lenient_f64, wire_enum};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_NOTES_CHARS: usize = 2000;
pub const MAX_MODEL_ID_CHARS: usize = 255;
pub const MAX_LIST_LIMIT: u32 = 1000;
pub const MIN_PROCESSING_INTERVAL_MS: u32 = 1000;
pub const MAX_PROCESSING_INTERVAL_MS: u32 = 60_000;
pub const DEFAULT_PROCESSING_INTERVAL_MS: u32 = 5000;

wire_enum! {
    pub enum ViolationType as "violation type" {
        PpeMissing => "ppe_missing",
        FallRisk => "fall_risk",
        UnauthorizedAccess => "unauthorized_access",
        FireHazard => "fire_hazard",
        SpillHazard => "spill_hazard",
        MachineSafety => "machine_safety",
        WorkAtHeight => "work_at_height",
    }
}

wire_enum! {
    pub enum Severity as "severity" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

wire_enum! {
    /// Workflow state of a violation. Records start as `new`; operators
    /// move them through the assignable states.
    pub enum ViolationStatus as "status" {
        New => "new",
        Acknowledged => "acknowledged",
        Investigating => "investigating",
        Reviewed => "reviewed",
        Resolved => "resolved",
        FalsePositive => "false_positive",
    }
}

impl ViolationStatus {
    /// States an update, a bulk update or a list filter may name.
    pub fn is_assignable(self) -> bool {
        matches!(
            self,
            ViolationStatus::Investigating
                | ViolationStatus::FalsePositive
                | ViolationStatus::Reviewed
                | ViolationStatus::Resolved
        )
    }
}

wire_enum! {
    pub enum SortField as "sort field" {
        Timestamp => "timestamp",
        Severity => "severity",
        AiConfidence => "ai_confidence",
        Status => "status",
    }
}

wire_enum! {
    pub enum SortOrder as "sort order" {
        Asc => "ASC",
        Desc => "DESC",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: u64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub status: ViolationStatus,
    #[serde(deserialize_with = "lenient_f64")]
    pub ai_confidence: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub full_image_url: Option<String>,
    #[serde(default)]
    pub resolution_date: Option<String>,
    pub camera_id: u64,
    #[serde(default)]
    pub investigator_id: Option<u64>,
    #[serde(default)]
    pub ai_model_id: Option<String>,
    #[serde(default)]
    pub detection_data: Option<Value>,
    #[serde(default)]
    pub bounding_boxes: Option<Value>,
}

/// Query for `list` and `export_csv`. Unset fields are left off the query
/// string; the service then sorts by `timestamp` descending.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViolationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ViolationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_type: Option<ViolationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigator_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

impl ViolationFilter {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(status) = self.status {
            check_assignable(status)?;
        }
        if let Some(camera_id) = self.camera_id {
            check_positive("camera_id", camera_id)?;
        }
        if let Some(investigator_id) = self.investigator_id {
            check_positive("investigator_id", investigator_id)?;
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_LIST_LIMIT {
                return Err(format!("limit must be between 1 and {MAX_LIST_LIMIT}"));
            }
        }
        for (field, date) in [("start_date", &self.start_date), ("end_date", &self.end_date)] {
            if date.as_deref().is_some_and(|date| date.trim().is_empty()) {
                return Err(format!("{field} must not be blank"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ViolationPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewViolation {
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub ai_confidence: f64,
    pub camera_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_boxes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_image_url: Option<String>,
}

impl NewViolation {
    pub fn new(
        violation_type: ViolationType,
        severity: Severity,
        ai_confidence: f64,
        camera_id: u64,
    ) -> Self {
        Self {
            violation_type,
            severity,
            ai_confidence,
            camera_id,
            description: None,
            ai_model_id: None,
            detection_data: None,
            bounding_boxes: None,
            thumbnail_url: None,
            full_image_url: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.ai_confidence.is_finite() || !(0.0..=100.0).contains(&self.ai_confidence) {
            return Err("ai_confidence must be between 0 and 100".into());
        }
        check_positive("camera_id", self.camera_id)?;
        if let Some(description) = &self.description {
            check_length("description", description, MAX_DESCRIPTION_CHARS)?;
        }
        if let Some(model_id) = &self.ai_model_id {
            check_length("ai_model_id", model_id, MAX_MODEL_ID_CHARS)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViolationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ViolationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigator_id: Option<u64>,
}

impl ViolationUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(status) = self.status {
            check_assignable(status)?;
        }
        if let Some(description) = &self.description {
            check_length("description", description, MAX_DESCRIPTION_CHARS)?;
        }
        check_notes(self.notes.as_deref())?;
        if let Some(investigator_id) = self.investigator_id {
            check_positive("investigator_id", investigator_id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkUpdate {
    pub violation_ids: Vec<u64>,
    pub status: ViolationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigator_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl BulkUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.violation_ids.is_empty() {
            return Err("violation_ids must be a non-empty array".into());
        }
        if self.violation_ids.contains(&0) {
            return Err("each violation id must be a positive integer".into());
        }
        check_assignable(self.status)?;
        if let Some(investigator_id) = self.investigator_id {
            check_positive("investigator_id", investigator_id)?;
        }
        check_notes(self.notes.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BulkUpdateOutcome {
    #[serde(default)]
    pub message: Option<String>,
    pub updated_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ViolationStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub today: u64,
    #[serde(default)]
    pub this_week: u64,
    #[serde(default)]
    pub by_type: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_severity: BTreeMap<String, u64>,
    #[serde(default)]
    pub by_status: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingRequest {
    pub camera_id: u64,
    pub model_type: DetectionModel,
    pub interval_ms: u32,
}

impl ProcessingRequest {
    pub fn new(camera_id: u64) -> Self {
        Self {
            camera_id,
            model_type: DetectionModel::default(),
            interval_ms: DEFAULT_PROCESSING_INTERVAL_MS,
        }
    }

    pub fn with_model(mut self, model_type: DetectionModel) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u32) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        check_positive("camera_id", self.camera_id)?;
        if !(MIN_PROCESSING_INTERVAL_MS..=MAX_PROCESSING_INTERVAL_MS).contains(&self.interval_ms) {
            return Err(format!(
                "interval_ms must be between {MIN_PROCESSING_INTERVAL_MS} and {MAX_PROCESSING_INTERVAL_MS}"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct StopProcessing<'a> {
    camera_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_id: Option<&'a str>,
}

/// Acknowledgement of a processing start/stop. `details` holds whatever the
/// service echoed back (`processing_id`, `status`, ...).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessingAck {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ProcessingAck {
    pub fn processing_id(&self) -> Option<&str> {
        self.details.get("processing_id").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraProcessing {
    pub camera_id: Value,
    #[serde(default)]
    pub is_processing: bool,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub last_processed: Option<String>,
    #[serde(default)]
    pub violations_detected: u64,
    #[serde(default)]
    pub processing_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessingOverview {
    #[serde(default)]
    pub ai_models_service: bool,
    #[serde(default)]
    pub available_models: u64,
    #[serde(default)]
    pub models_list: Vec<Value>,
    #[serde(default)]
    pub last_health_check: Option<String>,
    #[serde(default)]
    pub camera_service: bool,
}

/// `GET /violations/processing/status` answers per camera when asked about
/// one, and with a service overview otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingStatus {
    Camera(CameraProcessing),
    Overview(ProcessingOverview),
}

#[derive(Deserialize)]
struct ViolationEnvelope {
    violation: Violation,
}

#[derive(Deserialize)]
struct StatsEnvelope {
    #[serde(default)]
    stats: ViolationStats,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct NotesBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Serialize)]
struct CameraQuery {
    camera_id: u64,
}

#[derive(Clone)]
pub struct ViolationClient {
    core: HttpCore,
}

impl ViolationClient {
    pub fn new(base_url: &str, token: Option<String>) -> ApiResult<Self> {
        Ok(Self {
            core: HttpCore::new(base_url, token, REQUEST_TIMEOUT)?,
        })
    }

    pub async fn list(&self, filter: &ViolationFilter) -> ApiResult<ViolationPage> {
        filter.validate().map_err(ApiError::Validation)?;
        let req = self.core.request(Method::GET, "violations").query(filter);
        self.core.send_json(req).await
    }

    pub async fn get(&self, id: u64) -> ApiResult<Violation> {
        check_id(id)?;
        let req = self.core.request(Method::GET, &format!("violations/{id}"));
        let envelope: ViolationEnvelope = self.core.send_json(req).await?;
        Ok(envelope.violation)
    }

    pub async fn create(&self, violation: &NewViolation) -> ApiResult<Violation> {
        violation.validate().map_err(ApiError::Validation)?;
        let req = self.core.request(Method::POST, "violations").json(violation);
        let envelope: ViolationEnvelope = self.core.send_json(req).await?;
        tracing::info!(
            target: "vigil.api",
            violation_id = envelope.violation.id,
            violation_type = envelope.violation.violation_type.as_str(),
            "violation created"
        );
        Ok(envelope.violation)
    }

    pub async fn update(&self, id: u64, update: &ViolationUpdate) -> ApiResult<Violation> {
        check_id(id)?;
        update.validate().map_err(ApiError::Validation)?;
        let req = self
            .core
            .request(Method::PUT, &format!("violations/{id}"))
            .json(update);
        let envelope: ViolationEnvelope = self.core.send_json(req).await?;
        Ok(envelope.violation)
    }

    /// Returns the service's confirmation message.
    pub async fn delete(&self, id: u64) -> ApiResult<Option<String>> {
        check_id(id)?;
        let req = self
            .core
            .request(Method::DELETE, &format!("violations/{id}"));
        let envelope: MessageEnvelope = self.core.send_json(req).await?;
        Ok(envelope.message)
    }

    /// Moves the violation to `reviewed`.
    pub async fn acknowledge(&self, id: u64, notes: Option<&str>) -> ApiResult<Violation> {
        self.transition(id, "acknowledge", notes).await
    }

    /// Moves the violation to `resolved` and stamps the resolution date.
    pub async fn resolve(&self, id: u64, notes: Option<&str>) -> ApiResult<Violation> {
        self.transition(id, "resolve", notes).await
    }

    pub async fn mark_false_positive(&self, id: u64, notes: Option<&str>) -> ApiResult<Violation> {
        self.transition(id, "false-positive", notes).await
    }

    async fn transition(&self, id: u64, action: &str, notes: Option<&str>) -> ApiResult<Violation> {
        check_id(id)?;
        check_notes(notes).map_err(ApiError::Validation)?;
        let req = self
            .core
            .request(Method::POST, &format!("violations/{id}/{action}"))
            .json(&NotesBody { notes });
        let envelope: ViolationEnvelope = self.core.send_json(req).await?;
        tracing::debug!(
            target: "vigil.api",
            violation_id = id,
            action,
            status = envelope.violation.status.as_str(),
            "violation transitioned"
        );
        Ok(envelope.violation)
    }

    pub async fn bulk_update(&self, update: &BulkUpdate) -> ApiResult<BulkUpdateOutcome> {
        update.validate().map_err(ApiError::Validation)?;
        let req = self
            .core
            .request(Method::POST, "violations/bulk-update")
            .json(update);
        self.core.send_json(req).await
    }

    /// The service's CSV rendering of every violation matching `filter`.
    /// Paging and sorting fields are ignored by the export endpoint.
    pub async fn export_csv(&self, filter: &ViolationFilter) -> ApiResult<String> {
        filter.validate().map_err(ApiError::Validation)?;
        let req = self
            .core
            .request(Method::GET, "violations/export")
            .query(filter);
        let res = self.core.send(req).await?;
        Ok(res.text().await?)
    }

    pub async fn stats(&self) -> ApiResult<ViolationStats> {
        let req = self.core.request(Method::GET, "violations/stats");
        let envelope: StatsEnvelope = self.core.send_json(req).await?;
        Ok(envelope.stats)
    }

    pub async fn start_processing(&self, request: &ProcessingRequest) -> ApiResult<ProcessingAck> {
        request.validate().map_err(ApiError::Validation)?;
        let req = self
            .core
            .request(Method::POST, "violations/processing/start")
            .json(request);
        let ack: ProcessingAck = self.core.send_json(req).await?;
        tracing::info!(
            target: "vigil.api",
            camera_id = request.camera_id,
            model = request.model_type.as_str(),
            "violation processing started"
        );
        Ok(ack)
    }

    pub async fn stop_processing(
        &self,
        camera_id: u64,
        processing_id: Option<&str>,
    ) -> ApiResult<ProcessingAck> {
        check_positive("camera_id", camera_id).map_err(ApiError::Validation)?;
        if let Some(processing_id) = processing_id {
            check_length("processing_id", processing_id, MAX_MODEL_ID_CHARS)
                .map_err(ApiError::Validation)?;
        }
        let req = self
            .core
            .request(Method::POST, "violations/processing/stop")
            .json(&StopProcessing {
                camera_id,
                processing_id,
            });
        self.core.send_json(req).await
    }

    pub async fn processing_status(&self, camera_id: Option<u64>) -> ApiResult<ProcessingStatus> {
        let mut req = self
            .core
            .request(Method::GET, "violations/processing/status");
        if let Some(camera_id) = camera_id {
            check_positive("camera_id", camera_id).map_err(ApiError::Validation)?;
            req = req.query(&CameraQuery { camera_id });
        }
        let body: Value = self.core.send_json(req).await?;
        let status = if camera_id.is_some() {
            ProcessingStatus::Camera(serde_json::from_value(body).map_err(decode_error)?)
        } else {
            ProcessingStatus::Overview(serde_json::from_value(body).map_err(decode_error)?)
        };
        Ok(status)
    }
}

fn check_id(id: u64) -> ApiResult<()> {
    check_positive("violation id", id).map_err(ApiError::Validation)
}

fn check_assignable(status: ViolationStatus) -> Result<(), String> {
    if status.is_assignable() {
        Ok(())
    } else {
        Err(format!(
            "status '{status}' cannot be assigned; use investigating, false_positive, reviewed or resolved"
        ))
    }
}

fn check_notes(notes: Option<&str>) -> Result<(), String> {
    match notes {
        Some(notes) => check_length("notes", notes, MAX_NOTES_CHARS),
        None => Ok(()),
    }
}

fn decode_error(err: serde_json::Error) -> ApiError {
    ApiError::Validation(format!("unexpected response shape: {err}"))
}
