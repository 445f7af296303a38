//! Asynchronous clients for the Vigil dashboard services.
//!
//! Used by the `vigil` CLI and by tests. Each client wraps one backend:
//! the violation service, the camera stream API and the AI-detection
//! service. All of them check the HTTP status before decoding and surface
//! anything outside 2xx as [`ApiError::UnexpectedStatus`].

mod client;
pub mod detection;
pub mod error;
pub mod streams;
pub mod violations;
mod wire;

pub use detection::{
    DetectionClient, DetectionModel, DetectionResult, Frame, HealthMonitor, HealthReport,
    HealthStatus, ModelInfo,
};
pub use error::{ApiError, ApiResult, ParseEnumError};
pub use streams::{Producers, StreamClient, StreamStart, StreamStatus, StreamTarget};
pub use violations::{
    BulkUpdate, BulkUpdateOutcome, CameraProcessing, NewViolation, ProcessingAck,
    ProcessingOverview, ProcessingRequest, ProcessingStatus, Severity, SortField, SortOrder,
    Violation, ViolationClient, ViolationFilter, ViolationPage, ViolationStats, ViolationStatus,
    ViolationType, ViolationUpdate,
};
