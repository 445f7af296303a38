use clap::{Args, Parser, Subcommand};
use sfu_session::{CorrelationMode, SessionConfig};
use std::path::PathBuf;
use std::time::Duration;
use vigil_sdk::{
    DetectionModel, Severity, SortField, SortOrder, ViolationFilter, ViolationStatus,
    ViolationType,
};

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "vigil",
    about = "Safety-monitoring operator tool: consume SFU camera streams and manage violations",
    author,
    version,
    propagate_version = true
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "VIGIL_API_URL",
        default_value = "http://localhost:3005/api",
        help = "Base URL of the dashboard API (cameras, violations)"
    )]
    pub api_url: String,

    #[arg(
        long,
        global = true,
        env = "VIGIL_API_TOKEN",
        hide_env_values = true,
        help = "Bearer token sent to the dashboard API"
    )]
    pub api_token: Option<String>,

    #[arg(
        long,
        global = true,
        env = "VIGIL_AI_URL",
        default_value = "http://localhost:8000",
        help = "Base URL of the AI detection service"
    )]
    pub ai_url: String,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "VIGIL_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "VIGIL_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Consume one producer from an SFU room and hold the session until Ctrl-C.
    Consume(ConsumeArgs),
    /// Start a camera stream through the dashboard API, then consume it.
    Watch(WatchArgs),
    /// Query and triage safety violations.
    #[command(subcommand)]
    Violations(ViolationsCommand),
    /// Control AI violation processing for cameras.
    #[command(subcommand)]
    Processing(ProcessingCommand),
    /// Check the AI detection service.
    Health(HealthArgs),
}

/// Overrides for the session timeouts otherwise read from the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    #[arg(long, value_name = "MS", help = "Timeout for each signaling request")]
    pub request_timeout_ms: Option<u64>,

    #[arg(
        long,
        value_name = "MS",
        help = "How long to wait for the transport DTLS connect"
    )]
    pub connect_timeout_ms: Option<u64>,

    #[arg(
        long,
        value_name = "MODE",
        help = "Response correlation: auto (ids, then message type) or echoed-ids"
    )]
    pub correlation: Option<CorrelationMode>,

    #[arg(
        long = "for",
        value_name = "SECS",
        help = "Disconnect after this many seconds instead of waiting for Ctrl-C"
    )]
    pub hold_secs: Option<u64>,
}

impl SessionArgs {
    pub fn to_config(&self) -> SessionConfig {
        let mut config = SessionConfig::from_env();
        if let Some(ms) = self.request_timeout_ms.filter(|ms| *ms > 0) {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.connect_timeout_ms.filter(|ms| *ms > 0) {
            config = config.with_connect_timeout(Duration::from_millis(ms));
        }
        if let Some(mode) = self.correlation {
            config = config.with_correlation(mode);
        }
        config
    }

    pub fn hold(&self) -> Option<Duration> {
        self.hold_secs.map(Duration::from_secs)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConsumeArgs {
    #[arg(
        long,
        env = "VIGIL_SIGNALING_URL",
        help = "SFU signaling endpoint (ws://, wss://, http:// or https://)"
    )]
    pub signaling_url: String,

    #[arg(long, help = "Room the producer publishes into")]
    pub room: String,

    #[arg(long, help = "Producer id to consume")]
    pub producer: String,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[arg(long, help = "Camera id as known to the dashboard API")]
    pub camera: String,

    #[arg(
        long,
        env = "VIGIL_SIGNALING_URL",
        help = "Signaling endpoint to use when the stream response does not name one"
    )]
    pub signaling_url: Option<String>,

    #[arg(long, help = "Stop the camera stream when the session ends")]
    pub stop_stream: bool,

    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Subcommand, Debug)]
pub enum ViolationsCommand {
    /// List violations matching the filters.
    List(ListArgs),
    /// Show one violation.
    Get {
        id: u64,
        #[arg(long, help = "Print the raw record as JSON")]
        json: bool,
    },
    /// Acknowledge a violation (moves it to reviewed).
    Ack(NotesArgs),
    /// Resolve a violation.
    Resolve(NotesArgs),
    /// Mark a violation as a false positive.
    FalsePositive(NotesArgs),
    /// Set the status of several violations at once.
    BulkUpdate(BulkUpdateArgs),
    /// Export matching violations as CSV.
    Export(ExportArgs),
    /// Show violation counts by type, severity and status.
    Stats,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long, help = "investigating, false_positive, reviewed or resolved")]
    pub status: Option<ViolationStatus>,

    #[arg(long, help = "low, medium, high or critical")]
    pub severity: Option<Severity>,

    #[arg(long = "type", value_name = "TYPE", help = "Violation type, e.g. ppe_missing")]
    pub violation_type: Option<ViolationType>,

    #[arg(long)]
    pub camera: Option<u64>,

    #[arg(long, value_name = "DATE", help = "ISO 8601 lower bound")]
    pub since: Option<String>,

    #[arg(long, value_name = "DATE", help = "ISO 8601 upper bound")]
    pub until: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> ViolationFilter {
        ViolationFilter {
            status: self.status,
            severity: self.severity,
            violation_type: self.violation_type,
            camera_id: self.camera,
            start_date: self.since.clone(),
            end_date: self.until.clone(),
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[arg(long)]
    pub investigator: Option<u64>,

    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    #[arg(long)]
    pub offset: Option<u32>,

    #[arg(long, help = "timestamp, severity, ai_confidence or status")]
    pub sort_by: Option<SortField>,

    #[arg(long, help = "ASC or DESC")]
    pub sort_order: Option<SortOrder>,

    #[arg(long, help = "Print the records as JSON")]
    pub json: bool,
}

impl ListArgs {
    pub fn to_filter(&self) -> ViolationFilter {
        ViolationFilter {
            investigator_id: self.investigator,
            limit: Some(self.limit),
            offset: self.offset,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            ..self.filter.to_filter()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct NotesArgs {
    pub id: u64,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct BulkUpdateArgs {
    #[arg(long, value_delimiter = ',', required = true, help = "Comma-separated violation ids")]
    pub ids: Vec<u64>,

    #[arg(long, help = "investigating, false_positive, reviewed or resolved")]
    pub status: ViolationStatus,

    #[arg(long)]
    pub investigator: Option<u64>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[arg(long, short, value_name = "PATH", help = "Write to a file instead of stdout")]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ProcessingCommand {
    /// Start AI processing for a camera.
    Start {
        #[arg(long)]
        camera: u64,
        #[arg(long, default_value_t = DetectionModel::WorkAtHeight, help = "work_at_height or fall_detection")]
        model: DetectionModel,
        #[arg(long, default_value_t = vigil_sdk::violations::DEFAULT_PROCESSING_INTERVAL_MS)]
        interval_ms: u32,
    },
    /// Stop AI processing for a camera.
    Stop {
        #[arg(long)]
        camera: u64,
        #[arg(long)]
        processing_id: Option<String>,
    },
    /// Show processing state for one camera, or the service overview.
    Status {
        #[arg(long)]
        camera: Option<u64>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct HealthArgs {
    #[arg(long, help = "Keep polling and report every change")]
    pub watch: bool,

    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub interval: u64,
}
