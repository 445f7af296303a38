use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How inbound responses are tied back to pending requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrelationMode {
    /// Match by echoed id; fall back to the oldest request expecting the
    /// response type when the server does not echo ids.
    #[default]
    Auto,
    /// Only echoed ids resolve requests.
    EchoedIds,
}

impl CorrelationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationMode::Auto => "auto",
            CorrelationMode::EchoedIds => "echoed-ids",
        }
    }
}

impl fmt::Display for CorrelationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrelationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(CorrelationMode::Auto),
            "echoed-ids" | "echoed_ids" | "ids" => Ok(CorrelationMode::EchoedIds),
            other => Err(format!("unknown correlation mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on every signaling round trip.
    pub request_timeout: Duration,
    /// How long the session waits for the runtime to fire the DTLS connect
    /// trigger after the local transport exists.
    pub connect_timeout: Duration,
    pub correlation: CorrelationMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            correlation: CorrelationMode::Auto,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let request_timeout = std::env::var("VIGIL_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);
        let connect_timeout = std::env::var("VIGIL_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.connect_timeout);
        let correlation = std::env::var("VIGIL_CORRELATION")
            .ok()
            .and_then(|value| value.parse::<CorrelationMode>().ok())
            .unwrap_or(defaults.correlation);

        Self {
            request_timeout,
            connect_timeout,
            correlation,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationMode) -> Self {
        self.correlation = correlation;
        self
    }
}
