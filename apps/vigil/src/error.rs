use sfu_session::SessionError;
use std::io;
use thiserror::Error;
use vigil_sdk::ApiError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{}", describe_api(.0))]
    Api(#[from] ApiError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("logging initialization failed: {0}")]
    Logging(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgument(_) | CliError::Api(ApiError::Validation(_)) => 2,
            CliError::Api(_) | CliError::Unavailable(_) => 3,
            CliError::Session(_) => 4,
            CliError::Io(_) | CliError::Logging(_) => 1,
        }
    }
}

fn describe_api(err: &ApiError) -> String {
    match (err.status(), err.server_message()) {
        (Some(status), Some(message)) => format!("service returned {status}: {message}"),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_usage_service_and_session_failures() {
        assert_eq!(CliError::InvalidArgument("x".into()).exit_code(), 2);
        assert_eq!(
            CliError::Api(ApiError::Validation("limit".into())).exit_code(),
            2
        );
        assert_eq!(
            CliError::Session(SessionError::Protocol("bad".into())).exit_code(),
            4
        );
        assert_eq!(CliError::Logging("x".into()).exit_code(), 1);
    }

    #[test]
    fn api_errors_prefer_the_service_message() {
        let err = CliError::Api(ApiError::UnexpectedStatus {
            status: vigil_sdk::error::StatusCode::NOT_FOUND,
            body: r#"{"error":"Not Found","message":"Violation report not found"}"#.into(),
        });
        assert_eq!(
            err.to_string(),
            "service returned 404 Not Found: Violation report not found"
        );
    }
}
