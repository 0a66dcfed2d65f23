use axum::{
    Json,
    extract::{multipart::MultipartRejection, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{path::PathBuf, time::Duration};
use thiserror::Error as ThisError;

use crate::api::models::convert::ErrorResponse;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Upload could not be accepted (malformed multipart, missing file, wrong format, too large)
    #[error("{message}")]
    InvalidUpload { message: String },

    /// External tool ran and reported failure, either through its exit status or a diagnostic
    #[error("{tool} error: {message}")]
    ToolFailed { tool: &'static str, message: String },

    /// External tool could not be started at all (e.g. binary not found)
    #[error("Failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// External tool ran longer than its configured timeout and was killed
    #[error("{tool} timed out after {}", humantime::format_duration(*timeout))]
    ToolTimeout { tool: &'static str, timeout: Duration },

    /// Conversion was abandoned because the service is shutting down
    #[error("Conversion cancelled")]
    Cancelled,

    /// Tool reported success but the expected output file is absent
    #[error("Conversion failed")]
    MissingOutput { expected: PathBuf },

    /// Filesystem error while staging the upload or reading the result
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Every failure is reported to callers identically; the variant only drives logging.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidUpload { .. } => "invalid_upload",
            Error::ToolFailed { .. } => "tool_failed",
            Error::ToolLaunch { .. } => "tool_launch",
            Error::ToolTimeout { .. } => "timeout",
            Error::Cancelled => "cancelled",
            Error::MissingOutput { .. } => "missing_output",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::ToolFailed { .. } | Error::ToolLaunch { .. } | Error::Io(_) | Error::Other(_) => {
                tracing::error!(kind = self.kind(), "Conversion error: {:#}", self);
            }
            Error::MissingOutput { expected } => {
                tracing::error!(kind = self.kind(), expected = %expected.display(), "Conversion produced no output");
            }
            Error::ToolTimeout { .. } | Error::Cancelled => {
                tracing::warn!(kind = self.kind(), "Conversion aborted: {}", self);
            }
            Error::InvalidUpload { .. } => {
                tracing::debug!(kind = self.kind(), "Client error: {}", self);
            }
        }

        let body = ErrorResponse { error: self.to_string() };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<MultipartRejection> for Error {
    fn from(rejection: MultipartRejection) -> Self {
        Error::InvalidUpload {
            message: format!("Failed to parse multipart data: {}", rejection.body_text()),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::InvalidUpload {
            message: format!("Invalid query string: {}", rejection.body_text()),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_json(error: Error) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_tool_failure_message_carries_tool_prefix() {
        let (status, body) = body_json(Error::ToolFailed {
            tool: "LibreOffice",
            message: "exit status: 1: source file could not be loaded".to_string(),
        })
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "LibreOffice error: exit status: 1: source file could not be loaded");
    }

    #[tokio::test]
    async fn test_missing_output_is_generic_conversion_failure() {
        let (status, body) = body_json(Error::MissingOutput {
            expected: PathBuf::from("/tmp/x/report.pdf"),
        })
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Conversion failed" }));
    }

    #[tokio::test]
    async fn test_invalid_upload_still_maps_to_500() {
        let (status, body) = body_json(Error::InvalidUpload {
            message: "Missing file field".to_string(),
        })
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Missing file field");
    }

    #[test]
    fn test_timeout_message_is_human_readable() {
        let err = Error::ToolTimeout {
            tool: "pdf2docx",
            timeout: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "pdf2docx timed out after 1m 30s");
        assert_eq!(err.kind(), "timeout");
    }
}
