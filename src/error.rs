//! Error types for blockflow.
//!
//! Two layers of errors exist:
//! - [`BlockflowError`] covers engine-level failures (bad config, invalid
//!   workflow, channel problems) and is what the public API returns.
//! - [`BlockError`] is the failure of a single block attempt. It carries an
//!   [`ErrorKind`] so the retry engine can decide what to do with it.

use std::{io, string::FromUtf8Error, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all engine operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum BlockflowError {
    /// Engine-level errors (launch, shutdown, missing runtime).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors.
    #[error("{0}")]
    Convert(String),

    /// Workflow definition errors.
    #[error("{0}")]
    Workflow(String),

    /// Block definition errors.
    #[error("{0}")]
    Block(String),

    /// Structural validation failed before execution.
    #[error("{0}")]
    Validation(String),

    /// Action creation or execution errors.
    #[error("{0}")]
    Action(String),

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),

    /// Outbound HTTP errors.
    #[error("{0}")]
    Http(String),
}

impl From<BlockflowError> for String {
    fn from(val: BlockflowError) -> Self {
        val.to_string()
    }
}

impl From<io::Error> for BlockflowError {
    fn from(error: io::Error) -> Self {
        BlockflowError::IoError(error.to_string())
    }
}

impl From<FromUtf8Error> for BlockflowError {
    fn from(_: FromUtf8Error) -> Self {
        BlockflowError::Runtime("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for BlockflowError {
    fn from(error: serde_json::Error) -> Self {
        BlockflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for BlockflowError {
    fn from(error: toml::de::Error) -> Self {
        BlockflowError::Config(error.to_string())
    }
}

impl From<reqwest::Error> for BlockflowError {
    fn from(error: reqwest::Error) -> Self {
        BlockflowError::Http(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for BlockflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        BlockflowError::Action(error.to_string())
    }
}

/// Config problems surfacing at run time cannot be fixed by retrying.
impl From<BlockflowError> for BlockError {
    fn from(error: BlockflowError) -> Self {
        BlockError::validation(error.to_string())
    }
}

impl From<BlockError> for BlockflowError {
    fn from(error: BlockError) -> Self {
        BlockflowError::Action(error.to_string())
    }
}

/// Classification of a block failure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Structural problem in the block definition.
    Validation,
    /// An interpolation reference could not be resolved.
    MissingInput,
    Timeout,
    RateLimit,
    ServerError,
    NetworkError,
    /// The agent never called a tool it was required to call.
    MissingRequiredTool,
    /// The agent exceeded its tool call or iteration ceiling.
    ToolCallLimitExceeded,
    /// Strict output did not match the configured schema.
    SchemaViolation,
    /// The execution was cancelled while the block ran.
    Cancelled,
    /// Anything else that is not worth retrying (4xx, panics).
    Permanent,
}

impl ErrorKind {
    /// Transient kinds are eligible for automatic retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::RateLimit | ErrorKind::ServerError | ErrorKind::NetworkError)
    }
}

/// Failure of a single block attempt.
#[derive(Serialize, Deserialize, Error, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct BlockError {
    pub kind: ErrorKind,
    pub message: String,
    /// Server requested delay before the next attempt (HTTP `Retry-After`).
    #[serde(skip)]
    pub retry_after: Option<Duration>,
    /// HTTP status code when the failure came from a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl BlockError {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            status_code: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn missing_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingInput, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, message)
    }

    pub fn with_retry_after(
        mut self,
        retry_after: Duration,
    ) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Classify a non-2xx HTTP response.
    pub fn from_status(
        status: u16,
        body: &str,
    ) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimit,
            408 | 504 => ErrorKind::Timeout,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Permanent,
        };
        let mut message = format!("http status {status}");
        let body = body.trim();
        if !body.is_empty() {
            let snippet: String = body.chars().take(256).collect();
            message.push_str(&format!(": {snippet}"));
        }
        Self {
            kind,
            message,
            retry_after: None,
            status_code: Some(status),
        }
    }

    /// Key used by the circuit breaker to group failures of the same origin.
    pub fn source_key(&self) -> Option<&'static str> {
        match self.kind {
            ErrorKind::RateLimit => Some("rate_limit"),
            ErrorKind::ServerError => Some("server_5xx"),
            ErrorKind::NetworkError => Some("network_error"),
            ErrorKind::Timeout => Some("timeout"),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BlockError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return BlockError::from_status(status.as_u16(), "");
        }
        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_builder() {
            ErrorKind::Validation
        } else if error.is_connect() || error.is_request() || error.is_body() || error.is_decode() {
            ErrorKind::NetworkError
        } else {
            ErrorKind::ServerError
        };
        BlockError::new(kind, format!("http error: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(BlockError::from_status(429, "").kind, ErrorKind::RateLimit);
        assert_eq!(BlockError::from_status(503, "down").kind, ErrorKind::ServerError);
        assert_eq!(BlockError::from_status(504, "").kind, ErrorKind::Timeout);
        assert_eq!(BlockError::from_status(404, "").kind, ErrorKind::Permanent);
        assert_eq!(BlockError::from_status(503, "down").message, "http status 503: down");
    }

    #[test]
    fn test_display_is_the_message() {
        let err = BlockError::timeout("block 'a' timed out after 30s");
        assert_eq!(err.to_string(), "block 'a' timed out after 30s");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_error_kind_strings() {
        assert_eq!(ErrorKind::MissingRequiredTool.as_ref(), "missing_required_tool");
        assert_eq!("tool_call_limit_exceeded".parse::<ErrorKind>().unwrap(), ErrorKind::ToolCallLimitExceeded);
        assert!(ErrorKind::NetworkError.is_transient());
        assert!(!ErrorKind::MissingInput.is_transient());
    }
}
