//! Error types
//!
//! Background polling failures ([`FetchError`]) are contained at the poller
//! boundary. Only [`ActionError`] is meant to reach the user.

use thiserror::Error;

use crate::model::TransformerId;

/// Failure of a single fetch against a telemetry source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server returned HTTP {0}")]
    Status(u16),

    #[error("Server reported failure: {0}")]
    Unsuccessful(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e.to_string())
    }
}

/// Failure of a user-initiated command (isolate/restore)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Isolation request failed: {0}")]
    Request(#[from] FetchError),

    #[error("Server rejected the action: {0}")]
    Rejected(String),
}

/// Errors raised by the selection controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Transformer {0} is not part of the current fleet")]
    UnknownTransformer(TransformerId),
}

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}
