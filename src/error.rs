//! Error types for the smart-campus pipeline

use thiserror::Error;

use crate::schema::ValidationError;

/// Errors that can occur while ingesting, storing or serving telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CBOR: {0}")]
    CborError(#[from] serde_cbor::Error),

    #[error("Invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}

impl From<ureq::Error> for TelemetryError {
    fn from(e: ureq::Error) -> Self {
        TelemetryError::Transport(e.to_string())
    }
}
