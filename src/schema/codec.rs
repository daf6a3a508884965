//! Wire encodings for telemetry payloads
//!
//! Gateways send either JSON (the BLE bridge forwards text) or CBOR.

use crate::error::TelemetryError;
use crate::schema::TelemetryPayload;

/// Supported payload encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCodec {
    Json,
    Cbor,
}

impl PayloadCodec {
    /// Pick a codec from an HTTP `Content-Type` header value.
    ///
    /// Parameters such as `; charset=utf-8` are ignored. Anything that is not
    /// CBOR is treated as JSON.
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/cbor" => PayloadCodec::Cbor,
            _ => PayloadCodec::Json,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            PayloadCodec::Json => "application/json",
            PayloadCodec::Cbor => "application/cbor",
        }
    }

    pub fn encode(&self, payload: &TelemetryPayload) -> Result<Vec<u8>, TelemetryError> {
        match self {
            PayloadCodec::Json => Ok(serde_json::to_vec(payload)?),
            PayloadCodec::Cbor => Ok(serde_cbor::to_vec(payload)?),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<TelemetryPayload, TelemetryError> {
        match self {
            PayloadCodec::Json => Ok(serde_json::from_slice(bytes)?),
            PayloadCodec::Cbor => Ok(serde_cbor::from_slice(bytes)?),
        }
    }
}
