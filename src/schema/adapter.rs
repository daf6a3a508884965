//! Batch adapter for campus.telemetry.v1 payloads
//!
//! Reads payloads from NDJSON or JSON arrays, as produced by gateway dumps
//! and the synthetic generator.

use crate::error::TelemetryError;
use crate::schema::{TelemetryPayload, ValidationError};

/// Adapter for batches of telemetry payloads
pub struct PayloadAdapter;

impl PayloadAdapter {
    /// Parse a JSON array of payloads
    pub fn parse_array(json: &str) -> Result<Vec<TelemetryPayload>, TelemetryError> {
        let payloads: Vec<TelemetryPayload> = serde_json::from_str(json)?;
        Ok(payloads)
    }

    /// Parse NDJSON (newline-delimited JSON) containing payloads
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<TelemetryPayload>, TelemetryError> {
        let mut payloads = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryPayload>(trimmed) {
                Ok(payload) => payloads.push(payload),
                Err(e) => {
                    return Err(TelemetryError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(payloads)
    }

    /// Validate payloads, returning only the failures
    pub fn validate_payloads(payloads: &[TelemetryPayload]) -> Vec<ValidationResult> {
        payloads
            .iter()
            .enumerate()
            .filter_map(|(idx, payload)| {
                payload.validate().err().map(|error| ValidationResult {
                    index: idx,
                    air_node_id: payload.air_node_id.clone(),
                    error,
                })
            })
            .collect()
    }
}

/// A payload that failed validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub air_node_id: String,
    pub error: ValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_payload;

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let line = serde_json::to_string(&sample_payload()).unwrap();
        let ndjson = format!("{line}\n\n   \n{line}\n");

        let payloads = PayloadAdapter::parse_ndjson(&ndjson).unwrap();
        assert_eq!(payloads.len(), 2);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let line = serde_json::to_string(&sample_payload()).unwrap();
        let ndjson = format!("{line}\n{{\"ts\": 1}}\n");

        let err = PayloadAdapter::parse_ndjson(&ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let json = serde_json::to_string(&vec![sample_payload(), sample_payload()]).unwrap();
        assert_eq!(PayloadAdapter::parse_array(&json).unwrap().len(), 2);
        assert!(PayloadAdapter::parse_array("{}").is_err());
    }

    #[test]
    fn test_validate_payloads() {
        let mut bad = sample_payload();
        bad.building_id = String::new();
        let payloads = vec![sample_payload(), bad];

        let results = PayloadAdapter::validate_payloads(&payloads);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 1);
        assert_eq!(
            results[0].error,
            ValidationError::EmptyIdentifier("building_id".to_string())
        );
    }
}
