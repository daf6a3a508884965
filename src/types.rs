//! Core types for the smart-campus pipeline
//!
//! This module defines the records produced for each ingested payload: raw
//! rows, derived features, forecasts and alerts, plus the response and
//! read-model shapes served by the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::schema::TelemetryPayload;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-field quality control flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcFlags {
    /// Value outside its plausible range
    pub range: BTreeMap<String, bool>,
    /// Value absent or not a finite number
    pub missing: BTreeMap<String, bool>,
    /// Value stuck over the flatline window
    pub flatline: BTreeMap<String, bool>,
}

impl QcFlags {
    /// Reason codes for every raised flag, e.g. `RANGE_AIR_RH_PCT`
    pub fn codes(&self) -> Vec<String> {
        let mut codes = Vec::new();
        for (prefix, flags) in [
            ("MISSING", &self.missing),
            ("RANGE", &self.range),
            ("FLATLINE", &self.flatline),
        ] {
            for (field, raised) in flags {
                if *raised {
                    codes.push(format!("{prefix}_{}", field.to_ascii_uppercase()));
                }
            }
        }
        codes
    }

    pub fn any_raised(&self) -> bool {
        [&self.range, &self.missing, &self.flatline]
            .iter()
            .any(|flags| flags.values().any(|raised| *raised))
    }
}

/// Stored raw telemetry row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: u64,
    pub payload: TelemetryPayload,
}

/// Derived features for one ingested payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: u64,
    pub ts: DateTime<Utc>,
    pub air_node_id: String,
    pub water_node_id: String,
    pub qc_flags: QcFlags,
    /// 1.0 minus QC penalties, in `[0, 1]`
    pub sensor_health_score: f64,
    pub idx_mold_now: f64,
    pub idx_water_event_now: f64,
}

/// Mold forecast issued at `ts` for `ts_target`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: u64,
    pub ts: DateTime<Utc>,
    pub ts_target: DateTime<Utc>,
    pub air_node_id: String,
    pub horizon_min: i64,
    pub pred_idx_mold_h: f64,
}

/// Raised alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: u64,
    /// Globally unique id, stable across store exports
    pub alert_id: String,
    pub ts: DateTime<Utc>,
    pub air_node_id: String,
    pub severity: Severity,
    pub message: String,
    pub reason_codes: Vec<String>,
}

/// Response to a successful ingest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryResponse {
    pub status: String,
    pub idx_mold_now: f64,
    pub pred_idx_mold_h: f64,
    pub idx_water_event_now: f64,
    pub sensor_health_score: f64,
    /// Severities of alerts raised by this payload
    pub alerts: Vec<Severity>,
}

/// Latest row of every table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    pub raw: Option<RawRecord>,
    pub feature: Option<FeatureRecord>,
    pub prediction: Option<PredictionRecord>,
    pub alert: Option<AlertRecord>,
}

/// Point of the humidity / mold-risk timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub ts: DateTime<Utc>,
    pub air_rh_pct: f64,
    pub idx_mold_now: Option<f64>,
    pub pred_idx_mold_h: Option<f64>,
}
