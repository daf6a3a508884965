//! campus.telemetry.v1 payload definition
//!
//! One payload carries a paired reading from an air node and a water node in
//! the same building. Units are encoded in the field names:
//! - `_c` degrees Celsius, `_pct` percent, `_ppm` parts per million
//! - `_ntu` nephelometric turbidity units, `_mgL` milligrams per litre
//! - `_uScm` microsiemens per centimetre, `_kpa` kilopascal, `_ugm3` µg/m³

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TelemetryError;

/// Current schema version
pub const SCHEMA_VERSION: &str = "campus.telemetry.v1";

/// Required numeric measurements, in wire-name order
pub const REQUIRED_MEASUREMENTS: [&str; 8] = [
    "air_temp_c",
    "air_rh_pct",
    "water_temp_c",
    "water_turbidity_ntu",
    "water_free_chlorine_mgL",
    "water_ph",
    "water_conductivity_uScm",
    "water_pressure_kpa",
];

/// Optional numeric measurements, in wire-name order
pub const OPTIONAL_MEASUREMENTS: [&str; 5] = [
    "air_co2_ppm",
    "air_pm25_ugm3",
    "air_tvoc",
    "air_surface_temp_c",
    "air_material_moisture",
];

/// Operating scenario the reading was taken under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scenario {
    Normal,
    MoldEpisode,
    WaterEvent,
    SensorFault,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Normal,
        Scenario::MoldEpisode,
        Scenario::WaterEvent,
        Scenario::SensorFault,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Normal => "NORMAL",
            Scenario::MoldEpisode => "MOLD_EPISODE",
            Scenario::WaterEvent => "WATER_EVENT",
            Scenario::SensorFault => "SENSOR_FAULT",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == upper)
            .ok_or_else(|| TelemetryError::UnknownScenario(s.to_string()))
    }
}

/// Where the reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSource {
    /// Physical sensor node
    Live,
    /// Synthetic generator
    Emulated,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Live => "LIVE",
            DataSource::Emulated => "EMULATED",
        }
    }
}

/// A single telemetry record as sent by a building gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Observation time; a timestamp without an offset is read as UTC
    #[serde(deserialize_with = "timestamp_as_utc")]
    pub ts: DateTime<Utc>,
    pub building_id: String,
    pub air_node_id: String,
    pub water_node_id: String,

    // A missing reading is NaN, which JSON writes as null
    #[serde(deserialize_with = "reading_or_nan")]
    pub air_temp_c: f64,
    #[serde(deserialize_with = "reading_or_nan")]
    pub air_rh_pct: f64,
    #[serde(deserialize_with = "reading_or_nan")]
    pub water_temp_c: f64,
    #[serde(deserialize_with = "reading_or_nan")]
    pub water_turbidity_ntu: f64,
    #[serde(rename = "water_free_chlorine_mgL", deserialize_with = "reading_or_nan")]
    pub water_free_chlorine_mg_l: f64,
    #[serde(deserialize_with = "reading_or_nan")]
    pub water_ph: f64,
    #[serde(rename = "water_conductivity_uScm", deserialize_with = "reading_or_nan")]
    pub water_conductivity_us_cm: f64,
    #[serde(deserialize_with = "reading_or_nan")]
    pub water_pressure_kpa: f64,

    pub scenario: Scenario,
    pub data_source: DataSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_co2_ppm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_pm25_ugm3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_tvoc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_surface_temp_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_material_moisture: Option<f64>,
}

impl TelemetryPayload {
    /// Look up a required or optional measurement by its wire name.
    ///
    /// Returns `None` for unknown names and for absent optional fields.
    pub fn measurement(&self, name: &str) -> Option<f64> {
        match name {
            "air_temp_c" => Some(self.air_temp_c),
            "air_rh_pct" => Some(self.air_rh_pct),
            "water_temp_c" => Some(self.water_temp_c),
            "water_turbidity_ntu" => Some(self.water_turbidity_ntu),
            "water_free_chlorine_mgL" => Some(self.water_free_chlorine_mg_l),
            "water_ph" => Some(self.water_ph),
            "water_conductivity_uScm" => Some(self.water_conductivity_us_cm),
            "water_pressure_kpa" => Some(self.water_pressure_kpa),
            "air_co2_ppm" => self.air_co2_ppm,
            "air_pm25_ugm3" => self.air_pm25_ugm3,
            "air_tvoc" => self.air_tvoc,
            "air_surface_temp_c" => self.air_surface_temp_c,
            "air_material_moisture" => self.air_material_moisture,
            _ => None,
        }
    }

    /// Number of optional measurements present
    pub fn optional_count(&self) -> usize {
        OPTIONAL_MEASUREMENTS
            .iter()
            .filter(|name| self.measurement(name).is_some())
            .count()
    }

    /// Validate structural constraints.
    ///
    /// Non-finite required measurements are accepted here; quality control
    /// reports them as missing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("building_id", &self.building_id),
            ("air_node_id", &self.air_node_id),
            ("water_node_id", &self.water_node_id),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyIdentifier(field.to_string()));
            }
        }

        for name in OPTIONAL_MEASUREMENTS {
            if let Some(value) = self.measurement(name) {
                if !value.is_finite() {
                    return Err(ValidationError::NonFiniteOptional {
                        field: name.to_string(),
                        value,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Parse an RFC 3339 timestamp, reading one without an offset as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            raw.parse::<NaiveDateTime>()
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

fn timestamp_as_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw:?}")))
}

fn reading_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Validation errors for telemetry payloads
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Identifier {0} must not be empty")]
    EmptyIdentifier(String),

    #[error("Optional field {field} is not a finite number: {value}")]
    NonFiniteOptional { field: String, value: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_json() -> &'static str {
        r#"{
            "ts": "2026-02-27T12:00:00Z",
            "building_id": "RUTGERS-ENG-1",
            "air_node_id": "AIR-001",
            "water_node_id": "WATER-001",
            "air_temp_c": 22.1,
            "air_rh_pct": 45.3,
            "water_temp_c": 18.5,
            "water_turbidity_ntu": 0.8,
            "water_free_chlorine_mgL": 1.21,
            "water_ph": 7.41,
            "water_conductivity_uScm": 352.0,
            "water_pressure_kpa": 280.4,
            "scenario": "NORMAL",
            "data_source": "EMULATED",
            "air_co2_ppm": 615.0
        }"#
    }

    #[test]
    fn test_deserialize_wire_names() {
        let payload: TelemetryPayload = serde_json::from_str(sample_json()).unwrap();

        assert_eq!(payload.ts, Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap());
        assert_eq!(payload.water_free_chlorine_mg_l, 1.21);
        assert_eq!(payload.water_conductivity_us_cm, 352.0);
        assert_eq!(payload.scenario, Scenario::Normal);
        assert_eq!(payload.data_source, DataSource::Emulated);
        assert_eq!(payload.air_co2_ppm, Some(615.0));
        assert_eq!(payload.air_tvoc, None);
        assert_eq!(payload.optional_count(), 1);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let json = sample_json().replace("\"water_ph\": 7.41,", "");
        let result = serde_json::from_str::<TelemetryPayload>(&json);
        assert!(result.is_err());
    }

    #[test]
    fn test_absent_optional_fields_not_serialized() {
        let payload: TelemetryPayload = serde_json::from_str(sample_json()).unwrap();
        let value = serde_json::to_value(&payload).unwrap();

        assert!(value.get("air_co2_ppm").is_some());
        assert!(value.get("air_pm25_ugm3").is_none());
        assert_eq!(value["water_free_chlorine_mgL"], 1.21);
        assert_eq!(value["scenario"], "NORMAL");
    }

    #[test]
    fn test_timestamp_without_offset_read_as_utc() {
        let json = sample_json().replace("2026-02-27T12:00:00Z", "2026-02-27T12:00:00");
        let payload: TelemetryPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload.ts, Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap());

        let json = sample_json().replace("2026-02-27T12:00:00Z", "2026-02-27T14:00:00+02:00");
        let payload: TelemetryPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload.ts, Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap());

        let json = sample_json().replace("2026-02-27T12:00:00Z", "yesterday");
        assert!(serde_json::from_str::<TelemetryPayload>(&json).is_err());
    }

    #[test]
    fn test_null_reading_is_missing() {
        let json = sample_json().replace("\"water_ph\": 7.41", "\"water_ph\": null");
        let payload: TelemetryPayload = serde_json::from_str(&json).unwrap();
        assert!(payload.water_ph.is_nan());
        assert!(payload.validate().is_ok());

        // NaN goes out as null and comes back as NaN
        let text = serde_json::to_string(&payload).unwrap();
        assert!(text.contains("\"water_ph\":null"));
        let back: TelemetryPayload = serde_json::from_str(&text).unwrap();
        assert!(back.water_ph.is_nan());
        assert_eq!(back.air_temp_c, 22.1);
    }

    #[test]
    fn test_measurement_lookup() {
        let payload: TelemetryPayload = serde_json::from_str(sample_json()).unwrap();

        for name in REQUIRED_MEASUREMENTS {
            assert!(payload.measurement(name).is_some(), "{name} missing");
        }
        assert_eq!(payload.measurement("water_ph"), Some(7.41));
        assert_eq!(payload.measurement("unknown_field"), None);
    }

    #[test]
    fn test_scenario_from_str() {
        assert_eq!("mold_episode".parse::<Scenario>().unwrap(), Scenario::MoldEpisode);
        assert_eq!(" WATER_EVENT ".parse::<Scenario>().unwrap(), Scenario::WaterEvent);
        assert!("FLOOD".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_validate() {
        let mut payload: TelemetryPayload = serde_json::from_str(sample_json()).unwrap();
        assert!(payload.validate().is_ok());

        payload.air_rh_pct = f64::NAN;
        assert!(payload.validate().is_ok());

        payload.air_tvoc = Some(f64::INFINITY);
        assert!(matches!(
            payload.validate(),
            Err(ValidationError::NonFiniteOptional { .. })
        ));

        payload.air_tvoc = None;
        payload.air_node_id = "  ".to_string();
        assert_eq!(
            payload.validate(),
            Err(ValidationError::EmptyIdentifier("air_node_id".to_string()))
        );
    }
}
