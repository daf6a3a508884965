//! Runtime settings
//!
//! Settings come from environment variables (a `.env` file is honoured by the
//! `campus` binary). Every variable is optional.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TelemetryError;

/// Default location of the store file
pub const DEFAULT_STORE_PATH: &str = "./data/smart_campus.cbor";

/// Default listen address of the ingest API
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Inclusive plausible range of a measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QcRange {
    pub min: f64,
    pub max: f64,
}

impl QcRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Pipeline and service settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Store file path; `None` keeps state in memory only
    pub store_path: Option<PathBuf>,
    /// Listen address for `campus serve`
    pub bind: String,
    pub forecast_horizon_minutes: i64,
    /// Mold forecast level that counts toward an alert
    pub alert_threshold: f64,
    /// Consecutive records above threshold needed to raise an alert
    pub alert_consecutive: usize,
    /// Readings considered for flatline detection
    pub flatline_window: usize,
    pub water_alert_threshold: f64,
    pub health_alert_threshold: f64,
    /// QC ranges keyed by measurement wire name
    pub qc_ranges: BTreeMap<&'static str, QcRange>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: Some(PathBuf::from(DEFAULT_STORE_PATH)),
            bind: DEFAULT_BIND.to_string(),
            forecast_horizon_minutes: 60,
            alert_threshold: 0.6,
            alert_consecutive: 3,
            flatline_window: 5,
            water_alert_threshold: 0.7,
            health_alert_threshold: 0.5,
            qc_ranges: default_qc_ranges(),
        }
    }
}

/// Plausible ranges for the required measurements
pub fn default_qc_ranges() -> BTreeMap<&'static str, QcRange> {
    BTreeMap::from([
        ("air_temp_c", QcRange::new(0.0, 50.0)),
        ("air_rh_pct", QcRange::new(0.0, 100.0)),
        ("water_temp_c", QcRange::new(0.0, 50.0)),
        ("water_turbidity_ntu", QcRange::new(0.0, 1000.0)),
        ("water_free_chlorine_mgL", QcRange::new(0.0, 5.0)),
        ("water_ph", QcRange::new(0.0, 14.0)),
        ("water_conductivity_uScm", QcRange::new(0.0, 5000.0)),
        ("water_pressure_kpa", QcRange::new(0.0, 1000.0)),
    ])
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TelemetryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(path) = lookup("CAMPUS_STORE_PATH") {
            settings.store_path = store_path_from_str(&path);
        }
        if let Some(bind) = lookup("CAMPUS_BIND") {
            settings.bind = bind;
        }
        if let Some(v) = parse_var(&lookup, "FORECAST_HORIZON_MINUTES")? {
            settings.forecast_horizon_minutes = v;
        }
        if let Some(v) = parse_var(&lookup, "ALERT_THRESHOLD")? {
            settings.alert_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "ALERT_CONSECUTIVE")? {
            settings.alert_consecutive = v;
        }
        if let Some(v) = parse_var(&lookup, "FLATLINE_WINDOW")? {
            settings.flatline_window = v;
        }
        if let Some(v) = parse_var(&lookup, "WATER_ALERT_THRESHOLD")? {
            settings.water_alert_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "HEALTH_ALERT_THRESHOLD")? {
            settings.health_alert_threshold = v;
        }

        settings.check()?;
        Ok(settings)
    }

    /// Reject combinations the pipeline cannot work with
    pub fn check(&self) -> Result<(), TelemetryError> {
        if self.forecast_horizon_minutes <= 0 {
            return Err(TelemetryError::Config(
                "FORECAST_HORIZON_MINUTES must be positive".to_string(),
            ));
        }
        if self.alert_consecutive == 0 {
            return Err(TelemetryError::Config(
                "ALERT_CONSECUTIVE must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn qc_range(&self, field: &str) -> Option<QcRange> {
        self.qc_ranges.get(field).copied()
    }
}

/// `:memory:` (or an empty string) disables persistence
pub fn store_path_from_str(value: &str) -> Option<PathBuf> {
    match value.trim() {
        "" | ":memory:" => None,
        path => Some(PathBuf::from(path)),
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, TelemetryError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TelemetryError::Config(format!("{key}={raw:?}: {e}"))),
    }
}
