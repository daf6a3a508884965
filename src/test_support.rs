//! Shared fixtures for unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::schema::{DataSource, Scenario, TelemetryPayload};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap()
}

pub(crate) fn sample_payload() -> TelemetryPayload {
    TelemetryPayload {
        ts: t0(),
        building_id: "RUTGERS-ENG-1".to_string(),
        air_node_id: "AIR-001".to_string(),
        water_node_id: "WATER-001".to_string(),
        air_temp_c: 22.0,
        air_rh_pct: 45.0,
        water_temp_c: 18.5,
        water_turbidity_ntu: 0.8,
        water_free_chlorine_mg_l: 1.2,
        water_ph: 7.4,
        water_conductivity_us_cm: 350.0,
        water_pressure_kpa: 280.0,
        scenario: Scenario::Normal,
        data_source: DataSource::Emulated,
        air_co2_ppm: Some(620.0),
        air_pm25_ugm3: Some(8.0),
        air_tvoc: None,
        air_surface_temp_c: None,
        air_material_moisture: None,
    }
}

/// Sample payload `minutes` after `t0` with the given air reading
pub(crate) fn payload_at(minutes: i64, temp_c: f64, rh_pct: f64) -> TelemetryPayload {
    TelemetryPayload {
        ts: t0() + Duration::minutes(minutes),
        air_temp_c: temp_c,
        air_rh_pct: rh_pct,
        ..sample_payload()
    }
}
