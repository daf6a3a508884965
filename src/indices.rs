//! Risk indices
//!
//! Both indices are bounded to `[0, 1]`:
//! - Mold risk: sustained humidity plus proximity of the air to its dew point
//! - Water event: turbidity spikes, chlorine depletion and conductivity shifts

use crate::features::rh_persistence;
use crate::physics::{clamp01, dew_point_c};

/// Air history sample: `(air_temp_c, air_rh_pct)`
pub type AirSample = (f64, f64);

/// Water history sample: `(turbidity_ntu, free_chlorine_mgL, conductivity_uScm)`
pub type WaterSample = (f64, f64, f64);

/// Current mold risk for an air node.
///
/// `history` is the recent window of readings for the node. An empty history
/// falls back to the current reading.
pub fn mold_risk_index(air_temp_c: f64, air_rh_pct: f64, history: &[AirSample]) -> f64 {
    let rh_mean = if history.is_empty() {
        air_rh_pct
    } else {
        let rh: Vec<f64> = history.iter().map(|(_, rh)| *rh).collect();
        rh_persistence(&rh)
    };

    let rh_persist = clamp01((rh_mean - 60.0) / 40.0);

    let gap = air_temp_c - dew_point_c(air_temp_c, air_rh_pct);
    let proximity = clamp01((2.0 - gap) / 2.0);

    // Drying out after a humid spell
    let recovery = if air_rh_pct < 70.0 && rh_mean > 75.0 {
        clamp01((75.0 - air_rh_pct) / 20.0)
    } else {
        0.0
    };

    clamp01(0.55 * rh_persist + 0.35 * proximity - 0.2 * recovery)
}

/// Current water quality event index for a water node
pub fn water_event_index(
    turbidity_ntu: f64,
    free_chlorine_mg_l: f64,
    conductivity_us_cm: f64,
    history: &[WaterSample],
) -> f64 {
    let (turb_mean, cond_mean) = if history.is_empty() {
        (turbidity_ntu, conductivity_us_cm)
    } else {
        let n = history.len() as f64;
        (
            history.iter().map(|(t, _, _)| t).sum::<f64>() / n,
            history.iter().map(|(_, _, c)| c).sum::<f64>() / n,
        )
    };

    let turb_anomaly = (turbidity_ntu - turb_mean).max(0.0);
    let turb_score = clamp01(turb_anomaly / (turb_mean + 5.0).max(1.0));

    let chlorine_score = clamp01(1.0 - free_chlorine_mg_l);

    let cond_shift = (conductivity_us_cm - cond_mean).abs();
    let cond_score = clamp01(cond_shift / (cond_mean * 0.3).max(50.0));

    clamp01(0.5 * turb_score + 0.3 * chlorine_score + 0.2 * cond_score)
}
