//! Psychrometric helpers

/// Clamp `value` into `[min_value, max_value]`
pub fn clamp(value: f64, min_value: f64, max_value: f64) -> f64 {
    min_value.max(max_value.min(value))
}

/// Clamp `value` into the unit interval
pub fn clamp01(value: f64) -> f64 {
    clamp(value, 0.0, 1.0)
}

/// Dew point in °C from air temperature and relative humidity (Magnus formula)
pub fn dew_point_c(air_temp_c: f64, air_rh_pct: f64) -> f64 {
    const A: f64 = 17.62;
    const B: f64 = 243.12;
    let rh = clamp(air_rh_pct, 1e-6, 100.0);
    let gamma = (A * air_temp_c) / (B + air_temp_c) + (rh / 100.0).ln();
    (B * gamma) / (A - gamma)
}
