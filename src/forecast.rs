//! Baseline mold forecaster and evaluation metrics

use chrono::{DateTime, Utc};

use crate::physics::clamp01;

/// Default weight of the current index in the persistence term
pub const DEFAULT_PERSISTENCE: f64 = 0.8;

/// Forecast the mold index `horizon_minutes` ahead from the last two indices.
///
/// Extrapolates half of the current slope over the horizon and adds a small
/// persistence term.
pub fn forecast_mold_index(
    idx_now: f64,
    idx_prev: f64,
    dt_minutes: f64,
    horizon_minutes: f64,
    persistence: f64,
) -> f64 {
    let dt_minutes = if dt_minutes <= 0.0 { 1.0 } else { dt_minutes };
    let slope = (idx_now - idx_prev) / dt_minutes;
    let pred = idx_now
        + slope * horizon_minutes * 0.5
        + (idx_now * persistence - idx_prev * (1.0 - persistence)) * 0.1;
    clamp01(pred)
}

/// Elapsed minutes from `from` to `to`, with sub-minute precision
pub fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Mean absolute error (0 for empty input)
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(a, b)| (a - b).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

/// Root mean squared error (0 for empty input)
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mse = y_true
        .iter()
        .zip(y_pred)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / y_true.len() as f64;
    mse.sqrt()
}

/// One step of a forecast timeline
#[derive(Debug, Clone, Copy)]
pub struct ForecastPoint {
    /// When the forecast was issued
    pub ts: DateTime<Utc>,
    /// Index observed at `ts`
    pub idx_now: f64,
    /// Forecast issued at `ts` for `ts + horizon`
    pub pred_idx_h: f64,
}

/// Minutes of early warning a forecast gives before the index crosses `threshold`.
///
/// Positive when the first forecast above the threshold was issued before the
/// observed index first exceeded it. `None` if either never crosses.
pub fn lead_time_minutes(series: &[ForecastPoint], threshold: f64) -> Option<i64> {
    let predicted = series.iter().find(|p| p.pred_idx_h > threshold)?;
    let actual = series.iter().find(|p| p.idx_now > threshold)?;
    Some((actual.ts - predicted.ts).num_minutes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::t0;
    use chrono::Duration;

    #[test]
    fn test_forecast_flat_index() {
        // No slope: 0.5 + (0.4 - 0.1) * 0.1
        let pred = forecast_mold_index(0.5, 0.5, 1.0, 60.0, DEFAULT_PERSISTENCE);
        assert!((pred - 0.53).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_rising_index_clamped() {
        let pred = forecast_mold_index(0.5, 0.4, 1.0, 60.0, DEFAULT_PERSISTENCE);
        assert_eq!(pred, 1.0);
    }

    #[test]
    fn test_forecast_falling_index_clamped() {
        let pred = forecast_mold_index(0.2, 0.4, 1.0, 60.0, DEFAULT_PERSISTENCE);
        assert_eq!(pred, 0.0);
    }

    #[test]
    fn test_forecast_non_positive_dt() {
        let a = forecast_mold_index(0.30, 0.29, 0.0, 10.0, DEFAULT_PERSISTENCE);
        let b = forecast_mold_index(0.30, 0.29, 1.0, 10.0, DEFAULT_PERSISTENCE);
        assert_eq!(a, b);
    }

    #[test]
    fn test_minutes_between_keeps_seconds() {
        assert_eq!(minutes_between(t0(), t0() + Duration::seconds(90)), 1.5);
        assert_eq!(minutes_between(t0(), t0() + Duration::minutes(5)), 5.0);
        assert_eq!(minutes_between(t0() + Duration::seconds(30), t0()), -0.5);
    }

    #[test]
    fn test_metrics() {
        assert_eq!(mae(&[], &[]), 0.0);
        assert_eq!(rmse(&[], &[]), 0.0);

        let y = [1.0, 2.0, 3.0];
        let p = [1.0, 3.0, 1.0];
        assert!((mae(&y, &p) - 1.0).abs() < 1e-12);
        assert!((rmse(&y, &p) - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_lead_time() {
        let series: Vec<ForecastPoint> = (0..10)
            .map(|i| ForecastPoint {
                ts: t0() + Duration::minutes(i),
                idx_now: i as f64 * 0.1,
                pred_idx_h: i as f64 * 0.1 + 0.3,
            })
            .collect();

        // Forecast crosses 0.65 at minute 4, actual at minute 7
        assert_eq!(lead_time_minutes(&series, 0.65), Some(3));
        assert_eq!(lead_time_minutes(&series, 5.0), None);
    }
}
