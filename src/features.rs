//! Rolling-window feature helpers
//!
//! Used by the mold index and the offline dataset builder.

/// Mean of a window (0 when empty)
pub fn rolling_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Change across a window: last minus first (0 with fewer than two values)
pub fn rolling_slope(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if values.len() >= 2 => last - first,
        _ => 0.0,
    }
}

/// Humidity persistence over a window of RH readings
pub fn rh_persistence(rh_values: &[f64]) -> f64 {
    rolling_mean(rh_values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean() {
        assert_eq!(rolling_mean(&[]), 0.0);
        assert_eq!(rolling_mean(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn test_rolling_slope() {
        assert_eq!(rolling_slope(&[]), 0.0);
        assert_eq!(rolling_slope(&[5.0]), 0.0);
        assert_eq!(rolling_slope(&[70.0, 72.0, 75.5]), 5.5);
    }

    #[test]
    fn test_rh_persistence() {
        assert_eq!(rh_persistence(&[80.0, 90.0]), 85.0);
    }
}
