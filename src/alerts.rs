//! Alert rules
//!
//! Three rules run on every ingest:
//! - sustained predicted mold risk (MEDIUM)
//! - sustained water quality event index (HIGH)
//! - degraded sensor health (LOW)

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Settings;
use crate::types::{AlertRecord, Severity};

/// Inputs for one alert evaluation
#[derive(Debug, Clone)]
pub struct AlertContext<'a> {
    pub ts: DateTime<Utc>,
    pub air_node_id: &'a str,
    /// Mold predictions for the air node, newest first, including the new one
    pub recent_predictions: &'a [f64],
    /// Water event indices for the water node, newest first, including the new one
    pub recent_water_indices: &'a [f64],
    pub sensor_health_score: f64,
    /// Raised QC flag codes for the new reading
    pub qc_codes: &'a [String],
}

/// Thresholds for the alert rules
#[derive(Debug, Clone, PartialEq)]
pub struct AlertPolicy {
    pub mold_threshold: f64,
    pub water_threshold: f64,
    pub health_threshold: f64,
    pub consecutive: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl AlertPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mold_threshold: settings.alert_threshold,
            water_threshold: settings.water_alert_threshold,
            health_threshold: settings.health_alert_threshold,
            consecutive: settings.alert_consecutive,
        }
    }

    /// Evaluate every rule; alerts come back in descending severity.
    ///
    /// Returned records carry `id = 0`; the store assigns row ids on commit.
    pub fn evaluate(&self, ctx: &AlertContext<'_>) -> Vec<AlertRecord> {
        let mut alerts = Vec::new();

        if sustained_above(ctx.recent_water_indices, self.consecutive, self.water_threshold) {
            alerts.push(self.alert(
                ctx,
                Severity::High,
                "Water quality event index sustained above threshold",
                vec![
                    "WATER_EVENT_THRESHOLD".to_string(),
                    format!("CONSEC_{}", self.consecutive),
                ],
            ));
        }

        if sustained_above(ctx.recent_predictions, self.consecutive, self.mold_threshold) {
            alerts.push(self.alert(
                ctx,
                Severity::Medium,
                "Predicted mold risk sustained above threshold",
                vec![
                    "PRED_MOLD_THRESHOLD".to_string(),
                    format!("CONSEC_{}", self.consecutive),
                ],
            ));
        }

        if ctx.sensor_health_score < self.health_threshold {
            let mut reasons = vec!["SENSOR_HEALTH".to_string()];
            reasons.extend(ctx.qc_codes.iter().cloned());
            alerts.push(self.alert(ctx, Severity::Low, "Sensor health degraded", reasons));
        }

        alerts
    }

    fn alert(
        &self,
        ctx: &AlertContext<'_>,
        severity: Severity,
        message: &str,
        reason_codes: Vec<String>,
    ) -> AlertRecord {
        AlertRecord {
            id: 0,
            alert_id: Uuid::new_v4().to_string(),
            ts: ctx.ts,
            air_node_id: ctx.air_node_id.to_string(),
            severity,
            message: message.to_string(),
            reason_codes,
        }
    }
}

/// The newest `n` values exist and all exceed `threshold`
fn sustained_above(newest_first: &[f64], n: usize, threshold: f64) -> bool {
    n > 0 && newest_first.len() >= n && newest_first[..n].iter().all(|v| *v > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::t0;
    use pretty_assertions::assert_eq;

    fn ctx<'a>(preds: &'a [f64], water: &'a [f64], health: f64, codes: &'a [String]) -> AlertContext<'a> {
        AlertContext {
            ts: t0(),
            air_node_id: "AIR-001",
            recent_predictions: preds,
            recent_water_indices: water,
            sensor_health_score: health,
            qc_codes: codes,
        }
    }

    #[test]
    fn test_mold_alert_after_three_consecutive() {
        let policy = AlertPolicy::default();
        let alerts = policy.evaluate(&ctx(&[0.7, 0.65, 0.61], &[], 1.0, &[]));

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.message, "Predicted mold risk sustained above threshold");
        assert_eq!(
            alert.reason_codes,
            vec!["PRED_MOLD_THRESHOLD".to_string(), "CONSEC_3".to_string()]
        );
        assert!(Uuid::parse_str(&alert.alert_id).is_ok());
    }

    #[test]
    fn test_no_alert_with_short_or_broken_run() {
        let policy = AlertPolicy::default();
        assert!(policy.evaluate(&ctx(&[0.9, 0.9], &[], 1.0, &[])).is_empty());
        assert!(policy
            .evaluate(&ctx(&[0.9, 0.9, 0.5, 0.9], &[], 1.0, &[]))
            .is_empty());
        // threshold is exclusive
        assert!(policy.evaluate(&ctx(&[0.6, 0.6, 0.6], &[], 1.0, &[])).is_empty());
    }

    #[test]
    fn test_water_alert_is_high() {
        let policy = AlertPolicy::default();
        let alerts = policy.evaluate(&ctx(&[], &[0.8, 0.75, 0.71, 0.1], 1.0, &[]));

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].reason_codes[0], "WATER_EVENT_THRESHOLD");
    }

    #[test]
    fn test_health_alert_carries_qc_codes() {
        let policy = AlertPolicy::default();
        let codes = vec!["RANGE_AIR_RH_PCT".to_string()];
        let alerts = policy.evaluate(&ctx(&[], &[], 0.45, &codes));

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Low);
        assert_eq!(
            alerts[0].reason_codes,
            vec!["SENSOR_HEALTH".to_string(), "RANGE_AIR_RH_PCT".to_string()]
        );
    }

    #[test]
    fn test_alerts_ordered_by_severity() {
        let policy = AlertPolicy {
            consecutive: 1,
            ..AlertPolicy::default()
        };
        let alerts = policy.evaluate(&ctx(&[0.9], &[0.9], 0.1, &[]));
        let severities: Vec<Severity> = alerts.iter().map(|a| a.severity).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Medium, Severity::Low]);
        assert_eq!(alerts[0].reason_codes[1], "CONSEC_1");
    }
}
