//! Pipeline orchestration
//!
//! This module provides the ingest path of the service. Each payload goes
//! through validation, quality control, risk indices, the baseline forecast
//! and the alert rules before every derived row is committed to the store.

use chrono::Duration;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{AlertContext, AlertPolicy};
use crate::config::Settings;
use crate::error::TelemetryError;
use crate::forecast::{forecast_mold_index, minutes_between, DEFAULT_PERSISTENCE};
use crate::indices::{mold_risk_index, water_event_index, AirSample, WaterSample};
use crate::quality::QualityChecker;
use crate::schema::{PayloadCodec, TelemetryPayload};
use crate::store::{IngestBatch, TelemetryStore};
use crate::types::{FeatureRecord, PredictionRecord, TelemetryResponse};

/// Window for QC and the mold index
const AIR_WINDOW_MINUTES: i64 = 60;

/// Window for the water event index
const WATER_WINDOW_MINUTES: i64 = 120;

/// Stateful ingest processor owning the telemetry store.
///
/// One processor serves one store; feed it payloads in arrival order.
pub struct IngestProcessor {
    settings: Settings,
    store: TelemetryStore,
    checker: QualityChecker,
    policy: AlertPolicy,
    instance_id: Uuid,
}

impl IngestProcessor {
    /// Create a processor over `store`
    pub fn new(settings: Settings, store: TelemetryStore) -> Self {
        let instance_id = Uuid::new_v4();
        info!(
            "ingest processor {} (horizon {} min, alert threshold {}, consecutive {})",
            instance_id,
            settings.forecast_horizon_minutes,
            settings.alert_threshold,
            settings.alert_consecutive
        );
        Self {
            checker: QualityChecker::from_settings(&settings),
            policy: AlertPolicy::from_settings(&settings),
            settings,
            store,
            instance_id,
        }
    }

    /// Open the store named by the settings and build a processor over it
    pub fn open(settings: Settings) -> Result<Self, TelemetryError> {
        settings.check()?;
        let store = TelemetryStore::open_optional(settings.store_path.as_deref())?;
        Ok(Self::new(settings, store))
    }

    /// In-memory processor with default settings
    pub fn in_memory() -> Self {
        Self::new(
            Settings {
                store_path: None,
                ..Settings::default()
            },
            TelemetryStore::in_memory(),
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Decode `body` with `codec` and ingest it
    pub fn ingest_bytes(
        &mut self,
        body: &[u8],
        codec: PayloadCodec,
    ) -> Result<TelemetryResponse, TelemetryError> {
        let payload = codec.decode(body)?;
        self.ingest(payload)
    }

    /// Ingest one payload.
    ///
    /// Pipeline stages:
    /// 1. Validate the payload
    /// 2. Quality control against the node's prior readings
    /// 3. Mold and water indices over their trailing windows
    /// 4. Baseline forecast from the node's previous index
    /// 5. Alert rules
    /// 6. Commit raw row, features, prediction and alerts together
    pub fn ingest(&mut self, payload: TelemetryPayload) -> Result<TelemetryResponse, TelemetryError> {
        if let Err(e) = payload.validate() {
            warn!("rejected payload from {}: {}", payload.air_node_id, e);
            return Err(e.into());
        }

        let ts = payload.ts;
        let air_node = payload.air_node_id.clone();
        let water_node = payload.water_node_id.clone();

        // Prior readings of the node, within the longest window before `ts`
        let water_start = ts - Duration::minutes(WATER_WINDOW_MINUTES);
        let air_start = ts - Duration::minutes(AIR_WINDOW_MINUTES);
        let prior: Vec<TelemetryPayload> = self
            .store
            .history(&air_node, WATER_WINDOW_MINUTES)
            .into_iter()
            .filter(|p| p.ts < ts && p.ts >= water_start)
            .collect();
        let prior_air: Vec<TelemetryPayload> =
            prior.iter().filter(|p| p.ts >= air_start).cloned().collect();

        let qc = self.checker.check(&payload, &prior_air);
        if qc.flags.any_raised() {
            debug!(
                "{} QC flags {:?} health {:.2}",
                air_node,
                qc.flags.codes(),
                qc.health_score
            );
        }

        let idx_mold_now = current_mold_index(&payload, &prior_air);
        let idx_water_event_now = current_water_index(&payload, &prior);

        let horizon = self.settings.forecast_horizon_minutes;
        let pred_idx_mold_h = match self.store.latest_feature(&air_node) {
            Some(prev) => {
                let dt = minutes_between(prev.ts, ts).max(1.0);
                forecast_mold_index(
                    idx_mold_now,
                    prev.idx_mold_now,
                    dt,
                    horizon as f64,
                    DEFAULT_PERSISTENCE,
                )
            }
            None => idx_mold_now,
        };

        let feature = FeatureRecord {
            id: 0,
            ts,
            air_node_id: air_node.clone(),
            water_node_id: water_node.clone(),
            qc_flags: qc.flags.clone(),
            sensor_health_score: qc.health_score,
            idx_mold_now,
            idx_water_event_now,
        };
        let prediction = PredictionRecord {
            id: 0,
            ts,
            ts_target: ts + Duration::minutes(horizon),
            air_node_id: air_node.clone(),
            horizon_min: horizon,
            pred_idx_mold_h,
        };

        let n = self.policy.consecutive;
        let recent_predictions: Vec<f64> = std::iter::once(pred_idx_mold_h)
            .chain(
                self.store
                    .recent_predictions(&air_node, n)
                    .iter()
                    .map(|p| p.pred_idx_mold_h),
            )
            .take(n)
            .collect();
        let recent_water: Vec<f64> = std::iter::once(idx_water_event_now)
            .chain(
                self.store
                    .recent_features_for_water(&water_node, n)
                    .iter()
                    .map(|f| f.idx_water_event_now),
            )
            .take(n)
            .collect();
        let qc_codes = qc.flags.codes();

        let alerts = self.policy.evaluate(&AlertContext {
            ts,
            air_node_id: &air_node,
            recent_predictions: &recent_predictions,
            recent_water_indices: &recent_water,
            sensor_health_score: qc.health_score,
            qc_codes: &qc_codes,
        });

        let stored_alerts = self.store.commit(IngestBatch {
            raw: payload,
            feature,
            prediction,
            alerts,
        })?;

        for alert in &stored_alerts {
            info!(
                "{} alert for {}: {} {:?}",
                alert.severity, alert.air_node_id, alert.message, alert.reason_codes
            );
        }
        debug!(
            "{} ingested at {}: mold {:.3} -> {:.3}, water {:.3}",
            air_node, ts, idx_mold_now, pred_idx_mold_h, idx_water_event_now
        );

        Ok(TelemetryResponse {
            status: "ok".to_string(),
            idx_mold_now,
            pred_idx_mold_h,
            idx_water_event_now,
            sensor_health_score: qc.health_score,
            alerts: stored_alerts.iter().map(|a| a.severity).collect(),
        })
    }

    /// Ingest payloads in order, returning one result per payload
    pub fn ingest_all(
        &mut self,
        payloads: Vec<TelemetryPayload>,
    ) -> Vec<Result<TelemetryResponse, TelemetryError>> {
        payloads.into_iter().map(|p| self.ingest(p)).collect()
    }
}

/// Mold index over the prior air window plus the current reading.
///
/// Non-finite readings are left out of the window; a non-finite current
/// reading yields 0 since quality control already reports it.
fn current_mold_index(payload: &TelemetryPayload, prior_air: &[TelemetryPayload]) -> f64 {
    if !(payload.air_temp_c.is_finite() && payload.air_rh_pct.is_finite()) {
        return 0.0;
    }
    let history: Vec<AirSample> = prior_air
        .iter()
        .chain(std::iter::once(payload))
        .map(|p| (p.air_temp_c, p.air_rh_pct))
        .filter(|(t, rh)| t.is_finite() && rh.is_finite())
        .collect();
    mold_risk_index(payload.air_temp_c, payload.air_rh_pct, &history)
}

/// Water event index over the prior water window plus the current reading
fn current_water_index(payload: &TelemetryPayload, prior: &[TelemetryPayload]) -> f64 {
    let sample = |p: &TelemetryPayload| -> WaterSample {
        (
            p.water_turbidity_ntu,
            p.water_free_chlorine_mg_l,
            p.water_conductivity_us_cm,
        )
    };
    let finite = |(t, c, k): &WaterSample| t.is_finite() && c.is_finite() && k.is_finite();

    let current = sample(payload);
    if !finite(&current) {
        return 0.0;
    }
    let history: Vec<WaterSample> = prior
        .iter()
        .chain(std::iter::once(payload))
        .map(sample)
        .filter(finite)
        .collect();
    water_event_index(current.0, current.1, current.2, &history)
}
