//! Offline mold dataset and baseline evaluation
//!
//! Builds minute-resolution humidity episodes, derives the rolling features a
//! forecaster would see and scores the baseline forecaster against the index
//! observed `horizon` minutes later.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use crate::error::TelemetryError;
use crate::features::{rolling_mean, rolling_slope};
use crate::forecast::{
    forecast_mold_index, lead_time_minutes, mae, minutes_between, rmse, ForecastPoint,
    DEFAULT_PERSISTENCE,
};
use crate::indices::{mold_risk_index, AirSample};
use crate::physics::dew_point_c;
use crate::schema::Scenario;

/// Seed offset between consecutive scenarios of a dataset
const SCENARIO_SEED_STRIDE: u64 = 13;

/// 2026-02-27T12:00:00Z in seconds since the Unix epoch
const EPISODE_START_SECS: i64 = 1_772_193_600;

/// First timestamp of every episode
pub fn episode_start() -> DateTime<Utc> {
    DateTime::<Utc>::default() + Duration::seconds(EPISODE_START_SECS)
}

/// One minute of an episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRow {
    pub ts: DateTime<Utc>,
    pub air_temp_c: f64,
    pub air_rh_pct: f64,
    pub dew_point_c: f64,
}

/// Feature row of the training dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRow {
    pub ts: DateTime<Utc>,
    pub scenario: Scenario,
    pub air_temp_c: f64,
    pub air_rh_pct: f64,
    pub dew_point_c: f64,
    pub idx_mold_now: f64,
    pub rh_mean_w: f64,
    pub rh_slope_w: f64,
    pub temp_slope_w: f64,
    pub dew_point_slope_w: f64,
    pub target_idx_mold_h: f64,
}

/// Generate `hours` of one-minute readings for `scenario`.
///
/// Only humidity episodes are modelled; scenarios other than
/// `MOLD_EPISODE` produce normal indoor conditions. Sensor noise is
/// Gaussian.
pub fn build_episode(scenario: Scenario, hours: u32, seed: u64) -> Vec<EpisodeRow> {
    let steps = hours as usize * 60;
    let start = episode_start();
    let mut rng = StdRng::seed_from_u64(seed);

    (0..steps)
        .map(|i| {
            let (air_temp_c, air_rh_pct) = match scenario {
                Scenario::MoldEpisode => {
                    let rh = (70.0 + i as f64 * 0.3 + gaussian(&mut rng, 1.0)).min(95.0);
                    (23.0 + gaussian(&mut rng, 0.2), rh)
                }
                _ => (
                    22.0 + gaussian(&mut rng, 0.3),
                    45.0 + gaussian(&mut rng, 2.0),
                ),
            };
            EpisodeRow {
                ts: start + Duration::minutes(i as i64),
                air_temp_c,
                air_rh_pct,
                dew_point_c: dew_point_c(air_temp_c, air_rh_pct),
            }
        })
        .collect()
}

/// Zero-mean normal noise; 0 when `std_dev` is not a valid deviation
fn gaussian(rng: &mut StdRng, std_dev: f64) -> f64 {
    Normal::new(0.0, std_dev).map_or(0.0, |normal| normal.sample(rng))
}

/// Mold index of every row over a trailing window of `window` rows
fn trailing_mold_index(episode: &[EpisodeRow], window: usize) -> Vec<f64> {
    let samples: Vec<AirSample> = episode
        .iter()
        .map(|r| (r.air_temp_c, r.air_rh_pct))
        .collect();
    episode
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let from = (i + 1).saturating_sub(window);
            mold_risk_index(row.air_temp_c, row.air_rh_pct, &samples[from..=i])
        })
        .collect()
}

/// Turn an episode into dataset rows.
///
/// Rows without a full feature window or without a target `horizon` rows
/// ahead are dropped.
pub fn episode_rows(
    scenario: Scenario,
    episode: &[EpisodeRow],
    horizon: usize,
    window: usize,
) -> Vec<DatasetRow> {
    let window = window.max(1);
    let idx = trailing_mold_index(episode, window);

    (window..episode.len().saturating_sub(horizon))
        .map(|i| {
            let row = &episode[i];
            let rh: Vec<f64> = episode[i + 1 - window..=i].iter().map(|r| r.air_rh_pct).collect();
            let diff = |f: fn(&EpisodeRow) -> f64| rolling_slope(&[f(&episode[i - window]), f(row)]);
            DatasetRow {
                ts: row.ts,
                scenario,
                air_temp_c: row.air_temp_c,
                air_rh_pct: row.air_rh_pct,
                dew_point_c: row.dew_point_c,
                idx_mold_now: idx[i],
                rh_mean_w: rolling_mean(&rh),
                rh_slope_w: diff(|r| r.air_rh_pct),
                temp_slope_w: diff(|r| r.air_temp_c),
                dew_point_slope_w: diff(|r| r.dew_point_c),
                target_idx_mold_h: idx[i + horizon],
            }
        })
        .collect()
}

/// Dataset over several scenarios, each seeded `seed + 13 * position`
pub fn build_dataset(
    scenarios: &[Scenario],
    hours: u32,
    horizon: usize,
    window: usize,
    seed: u64,
) -> Vec<DatasetRow> {
    let mut rows = Vec::new();
    for (i, scenario) in scenarios.iter().enumerate() {
        let episode = build_episode(*scenario, hours, seed + i as u64 * SCENARIO_SEED_STRIDE);
        rows.extend(episode_rows(*scenario, &episode, horizon, window));
    }
    info!("built dataset with {} rows", rows.len());
    rows
}

/// Chronological train / validation / test split
pub fn time_split<T>(rows: &[T], train_frac: f64, val_frac: f64) -> (&[T], &[T], &[T]) {
    let n = rows.len();
    let train_end = ((n as f64 * train_frac) as usize).min(n);
    let val_end = ((n as f64 * (train_frac + val_frac)) as usize).clamp(train_end, n);
    (
        &rows[..train_end],
        &rows[train_end..val_end],
        &rows[val_end..],
    )
}

/// Write dataset rows as CSV
pub fn write_csv(rows: &[DatasetRow], path: &Path) -> Result<(), TelemetryError> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(
        out,
        "ts,scenario,air_temp_c,air_rh_pct,dew_point_c,idx_mold_now,rh_mean_w,rh_slope_w,temp_slope_w,dew_point_slope_w,target_idx_mold_h"
    )?;
    for r in rows {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{}",
            r.ts.to_rfc3339(),
            r.scenario,
            r.air_temp_c,
            r.air_rh_pct,
            r.dew_point_c,
            r.idx_mold_now,
            r.rh_mean_w,
            r.rh_slope_w,
            r.temp_slope_w,
            r.dew_point_slope_w,
            r.target_idx_mold_h
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Baseline forecast next to its target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRow {
    pub ts: DateTime<Utc>,
    pub scenario: Scenario,
    pub idx_mold_now: f64,
    pub target_idx_mold_h: f64,
    pub pred_idx_mold_h: f64,
}

/// Scores of the baseline forecaster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub mae: f64,
    pub rmse: f64,
    /// Early warning per scenario, `None` when either series never crossed
    pub lead_time_minutes: Vec<(Scenario, Option<i64>)>,
    pub rows: Vec<EvaluationRow>,
}

impl EvaluationReport {
    /// Write the per-row predictions as CSV
    pub fn write_predictions_csv(&self, path: &Path) -> Result<(), TelemetryError> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "ts,scenario,idx_mold_now,target_idx_mold_h,pred_idx_mold_h")?;
        for r in &self.rows {
            writeln!(
                out,
                "{},{},{},{},{}",
                r.ts.to_rfc3339(),
                r.scenario,
                r.idx_mold_now,
                r.target_idx_mold_h,
                r.pred_idx_mold_h
            )?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Replay the baseline forecaster over each scenario's rows in time order
pub fn evaluate_baseline(rows: &[DatasetRow], horizon: usize, threshold: f64) -> EvaluationReport {
    let mut scenarios: Vec<Scenario> = Vec::new();
    for row in rows {
        if !scenarios.contains(&row.scenario) {
            scenarios.push(row.scenario);
        }
    }

    let mut eval_rows = Vec::with_capacity(rows.len());
    let mut lead_times = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let mut series: Vec<&DatasetRow> = rows.iter().filter(|r| r.scenario == scenario).collect();
        series.sort_by_key(|r| r.ts);

        let mut points = Vec::with_capacity(series.len());
        let mut prev: Option<&DatasetRow> = None;
        for row in series {
            let (idx_prev, dt) = match prev {
                Some(p) => (p.idx_mold_now, minutes_between(p.ts, row.ts).max(1.0)),
                None => (row.idx_mold_now, 1.0),
            };
            let pred = forecast_mold_index(
                row.idx_mold_now,
                idx_prev,
                dt,
                horizon as f64,
                DEFAULT_PERSISTENCE,
            );
            points.push(ForecastPoint {
                ts: row.ts,
                idx_now: row.idx_mold_now,
                pred_idx_h: pred,
            });
            eval_rows.push(EvaluationRow {
                ts: row.ts,
                scenario,
                idx_mold_now: row.idx_mold_now,
                target_idx_mold_h: row.target_idx_mold_h,
                pred_idx_mold_h: pred,
            });
            prev = Some(row);
        }
        lead_times.push((scenario, lead_time_minutes(&points, threshold)));
    }

    let targets: Vec<f64> = eval_rows.iter().map(|r| r.target_idx_mold_h).collect();
    let preds: Vec<f64> = eval_rows.iter().map(|r| r.pred_idx_mold_h).collect();
    EvaluationReport {
        mae: mae(&targets, &preds),
        rmse: rmse(&targets, &preds),
        lead_time_minutes: lead_times,
        rows: eval_rows,
    }
}
