//! Quality control
//!
//! Flags every required measurement as missing, out of range or flatlined and
//! condenses the flags into a sensor health score:
//! - missing (non-finite): -0.1
//! - outside the QC range: -0.1
//! - flatline over the window: -0.05

use std::collections::BTreeMap;

use crate::config::{QcRange, Settings};
use crate::physics::clamp01;
use crate::schema::{TelemetryPayload, REQUIRED_MEASUREMENTS};
use crate::types::QcFlags;

const MISSING_PENALTY: f64 = 0.1;
const RANGE_PENALTY: f64 = 0.1;
const FLATLINE_PENALTY: f64 = 0.05;

/// Minimum spread a healthy sensor shows across the flatline window
const FLATLINE_EPSILON: f64 = 0.01;

/// Outcome of quality control for one payload
#[derive(Debug, Clone, PartialEq)]
pub struct QcReport {
    pub flags: QcFlags,
    pub health_score: f64,
}

/// Quality checker configured with QC ranges and a flatline window
#[derive(Debug, Clone)]
pub struct QualityChecker {
    ranges: BTreeMap<&'static str, QcRange>,
    flatline_window: usize,
}

impl QualityChecker {
    pub fn new(ranges: BTreeMap<&'static str, QcRange>, flatline_window: usize) -> Self {
        Self {
            ranges,
            flatline_window,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.qc_ranges.clone(), settings.flatline_window)
    }

    /// Check `payload` against its ranges and against `prior` readings of the
    /// same air node (oldest first, excluding `payload` itself).
    pub fn check(&self, payload: &TelemetryPayload, prior: &[TelemetryPayload]) -> QcReport {
        let mut flags = QcFlags::default();
        let mut score = 1.0;

        for field in REQUIRED_MEASUREMENTS {
            let value = payload.measurement(field).filter(|v| v.is_finite());
            flags.missing.insert(field.to_string(), value.is_none());

            let Some(value) = value else {
                score -= MISSING_PENALTY;
                continue;
            };

            if let Some(range) = self.ranges.get(field) {
                let out_of_range = !range.contains(value);
                flags.range.insert(field.to_string(), out_of_range);
                if out_of_range {
                    score -= RANGE_PENALTY;
                }
            }
        }

        let window = self.flatline_window;
        let full_window = window > 2 && prior.len() >= window - 1;
        for field in REQUIRED_MEASUREMENTS {
            let is_flat = full_window && {
                let recent = &prior[prior.len() - (window - 1)..];
                is_flatline(
                    recent
                        .iter()
                        .chain(std::iter::once(payload))
                        .filter_map(|r| r.measurement(field)),
                )
            };
            flags.flatline.insert(field.to_string(), is_flat);
            if is_flat {
                score -= FLATLINE_PENALTY;
            }
        }

        QcReport {
            flags,
            health_score: clamp01(score),
        }
    }
}

impl Default for QualityChecker {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

fn is_flatline(values: impl Iterator<Item = f64>) -> bool {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    max >= min && max - min < FLATLINE_EPSILON
}
