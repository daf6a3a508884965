//! Console monitor
//!
//! Polls the latest rows either from the store file on disk or from a running
//! service and prints them as a compact text block.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::TelemetryError;
use crate::store::TelemetryStore;
use crate::types::LatestSnapshot;

/// Where the monitor reads the latest rows from
pub trait MonitorSource {
    fn latest(&mut self) -> Result<LatestSnapshot, TelemetryError>;
}

/// Reads the store file written by the service
pub struct StoreSource {
    path: PathBuf,
}

impl StoreSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MonitorSource for StoreSource {
    fn latest(&mut self) -> Result<LatestSnapshot, TelemetryError> {
        if !self.path.exists() {
            return Ok(LatestSnapshot::default());
        }
        Ok(TelemetryStore::open(&self.path)?.latest())
    }
}

/// Calls `GET {base_url}/latest`
pub struct HttpSource {
    agent: ureq::Agent,
    url: String,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(5))
                .build(),
            url: format!("{}/latest", base_url.trim_end_matches('/')),
        }
    }
}

impl MonitorSource for HttpSource {
    fn latest(&mut self) -> Result<LatestSnapshot, TelemetryError> {
        Ok(self.agent.get(&self.url).call()?.into_json()?)
    }
}

/// Text block for the latest rows; absent rows are skipped
pub fn render_latest(latest: &LatestSnapshot) -> String {
    let mut out = String::from("=== Latest ===\n");
    if let Some(raw) = &latest.raw {
        let _ = writeln!(
            out,
            "ts={} RH={} temp={}",
            raw.payload.ts.to_rfc3339(),
            raw.payload.air_rh_pct,
            raw.payload.air_temp_c
        );
    }
    if let Some(feature) = &latest.feature {
        let _ = writeln!(
            out,
            "idx_mold_now={:.3} health={:.2}",
            feature.idx_mold_now, feature.sensor_health_score
        );
    }
    if let Some(prediction) = &latest.prediction {
        let _ = writeln!(
            out,
            "pred_idx_mold_h={:.3} horizon={}m",
            prediction.pred_idx_mold_h, prediction.horizon_min
        );
    }
    if let Some(alert) = &latest.alert {
        let _ = writeln!(out, "alert={} {}", alert.severity, alert.message);
    }
    out
}

/// Print the latest block every `interval`, `iterations` times or forever.
///
/// Source errors are logged and the next poll retries.
pub fn run_console<W: Write>(
    source: &mut dyn MonitorSource,
    out: &mut W,
    interval: Duration,
    iterations: Option<u64>,
) -> Result<(), TelemetryError> {
    let mut n = 0u64;
    while iterations.map_or(true, |max| n < max) {
        match source.latest() {
            Ok(latest) => {
                writeln!(out, "\n{}", render_latest(&latest))?;
                out.flush()?;
            }
            Err(e) => warn!("monitor poll failed: {e}"),
        }
        n += 1;
        if iterations.map_or(true, |max| n < max) {
            thread::sleep(interval);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::IngestProcessor;
    use crate::config::Settings;
    use crate::test_support::sample_payload;
    use pretty_assertions::assert_eq;

    struct FixedSource(LatestSnapshot);

    impl MonitorSource for FixedSource {
        fn latest(&mut self) -> Result<LatestSnapshot, TelemetryError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_latest(&LatestSnapshot::default()), "=== Latest ===\n");
    }

    #[test]
    fn test_render_filled() {
        let mut processor = IngestProcessor::in_memory();
        processor.ingest(sample_payload()).unwrap();
        let text = render_latest(&processor.store().latest());

        assert!(text.contains("ts=2026-02-27T12:00:00+00:00 RH=45 temp=22"));
        assert!(text.contains("idx_mold_now=0.000 health=1.00"));
        assert!(text.contains("horizon=60m"));
        assert!(!text.contains("alert="));
    }

    #[test]
    fn test_store_source_reads_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campus.cbor");
        let mut source = StoreSource::new(&path);
        assert_eq!(source.latest().unwrap(), LatestSnapshot::default());

        let settings = Settings {
            store_path: Some(path.clone()),
            ..Settings::default()
        };
        let mut processor = IngestProcessor::open(settings).unwrap();
        processor.ingest(sample_payload()).unwrap();

        let latest = source.latest().unwrap();
        assert_eq!(latest.raw.unwrap().payload.air_node_id, "AIR-001");
    }

    #[test]
    fn test_run_console_iterations() {
        let mut source = FixedSource(LatestSnapshot::default());
        let mut out = Vec::new();
        run_console(&mut source, &mut out, Duration::ZERO, Some(2)).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("=== Latest ===").count(), 2);
    }
}
