//! Telemetry store
//!
//! Holds raw rows, features, predictions and alerts. Queries mirror what the
//! pipeline and the read API need.
//!
//! The store file is a CBOR sequence: one snapshot of every table followed by
//! one appended entry per committed ingest. A commit writes its entry before
//! touching memory, so a failed write leaves the store as it was. Opening a
//! file with many appended entries rewrites it as a single snapshot.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::TelemetryError;
use crate::schema::TelemetryPayload;
use crate::types::{
    AlertRecord, FeatureRecord, LatestSnapshot, PredictionRecord, RawRecord, SeriesPoint,
};

/// Snapshot format version
const SNAPSHOT_VERSION: u32 = 2;

/// Appended entries after which `open` compacts the file
const COMPACT_AFTER: usize = 1000;

/// Rows produced by one ingest, written together
#[derive(Debug, Clone)]
pub struct IngestBatch {
    pub raw: TelemetryPayload,
    pub feature: FeatureRecord,
    pub prediction: PredictionRecord,
    pub alerts: Vec<AlertRecord>,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub raw: usize,
    pub features: usize,
    pub predictions: usize,
    pub alerts: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    version: u32,
    next_id: u64,
    raw: Vec<RawRecord>,
    features: Vec<FeatureRecord>,
    predictions: Vec<PredictionRecord>,
    alerts: Vec<AlertRecord>,
}

/// One ingest's rows with their ids assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommittedBatch {
    raw: RawRecord,
    feature: FeatureRecord,
    prediction: PredictionRecord,
    alerts: Vec<AlertRecord>,
}

#[derive(Debug, Deserialize)]
enum LogEntry {
    Snapshot(Tables),
    Batch(CommittedBatch),
}

/// Write side of [`LogEntry`]; same encoding
#[derive(Debug, Serialize)]
enum LogEntryRef<'a> {
    Snapshot(&'a Tables),
    Batch(&'a CommittedBatch),
}

/// Row positions by node and by `(node, ts)`
#[derive(Debug, Clone, Default)]
struct Indexes {
    raw_by_air: HashMap<String, Vec<usize>>,
    features_by_air: HashMap<String, Vec<usize>>,
    features_by_water: HashMap<String, Vec<usize>>,
    predictions_by_air: HashMap<String, Vec<usize>>,
    // last inserted wins on a repeated timestamp
    feature_at: HashMap<(String, DateTime<Utc>), usize>,
    prediction_at: HashMap<(String, DateTime<Utc>), usize>,
}

impl Indexes {
    fn build(tables: &Tables) -> Self {
        let mut index = Self::default();
        for (i, raw) in tables.raw.iter().enumerate() {
            index.add_raw(i, raw);
        }
        for (i, feature) in tables.features.iter().enumerate() {
            index.add_feature(i, feature);
        }
        for (i, prediction) in tables.predictions.iter().enumerate() {
            index.add_prediction(i, prediction);
        }
        index
    }

    fn add_raw(&mut self, i: usize, raw: &RawRecord) {
        push_position(&mut self.raw_by_air, &raw.payload.air_node_id, i);
    }

    fn add_feature(&mut self, i: usize, feature: &FeatureRecord) {
        push_position(&mut self.features_by_air, &feature.air_node_id, i);
        push_position(&mut self.features_by_water, &feature.water_node_id, i);
        self.feature_at
            .insert((feature.air_node_id.clone(), feature.ts), i);
    }

    fn add_prediction(&mut self, i: usize, prediction: &PredictionRecord) {
        push_position(&mut self.predictions_by_air, &prediction.air_node_id, i);
        self.prediction_at
            .insert((prediction.air_node_id.clone(), prediction.ts), i);
    }
}

fn push_position(index: &mut HashMap<String, Vec<usize>>, node: &str, i: usize) {
    match index.get_mut(node) {
        Some(positions) => positions.push(i),
        None => {
            index.insert(node.to_string(), vec![i]);
        }
    }
}

/// Positions listed under `node`, empty for an unknown node
fn positions<'a>(index: &'a HashMap<String, Vec<usize>>, node: &str) -> &'a [usize] {
    index.get(node).map(Vec::as_slice).unwrap_or(&[])
}

/// In-memory tables with optional file persistence
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    tables: Tables,
    index: Indexes,
    path: Option<PathBuf>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl TelemetryStore {
    /// Create an empty store that is never persisted
    pub fn in_memory() -> Self {
        Self {
            tables: Tables {
                version: SNAPSHOT_VERSION,
                next_id: 1,
                ..Default::default()
            },
            index: Indexes::default(),
            path: None,
        }
    }

    /// Open the store file at `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TelemetryError> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self::in_memory();
        if !path.exists() {
            info!("creating new store at {}", path.display());
            store.path = Some(path);
            return Ok(store);
        }

        let bytes = fs::read(&path)?;
        let appended = store.replay(&bytes, &path)?;
        info!(
            "loaded store {} ({} raw rows, {} appended entries)",
            path.display(),
            store.tables.raw.len(),
            appended
        );
        store.path = Some(path);
        if appended >= COMPACT_AFTER {
            store.flush()?;
        }
        Ok(store)
    }

    /// Open `path`, or an in-memory store when `None`
    pub fn open_optional(path: Option<&Path>) -> Result<Self, TelemetryError> {
        match path {
            Some(path) => Self::open(path),
            None => Ok(Self::in_memory()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load a snapshot and its appended entries, returning the entry count
    fn replay(&mut self, bytes: &[u8], path: &Path) -> Result<usize, TelemetryError> {
        let mut entries = serde_cbor::Deserializer::from_slice(bytes).into_iter::<LogEntry>();
        match entries.next() {
            Some(Ok(LogEntry::Snapshot(tables))) => {
                if tables.version != SNAPSHOT_VERSION {
                    return Err(TelemetryError::StoreError(format!(
                        "unsupported snapshot version {} in {}",
                        tables.version,
                        path.display()
                    )));
                }
                self.index = Indexes::build(&tables);
                self.tables = tables;
            }
            Some(Err(e)) => return Err(e.into()),
            _ => {
                return Err(TelemetryError::StoreError(format!(
                    "{} does not start with a snapshot",
                    path.display()
                )))
            }
        }

        let mut appended = 0;
        for entry in entries {
            match entry {
                Ok(LogEntry::Batch(batch)) => {
                    self.apply(batch);
                    appended += 1;
                }
                Ok(LogEntry::Snapshot(_)) => {
                    return Err(TelemetryError::StoreError(format!(
                        "second snapshot after {appended} entries in {}",
                        path.display()
                    )))
                }
                // an interrupted append leaves a truncated last entry
                Err(e) if e.is_eof() => {
                    warn!("ignoring truncated entry at the end of {}", path.display());
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(appended)
    }

    /// Assign ids to one ingest's rows, persist them, then add them to the
    /// tables.
    ///
    /// Returns the stored alerts with their assigned ids. On error nothing
    /// is added.
    pub fn commit(&mut self, batch: IngestBatch) -> Result<Vec<AlertRecord>, TelemetryError> {
        let mut next_id = self.tables.next_id;
        let mut take_id = || {
            let id = next_id;
            next_id += 1;
            id
        };

        let raw = RawRecord {
            id: take_id(),
            payload: batch.raw,
        };
        let feature = FeatureRecord {
            id: take_id(),
            ..batch.feature
        };
        let prediction = PredictionRecord {
            id: take_id(),
            ..batch.prediction
        };
        let alerts: Vec<AlertRecord> = batch
            .alerts
            .into_iter()
            .map(|alert| AlertRecord {
                id: take_id(),
                ..alert
            })
            .collect();
        let committed = CommittedBatch {
            raw,
            feature,
            prediction,
            alerts,
        };

        self.append(&committed)?;
        let raw_id = committed.raw.id;
        let stored_alerts = committed.alerts.clone();
        self.apply(committed);
        debug!("committed raw row {raw_id}");
        Ok(stored_alerts)
    }

    fn apply(&mut self, batch: CommittedBatch) {
        let CommittedBatch {
            raw,
            feature,
            prediction,
            alerts,
        } = batch;
        let last_id = alerts.last().map_or(prediction.id, |a| a.id);
        self.tables.next_id = self.tables.next_id.max(last_id + 1);

        self.index.add_raw(self.tables.raw.len(), &raw);
        self.tables.raw.push(raw);
        self.index.add_feature(self.tables.features.len(), &feature);
        self.tables.features.push(feature);
        self.index
            .add_prediction(self.tables.predictions.len(), &prediction);
        self.tables.predictions.push(prediction);
        self.tables.alerts.extend(alerts);
    }

    /// Append one entry, writing a snapshot first for a new file
    fn append(&self, batch: &CommittedBatch) -> Result<(), TelemetryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            self.flush()?;
        }

        let bytes = serde_cbor::to_vec(&LogEntryRef::Batch(batch))?;
        let mut file = OpenOptions::new().append(true).open(path)?;
        let len = file.metadata()?.len();
        if let Err(e) = file.write_all(&bytes) {
            if let Err(truncate) = file.set_len(len) {
                warn!(
                    "could not drop partial entry from {}: {truncate}",
                    path.display()
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Rewrite the store file as one snapshot, through a temp file and rename
    pub fn flush(&self) -> Result<(), TelemetryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_cbor::to_vec(&LogEntryRef::Snapshot(&self.tables))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        debug!("wrote snapshot {}", path.display());
        Ok(())
    }

    /// Readings of an air node within `minutes` of its latest reading, oldest first
    pub fn history(&self, air_node_id: &str, minutes: i64) -> Vec<TelemetryPayload> {
        let Some(latest) = self.raw_for_node(air_node_id).map(|p| p.ts).max() else {
            return Vec::new();
        };
        let start = latest - Duration::minutes(minutes);
        let mut rows: Vec<TelemetryPayload> = self
            .raw_for_node(air_node_id)
            .filter(|p| p.ts >= start)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.ts);
        rows
    }

    fn raw_for_node<'a>(
        &'a self,
        air_node_id: &str,
    ) -> impl Iterator<Item = &'a TelemetryPayload> + 'a {
        positions(&self.index.raw_by_air, air_node_id)
            .iter()
            .map(move |&i| &self.tables.raw[i].payload)
    }

    /// Most recent feature row of an air node
    pub fn latest_feature(&self, air_node_id: &str) -> Option<&FeatureRecord> {
        latest_by_ts(
            positions(&self.index.features_by_air, air_node_id)
                .iter()
                .map(|&i| &self.tables.features[i]),
            |f| f.ts,
        )
    }

    /// Up to `n` most recent predictions of an air node, newest first
    pub fn recent_predictions(&self, air_node_id: &str, n: usize) -> Vec<&PredictionRecord> {
        newest_first(
            positions(&self.index.predictions_by_air, air_node_id)
                .iter()
                .map(|&i| &self.tables.predictions[i]),
            |p| p.ts,
            n,
        )
    }

    /// Up to `n` most recent feature rows of a water node, newest first
    pub fn recent_features_for_water(&self, water_node_id: &str, n: usize) -> Vec<&FeatureRecord> {
        newest_first(
            positions(&self.index.features_by_water, water_node_id)
                .iter()
                .map(|&i| &self.tables.features[i]),
            |f| f.ts,
            n,
        )
    }

    /// Latest row of every table
    pub fn latest(&self) -> LatestSnapshot {
        LatestSnapshot {
            raw: latest_by_ts(self.tables.raw.iter(), |r| r.payload.ts).cloned(),
            feature: latest_by_ts(self.tables.features.iter(), |f| f.ts).cloned(),
            prediction: latest_by_ts(self.tables.predictions.iter(), |p| p.ts).cloned(),
            alert: latest_by_ts(self.tables.alerts.iter(), |a| a.ts).cloned(),
        }
    }

    /// Humidity and mold-risk timeline joined on timestamp, oldest first,
    /// limited to the `limit` most recent raw rows
    pub fn series(&self, limit: usize) -> Vec<SeriesPoint> {
        let mut raw: Vec<&RawRecord> = self.tables.raw.iter().collect();
        raw.sort_by_key(|r| r.payload.ts);
        let skip = raw.len().saturating_sub(limit);

        raw.into_iter()
            .skip(skip)
            .map(|r| {
                let key = (r.payload.air_node_id.clone(), r.payload.ts);
                SeriesPoint {
                    ts: r.payload.ts,
                    air_rh_pct: r.payload.air_rh_pct,
                    idx_mold_now: self
                        .index
                        .feature_at
                        .get(&key)
                        .map(|&i| self.tables.features[i].idx_mold_now),
                    pred_idx_mold_h: self
                        .index
                        .prediction_at
                        .get(&key)
                        .map(|&i| self.tables.predictions[i].pred_idx_mold_h),
                }
            })
            .collect()
    }

    /// Up to `limit` alerts, newest first
    pub fn alerts(&self, limit: usize) -> Vec<AlertRecord> {
        newest_first(self.tables.alerts.iter(), |a| a.ts, limit)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            raw: self.tables.raw.len(),
            features: self.tables.features.len(),
            predictions: self.tables.predictions.len(),
            alerts: self.tables.alerts.len(),
        }
    }
}

/// Latest item by timestamp; among equal timestamps the last inserted wins
fn latest_by_ts<'a, T, I, F>(items: I, ts: F) -> Option<&'a T>
where
    I: Iterator<Item = &'a T>,
    F: Fn(&T) -> DateTime<Utc>,
{
    items.max_by_key(|item| ts(item))
}

fn newest_first<'a, T, I, F>(items: I, ts: F, n: usize) -> Vec<&'a T>
where
    I: Iterator<Item = &'a T>,
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut rows: Vec<&T> = items.collect();
    // stable sort keeps insertion order for ties; reverse puts newest first
    rows.sort_by_key(|item| ts(item));
    rows.reverse();
    rows.truncate(n);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{payload_at, t0};
    use crate::types::{QcFlags, Severity};
    use pretty_assertions::assert_eq;

    fn batch(minutes: i64, rh: f64, pred: f64) -> IngestBatch {
        let raw = payload_at(minutes, 22.0, rh);
        let ts = raw.ts;
        IngestBatch {
            feature: FeatureRecord {
                id: 0,
                ts,
                air_node_id: raw.air_node_id.clone(),
                water_node_id: raw.water_node_id.clone(),
                qc_flags: QcFlags::default(),
                sensor_health_score: 1.0,
                idx_mold_now: rh / 100.0,
                idx_water_event_now: 0.0,
            },
            prediction: PredictionRecord {
                id: 0,
                ts,
                ts_target: ts + Duration::minutes(60),
                air_node_id: raw.air_node_id.clone(),
                horizon_min: 60,
                pred_idx_mold_h: pred,
            },
            alerts: Vec::new(),
            raw,
        }
    }

    #[test]
    fn test_history_window_anchored_at_latest() {
        let mut store = TelemetryStore::in_memory();
        for minutes in [0, 30, 90, 100] {
            store.commit(batch(minutes, 50.0, 0.1)).unwrap();
        }

        let history = store.history("AIR-001", 60);
        let offsets: Vec<i64> = history
            .iter()
            .map(|p| (p.ts - t0()).num_minutes())
            .collect();
        assert_eq!(offsets, vec![90, 100]);

        assert_eq!(store.history("AIR-001", 80).len(), 3);
        assert!(store.history("AIR-999", 60).is_empty());
    }

    #[test]
    fn test_history_sorted_when_inserted_out_of_order() {
        let mut store = TelemetryStore::in_memory();
        store.commit(batch(10, 50.0, 0.1)).unwrap();
        store.commit(batch(5, 51.0, 0.1)).unwrap();

        let history = store.history("AIR-001", 60);
        assert_eq!(history[0].air_rh_pct, 51.0);
        assert_eq!(history[1].air_rh_pct, 50.0);
    }

    #[test]
    fn test_recent_predictions_newest_first() {
        let mut store = TelemetryStore::in_memory();
        for (i, pred) in [0.1, 0.2, 0.3, 0.4].into_iter().enumerate() {
            store.commit(batch(i as i64, 50.0, pred)).unwrap();
        }

        let preds: Vec<f64> = store
            .recent_predictions("AIR-001", 3)
            .iter()
            .map(|p| p.pred_idx_mold_h)
            .collect();
        assert_eq!(preds, vec![0.4, 0.3, 0.2]);
        assert_eq!(store.latest_feature("AIR-001").unwrap().idx_mold_now, 0.5);
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let mut store = TelemetryStore::in_memory();
        let mut b = batch(0, 50.0, 0.1);
        b.alerts.push(AlertRecord {
            id: 0,
            alert_id: "a".to_string(),
            ts: t0(),
            air_node_id: "AIR-001".to_string(),
            severity: Severity::Low,
            message: "m".to_string(),
            reason_codes: vec![],
        });
        let alerts = store.commit(b).unwrap();
        assert_eq!(alerts[0].id, 4);

        let latest = store.latest();
        assert_eq!(latest.raw.unwrap().id, 1);
        assert_eq!(latest.feature.unwrap().id, 2);
        assert_eq!(latest.prediction.unwrap().id, 3);
        assert_eq!(latest.alert.unwrap().id, 4);
    }

    #[test]
    fn test_series_joins_on_ts_and_limits() {
        let mut store = TelemetryStore::in_memory();
        for i in 0..5 {
            store.commit(batch(i, 60.0 + i as f64, 0.1 * i as f64)).unwrap();
        }

        let series = store.series(3);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].air_rh_pct, 62.0);
        assert_eq!(series[2].idx_mold_now, Some(0.64));
        assert_eq!(series[2].pred_idx_mold_h, Some(0.4));
    }

    #[test]
    fn test_empty_store() {
        let store = TelemetryStore::in_memory();
        assert_eq!(store.latest(), LatestSnapshot::default());
        assert!(store.series(10).is_empty());
        assert!(store.alerts(10).is_empty());
        assert_eq!(store.counts(), StoreCounts::default());
    }

    #[test]
    fn test_snapshot_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.cbor");

        {
            let mut store = TelemetryStore::open(&path).unwrap();
            store.commit(batch(0, 55.0, 0.2)).unwrap();
            let mut b = batch(1, 56.0, 0.3);
            b.raw.water_ph = f64::NAN;
            store.commit(b).unwrap();
        }

        let mut reopened = TelemetryStore::open(&path).unwrap();
        assert_eq!(reopened.counts().raw, 2);
        assert!(reopened.latest().raw.unwrap().payload.water_ph.is_nan());

        // ids keep counting after reload
        reopened.commit(batch(2, 57.0, 0.4)).unwrap();
        assert_eq!(reopened.latest().raw.unwrap().id, 7);
    }

    fn entry_count(path: &Path) -> usize {
        let bytes = fs::read(path).unwrap();
        serde_cbor::Deserializer::from_slice(&bytes)
            .into_iter::<LogEntry>()
            .count()
    }

    #[test]
    fn test_commits_append_and_flush_compacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.cbor");

        let mut store = TelemetryStore::open(&path).unwrap();
        for i in 0..3 {
            store.commit(batch(i, 50.0, 0.1)).unwrap();
        }
        // empty snapshot plus one entry per commit
        assert_eq!(entry_count(&path), 4);

        store.flush().unwrap();
        assert_eq!(entry_count(&path), 1);
        assert_eq!(TelemetryStore::open(&path).unwrap().counts().raw, 3);
    }

    #[test]
    fn test_open_compacts_long_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.cbor");

        let mut store = TelemetryStore::open(&path).unwrap();
        for i in 0..COMPACT_AFTER as i64 {
            store.commit(batch(i, 50.0, 0.1)).unwrap();
        }
        assert_eq!(entry_count(&path), COMPACT_AFTER + 1);

        let reopened = TelemetryStore::open(&path).unwrap();
        assert_eq!(reopened.counts().raw, COMPACT_AFTER);
        assert_eq!(entry_count(&path), 1);
    }

    #[test]
    fn test_truncated_last_entry_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        {
            let mut store = TelemetryStore::open(&path).unwrap();
            store.commit(batch(0, 50.0, 0.1)).unwrap();
            store.commit(batch(1, 51.0, 0.1)).unwrap();
        }
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        let store = TelemetryStore::open(&path).unwrap();
        assert_eq!(store.counts().raw, 1);
        assert_eq!(store.latest().raw.unwrap().payload.air_rh_pct, 50.0);
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();

        let mut store = TelemetryStore::open(blocker.join("store.cbor")).unwrap();
        assert!(store.commit(batch(0, 50.0, 0.1)).is_err());
        assert_eq!(store.counts(), StoreCounts::default());
        assert!(store.history("AIR-001", 60).is_empty());
        assert!(store.latest_feature("AIR-001").is_none());
    }

    #[test]
    fn test_unsupported_snapshot_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        let old = Tables {
            version: SNAPSHOT_VERSION + 1,
            next_id: 1,
            ..Default::default()
        };
        fs::write(&path, serde_cbor::to_vec(&LogEntryRef::Snapshot(&old)).unwrap()).unwrap();

        let err = TelemetryStore::open(&path).unwrap_err();
        assert!(matches!(err, TelemetryError::StoreError(ref m) if m.contains("version")));
    }

    #[test]
    fn test_corrupt_snapshot_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.cbor");
        fs::write(&path, b"garbage").unwrap();
        assert!(TelemetryStore::open(&path).is_err());
    }
}
