use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::TrainingMetrics;

const SNAPSHOT_SUFFIX: &str = "_metrics.json";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const STAMP_LEN: usize = 15;
const RUN_TAG_LEN: usize = 8;

/// Metrics outcome for one model in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "metrics", rename_all = "snake_case")]
pub enum MetricsEntry {
    /// Model was trained this run.
    Present(TrainingMetrics),
    /// Cached artifact was reused, nothing was measured.
    Absent,
}

impl MetricsEntry {
    /// Metrics if the model was trained.
    #[must_use]
    pub const fn metrics(&self) -> Option<&TrainingMetrics> {
        match self {
            Self::Present(metrics) => Some(metrics),
            Self::Absent => None,
        }
    }

    /// Whether the entry marks a reused artifact.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Immutable record of every model's metrics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetricsSnapshot {
    /// Run identifier.
    pub run_id: String,
    /// When phase 1 completed.
    pub timestamp: DateTime<Utc>,
    /// Entries in configured model order.
    pub models: IndexMap<String, MetricsEntry>,
}

impl RunMetricsSnapshot {
    /// Snapshot stamped now.
    #[must_use]
    pub fn new(run_id: impl Into<String>, models: IndexMap<String, MetricsEntry>) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: Utc::now(),
            models,
        }
    }

    /// `<YYYYmmdd_HHMMSS>_<run tag>_metrics.json`. The run tag keeps runs that land in
    /// the same second apart.
    #[must_use]
    pub fn file_name(&self) -> String {
        let tag: String = self
            .run_id
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
            .take(RUN_TAG_LEN)
            .collect();
        format!(
            "{}_{}{SNAPSHOT_SUFFIX}",
            self.timestamp.format(STAMP_FORMAT),
            if tag.is_empty() { "run" } else { tag.as_str() }
        )
    }

    /// Reads a persisted snapshot.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).with_context(|| format!("reading snapshot {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("decoding snapshot {}", path.display()))
    }
}

/// Destination for run snapshots.
pub trait MetricsSink: Send + Sync {
    /// Persists the snapshot and returns where it landed.
    fn write(&self, snapshot: &RunMetricsSnapshot) -> Result<PathBuf>;
}

/// Writes one pretty JSON file per run into a directory. Existing files are never replaced.
#[derive(Debug, Clone)]
pub struct FsMetricsSink {
    dir: PathBuf,
}

impl FsMetricsSink {
    /// Sink writing into `dir`, created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest snapshot files first. Names sharing a second are ordered by modification time.
    pub fn list(&self, limit: usize) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?
        {
            let path = entry?.path();
            let is_snapshot = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(SNAPSHOT_SUFFIX));
            if is_snapshot && path.is_file() {
                let modified = fs::metadata(&path)
                    .and_then(|meta| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((stamp_of(&path), modified, path));
            }
        }
        files.sort_by(|a, b| b.cmp(a));
        files.truncate(limit);
        Ok(files.into_iter().map(|(_, _, path)| path).collect())
    }
}

fn stamp_of(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.chars().take(STAMP_LEN).collect())
        .unwrap_or_default()
}

impl MetricsSink for FsMetricsSink {
    fn write(&self, snapshot: &RunMetricsSnapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating metrics dir {}", self.dir.display()))?;
        let path = self.dir.join(snapshot.file_name());
        let body = serde_json::to_vec_pretty(snapshot)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("creating snapshot {}", path.display()))?;
        file.write_all(&body)?;
        file.write_all(b"\n")?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn snapshot() -> RunMetricsSnapshot {
        let mut models = IndexMap::new();
        let mut trained = TrainingMetrics::new();
        trained.insert("accuracy".into(), json!(0.75));
        models.insert("occupancy".into(), MetricsEntry::Present(trained));
        models.insert("pricing".into(), MetricsEntry::Absent);
        RunMetricsSnapshot::new("run-1", models)
    }

    #[test]
    fn entries_serialize_tagged() {
        let value = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(
            value["models"]["occupancy"],
            json!({ "status": "present", "metrics": { "accuracy": 0.75 } })
        );
        assert_eq!(value["models"]["pricing"], json!({ "status": "absent" }));
        assert_eq!(
            serde_json::to_value(MetricsEntry::Present(TrainingMetrics::new())).unwrap(),
            json!({ "status": "present", "metrics": {} })
        );
    }

    #[test]
    fn sink_writes_once_per_name() {
        let dir = tempdir().unwrap();
        let sink = FsMetricsSink::new(dir.path().join("metrics"));
        let snap = snapshot();
        let path = sink.write(&snap).unwrap();
        assert!(path.to_string_lossy().ends_with("_metrics.json"));
        assert_eq!(RunMetricsSnapshot::read(&path).unwrap(), snap);

        let before = fs::read(&path).unwrap();
        assert!(sink.write(&snap).is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(sink.list(10).unwrap(), vec![path]);
    }

    #[test]
    fn list_orders_newest_first() {
        let dir = tempdir().unwrap();
        for name in [
            "20250101_000000_aaaaaaaa_metrics.json",
            "20250301_000000_bbbbbbbb_metrics.json",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        let sink = FsMetricsSink::new(dir.path());
        let listed = sink.list(1).unwrap();
        assert_eq!(
            listed,
            vec![dir.path().join("20250301_000000_bbbbbbbb_metrics.json")]
        );
        assert_eq!(sink.list(5).unwrap().len(), 2);
    }

    #[test]
    fn runs_in_the_same_second_get_distinct_files() {
        let dir = tempdir().unwrap();
        let sink = FsMetricsSink::new(dir.path());
        let first = snapshot();
        let mut second =
            RunMetricsSnapshot::new("7f3c9e21-0000-4000-8000-000000000000", first.models.clone());
        second.timestamp = first.timestamp;

        let first_path = sink.write(&first).unwrap();
        let second_path = sink.write(&second).unwrap();
        assert_ne!(first_path, second_path);
        assert!(second_path.to_string_lossy().ends_with("_7f3c9e21_metrics.json"));
        assert_eq!(RunMetricsSnapshot::read(&first_path).unwrap(), first);
        assert_eq!(RunMetricsSnapshot::read(&second_path).unwrap(), second);
        assert_eq!(sink.list(10).unwrap().len(), 2);
    }
}
