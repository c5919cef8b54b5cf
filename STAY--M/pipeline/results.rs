use std::{
    fmt::Write as _,
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{metrics::MetricsEntry, orchestrator::PredictionBundle};

/// Outcome of a run that scored an incoming record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Run identifier.
    pub run_id: String,
    /// When the summary was produced.
    pub timestamp: DateTime<Utc>,
    /// The three role predictions.
    pub predictions: PredictionBundle,
    /// Metrics entries exactly as snapshotted.
    pub metrics: IndexMap<String, MetricsEntry>,
}

impl RunSummary {
    /// Human-readable block, one fact per line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== {} run {} ===",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.run_id
        );
        let _ = writeln!(out, "occupancy class: {}", self.predictions.occupancy);
        let _ = writeln!(out, "points class: {}", self.predictions.rewards);
        let _ = writeln!(out, "final price: {:.2}", self.predictions.price);
        out.push_str("metrics:\n");
        for (model, entry) in &self.metrics {
            let detail = entry.metrics().map_or_else(
                || "absent".to_string(),
                |metrics| {
                    metrics
                        .iter()
                        .map(|(key, value)| format!("{key}={value}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            );
            let _ = writeln!(out, "  {model}: {detail}");
        }
        out
    }
}

/// Destination for per-run summaries.
pub trait ResultSink: Send + Sync {
    /// Records one summary.
    fn record(&self, summary: &RunSummary) -> Result<()>;
}

/// Appends rendered summaries to a text file.
#[derive(Debug)]
pub struct TextResultLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl TextResultLogger {
    /// Opens (or creates) the results log.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating results dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening results log {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Results log location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for TextResultLogger {
    fn record(&self, summary: &RunSummary) -> Result<()> {
        let mut file = self.file.lock();
        file.write_all(summary.render().as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}
