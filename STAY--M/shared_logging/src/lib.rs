#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared by the pipeline library and the runner CLI.

use std::{
    fmt,
    fs::{self, File},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Run the record belongs to, when emitted inside a pipeline run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Severity.
    pub level: LogLevel,
    /// Short event name or message.
    pub message: String,
    /// Arbitrary JSON fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            run_id: None,
            level,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    /// Tags the record with a run identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Copies the fields of a JSON object into the record metadata.
    /// Non-object values are stored under `value`.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        match metadata {
            Value::Object(map) => self.metadata = map,
            Value::Null => {}
            other => {
                self.metadata.insert("value".into(), other);
            }
        }
        self
    }
}

/// Thread-safe JSON logger with append-only semantics.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log dir {}", parent.display()))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Writes a log record as JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the underlying file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Human-oriented mirror of log records on stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleMirror {
    min_level: LogLevel,
}

impl ConsoleMirror {
    /// Mirrors records at or above `min_level`.
    #[must_use]
    pub const fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }

    /// Renders a record as a single console line.
    #[must_use]
    pub fn render(record: &LogRecord) -> String {
        let mut line = format!(
            "{} [{}] {}: {}",
            record.timestamp.format("%H:%M:%S"),
            record.level,
            record.module,
            record.message
        );
        if !record.metadata.is_empty() {
            line.push(' ');
            line.push_str(&Value::Object(record.metadata.clone()).to_string());
        }
        line
    }

    /// Prints the record if it passes the level filter.
    pub fn emit(&self, record: &LogRecord) {
        if record.level >= self.min_level {
            eprintln!("{}", Self::render(record));
        }
    }
}

impl Default for ConsoleMirror {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

/// Reads every record back from a JSON-lines log file.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<LogRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("opening log {}", path.display()))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).context("decoding log record")?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("logs/test.log")).unwrap();
        logger
            .log(&LogRecord::new("module", LogLevel::Info, "hello").with_run_id("run-1"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"hello\""));
        assert!(content.contains("\"run_id\":\"run-1\""));
    }

    #[test]
    fn records_round_trip_through_the_file() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("pipeline.log.jsonl")).unwrap();
        logger
            .log(
                &LogRecord::new("orchestrator", LogLevel::Warn, "snapshot.failed")
                    .with_metadata(json!({ "path": "metrics/x.json" })),
            )
            .unwrap();
        logger
            .log(&LogRecord::new("orchestrator", LogLevel::Info, "run.finished"))
            .unwrap();
        let records = read_records(logger.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, LogLevel::Warn);
        assert_eq!(records[0].metadata["path"], json!("metrics/x.json"));
        assert!(records[1].metadata.is_empty());
    }

    #[test]
    fn console_render_includes_metadata() {
        let record = LogRecord::new("cache", LogLevel::Error, "load.failed")
            .with_metadata(json!({ "model": "pricing" }));
        let line = ConsoleMirror::render(&record);
        assert!(line.contains("[ERROR] cache: load.failed"));
        assert!(line.contains("\"model\":\"pricing\""));
        assert!(LogLevel::Error > LogLevel::Info);
    }
}
