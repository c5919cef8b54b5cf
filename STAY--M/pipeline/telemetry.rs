use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{ConsoleMirror, JsonLogger, LogLevel, LogRecord};

/// Builder for pipeline telemetry handles.
pub struct PipelineTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    console: Option<ConsoleMirror>,
    run_id: Option<String>,
}

impl PipelineTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            console: None,
            run_id: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Mirrors records to stderr.
    #[must_use]
    pub const fn console(mut self, mirror: ConsoleMirror) -> Self {
        self.console = Some(mirror);
        self
    }

    /// Tags every record with the run id.
    #[must_use]
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<PipelineTelemetry> {
        let logger = self.log_path.map(JsonLogger::new).transpose()?.map(Arc::new);
        Ok(PipelineTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                run_id: self.run_id,
                logger,
                console: self.console,
            }),
        })
    }
}

/// Telemetry handle shared by the orchestrator and the CLI.
#[derive(Clone)]
pub struct PipelineTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PipelineTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineTelemetry")
            .field("module", &self.inner.module)
            .field("run_id", &self.inner.run_id)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    run_id: Option<String>,
    logger: Option<Arc<JsonLogger>>,
    console: Option<ConsoleMirror>,
}

impl PipelineTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PipelineTelemetryBuilder {
        PipelineTelemetryBuilder::new(module)
    }

    /// Run id stamped on records, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.inner.run_id.as_deref()
    }

    /// Same sinks, records stamped with another run id.
    #[must_use]
    pub fn for_run(&self, run_id: impl Into<String>) -> Self {
        let run_id = Some(run_id.into());
        if run_id == self.inner.run_id {
            return self.clone();
        }
        Self {
            inner: Arc::new(TelemetryInner {
                module: self.inner.module.clone(),
                run_id,
                logger: self.inner.logger.clone(),
                console: self.inner.console,
            }),
        }
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        let mut record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
        if let Some(run_id) = &self.inner.run_id {
            record = record.with_run_id(run_id);
        }
        if let Some(console) = &self.inner.console {
            console.emit(&record);
        }
        if let Some(logger) = &self.inner.logger {
            logger.log(&record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_logging::read_records;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_tagged_records() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("logs/pipeline.log.jsonl");
        let telemetry = PipelineTelemetry::builder("orchestrator")
            .log_path(&path)
            .run_id("run-1")
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "phase.train", json!({ "model": "pricing" }))
            .unwrap();
        telemetry
            .for_run("run-2")
            .log(LogLevel::Warn, "phase.predict", Value::Null)
            .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].run_id.as_deref(), Some("run-1"));
        assert_eq!(records[0].metadata["model"], json!("pricing"));
        assert_eq!(records[1].run_id.as_deref(), Some("run-2"));
    }

    #[test]
    fn telemetry_without_sinks_is_silent() {
        let telemetry = PipelineTelemetry::builder("cli").build().unwrap();
        assert!(telemetry.run_id().is_none());
        telemetry.log(LogLevel::Error, "noop", json!({})).unwrap();
    }
}
