#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::cast_precision_loss, clippy::module_name_repetitions)]

//! Stay pipeline: retrain-or-reuse orchestration for the occupancy, rewards and pricing
//! models, with scoring of an incoming booking and write-back into the historical masters.

/// Config file and run options.
#[path = "../config.rs"]
pub mod config;

/// Run error taxonomy.
#[path = "../error.rs"]
pub mod error;

/// Tabular data model and the CSV-backed dataset store.
#[path = "../dataset/main.rs"]
pub mod dataset;

/// Model unit contract, classical ML toolkit, and the built-in units.
#[path = "../models/main.rs"]
pub mod models;

/// Static name-to-unit registry.
#[path = "../registry.rs"]
pub mod registry;

/// "Latest" artifact cache per model name.
#[path = "../cache.rs"]
pub mod cache;

/// Metrics entries, run snapshots and their sinks.
#[path = "../metrics.rs"]
pub mod metrics;

/// Prediction-to-row reconciliation.
#[path = "../reconcile.rs"]
pub mod reconcile;

/// Human-readable run summaries.
#[path = "../results.rs"]
pub mod results;

/// Structured logging handle used by the orchestrator.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Run orchestrator.
#[path = "../orchestrator.rs"]
pub mod orchestrator;

pub use cache::ArtifactCache;
pub use config::{DataLayout, PipelineConfig, RunOptions};
pub use dataset::{Cell, CsvDatasetStore, DatasetStore, Row, Schema, Table};
pub use error::RunError;
pub use metrics::{FsMetricsSink, MetricsEntry, MetricsSink, RunMetricsSnapshot};
pub use models::{Domain, ModelArtifact, ModelUnit, Prediction, Role, TrainingMetrics};
pub use orchestrator::{PredictionBundle, PredictionPhase, RunOrchestrator, RunReport};
pub use registry::ModelRegistry;
pub use results::{ResultSink, RunSummary, TextResultLogger};
pub use telemetry::{PipelineTelemetry, PipelineTelemetryBuilder};
