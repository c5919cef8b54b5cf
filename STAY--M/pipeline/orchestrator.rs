use std::{path::PathBuf, sync::Arc};

use anyhow::anyhow;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    cache::ArtifactCache,
    config::{DataLayout, PipelineConfig, RunOptions},
    dataset::{Cell, CsvDatasetStore, DatasetStore, Row, Schema, Table},
    error::RunError,
    metrics::{FsMetricsSink, MetricsEntry, MetricsSink, RunMetricsSnapshot},
    models::{Domain, ModelArtifact, ModelUnit, Prediction, Role},
    reconcile::{reconcile_row, ReconciledRow},
    registry::ModelRegistry,
    results::{ResultSink, RunSummary},
    telemetry::PipelineTelemetry,
};

/// Predictions for the three canonical roles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionBundle {
    /// Occupancy class.
    pub occupancy: String,
    /// Points class.
    pub rewards: String,
    /// Final price.
    pub price: f64,
}

/// Outcome of the scoring phase.
#[derive(Debug)]
pub enum PredictionPhase {
    /// No incoming record this run.
    Skipped,
    /// Record scored and both masters appended.
    Completed(PredictionBundle),
    /// Phase aborted; the snapshot stays as written.
    Failed(RunError),
}

impl PredictionPhase {
    /// Bundle when the phase completed.
    #[must_use]
    pub const fn bundle(&self) -> Option<&PredictionBundle> {
        match self {
            Self::Completed(bundle) => Some(bundle),
            _ => None,
        }
    }

    /// Error when the phase failed.
    #[must_use]
    pub const fn error(&self) -> Option<&RunError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Status tag, as written under `status` when serialized.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

impl Serialize for PredictionPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(tag = "status", rename_all = "snake_case")]
        enum View<'a> {
            Skipped,
            Completed { predictions: &'a PredictionBundle },
            Failed { kind: &'static str, error: String },
        }
        let view = match self {
            Self::Skipped => View::Skipped,
            Self::Completed(bundle) => View::Completed { predictions: bundle },
            Self::Failed(err) => View::Failed {
                kind: err.kind(),
                error: err.to_string(),
            },
        };
        view.serialize(serializer)
    }
}

/// Everything a completed run produced.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Run identifier shared by logs and snapshot.
    pub run_id: String,
    /// Metrics snapshot built after phase 1.
    pub snapshot: RunMetricsSnapshot,
    /// Where the snapshot was written.
    pub snapshot_path: Option<PathBuf>,
    /// Why the snapshot could not be written.
    pub snapshot_error: Option<String>,
    /// Scoring outcome.
    pub prediction: PredictionPhase,
}

/// Drives one retrain-or-reuse, snapshot, score-and-append cycle.
pub struct RunOrchestrator {
    config: PipelineConfig,
    layout: DataLayout,
    options: RunOptions,
    registry: ModelRegistry,
    store: Box<dyn DatasetStore>,
    cache: ArtifactCache,
    metrics: Box<dyn MetricsSink>,
    results: Option<Box<dyn ResultSink>>,
    telemetry: Option<PipelineTelemetry>,
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("models", &self.config.models)
            .field("layout", &self.layout)
            .field("options", &self.options)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl RunOrchestrator {
    /// Orchestrator with the built-in units and the file-backed collaborators under the
    /// config's layout. No result sink is attached.
    #[must_use]
    pub fn new(config: PipelineConfig, options: RunOptions) -> Self {
        let layout = config.layout();
        Self {
            cache: ArtifactCache::new(&layout.models_dir),
            metrics: Box::new(FsMetricsSink::new(&layout.metrics_dir)),
            store: Box::new(CsvDatasetStore::new()),
            registry: ModelRegistry::with_defaults(),
            results: None,
            telemetry: None,
            config,
            layout,
            options,
        }
    }

    /// Replaces the unit registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the dataset store.
    #[must_use]
    pub fn with_store(mut self, store: Box<dyn DatasetStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the metrics sink.
    #[must_use]
    pub fn with_metrics_sink(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    /// Attaches a result sink for scored runs.
    #[must_use]
    pub fn with_result_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.results = Some(sink);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Resolved paths.
    #[must_use]
    pub const fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Artifact cache in use.
    #[must_use]
    pub const fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Runs all three phases. Errors returned here abort the run; prediction-phase
    /// failures land in [`RunReport::prediction`] instead.
    pub fn run(&self) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4().to_string();
        let scope = RunScope {
            telemetry: self.telemetry.as_ref().map(|tel| tel.for_run(&run_id)),
        };
        scope.log(
            LogLevel::Info,
            "run.started",
            json!({
                "models": self.config.models,
                "retrain_on_start": self.options.retrain_on_start,
                "window_size": self.config.window_size,
            }),
        );

        let loaded = self.prepare_models(&scope).map_err(|err| scope.fatal(err))?;
        let (snapshot, snapshot_path, snapshot_error) =
            self.emit_snapshot(&scope, &run_id, &loaded);
        let prediction = self.predict_phase(&scope, &run_id, &loaded, &snapshot);

        scope.log(
            LogLevel::Info,
            "run.finished",
            json!({
                "prediction": prediction.status(),
                "predictions": prediction.bundle(),
                "error_kind": prediction.error().map(RunError::kind),
                "error": prediction.error().map(ToString::to_string),
            }),
        );
        Ok(RunReport {
            run_id,
            snapshot,
            snapshot_path,
            snapshot_error,
            prediction,
        })
    }

    fn prepare_models(&self, scope: &RunScope) -> Result<LoadedModels, RunError> {
        let units = self.registry.resolve_all(&self.config.models)?;

        let mut windows = IndexMap::new();
        for domain in Domain::ALL {
            if !units.iter().any(|(_, unit)| unit.domain() == domain) {
                continue;
            }
            let master = self.layout.master(domain);
            let window = self
                .store
                .load_recent_window(&master, self.config.window_size)
                .map_err(|err| RunError::Dataset {
                    path: master.clone(),
                    source: err.into(),
                })?;
            scope.log(
                LogLevel::Debug,
                "window.loaded",
                json!({ "domain": domain, "rows": window.len(), "columns": window.schema.len() }),
            );
            windows.insert(domain, window);
        }

        let mut models = IndexMap::new();
        for (name, unit) in units {
            let reuse = !self.options.retrain_on_start && self.cache.contains(&name);
            let (artifact, entry) = if reuse {
                let artifact = self
                    .cache
                    .load(&name)
                    .map_err(|source| RunError::CacheLoad {
                        name: name.clone(),
                        source,
                    })?;
                scope.log(
                    LogLevel::Info,
                    "model.reused",
                    json!({ "model": name, "artifact": artifact.id }),
                );
                (artifact, MetricsEntry::Absent)
            } else {
                let window = windows
                    .get(&unit.domain())
                    .ok_or_else(|| RunError::Training {
                        name: name.clone(),
                        source: anyhow!("no {} window loaded", unit.domain()),
                    })?;
                let (artifact, metrics) = unit
                    .train_and_save(window, &self.cache)
                    .map_err(|source| RunError::Training {
                        name: name.clone(),
                        source,
                    })?;
                scope.log(
                    LogLevel::Info,
                    "model.trained",
                    json!({ "model": name, "artifact": artifact.id, "metrics": metrics }),
                );
                (artifact, MetricsEntry::Present(metrics))
            };
            models.insert(
                name,
                LoadedModel {
                    unit,
                    artifact,
                    entry,
                },
            );
        }
        Ok(LoadedModels { windows, models })
    }

    fn emit_snapshot(
        &self,
        scope: &RunScope,
        run_id: &str,
        loaded: &LoadedModels,
    ) -> (RunMetricsSnapshot, Option<PathBuf>, Option<String>) {
        let entries = loaded
            .models
            .iter()
            .map(|(name, model)| (name.clone(), model.entry.clone()))
            .collect();
        let snapshot = RunMetricsSnapshot::new(run_id, entries);
        match self.metrics.write(&snapshot) {
            Ok(path) => {
                scope.log(
                    LogLevel::Info,
                    "snapshot.written",
                    json!({ "path": path.display().to_string() }),
                );
                (snapshot, Some(path), None)
            }
            Err(source) => {
                let err = RunError::SnapshotWrite { source };
                scope.log(
                    LogLevel::Error,
                    "snapshot.failed",
                    json!({ "kind": err.kind(), "error": err.to_string() }),
                );
                let message = err.to_string();
                (snapshot, None, Some(message))
            }
        }
    }

    fn predict_phase(
        &self,
        scope: &RunScope,
        run_id: &str,
        loaded: &LoadedModels,
        snapshot: &RunMetricsSnapshot,
    ) -> PredictionPhase {
        let path = self.layout.incoming_record();
        let record = match self.store.load_incoming_record(&path) {
            Ok(Some(record)) => record,
            Ok(None) => {
                scope.log(
                    LogLevel::Info,
                    "prediction.skipped",
                    json!({ "incoming": path.display().to_string() }),
                );
                return PredictionPhase::Skipped;
            }
            Err(err) => {
                return scope.failed(RunError::Dataset {
                    path,
                    source: err.into(),
                })
            }
        };

        match self.score_and_append(scope, loaded, &record) {
            Ok(bundle) => {
                if let Some(sink) = &self.results {
                    let summary = RunSummary {
                        run_id: run_id.to_string(),
                        timestamp: chrono::Utc::now(),
                        predictions: bundle.clone(),
                        metrics: snapshot.models.clone(),
                    };
                    if let Err(err) = sink.record(&summary) {
                        scope.log(
                            LogLevel::Warn,
                            "summary.failed",
                            json!({ "error": format!("{err:#}") }),
                        );
                    }
                }
                scope.log(
                    LogLevel::Info,
                    "prediction.completed",
                    json!({ "predictions": bundle }),
                );
                PredictionPhase::Completed(bundle)
            }
            Err(err) => scope.failed(err),
        }
    }

    fn score_and_append(
        &self,
        scope: &RunScope,
        loaded: &LoadedModels,
        record: &Row,
    ) -> Result<PredictionBundle, RunError> {
        let occupancy = loaded.role(Role::Occupancy)?;
        let rewards = loaded.role(Role::Rewards)?;
        let pricing = loaded.role(Role::Pricing)?;

        let occ_class = occupancy.predict(record)?;
        let points_class = rewards.predict(record)?;
        let price = pricing.predict(record)?;
        let bundle = PredictionBundle {
            occupancy: occupancy.expect_label(&occ_class)?,
            rewards: rewards.expect_label(&points_class)?,
            price: pricing.expect_value(&price)?,
        };

        let occ_row = reconcile_row(
            &occupancy.features(record)?,
            &loaded.schema(Domain::Occupancy),
            vec![(Role::Occupancy.column(), Cell::from(occ_class))],
        );
        let price_row = reconcile_row(
            &pricing.features(record)?,
            &loaded.schema(Domain::Pricing),
            vec![
                (Role::Rewards.column(), Cell::from(points_class)),
                (Role::Pricing.column(), Cell::from(price)),
            ],
        );

        self.append(scope, Domain::Occupancy, &occ_row)?;
        self.append(scope, Domain::Pricing, &price_row)?;
        Ok(bundle)
    }

    fn append(
        &self,
        scope: &RunScope,
        domain: Domain,
        reconciled: &ReconciledRow,
    ) -> Result<(), RunError> {
        if !reconciled.dropped.is_empty() {
            scope.log(
                LogLevel::Debug,
                "row.columns_dropped",
                json!({ "domain": domain, "columns": reconciled.dropped }),
            );
        }
        let master = self.layout.master(domain);
        self.store
            .append_row(&master, &reconciled.row)
            .map_err(|err| RunError::Append {
                path: master.clone(),
                source: err.into(),
            })?;
        scope.log(
            LogLevel::Info,
            "row.appended",
            json!({ "domain": domain, "master": master.display().to_string() }),
        );
        Ok(())
    }
}

struct LoadedModel {
    unit: Arc<dyn ModelUnit>,
    artifact: ModelArtifact,
    entry: MetricsEntry,
}

impl LoadedModel {
    fn name(&self) -> String {
        self.unit.name().to_string()
    }

    fn predict(&self, record: &Row) -> Result<Prediction, RunError> {
        self.unit
            .predict(&self.artifact, record)
            .map_err(|source| RunError::Prediction {
                name: self.name(),
                source,
            })
    }

    fn features(&self, record: &Row) -> Result<Row, RunError> {
        self.unit
            .build_features(record)
            .map_err(|source| RunError::Prediction {
                name: self.name(),
                source: source.context("building feature row"),
            })
    }

    fn expect_label(&self, prediction: &Prediction) -> Result<String, RunError> {
        prediction
            .as_label()
            .map(ToOwned::to_owned)
            .ok_or_else(|| RunError::Prediction {
                name: self.name(),
                source: anyhow!("expected a class label, got {prediction}"),
            })
    }

    fn expect_value(&self, prediction: &Prediction) -> Result<f64, RunError> {
        prediction.as_value().ok_or_else(|| RunError::Prediction {
            name: self.name(),
            source: anyhow!("expected a numeric estimate, got {prediction}"),
        })
    }
}

struct LoadedModels {
    windows: IndexMap<Domain, Table>,
    models: IndexMap<String, LoadedModel>,
}

impl LoadedModels {
    fn role(&self, role: Role) -> Result<&LoadedModel, RunError> {
        self.models
            .get(role.model_name())
            .ok_or_else(|| RunError::MissingRole {
                role: role.model_name().into(),
            })
    }

    fn schema(&self, domain: Domain) -> Schema {
        self.windows
            .get(&domain)
            .map(|window| window.schema.clone())
            .unwrap_or_default()
    }
}

struct RunScope {
    telemetry: Option<PipelineTelemetry>,
}

impl RunScope {
    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }

    fn fatal(&self, err: RunError) -> RunError {
        self.log(
            LogLevel::Error,
            "run.aborted",
            json!({ "kind": err.kind(), "error": err.to_string() }),
        );
        err
    }

    fn failed(&self, err: RunError) -> PredictionPhase {
        self.log(
            LogLevel::Error,
            "prediction.failed",
            json!({ "kind": err.kind(), "error": err.to_string() }),
        );
        PredictionPhase::Failed(err)
    }
}
