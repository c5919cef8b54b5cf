use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use shared_logging::{ConsoleMirror, LogLevel, LogRecord};
use stay_pipeline::{
    CsvDatasetStore, DatasetStore, Domain, FsMetricsSink, ModelRegistry, PipelineConfig,
    PipelineTelemetry, ResultSink, RunMetricsSnapshot, RunOptions, RunOrchestrator,
    TextResultLogger,
};

#[derive(Parser, Debug)]
#[command(name = "stayrun", version, about = "Retrain-or-reuse runner for the stay models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains or reloads every configured model, snapshots metrics, scores any new booking.
    Run(RunArgs),
    /// Lists the newest metrics snapshots.
    Snapshots {
        #[arg(long, default_value = "stay.toml")]
        config: PathBuf,
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Pretty-prints one snapshot file.
    Show { snapshot: PathBuf },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, default_value = "stay.toml")]
    config: PathBuf,
    /// Retrain every model, ignoring RETRAIN_ON_START.
    #[arg(long, conflicts_with = "no_retrain")]
    retrain: bool,
    /// Reuse cached artifacts where present, ignoring RETRAIN_ON_START.
    #[arg(long)]
    no_retrain: bool,
    /// Mirror debug records to stderr.
    #[arg(long, short)]
    verbose: bool,
}

impl RunArgs {
    fn options(&self, from_env: RunOptions) -> RunOptions {
        match (self.retrain, self.no_retrain) {
            (true, _) => RunOptions {
                retrain_on_start: true,
            },
            (_, true) => RunOptions {
                retrain_on_start: false,
            },
            _ => from_env,
        }
    }

    fn console(&self) -> ConsoleMirror {
        ConsoleMirror::new(if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Snapshots { config, limit } => {
            let config = PipelineConfig::load(&config)?;
            let sink = FsMetricsSink::new(config.layout().metrics_dir);
            for path in sink.list(limit)? {
                let snapshot = RunMetricsSnapshot::read(&path)?;
                let trained = snapshot
                    .models
                    .values()
                    .filter(|entry| !entry.is_absent())
                    .count();
                println!(
                    "{} | {} | {} | trained {}/{}",
                    path.display(),
                    snapshot.run_id,
                    snapshot.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    trained,
                    snapshot.models.len()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { snapshot } => {
            let snapshot = RunMetricsSnapshot::read(&snapshot)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn handle_run(args: &RunArgs) -> Result<ExitCode> {
    let console = args.console();
    let config = match PipelineConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            console.emit(
                &LogRecord::new("stayrun", LogLevel::Error, "config.invalid")
                    .with_metadata(json!({ "kind": err.kind(), "error": err.to_string() })),
            );
            return Ok(ExitCode::FAILURE);
        }
    };
    let options = args.options(RunOptions::from_env());
    let layout = config.layout();

    let telemetry = PipelineTelemetry::builder("stayrun")
        .log_path(layout.pipeline_log())
        .console(console)
        .build()
        .context("opening pipeline log")?;

    let registry = ModelRegistry::with_defaults();
    let store = CsvDatasetStore::new();
    for domain in Domain::ALL {
        let master = layout.master(domain);
        let created = store
            .ensure_master(&master, &registry.default_schema(domain))
            .with_context(|| format!("bootstrapping {}", master.display()))?;
        if created {
            let _ = telemetry.log(
                LogLevel::Info,
                "master.created",
                json!({ "domain": domain, "path": master.display().to_string() }),
            );
        }
    }

    let results = open_result_sink(&layout.results_log(), &telemetry);
    let mut orchestrator = RunOrchestrator::new(config, options)
        .with_registry(registry)
        .with_store(Box::new(store))
        .with_telemetry(telemetry);
    if let Some(results) = results {
        orchestrator = orchestrator.with_result_sink(results);
    }

    match orchestrator.run() {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.prediction.error().is_some() {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

/// Opens the results log. A log that cannot be opened is reported and the run goes on
/// without one.
fn open_result_sink(path: &Path, telemetry: &PipelineTelemetry) -> Option<Box<dyn ResultSink>> {
    match TextResultLogger::new(path) {
        Ok(logger) => Some(Box::new(logger)),
        Err(err) => {
            let _ = telemetry.log(
                LogLevel::Warn,
                "results.unavailable",
                json!({ "path": path.display().to_string(), "error": format!("{err:#}") }),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_logging::read_records;
    use std::fs;
    use tempfile::tempdir;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["stayrun", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_override_the_environment() {
        let reuse = RunOptions {
            retrain_on_start: false,
        };
        assert!(run_args(&["--retrain"]).options(reuse).retrain_on_start);
        assert!(!run_args(&["--no-retrain"]).options(RunOptions::default()).retrain_on_start);
        assert_eq!(run_args(&[]).options(reuse), reuse);
        assert_eq!(run_args(&[]).config, PathBuf::from("stay.toml"));
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        assert!(Cli::try_parse_from(["stayrun", "run", "--retrain", "--no-retrain"]).is_err());
    }

    #[test]
    fn snapshot_commands_parse() {
        let cli = Cli::try_parse_from(["stayrun", "snapshots", "--limit", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Snapshots { limit: 3, .. }));
        let cli = Cli::try_parse_from(["stayrun", "show", "metrics/x_metrics.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Show { .. }));
    }

    #[test]
    fn unwritable_results_log_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("logs/pipeline.log.jsonl");
        let telemetry = PipelineTelemetry::builder("stayrun")
            .log_path(&log)
            .build()
            .unwrap();
        let blocker = dir.path().join("results");
        fs::write(&blocker, "not a directory").unwrap();

        assert!(open_result_sink(&blocker.join("results.log"), &telemetry).is_none());
        let records = read_records(&log).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "results.unavailable");
        assert_eq!(records[0].level, LogLevel::Warn);

        assert!(open_result_sink(&dir.path().join("logs/results.log"), &telemetry).is_some());
    }
}
