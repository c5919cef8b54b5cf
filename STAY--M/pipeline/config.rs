use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::RunError, models::Domain};

/// Environment variable consulted by [`RunOptions::from_env`].
pub const RETRAIN_ENV: &str = "RETRAIN_ON_START";

const DEFAULT_WINDOW: usize = 500;

/// Parsed pipeline configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered model names to run.
    pub models: Vec<String>,
    /// Number of most recent master rows used for training.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Directory overrides.
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(skip)]
    source_dir: PathBuf,
}

/// Directory settings, relative paths resolve against the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Masters and incoming record.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Cached artifacts.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Run metrics snapshots.
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: PathBuf,
    /// Structured and human-readable logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
            metrics_dir: default_metrics_dir(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_metrics_dir() -> PathBuf {
    PathBuf::from("metrics")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl PipelineConfig {
    /// Loads and validates the TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| RunError::config(path, err))?;
        let mut config = Self::parse(&raw).map_err(|err| match err {
            RunError::Config { message, .. } => RunError::config(path, message),
            other => other,
        })?;
        config.source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Parses and validates a config document held in memory.
    pub fn parse(raw: &str) -> Result<Self, RunError> {
        let config: Self = toml::from_str(raw).map_err(|err| RunError::config("<inline>", err))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from a model list, rooted at `base_dir`.
    #[must_use]
    pub fn with_models<I, S>(models: I, base_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            models: models.into_iter().map(Into::into).collect(),
            window_size: DEFAULT_WINDOW,
            paths: PathSettings::default(),
            source_dir: base_dir.into(),
        }
    }

    fn validate(&self) -> Result<(), RunError> {
        if self.models.is_empty() {
            return Err(RunError::config("<inline>", "`models` must list at least one model"));
        }
        let mut seen = HashSet::new();
        for name in &self.models {
            if name.trim().is_empty() {
                return Err(RunError::config("<inline>", "`models` contains a blank name"));
            }
            if !seen.insert(name.as_str()) {
                return Err(RunError::config(
                    "<inline>",
                    format!("`models` lists '{name}' more than once"),
                ));
            }
        }
        if self.window_size == 0 {
            return Err(RunError::config("<inline>", "`window_size` must be positive"));
        }
        Ok(())
    }

    /// Resolves every configured directory.
    #[must_use]
    pub fn layout(&self) -> DataLayout {
        let resolve = |candidate: &Path| {
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                self.source_dir.join(candidate)
            }
        };
        DataLayout {
            data_dir: resolve(&self.paths.data_dir),
            models_dir: resolve(&self.paths.models_dir),
            metrics_dir: resolve(&self.paths.metrics_dir),
            log_dir: resolve(&self.paths.log_dir),
        }
    }
}

/// Concrete file locations for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    /// Masters and incoming record.
    pub data_dir: PathBuf,
    /// Cached artifacts.
    pub models_dir: PathBuf,
    /// Metrics snapshots.
    pub metrics_dir: PathBuf,
    /// Logs.
    pub log_dir: PathBuf,
}

impl DataLayout {
    /// Lays every directory out under a single root, using the default names.
    #[must_use]
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join(default_data_dir()),
            models_dir: root.join(default_models_dir()),
            metrics_dir: root.join(default_metrics_dir()),
            log_dir: root.join(default_log_dir()),
        }
    }

    /// Master dataset file for a domain.
    #[must_use]
    pub fn master(&self, domain: Domain) -> PathBuf {
        self.data_dir.join(format!("{}_dataset.csv", domain.as_str()))
    }

    /// Optional incoming booking file.
    #[must_use]
    pub fn incoming_record(&self) -> PathBuf {
        self.data_dir.join("new_booking.csv")
    }

    /// Structured run log.
    #[must_use]
    pub fn pipeline_log(&self) -> PathBuf {
        self.log_dir.join("pipeline.log.jsonl")
    }

    /// Human-readable results log.
    #[must_use]
    pub fn results_log(&self) -> PathBuf {
        self.log_dir.join("results.log")
    }
}

/// Options that steer one run. Passed explicitly into the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Retrain every model even when a cached artifact exists.
    pub retrain_on_start: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retrain_on_start: true,
        }
    }
}

impl RunOptions {
    /// Reads [`RETRAIN_ENV`] from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            retrain_on_start: parse_retrain_flag(env::var(RETRAIN_ENV).ok().as_deref()),
        }
    }
}

/// Interprets the retrain flag; unset or unrecognized values keep the default of `true`.
#[must_use]
pub fn parse_retrain_flag(raw: Option<&str>) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        Some("false" | "0" | "no" | "off") => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_models_and_defaults() {
        let config = PipelineConfig::parse(r#"models = ["occupancy", "rewards", "pricing"]"#)
            .unwrap();
        assert_eq!(config.models, vec!["occupancy", "rewards", "pricing"]);
        assert_eq!(config.window_size, 500);
        assert_eq!(config.paths.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn rejects_missing_and_duplicate_models() {
        assert!(matches!(
            PipelineConfig::parse("window_size = 10"),
            Err(RunError::Config { .. })
        ));
        assert!(matches!(
            PipelineConfig::parse("models = []"),
            Err(RunError::Config { .. })
        ));
        let err = PipelineConfig::parse(r#"models = ["pricing", "pricing"]"#).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn load_resolves_paths_against_config_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(
            &path,
            "models = [\"occupancy\"]\nwindow_size = 50\n[paths]\nmetrics_dir = \"out/metrics\"\n",
        )
        .unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        let layout = config.layout();
        assert_eq!(config.window_size, 50);
        assert_eq!(layout.metrics_dir, dir.path().join("out/metrics"));
        assert_eq!(
            layout.master(Domain::Pricing),
            dir.path().join("data/pricing_dataset.csv")
        );
    }

    #[test]
    fn unreadable_config_is_a_config_error() {
        let dir = tempdir().unwrap();
        let err = PipelineConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn retrain_flag_defaults_to_true() {
        assert!(parse_retrain_flag(None));
        assert!(parse_retrain_flag(Some("TRUE")));
        assert!(parse_retrain_flag(Some("maybe")));
        assert!(!parse_retrain_flag(Some("false")));
        assert!(!parse_retrain_flag(Some(" 0 ")));
    }
}
