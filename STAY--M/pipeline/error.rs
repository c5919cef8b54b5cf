use std::path::PathBuf;

use thiserror::Error;

/// Failures a run can hit, grouped by the phase that owns them.
///
/// `Config`, `UnresolvedModel`, `Dataset`, `CacheLoad` and `Training` abort the whole run.
/// `MissingRole`, `Prediction` and `Append` only abort the prediction phase.
/// `SnapshotWrite` is reported and the run carries on.
#[derive(Debug, Error)]
pub enum RunError {
    /// Config file unreadable, unparsable, or semantically invalid.
    #[error("config error ({path}): {message}")]
    Config {
        /// Config file involved.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },
    /// No model unit registered under the configured name.
    #[error("no model unit registered for '{name}'")]
    UnresolvedModel {
        /// Configured name.
        name: String,
    },
    /// A historical window could not be loaded.
    #[error("failed to load dataset {path}: {source}")]
    Dataset {
        /// Master file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
    /// A cached artifact exists but could not be read back.
    #[error("failed to load cached artifact for '{name}': {source}")]
    CacheLoad {
        /// Model name.
        name: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
    /// Training or persisting the fresh artifact failed.
    #[error("training '{name}' failed: {source}")]
    Training {
        /// Model name.
        name: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
    /// A canonical prediction role has no artifact this run.
    #[error("prediction requires the '{role}' model, which is not configured")]
    MissingRole {
        /// Role name.
        role: String,
    },
    /// Feature building or scoring failed.
    #[error("prediction with '{name}' failed: {source}")]
    Prediction {
        /// Model name.
        name: String,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
    /// Appending a reconciled row to a master failed.
    #[error("failed to append to {path}: {source}")]
    Append {
        /// Master file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
    /// The metrics snapshot could not be persisted.
    #[error("failed to write metrics snapshot: {source}")]
    SnapshotWrite {
        /// Underlying error.
        #[source]
        source: anyhow::Error,
    },
}

impl RunError {
    /// Builds a config error from any displayable cause.
    pub fn config(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Config {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-friendly kind used in logs and reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::UnresolvedModel { .. } => "unresolved_model",
            Self::Dataset { .. } => "dataset",
            Self::CacheLoad { .. } => "cache_load",
            Self::Training { .. } => "training",
            Self::MissingRole { .. } => "missing_role",
            Self::Prediction { .. } => "prediction",
            Self::Append { .. } => "append",
            Self::SnapshotWrite { .. } => "snapshot_write",
        }
    }

    /// Whether the error ends the whole run rather than a single phase.
    #[must_use]
    pub const fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::UnresolvedModel { .. }
                | Self::Dataset { .. }
                | Self::CacheLoad { .. }
                | Self::Training { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_scoping_matches_taxonomy() {
        assert!(RunError::UnresolvedModel { name: "x".into() }.is_run_fatal());
        assert!(RunError::Training {
            name: "pricing".into(),
            source: anyhow::anyhow!("boom"),
        }
        .is_run_fatal());
        assert!(!RunError::MissingRole {
            role: "rewards".into()
        }
        .is_run_fatal());
        let snapshot = RunError::SnapshotWrite {
            source: anyhow::anyhow!("disk full"),
        };
        assert!(!snapshot.is_run_fatal());
        assert_eq!(snapshot.kind(), "snapshot_write");
    }

    #[test]
    fn messages_name_the_model() {
        let err = RunError::UnresolvedModel {
            name: "churn".into(),
        };
        assert_eq!(err.to_string(), "no model unit registered for 'churn'");
    }
}
