use std::fmt;

use anyhow::Context;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    cache::ArtifactCache,
    dataset::{Cell, Row, Schema, Table},
};

/// Metric name to value, in the order the unit reported them.
pub type TrainingMetrics = IndexMap<String, Value>;

/// Historical dataset a model trains on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Occupancy master.
    Occupancy,
    /// Pricing master.
    Pricing,
}

impl Domain {
    /// Both domains, occupancy first.
    pub const ALL: [Self; 2] = [Self::Occupancy, Self::Pricing];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Occupancy => "occupancy",
            Self::Pricing => "pricing",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prediction responsibilities the scoring phase requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Occupancy classifier.
    Occupancy,
    /// Rewards / points classifier.
    Rewards,
    /// Price regressor.
    Pricing,
}

impl Role {
    /// Every role in scoring order.
    pub const ALL: [Self; 3] = [Self::Occupancy, Self::Rewards, Self::Pricing];

    /// Model name that fills the role.
    #[must_use]
    pub const fn model_name(self) -> &'static str {
        match self {
            Self::Occupancy => "occupancy",
            Self::Rewards => "rewards",
            Self::Pricing => "pricing",
        }
    }

    /// Column the role's prediction is written to.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Occupancy => "occ_class",
            Self::Rewards => "points_class",
            Self::Pricing => "final_price",
        }
    }
}

/// Trained model owned by the orchestrator for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Model name.
    pub model: String,
    /// Fresh for every training.
    pub id: Uuid,
    /// When the artifact was trained.
    pub trained_at: DateTime<Utc>,
    /// Unit-specific model state.
    pub payload: Value,
}

impl ModelArtifact {
    /// Wraps a serializable model state in a new artifact.
    pub fn new(model: impl Into<String>, state: &impl Serialize) -> anyhow::Result<Self> {
        Ok(Self {
            model: model.into(),
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            payload: serde_json::to_value(state).context("encoding model state")?,
        })
    }

    /// Decodes the unit-specific model state.
    pub fn state<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(self.payload.clone())
            .with_context(|| format!("decoding '{}' artifact {}", self.model, self.id))
    }
}

/// A single scored outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    /// Class label.
    Label(String),
    /// Numeric estimate.
    Value(f64),
}

impl Prediction {
    /// Label view.
    #[must_use]
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(label) => Some(label),
            Self::Value(_) => None,
        }
    }

    /// Numeric view.
    #[must_use]
    pub const fn as_value(&self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(*value),
            Self::Label(_) => None,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => f.write_str(label),
            Self::Value(value) => write!(f, "{value:.2}"),
        }
    }
}

impl From<Prediction> for Cell {
    fn from(prediction: Prediction) -> Self {
        match prediction {
            Prediction::Label(label) => Self::Text(label),
            Prediction::Value(value) => Self::Number(value),
        }
    }
}

/// Pluggable training, scoring and feature building for one named model.
pub trait ModelUnit: Send + Sync {
    /// Registered model name.
    fn name(&self) -> &str;

    /// Master the unit trains on.
    fn domain(&self) -> Domain;

    /// Column holding the training label.
    fn target_column(&self) -> &str;

    /// Columns [`ModelUnit::build_features`] emits, in order.
    fn feature_columns(&self) -> Schema;

    /// Fits a fresh model on the window.
    fn train(&self, window: &Table) -> anyhow::Result<(ModelArtifact, TrainingMetrics)>;

    /// Scores a raw incoming record.
    fn predict(&self, artifact: &ModelArtifact, record: &Row) -> anyhow::Result<Prediction>;

    /// Builds the domain feature row for a raw incoming record.
    fn build_features(&self, record: &Row) -> anyhow::Result<Row>;

    /// Trains and stores the result as the cached "latest" artifact.
    fn train_and_save(
        &self,
        window: &Table,
        cache: &ArtifactCache,
    ) -> anyhow::Result<(ModelArtifact, TrainingMetrics)> {
        let (artifact, metrics) = self.train(window)?;
        cache
            .store(self.name(), &artifact)
            .with_context(|| format!("caching fresh '{}' artifact", self.name()))?;
        Ok((artifact, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_map_to_names_and_columns() {
        assert_eq!(Role::Occupancy.model_name(), "occupancy");
        assert_eq!(Role::Rewards.column(), "points_class");
        assert_eq!(Role::Pricing.column(), "final_price");
        assert_eq!(Domain::Pricing.to_string(), "pricing");
    }

    #[test]
    fn artifact_state_round_trips() {
        let artifact = ModelArtifact::new("pricing", &json!({ "bias": 1.5 })).unwrap();
        let state: Value = artifact.state().unwrap();
        assert_eq!(state["bias"], json!(1.5));
        let other = ModelArtifact::new("pricing", &json!({ "bias": 1.5 })).unwrap();
        assert_ne!(artifact.id, other.id);
    }

    #[test]
    fn predictions_render_and_convert() {
        assert_eq!(Prediction::Value(129.5).to_string(), "129.50");
        assert_eq!(Cell::from(Prediction::Label("gold".into())), Cell::Text("gold".into()));
        assert_eq!(Prediction::Value(1.0).as_label(), None);
    }
}
