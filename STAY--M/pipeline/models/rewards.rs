use anyhow::Context;

use super::{
    classical::ClassifierState,
    features::{labelled_samples, numeric_inputs, pricing_row, schema_of, PRICING_ROW_COLUMNS},
    unit::{Domain, ModelArtifact, ModelUnit, Prediction, Role, TrainingMetrics},
};
use crate::dataset::{Cell, Row, Schema, Table};

const INPUTS: [&str; 5] = ["nights", "guests", "lead_time_days", "base_rate", "loyalty_points"];

/// Classifies the loyalty points tier a booking earns (`points_class`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardsUnit;

impl ModelUnit for RewardsUnit {
    fn name(&self) -> &str {
        Role::Rewards.model_name()
    }

    fn domain(&self) -> Domain {
        Domain::Pricing
    }

    fn target_column(&self) -> &str {
        Role::Rewards.column()
    }

    fn feature_columns(&self) -> Schema {
        schema_of(&PRICING_ROW_COLUMNS)
    }

    fn train(&self, window: &Table) -> anyhow::Result<(ModelArtifact, TrainingMetrics)> {
        let (samples, labels) =
            labelled_samples(window, &INPUTS, self.target_column(), Cell::as_label);
        let (state, metrics) = ClassifierState::fit(&INPUTS, &samples, &labels)
            .context("fitting rewards classifier")?;
        Ok((ModelArtifact::new(self.name(), &state)?, metrics))
    }

    fn predict(&self, artifact: &ModelArtifact, record: &Row) -> anyhow::Result<Prediction> {
        let state: ClassifierState = artifact.state()?;
        let features = self.build_features(record)?;
        state
            .predict(&numeric_inputs(&features, &INPUTS))
            .map(Prediction::Label)
            .context("rewards classifier has no classes")
    }

    fn build_features(&self, record: &Row) -> anyhow::Result<Row> {
        pricing_row(record)
    }
}
