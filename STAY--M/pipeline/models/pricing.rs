use anyhow::Context;

use super::{
    classical::RegressorState,
    features::{labelled_samples, numeric_inputs, pricing_row, schema_of, PRICING_ROW_COLUMNS},
    unit::{Domain, ModelArtifact, ModelUnit, Prediction, Role, TrainingMetrics},
};
use crate::dataset::{Cell, Row, Schema, Table};

const INPUTS: [&str; 5] = ["nights", "guests", "lead_time_days", "base_rate", "month"];

/// Estimates the final nightly price of a booking (`final_price`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingUnit;

impl ModelUnit for PricingUnit {
    fn name(&self) -> &str {
        Role::Pricing.model_name()
    }

    fn domain(&self) -> Domain {
        Domain::Pricing
    }

    fn target_column(&self) -> &str {
        Role::Pricing.column()
    }

    fn feature_columns(&self) -> Schema {
        schema_of(&PRICING_ROW_COLUMNS)
    }

    fn train(&self, window: &Table) -> anyhow::Result<(ModelArtifact, TrainingMetrics)> {
        let (samples, targets) =
            labelled_samples(window, &INPUTS, self.target_column(), Cell::as_f64);
        let (state, metrics) = RegressorState::fit(&INPUTS, &samples, &targets)
            .context("fitting pricing regressor")?;
        Ok((ModelArtifact::new(self.name(), &state)?, metrics))
    }

    fn predict(&self, artifact: &ModelArtifact, record: &Row) -> anyhow::Result<Prediction> {
        let state: RegressorState = artifact.state()?;
        let features = self.build_features(record)?;
        let price = state.predict(&numeric_inputs(&features, &INPUTS));
        anyhow::ensure!(price.is_finite(), "pricing regressor produced {price}");
        Ok(Prediction::Value(price))
    }

    fn build_features(&self, record: &Row) -> anyhow::Result<Row> {
        pricing_row(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_tracks_base_rate() {
        let rows = (0..20)
            .map(|i| {
                let rate = 80.0 + f64::from(i) * 5.0;
                Row::new()
                    .with("nights", 2.0)
                    .with("guests", 2.0)
                    .with("lead_time_days", 14.0)
                    .with("base_rate", rate)
                    .with("checkin_date", "2025-05-10")
                    .with("final_price", rate * 1.1 + 5.0)
            })
            .map(|raw| {
                let mut row = pricing_row(&raw).unwrap();
                row.set("final_price", raw.get("final_price").cloned().unwrap());
                row
            })
            .collect();
        let window = Table {
            schema: schema_of(&PRICING_ROW_COLUMNS).union(&["final_price"]),
            rows,
        };

        let (artifact, metrics) = PricingUnit.train(&window).unwrap();
        assert!(metrics["r2"].as_f64().unwrap() > 0.9);
        let booking = Row::new().with("base_rate", 120.0).with("nights", 2.0);
        let price = PricingUnit
            .predict(&artifact, &booking)
            .unwrap()
            .as_value()
            .unwrap();
        assert!((price - 137.0).abs() < 5.0, "price {price}");
    }

    #[test]
    fn non_numeric_targets_are_ignored() {
        let window = Table {
            schema: Schema::new(["base_rate", "final_price"]),
            rows: vec![Row::new().with("base_rate", 90.0).with("final_price", "n/a")],
        };
        assert!(PricingUnit.train(&window).is_err());
    }
}
