use anyhow::Context;

use super::{
    classical::ClassifierState,
    features::{labelled_samples, numeric_inputs, occupancy_row, schema_of, OCCUPANCY_ROW_COLUMNS},
    unit::{Domain, ModelArtifact, ModelUnit, Prediction, Role, TrainingMetrics},
};
use crate::dataset::{Cell, Row, Schema, Table};

const INPUTS: [&str; 5] = ["lead_time_days", "nights", "guests", "day_of_week", "month"];

/// Classifies a booking's expected occupancy level (`occ_class`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OccupancyUnit;

impl ModelUnit for OccupancyUnit {
    fn name(&self) -> &str {
        Role::Occupancy.model_name()
    }

    fn domain(&self) -> Domain {
        Domain::Occupancy
    }

    fn target_column(&self) -> &str {
        Role::Occupancy.column()
    }

    fn feature_columns(&self) -> Schema {
        schema_of(&OCCUPANCY_ROW_COLUMNS)
    }

    fn train(&self, window: &Table) -> anyhow::Result<(ModelArtifact, TrainingMetrics)> {
        let (samples, labels) =
            labelled_samples(window, &INPUTS, self.target_column(), Cell::as_label);
        let (state, metrics) = ClassifierState::fit(&INPUTS, &samples, &labels)
            .context("fitting occupancy classifier")?;
        Ok((ModelArtifact::new(self.name(), &state)?, metrics))
    }

    fn predict(&self, artifact: &ModelArtifact, record: &Row) -> anyhow::Result<Prediction> {
        let state: ClassifierState = artifact.state()?;
        let features = self.build_features(record)?;
        state
            .predict(&numeric_inputs(&features, &INPUTS))
            .map(Prediction::Label)
            .context("occupancy classifier has no classes")
    }

    fn build_features(&self, record: &Row) -> anyhow::Result<Row> {
        occupancy_row(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Table {
        let rows = [
            (5.0, 1.0, 1.0, "2025-01-07", "low"),
            (7.0, 2.0, 1.0, "2025-01-14", "low"),
            (3.0, 1.0, 2.0, "2025-02-04", "low"),
            (60.0, 5.0, 4.0, "2025-07-12", "high"),
            (75.0, 6.0, 3.0, "2025-08-09", "high"),
            (90.0, 7.0, 4.0, "2025-07-19", "high"),
        ]
        .into_iter()
        .map(|(lead, nights, guests, date, class)| {
            let mut row = occupancy_row(
                &Row::new()
                    .with("checkin_date", date)
                    .with("lead_time_days", lead)
                    .with("nights", nights)
                    .with("guests", guests),
            )
            .unwrap();
            row.set("occ_class", class);
            row
        })
        .collect();
        Table {
            schema: schema_of(&OCCUPANCY_ROW_COLUMNS).union(&["occ_class"]),
            rows,
        }
    }

    #[test]
    fn trains_and_predicts_high_season_booking() {
        let unit = OccupancyUnit;
        let (artifact, metrics) = unit.train(&window()).unwrap();
        assert_eq!(artifact.model, "occupancy");
        assert!(metrics.contains_key("accuracy"));
        assert_eq!(metrics["n_train"], serde_json::json!(5));

        let booking = Row::new()
            .with("checkin_date", "2025-07-26")
            .with("lead_time_days", 80.0)
            .with("nights", 6.0)
            .with("guests", 4.0);
        let prediction = unit.predict(&artifact, &booking).unwrap();
        assert_eq!(prediction, Prediction::Label("high".into()));
    }

    #[test]
    fn refuses_to_train_without_labels() {
        let mut table = window();
        for row in &mut table.rows {
            row.set("occ_class", Cell::Missing);
        }
        assert!(OccupancyUnit.train(&table).is_err());
    }
}
