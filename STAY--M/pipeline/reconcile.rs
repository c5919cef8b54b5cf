use crate::dataset::{Cell, Row, Schema};

/// A feature row extended with prediction columns and aligned to its master.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRow {
    /// Window schema followed by any prediction column it lacked.
    pub schema: Schema,
    /// Row aligned to `schema`.
    pub row: Row,
    /// Feature columns the master does not carry; they are not written.
    pub dropped: Vec<String>,
}

/// Writes `predictions` into `features` and aligns the result to `window`
/// extended with the prediction columns.
#[must_use]
pub fn reconcile_row(features: &Row, window: &Schema, predictions: Vec<(&str, Cell)>) -> ReconciledRow {
    let mut row = features.clone();
    let mut columns = Vec::with_capacity(predictions.len());
    for (column, cell) in predictions {
        columns.push(column);
        row.set(column, cell);
    }
    let schema = window.union(&columns);
    let dropped = row.columns_outside(&schema);
    ReconciledRow {
        row: row.align(&schema),
        schema,
        dropped,
    }
}
