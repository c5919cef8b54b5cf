use anyhow::ensure;
use chrono::{Datelike, NaiveDate};

use crate::dataset::{Cell, Row, Schema, Table};

/// Columns of an occupancy-domain feature row.
pub const OCCUPANCY_ROW_COLUMNS: [&str; 7] = [
    "checkin_date",
    "room_type",
    "lead_time_days",
    "nights",
    "guests",
    "day_of_week",
    "month",
];

/// Columns of a pricing-domain feature row.
pub const PRICING_ROW_COLUMNS: [&str; 9] = [
    "checkin_date",
    "room_type",
    "loyalty_tier",
    "lead_time_days",
    "nights",
    "guests",
    "base_rate",
    "loyalty_points",
    "month",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Day of week (Monday = 0) and month derived from `checkin_date`. Falls back to
/// the record's own `day_of_week` / `month` cells when the date is absent or malformed.
fn calendar(record: &Row) -> (Cell, Cell) {
    let parsed = record
        .text("checkin_date")
        .and_then(|raw| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok());
    match parsed {
        Some(date) => (
            Cell::Number(f64::from(date.weekday().num_days_from_monday())),
            Cell::Number(f64::from(date.month())),
        ),
        None => (copy(record, "day_of_week"), copy(record, "month")),
    }
}

fn copy(record: &Row, column: &str) -> Cell {
    record.get(column).cloned().unwrap_or(Cell::Missing)
}

fn build(record: &Row, columns: &[&str]) -> anyhow::Result<Row> {
    let (day_of_week, month) = calendar(record);
    let mut row = Row::new();
    for column in columns {
        let cell = match *column {
            "day_of_week" => day_of_week.clone(),
            "month" => month.clone(),
            other => copy(record, other),
        };
        row.set(*column, cell);
    }
    let populated = columns
        .iter()
        .filter(|column| row.get(column).is_some_and(|cell| !cell.is_missing()))
        .count();
    ensure!(
        populated > 0,
        "incoming record carries none of the expected columns {columns:?}"
    );
    Ok(row)
}

/// Occupancy feature row for a raw booking.
pub fn occupancy_row(record: &Row) -> anyhow::Result<Row> {
    build(record, &OCCUPANCY_ROW_COLUMNS)
}

/// Pricing feature row for a raw booking.
pub fn pricing_row(record: &Row) -> anyhow::Result<Row> {
    build(record, &PRICING_ROW_COLUMNS)
}

/// Schema for a list of row columns.
#[must_use]
pub fn schema_of(columns: &[&str]) -> Schema {
    Schema::new(columns.iter().copied())
}

/// Numeric model inputs, `None` where the cell is missing or not numeric.
#[must_use]
pub fn numeric_inputs(row: &Row, inputs: &[&str]) -> Vec<Option<f64>> {
    inputs.iter().map(|column| row.number(column)).collect()
}

/// Training samples from window rows whose target is set.
pub fn labelled_samples<L>(
    window: &Table,
    inputs: &[&str],
    target: &str,
    label: impl Fn(&Cell) -> Option<L>,
) -> (Vec<Vec<Option<f64>>>, Vec<L>) {
    window
        .rows
        .iter()
        .filter_map(|row| {
            let value = row.get(target).and_then(&label)?;
            Some((numeric_inputs(row, inputs), value))
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking() -> Row {
        Row::new()
            .with("checkin_date", "2025-07-14")
            .with("room_type", "deluxe")
            .with("nights", 3.0)
            .with("guests", 2.0)
            .with("lead_time_days", 21.0)
            .with("base_rate", 110.0)
            .with("loyalty_tier", "silver")
            .with("notes", "late arrival")
    }

    #[test]
    fn occupancy_row_derives_calendar_fields() {
        let row = occupancy_row(&booking()).unwrap();
        assert_eq!(row.columns().collect::<Vec<_>>(), OCCUPANCY_ROW_COLUMNS);
        assert_eq!(row.number("day_of_week"), Some(0.0));
        assert_eq!(row.number("month"), Some(7.0));
        assert!(row.get("notes").is_none());
    }

    #[test]
    fn pricing_row_marks_absent_inputs_missing() {
        let row = pricing_row(&booking()).unwrap();
        assert_eq!(row.get("loyalty_points"), Some(&Cell::Missing));
        assert_eq!(row.text("loyalty_tier"), Some("silver"));
        assert_eq!(row.number("base_rate"), Some(110.0));
    }

    #[test]
    fn unrelated_record_is_rejected() {
        let record = Row::new().with("comment", "hello");
        assert!(occupancy_row(&record).is_err());
    }

    #[test]
    fn labelled_samples_skip_unlabelled_rows() {
        let window = Table {
            schema: Schema::new(["nights", "occ_class"]),
            rows: vec![
                Row::new().with("nights", 1.0).with("occ_class", "low"),
                Row::new().with("nights", 2.0).with("occ_class", Cell::Missing),
                Row::new().with("nights", Cell::Missing).with("occ_class", "high"),
            ],
        };
        let (samples, labels) = labelled_samples(&window, &["nights"], "occ_class", Cell::as_label);
        assert_eq!(labels, vec!["low".to_string(), "high".to_string()]);
        assert_eq!(samples, vec![vec![Some(1.0)], vec![None]]);
    }
}
