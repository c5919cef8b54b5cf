use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// On-disk spelling of [`Cell::Missing`].
pub const MISSING_MARKER: &str = "NA";

/// A single value in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// No value. Distinct from zero and from the empty string.
    Missing,
    /// Numeric value.
    Number(f64),
    /// Free text (labels, dates, categories).
    Text(String),
}

impl Cell {
    /// Decodes a raw field: exactly `NA` is missing, finite numbers are numeric, anything
    /// else (the empty string included) is kept verbatim as text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw == MISSING_MARKER {
            return Self::Missing;
        }
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Number(value),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Encodes the cell as a CSV field.
    #[must_use]
    pub fn to_field(&self) -> String {
        match self {
            Self::Missing => MISSING_MARKER.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }

    /// Whether the cell holds no value.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Numeric view of the cell.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Label view of the cell; numbers are rendered as text, blank text is no label.
    #[must_use]
    pub fn as_label(&self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Number(value) => Some(value.to_string()),
            Self::Text(text) if text.trim().is_empty() => None,
            Self::Text(text) => Some(text.clone()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_field())
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordered set of column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Vec<String>);

impl Schema {
    /// Builds a schema, keeping the first occurrence of repeated names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::default();
        for column in columns {
            schema.push(column);
        }
        schema
    }

    /// Appends a column unless it is already present. Returns whether it was added.
    pub fn push(&mut self, column: impl Into<String>) -> bool {
        let column = column.into();
        if self.contains(&column) {
            false
        } else {
            self.0.push(column);
            true
        }
    }

    /// This schema followed by every column of `extra` not already in it.
    #[must_use]
    pub fn union<S: AsRef<str>>(&self, extra: &[S]) -> Self {
        let mut merged = self.clone();
        for column in extra {
            merged.push(column.as_ref());
        }
        merged
    }

    /// Whether the column exists.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.0.iter().any(|existing| existing == column)
    }

    /// Columns in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.0
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A named-column row. Column order follows insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(IndexMap<String, Cell>);

impl Row {
    /// Empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or replaces) a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Cell>) {
        self.0.insert(column.into(), value.into());
    }

    /// Builder-style [`Row::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.set(column, value);
        self
    }

    /// Raw cell lookup.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.0.get(column)
    }

    /// Numeric value of a column, if present and numeric.
    #[must_use]
    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Cell::as_f64)
    }

    /// Text value of a column, if present and textual.
    #[must_use]
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.get(column) {
            Some(Cell::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Column names in row order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the row carries no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Projects the row onto `schema`: target order first, absent columns become
    /// [`Cell::Missing`], columns outside the schema are dropped.
    #[must_use]
    pub fn align(&self, schema: &Schema) -> Self {
        let mut aligned = IndexMap::with_capacity(schema.len());
        for column in schema.columns() {
            let cell = self.0.get(column).cloned().unwrap_or(Cell::Missing);
            aligned.insert(column.clone(), cell);
        }
        Self(aligned)
    }

    /// Columns this row has that `schema` does not.
    #[must_use]
    pub fn columns_outside(&self, schema: &Schema) -> Vec<String> {
        self.columns()
            .filter(|column| !schema.contains(column))
            .map(ToOwned::to_owned)
            .collect()
    }

    /// Cells in `schema` order as CSV fields.
    #[must_use]
    pub fn fields(&self, schema: &Schema) -> Vec<String> {
        schema
            .columns()
            .iter()
            .map(|column| self.0.get(column).map_or_else(|| MISSING_MARKER.to_string(), Cell::to_field))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// A schema plus rows, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Column order shared by every row.
    pub schema: Schema,
    /// Rows aligned to `schema`.
    pub rows: Vec<Row>,
}

impl Table {
    /// Creates a table with no rows.
    #[must_use]
    pub fn empty(schema: Schema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_distinguishes_missing_numbers_and_text() {
        assert_eq!(Cell::parse("NA"), Cell::Missing);
        assert_eq!(Cell::parse(""), Cell::Text(String::new()));
        assert_eq!(Cell::parse(" gold "), Cell::Text(" gold ".into()));
        assert_eq!(Cell::parse(""), Cell::parse(&Cell::Text(String::new()).to_field()));
        assert_eq!(Cell::parse("").as_label(), None);
        assert_eq!(Cell::parse("129.50"), Cell::Number(129.5));
        assert_eq!(Cell::parse("0"), Cell::Number(0.0));
        assert_eq!(Cell::parse("gold"), Cell::Text("gold".into()));
        assert_eq!(Cell::parse("NaN"), Cell::Text("NaN".into()));
        assert_eq!(Cell::Missing.to_field(), "NA");
        assert_eq!(Cell::Number(3.0).to_field(), "3");
    }

    #[test]
    fn union_appends_only_new_columns() {
        let schema = Schema::new(["a", "b", "occ_class"]);
        let merged = schema.union(&["occ_class", "z"]);
        assert_eq!(merged.columns(), &["a", "b", "occ_class", "z"]);
    }

    #[test]
    fn align_fills_missing_and_drops_extras() {
        let row = Row::new()
            .with("nights", 3.0)
            .with("scratch", "x")
            .with("occ_class", "high");
        let schema = Schema::new(["guests", "nights", "occ_class"]);
        let aligned = row.align(&schema);
        assert_eq!(aligned.columns().collect::<Vec<_>>(), ["guests", "nights", "occ_class"]);
        assert_eq!(aligned.get("guests"), Some(&Cell::Missing));
        assert_eq!(aligned.number("nights"), Some(3.0));
        assert_eq!(row.columns_outside(&schema), vec!["scratch".to_string()]);
        assert_eq!(aligned.fields(&schema), vec!["NA", "3", "high"]);
    }

    #[test]
    fn missing_serializes_as_null() {
        let row = Row::new().with("a", Cell::Missing).with("b", 1.5);
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"a":null,"b":1.5}"#);
    }
}
