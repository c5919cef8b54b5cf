//! Tabular rows, schemas, and the master/incoming-record store.

/// Cells, rows, schemas and tables.
pub mod table;
/// Dataset store contract and its CSV implementation.
pub mod store;

pub use store::{CsvDatasetStore, DatasetError, DatasetStore};
pub use table::{Cell, Row, Schema, Table, MISSING_MARKER};
