use std::{
    collections::VecDeque,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use super::table::{Cell, Row, Schema, Table, MISSING_MARKER};

/// Errors raised by dataset stores.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Master file does not exist.
    #[error("master dataset {0} does not exist")]
    MissingMaster(PathBuf),
    /// Incoming-record file holds more than one record.
    #[error("incoming record file {path} holds {count} records, expected at most one")]
    TooManyRecords {
        /// Incoming-record file.
        path: PathBuf,
        /// Records found.
        count: usize,
    },
    /// File has no header row.
    #[error("{0} has no header row")]
    MissingHeader(PathBuf),
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV encoding or decoding failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Access to the historical masters and the incoming record.
pub trait DatasetStore: Send + Sync {
    /// Loads the most recent `limit` rows of a master, oldest first.
    fn load_recent_window(&self, master: &Path, limit: usize) -> Result<Table, DatasetError>;

    /// Loads the single incoming record, or `None` when the file is absent or empty.
    fn load_incoming_record(&self, path: &Path) -> Result<Option<Row>, DatasetError>;

    /// Appends one row to a master. New columns widen the master's schema; existing
    /// columns are kept in place.
    fn append_row(&self, master: &Path, row: &Row) -> Result<(), DatasetError>;

    /// Creates a header-only master when none exists. Returns whether a file was created.
    fn ensure_master(&self, master: &Path, schema: &Schema) -> Result<bool, DatasetError>;
}

/// CSV-backed store: one header row, `NA` for missing cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDatasetStore;

impl CsvDatasetStore {
    /// Creates the store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn open_reader(path: &Path) -> Result<(csv::Reader<File>, Schema), DatasetError> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = reader.headers()?.clone();
        if headers.iter().all(|header| header.trim().is_empty()) {
            return Err(DatasetError::MissingHeader(path.to_path_buf()));
        }
        Ok((reader, Schema::new(headers.iter().map(str::trim))))
    }

    fn decode(schema: &Schema, record: &csv::StringRecord) -> Row {
        schema
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let cell = record.get(idx).map_or(Cell::Missing, Cell::parse);
                (column.clone(), cell)
            })
            .collect()
    }

    fn read_table(path: &Path) -> Result<Table, DatasetError> {
        let (mut reader, schema) = Self::open_reader(path)?;
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(Self::decode(&schema, &record?));
        }
        Ok(Table { schema, rows })
    }

    fn write_table(path: &Path, schema: &Schema, rows: &[Row]) -> Result<(), DatasetError> {
        let staging = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&staging)?;
            writer.write_record(schema.columns())?;
            for row in rows {
                writer.write_record(row.fields(schema))?;
            }
            writer.flush()?;
        }
        fs::rename(&staging, path)?;
        Ok(())
    }

    /// Rewrites the master under a wider header. Existing fields are copied through
    /// untouched and only the new columns are padded with `NA`.
    fn widen_and_append(
        master: &Path,
        mut reader: csv::Reader<File>,
        schema: &Schema,
        widened: &Schema,
        row: &Row,
    ) -> Result<(), DatasetError> {
        let staging = master.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&staging)?;
            writer.write_record(widened.columns())?;
            for record in reader.records() {
                let record = record?;
                let mut fields: Vec<&str> = record.iter().take(schema.len()).collect();
                fields.resize(widened.len(), MISSING_MARKER);
                writer.write_record(&fields)?;
            }
            writer.write_record(row.fields(widened))?;
            writer.flush()?;
        }
        drop(reader);
        fs::rename(&staging, master)?;
        Ok(())
    }

    fn ends_with_newline(file: &mut File) -> Result<bool, DatasetError> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(true);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0_u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }
}

impl DatasetStore for CsvDatasetStore {
    fn load_recent_window(&self, master: &Path, limit: usize) -> Result<Table, DatasetError> {
        if !master.exists() {
            return Err(DatasetError::MissingMaster(master.to_path_buf()));
        }
        let (mut reader, schema) = Self::open_reader(master)?;
        let mut window = VecDeque::with_capacity(limit.min(4096));
        for record in reader.records() {
            let row = Self::decode(&schema, &record?);
            if window.len() == limit {
                window.pop_front();
            }
            if limit > 0 {
                window.push_back(row);
            }
        }
        Ok(Table {
            schema,
            rows: window.into(),
        })
    }

    fn load_incoming_record(&self, path: &Path) -> Result<Option<Row>, DatasetError> {
        if !path.exists() {
            return Ok(None);
        }
        let table = Self::read_table(path)?;
        match table.rows.len() {
            0 => Ok(None),
            1 => Ok(table.rows.into_iter().next()),
            count => Err(DatasetError::TooManyRecords {
                path: path.to_path_buf(),
                count,
            }),
        }
    }

    fn append_row(&self, master: &Path, row: &Row) -> Result<(), DatasetError> {
        if !master.exists() {
            if let Some(parent) = master.parent() {
                fs::create_dir_all(parent)?;
            }
            let schema = Schema::new(row.columns());
            return Self::write_table(master, &schema, std::slice::from_ref(row));
        }

        let (reader, schema) = Self::open_reader(master)?;
        let added = row.columns_outside(&schema);
        if !added.is_empty() {
            return Self::widen_and_append(master, reader, &schema, &schema.union(&added), row);
        }

        let mut file = OpenOptions::new().read(true).append(true).open(master)?;
        let needs_newline = !Self::ends_with_newline(&mut file)?;
        if needs_newline {
            file.write_all(b"\n")?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(row.fields(&schema))?;
        writer.flush()?;
        Ok(())
    }

    fn ensure_master(&self, master: &Path, schema: &Schema) -> Result<bool, DatasetError> {
        if master.exists() {
            return Ok(false);
        }
        if let Some(parent) = master.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::write_table(master, schema, &[])?;
        Ok(true)
    }
}
