//! CSV-backed tables.
//!
//! Every input of a migration run is a CSV export with a header row and
//! string-valued columns, and every output is an append-only CSV ledger.
//! Rows are exposed as column-name → value maps so callers never depend on
//! column order.

use crate::error::{MigrateError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// One table row keyed by header name.
pub type Row = BTreeMap<String, String>;

/// A fully loaded CSV table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Fail unless every listed column is present in the header row.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MissingColumn`] for the first absent column.
    pub fn require_columns(&self, columns: &[&str]) -> Result<()> {
        for column in columns {
            if !self.headers.iter().any(|header| header == column) {
                return Err(MigrateError::MissingColumn {
                    path: self.path.clone(),
                    column: (*column).to_string(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Value of `name` in `row`, or `""` when the column is absent.
#[must_use]
pub fn field<'a>(row: &'a Row, name: &str) -> &'a str {
    row.get(name).map_or("", String::as_str)
}

/// Load a CSV table with a header row.
///
/// Short rows are tolerated; missing trailing cells are simply absent from
/// the row map.
///
/// # Errors
///
/// Returns [`MigrateError::MissingTable`] when the file does not exist and
/// [`MigrateError::Csv`] when it cannot be parsed.
pub fn read_table(path: &Path) -> Result<Table> {
    if !path.is_file() {
        return Err(MigrateError::MissingTable {
            path: path.to_path_buf(),
        });
    }

    let csv_err = |source| MigrateError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }

    tracing::debug!(path = %path.display(), rows = rows.len(), "loaded table");

    Ok(Table {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

/// Write `rows` to `path` in `headers` order, replacing any existing file.
///
/// # Errors
///
/// Returns [`MigrateError::Ledger`] on CSV write failures and
/// [`MigrateError::Io`] when the parent directory cannot be created.
pub fn write_table<'a>(
    path: &Path,
    headers: &[String],
    rows: impl IntoIterator<Item = &'a Row>,
) -> Result<()> {
    ensure_parent(path)?;
    let ledger_err = |source| MigrateError::Ledger {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(ledger_err)?;
    writer.write_record(headers).map_err(ledger_err)?;
    for row in rows {
        writer
            .write_record(headers.iter().map(|header| field(row, header)))
            .map_err(ledger_err)?;
    }
    writer.flush()?;
    Ok(())
}

/// Collect the non-empty values of `column` from an existing table.
///
/// A missing file yields an empty set, so a first run and a resumed run go
/// through the same code path.
///
/// # Errors
///
/// Returns [`MigrateError::Csv`] if the file exists but cannot be parsed.
pub fn read_column_values(path: &Path, column: &str) -> Result<HashSet<String>> {
    if !path.is_file() {
        return Ok(HashSet::new());
    }

    let table = read_table(path)?;
    Ok(table
        .rows
        .iter()
        .map(|row| field(row, column))
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Append-only CSV ledger written one row at a time.
///
/// The file is not touched until the first [`Ledger::append`], so a ledger
/// that never receives a row never exists on disk. Each row is flushed
/// before `append` returns.
pub struct Ledger<T> {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    keep_existing: bool,
    rows: usize,
    _row: PhantomData<fn(&T)>,
}

impl<T: Serialize> Ledger<T> {
    /// A ledger that truncates `path` on first write.
    #[must_use]
    pub fn fresh(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), false)
    }

    /// A ledger that appends below any rows already in `path`.
    #[must_use]
    pub fn resume(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), true)
    }

    fn new(path: PathBuf, keep_existing: bool) -> Self {
        Self {
            path,
            writer: None,
            keep_existing,
            rows: 0,
            _row: PhantomData,
        }
    }

    /// Rows appended by this ledger instance (existing rows not counted).
    #[must_use]
    pub const fn rows_written(&self) -> usize {
        self.rows
    }

    /// Append one row and flush it to disk.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Ledger`] or [`MigrateError::Io`] when the row
    /// cannot be persisted.
    pub fn append(&mut self, row: &T) -> Result<()> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.open()?,
        };
        let writer = self.writer.insert(writer);

        writer.serialize(row).map_err(|source| MigrateError::Ledger {
            path: self.path.clone(),
            source,
        })?;
        writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    fn open(&self) -> Result<csv::Writer<File>> {
        ensure_parent(&self.path)?;

        let has_rows = self.keep_existing
            && fs::metadata(&self.path).is_ok_and(|meta| meta.len() > 0);

        let file = if has_rows {
            OpenOptions::new().append(true).open(&self.path)?
        } else {
            File::create(&self.path)?
        };

        Ok(csv::WriterBuilder::new()
            .has_headers(!has_rows)
            .from_writer(file))
    }
}
