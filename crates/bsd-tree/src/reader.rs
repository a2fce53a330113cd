//! Spill table reader.
//!
//! Loads a whole Parquet spill table into memory and exposes it as a
//! random-access row source: entry count, field access by name, min/max
//! scans over integer fields, and the acquisition start/stop times.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::compute;
use arrow::datatypes::{DataType, Float64Type, Int32Type, Int64Type};
use bsd_common::spill::{
    HornTable, ProtonTable, CT_NP_COLS, CT_NP_ROWS, HCT_COLS, HCT_ROWS, MUMON_CHANNELS,
};
use bsd_common::{FormatVersion, SpillBeam, SpillRecord};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use thiserror::Error;

use crate::schema::{columns, metadata_keys, required_columns, CT_NP_LEN, HCT_LEN};

/// Errors from spill table reads.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("spill table not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("{} is not a Parquet spill table: {message}", path.display())]
    NotATable { path: PathBuf, message: String },

    #[error("{} has no spill table for DIF {dif}: {message}", path.display())]
    MissingTable {
        path: PathBuf,
        dif: u32,
        message: String,
    },

    #[error("failed to read {} at entry {entry}: {message}", path.display())]
    Read {
        path: PathBuf,
        entry: usize,
        message: String,
    },
}

impl From<TableError> for bsd_common::Error {
    fn from(err: TableError) -> Self {
        match err {
            TableError::NotFound { path } | TableError::NotATable { path, .. } => {
                bsd_common::Error::InputNotFound { path }
            }
            TableError::MissingTable { path, dif, message } => {
                bsd_common::Error::StreamOpen { path, dif, message }
            }
            TableError::Read {
                path,
                entry,
                message,
            } => bsd_common::Error::StreamRead {
                path,
                entry,
                message,
            },
        }
    }
}

/// An opened spill table scoped to one DIF.
#[derive(Debug)]
pub struct SpillTable {
    path: PathBuf,
    dif: u32,
    declared_version: String,
    start_time: Option<i64>,
    stop_time: Option<i64>,
    batch: RecordBatch,
}

impl SpillTable {
    /// Open the spill table at `path` for `dif`.
    ///
    /// Fails with [`TableError::NotFound`] / [`TableError::NotATable`] when
    /// the file is missing or unreadable as Parquet, and with
    /// [`TableError::MissingTable`] when it lacks the version tag, is scoped
    /// to another DIF or carries unparseable acquisition times.
    pub fn open(path: &Path, dif: u32) -> Result<Self, TableError> {
        if !path.is_file() {
            return Err(TableError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let not_a_table = |message: String| TableError::NotATable {
            path: path.to_path_buf(),
            message,
        };
        let missing = |message: String| TableError::MissingTable {
            path: path.to_path_buf(),
            dif,
            message,
        };

        let file = File::open(path).map_err(|e| not_a_table(e.to_string()))?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| not_a_table(e.to_string()))?;

        let lookup = |key: &str| -> Option<String> {
            if let Some(value) = builder.schema().metadata().get(key) {
                return Some(value.clone());
            }
            builder
                .metadata()
                .file_metadata()
                .key_value_metadata()
                .and_then(|kvs| kvs.iter().find(|kv| kv.key == key))
                .and_then(|kv| kv.value.clone())
        };

        let declared_version = lookup(metadata_keys::VERSION)
            .ok_or_else(|| missing(format!("missing {} metadata", metadata_keys::VERSION)))?;
        let table_dif: u32 = lookup(metadata_keys::DIF)
            .ok_or_else(|| missing(format!("missing {} metadata", metadata_keys::DIF)))?
            .trim()
            .parse()
            .map_err(|e| missing(format!("invalid {} metadata: {e}", metadata_keys::DIF)))?;
        if table_dif != dif {
            return Err(missing(format!("table is scoped to DIF {table_dif}")));
        }
        let time = |key: &str| -> Result<Option<i64>, TableError> {
            lookup(key)
                .map(|v| v.trim().parse::<i64>())
                .transpose()
                .map_err(|e| missing(format!("invalid {key} metadata: {e}")))
        };
        let start_time = time(metadata_keys::START_TIME)?;
        let stop_time = time(metadata_keys::STOP_TIME)?;

        let schema = builder.schema().clone();
        let reader = builder.build().map_err(|e| missing(e.to_string()))?;
        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TableError::Read {
                path: path.to_path_buf(),
                entry: 0,
                message: e.to_string(),
            })?;
        let batch = compute::concat_batches(&schema, &batches).map_err(|e| TableError::Read {
            path: path.to_path_buf(),
            entry: 0,
            message: e.to_string(),
        })?;

        tracing::debug!(
            path = %path.display(),
            dif,
            entries = batch.num_rows(),
            version = %declared_version,
            "opened spill table"
        );

        Ok(SpillTable {
            path: path.to_path_buf(),
            dif,
            declared_version,
            start_time,
            stop_time,
            batch,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dif(&self) -> u32 {
        self.dif
    }

    /// The raw format tag from the file metadata.
    pub fn declared_version(&self) -> &str {
        &self.declared_version
    }

    /// Number of rows.
    pub fn entries(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.batch.column_by_name(field).is_some()
    }

    /// Check that every column the version's rule set reads is present.
    pub fn require_columns(&self, version: FormatVersion) -> Result<(), TableError> {
        let missing: Vec<&str> = required_columns(version)
            .iter()
            .copied()
            .filter(|name| !self.has_field(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TableError::MissingTable {
                path: self.path.clone(),
                dif: self.dif,
                message: format!("{version} table lacks columns: {}", missing.join(", ")),
            })
        }
    }

    fn read_error(&self, entry: usize, message: impl Into<String>) -> TableError {
        TableError::Read {
            path: self.path.clone(),
            entry,
            message: message.into(),
        }
    }

    fn column(&self, field: &str, entry: usize) -> Result<&ArrayRef, TableError> {
        let column = self
            .batch
            .column_by_name(field)
            .ok_or_else(|| self.read_error(entry, format!("no field named {field}")))?;
        if entry >= column.len() {
            return Err(self.read_error(entry, format!("entry out of range ({})", column.len())));
        }
        if column.is_null(entry) {
            return Err(self.read_error(entry, format!("{field} is null")));
        }
        Ok(column)
    }

    /// Integer field value of one entry.
    pub fn get_i64(&self, field: &str, entry: usize) -> Result<i64, TableError> {
        let column = self.column(field, entry)?;
        match column.data_type() {
            DataType::Int32 => Ok(i64::from(column.as_primitive::<Int32Type>().value(entry))),
            DataType::Int64 => Ok(column.as_primitive::<Int64Type>().value(entry)),
            other => Err(self.read_error(entry, format!("{field} is {other}, not an integer"))),
        }
    }

    fn get_i32(&self, field: &str, entry: usize) -> Result<i32, TableError> {
        let value = self.get_i64(field, entry)?;
        i32::try_from(value)
            .map_err(|_| self.read_error(entry, format!("{field}={value} overflows i32")))
    }

    /// Cells of a list-valued field for one entry, row-major.
    pub fn get_f64_cells(&self, field: &str, entry: usize) -> Result<Vec<f64>, TableError> {
        let column = self.column(field, entry)?;
        let cell: ArrayRef = if let Some(list) = column.as_fixed_size_list_opt() {
            list.value(entry)
        } else if let Some(list) = column.as_list_opt::<i32>() {
            list.value(entry)
        } else {
            return Err(self.read_error(
                entry,
                format!("{field} is {}, not a list", column.data_type()),
            ));
        };
        let values = cell
            .as_primitive_opt::<Float64Type>()
            .ok_or_else(|| self.read_error(entry, format!("{field} cells are not float64")))?;
        if values.null_count() > 0 {
            return Err(self.read_error(entry, format!("{field} has null cells")));
        }
        Ok(values.values().to_vec())
    }

    fn int_extreme(&self, field: &str, max: bool) -> Result<Option<i64>, TableError> {
        let column = self
            .batch
            .column_by_name(field)
            .ok_or_else(|| self.read_error(0, format!("no field named {field}")))?;
        match column.data_type() {
            DataType::Int32 => {
                let array = column.as_primitive::<Int32Type>();
                let value = if max { compute::max(array) } else { compute::min(array) };
                Ok(value.map(i64::from))
            }
            DataType::Int64 => {
                let array = column.as_primitive::<Int64Type>();
                Ok(if max { compute::max(array) } else { compute::min(array) })
            }
            other => Err(self.read_error(0, format!("{field} is {other}, not an integer"))),
        }
    }

    /// Largest value of an integer field, `None` for an empty table.
    pub fn maximum(&self, field: &str) -> Result<Option<i64>, TableError> {
        self.int_extreme(field, true)
    }

    /// Smallest value of an integer field, `None` for an empty table.
    pub fn minimum(&self, field: &str) -> Result<Option<i64>, TableError> {
        self.int_extreme(field, false)
    }

    /// Acquisition start: the metadata value, else the first entry's trigger time.
    pub fn start_time(&self) -> Result<Option<i64>, TableError> {
        if self.start_time.is_some() || self.entries() == 0 {
            return Ok(self.start_time);
        }
        self.get_i64(columns::TRG_SEC, 0).map(Some)
    }

    /// Acquisition stop: the metadata value, else the last entry's trigger time.
    pub fn stop_time(&self) -> Result<Option<i64>, TableError> {
        if self.stop_time.is_some() || self.entries() == 0 {
            return Ok(self.stop_time);
        }
        self.get_i64(columns::TRG_SEC, self.entries() - 1).map(Some)
    }

    /// Decode one entry as a spill record of the given version.
    pub fn record(&self, entry: usize, version: FormatVersion) -> Result<SpillRecord, TableError> {
        let ct_np: ProtonTable =
            self.table::<CT_NP_ROWS, CT_NP_COLS>(columns::CT_NP, entry, CT_NP_LEN)?;
        let beam = match version {
            FormatVersion::V01 => SpillBeam::V01 {
                good_spill_flag: self.get_i32(columns::GOOD_SPILL_FLAG, entry)?,
                ct_np,
            },
            FormatVersion::P06 => {
                let hct: HornTable =
                    self.table::<HCT_ROWS, HCT_COLS>(columns::HCT, entry, HCT_LEN)?;
                let cells = self.get_f64_cells(columns::MUMON, entry)?;
                let mumon: [f64; MUMON_CHANNELS] = cells.try_into().map_err(|cells: Vec<f64>| {
                    self.read_error(
                        entry,
                        format!("mumon has {} cells, expected {MUMON_CHANNELS}", cells.len()),
                    )
                })?;
                SpillBeam::P06 {
                    spill_flag: self.get_i32(columns::SPILL_FLAG, entry)?,
                    run_type: self.get_i32(columns::RUN_TYPE, entry)?,
                    ct_np,
                    hct,
                    mumon,
                }
            }
        };
        Ok(SpillRecord {
            spill_number: self.get_i32(columns::SPILLNUM, entry)?,
            spill_count: self.get_i32(columns::SPILL_COUNT, entry)?,
            trigger_seconds: self.get_i64(columns::TRG_SEC, entry)?,
            beam,
        })
    }

    /// Iterate over all entries in row order.
    pub fn records(
        &self,
        version: FormatVersion,
    ) -> impl Iterator<Item = Result<SpillRecord, TableError>> + '_ {
        (0..self.entries()).map(move |entry| self.record(entry, version))
    }

    fn table<const R: usize, const C: usize>(
        &self,
        field: &str,
        entry: usize,
        len: usize,
    ) -> Result<[[f64; C]; R], TableError> {
        let cells = self.get_f64_cells(field, entry)?;
        if cells.len() != len {
            return Err(self.read_error(
                entry,
                format!("{field} has {} cells, expected {len}", cells.len()),
            ));
        }
        let mut table = [[0.0; C]; R];
        for (row, chunk) in table.iter_mut().zip(cells.chunks_exact(C)) {
            row.copy_from_slice(chunk);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = SpillTable::open(&dir.path().join("absent.parquet"), 0).unwrap_err();
        assert!(matches!(err, TableError::NotFound { .. }));
    }

    #[test]
    fn test_open_non_parquet_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.parquet");
        std::fs::write(&path, b"this is not parquet").unwrap();
        let err = SpillTable::open(&path, 0).unwrap_err();
        assert!(matches!(err, TableError::NotATable { .. }));
        assert!(matches!(
            bsd_common::Error::from(err),
            bsd_common::Error::InputNotFound { .. }
        ));
    }

    #[test]
    fn test_read_error_maps_to_stream_read() {
        let err = TableError::Read {
            path: PathBuf::from("x.parquet"),
            entry: 4,
            message: "null".into(),
        };
        match bsd_common::Error::from(err) {
            bsd_common::Error::StreamRead { entry, .. } => assert_eq!(entry, 4),
            other => panic!("unexpected {other}"),
        }
    }
}
