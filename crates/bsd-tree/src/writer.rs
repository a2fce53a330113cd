//! Parquet writer for spill tables.
//!
//! Buffers spill records and writes them as one Parquet file with the
//! version/DIF metadata the reader requires. Files are written to a temp
//! path and renamed into place on close.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayRef, FixedSizeListArray, Float64Array, Int32Array, Int64Array, RecordBatch,
};
use arrow::datatypes::Schema;
use bsd_common::{FormatVersion, SpillBeam, SpillRecord};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::{WriterProperties, WriterVersion};
use thiserror::Error;

use crate::schema::{cell_field, metadata_keys, spill_table_schema_with_metadata};

/// Errors from spill table writes.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("spill {spill_number} is {actual}, table is {expected}")]
    VersionMismatch {
        spill_number: i32,
        expected: FormatVersion,
        actual: FormatVersion,
    },
}

/// Configuration for a spill table file.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Format version of every row.
    pub version: FormatVersion,

    /// DIF index the table is scoped to.
    pub dif: u32,

    /// Acquisition start time written to the metadata.
    pub start_time: Option<i64>,

    /// Acquisition stop time written to the metadata.
    pub stop_time: Option<i64>,

    /// Compression codec.
    pub compression: Compression,

    /// Maximum rows per row group.
    pub row_group_size: usize,
}

impl WriterConfig {
    /// Create config with defaults.
    pub fn new(version: FormatVersion, dif: u32) -> Self {
        WriterConfig {
            version,
            dif,
            start_time: None,
            stop_time: None,
            compression: Compression::ZSTD(ZstdLevel::default()),
            row_group_size: 64 * 1024,
        }
    }

    /// Use snappy compression instead of zstd.
    pub fn with_snappy(mut self) -> Self {
        self.compression = Compression::SNAPPY;
        self
    }

    /// Record the acquisition window in the file metadata.
    pub fn with_times(mut self, start_time: i64, stop_time: i64) -> Self {
        self.start_time = Some(start_time);
        self.stop_time = Some(stop_time);
        self
    }

    fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(metadata_keys::VERSION.to_string(), self.version.to_string());
        metadata.insert(metadata_keys::DIF.to_string(), self.dif.to_string());
        if let Some(t) = self.start_time {
            metadata.insert(metadata_keys::START_TIME.to_string(), t.to_string());
        }
        if let Some(t) = self.stop_time {
            metadata.insert(metadata_keys::STOP_TIME.to_string(), t.to_string());
        }
        metadata
    }
}

/// Buffered writer for one spill table file.
pub struct SpillTableWriter {
    config: WriterConfig,
    schema: Arc<Schema>,
    output_path: PathBuf,
    records: Vec<SpillRecord>,
}

impl SpillTableWriter {
    pub fn new(output_path: impl Into<PathBuf>, config: WriterConfig) -> Self {
        let schema = spill_table_schema_with_metadata(config.version, config.metadata());
        SpillTableWriter {
            config,
            schema,
            output_path: output_path.into(),
            records: Vec::new(),
        }
    }

    /// Buffer one record. Its version must match the table version.
    pub fn push(&mut self, record: SpillRecord) -> Result<(), WriteError> {
        if record.version() != self.config.version {
            return Err(WriteError::VersionMismatch {
                spill_number: record.spill_number,
                expected: self.config.version,
                actual: record.version(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Build the Arrow batch for the buffered rows.
    pub fn to_batch(&self) -> Result<RecordBatch, WriteError> {
        let records = &self.records;
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(Int32Array::from_iter_values(
                records.iter().map(|r| r.spill_count),
            )),
            Arc::new(Int32Array::from_iter_values(
                records.iter().map(|r| r.spill_number),
            )),
            Arc::new(Int64Array::from_iter_values(
                records.iter().map(|r| r.trigger_seconds),
            )),
        ];

        match self.config.version {
            FormatVersion::V01 => {
                let mut flags = Vec::with_capacity(records.len());
                let mut ct_np = Vec::new();
                for record in records {
                    if let SpillBeam::V01 {
                        good_spill_flag,
                        ct_np: table,
                    } = &record.beam
                    {
                        flags.push(*good_spill_flag);
                        ct_np.extend(table.iter().flatten());
                    }
                }
                columns.push(Arc::new(Int32Array::from(flags)));
                columns.push(fixed_list(ct_np, crate::schema::CT_NP_LEN)?);
            }
            FormatVersion::P06 => {
                let mut spill_flags = Vec::with_capacity(records.len());
                let mut run_types = Vec::with_capacity(records.len());
                let mut ct_np = Vec::new();
                let mut hct = Vec::new();
                let mut mumon = Vec::new();
                for record in records {
                    if let SpillBeam::P06 {
                        spill_flag,
                        run_type,
                        ct_np: protons,
                        hct: horns,
                        mumon: monitor,
                    } = &record.beam
                    {
                        spill_flags.push(*spill_flag);
                        run_types.push(*run_type);
                        ct_np.extend(protons.iter().flatten());
                        hct.extend(horns.iter().flatten());
                        mumon.extend(monitor.iter());
                    }
                }
                columns.push(Arc::new(Int32Array::from(spill_flags)));
                columns.push(Arc::new(Int32Array::from(run_types)));
                columns.push(fixed_list(ct_np, crate::schema::CT_NP_LEN)?);
                columns.push(fixed_list(hct, crate::schema::HCT_LEN)?);
                columns.push(fixed_list(
                    mumon,
                    bsd_common::spill::MUMON_CHANNELS,
                )?);
            }
        }

        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }

    /// Write the table and move it into place.
    pub fn close(self) -> Result<PathBuf, WriteError> {
        let batch = self.to_batch()?;

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.output_path.with_extension("parquet.tmp");
        let file = File::create(&temp_path)?;

        let key_value_metadata = self
            .config
            .metadata()
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value))
            .collect();
        let props = WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(self.config.compression)
            .set_max_row_group_size(self.config.row_group_size)
            .set_key_value_metadata(Some(key_value_metadata))
            .build();

        let mut writer = ArrowWriter::try_new(file, self.schema.clone(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        atomic_rename(&temp_path, &self.output_path)?;

        tracing::debug!(
            path = %self.output_path.display(),
            rows = batch.num_rows(),
            version = %self.config.version,
            "wrote spill table"
        );

        Ok(self.output_path)
    }
}

fn fixed_list(values: Vec<f64>, len: usize) -> Result<ArrayRef, WriteError> {
    let array = FixedSizeListArray::try_new(
        cell_field(),
        len as i32,
        Arc::new(Float64Array::from(values)),
        None,
    )?;
    Ok(Arc::new(array))
}

/// Helper to rename temp file to final path atomically.
pub fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<(), WriteError> {
    fs::rename(temp_path, final_path)?;
    Ok(())
}
