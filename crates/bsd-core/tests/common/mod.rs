//! Hand-built spill tables for integration tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, AsArray, Int32Array, RecordBatch};
use arrow::datatypes::{Field, Int32Type, Schema};
use bsd_common::SpillRecord;
use bsd_tree::{SpillTableWriter, WriterConfig};
use parquet::arrow::ArrowWriter;

/// Write `records` with metadata overrides and, optionally, one null integer cell.
pub fn write_altered(
    path: &Path,
    config: WriterConfig,
    records: &[SpillRecord],
    metadata: &[(&str, &str)],
    null_cell: Option<(&str, usize)>,
) -> PathBuf {
    let mut writer = SpillTableWriter::new(path, config);
    for record in records {
        writer.push(record.clone()).expect("push");
    }
    let batch = writer.to_batch().expect("batch");
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    let mut arrays: Vec<ArrayRef> = batch.columns().to_vec();

    if let Some((name, entry)) = null_cell {
        let index = schema.index_of(name).expect("column");
        let with_null: Int32Array = arrays[index]
            .as_primitive::<Int32Type>()
            .iter()
            .enumerate()
            .map(|(i, v)| if i == entry { None } else { v })
            .collect();
        arrays[index] = Arc::new(with_null);
        fields[index] = fields[index].clone().with_nullable(true);
    }

    let mut kv = schema.metadata().clone();
    for (key, value) in metadata {
        kv.insert(key.to_string(), value.to_string());
    }
    let schema = Arc::new(Schema::new(fields).with_metadata(kv));
    let batch = RecordBatch::try_new(schema.clone(), arrays).expect("batch");

    let file = std::fs::File::create(path).expect("create");
    let mut parquet = ArrowWriter::try_new(file, schema, None).expect("writer");
    parquet.write(&batch).expect("write");
    parquet.close().expect("close");
    path.to_path_buf()
}
