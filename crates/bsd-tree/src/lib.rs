//! Beam summary spill table storage.
//!
//! This crate provides:
//! - Arrow schema definitions for spill tables, one layout per format version
//! - A Parquet reader exposing a table as a random-access spill record source
//! - A Parquet writer producing tables with the metadata the reader requires

pub mod reader;
pub mod schema;
pub mod writer;

pub use reader::{SpillTable, TableError};
pub use schema::{columns, metadata_keys, required_columns, spill_table_schema};
pub use writer::{SpillTableWriter, WriteError, WriterConfig};
