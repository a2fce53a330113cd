//! Arrow schema definitions for spill tables.
//!
//! A spill table holds one row per beam spill. Columns shared by every
//! format version come first; version-specific columns follow. 2-D beam
//! tables are stored row-major in fixed-size lists.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use bsd_common::spill::{CT_NP_COLS, CT_NP_ROWS, HCT_COLS, HCT_ROWS, MUMON_CHANNELS};
use bsd_common::FormatVersion;

/// Column names.
pub mod columns {
    pub const SPILL_COUNT: &str = "spill_count";
    pub const SPILLNUM: &str = "spillnum";
    pub const TRG_SEC: &str = "trg_sec";
    pub const GOOD_SPILL_FLAG: &str = "good_spill_flag";
    pub const SPILL_FLAG: &str = "spill_flag";
    pub const RUN_TYPE: &str = "run_type";
    pub const CT_NP: &str = "ct_np";
    pub const HCT: &str = "hct";
    pub const MUMON: &str = "mumon";
}

/// File metadata keys.
pub mod metadata_keys {
    /// Beam summary format tag, e.g. `p06`.
    pub const VERSION: &str = "bsd.version";
    /// DIF index the table is scoped to.
    pub const DIF: &str = "bsd.dif";
    /// Acquisition start time (unix seconds).
    pub const START_TIME: &str = "bsd.start_time";
    /// Acquisition stop time (unix seconds).
    pub const STOP_TIME: &str = "bsd.stop_time";
}

/// Flattened length of the proton-count table.
pub const CT_NP_LEN: usize = CT_NP_ROWS * CT_NP_COLS;
/// Flattened length of the horn-current table.
pub const HCT_LEN: usize = HCT_ROWS * HCT_COLS;

/// Element field shared by every fixed-size list column.
pub fn cell_field() -> FieldRef {
    Arc::new(Field::new("item", DataType::Float64, false))
}

fn fixed_list_field(name: &str, len: usize) -> Field {
    Field::new(name, DataType::FixedSizeList(cell_field(), len as i32), false)
}

/// Columns a table of the given version must carry.
pub fn required_columns(version: FormatVersion) -> &'static [&'static str] {
    use columns::*;
    match version {
        FormatVersion::V01 => &[SPILL_COUNT, SPILLNUM, TRG_SEC, GOOD_SPILL_FLAG, CT_NP],
        FormatVersion::P06 => &[
            SPILL_COUNT,
            SPILLNUM,
            TRG_SEC,
            SPILL_FLAG,
            RUN_TYPE,
            CT_NP,
            HCT,
            MUMON,
        ],
    }
}

/// Schema of a spill table for one format version, without file metadata.
pub fn spill_table_schema(version: FormatVersion) -> Schema {
    use columns::*;
    let mut fields = vec![
        Field::new(SPILL_COUNT, DataType::Int32, false),
        Field::new(SPILLNUM, DataType::Int32, false),
        Field::new(TRG_SEC, DataType::Int64, false),
    ];
    match version {
        FormatVersion::V01 => {
            fields.push(Field::new(GOOD_SPILL_FLAG, DataType::Int32, false));
            fields.push(fixed_list_field(CT_NP, CT_NP_LEN));
        }
        FormatVersion::P06 => {
            fields.push(Field::new(SPILL_FLAG, DataType::Int32, false));
            fields.push(Field::new(RUN_TYPE, DataType::Int32, false));
            fields.push(fixed_list_field(CT_NP, CT_NP_LEN));
            fields.push(fixed_list_field(HCT, HCT_LEN));
            fields.push(fixed_list_field(MUMON, MUMON_CHANNELS));
        }
    }
    Schema::new(fields)
}

/// Schema of a spill table with its file metadata attached.
pub fn spill_table_schema_with_metadata(
    version: FormatVersion,
    metadata: HashMap<String, String>,
) -> Arc<Schema> {
    Arc::new(spill_table_schema(version).with_metadata(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_columns_present_in_schema() {
        for version in FormatVersion::ALL {
            let schema = spill_table_schema(version);
            for name in required_columns(version) {
                assert!(
                    schema.field_with_name(name).is_ok(),
                    "{version} schema lacks {name}"
                );
            }
            assert_eq!(schema.fields().len(), required_columns(version).len());
        }
    }

    #[test]
    fn test_table_columns_are_fixed_size_lists() {
        let schema = spill_table_schema(FormatVersion::P06);
        let hct = schema.field_with_name(columns::HCT).unwrap();
        match hct.data_type() {
            DataType::FixedSizeList(item, len) => {
                assert_eq!(*len as usize, HCT_LEN);
                assert_eq!(item.data_type(), &DataType::Float64);
            }
            other => panic!("unexpected hct type {other:?}"),
        }
    }

    #[test]
    fn test_v01_has_no_horn_columns() {
        let schema = spill_table_schema(FormatVersion::V01);
        assert!(schema.field_with_name(columns::HCT).is_err());
        assert!(schema.field_with_name(columns::MUMON).is_err());
    }

    #[test]
    fn test_metadata_attached() {
        let mut metadata = HashMap::new();
        metadata.insert(metadata_keys::VERSION.to_string(), "p06".to_string());
        let schema = spill_table_schema_with_metadata(FormatVersion::P06, metadata);
        assert_eq!(
            schema.metadata().get(metadata_keys::VERSION).map(String::as_str),
            Some("p06")
        );
    }
}
