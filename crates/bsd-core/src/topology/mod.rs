//! Detector topology: which readout chips hang off each DIF.
//!
//! A topology source is either a JSON document or the path of a Pyrame XML
//! device configuration. JSON is tried first; the XML file is only read when
//! the source does not parse as a JSON topology.
//!
//! Accepted JSON shapes:
//!
//! ```text
//! {"0": [0, 1, 2], "1": [0, 1]}               DIF -> chip ids
//! {"0": {"0": 32, "1": 32}, "1": {"0": 32}}   DIF -> chip -> channel count
//! ```

pub mod pyrame;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

pub use pyrame::parse_xml_path;

/// Errors from topology resolution and queries.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("not a JSON topology: {0}")]
    Json(String),

    #[error("not a Pyrame XML topology ({}): {message}", path.display())]
    Xml { path: PathBuf, message: String },

    #[error("{json}; {xml}")]
    Unresolvable { json: String, xml: String },

    #[error("DIF {dif} is not present in the topology")]
    UnknownDif { dif: u32 },
}

impl From<TopologyError> for bsd_common::Error {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::UnknownDif { dif } => bsd_common::Error::UnknownDif { dif },
            other => bsd_common::Error::Topology(other.to_string()),
        }
    }
}

/// Where a resolved topology came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologySource {
    Json,
    PyrameXml(PathBuf),
}

/// Immutable DIF to chip mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    dif_map: BTreeMap<u32, Vec<u32>>,
    source: TopologySource,
}

impl Topology {
    /// Build a topology from an explicit map.
    pub fn from_map(dif_map: BTreeMap<u32, Vec<u32>>, source: TopologySource) -> Self {
        Topology { dif_map, source }
    }

    /// Resolve a topology source string: JSON first, then a Pyrame XML path.
    pub fn resolve(src: &str) -> Result<Self, TopologyError> {
        let json_err = match parse_structured(src) {
            Ok(topology) => return Ok(topology),
            Err(err) => err,
        };
        match parse_xml_path(src) {
            Ok(topology) => Ok(topology),
            Err(xml_err) => Err(TopologyError::Unresolvable {
                json: json_err.to_string(),
                xml: xml_err.to_string(),
            }),
        }
    }

    pub fn source(&self) -> &TopologySource {
        &self.source
    }

    /// Number of chips on a DIF.
    pub fn chip_count(&self, dif: u32) -> Result<usize, TopologyError> {
        self.chips(dif).map(<[u32]>::len)
    }

    /// Chip ids of a DIF, in topology order.
    pub fn chips(&self, dif: u32) -> Result<&[u32], TopologyError> {
        self.dif_map
            .get(&dif)
            .map(Vec::as_slice)
            .ok_or(TopologyError::UnknownDif { dif })
    }

    /// Number of DIFs described.
    pub fn n_difs(&self) -> usize {
        self.dif_map.len()
    }

    /// DIF indices in ascending order.
    pub fn dif_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.dif_map.keys().copied()
    }

    pub fn total_chips(&self) -> usize {
        self.dif_map.values().map(Vec::len).sum()
    }
}

/// Parse a JSON topology document.
pub fn parse_structured(src: &str) -> Result<Topology, TopologyError> {
    let value: Value =
        serde_json::from_str(src).map_err(|e| TopologyError::Json(e.to_string()))?;
    let Value::Object(difs) = value else {
        return Err(TopologyError::Json(
            "expected an object keyed by DIF index".to_string(),
        ));
    };

    let mut dif_map = BTreeMap::new();
    for (key, chips) in difs {
        let dif = parse_index(&key, "DIF")?;
        let chip_ids = match chips {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|id| u32::try_from(id).ok())
                        .ok_or_else(|| {
                            TopologyError::Json(format!(
                                "DIF {dif}: chip id {item} is not a non-negative integer"
                            ))
                        })
                })
                .collect::<Result<Vec<u32>, _>>()?,
            Value::Object(chip_map) => {
                let mut ids = chip_map
                    .keys()
                    .map(|k| parse_index(k, "chip"))
                    .collect::<Result<Vec<u32>, _>>()?;
                ids.sort_unstable();
                ids
            }
            other => {
                return Err(TopologyError::Json(format!(
                    "DIF {dif}: expected a chip list or chip map, got {other}"
                )))
            }
        };
        dif_map.insert(dif, chip_ids);
    }

    Ok(Topology::from_map(dif_map, TopologySource::Json))
}

fn parse_index(key: &str, what: &str) -> Result<u32, TopologyError> {
    key.trim()
        .parse::<u32>()
        .map_err(|_| TopologyError::Json(format!("{what} key {key:?} is not an index")))
}
