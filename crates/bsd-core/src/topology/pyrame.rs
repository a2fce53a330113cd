//! Pyrame XML device configuration reader.
//!
//! Only the detector hierarchy is read: `<dif>` elements and the `<asu>` (or
//! `<chip>`) elements nested in them, anywhere under the document's
//! `<domain>` elements. Indices come from an `id` attribute or from the
//! trailing integer of the `name` attribute (`wagasci_dif_3`,
//! `wagasci_asu_3_7`).

use std::collections::BTreeMap;
use std::path::PathBuf;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Topology, TopologyError, TopologySource};

/// Read a Pyrame XML file into a topology.
pub fn parse_xml_path(src: &str) -> Result<Topology, TopologyError> {
    let path = PathBuf::from(src.trim());
    let content = std::fs::read_to_string(&path).map_err(|e| TopologyError::Xml {
        path: path.clone(),
        message: e.to_string(),
    })?;
    let dif_map = parse_xml_str(&content).map_err(|message| TopologyError::Xml {
        path: path.clone(),
        message,
    })?;
    Ok(Topology::from_map(dif_map, TopologySource::PyrameXml(path)))
}

/// Parse Pyrame XML text into a DIF to chip map.
pub fn parse_xml_str(content: &str) -> Result<BTreeMap<u32, Vec<u32>>, String> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut dif_map: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut current_dif: Option<u32> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("at byte {}: {e}", reader.error_position()))?;
        match event {
            Event::Start(element) => match element.name().as_ref() {
                b"dif" => {
                    let dif = element_index(&element, "dif")?;
                    dif_map.entry(dif).or_default();
                    current_dif = Some(dif);
                }
                b"asu" | b"chip" => push_chip(&mut dif_map, current_dif, &element)?,
                _ => {}
            },
            Event::Empty(element) => match element.name().as_ref() {
                b"dif" => {
                    let dif = element_index(&element, "dif")?;
                    dif_map.entry(dif).or_default();
                }
                b"asu" | b"chip" => push_chip(&mut dif_map, current_dif, &element)?,
                _ => {}
            },
            Event::End(element) => {
                if element.name().as_ref() == b"dif" {
                    current_dif = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if dif_map.is_empty() {
        return Err("no <dif> elements found".to_string());
    }
    Ok(dif_map)
}

fn push_chip(
    dif_map: &mut BTreeMap<u32, Vec<u32>>,
    current_dif: Option<u32>,
    element: &BytesStart<'_>,
) -> Result<(), String> {
    let chip = element_index(element, "chip")?;
    let dif = current_dif.ok_or_else(|| format!("chip {chip} is outside any <dif>"))?;
    let chips = dif_map.entry(dif).or_default();
    if !chips.contains(&chip) {
        chips.push(chip);
    }
    Ok(())
}

/// Index of a `dif`/`asu` element from `id`, else the trailing integer of `name`.
fn element_index(element: &BytesStart<'_>, what: &str) -> Result<u32, String> {
    let mut name = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let value = String::from_utf8_lossy(&attr.value).into_owned();
        match attr.key.as_ref() {
            b"id" => {
                return value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| format!("{what} id {value:?} is not an index"))
            }
            b"name" => name = Some(value),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| format!("{what} element has neither id nor name"))?;
    trailing_index(&name).ok_or_else(|| format!("{what} name {name:?} has no trailing index"))
}

fn trailing_index(name: &str) -> Option<u32> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYRAME: &str = r#"<?xml version="1.0"?>
<domain name="wagasci">
  <domain name="wagasci_gdcc_1">
    <dif name="wagasci_dif_0">
      <param name="dif_mode">auto</param>
      <asu name="wagasci_asu_0_0"><param name="spiroc2d_enable">1</param></asu>
      <asu name="wagasci_asu_0_1"/>
      <asu name="wagasci_asu_0_2"/>
    </dif>
    <dif name="wagasci_dif_1">
      <asu name="wagasci_asu_1_0"/>
    </dif>
  </domain>
</domain>
"#;

    #[test]
    fn test_nested_domains() {
        let map = parse_xml_str(PYRAME).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&0], vec![0, 1, 2]);
        assert_eq!(map[&1], vec![0]);
    }

    #[test]
    fn test_id_attributes_and_chip_elements() {
        let map = parse_xml_str(r#"<domain><dif id="4"><chip id="3"/><chip id="1"/></dif></domain>"#)
            .unwrap();
        assert_eq!(map[&4], vec![3, 1]);
    }

    #[test]
    fn test_empty_dif() {
        let map = parse_xml_str(r#"<domain><dif name="wagasci_dif_2"/></domain>"#).unwrap();
        assert_eq!(map[&2], Vec::<u32>::new());
    }

    #[test]
    fn test_no_difs() {
        let err = parse_xml_str("<domain><param/></domain>").unwrap_err();
        assert!(err.contains("no <dif>"));
    }

    #[test]
    fn test_chip_outside_dif() {
        let err = parse_xml_str(r#"<domain><asu name="wagasci_asu_0_0"/></domain>"#).unwrap_err();
        assert!(err.contains("outside"));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(parse_xml_str(r#"<domain><dif name="wagasci_dif_0"></domain>"#).is_err());
    }

    #[test]
    fn test_trailing_index() {
        assert_eq!(trailing_index("wagasci_asu_3_17"), Some(17));
        assert_eq!(trailing_index("dif"), None);
    }

    #[test]
    fn test_missing_file() {
        let err = parse_xml_path("/nonexistent/pyrame.xml").unwrap_err();
        assert!(matches!(err, TopologyError::Xml { .. }));
    }
}
