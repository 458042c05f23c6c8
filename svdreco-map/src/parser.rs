//! Channel map description parser.
//!
//! The description is a nested XML document:
//!
//! ```xml
//! <unique name="SVDChannelMap_v1">
//!   <layer n="3">
//!     <ladder n="1">
//!       <sensor n="1">
//!         <side side="U">
//!           <chip n="0" FADCn="129" strip_number_of_ch0="0" strip_number_of_ch127="127"/>
//!         </side>
//!       </sensor>
//!     </ladder>
//!   </layer>
//! </unique>
//! ```
//!
//! Elements other than `layer`, `ladder`, `sensor`, `side` and `chip` are
//! ignored. The `name` attribute of the root element, if present, names the
//! map.

use crate::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::str::FromStr;
use svdreco_core::{ChipAddress, SensorId, Side};

/// One `<chip>` entry with its resolved sensor context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipEntry {
    /// Sensor the chip reads out.
    pub sensor: SensorId,
    /// Sensor side.
    pub side: Side,
    /// Online chip address.
    pub chip: ChipAddress,
    /// Strip connected to channel 0.
    pub strip_of_channel0: u16,
    /// Strip connected to channel 127.
    pub strip_of_channel127: u16,
}

/// Parsed channel map description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapDescription {
    /// Map name from the root element.
    pub name: Option<String>,
    /// Chips in document order.
    pub chips: Vec<ChipEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Layer,
    Ladder,
    Sensor,
    Side,
    Chip,
    Other,
}

#[derive(Default)]
struct Context {
    layer: Option<u8>,
    ladder: Option<u8>,
    sensor: Option<u8>,
    side: Option<Side>,
    // Reader offset of the element being entered.
    position: usize,
}

impl Context {
    fn enter(
        &mut self,
        e: &BytesStart<'_>,
        position: usize,
        chips: &mut Vec<ChipEntry>,
    ) -> Result<Level> {
        self.position = position;
        let level = match e.name().as_ref() {
            b"layer" => {
                self.layer = Some(required(e, "layer", "n", self.position)?);
                Level::Layer
            }
            b"ladder" => {
                self.require(self.layer.is_some(), "ladder", "layer")?;
                self.ladder = Some(required(e, "ladder", "n", self.position)?);
                Level::Ladder
            }
            b"sensor" => {
                self.require(self.ladder.is_some(), "sensor", "ladder")?;
                self.sensor = Some(required(e, "sensor", "n", self.position)?);
                Level::Sensor
            }
            b"side" => {
                self.require(self.sensor.is_some(), "side", "sensor")?;
                let label: String = required(e, "side", "side", self.position)?;
                let side = label.parse::<Side>().map_err(|_| Error::InvalidAttribute {
                    element: "side",
                    attribute: "side",
                    value: label.clone(),
                })?;
                self.side = Some(side);
                Level::Side
            }
            b"chip" => {
                chips.push(self.chip(e)?);
                Level::Chip
            }
            _ => Level::Other,
        };
        Ok(level)
    }

    fn leave(&mut self, level: Level) {
        match level {
            Level::Layer => self.layer = None,
            Level::Ladder => self.ladder = None,
            Level::Sensor => self.sensor = None,
            Level::Side => self.side = None,
            Level::Chip | Level::Other => {}
        }
    }

    fn require(&self, present: bool, element: &'static str, parent: &'static str) -> Result<()> {
        if present {
            Ok(())
        } else {
            Err(Error::UnexpectedElement {
                element,
                expected_parent: parent,
            })
        }
    }

    fn chip(&self, e: &BytesStart<'_>) -> Result<ChipEntry> {
        let (Some(layer), Some(ladder), Some(sensor), Some(side)) =
            (self.layer, self.ladder, self.sensor, self.side)
        else {
            return Err(Error::UnexpectedElement {
                element: "chip",
                expected_parent: "side",
            });
        };
        let apv = required(e, "chip", "n", self.position)?;
        let fadc = required(e, "chip", "FADCn", self.position)?;
        let first: u16 = required(e, "chip", "strip_number_of_ch0", self.position)?;
        let last: u16 = required(e, "chip", "strip_number_of_ch127", self.position)?;
        if first.abs_diff(last) != 127 {
            return Err(Error::InvalidStripRange {
                fadc,
                apv,
                first,
                last,
            });
        }
        Ok(ChipEntry {
            sensor: SensorId::try_new(layer, ladder, sensor)?,
            side,
            chip: ChipAddress::new(fadc, apv),
            strip_of_channel0: first,
            strip_of_channel127: last,
        })
    }
}

fn attribute(e: &BytesStart<'_>, key: &str, position: usize) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Xml {
            position,
            message: err.to_string(),
        })?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr.unescape_value().map_err(|err| Error::Xml {
                position,
                message: err.to_string(),
            })?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

fn required<T: FromStr>(
    e: &BytesStart<'_>,
    element: &'static str,
    attribute_name: &'static str,
    position: usize,
) -> Result<T> {
    let value = attribute(e, attribute_name, position)?.ok_or(Error::MissingAttribute {
        element,
        attribute: attribute_name,
    })?;
    value.parse().map_err(|_| Error::InvalidAttribute {
        element,
        attribute: attribute_name,
        value,
    })
}

/// Parses a channel map description.
///
/// # Errors
/// Returns an error for malformed XML, missing or invalid attributes,
/// misplaced elements, or a description without chips.
pub fn parse_description(xml: &str) -> Result<MapDescription> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut description = MapDescription::default();
    let mut context = Context::default();
    let mut stack: Vec<Level> = Vec::new();
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let position = reader.buffer_position();
                if !seen_root {
                    seen_root = true;
                    description.name = attribute(&e, "name", position)?;
                }
                stack.push(context.enter(&e, position, &mut description.chips)?);
            }
            Ok(Event::Empty(e)) => {
                let position = reader.buffer_position();
                if !seen_root {
                    seen_root = true;
                    description.name = attribute(&e, "name", position)?;
                }
                let level = context.enter(&e, position, &mut description.chips)?;
                context.leave(level);
            }
            Ok(Event::End(_)) => {
                if let Some(level) = stack.pop() {
                    context.leave(level);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(Error::Xml {
                    position: reader.buffer_position(),
                    message: err.to_string(),
                })
            }
            Ok(_) => {}
        }
        buf.clear();
    }

    if description.chips.is_empty() {
        return Err(Error::EmptyMap);
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_MAP: &str = r#"<?xml version="1.0"?>
<unique name="test-map">
  <layer n="3">
    <ladder n="1">
      <sensor n="2">
        <side side="U">
          <chip n="0" FADCn="10" strip_number_of_ch0="0" strip_number_of_ch127="127"/>
          <chip n="1" FADCn="10" strip_number_of_ch0="128" strip_number_of_ch127="255"/>
        </side>
        <side side="V">
          <chip n="2" FADCn="11" strip_number_of_ch0="127" strip_number_of_ch127="0"/>
        </side>
      </sensor>
    </ladder>
  </layer>
</unique>"#;

    #[test]
    fn test_parse_small_map() {
        let description = parse_description(SMALL_MAP).unwrap();
        assert_eq!(description.name.as_deref(), Some("test-map"));
        assert_eq!(description.chips.len(), 3);

        let v_chip = description.chips[2];
        assert_eq!(v_chip.sensor, SensorId::new(3, 1, 2));
        assert_eq!(v_chip.side, Side::V);
        assert_eq!(v_chip.chip, ChipAddress::new(11, 2));
        assert_eq!(v_chip.strip_of_channel0, 127);
        assert_eq!(v_chip.strip_of_channel127, 0);
    }

    #[test]
    fn test_chip_outside_side_is_rejected() {
        let xml = r#"<layer n="3"><ladder n="1"><sensor n="1">
            <chip n="0" FADCn="1" strip_number_of_ch0="0" strip_number_of_ch127="127"/>
            </sensor></ladder></layer>"#;
        assert!(matches!(
            parse_description(xml),
            Err(Error::UnexpectedElement {
                element: "chip",
                ..
            })
        ));
    }

    #[test]
    fn test_missing_attribute() {
        let xml = r#"<layer n="3"><ladder n="1"><sensor n="1"><side side="U">
            <chip n="0" strip_number_of_ch0="0" strip_number_of_ch127="127"/>
            </side></sensor></ladder></layer>"#;
        assert!(matches!(
            parse_description(xml),
            Err(Error::MissingAttribute {
                attribute: "FADCn",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_side_label() {
        let xml = r#"<layer n="3"><ladder n="1"><sensor n="1"><side side="W">
            </side></sensor></ladder></layer>"#;
        assert!(matches!(
            parse_description(xml),
            Err(Error::InvalidAttribute {
                element: "side",
                ..
            })
        ));
    }

    #[test]
    fn test_strip_range_must_span_one_chip() {
        let xml = r#"<layer n="3"><ladder n="1"><sensor n="1"><side side="U">
            <chip n="0" FADCn="1" strip_number_of_ch0="0" strip_number_of_ch127="100"/>
            </side></sensor></ladder></layer>"#;
        assert!(matches!(
            parse_description(xml),
            Err(Error::InvalidStripRange { .. })
        ));
    }

    #[test]
    fn test_malformed_xml() {
        let xml = r#"<layer n="3"><ladder n="1"></layer>"#;
        assert!(matches!(parse_description(xml), Err(Error::Xml { .. })));
    }

    #[test]
    fn test_bad_attribute_reports_position() {
        let xml = r#"<layer n="3"><ladder n="1"><sensor n="1"><side side="U">
            <chip n="0" n="1" FADCn="1" strip_number_of_ch0="0" strip_number_of_ch127="127"/>
            </side></sensor></ladder></layer>"#;
        let chip_offset = xml.find("<chip").unwrap();
        match parse_description(xml) {
            Err(Error::Xml { position, .. }) => assert!(position > chip_offset),
            other => panic!("expected an XML error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_description() {
        assert!(matches!(
            parse_description("<unique name=\"x\"/>"),
            Err(Error::EmptyMap)
        ));
    }

    #[test]
    fn test_context_resets_between_sides() {
        let xml = r#"<layer n="4"><ladder n="2"><sensor n="1">
            <side side="U"><chip n="0" FADCn="1" strip_number_of_ch0="0" strip_number_of_ch127="127"/></side>
            <other/>
            <side side="V"><chip n="1" FADCn="1" strip_number_of_ch0="0" strip_number_of_ch127="127"/></side>
            </sensor></ladder></layer>"#;
        let description = parse_description(xml).unwrap();
        assert_eq!(description.name, None);
        assert_eq!(description.chips[0].side, Side::U);
        assert_eq!(description.chips[1].side, Side::V);
    }
}
