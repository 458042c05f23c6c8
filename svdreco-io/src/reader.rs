//! JSON event files.
//!
//! An event holds raw APV samples and, optionally, strip digits and the
//! digit truth relations:
//!
//! ```json
//! {
//!   "raw": [{"fadc": 3, "apv": 0, "channel": 11, "samples": [0, 9, 14, 12, 9, 6]}],
//!   "digits": [{"sensor": {"layer": 3, "ladder": 2, "sensor": 1}, "side": "U",
//!               "strip": 11, "raw_index": 0}],
//!   "mc_relations": [{"from": 0, "to": [4], "weights": [1.0]}]
//! }
//! ```
//!
//! A file holds either one event object or an array of them. Events without
//! digits are meant to be unpacked through the channel map.

use crate::config::read_json;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use svdreco_core::relation::target::{McParticle, TrueHit};
use svdreco_core::{RawApvSamples, RelationElement, RelationTable, StripDigit};

/// One event as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EventRecord {
    /// Raw sample records.
    pub raw: Vec<RawApvSamples>,
    /// Strip digits, if already unpacked.
    pub digits: Option<Vec<StripDigit>>,
    /// Digit to MC particle relations.
    pub mc_relations: Option<Vec<RelationElement>>,
    /// Digit to true hit relations.
    pub truehit_relations: Option<Vec<RelationElement>>,
}

impl EventRecord {
    /// Digit to MC particle relation table, if present.
    #[must_use]
    pub fn mc_table(&self) -> Option<RelationTable<McParticle>> {
        self.mc_relations
            .clone()
            .map(RelationTable::from_elements)
    }

    /// Digit to true hit relation table, if present.
    #[must_use]
    pub fn truehit_table(&self) -> Option<RelationTable<TrueHit>> {
        self.truehit_relations
            .clone()
            .map(RelationTable::from_elements)
    }

    /// Checks that relation elements have matching target and weight lists.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for the first inconsistent element.
    pub fn validate(&self) -> Result<()> {
        let tables = [
            ("mc_relations", &self.mc_relations),
            ("truehit_relations", &self.truehit_relations),
        ];
        for (name, elements) in tables {
            for element in elements.iter().flatten() {
                if element.to.len() != element.weights.len() {
                    return Err(Error::InvalidFormat(format!(
                        "{name}: element from {} has {} targets but {} weights",
                        element.from,
                        element.to.len(),
                        element.weights.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventFile {
    Many(Vec<EventRecord>),
    One(EventRecord),
}

impl From<EventFile> for Vec<EventRecord> {
    fn from(file: EventFile) -> Self {
        match file {
            EventFile::Many(events) => events,
            EventFile::One(event) => vec![event],
        }
    }
}

/// Parses events from a JSON string.
///
/// # Errors
/// Returns an error for malformed JSON or inconsistent relations.
pub fn parse_events(json: &str) -> Result<Vec<EventRecord>> {
    let file: EventFile = serde_json::from_str(json)?;
    finish(file)
}

/// Reads events from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or is invalid.
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<EventRecord>> {
    let file: EventFile = read_json(path)?;
    finish(file)
}

fn finish(file: EventFile) -> Result<Vec<EventRecord>> {
    let events: Vec<EventRecord> = file.into();
    for event in &events {
        event.validate()?;
    }
    log::debug!("read {} events", events.len());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use svdreco_core::{SensorId, Side};

    const EVENT: &str = r#"{
        "raw": [{"fadc": 3, "apv": 0, "channel": 11, "samples": [0, 9, 14, 12, 9, 6]}],
        "digits": [{"sensor": {"layer": 3, "ladder": 2, "sensor": 1}, "side": "U",
                    "strip": 11, "raw_index": 0}],
        "mc_relations": [{"from": 0, "to": [4, 5], "weights": [1.0, -1.0]}]
    }"#;

    #[test]
    fn test_parse_single_event() {
        let events = parse_events(EVENT).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.raw[0].channel, 11);

        let digits = event.digits.as_ref().unwrap();
        assert_eq!(digits[0].sensor, SensorId::new(3, 2, 1));
        assert_eq!(digits[0].side, Side::U);
        assert_eq!(digits[0].raw_index, Some(0));
        assert!(digits[0].probabilities.is_empty());

        let mc = event.mc_table().unwrap();
        assert_eq!(mc.len(), 1);
        assert!(event.truehit_table().is_none());
    }

    #[test]
    fn test_parse_event_array() {
        let json = format!("[{EVENT}, {{\"raw\": []}}]");
        let events = parse_events(&json).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].digits.is_none());
        assert!(events[1].raw.is_empty());
    }

    #[test]
    fn test_inconsistent_relation_is_rejected() {
        let json = r#"{"raw": [], "truehit_relations": [{"from": 0, "to": [1, 2], "weights": [1.0]}]}"#;
        assert!(matches!(parse_events(json), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_side_label() {
        let json = r#"{"digits": [{"sensor": {"layer": 3, "ladder": 1, "sensor": 1},
                       "side": "W", "strip": 1}]}"#;
        assert!(matches!(parse_events(json), Err(Error::Json(_))));
    }
}
