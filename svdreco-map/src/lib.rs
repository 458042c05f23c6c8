//! svdreco-map: Online-to-offline channel mapping for APV25 strip readout.
//!
//! The map is parsed from a nested XML description (layer, ladder, sensor,
//! side, chip) into two independent lookup tables:
//!
//! - forward: (FADC, APV) to sensor side and strip direction, used when
//!   unpacking raw samples;
//! - inverse: (sensor, side, strip) to chip and channel, used when packing
//!   and when taking the inventory of unmapped chips.
//!
//! Chips are not guaranteed to be contiguous or evenly spaced, so neither
//! direction is derived from the other in closed form.

mod error;
mod map;
pub mod parser;

pub use error::{Error, Result};
pub use map::{ChannelMap, ChipInfo, MissingApv, SensorSideInfo};
pub use parser::{parse_description, ChipEntry, MapDescription};
