//! Sensor, side and readout-chip identifiers.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Physical sensor address: layer, ladder and sensor number.
///
/// Ordering is lexicographic in (layer, ladder, sensor), which is the
/// order digits are delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorId {
    /// Layer number (3..=6 for the SVD).
    pub layer: u8,
    /// Ladder number within the layer.
    pub ladder: u8,
    /// Sensor number within the ladder.
    pub sensor: u8,
}

impl SensorId {
    const LAYER_BITS: u32 = 3;
    const LADDER_BITS: u32 = 5;
    const SENSOR_BITS: u32 = 3;
    const SEGMENT_BITS: u32 = 5;

    /// Creates a sensor id without range checks.
    #[inline]
    #[must_use]
    pub const fn new(layer: u8, ladder: u8, sensor: u8) -> Self {
        Self {
            layer,
            ladder,
            sensor,
        }
    }

    /// Creates a sensor id, rejecting components that do not fit the packed
    /// encoding.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSensorId`] if a component overflows its field.
    pub fn try_new(layer: u8, ladder: u8, sensor: u8) -> Result<Self> {
        if u32::from(layer) >= 1 << Self::LAYER_BITS
            || u32::from(ladder) >= 1 << Self::LADDER_BITS
            || u32::from(sensor) >= 1 << Self::SENSOR_BITS
        {
            return Err(Error::InvalidSensorId {
                layer,
                ladder,
                sensor,
            });
        }
        Ok(Self::new(layer, ladder, sensor))
    }

    /// Packs the id into 16 bits.
    ///
    /// Layout (MSB first): layer (3) | ladder (5) | sensor (3) | segment (5).
    /// The segment field is always zero.
    #[must_use]
    pub fn to_packed(self) -> u16 {
        let ladder_shift = Self::SENSOR_BITS + Self::SEGMENT_BITS;
        let layer_shift = ladder_shift + Self::LADDER_BITS;
        (u16::from(self.layer) << layer_shift)
            | (u16::from(self.ladder) << ladder_shift)
            | (u16::from(self.sensor) << Self::SEGMENT_BITS)
    }

    /// Unpacks an id produced by [`SensorId::to_packed`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_packed(packed: u16) -> Self {
        let ladder_shift = Self::SENSOR_BITS + Self::SEGMENT_BITS;
        let layer_shift = ladder_shift + Self::LADDER_BITS;
        Self {
            layer: ((packed >> layer_shift) & 0x7) as u8,
            ladder: ((packed >> ladder_shift) & 0x1F) as u8,
            sensor: ((packed >> Self::SEGMENT_BITS) & 0x7) as u8,
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.layer, self.ladder, self.sensor)
    }
}

impl FromStr for SensorId {
    type Err = Error;

    /// Parses the `layer.ladder.sensor` notation.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::ConfigError(format!("invalid sensor id {s:?}"));
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u8> {
            parts
                .next()
                .and_then(|p| p.parse::<u8>().ok())
                .ok_or_else(invalid)
        };
        let (layer, ladder, sensor) = (next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Self::try_new(layer, ladder, sensor)
    }
}

/// Sensor side. U strips measure r-phi, V strips measure z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    /// U (r-phi) side.
    U,
    /// V (z) side.
    V,
}

impl Side {
    /// Both sides, U first.
    pub const ALL: [Side; 2] = [Side::U, Side::V];

    /// Returns true for the U side.
    #[inline]
    #[must_use]
    pub fn is_u(self) -> bool {
        self == Side::U
    }

    /// Builds a side from the U-side flag used by the readout.
    #[inline]
    #[must_use]
    pub fn from_is_u(is_u: bool) -> Self {
        if is_u {
            Side::U
        } else {
            Side::V
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::U => "U",
            Side::V => "V",
        })
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "U" | "u" => Ok(Side::U),
            "V" | "v" => Ok(Side::V),
            other => Err(Error::InvalidSide(other.to_string())),
        }
    }
}

/// Online address of one APV25 readout chip: FADC board and chip number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChipAddress {
    /// FADC board number.
    pub fadc: u8,
    /// APV25 chip number on the board.
    pub apv: u8,
}

impl ChipAddress {
    /// Creates a chip address.
    #[inline]
    #[must_use]
    pub const fn new(fadc: u8, apv: u8) -> Self {
        Self { fadc, apv }
    }

    /// Packs the address as `fadc << 8 | apv`.
    #[inline]
    #[must_use]
    pub fn to_packed(self) -> u16 {
        (u16::from(self.fadc) << 8) | u16::from(self.apv)
    }

    /// Inverse of [`ChipAddress::to_packed`].
    #[inline]
    #[must_use]
    pub fn from_packed(packed: u16) -> Self {
        let [fadc, apv] = packed.to_be_bytes();
        Self { fadc, apv }
    }
}

impl fmt::Display for ChipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FADC {} APV {}", self.fadc, self.apv)
    }
}
