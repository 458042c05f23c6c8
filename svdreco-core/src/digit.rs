//! Raw APV samples and offline strip digits.

use crate::id::{SensorId, Side};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of shaper samples recorded per strip and trigger.
pub const APV_SAMPLES: usize = 6;

/// Number of input channels on one APV25 chip.
pub const APV_CHANNELS: u8 = 128;

/// The six shaper samples of one strip, in ADU.
pub type ApvSamples = [f64; APV_SAMPLES];

/// One channel's samples in online (FADC / APV / channel) addressing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawApvSamples {
    /// FADC board number.
    pub fadc: u8,
    /// APV25 chip number.
    pub apv: u8,
    /// Channel on the chip (0..128).
    pub channel: u8,
    /// Pedestal-subtracted samples in ADU.
    pub samples: ApvSamples,
}

impl RawApvSamples {
    /// Creates a raw sample record.
    #[must_use]
    pub fn new(fadc: u8, apv: u8, channel: u8, samples: ApvSamples) -> Self {
        Self {
            fadc,
            apv,
            channel,
            samples,
        }
    }
}

/// A fired strip in offline (sensor / side / strip) addressing.
///
/// The digit keeps the index of the raw record it was unpacked from; the
/// cluster builder reads the samples through that index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripDigit {
    /// Sensor the strip belongs to.
    pub sensor: SensorId,
    /// Sensor side.
    pub side: Side,
    /// Strip number on that side.
    pub strip: u16,
    /// Index of the originating [`RawApvSamples`] record, if any.
    #[cfg_attr(feature = "serde", serde(default))]
    pub raw_index: Option<usize>,
    /// Probability of the pulse start time over the fitter's time bins.
    #[cfg_attr(feature = "serde", serde(default))]
    pub probabilities: Vec<f64>,
}

impl StripDigit {
    /// Creates a digit.
    #[must_use]
    pub fn new(
        sensor: SensorId,
        side: Side,
        strip: u16,
        raw_index: Option<usize>,
        probabilities: Vec<f64>,
    ) -> Self {
        Self {
            sensor,
            side,
            strip,
            raw_index,
            probabilities,
        }
    }

    /// Sensor/side key the digit is grouped under.
    #[inline]
    #[must_use]
    pub fn key(&self) -> (SensorId, Side) {
        (self.sensor, self.side)
    }

    /// Full sort key: sensor, side, strip.
    #[inline]
    #[must_use]
    pub fn sort_key(&self) -> (SensorId, Side, u16) {
        (self.sensor, self.side, self.strip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_sort_key_orders_by_sensor_side_strip() {
        let sensor = SensorId::new(3, 1, 1);
        let mut digits = [
            StripDigit::new(sensor, Side::V, 2, None, Vec::new()),
            StripDigit::new(sensor, Side::U, 9, None, Vec::new()),
            StripDigit::new(sensor, Side::U, 3, None, Vec::new()),
        ];
        digits.sort_by_key(StripDigit::sort_key);
        let strips: Vec<_> = digits.iter().map(|d| (d.side, d.strip)).collect();
        assert_eq!(strips, vec![(Side::U, 3), (Side::U, 9), (Side::V, 2)]);
    }
}
