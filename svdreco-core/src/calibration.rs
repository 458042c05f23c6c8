//! Strip calibration interface.

use crate::id::{SensorId, Side};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-strip calibration constants consumed by unpacking and clustering.
///
/// Implementations are loaded once per run and read-only afterwards.
pub trait StripCalibration: Send + Sync {
    /// Strip noise in ADU.
    fn noise(&self, sensor: SensorId, side: Side, strip: u16) -> f64;

    /// Converts an ADU value on this strip to electrons.
    fn charge_from_adc(&self, sensor: SensorId, side: Side, strip: u16, adc: f64) -> f64;

    /// Calibrated pulse width (ns).
    fn width(&self, sensor: SensorId, side: Side, strip: u16) -> f64;

    /// Calibrated peak time (ns).
    fn peak_time(&self, sensor: SensorId, side: Side, strip: u16) -> f64;
}

/// The same constants for every strip.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConstantCalibration {
    /// Noise (ADU).
    pub noise_adu: f64,
    /// Gain (electrons per ADU).
    pub electrons_per_adu: f64,
    /// Pulse width (ns).
    pub width: f64,
    /// Peak time (ns).
    pub peak_time: f64,
}

impl Default for ConstantCalibration {
    fn default() -> Self {
        Self {
            noise_adu: 2.0,
            electrons_per_adu: 375.0,
            width: 135.8,
            peak_time: 72.0,
        }
    }
}

impl StripCalibration for ConstantCalibration {
    fn noise(&self, _sensor: SensorId, _side: Side, _strip: u16) -> f64 {
        self.noise_adu
    }

    fn charge_from_adc(&self, _sensor: SensorId, _side: Side, _strip: u16, adc: f64) -> f64 {
        adc * self.electrons_per_adu
    }

    fn width(&self, _sensor: SensorId, _side: Side, _strip: u16) -> f64 {
        self.width
    }

    fn peak_time(&self, _sensor: SensorId, _side: Side, _strip: u16) -> f64 {
        self.peak_time
    }
}
