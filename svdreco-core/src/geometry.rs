//! Strip geometry interface.

use crate::id::{SensorId, Side};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sensor geometry needed for position reconstruction.
pub trait SensorGeometry: Send + Sync {
    /// Strip pitch (cm).
    fn pitch(&self, sensor: SensorId, side: Side) -> f64;

    /// Local coordinate (cm) of a strip centre.
    fn strip_position(&self, sensor: SensorId, side: Side, strip: u16) -> f64;

    /// Lorentz drift shift (cm) at a local position. Subtracted from the
    /// reconstructed position.
    fn lorentz_shift(&self, sensor: SensorId, side: Side, position: f64) -> f64;
}

/// Pitch and strip count for one side of a sensor type.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SideLayout {
    /// Strip pitch (cm).
    pub pitch: f64,
    /// Number of strips.
    pub strips: u16,
}

impl SideLayout {
    /// Sensor width covered by the strips (cm).
    #[must_use]
    pub fn width(&self) -> f64 {
        self.pitch * f64::from(self.strips)
    }
}

/// Rectangular sensors in a uniform magnetic field.
///
/// Layer 3 uses the inner layouts, all other layers the outer ones. Strips
/// are centred on the sensor: strip `i` sits at `(i + 0.5) * pitch - width / 2`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StripGeometry {
    /// Layer-3 U side.
    pub inner_u: SideLayout,
    /// Layer-3 V side.
    pub inner_v: SideLayout,
    /// Outer-layer U side.
    pub outer_u: SideLayout,
    /// Outer-layer V side.
    pub outer_v: SideLayout,
    /// Sensor thickness (cm).
    pub thickness: f64,
    /// Tangent of the hole drift angle (U side).
    pub tan_lorentz_u: f64,
    /// Tangent of the electron drift angle (V side).
    pub tan_lorentz_v: f64,
}

impl Default for StripGeometry {
    fn default() -> Self {
        Self {
            inner_u: SideLayout {
                pitch: 0.005,
                strips: 768,
            },
            inner_v: SideLayout {
                pitch: 0.016,
                strips: 768,
            },
            outer_u: SideLayout {
                pitch: 0.0075,
                strips: 768,
            },
            outer_v: SideLayout {
                pitch: 0.024,
                strips: 512,
            },
            thickness: 0.032,
            tan_lorentz_u: 0.0,
            tan_lorentz_v: 0.0,
        }
    }
}

impl StripGeometry {
    /// Layout for a sensor side.
    #[must_use]
    pub fn layout(&self, sensor: SensorId, side: Side) -> SideLayout {
        match (sensor.layer == 3, side) {
            (true, Side::U) => self.inner_u,
            (true, Side::V) => self.inner_v,
            (false, Side::U) => self.outer_u,
            (false, Side::V) => self.outer_v,
        }
    }
}

impl SensorGeometry for StripGeometry {
    fn pitch(&self, sensor: SensorId, side: Side) -> f64 {
        self.layout(sensor, side).pitch
    }

    fn strip_position(&self, sensor: SensorId, side: Side, strip: u16) -> f64 {
        let layout = self.layout(sensor, side);
        (f64::from(strip) + 0.5) * layout.pitch - 0.5 * layout.width()
    }

    fn lorentz_shift(&self, _sensor: SensorId, side: Side, _position: f64) -> f64 {
        let tan = match side {
            Side::U => self.tan_lorentz_u,
            Side::V => self.tan_lorentz_v,
        };
        0.5 * self.thickness * tan
    }
}
