//! Cluster record.

use crate::id::{SensorId, Side};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One strip's share of a cluster: the digit index and its fitted amplitude
/// in electrons.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripContribution {
    /// Index of the contributing digit in the event's digit collection.
    pub digit: usize,
    /// Strip number of that digit.
    pub strip: u16,
    /// Fitted strip amplitude (electrons).
    pub amplitude: f64,
}

/// A reconstructed strip cluster.
///
/// `charge` is exactly the sum of the contribution amplitudes, and `size`
/// equals the number of contributions.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Sensor the cluster was found on.
    pub sensor: SensorId,
    /// Sensor side.
    pub side: Side,
    /// Local position (cm), Lorentz-corrected.
    pub position: f64,
    /// Position uncertainty (cm).
    pub position_error: f64,
    /// Cluster time (ns).
    pub time: f64,
    /// Time uncertainty (ns).
    pub time_error: f64,
    /// Total charge (electrons).
    pub charge: f64,
    /// Charge uncertainty (electrons).
    pub charge_error: f64,
    /// Charge of the strip with the largest amplitude (electrons).
    pub seed_charge: f64,
    /// Number of strips.
    pub size: u16,
    /// Signal-to-noise ratio.
    pub signal_to_noise: f64,
    /// Mean per-strip chi-square of the amplitude fits.
    pub chi2: f64,
    /// Contributing strips in strip order.
    pub strips: Vec<StripContribution>,
}

impl Cluster {
    /// First strip number of the cluster.
    #[must_use]
    pub fn first_strip(&self) -> Option<u16> {
        self.strips.first().map(|s| s.strip)
    }

    /// Last strip number of the cluster.
    #[must_use]
    pub fn last_strip(&self) -> Option<u16> {
        self.strips.last().map(|s| s.strip)
    }

    /// Returns the number of strips.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strips.len()
    }

    /// Returns true if the cluster has no strips.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }
}
