//! Configuration for unpacking, time fitting and clustering.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Peak estimator used to turn the joint time PDF into a cluster time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimeEstimator {
    /// Probability-weighted mean and RMS over all bins.
    #[default]
    Centroid,
    /// Parabola through the most probable bin and its neighbours.
    Parabolic,
}

/// Configuration for cluster building.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusterizerConfig {
    /// S/N cut defining the zero-suppression boundary of a cluster.
    pub neighbour_cut: f64,
    /// Minimum seed-strip S/N.
    pub seed_cut: f64,
    /// Minimum cluster S/N.
    pub cluster_cut: f64,
    /// Clusters with at least this many strips use head-tail positioning.
    ///
    /// Head-tail needs a centre strip, so values below
    /// [`Self::MIN_HEAD_TAIL_SIZE`] are rejected by configuration loading.
    pub head_tail_size: usize,
    /// Use calibrated peak width and time instead of the defaults below.
    pub use_calibrated_peak_shape: bool,
    /// Pulse width (ns) when uncalibrated.
    pub default_peak_width: f64,
    /// U-side time shift (ns) when uncalibrated.
    pub default_time_shift_u: f64,
    /// V-side time shift (ns) when uncalibrated.
    pub default_time_shift_v: f64,
    /// Estimator for the joint time PDF.
    pub time_estimator: TimeEstimator,
    /// Process sensor/sides in parallel.
    pub parallel: bool,
}

impl Default for ClusterizerConfig {
    fn default() -> Self {
        Self {
            neighbour_cut: 5.0,
            seed_cut: 5.0,
            cluster_cut: 5.0,
            head_tail_size: 3,
            use_calibrated_peak_shape: true,
            default_peak_width: 270.0,
            default_time_shift_u: 4.0,
            default_time_shift_v: 0.0,
            time_estimator: TimeEstimator::Centroid,
            parallel: true,
        }
    }
}

impl ClusterizerConfig {
    /// Smallest usable head-tail size threshold.
    pub const MIN_HEAD_TAIL_SIZE: usize = 3;

    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the neighbour (adjacent strip) cut.
    #[must_use]
    pub fn with_neighbour_cut(mut self, cut: f64) -> Self {
        self.neighbour_cut = cut;
        self
    }

    /// Sets the seed cut.
    #[must_use]
    pub fn with_seed_cut(mut self, cut: f64) -> Self {
        self.seed_cut = cut;
        self
    }

    /// Sets the cluster cut.
    #[must_use]
    pub fn with_cluster_cut(mut self, cut: f64) -> Self {
        self.cluster_cut = cut;
        self
    }

    /// Sets the head-tail size threshold.
    #[must_use]
    pub fn with_head_tail_size(mut self, size: usize) -> Self {
        self.head_tail_size = size;
        self
    }

    /// Selects calibrated or default pulse shape parameters.
    #[must_use]
    pub fn with_calibrated_peak_shape(mut self, calibrated: bool) -> Self {
        self.use_calibrated_peak_shape = calibrated;
        self
    }

    /// Sets the time estimator.
    #[must_use]
    pub fn with_time_estimator(mut self, estimator: TimeEstimator) -> Self {
        self.time_estimator = estimator;
        self
    }

    /// Enables or disables parallel processing.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Binning and sampling of the time fitter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeFitterConfig {
    /// Time bin edges (ns), strictly increasing; `n + 1` edges for `n` bins.
    pub bin_edges: Vec<f64>,
    /// Interval between consecutive APV samples (ns).
    pub sample_interval_ns: f64,
}

impl Default for TimeFitterConfig {
    fn default() -> Self {
        Self::uniform(-50.0, 50.0, 100)
    }
}

impl TimeFitterConfig {
    /// APV25 sampling interval at the nominal clock (ns).
    pub const APV_SAMPLE_INTERVAL_NS: f64 = 31.44;

    /// `bins` equal-width bins covering `[low, high)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(low: f64, high: f64, bins: usize) -> Self {
        let width = (high - low) / bins.max(1) as f64;
        Self {
            bin_edges: (0..=bins).map(|i| low + i as f64 * width).collect(),
            sample_interval_ns: Self::APV_SAMPLE_INTERVAL_NS,
        }
    }

    /// Number of time bins.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.bin_edges.len().saturating_sub(1)
    }
}

/// Strip acceptance applied while unpacking raw samples.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UnpackerConfig {
    /// Sample S/N threshold.
    pub zero_suppression_cut: f64,
    /// Consecutive samples required above threshold (0 disables the filter).
    pub min_consecutive_samples: usize,
}

impl Default for UnpackerConfig {
    fn default() -> Self {
        Self {
            zero_suppression_cut: 3.0,
            min_consecutive_samples: 3,
        }
    }
}

/// Channel map behaviour.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelMapConfig {
    /// Log one lookup miss out of this many.
    pub miss_log_suppression: u64,
}

impl Default for ChannelMapConfig {
    fn default() -> Self {
        Self {
            miss_log_suppression: 1000,
        }
    }
}
