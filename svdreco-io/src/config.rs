//! JSON configuration files.
//!
//! A run configuration groups the per-stage settings; every section and
//! every field is optional and falls back to its default:
//!
//! ```json
//! {
//!   "clusterizer": { "cluster_cut": 6.0, "head_tail_size": 4 },
//!   "time_fitter": { "bin_edges": [-50.0, 0.0, 50.0] },
//!   "unpacker": { "min_consecutive_samples": 0 },
//!   "channel_map": { "miss_log_suppression": 100 }
//! }
//! ```
//!
//! Calibration and geometry constants live in their own files.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use svdreco_core::{
    ChannelMapConfig, ClusterizerConfig, ConstantCalibration, StripGeometry, TimeFitterConfig,
    UnpackerConfig,
};

/// Settings of one processing run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Cluster building.
    pub clusterizer: ClusterizerConfig,
    /// Time binning of the fitter.
    pub time_fitter: TimeFitterConfig,
    /// Raw sample unpacking.
    pub unpacker: UnpackerConfig,
    /// Channel map behaviour.
    pub channel_map: ChannelMapConfig,
}

impl RunConfig {
    /// Parses and validates a run configuration.
    ///
    /// # Errors
    /// Returns an error for malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a run configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot check.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        let edges = &self.time_fitter.bin_edges;
        if edges.len() < 2 {
            return Err(Error::InvalidFormat(format!(
                "time_fitter.bin_edges needs at least 2 edges, got {}",
                edges.len()
            )));
        }
        if let Some(pair) = edges
            .windows(2)
            .find(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
        {
            return Err(Error::InvalidFormat(format!(
                "time_fitter.bin_edges must increase strictly ({} then {})",
                pair[0], pair[1]
            )));
        }
        if !is_positive(self.time_fitter.sample_interval_ns) {
            return Err(Error::InvalidFormat(
                "time_fitter.sample_interval_ns must be positive".to_string(),
            ));
        }
        let clusterizer = &self.clusterizer;
        if clusterizer.head_tail_size < ClusterizerConfig::MIN_HEAD_TAIL_SIZE {
            return Err(Error::InvalidFormat(format!(
                "clusterizer.head_tail_size must be at least {}, got {}",
                ClusterizerConfig::MIN_HEAD_TAIL_SIZE,
                clusterizer.head_tail_size
            )));
        }
        for (name, cut) in [
            ("neighbour_cut", clusterizer.neighbour_cut),
            ("seed_cut", clusterizer.seed_cut),
            ("cluster_cut", clusterizer.cluster_cut),
        ] {
            if !cut.is_finite() || cut < 0.0 {
                return Err(Error::InvalidFormat(format!(
                    "clusterizer.{name} must be a non-negative number, got {cut}"
                )));
            }
        }
        Ok(())
    }
}

/// Loads constant calibration values.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<ConstantCalibration> {
    let calibration: ConstantCalibration = read_json(path)?;
    if !is_positive(calibration.noise_adu) {
        return Err(Error::InvalidFormat(format!(
            "calibration noise_adu must be positive, got {}",
            calibration.noise_adu
        )));
    }
    Ok(calibration)
}

/// Loads strip geometry.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn load_geometry<P: AsRef<Path>>(path: P) -> Result<StripGeometry> {
    read_json(path)
}

fn is_positive(value: f64) -> bool {
    value.partial_cmp(&0.0) == Some(Ordering::Greater)
}

pub(crate) fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let file = File::open(path.as_ref())?;
    log::debug!("reading {}", path.as_ref().display());
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
