//! svdreco-core: Core types for silicon strip detector reconstruction.
//!
//! This crate provides the shared vocabulary of the reconstruction chain:
//! sensor and chip identifiers, raw and calibrated strip records, the
//! cluster record, calibration and geometry seams, and relation tables
//! linking clusters back to digits and simulation truth.
//!

pub mod calibration;
pub mod cluster;
pub mod config;
pub mod digit;
pub mod error;
pub mod geometry;
pub mod id;
pub mod relation;

pub use calibration::{ConstantCalibration, StripCalibration};
pub use cluster::{Cluster, StripContribution};
pub use config::{
    ChannelMapConfig, ClusterizerConfig, TimeEstimator, TimeFitterConfig, UnpackerConfig,
};
pub use digit::{ApvSamples, RawApvSamples, StripDigit, APV_CHANNELS, APV_SAMPLES};
pub use error::{ClusteringError, Error, Result};
pub use geometry::{SensorGeometry, SideLayout, StripGeometry};
pub use id::{ChipAddress, SensorId, Side};
pub use relation::{RelationElement, RelationKind, RelationLookup, RelationTable, RelationTarget};
