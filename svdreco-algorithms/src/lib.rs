//! svdreco-algorithms: Strip clustering for double-sided silicon strip sensors.
//!
//! This crate provides the reconstruction chain from digits to clusters:
//! - **Grouping** - maximal runs of consecutive strips on one sensor side
//! - **Time-PDF fitting** - joint cluster time from per-strip time PDFs,
//!   per-strip amplitude fits against the APV25 pulse shape
//! - **Cluster building** - charge/seed cuts, centre-of-gravity or head-tail
//!   position, Lorentz correction
//! - **Unpacking** - raw FADC/APV samples to strip digits via the channel map
//! - **Processing** - the per-event pipeline with relation propagation
//!
#![warn(missing_docs)]

mod builder;
mod fitter;
mod grouping;
mod processing;
mod unpack;

pub use builder::{normalise_samples, ClusterBuilder, PulseShape, WIDTH_TO_TAU};
pub use fitter::{beta_prime_waveform, AmplitudeFit, TimePdfFitter};
pub use grouping::group_strips;
pub use processing::{Clusterizer, EventInput, EventOutput};
pub use unpack::{UnpackStatistics, Unpacker};

// Re-export the configuration consumed here
pub use svdreco_core::{ClusterizerConfig, TimeEstimator, TimeFitterConfig, UnpackerConfig};
