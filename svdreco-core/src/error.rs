//! Error types for svdreco-core.

use crate::id::{SensorId, Side};
use thiserror::Error;

/// Result type alias for svdreco operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for svdreco operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Sensor identifier component out of its encodable range.
    #[error("invalid sensor id: layer {layer}, ladder {ladder}, sensor {sensor}")]
    InvalidSensorId { layer: u8, ladder: u8, sensor: u8 },

    /// Unknown sensor side label.
    #[error("invalid sensor side: {0:?} (expected U or V)")]
    InvalidSide(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Clustering error.
    #[error("clustering error: {0}")]
    Clustering(#[from] ClusteringError),
}

/// Errors raised while building clusters.
///
/// These are structural: the event cannot be processed further.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    /// A cluster strip has no usable raw-sample record behind it.
    #[error("digit {digit} ({sensor} {side} strip {strip}) has no raw samples attached")]
    MissingRawSamples {
        digit: usize,
        sensor: SensorId,
        side: Side,
        strip: u16,
    },

    /// A strip probability array does not match the fitter's binning.
    #[error("time probability array has {found} bins, fitter expects {expected}")]
    BinCountMismatch { expected: usize, found: usize },

    /// A strip group refers past the end of the digit collection.
    #[error("strip group refers to digit {digit}, but only {len} digits exist")]
    DigitOutOfRange { digit: usize, len: usize },
}
