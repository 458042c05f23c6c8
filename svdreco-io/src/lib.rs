//! svdreco-io: File I/O for svdreco.
//!
//! This crate reads JSON event and configuration files and writes
//! reconstructed clusters (CSV or binary) and their relations (CSV).
//!

mod config;
mod error;
mod reader;
mod writer;

pub use config::{load_calibration, load_geometry, RunConfig};
pub use error::{Error, Result};
pub use reader::{parse_events, read_events, EventRecord};
pub use writer::{ClusterFileWriter, OutputFormat, RelationFileWriter, BINARY_RECORD_SIZE};
