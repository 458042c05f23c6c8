//! Channel map error types.

use thiserror::Error;

/// Result type for channel map operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Channel map error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed XML.
    #[error("XML error at byte {position}: {message}")]
    Xml { position: usize, message: String },

    /// A required attribute is absent.
    #[error("<{element}> is missing attribute {attribute:?}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// An attribute value cannot be interpreted.
    #[error("<{element}> has invalid {attribute}={value:?}")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    /// An element appears outside its required parent.
    #[error("<{element}> outside of <{expected_parent}>")]
    UnexpectedElement {
        element: &'static str,
        expected_parent: &'static str,
    },

    /// A chip's channel-0 and channel-127 strips are not 127 strips apart.
    #[error("chip FADC {fadc} APV {apv}: strips {first}..{last} do not span one APV")]
    InvalidStripRange {
        fadc: u8,
        apv: u8,
        first: u16,
        last: u16,
    },

    /// The description contains no chips.
    #[error("channel map description contains no chips")]
    EmptyMap,

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] svdreco_core::Error),
}
