//! Error types for NIfTI decoding.

use thiserror::Error;

/// Errors produced while decoding a NIfTI volume.
///
/// Every variant is fatal for the decode call that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The size marker or the trailing magic tag does not identify a NIfTI-1 file.
    #[error("invalid NIfTI magic: {0}")]
    BadMagic(String),

    /// The header declares a dimensionality other than 3 or 4.
    #[error("cannot handle {0}-dimensional images")]
    UnsupportedDimensionality(u16),

    /// The voxel datatype code is not one of the eight supported encodings.
    #[error("unsupported data type: {0}")]
    UnsupportedDatatype(u16),

    /// The payload region disagrees with what the header declares.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The buffer cannot hold a complete header.
    #[error("header too short: got {len} bytes, need {needed}")]
    TruncatedHeader { len: usize, needed: usize },

    /// The direction cosines do not span three dimensions.
    #[error("degenerate orientation: {0}")]
    DegenerateOrientation(String),
}

/// Specialized Result type for decode operations.
pub type Result<T> = std::result::Result<T, Error>;
