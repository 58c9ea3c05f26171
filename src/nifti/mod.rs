//! `NIfTI` file format support.
//!
//! `NIfTI` (Neuroimaging Informatics Technology Initiative) is a standard format
//! for neuroimaging data. This module decodes single-file NIfTI-1 buffers into
//! canonically oriented volumes for viewers. Decoding is read-only and performs
//! no I/O; callers hand in the bytes.

pub mod decode;
pub mod header;
pub mod image;
pub mod report;

pub use decode::{
    decode, decode_voxels, parse_header, swap_bytes_in_place, DecodeOptions, Decoder,
};
pub use header::{DataType, Endianness, RawHeader, SpatialUnits, TemporalUnits};
pub use image::{FinalizedHeader, Strides, Volume, VoxelData, VoxelElement};
pub use report::{ChannelReporter, ErrorEvent, ErrorReporter, LogReporter, ERROR_EVENT};
