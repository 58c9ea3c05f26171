//! `NIfTI-1` header parsing and representation.
//!
//! Only the single-file (`n+1`) layout is accepted. Byte order is detected from
//! the `sizeof_hdr` marker and every multi-byte field is decoded with it.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, trace};

/// NIfTI-1 header field byte offsets.
mod offsets {
    pub const SIZEOF_HDR: usize = 0;
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const XYZT_UNITS: usize = 123;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const MAGIC: usize = 344;
}

/// `sizeof_hdr` as it reads when the file and the reader agree on byte order.
const SIZEOF_HDR_LE: u32 = 0x0000_015C;
/// `sizeof_hdr` as it reads when the file is big endian.
const SIZEOF_HDR_BE: u32 = 0x5C01_0000;

const NIFTI1_MAGIC: &[u8; 4] = b"n+1\0";

/// Payload offsets below this are raised to it (348-byte header + 4-byte extender).
pub const MIN_PAYLOAD_OFFSET: usize = 352;

/// Byte order of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Self::Little => LittleEndian::read_u16(buf),
            Self::Big => BigEndian::read_u16(buf),
        }
    }
}

/// `NIfTI` voxel data type codes supported by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8 = 2,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Signed 32-bit integer
    Int32 = 8,
    /// 32-bit floating point
    Float32 = 16,
    /// 64-bit floating point
    Float64 = 64,
    /// Signed 8-bit integer
    Int8 = 256,
    /// Unsigned 16-bit integer
    UInt16 = 512,
    /// Unsigned 32-bit integer
    UInt32 = 768,
}

impl DataType {
    /// Parse from `NIfTI` datatype code.
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            256 => Ok(Self::Int8),
            512 => Ok(Self::UInt16),
            768 => Ok(Self::UInt32),
            _ => Err(Error::UnsupportedDatatype(code)),
        }
    }

    /// The on-disk code for this type.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Returns true for the two floating point encodings.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Short element type name, e.g. `i16`.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::Int8 => "i8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Spatial units for voxel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialUnits {
    #[default]
    /// Units are not specified.
    Unknown,
    /// Voxel dimensions expressed in meters.
    Meter,
    /// Voxel dimensions expressed in millimeters.
    Millimeter,
    /// Voxel dimensions expressed in micrometers.
    Micrometer,
}

impl SpatialUnits {
    fn from_code(code: u8) -> Self {
        match code & 0x07 {
            1 => Self::Meter,
            2 => Self::Millimeter,
            3 => Self::Micrometer,
            _ => Self::Unknown,
        }
    }
}

/// Temporal units for time dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporalUnits {
    #[default]
    /// Temporal spacing unspecified.
    Unknown,
    /// Temporal spacing in seconds.
    Second,
    /// Temporal spacing in milliseconds.
    Millisecond,
    /// Temporal spacing in microseconds.
    Microsecond,
}

impl TemporalUnits {
    fn from_code(code: u8) -> Self {
        match code & 0x38 {
            0x08 => Self::Second,
            0x10 => Self::Millisecond,
            0x18 => Self::Microsecond,
            _ => Self::Unknown,
        }
    }
}

/// Header fields as stored on disk, before any orientation is derived.
///
/// Spatial lengths are kept in on-disk order (`dim[1..=3]`); the orientation
/// resolver decides which canonical axis each of them belongs to. The datatype
/// code is kept raw because an unsupported code only becomes an error once the
/// payload is decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeader {
    /// File byte order.
    pub byte_order: Endianness,
    /// Number of dimensions (3 or 4).
    pub ndim: u16,
    /// On-disk spatial lengths, fastest-varying first.
    pub dim: [u16; 3],
    /// Length of the time axis (`dim[4]`); zero means no time axis.
    pub time_length: u16,
    /// Spacing of the time axis (`pixdim[4]`).
    pub time_step: f64,
    /// Raw voxel datatype code.
    pub datatype_code: u16,
    /// Bits per voxel.
    pub bitpix: u16,
    /// `bitpix / 8`.
    pub bytes_per_voxel: usize,
    /// True when the payload must be byte-swapped to host order.
    pub must_swap_bytes: bool,
    /// Byte offset of the voxel payload.
    pub payload_offset: usize,
    /// Data scaling slope; zero disables scaling.
    pub scl_slope: f64,
    /// Data scaling intercept.
    pub scl_inter: f64,
    /// Spatial units.
    pub spatial_units: SpatialUnits,
    /// Temporal units.
    pub temporal_units: TemporalUnits,
    /// Description string.
    pub descrip: String,
    /// qform transform code.
    pub qform_code: i16,
    /// sform transform code.
    pub sform_code: i16,
}

impl RawHeader {
    /// Size of a NIfTI-1 header in bytes.
    pub const SIZE: usize = 348;

    /// Read a header from the start of `bytes`.
    ///
    /// The size marker, the dimensionality and the trailing magic are all checked
    /// before anything is reported. When more than one check fails, the last one
    /// in that order determines the returned error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        use offsets::{DIM, MAGIC, SIZEOF_HDR};

        if bytes.len() < Self::SIZE {
            return Err(Error::TruncatedHeader {
                len: bytes.len(),
                needed: Self::SIZE,
            });
        }

        let mut failure = None;

        let sizeof_hdr = LittleEndian::read_u32(&bytes[SIZEOF_HDR..SIZEOF_HDR + 4]);
        let byte_order = match sizeof_hdr {
            SIZEOF_HDR_LE => Endianness::Little,
            SIZEOF_HDR_BE => Endianness::Big,
            other => {
                trace!("sizeof_hdr marker {:#010x} not recognised", other);
                failure = Some(Error::BadMagic(format!(
                    "size marker {:#010x} does not look like a NIfTI-1 file",
                    other
                )));
                Endianness::Little
            }
        };

        let ndim = byte_order.read_u16(&bytes[DIM..DIM + 2]);
        if !(3..=4).contains(&ndim) {
            trace!("dimensionality {} outside 3..=4", ndim);
            failure = Some(Error::UnsupportedDimensionality(ndim));
        }

        let magic = &bytes[MAGIC..MAGIC + 4];
        if magic != NIFTI1_MAGIC {
            trace!("trailing magic {:?} does not match", magic);
            failure = Some(Error::BadMagic(format!(
                "bad magic number: '{}'",
                String::from_utf8_lossy(magic).escape_default()
            )));
        }

        if let Some(err) = failure {
            return Err(err);
        }

        match byte_order {
            Endianness::Little => Self::parse::<LittleEndian>(bytes, byte_order, ndim),
            Endianness::Big => Self::parse::<BigEndian>(bytes, byte_order, ndim),
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse<E: ByteOrder>(bytes: &[u8], byte_order: Endianness, ndim: u16) -> Result<Self> {
        use offsets::*;

        let read_u16 = |offset: usize| E::read_u16(&bytes[offset..offset + 2]);
        let read_f32 = |offset: usize| E::read_f32(&bytes[offset..offset + 4]);

        let dim = [read_u16(DIM + 2), read_u16(DIM + 4), read_u16(DIM + 6)];
        let time_length = read_u16(DIM + 8);

        let vox_offset_raw = read_f32(VOX_OFFSET);
        if !vox_offset_raw.is_finite() {
            return Err(Error::MalformedPayload(format!(
                "vox_offset must be finite, got {}",
                vox_offset_raw
            )));
        }
        let payload_offset = if vox_offset_raw < MIN_PAYLOAD_OFFSET as f32 {
            MIN_PAYLOAD_OFFSET
        } else {
            vox_offset_raw as usize
        };

        let bitpix = read_u16(BITPIX);
        let bytes_per_voxel = usize::from(bitpix / 8);
        let must_swap_bytes = byte_order != Endianness::native() && bytes_per_voxel > 1;

        let xyzt_units = bytes[XYZT_UNITS];
        let descrip = String::from_utf8_lossy(&bytes[DESCRIP..AUX_FILE])
            .trim_end_matches('\0')
            .to_string();

        let header = Self {
            byte_order,
            ndim,
            dim,
            time_length,
            // pixdim[4]
            time_step: f64::from(read_f32(PIXDIM + 16)),
            datatype_code: read_u16(DATATYPE),
            bitpix,
            bytes_per_voxel,
            must_swap_bytes,
            payload_offset,
            scl_slope: f64::from(read_f32(SCL_SLOPE)),
            scl_inter: f64::from(read_f32(SCL_INTER)),
            spatial_units: SpatialUnits::from_code(xyzt_units),
            temporal_units: TemporalUnits::from_code(xyzt_units),
            descrip,
            qform_code: E::read_i16(&bytes[QFORM_CODE..QFORM_CODE + 2]),
            sform_code: E::read_i16(&bytes[SFORM_CODE..SFORM_CODE + 2]),
        };

        debug!(
            "parsed NIfTI-1 header: {:?} endian, dim {:?} x {}, datatype {}, offset {}",
            header.byte_order, header.dim, header.time_length, header.datatype_code, payload_offset
        );
        Ok(header)
    }

    /// Resolve the datatype code to a supported encoding.
    pub fn data_type(&self) -> Result<DataType> {
        DataType::from_code(self.datatype_code)
    }

    /// Returns true if the header declares a time axis.
    pub fn has_time_axis(&self) -> bool {
        self.time_length >= 1
    }

    /// Returns true if file is little endian.
    pub fn is_little_endian(&self) -> bool {
        self.byte_order == Endianness::Little
    }
}
