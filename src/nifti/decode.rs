//! NIfTI-1 decode pipeline.
//!
//! `bytes -> RawHeader -> OrientedHeader -> Volume`. Each stage takes the
//! previous one by value, so a later stage never sees a half-built header.
//! The payload is byte-swapped in place when the file order differs from the
//! host, which is why the decode entry points take `&mut [u8]`.

use super::header::{DataType, RawHeader};
use super::image::{VoxelData, Volume};
use super::report::{ErrorEvent, ErrorReporter, LogReporter};
use crate::error::{Error, Result};
use crate::transforms::orientation::{AxisName, OrientedHeader, RotationAngles, StepOverrides};
use log::{debug, trace};
use std::sync::Arc;

/// Caller-supplied orientation parameters.
///
/// # Example
/// ```ignore
/// let options = DecodeOptions::new()
///     .rotation(RotationAngles::new(0.0, 0.0, 0.0))
///     .step_override(AxisName::XSpace, 2.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DecodeOptions {
    /// Rotation applied before canonical axes are assigned.
    pub rotation: RotationAngles,
    /// Explicit steps that replace computed ones.
    pub step_overrides: StepOverrides,
}

impl DecodeOptions {
    /// Default rotation, no step overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rotation angles.
    pub fn rotation(mut self, rotation: RotationAngles) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set an explicit step for one spatial axis.
    pub fn step_override(mut self, axis: AxisName, step: f64) -> Self {
        self.step_overrides = self.step_overrides.with(axis, step);
        self
    }
}

/// Decoder with fixed options and an error side channel.
///
/// Every failure is returned and also announced once on the reporter.
#[derive(Clone)]
pub struct Decoder {
    options: DecodeOptions,
    reporter: Arc<dyn ErrorReporter>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DecodeOptions::default())
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Decoder {
    /// Decoder that reports failures through the `log` facade.
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            options,
            reporter: Arc::new(LogReporter),
        }
    }

    /// Replace the error reporter.
    pub fn with_reporter<R: ErrorReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Options every decode call uses.
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Parse the header and resolve its orientation.
    pub fn parse_header(&self, bytes: &[u8]) -> Result<OrientedHeader> {
        self.notify(self.parse_header_inner(bytes))
    }

    /// Decode the payload described by an oriented header.
    pub fn decode_voxels(&self, header: OrientedHeader, bytes: &mut [u8]) -> Result<Volume> {
        self.notify(decode_voxels_inner(header, bytes))
    }

    /// Parse, orient and decode in one call.
    pub fn decode(&self, bytes: &mut [u8]) -> Result<Volume> {
        let result = self
            .parse_header_inner(bytes)
            .and_then(|header| decode_voxels_inner(header, bytes));
        self.notify(result)
    }

    fn parse_header_inner(&self, bytes: &[u8]) -> Result<OrientedHeader> {
        let raw = RawHeader::from_bytes(bytes)?;
        OrientedHeader::new(raw, self.options.rotation, self.options.step_overrides)
    }

    fn notify<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.reporter.report(&ErrorEvent::from_error(err));
        }
        result
    }
}

/// Parse and orient a header with default options.
pub fn parse_header(bytes: &[u8]) -> Result<OrientedHeader> {
    Decoder::default().parse_header(bytes)
}

/// Decode the payload for `header` from `bytes`.
pub fn decode_voxels(header: OrientedHeader, bytes: &mut [u8]) -> Result<Volume> {
    Decoder::default().decode_voxels(header, bytes)
}

/// Decode a complete single-file NIfTI-1 buffer with default options.
pub fn decode(bytes: &mut [u8]) -> Result<Volume> {
    Decoder::default().decode(bytes)
}

/// Reverse the byte order of every `width`-byte element of `data` in place.
///
/// A trailing partial element is left untouched. Applying it twice restores
/// the input.
pub fn swap_bytes_in_place(data: &mut [u8], width: usize) {
    if width < 2 {
        return;
    }
    for chunk in data.chunks_exact_mut(width) {
        chunk.reverse();
    }
}

fn decode_voxels_inner(header: OrientedHeader, bytes: &mut [u8]) -> Result<Volume> {
    let raw = header.raw();
    let datatype = raw.data_type()?;
    check_element_width(raw, datatype)?;

    for axis in header.spatial_axes().iter().chain(header.time()) {
        if axis.space_length == 0 {
            return Err(Error::MalformedPayload(format!(
                "axis {} has zero length",
                axis.name
            )));
        }
    }

    let count = header.num_voxels();
    let region = payload_region(bytes, raw.payload_offset, count, datatype.byte_size())?;

    if raw.must_swap_bytes {
        trace!(
            "swapping {} bytes in {}-byte elements",
            region.len(),
            raw.bytes_per_voxel
        );
        swap_bytes_in_place(region, raw.bytes_per_voxel);
    }

    let mut data = VoxelData::from_native_bytes(datatype, region);

    // A zero slope means the values are stored unscaled.
    if raw.scl_slope != 0.0 {
        trace!("rescaling with slope {} and intercept {}", raw.scl_slope, raw.scl_inter);
        data = data.rescale(raw.scl_slope, raw.scl_inter);
    }

    let volume = Volume::new(header, data);
    debug!(
        "decoded {} voxels as {} in [{}, {}]",
        count,
        volume.header().data_type(),
        volume.intensity_min(),
        volume.intensity_max()
    );
    Ok(volume)
}

fn check_element_width(raw: &RawHeader, datatype: DataType) -> Result<()> {
    if raw.bytes_per_voxel != datatype.byte_size() {
        return Err(Error::MalformedPayload(format!(
            "bitpix {} does not match datatype {} (expected {})",
            raw.bitpix,
            datatype,
            datatype.byte_size() * 8
        )));
    }
    Ok(())
}

/// The exact byte range holding `count` voxels of `width` bytes.
fn payload_region(
    bytes: &mut [u8],
    offset: usize,
    count: usize,
    width: usize,
) -> Result<&mut [u8]> {
    let needed = count
        .checked_mul(width)
        .ok_or_else(|| Error::MalformedPayload("data size overflow".into()))?;
    let available = bytes.len().checked_sub(offset).ok_or_else(|| {
        Error::MalformedPayload(format!(
            "payload offset {} beyond end of buffer ({} bytes)",
            offset,
            bytes.len()
        ))
    })?;
    if available < needed {
        return Err(Error::MalformedPayload(format!(
            "payload holds {} bytes, header declares {} ({} voxels of {} bytes)",
            available, needed, count, width
        )));
    }
    if available > needed {
        trace!("ignoring {} trailing payload bytes", available - needed);
    }
    Ok(&mut bytes[offset..offset + needed])
}
