//! Decoded voxel buffers and the volumes that own them.

use super::header::{DataType, RawHeader};
use crate::error::{Error, Result};
use crate::transforms::orientation::{
    AxisDescriptor, AxisName, OrientedHeader, RotationAngles, StepOverrides,
};
use crate::transforms::rotation::solve_cramer;
use byteorder::{ByteOrder, NativeEndian};
use ndarray::{ArrayD, IxDyn};

/// Typed voxel storage, one variant per supported encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Int8(Vec<i8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
}

macro_rules! for_each_variant {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            VoxelData::UInt8($values) => $body,
            VoxelData::Int16($values) => $body,
            VoxelData::Int32($values) => $body,
            VoxelData::Float32($values) => $body,
            VoxelData::Float64($values) => $body,
            VoxelData::Int8($values) => $body,
            VoxelData::UInt16($values) => $body,
            VoxelData::UInt32($values) => $body,
        }
    };
}

impl VoxelData {
    /// Build a typed buffer from bytes already in host order.
    ///
    /// `bytes.len()` must be a multiple of the element width.
    pub fn from_native_bytes(datatype: DataType, bytes: &[u8]) -> Self {
        let count = bytes.len() / datatype.byte_size();
        match datatype {
            DataType::UInt8 => Self::UInt8(bytes.to_vec()),
            DataType::Int8 => Self::Int8(bytes.iter().map(|&b| b as i8).collect()),
            DataType::Int16 => {
                let mut out = vec![0i16; count];
                NativeEndian::read_i16_into(bytes, &mut out);
                Self::Int16(out)
            }
            DataType::UInt16 => {
                let mut out = vec![0u16; count];
                NativeEndian::read_u16_into(bytes, &mut out);
                Self::UInt16(out)
            }
            DataType::Int32 => {
                let mut out = vec![0i32; count];
                NativeEndian::read_i32_into(bytes, &mut out);
                Self::Int32(out)
            }
            DataType::UInt32 => {
                let mut out = vec![0u32; count];
                NativeEndian::read_u32_into(bytes, &mut out);
                Self::UInt32(out)
            }
            DataType::Float32 => {
                let mut out = vec![0f32; count];
                NativeEndian::read_f32_into(bytes, &mut out);
                Self::Float32(out)
            }
            DataType::Float64 => {
                let mut out = vec![0f64; count];
                NativeEndian::read_f64_into(bytes, &mut out);
                Self::Float64(out)
            }
        }
    }

    /// Element type of the buffer.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::UInt8(_) => DataType::UInt8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Int8(_) => DataType::Int8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        for_each_variant!(self, values => values.len())
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at a flat index, widened to f64.
    pub fn get(&self, index: usize) -> Option<f64> {
        for_each_variant!(self, values => values.get(index).map(|&v| v.to_f64()))
    }

    /// Borrow the buffer as a slice of `T`; `None` if the type differs.
    pub fn as_slice<T: VoxelElement>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    /// Copy every value into an f64 vector.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        for_each_variant!(self, values => values.iter().map(|&v| v.to_f64()).collect())
    }

    /// Map `value * slope + inter` into a new f32 buffer.
    pub fn rescale(&self, slope: f64, inter: f64) -> Self {
        Self::Float32(for_each_variant!(self, values => values
            .iter()
            .map(|&v| (v.to_f64() * slope + inter) as f32)
            .collect()))
    }

    /// Smallest and largest value, ignoring NaN.
    ///
    /// Returns `(inf, -inf)` when no value is comparable.
    pub fn min_max(&self) -> (f64, f64) {
        for_each_variant!(self, values => values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &v| {
                let v = v.to_f64();
                (lo.min(v), hi.max(v))
            }
        ))
    }
}

/// Element types that can live in a [`VoxelData`] buffer.
pub trait VoxelElement: Copy + Send + Sync + 'static {
    /// Encoding this element corresponds to.
    const DATA_TYPE: DataType;

    /// Widen to f64.
    fn to_f64(self) -> f64;

    /// Borrow `data` as `&[Self]` when the variant matches.
    fn slice(data: &VoxelData) -> Option<&[Self]>;
}

macro_rules! impl_voxel_element {
    ($ty:ty, $variant:ident) => {
        impl VoxelElement for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn slice(data: &VoxelData) -> Option<&[Self]> {
                match data {
                    VoxelData::$variant(values) => Some(values),
                    _ => None,
                }
            }
        }
    };
}

impl_voxel_element!(u8, UInt8);
impl_voxel_element!(i16, Int16);
impl_voxel_element!(i32, Int32);
impl_voxel_element!(f32, Float32);
impl_voxel_element!(f64, Float64);
impl_voxel_element!(i8, Int8);
impl_voxel_element!(u16, UInt16);
impl_voxel_element!(u32, UInt32);

/// Flat-index increments per canonical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strides {
    /// x, y and z strides in canonical order.
    pub spatial: [usize; 3],
    /// Stride of the time axis, if present.
    pub time: Option<usize>,
}

impl Strides {
    /// Row-major strides for the header's spatial order.
    ///
    /// The first axis in the order steps over whole planes, the last is contiguous.
    pub fn for_order(header: &OrientedHeader) -> Self {
        let order = header.spatial_order();
        let length = |name: AxisName| header.axis(name).map_or(0, |a| a.space_length);

        let mut spatial = [0; 3];
        let idx = |name: AxisName| name.spatial_index().unwrap_or(0);
        spatial[idx(order[0])] = length(order[1]) * length(order[2]);
        spatial[idx(order[1])] = length(order[2]);
        spatial[idx(order[2])] = 1;

        let time = header.time().map(|_| {
            header
                .spatial_axes()
                .iter()
                .map(|a| a.space_length)
                .product()
        });

        Self { spatial, time }
    }

    /// Stride for a named axis.
    pub fn get(&self, name: AxisName) -> Option<usize> {
        match name.spatial_index() {
            Some(i) => Some(self.spatial[i]),
            None => self.time,
        }
    }
}

/// Header of a decoded volume: orientation plus addressing and intensity range.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedHeader {
    oriented: OrientedHeader,
    strides: Strides,
    data_type: DataType,
    voxel_min: f64,
    voxel_max: f64,
}

impl FinalizedHeader {
    pub(crate) fn new(oriented: OrientedHeader, data: &VoxelData) -> Self {
        let strides = Strides::for_order(&oriented);
        let (voxel_min, voxel_max) = data.min_max();
        Self {
            oriented,
            strides,
            data_type: data.dtype(),
            voxel_min,
            voxel_max,
        }
    }

    /// Orientation the strides were computed for.
    pub fn oriented(&self) -> &OrientedHeader {
        &self.oriented
    }

    /// Header fields as read from disk.
    pub fn raw(&self) -> &RawHeader {
        self.oriented.raw()
    }

    /// Spatial axis order used for addressing. Time is addressed separately.
    pub fn axis_order(&self) -> [AxisName; 3] {
        self.oriented.spatial_order()
    }

    /// Look up an axis by name.
    pub fn axis(&self, name: AxisName) -> Option<&AxisDescriptor> {
        self.oriented.axis(name)
    }

    /// Flat-index strides for the current orientation.
    pub fn strides(&self) -> Strides {
        self.strides
    }

    /// Element type of the decoded buffer; `Float32` whenever rescaling ran.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Smallest decoded value, NaN excluded.
    pub fn voxel_min(&self) -> f64 {
        self.voxel_min
    }

    /// Largest decoded value, NaN excluded.
    pub fn voxel_max(&self) -> f64 {
        self.voxel_max
    }

    fn reorient_with(
        &mut self,
        update: impl FnOnce(&mut OrientedHeader) -> Result<()>,
    ) -> Result<()> {
        update(&mut self.oriented)?;
        self.strides = Strides::for_order(&self.oriented);
        Ok(())
    }
}

/// A decoded volume.
///
/// # Example
/// ```ignore
/// let mut bytes = std::fs::read("brain.nii")?;
/// let volume = niftiview::nifti::decode(&mut bytes)?;
/// let centre = volume.value_at([64, 64, 40], 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    header: FinalizedHeader,
    data: VoxelData,
}

impl Volume {
    pub(crate) fn new(oriented: OrientedHeader, data: VoxelData) -> Self {
        Self {
            header: FinalizedHeader::new(oriented, &data),
            data,
        }
    }

    /// Finalized header.
    pub fn header(&self) -> &FinalizedHeader {
        &self.header
    }

    /// Decoded voxel buffer.
    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    /// Split into header and buffer.
    pub fn into_parts(self) -> (FinalizedHeader, VoxelData) {
        (self.header, self.data)
    }

    /// Same as [`FinalizedHeader::voxel_min`].
    pub fn intensity_min(&self) -> f64 {
        self.header.voxel_min
    }

    /// Same as [`FinalizedHeader::voxel_max`].
    pub fn intensity_max(&self) -> f64 {
        self.header.voxel_max
    }

    /// Lengths of the x, y and z axes.
    pub fn shape(&self) -> [usize; 3] {
        let [x, y, z] = self.header.oriented.spatial_axes();
        [x.space_length, y.space_length, z.space_length]
    }

    /// Number of time points (1 for a purely spatial volume).
    pub fn time_points(&self) -> usize {
        self.header.oriented.time().map_or(1, |t| t.space_length)
    }

    /// Value at canonical voxel `[x, y, z]` and time point `t`.
    pub fn value_at(&self, voxel: [usize; 3], t: usize) -> Option<f64> {
        let shape = self.shape();
        if voxel.iter().zip(shape.iter()).any(|(v, len)| v >= len) || t >= self.time_points() {
            return None;
        }
        let strides = self.header.strides;
        let offset = voxel
            .iter()
            .zip(strides.spatial.iter())
            .map(|(v, s)| v * s)
            .sum::<usize>()
            + t * strides.time.unwrap_or(0);
        self.data.get(offset)
    }

    /// World coordinates of a (possibly fractional) canonical voxel position.
    pub fn voxel_to_world(&self, voxel: [f64; 3]) -> [f64; 3] {
        let axes = self.header.oriented.spatial_axes();
        let mut world = [0.0; 3];
        for (axis, v) in axes.iter().zip(voxel) {
            let along = axis.start + v * axis.step;
            for (w, c) in world.iter_mut().zip(axis.direction_cosines) {
                *w += c * along;
            }
        }
        world
    }

    /// Canonical voxel position of a world coordinate.
    pub fn world_to_voxel(&self, world: [f64; 3]) -> Result<[f64; 3]> {
        let axes = self.header.oriented.spatial_axes();
        let cosines = [
            axes[0].direction_cosines,
            axes[1].direction_cosines,
            axes[2].direction_cosines,
        ];
        let along = solve_cramer(&cosines, &world, 1e-12).ok_or_else(|| {
            Error::DegenerateOrientation("direction cosines are not invertible".into())
        })?;
        Ok([0, 1, 2].map(|k| (along[k] - axes[k].start) / axes[k].step))
    }

    /// Copy the volume into an array indexed `[x, y, z]`, or `[t, x, y, z]`
    /// when a time axis is present.
    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        let [nx, ny, nz] = self.shape();
        let strides = self.header.strides;
        let has_time = self.header.oriented.time().is_some();
        let dims: Vec<usize> = if has_time {
            vec![self.time_points(), nx, ny, nz]
        } else {
            vec![nx, ny, nz]
        };

        let values = self.data.to_f64_vec();
        let expected: usize = dims.iter().product();
        if expected != values.len() {
            return Err(Error::MalformedPayload(format!(
                "volume holds {} values but its axes describe {}",
                values.len(),
                expected
            )));
        }

        let spatial_offset = usize::from(has_time);
        let array = ArrayD::from_shape_fn(IxDyn(&dims), |idx| {
            let t = if has_time { idx[0] } else { 0 };
            let flat = (0..3)
                .map(|k| idx[spatial_offset + k] * strides.spatial[k])
                .sum::<usize>()
                + t * strides.time.unwrap_or(0);
            values.get(flat).copied().unwrap_or(f64::NAN)
        });
        Ok(array)
    }

    /// Replace the rotation angles, re-deriving orientation and strides.
    pub fn reorient(&mut self, rotation: RotationAngles) -> Result<()> {
        self.header
            .reorient_with(|oriented| oriented.set_rotation(rotation))
    }

    /// Replace the explicit step overrides, re-deriving orientation.
    pub fn set_step_overrides(&mut self, overrides: StepOverrides) -> Result<()> {
        self.header
            .reorient_with(|oriented| oriented.set_step_overrides(overrides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_native_bytes() {
        let values: Vec<i16> = vec![-2, 0, 300, i16::MAX];
        let mut bytes = vec![0u8; 8];
        NativeEndian::write_i16_into(&values, &mut bytes);

        let data = VoxelData::from_native_bytes(DataType::Int16, &bytes);
        assert_eq!(data.dtype(), DataType::Int16);
        assert_eq!(data.as_slice::<i16>().unwrap(), values.as_slice());
        assert!(data.as_slice::<u16>().is_none());

        let signed = VoxelData::from_native_bytes(DataType::Int8, &[0xFF, 0x01]);
        assert_eq!(signed, VoxelData::Int8(vec![-1, 1]));
    }

    #[test]
    fn test_rescale_produces_f32() {
        let data = VoxelData::UInt8(vec![5, 0, 255]);
        let scaled = data.rescale(2.0, 10.0);
        assert_eq!(scaled, VoxelData::Float32(vec![20.0, 10.0, 520.0]));
    }

    #[test]
    fn test_min_max_skips_nan() {
        let data = VoxelData::Float32(vec![f32::NAN, 3.0, -1.5, 7.25]);
        assert_eq!(data.min_max(), (-1.5, 7.25));

        let ints = VoxelData::UInt32(vec![4, u32::MAX, 0]);
        assert_eq!(ints.min_max(), (0.0, f64::from(u32::MAX)));
    }

    #[test]
    fn test_get_widens() {
        let data = VoxelData::Int32(vec![-7, 12]);
        assert_eq!(data.get(0), Some(-7.0));
        assert_eq!(data.get(2), None);
        assert_eq!(data.len(), 2);
        assert!(!data.is_empty());
    }

    #[test]
    fn test_voxel_element_types() {
        assert_eq!(<u8 as VoxelElement>::DATA_TYPE, DataType::UInt8);
        assert_eq!(<f64 as VoxelElement>::DATA_TYPE, DataType::Float64);
        assert_eq!(<u32 as VoxelElement>::DATA_TYPE, DataType::UInt32);
    }
}
