//! Canonical axis orientation for parsed headers.
//!
//! A rotation built from three per-axis angles decides which canonical axis
//! (x, y or z space) each on-disk axis belongs to. The permuted transform is
//! then split into signed steps, direction cosines and start offsets in the
//! MINC convention that viewers consume:
//!
//! ```text
//! world = sum_k cos_k * (start_k + voxel_k * step_k)
//! ```

use super::rotation::{
    extend_to_mat4, mul3, rotation_x, rotation_y, rotation_z, solve_cramer, transpose3, Mat4,
};
use crate::error::{Error, Result};
use crate::nifti::header::RawHeader;
use log::{debug, trace};
use std::f64::consts::FRAC_PI_2;

/// Determinants smaller than this are treated as singular.
const DEGENERATE_EPSILON: f64 = 1e-12;

/// Name of a canonical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisName {
    /// Left-right.
    XSpace,
    /// Posterior-anterior.
    YSpace,
    /// Inferior-superior.
    ZSpace,
    /// Acquisition time.
    Time,
}

impl AxisName {
    /// The three spatial axes in canonical order.
    pub const SPATIAL: [AxisName; 3] = [Self::XSpace, Self::YSpace, Self::ZSpace];

    /// Index of a spatial axis in canonical order; `None` for time.
    pub const fn spatial_index(self) -> Option<usize> {
        match self {
            Self::XSpace => Some(0),
            Self::YSpace => Some(1),
            Self::ZSpace => Some(2),
            Self::Time => None,
        }
    }

    /// Lower-case axis label, e.g. `xspace`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::XSpace => "xspace",
            Self::YSpace => "yspace",
            Self::ZSpace => "zspace",
            Self::Time => "time",
        }
    }
}

impl std::fmt::Display for AxisName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of one canonical axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDescriptor {
    /// Which canonical axis this is.
    pub name: AxisName,
    /// Number of voxels along the axis.
    pub space_length: usize,
    /// Signed spacing between voxels.
    pub step: f64,
    /// World offset of the first voxel along the axis.
    pub start: f64,
    /// Unit direction of the axis in the rotation frame.
    pub direction_cosines: [f64; 3],
}

impl AxisDescriptor {
    fn new(name: AxisName) -> Self {
        Self {
            name,
            space_length: 0,
            step: 1.0,
            start: 0.0,
            direction_cosines: [0.0; 3],
        }
    }
}

/// Rotation angles (radians) about the x, y and z axes.
///
/// A quarter turn about every axis is the axis-aligned default.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAngles {
    /// About the x axis.
    pub x: f64,
    /// About the y axis.
    pub y: f64,
    /// About the z axis.
    pub z: f64,
}

impl Default for RotationAngles {
    fn default() -> Self {
        Self {
            x: FRAC_PI_2,
            y: FRAC_PI_2,
            z: FRAC_PI_2,
        }
    }
}

impl RotationAngles {
    /// Angles in radians about x, y and z.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Caller-supplied steps that replace computed ones.
///
/// An override of `0.0` (or NaN) counts as unset. Every override present lands
/// on the x-space step; y and z steps always keep their computed values. Later
/// axes win, so a z override beats a y override which beats an x override.
// TODO: confirm with the viewer owners whether y/z overrides should target
// their own axes before changing this.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepOverrides {
    /// Requested x-space step.
    pub x: Option<f64>,
    /// Requested y-space step; applied to x-space.
    pub y: Option<f64>,
    /// Requested z-space step; applied to x-space.
    pub z: Option<f64>,
}

impl StepOverrides {
    /// Set the override for one spatial axis. Time is ignored.
    pub fn with(mut self, axis: AxisName, step: f64) -> Self {
        match axis {
            AxisName::XSpace => self.x = Some(step),
            AxisName::YSpace => self.y = Some(step),
            AxisName::ZSpace => self.z = Some(step),
            AxisName::Time => {}
        }
        self
    }

    fn x_step(&self) -> Option<f64> {
        [self.x, self.y, self.z]
            .into_iter()
            .flatten()
            .filter(|s| *s != 0.0 && !s.is_nan())
            .last()
    }
}

/// Output of one orientation pass. Applied to a header only on success.
#[derive(Debug, Clone)]
struct Resolved {
    spatial_order: [AxisName; 3],
    axis_index_from_file: [usize; 3],
    transform: Mat4,
    axes: [AxisDescriptor; 3],
}

/// A parsed header with canonical spatial metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedHeader {
    raw: RawHeader,
    rotation: RotationAngles,
    step_overrides: StepOverrides,
    spatial_order: [AxisName; 3],
    axis_index_from_file: [usize; 3],
    transform: Mat4,
    axes: [AxisDescriptor; 3],
    time: Option<AxisDescriptor>,
}

impl OrientedHeader {
    /// Orient a raw header.
    pub fn new(
        raw: RawHeader,
        rotation: RotationAngles,
        step_overrides: StepOverrides,
    ) -> Result<Self> {
        let resolved = resolve(&raw, &rotation, &step_overrides)?;
        let time = raw.has_time_axis().then(|| AxisDescriptor {
            name: AxisName::Time,
            space_length: usize::from(raw.time_length),
            step: raw.time_step,
            start: 0.0,
            direction_cosines: [0.0; 3],
        });

        let mut header = Self {
            raw,
            rotation,
            step_overrides,
            spatial_order: AxisName::SPATIAL,
            axis_index_from_file: [0, 1, 2],
            transform: [[0.0; 4]; 4],
            axes: AxisName::SPATIAL.map(AxisDescriptor::new),
            time,
        };
        header.apply(resolved);
        Ok(header)
    }

    /// Re-derive spatial metadata from the current rotation and step overrides.
    ///
    /// Repeated calls give the same result. On error the header is unchanged.
    pub fn resolve_orientation(&mut self) -> Result<()> {
        let resolved = resolve(&self.raw, &self.rotation, &self.step_overrides)?;
        self.apply(resolved);
        Ok(())
    }

    /// Replace the rotation angles and re-derive orientation.
    pub fn set_rotation(&mut self, rotation: RotationAngles) -> Result<()> {
        let resolved = resolve(&self.raw, &rotation, &self.step_overrides)?;
        self.rotation = rotation;
        self.apply(resolved);
        Ok(())
    }

    /// Replace the step overrides and re-derive orientation.
    pub fn set_step_overrides(&mut self, step_overrides: StepOverrides) -> Result<()> {
        let resolved = resolve(&self.raw, &self.rotation, &step_overrides)?;
        self.step_overrides = step_overrides;
        self.apply(resolved);
        Ok(())
    }

    fn apply(&mut self, resolved: Resolved) {
        self.spatial_order = resolved.spatial_order;
        self.axis_index_from_file = resolved.axis_index_from_file;
        self.transform = resolved.transform;
        self.axes = resolved.axes;
    }

    /// Header fields as read from disk.
    pub fn raw(&self) -> &RawHeader {
        &self.raw
    }

    /// Rotation angles the orientation was derived from.
    pub fn rotation(&self) -> RotationAngles {
        self.rotation
    }

    /// Explicit steps currently applied.
    pub fn step_overrides(&self) -> StepOverrides {
        self.step_overrides
    }

    /// Spatial axes, slowest-varying on disk first.
    pub fn spatial_order(&self) -> [AxisName; 3] {
        self.spatial_order
    }

    /// Full axis order with the time axis, if any, in front.
    pub fn axis_order(&self) -> Vec<AxisName> {
        self.time
            .iter()
            .map(|t| t.name)
            .chain(self.spatial_order)
            .collect()
    }

    /// Canonical axis index for each on-disk axis, fastest-varying first.
    pub fn axis_index_from_file(&self) -> [usize; 3] {
        self.axis_index_from_file
    }

    /// Rotation transform with columns permuted into canonical order.
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// Look up an axis by name.
    pub fn axis(&self, name: AxisName) -> Option<&AxisDescriptor> {
        match name.spatial_index() {
            Some(i) => Some(&self.axes[i]),
            None => self.time.as_ref(),
        }
    }

    /// The x, y and z axes in canonical order.
    pub fn spatial_axes(&self) -> &[AxisDescriptor; 3] {
        &self.axes
    }

    /// The time axis, if the header declares one.
    pub fn time(&self) -> Option<&AxisDescriptor> {
        self.time.as_ref()
    }

    /// Number of voxels across all axes, time included.
    pub fn num_voxels(&self) -> usize {
        let spatial: usize = self.axes.iter().map(|a| a.space_length).product();
        spatial * self.time.as_ref().map_or(1, |t| t.space_length)
    }
}

/// Re-derive the orientation of `header` in place.
///
/// Free-function form of [`OrientedHeader::resolve_orientation`].
pub fn resolve_orientation(header: &mut OrientedHeader) -> Result<()> {
    header.resolve_orientation()
}

/// Homogeneous rotation for the given angles.
///
/// The rotation is `Rx * Ry * Rz`; column `i` of the result holds row `i` of
/// that product, which is how viewers read the column-major composition.
pub fn rotation_transform(angles: &RotationAngles) -> Mat4 {
    let m = mul3(
        &mul3(&rotation_x(angles.x), &rotation_y(angles.y)),
        &rotation_z(angles.z),
    );
    extend_to_mat4(&transpose3(&m))
}

/// Canonical axis for the on-disk axis stored in column `column`.
///
/// An axis must be strictly largest to win; ties go to z-space.
fn dominant_axis(xfm: &Mat4, column: usize) -> usize {
    let c_x = xfm[0][column].abs();
    let c_y = xfm[1][column].abs();
    let c_z = xfm[2][column].abs();

    if c_x > c_y && c_x > c_z {
        0
    } else if c_y > c_x && c_y > c_z {
        1
    } else {
        2
    }
}

/// Assign each on-disk axis to a canonical axis.
///
/// Returns the spatial order (slowest on disk first) and, per on-disk axis,
/// the canonical index it was assigned.
fn assign_axes(xfm: &Mat4) -> ([AxisName; 3], [usize; 3]) {
    let mut order = AxisName::SPATIAL;
    let mut axis_index_from_file = [0, 1, 2];
    for (i, slot) in axis_index_from_file.iter_mut().enumerate() {
        let axis = dominant_axis(xfm, i);
        *slot = axis;
        order[2 - i] = AxisName::SPATIAL[axis];
    }
    (order, axis_index_from_file)
}

/// Scatter the columns of `xfm` into canonical column positions.
fn permute_transform(xfm: &Mat4, axis_index_from_file: &[usize; 3]) -> Mat4 {
    let mut transform = [[0.0; 4]; 4];
    transform[3][3] = 1.0;
    for (dst, src) in transform.iter_mut().zip(xfm.iter()).take(3) {
        for (j, &value) in src.iter().enumerate() {
            let volume_axis = if j < 3 { axis_index_from_file[j] } else { j };
            dst[volume_axis] = value;
        }
    }
    transform
}

/// Length of the rotational part of a transform row, never zero.
fn magnitude(row: &[f64; 4]) -> f64 {
    let dot = row[0] * row[0] + row[1] * row[1] + row[2] * row[2];
    if dot <= 0.0 {
        1.0
    } else {
        dot.sqrt()
    }
}

/// Split a permuted transform into per-axis steps, cosines and starts.
fn decompose(transform: &Mat4, overrides: &StepOverrides) -> Result<[AxisDescriptor; 3]> {
    let mut steps = [0.0; 3];
    for (k, step) in steps.iter_mut().enumerate() {
        let mag = magnitude(&transform[k]);
        *step = if transform[k][k] < 0.0 { -mag } else { mag };
    }
    if let Some(step) = overrides.x_step() {
        trace!("x-space step overridden: {} -> {}", steps[0], step);
        steps[0] = step;
    }

    let mut cosines = [[0.0; 3]; 3];
    for (k, cos) in cosines.iter_mut().enumerate() {
        for (i, value) in cos.iter_mut().enumerate() {
            *value = transform[i][k] / steps[k];
        }
    }

    let translation = [transform[0][3], transform[1][3], transform[2][3]];
    let starts = solve_cramer(&cosines, &translation, DEGENERATE_EPSILON).ok_or_else(|| {
        Error::DegenerateOrientation(format!(
            "direction cosines {:?} do not span three dimensions",
            cosines
        ))
    })?;

    Ok([0, 1, 2].map(|k| AxisDescriptor {
        name: AxisName::SPATIAL[k],
        space_length: 0,
        step: steps[k],
        start: starts[k],
        direction_cosines: cosines[k],
    }))
}

fn resolve(
    raw: &RawHeader,
    rotation: &RotationAngles,
    overrides: &StepOverrides,
) -> Result<Resolved> {
    let xfm = rotation_transform(rotation);
    let (spatial_order, axis_index_from_file) = assign_axes(&xfm);
    let transform = permute_transform(&xfm, &axis_index_from_file);
    let mut axes = decompose(&transform, overrides)?;

    // dim[1] belongs to the last axis of the order, dim[3] to the first.
    for (i, &length) in raw.dim.iter().enumerate() {
        axes[axis_index_from_file[i]].space_length = usize::from(length);
    }

    debug!(
        "resolved orientation {:?} (file axes -> {:?}), steps [{}, {}, {}]",
        spatial_order, axis_index_from_file, axes[0].step, axes[1].step, axes[2].step
    );

    Ok(Resolved {
        spatial_order,
        axis_index_from_file,
        transform,
        axes,
    })
}
