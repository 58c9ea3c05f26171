//! Spatial transforms: rotation matrices and canonical axis orientation.

pub mod orientation;
pub mod rotation;

pub use orientation::{
    resolve_orientation, rotation_transform, AxisDescriptor, AxisName, OrientedHeader,
    RotationAngles, StepOverrides,
};
pub use rotation::{Mat3, Mat4};
