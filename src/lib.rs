//! niftiview - NIfTI-1 volume decoding for viewers.
//!
//! Turns a raw `.nii` byte buffer into a typed voxel buffer plus the spatial
//! metadata a viewer needs: canonical axis order, signed steps, starts,
//! direction cosines, strides and intensity range.
//!
//! # Example
//!
//! ```rust,ignore
//! use niftiview::nifti::{self, DecodeOptions, Decoder};
//! use niftiview::transforms::{AxisName, RotationAngles};
//!
//! let mut bytes = std::fs::read("brain.nii")?;
//! let decoder = Decoder::new(DecodeOptions::new().step_override(AxisName::XSpace, 1.5));
//! let mut volume = decoder.decode(&mut bytes)?;
//!
//! println!("{:?} {:?}", volume.header().axis_order(), volume.shape());
//! volume.reorient(RotationAngles::new(0.0, 0.0, 0.0))?;
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod nifti;
pub mod transforms;

pub use error::{Error, Result};
pub use nifti::{decode, DecodeOptions, Decoder, Volume, VoxelData};
pub use transforms::{AxisName, RotationAngles, StepOverrides};
