//! Geometry utilities: rigid transforms and output-frame conversion.

pub mod affine;
pub mod frames;

pub use affine::Affine;
pub use frames::{camera_pose_to_output, euler_angles, rotation_out_cam, PoseAngles};
