//! Coordinate frame conversion between the tracker's camera space and the
//! output yaw/pitch/roll convention.
//!
//! # Frame conventions
//!
//! ## Camera frame (graphics convention, where the pose solver lives)
//! - X: right
//! - Y: up
//! - Z: toward the viewer (out of the scene)
//!
//! ## Output frame (roll-pitch-yaw convention consumed by clients)
//! - X: forward
//! - Y: left
//! - Z: up
//!
//! The solver is deliberately convention-agnostic: it reports poses in camera
//! space, and this module performs the basis change exactly once, at the
//! pose-read site. Angles are reported in degrees, translations in
//! centimeters (model geometry is in millimeters).
//!
//! Naming follows `R_target_source`: `rotation_out_cam()` takes camera-frame
//! vectors to output-frame vectors.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::Affine;

/// Model geometry is in millimeters; output translations are centimeters.
const MM_PER_CM: f64 = 10.0;

/// Head pose in the output convention: angles in degrees, translation in
/// centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

/// Fixed rotation taking camera-frame axes to output-frame axes.
///
/// Maps:
/// - Camera −Z (into the scene) → Output +X (forward)
/// - Camera −X (left)           → Output +Y (left)
/// - Camera +Y (up)             → Output +Z (up)
#[rustfmt::skip]
pub fn rotation_out_cam() -> Matrix3<f64> {
    Matrix3::new(
         0.0, 0.0, -1.0,  // Out X = -Camera Z
        -1.0, 0.0,  0.0,  // Out Y = -Camera X
         0.0, 1.0,  0.0,  // Out Z =  Camera Y
    )
}

/// Extract Euler angles from an output-frame rotation.
///
/// Returns `(alpha, beta, gamma)` in radians where `alpha` rotates about
/// output Z (yaw), `beta` about output Y (pitch, sign-flipped by the caller)
/// and `gamma` about output X (roll).
///
/// The `sqrt` argument is a sum of squares and therefore never negative.
/// Near gimbal lock (`r[(2,1)] ≈ r[(2,2)] ≈ 0`) the `gamma` extraction is
/// ill-conditioned; that is inherent to the Euler decomposition.
pub fn euler_angles(r: &Matrix3<f64>) -> (f64, f64, f64) {
    let beta = (-r[(2, 0)]).atan2((r[(2, 1)] * r[(2, 1)] + r[(2, 2)] * r[(2, 2)]).sqrt());
    let alpha = r[(1, 0)].atan2(r[(0, 0)]);
    let gamma = r[(2, 1)].atan2(r[(2, 2)]);
    (alpha, beta, gamma)
}

/// Convert a camera-to-model pose plus a fixed model-to-head offset into the
/// output angle/translation convention.
///
/// Steps:
/// 1. compose the pose with the head offset translation to get camera-to-head;
/// 2. change basis with [`rotation_out_cam`]: `R' = R_oc · R · R_ocᵗ`;
/// 3. extract Euler angles from `R'`;
/// 4. scale the translation from millimeters to centimeters.
pub fn camera_pose_to_output(pose: &Affine, head_offset: &Vector3<f64>) -> PoseAngles {
    let camera_to_head = pose.compose(&Affine::from_translation(*head_offset));

    let r_oc = rotation_out_cam();
    let r_out = r_oc * camera_to_head.rotation * r_oc.transpose();
    let (alpha, beta, gamma) = euler_angles(&r_out);

    let t = camera_to_head.translation;
    PoseAngles {
        yaw: alpha.to_degrees(),
        pitch: (-beta).to_degrees(),
        roll: gamma.to_degrees(),
        tx: t.x / MM_PER_CM,
        ty: t.y / MM_PER_CM,
        tz: t.z / MM_PER_CM,
    }
}
