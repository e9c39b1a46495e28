//! Rigid transform in camera space (rotation + translation).
//!
//! The pose solver builds rotation rows directly from image measurements, so
//! the rotation is stored as a raw `Matrix3` rather than a unit quaternion.

use nalgebra::{Matrix3, Vector3};

/// A rigid transform: `p' = R * p + t`.
///
/// Used for the camera-to-model pose (`X_CM`) and for fixed offsets such as
/// the model-to-head translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Affine {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Affine {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Identity transform (no rotation, no translation).
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation,
        }
    }

    /// Compose two transforms: `(self ∘ other)(p) = self(other(p))`.
    pub fn compose(&self, other: &Affine) -> Affine {
        Affine {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Apply the transform to a point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}
