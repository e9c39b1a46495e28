//! Rigid 3-point model geometry.
//!
//! The model is described by two vectors from the model origin to the two
//! satellite markers. Everything derived from them (plane normal, projection
//! matrix) is computed once at construction; a settings change rebuilds the
//! whole model rather than patching fields.

use nalgebra::{Matrix2, SVector, Vector2, Vector3};

/// Rigid marker geometry: origin plus two satellites.
#[derive(Debug, Clone, PartialEq)]
pub struct PointModel {
    /// Model origin → first satellite.
    pub m01: Vector3<f64>,
    /// Model origin → second satellite.
    pub m02: Vector3<f64>,
    /// Unit normal of the marker plane.
    pub u: Vector3<f64>,
    /// Inverse-Gram projection onto the (m01, m02) basis.
    pub p: Matrix2<f64>,
}

impl PointModel {
    /// Number of markers the extractor must deliver for a pose update.
    pub const N_POINTS: usize = 3;

    pub fn new(m01: Vector3<f64>, m02: Vector3<f64>) -> Self {
        let u = m01.cross(&m02).normalize();

        let s11 = m01.dot(&m01);
        let s12 = m01.dot(&m02);
        let s22 = m02.dot(&m02);
        let p = Matrix2::new(s22, -s12, -s12, s11) / (s11 * s22 - s12 * s12);

        Self { m01, m02, u, p }
    }

    /// Order the model markers (origin, m01, m02) by projection onto the
    /// satellite baseline. Paired with the same ordering of image points to
    /// establish correspondence.
    pub fn model_order(&self) -> [usize; Self::N_POINTS] {
        let d = self.m01 - self.m02;
        d_order(&[Vector3::zeros(), self.m01, self.m02], &d)
    }

    /// Order image points by projection onto the baseline between the first
    /// two detections.
    pub fn point_order(&self, points: &[Vector2<f64>; Self::N_POINTS]) -> [usize; Self::N_POINTS] {
        let d = points[0] - points[1];
        d_order(points, &d)
    }
}

/// Sort indices of a 3-point set by the scalar projection onto `d`,
/// ascending.
fn d_order<const D: usize>(
    points: &[SVector<f64, D>; PointModel::N_POINTS],
    d: &SVector<f64, D>,
) -> [usize; PointModel::N_POINTS] {
    let mut keyed: [(f64, usize); PointModel::N_POINTS] =
        [(0.0, 0); PointModel::N_POINTS];
    for (i, p) in points.iter().enumerate() {
        keyed[i] = (d.dot(p), i);
    }
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    [keyed[0].1, keyed[1].1, keyed[2].1]
}
