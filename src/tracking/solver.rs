//! Camera-to-model pose recovery from one frame's marker detections.
//!
//! Correspondence uses the freetrack-style baseline-projection sort: image
//! points and model markers are each ordered by projection onto their
//! respective baselines, then paired rank-for-rank. This relies on the
//! extractor's stable scan-order enumeration; it is an initialization-grade
//! heuristic, not a general matcher.
//!
//! The pose itself comes from coplanar POSIT (Oberkampf, DeMenthon, Davis:
//! "Iterative Pose Estimation Using Coplanar Feature Points"), which refines
//! a scaled-orthographic estimate to the perspective solution and resolves
//! the two-fold plane ambiguity toward the expected (identity) rotation.

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::geometry::Affine;

use super::model::PointModel;

const MAX_ITERATIONS: usize = 100;
const EPS_THRESHOLD: f64 = 1e-4;

/// Default model distance: one meter in front of the camera, in millimeters.
const DEFAULT_DISTANCE: f64 = 1000.0;

/// Iterative pose estimator holding the last recovered camera-to-model pose.
pub struct PointTracker {
    pose: Affine,
    focal_length: f64,
}

impl PointTracker {
    pub fn new() -> Self {
        Self::with_focal_length(1.0)
    }

    /// Focal length is in normalized-width units and must match the
    /// convention of the incoming image points.
    pub fn with_focal_length(focal_length: f64) -> Self {
        Self {
            pose: Affine::new(
                Matrix3::identity(),
                Vector3::new(0.0, 0.0, DEFAULT_DISTANCE),
            ),
            focal_length,
        }
    }

    /// Last recovered camera-to-model pose.
    pub fn pose(&self) -> Affine {
        self.pose.clone()
    }

    /// Update the pose from one frame's detections. Returns the number of
    /// refinement iterations spent.
    pub fn track(
        &mut self,
        points: &[Vector2<f64>; PointModel::N_POINTS],
        model: &PointModel,
    ) -> usize {
        let order = find_correspondences(points, model);
        self.posit(model, &order)
    }

    /// Coplanar POSIT. `order[i]` is the image point of model marker `i`
    /// (origin, m01, m02).
    fn posit(
        &mut self,
        model: &PointModel,
        order: &[Vector2<f64>; PointModel::N_POINTS],
    ) -> usize {
        // The branch closer to this rotation wins the plane ambiguity.
        let r_expected = Matrix3::<f64>::identity();

        let mut k: Vector3<f64> = r_expected.row(2).transpose();
        let mut z0 = DEFAULT_DISTANCE;

        let mut old_epsilon = (0.0_f64, 0.0_f64);
        let mut r_current = r_expected;

        let mut iterations = 0;
        for i in 1..MAX_ITERATIONS {
            iterations = i;

            let epsilon_1 = k.dot(&model.m01) / z0;
            let epsilon_2 = k.dot(&model.m02) / z0;

            // Scalar products <I0, M0i> and <J0, M0i> from the image.
            let i0_m0i = Vector2::new(
                order[1].x * (1.0 + epsilon_1) - order[0].x,
                order[2].x * (1.0 + epsilon_2) - order[0].x,
            );
            let j0_m0i = Vector2::new(
                order[1].y * (1.0 + epsilon_1) - order[0].y,
                order[2].y * (1.0 + epsilon_2) - order[0].y,
            );

            // Projections of I, J onto the marker plane.
            let i0_coeff = model.p * i0_m0i;
            let j0_coeff = model.p * j0_m0i;
            let i0 = i0_coeff.x * model.m01 + i0_coeff.y * model.m02;
            let j0 = j0_coeff.x * model.m01 + j0_coeff.y * model.m02;

            // Out-of-plane component via rho/theta.
            let ii0 = i0.dot(&i0);
            let ij0 = i0.dot(&j0);
            let jj0 = j0.dot(&j0);
            let (rho, theta) = if jj0 == ii0 {
                let rho = (2.0 * ij0).abs().sqrt();
                let theta = if ij0 < 0.0 {
                    std::f64::consts::FRAC_PI_4
                } else {
                    -std::f64::consts::FRAC_PI_4
                };
                (rho, theta)
            } else {
                let rho = ((jj0 - ii0) * (jj0 - ii0) + 4.0 * ij0 * ij0).sqrt().sqrt();
                let mut theta = (-2.0 * ij0 / (jj0 - ii0)).atan();
                if jj0 - ii0 < 0.0 {
                    theta += std::f64::consts::PI;
                }
                (rho, theta / 2.0)
            };

            // The two candidate solutions.
            let i_1 = i0 + rho * theta.cos() * model.u;
            let i_2 = i0 - rho * theta.cos() * model.u;
            let j_1 = j0 + rho * theta.sin() * model.u;
            let j_2 = j0 - rho * theta.sin() * model.u;

            let norm = i_1.norm(); // all four candidates share it
            if norm <= f64::EPSILON {
                // Degenerate detections; keep the previous pose.
                return iterations;
            }
            let norm_const = 1.0 / norm;

            let i_1 = i_1 * norm_const;
            let j_1 = j_1 * norm_const;
            let i_2 = i_2 * norm_const;
            let j_2 = j_2 * norm_const;

            let r_1 = Matrix3::from_rows(&[
                i_1.transpose(),
                j_1.transpose(),
                i_1.cross(&j_1).transpose(),
            ]);
            let r_2 = Matrix3::from_rows(&[
                i_2.transpose(),
                j_2.transpose(),
                i_2.cross(&j_2).transpose(),
            ]);

            // The single translation solution.
            z0 = norm_const * self.focal_length;

            // Pick the branch closer to the expected rotation,
            // d(A,B) = ||I - A Bᵗ||.
            let deviation_1 = (Matrix3::identity() - r_expected * r_1.transpose()).norm();
            let deviation_2 = (Matrix3::identity() - r_expected * r_2.transpose()).norm();
            r_current = if deviation_1 < deviation_2 { r_1 } else { r_2 };

            k = r_current.row(2).transpose();

            if (epsilon_1 - old_epsilon.0).abs() + (epsilon_2 - old_epsilon.1).abs()
                < EPS_THRESHOLD
            {
                break;
            }
            old_epsilon = (epsilon_1, epsilon_2);
        }

        self.pose = Affine::new(
            r_current,
            Vector3::new(
                order[0].x * z0 / self.focal_length,
                order[0].y * z0 / self.focal_length,
                z0,
            ),
        );
        iterations
    }
}

impl Default for PointTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Pair image points with model markers by rank along their baselines.
/// Slot `i` of the result is the image point of model marker `i`.
fn find_correspondences(
    points: &[Vector2<f64>; PointModel::N_POINTS],
    model: &PointModel,
) -> [Vector2<f64>; PointModel::N_POINTS] {
    let point_order = model.point_order(points);
    let model_order = model.model_order();

    let mut ordered = [Vector2::zeros(); PointModel::N_POINTS];
    for i in 0..PointModel::N_POINTS {
        ordered[model_order[i]] = points[point_order[i]];
    }
    ordered
}
