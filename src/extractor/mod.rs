//! Bright-point extraction: finds marker centroids in a grayscale frame.
//!
//! Pixels at or above the primary threshold seed 4-connected regions; pixels
//! at or above the secondary threshold may join a region but cannot seed one,
//! which keeps marker halos attached to their core without promoting dim
//! specks to markers. Regions outside the configured diameter window are
//! rejected.
//!
//! Returned points are in normalized image coordinates: origin at the image
//! center, y up, unit equal to the image width.

use nalgebra::Vector2;

use crate::camera::Frame;
use crate::settings::TrackerSettings;

/// Marker extraction with a fixed configuration.
///
/// Rebuilt wholesale from a settings snapshot on every reconfiguration, never
/// mutated field-by-field.
#[derive(Debug, Clone, PartialEq)]
pub struct PointExtractor {
    pub threshold: u8,
    pub threshold_secondary: u8,
    pub min_size: f64,
    pub max_size: f64,
}

impl PointExtractor {
    pub fn new(threshold: u8, threshold_secondary: u8, min_size: f64, max_size: f64) -> Self {
        Self {
            threshold,
            threshold_secondary,
            min_size,
            max_size,
        }
    }

    pub fn from_settings(settings: &TrackerSettings) -> Self {
        Self::new(
            settings.threshold,
            settings.threshold_secondary,
            settings.min_point_size,
            settings.max_point_size,
        )
    }

    /// Extract marker centroids from a frame, in scan order of the seed
    /// pixel.
    pub fn extract_points(&self, frame: &Frame) -> Vec<Vector2<f64>> {
        let w = frame.width;
        let h = frame.height;
        if frame.is_empty() {
            return Vec::new();
        }

        // Growth accepts the weaker of the two thresholds so a secondary
        // value above the primary cannot orphan seed pixels.
        let grow_threshold = self.threshold_secondary.min(self.threshold);

        let mut visited = vec![false; w * h];
        let mut stack: Vec<usize> = Vec::new();
        let mut points = Vec::new();

        for seed in 0..w * h {
            if visited[seed] || frame.data[seed] < self.threshold {
                continue;
            }

            // Grow one region from this seed.
            let mut count = 0usize;
            let mut sum_x = 0.0f64;
            let mut sum_y = 0.0f64;
            visited[seed] = true;
            stack.push(seed);

            while let Some(idx) = stack.pop() {
                let x = idx % w;
                let y = idx / w;
                count += 1;
                sum_x += x as f64;
                sum_y += y as f64;

                let mut try_neighbor = |nx: usize, ny: usize, stack: &mut Vec<usize>| {
                    let nidx = ny * w + nx;
                    if !visited[nidx] && frame.data[nidx] >= grow_threshold {
                        visited[nidx] = true;
                        stack.push(nidx);
                    }
                };
                if x > 0 {
                    try_neighbor(x - 1, y, &mut stack);
                }
                if x + 1 < w {
                    try_neighbor(x + 1, y, &mut stack);
                }
                if y > 0 {
                    try_neighbor(x, y - 1, &mut stack);
                }
                if y + 1 < h {
                    try_neighbor(x, y + 1, &mut stack);
                }
            }

            // Equivalent diameter of a disc with the region's pixel count.
            let diameter = 2.0 * (count as f64 / std::f64::consts::PI).sqrt();
            if diameter < self.min_size || diameter > self.max_size {
                continue;
            }

            let cx = sum_x / count as f64;
            let cy = sum_y / count as f64;
            points.push(Vector2::new(
                (cx - w as f64 / 2.0) / w as f64,
                -(cy - h as f64 / 2.0) / w as f64,
            ));
        }

        points
    }
}

impl Default for PointExtractor {
    fn default() -> Self {
        Self::from_settings(&TrackerSettings::default())
    }
}
