//! Runtime configuration: immutable settings snapshots and the single-slot
//! mailbox that hands them to the tracking loop.
//!
//! The owner thread builds a [`TrackerSettings`] snapshot and publishes it;
//! the loop consumes at most one snapshot per iteration. Publishing transfers
//! ownership (via `Arc`), so no lifetime contract spans the two threads.

use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One immutable bundle of tracker configuration.
///
/// Snapshots are applied atomically by the tracking loop: camera parameters,
/// extraction thresholds and the rigid model geometry always change together,
/// never field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// Camera device index.
    pub cam_index: i32,
    /// Requested capture resolution (width, height).
    pub cam_res: (u32, u32),
    /// Requested capture rate.
    pub cam_fps: u32,

    /// Primary brightness threshold: a pixel at or above it can seed a marker
    /// region.
    pub threshold: u8,
    /// Secondary threshold: a pixel at or above it can join an adjacent
    /// region. Typically at or below `threshold`.
    pub threshold_secondary: u8,
    /// Minimum accepted marker diameter, in pixels.
    pub min_point_size: f64,
    /// Maximum accepted marker diameter, in pixels.
    pub max_point_size: f64,

    /// Model origin → first satellite marker, millimeters.
    pub model_m01: Vector3<f64>,
    /// Model origin → second satellite marker, millimeters.
    pub model_m02: Vector3<f64>,
    /// Model origin → head center, millimeters.
    pub head_offset: Vector3<f64>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            cam_index: 0,
            cam_res: (640, 480),
            cam_fps: 30,
            threshold: 128,
            threshold_secondary: 128,
            min_point_size: 2.5,
            max_point_size: 50.0,
            model_m01: Vector3::new(0.0, 40.0, -30.0),
            model_m02: Vector3::new(0.0, -70.0, -80.0),
            head_offset: Vector3::zeros(),
        }
    }
}

/// Single-slot mailbox for pending settings.
///
/// Holds at most one not-yet-applied snapshot. A publish before the previous
/// snapshot was consumed silently replaces it (last-writer-wins); a take
/// clears the slot so each snapshot is applied at most once. The slot has its
/// own lock, held only for the pointer swap, so publishing never waits on the
/// loop's cadence and never touches the pose lock.
#[derive(Default)]
pub struct SettingsMailbox {
    slot: Mutex<Option<Arc<TrackerSettings>>>,
}

impl SettingsMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a snapshot, replacing any unconsumed one.
    pub fn publish(&self, settings: Arc<TrackerSettings>) {
        *self.slot.lock() = Some(settings);
    }

    /// Take-and-clear the pending snapshot. Returns `None` when there is no
    /// pending work; O(1) either way.
    pub fn take(&self) -> Option<Arc<TrackerSettings>> {
        self.slot.lock().take()
    }
}
