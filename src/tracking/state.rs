//! Worker lifecycle state machine and the state shared between the owner
//! thread and the tracking loop.
//!
//! Exactly two actors touch this: the owner thread (publishes settings, reads
//! the pose, requests stop) and the capture loop (applies settings, writes
//! the pose). The pose snapshot lives behind the crate's single shared
//! `RwLock`; command flags and the lifecycle state are plain atomics polled
//! once per loop iteration.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::RwLock;

use crate::geometry::Affine;

/// Lifecycle of the tracking worker.
///
/// `Idle` → `Running` on `start()`; the loop moves `Running` → `Stopping`
/// when it observes the abort flag and `Stopping` → `Stopped` once it has
/// unwound. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }
}

/// The pose state guarded by the shared lock: the latest camera-to-model
/// pose and the model-to-head offset it is composed with at read time.
/// The two always change under the same write guard, so readers can never
/// observe a torn pair.
#[derive(Debug, Clone)]
pub struct PoseSnapshot {
    pub pose: Affine,
    pub head_offset: Vector3<f64>,
}

/// State shared between the owner thread and the tracking loop.
pub struct SharedState {
    /// Latest pose, written by the loop, read by the pose accessor.
    pub pose: RwLock<PoseSnapshot>,

    /// Request the loop to exit. Polled once per iteration; cancellation
    /// latency is bounded by one iteration's work.
    abort: AtomicBool,

    /// Request the loop to idle: frame fetch and pose updates are suspended,
    /// pending settings still apply and the last pose stays readable.
    pause: AtomicBool,

    /// Current `WorkerState`, observable from any thread.
    state: AtomicU8,
}

impl SharedState {
    pub fn new(initial: PoseSnapshot) -> Arc<Self> {
        Arc::new(Self {
            pose: RwLock::new(initial),
            abort: AtomicBool::new(false),
            pause: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Idle.as_u8()),
        })
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn is_abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}
