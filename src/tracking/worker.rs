//! Tracking worker: owner-facing surface and the background capture loop.
//!
//! The owner thread constructs a [`TrackingWorker`], publishes settings and
//! starts it; the capture loop then runs on its own thread until stopped.
//! Per iteration the loop (1) applies any pending settings snapshot, (2)
//! fetches one frame, (3) extracts markers and, when exactly three are found,
//! refreshes the shared pose, and (4) forwards the frame to the display
//! sink. Any per-frame failure degrades to "no update this iteration";
//! nothing in the loop is fatal.
//!
//! Lock discipline: the shared pose lock is held only around the pose
//! read/write critical sections, never across a frame fetch. Settings travel
//! through their own single-slot mailbox, so publishing a snapshot never
//! contends with an in-flight frame.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use nalgebra::Vector2;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::camera::{CameraSource, Frame};
use crate::display::DisplaySink;
use crate::extractor::PointExtractor;
use crate::geometry::{camera_pose_to_output, PoseAngles};
use crate::settings::{SettingsMailbox, TrackerSettings};

use super::model::PointModel;
use super::solver::PointTracker;
use super::state::{PoseSnapshot, SharedState, WorkerState};

/// Idle interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(5);

/// Owner-facing handle to the tracking loop.
///
/// `start()` may be called at most once; `stop()` is idempotent and runs from
/// `Drop`, joining the loop thread. The pose accessor and `request_apply`
/// are safe to call from any thread at any point of the lifecycle.
pub struct TrackingWorker {
    shared: Arc<SharedState>,
    mailbox: Arc<SettingsMailbox>,
    initial: Arc<TrackerSettings>,
    /// Camera slot, occupied until `start()` moves it into the loop. Behind
    /// a lock so the worker handle stays shareable across reader threads.
    camera: Mutex<Option<Box<dyn CameraSource>>>,
    handle: Option<JoinHandle<()>>,
}

impl TrackingWorker {
    pub fn new(camera: Box<dyn CameraSource>, initial: TrackerSettings) -> Self {
        let solver = PointTracker::new();
        let shared = SharedState::new(PoseSnapshot {
            pose: solver.pose(),
            head_offset: initial.head_offset,
        });
        Self {
            shared,
            mailbox: Arc::new(SettingsMailbox::new()),
            initial: Arc::new(initial),
            camera: Mutex::new(Some(camera)),
            handle: None,
        }
    }

    /// Start the background loop.
    ///
    /// Publishes the initial settings snapshot, applies it synchronously (so
    /// the camera is configured before it opens), starts the camera and
    /// spawns the loop thread. Fails if called more than once.
    pub fn start(&mut self, sink: Box<dyn DisplaySink>) -> Result<()> {
        ensure!(
            self.shared.state() == WorkerState::Idle,
            "tracking worker already started"
        );
        let camera = self
            .camera
            .lock()
            .take()
            .context("tracking worker has no camera to start")?;

        self.mailbox.publish(Arc::clone(&self.initial));

        let mut tracking_loop = TrackingLoop::new(
            camera,
            sink,
            Arc::clone(&self.shared),
            Arc::clone(&self.mailbox),
            &self.initial,
        );
        tracking_loop.apply_pending();
        tracking_loop.camera.start()?;

        self.shared.set_state(WorkerState::Running);
        let handle = thread::Builder::new()
            .name("headtrack-worker".into())
            .spawn(move || tracking_loop.run())?;
        self.handle = Some(handle);

        info!("tracking worker started");
        Ok(())
    }

    /// Publish a settings snapshot for the loop to apply before its next
    /// frame. Overwrites any snapshot the loop has not consumed yet; never
    /// blocks on the loop's cadence.
    pub fn request_apply(&self, settings: TrackerSettings) {
        self.mailbox.publish(Arc::new(settings));
    }

    /// Suspend or resume frame processing. While paused the loop still
    /// applies pending settings and the last pose stays readable.
    pub fn pause(&self, paused: bool) {
        self.shared.set_paused(paused);
    }

    /// Latest pose in the output convention. Takes the shared lock for the
    /// duration of the read, so the rotation/translation pair is never torn.
    pub fn pose_angles(&self) -> PoseAngles {
        let snap = self.shared.pose.read();
        camera_pose_to_output(&snap.pose, &snap.head_offset)
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Request the loop to exit and wait for it. Safe to call repeatedly and
    /// from the destructor; returns once the loop thread is gone.
    pub fn stop(&mut self) {
        self.shared.request_abort();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("tracking loop terminated abnormally");
            }
        }
        self.shared.set_state(WorkerState::Stopped);
    }
}

impl Drop for TrackingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The capture loop: owns the collaborators, runs on the worker thread.
struct TrackingLoop {
    camera: Box<dyn CameraSource>,
    sink: Box<dyn DisplaySink>,
    shared: Arc<SharedState>,
    mailbox: Arc<SettingsMailbox>,
    extractor: PointExtractor,
    model: PointModel,
    solver: PointTracker,
    last_tick: Instant,
}

impl TrackingLoop {
    fn new(
        camera: Box<dyn CameraSource>,
        sink: Box<dyn DisplaySink>,
        shared: Arc<SharedState>,
        mailbox: Arc<SettingsMailbox>,
        initial: &TrackerSettings,
    ) -> Self {
        Self {
            camera,
            sink,
            shared,
            mailbox,
            extractor: PointExtractor::from_settings(initial),
            model: PointModel::new(initial.model_m01, initial.model_m02),
            solver: PointTracker::new(),
            last_tick: Instant::now(),
        }
    }

    fn run(mut self) {
        while !self.shared.is_abort_requested() {
            // Every iteration, so a mid-run reconfiguration lands before the
            // next processed frame.
            self.apply_pending();

            if self.shared.is_paused() {
                thread::sleep(PAUSE_POLL);
                self.last_tick = Instant::now();
                continue;
            }

            let dt = self.last_tick.elapsed().as_secs_f64();
            self.last_tick = Instant::now();

            match self.camera.get_frame(dt) {
                Ok(Some(frame)) if !frame.is_empty() => self.process_frame(frame),
                Ok(_) => {} // no frame this instant; the source paces us
                Err(e) => debug!("frame fetch failed: {e:#}"),
            }
        }

        self.shared.set_state(WorkerState::Stopping);
        debug!("tracking loop exiting");
        self.shared.set_state(WorkerState::Stopped);
    }

    /// Consume the pending settings snapshot, if any. Applies in order: model
    /// rebuild, camera reconfiguration, extractor rebuild, head offset.
    fn apply_pending(&mut self) {
        let Some(s) = self.mailbox.take() else {
            return;
        };
        debug!("applying settings snapshot");

        self.model = PointModel::new(s.model_m01, s.model_m02);

        self.camera.set_device_index(s.cam_index);
        self.camera.set_resolution(s.cam_res.0, s.cam_res.1);
        self.camera.set_fps(s.cam_fps);

        self.extractor = PointExtractor::from_settings(&s);

        self.shared.pose.write().head_offset = s.head_offset;
    }

    fn process_frame(&mut self, frame: Frame) {
        let points = self.extractor.extract_points(&frame);

        if points.len() == PointModel::N_POINTS {
            let detections: [Vector2<f64>; PointModel::N_POINTS] =
                [points[0], points[1], points[2]];
            self.solver.track(&detections, &self.model);
            self.shared.pose.write().pose = self.solver.pose();
        } else {
            debug!(found = points.len(), "detection count mismatch, pose not updated");
        }

        self.sink.update_image(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Frame;
    use crate::display::NullSink;
    use anyhow::Result;
    use approx::assert_relative_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Camera replaying a fixed frame sequence, then yielding nothing.
    struct ScriptedCamera {
        frames: VecDeque<Frame>,
        fetches: Arc<AtomicUsize>,
        applied_resolutions: Arc<AtomicUsize>,
    }

    impl ScriptedCamera {
        fn new(frames: Vec<Frame>) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let fetches = Arc::new(AtomicUsize::new(0));
            let applied = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    frames: frames.into(),
                    fetches: Arc::clone(&fetches),
                    applied_resolutions: Arc::clone(&applied),
                },
                fetches,
                applied,
            )
        }
    }

    impl CameraSource for ScriptedCamera {
        fn set_device_index(&mut self, _index: i32) {}
        fn set_resolution(&mut self, _width: u32, _height: u32) {
            self.applied_resolutions.fetch_add(1, Ordering::SeqCst);
        }
        fn set_fps(&mut self, _fps: u32) {}
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn get_frame(&mut self, _dt: f64) -> Result<Option<Frame>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.frames.pop_front())
        }
    }

    /// Paint a 5x5 marker blob.
    fn blob(frame: &mut Frame, cx: usize, cy: usize) {
        for y in cy - 2..=cy + 2 {
            for x in cx - 2..=cx + 2 {
                frame.set(x, y, 255);
            }
        }
    }

    /// A frame with the given number of markers, spread vertically.
    fn marker_frame(count: usize) -> Frame {
        let mut frame = Frame::new(128, 128);
        let centers = [(64, 30), (64, 64), (64, 100)];
        for &(x, y) in centers.iter().take(count) {
            blob(&mut frame, x, y);
        }
        frame
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_start_twice_fails() {
        let (camera, _, _) = ScriptedCamera::new(vec![]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        worker.start(Box::new(NullSink)).unwrap();
        assert!(worker.start(Box::new(NullSink)).is_err());
        worker.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_reaches_terminal_state() {
        let (camera, _, _) = ScriptedCamera::new(vec![]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        worker.start(Box::new(NullSink)).unwrap();

        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_stop_before_start_is_safe() {
        let (camera, _, _) = ScriptedCamera::new(vec![]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_pose_updates_on_three_marker_frames() {
        let (camera, fetches, _) = ScriptedCamera::new(vec![marker_frame(3)]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());

        let before = worker.pose_angles();
        worker.start(Box::new(NullSink)).unwrap();

        wait_for(|| fetches.load(Ordering::SeqCst) >= 2);
        worker.stop();

        let after = worker.pose_angles();
        assert!(
            (after.tz - before.tz).abs() > 1e-6 || (after.yaw - before.yaw).abs() > 1e-6,
            "pose should change after a valid frame"
        );
    }

    #[test]
    fn test_pose_unchanged_when_detection_count_differs() {
        let (camera, fetches, _) =
            ScriptedCamera::new(vec![marker_frame(2), marker_frame(1), marker_frame(0)]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());

        let before = worker.pose_angles();
        worker.start(Box::new(NullSink)).unwrap();

        wait_for(|| fetches.load(Ordering::SeqCst) >= 4);
        worker.stop();

        let after = worker.pose_angles();
        assert_relative_eq!(after.yaw, before.yaw, epsilon = 1e-12);
        assert_relative_eq!(after.tz, before.tz, epsilon = 1e-12);
    }

    #[test]
    fn test_frames_are_published_to_sink() {
        let (camera, _, _) = ScriptedCamera::new(vec![marker_frame(3), marker_frame(0)]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        let (sink, rx) = crate::display::ChannelSink::new(8);

        worker.start(Box::new(sink)).unwrap();
        let frame = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(frame.width, 128);
        worker.stop();
    }

    #[test]
    fn test_hot_apply_changes_head_offset_mid_run() {
        let (camera, _, _) = ScriptedCamera::new(vec![]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        worker.start(Box::new(NullSink)).unwrap();

        let before = worker.pose_angles();
        worker.request_apply(TrackerSettings {
            head_offset: nalgebra::Vector3::new(0.0, 0.0, 50.0),
            ..Default::default()
        });

        // The offset shifts the read-side composition even with no frames.
        wait_for(|| (worker.pose_angles().tz - (before.tz + 5.0)).abs() < 1e-9);
        worker.stop();
    }

    #[test]
    fn test_initial_apply_configures_camera_before_start() {
        let (camera, _, applied) = ScriptedCamera::new(vec![]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        worker.start(Box::new(NullSink)).unwrap();
        assert!(applied.load(Ordering::SeqCst) >= 1);
        worker.stop();
    }

    #[test]
    fn test_pause_suspends_frame_fetch_but_not_apply() {
        let (camera, fetches, applied) = ScriptedCamera::new(vec![]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        worker.pause(true);
        worker.start(Box::new(NullSink)).unwrap();

        // Give the paused loop time to spin; it must not fetch.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        // Settings still land while paused.
        let applied_before = applied.load(Ordering::SeqCst);
        worker.request_apply(TrackerSettings::default());
        wait_for(|| applied.load(Ordering::SeqCst) > applied_before);

        worker.pause(false);
        wait_for(|| fetches.load(Ordering::SeqCst) > 0);
        worker.stop();
    }

    #[test]
    fn test_stop_returns_while_fetch_is_slow() {
        struct SlowCamera;
        impl CameraSource for SlowCamera {
            fn set_device_index(&mut self, _index: i32) {}
            fn set_resolution(&mut self, _width: u32, _height: u32) {}
            fn set_fps(&mut self, _fps: u32) {}
            fn start(&mut self) -> Result<()> {
                Ok(())
            }
            fn get_frame(&mut self, _dt: f64) -> Result<Option<Frame>> {
                thread::sleep(Duration::from_millis(20));
                Ok(None)
            }
        }

        let mut worker = TrackingWorker::new(Box::new(SlowCamera), TrackerSettings::default());
        worker.start(Box::new(NullSink)).unwrap();

        // Cancellation latency is bounded by one iteration's work.
        let t0 = Instant::now();
        worker.stop();
        assert!(t0.elapsed() < Duration::from_secs(1));
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_last_writer_wins_across_the_loop() {
        // Publish two snapshots while paused; only the second may ever apply.
        let (camera, _, _) = ScriptedCamera::new(vec![]);
        let mut worker = TrackingWorker::new(Box::new(camera), TrackerSettings::default());
        worker.pause(true);
        worker.start(Box::new(NullSink)).unwrap();

        let before = worker.pose_angles();
        worker.request_apply(TrackerSettings {
            head_offset: nalgebra::Vector3::new(0.0, 0.0, 100.0),
            ..Default::default()
        });
        worker.request_apply(TrackerSettings {
            head_offset: nalgebra::Vector3::new(0.0, 0.0, 200.0),
            ..Default::default()
        });

        wait_for(|| (worker.pose_angles().tz - (before.tz + 20.0)).abs() < 1e-9);
        worker.stop();
        // The settled state reflects the newest snapshot only.
        assert_relative_eq!(worker.pose_angles().tz, before.tz + 20.0, epsilon = 1e-9);
    }
}
