//! Camera abstraction: grayscale frames, the capture contract consumed by
//! the tracking loop, and a synthetic source for demos and tests.

use anyhow::Result;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geometry::Affine;

/// One 8-bit grayscale frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Frame {
    /// Zero-filled frame.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// A frame with no pixels. Delivered by sources that produced a capture
    /// slot but no image data; the tracking loop skips these.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }
}

/// Contract for frame producers.
///
/// Reconfiguration calls may arrive between `start()` calls and between
/// frames; implementations apply them to the next capture. `get_frame`
/// returning `Ok(None)` means "no frame available this instant" and is not an
/// error — pacing (blocking, polling, rate limiting) is entirely the
/// implementation's business. The tracking loop never sleeps on its own.
pub trait CameraSource: Send {
    fn set_device_index(&mut self, index: i32);
    fn set_resolution(&mut self, width: u32, height: u32);
    fn set_fps(&mut self, fps: u32);

    /// Open the device and begin producing frames.
    fn start(&mut self) -> Result<()>;

    /// Fetch the next frame if one is ready. `dt` is the wall-clock seconds
    /// since the previous fetch, for sources that pace themselves.
    fn get_frame(&mut self, dt: f64) -> Result<Option<Frame>>;
}

/// Pose of the rendered model as a function of elapsed seconds.
pub type MotionFn = Box<dyn FnMut(f64) -> Affine + Send>;

/// Synthetic camera: renders the three model markers (origin and the two
/// satellites) projected through a pinhole onto a grayscale frame.
///
/// Image coordinates follow the extractor's convention: the unit is the image
/// width, origin at the image center, y up. With `fps > 0` the source paces
/// itself from the `dt` argument and returns `None` between frame periods;
/// with `fps == 0` every fetch produces a frame.
pub struct SyntheticCamera {
    device_index: i32,
    width: u32,
    height: u32,
    fps: u32,
    started: bool,

    model_m01: Vector3<f64>,
    model_m02: Vector3<f64>,
    focal_length: f64,
    marker_radius: f64,
    noise: u8,
    motion: MotionFn,

    rng: StdRng,
    clock: f64,
    last_emit: Option<f64>,
}

impl SyntheticCamera {
    /// Source rendering the given model geometry at a fixed pose 1 m from the
    /// camera.
    pub fn new(model_m01: Vector3<f64>, model_m02: Vector3<f64>) -> Self {
        Self::with_motion(
            model_m01,
            model_m02,
            Box::new(|_| Affine::from_translation(Vector3::new(0.0, 0.0, 1000.0))),
        )
    }

    /// Source whose rendered pose is a function of elapsed seconds.
    pub fn with_motion(model_m01: Vector3<f64>, model_m02: Vector3<f64>, motion: MotionFn) -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            fps: 0,
            started: false,
            model_m01,
            model_m02,
            focal_length: 1.0,
            marker_radius: 3.0,
            noise: 0,
            motion,
            rng: StdRng::seed_from_u64(0x1eadcafe),
            clock: 0.0,
            last_emit: None,
        }
    }

    /// Uniform background noise amplitude, in gray levels.
    pub fn with_noise(mut self, noise: u8) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_marker_radius(mut self, radius: f64) -> Self {
        self.marker_radius = radius;
        self
    }

    /// Focal length in normalized-width units; must match the pose solver's.
    pub fn with_focal_length(mut self, focal_length: f64) -> Self {
        self.focal_length = focal_length;
        self
    }

    fn render(&mut self, pose: &Affine) -> Frame {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut frame = Frame::new(w, h);

        if self.noise > 0 {
            for px in frame.data.iter_mut() {
                *px = self.rng.gen_range(0..=self.noise);
            }
        }

        let markers = [Vector3::zeros(), self.model_m01, self.model_m02];
        for m in &markers {
            let p = pose.transform_point(m);
            if p.z <= 0.0 {
                continue;
            }
            let u = self.focal_length * p.x / p.z;
            let v = self.focal_length * p.y / p.z;
            let cx = u * w as f64 + w as f64 / 2.0;
            let cy = -v * w as f64 + h as f64 / 2.0;
            self.draw_disc(&mut frame, cx, cy);
        }
        frame
    }

    fn draw_disc(&self, frame: &mut Frame, cx: f64, cy: f64) {
        let r = self.marker_radius;
        let x0 = (cx - r).floor().max(0.0) as usize;
        let x1 = (cx + r).ceil().min(frame.width as f64 - 1.0) as usize;
        let y0 = (cy - r).floor().max(0.0) as usize;
        let y1 = (cy + r).ceil().min(frame.height as f64 - 1.0) as usize;
        if x0 > x1 || y0 > y1 {
            return;
        }
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                if dx * dx + dy * dy <= r * r {
                    frame.set(x, y, 255);
                }
            }
        }
    }
}

impl CameraSource for SyntheticCamera {
    fn set_device_index(&mut self, index: i32) {
        self.device_index = index;
    }

    fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn set_fps(&mut self, fps: u32) {
        self.fps = fps;
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        self.clock = 0.0;
        self.last_emit = None;
        Ok(())
    }

    fn get_frame(&mut self, dt: f64) -> Result<Option<Frame>> {
        self.clock += dt;
        if !self.started {
            return Ok(None);
        }
        if self.fps > 0 {
            let period = 1.0 / self.fps as f64;
            if let Some(last) = self.last_emit {
                if self.clock - last < period {
                    return Ok(None);
                }
            }
        }
        self.last_emit = Some(self.clock);
        let pose = (self.motion)(self.clock);
        Ok(Some(self.render(&pose)))
    }
}
