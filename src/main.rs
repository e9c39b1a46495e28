use std::thread;
use std::time::Duration;

use anyhow::Result;
use nalgebra::{Rotation3, Vector3};
use tracing::info;

use rust_headtrack::camera::SyntheticCamera;
use rust_headtrack::display::ChannelSink;
use rust_headtrack::geometry::Affine;
use rust_headtrack::settings::TrackerSettings;
use rust_headtrack::tracking::TrackingWorker;

/// Demo driver: runs the tracking worker against a synthetic camera sweeping
/// a ±15° yaw motion and prints the recovered pose.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = TrackerSettings::default();

    let camera = SyntheticCamera::with_motion(
        settings.model_m01,
        settings.model_m02,
        Box::new(|t| {
            let yaw = 15.0_f64.to_radians() * (t * std::f64::consts::TAU / 4.0).sin();
            Affine::new(
                *Rotation3::from_axis_angle(&Vector3::y_axis(), yaw).matrix(),
                Vector3::new(0.0, 0.0, 1000.0),
            )
        }),
    )
    .with_noise(16);

    let mut worker = TrackingWorker::new(Box::new(camera), settings);
    let (sink, frames) = ChannelSink::new(4);
    worker.start(Box::new(sink))?;

    let mut frames_seen = 0usize;
    for _ in 0..20 {
        thread::sleep(Duration::from_millis(100));
        frames_seen += frames.try_iter().count();

        let pose = worker.pose_angles();
        info!(
            "yaw {:+6.2}°  pitch {:+6.2}°  roll {:+6.2}°  t [{:+6.2} {:+6.2} {:+6.2}] cm",
            pose.yaw, pose.pitch, pose.roll, pose.tx, pose.ty, pose.tz
        );
    }

    worker.stop();
    info!("processed {frames_seen} display frames");
    Ok(())
}
