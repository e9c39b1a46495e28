//! Tracking core: rigid model, pose solver, and the capture/processing
//! worker with its lifecycle state machine.

pub mod model;
pub mod solver;
pub mod state;
pub mod worker;

pub use model::PointModel;
pub use solver::PointTracker;
pub use state::WorkerState;
pub use worker::TrackingWorker;
