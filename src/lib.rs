//! mpc_tracking - Model predictive path tracking for a kinematic bicycle
//!
//! Each control tick fits a reference polynomial to the upcoming waypoints,
//! solves a finite-horizon nonlinear program for steering and acceleration
//! and applies the first actuation.

// Core modules
pub mod common;
pub mod utils;

// Controller and its surroundings
pub mod path_tracking;
pub mod telemetry;
pub mod simulation;

// Re-export common types for convenience
pub use common::{Actuation, Point2D, Pose2D, VehicleState};
pub use common::MotionModel;
pub use common::{TrackingError, TrackingResult};
pub use path_tracking::{MpcConfig, MpcController, Polynomial, SolveResult};
pub use telemetry::{ControlLoop, ControlLoopParams, FallbackPolicy};
