//! Actuation latency compensation
//!
//! Commands reach the actuators one latency period after the telemetry they
//! were computed from, so the optimizer starts from the state the vehicle will
//! be in at that moment rather than the measured one.

use crate::common::{Actuation, MotionModel, TrackingError, TrackingResult, VehicleState};
use crate::path_tracking::polynomial::Polynomial;
use crate::path_tracking::vehicle_model::TrackingModel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyCompensator {
    /// Actuation delay [s]
    pub latency: f64,
    /// Distance between the front axle and the centre of gravity [m]
    pub lf: f64,
}

impl LatencyCompensator {
    pub fn new(latency: f64, lf: f64) -> TrackingResult<Self> {
        if !(latency >= 0.0) || !latency.is_finite() {
            return Err(TrackingError::InvalidParameter(format!(
                "latency must be finite and non-negative, got {}",
                latency
            )));
        }
        Ok(LatencyCompensator { latency, lf })
    }

    /// State at the origin of the vehicle frame with the tracking errors of `path`
    pub fn measured_state(path: &Polynomial, speed: f64) -> VehicleState {
        VehicleState::new(0.0, 0.0, 0.0, speed, path.eval(0.0), path.heading(0.0))
    }

    /// Project the measured state forward by the latency under the
    /// actuation currently applied.
    pub fn compensate(&self, path: &Polynomial, speed: f64, applied: &Actuation) -> VehicleState {
        let measured = Self::measured_state(path, speed);
        if self.latency == 0.0 {
            return measured;
        }
        TrackingModel::new(self.lf, path).propagate(&measured, applied, self.latency)
    }
}
