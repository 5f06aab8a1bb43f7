//! Telemetry handling around the MPC controller
//!
//! Decodes telemetry frames, moves the waypoints into the vehicle frame, fits
//! the reference polynomial, compensates actuation latency and turns the
//! optimizer's answer into a steering reply.

pub mod message;
pub mod latency;
pub mod control_loop;

pub use message::{parse_frame, Frame, SteerCommand, Telemetry, MANUAL_FRAME};
pub use latency::LatencyCompensator;
pub use control_loop::{ControlLoop, LoopStats};

use serde::{Deserialize, Serialize};
use crate::common::{TrackingError, TrackingResult};

/// What the control loop sends when a tick cannot produce a fresh command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Repeat the last successful command, or coast straight if there is none
    HoldLast,
    /// Keep the last steering and apply the given throttle
    Brake { throttle: f64 },
    /// Return the error to the caller
    Abort,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy::HoldLast
    }
}

/// Parameters of the per-tick control loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlLoopParams {
    /// Actuation latency [s]
    pub latency: f64,
    /// Order of the polynomial fitted through the waypoints
    pub polyfit_order: usize,
    pub fallback: FallbackPolicy,
    /// Number of reference points sent back for display
    pub n_display_points: usize,
    /// Spacing of the displayed reference points along x [m]
    pub display_spacing: f64,
}

impl Default for ControlLoopParams {
    fn default() -> Self {
        Self {
            latency: 0.1,
            polyfit_order: 3,
            fallback: FallbackPolicy::default(),
            n_display_points: 30,
            display_spacing: 3.0,
        }
    }
}

impl ControlLoopParams {
    pub fn validate(&self) -> TrackingResult<()> {
        if self.polyfit_order < 1 {
            return Err(TrackingError::InvalidParameter(
                "polyfit_order must be at least 1".to_string(),
            ));
        }
        if !(self.display_spacing > 0.0) {
            return Err(TrackingError::InvalidParameter(format!(
                "display_spacing must be positive, got {}",
                self.display_spacing
            )));
        }
        if let FallbackPolicy::Brake { throttle } = self.fallback {
            if !throttle.is_finite() {
                return Err(TrackingError::InvalidParameter("brake throttle must be finite".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        assert!(ControlLoopParams::default().validate().is_ok());
    }

    #[test]
    fn test_fallback_policy_toml() {
        let params: ControlLoopParams = toml::from_str(
            r#"
            latency = 0.05
            fallback = { policy = "abort" }
            "#,
        )
        .unwrap();
        assert_eq!(params.latency, 0.05);
        assert_eq!(params.fallback, FallbackPolicy::Abort);
        assert_eq!(params.polyfit_order, 3);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let zero_order = ControlLoopParams { polyfit_order: 0, ..Default::default() };
        assert!(zero_order.validate().is_err());

        let bad_brake = ControlLoopParams {
            fallback: FallbackPolicy::Brake { throttle: f64::NAN },
            ..Default::default()
        };
        assert!(bad_brake.validate().is_err());
    }
}
