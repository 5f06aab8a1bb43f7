//! Per-tick control loop: telemetry in, steering command out

use log::{debug, info, warn};

use crate::common::{Actuation, Point2D, TrackingError, TrackingResult};
use crate::path_tracking::mpc::{MpcConfig, MpcController, SolveResult};
use crate::path_tracking::polynomial::Polynomial;
use crate::telemetry::latency::LatencyCompensator;
use crate::telemetry::message::{parse_frame, Frame, SteerCommand, Telemetry, MANUAL_FRAME};
use crate::telemetry::{ControlLoopParams, FallbackPolicy};

/// Counters over the lifetime of a control loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: usize,
    pub solved: usize,
    pub fallbacks: usize,
}

/// Receding-horizon control loop
#[derive(Debug, Clone)]
pub struct ControlLoop {
    controller: MpcController,
    params: ControlLoopParams,
    compensator: LatencyCompensator,
    last_command: Option<(f64, f64)>,
    last_plan: Option<SolveResult>,
    stats: LoopStats,
}

impl ControlLoop {
    pub fn new(config: MpcConfig, params: ControlLoopParams) -> TrackingResult<Self> {
        params.validate()?;
        let compensator = LatencyCompensator::new(params.latency, config.lf)?;
        let controller = MpcController::new(config)?;
        info!(
            "Control loop ready: horizon {}, dt {} s, latency {} s, fallback {:?}",
            controller.config().horizon,
            controller.config().dt,
            params.latency,
            params.fallback
        );
        Ok(ControlLoop {
            controller,
            params,
            compensator,
            last_command: None,
            last_plan: None,
            stats: LoopStats::default(),
        })
    }

    pub fn controller(&self) -> &MpcController {
        &self.controller
    }

    pub fn params(&self) -> &ControlLoopParams {
        &self.params
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Plan of the last successful solve, in that tick's vehicle frame
    pub fn last_plan(&self) -> Option<&SolveResult> {
        self.last_plan.as_ref()
    }

    /// Handle one websocket text frame, returning the reply to send if any.
    pub fn handle_frame(&mut self, frame: &str) -> TrackingResult<Option<String>> {
        match parse_frame(frame)? {
            Frame::Telemetry(telemetry) => Ok(Some(self.step(&telemetry)?.to_frame()?)),
            Frame::Manual => Ok(Some(MANUAL_FRAME.to_string())),
            Frame::Ignored => Ok(None),
        }
    }

    /// Compute the command for one telemetry sample, applying the fallback
    /// policy when no fresh command can be produced.
    pub fn step(&mut self, telemetry: &Telemetry) -> TrackingResult<SteerCommand> {
        self.stats.ticks += 1;

        match self.solve(telemetry) {
            Ok(command) => {
                self.stats.solved += 1;
                self.last_command = Some((command.steering_angle, command.throttle));
                Ok(command)
            }
            Err(e) => self.fall_back(e),
        }
    }

    fn solve(&mut self, telemetry: &Telemetry) -> TrackingResult<SteerCommand> {
        let pose = telemetry.pose();
        let local: Vec<Point2D> = telemetry.waypoints().iter().map(|p| pose.to_local(p)).collect();
        let path = Polynomial::fit(&local, self.params.polyfit_order)?;

        let applied = Actuation::new(telemetry.steering_angle, telemetry.throttle);
        let state = self.compensator.compensate(&path, telemetry.speed, &applied);
        let result = self.controller.solve(&state, &path)?;

        let max_steer = self.controller.config().max_steer;
        let mut command = SteerCommand::bare(result.normalized_steering(max_steer), result.actuation.accel);
        for p in result.predicted_path() {
            command.mpc_x.push(p.x);
            command.mpc_y.push(p.y);
        }
        for i in 0..self.params.n_display_points {
            let x = i as f64 * self.params.display_spacing;
            command.next_x.push(x);
            command.next_y.push(path.eval(x));
        }

        debug!(
            "tick {}: cte {:.3}, epsi {:.4}, steer {:.3}, throttle {:.3}",
            self.stats.ticks, state.cte, state.epsi, command.steering_angle, command.throttle
        );
        self.last_plan = Some(result);
        Ok(command)
    }

    fn fall_back(&mut self, error: TrackingError) -> TrackingResult<SteerCommand> {
        let (last_steer, last_throttle) = self.last_command.unwrap_or((0.0, 0.0));
        let command = match self.params.fallback {
            FallbackPolicy::HoldLast => SteerCommand::bare(last_steer, last_throttle),
            FallbackPolicy::Brake { throttle } => SteerCommand::bare(last_steer, throttle),
            FallbackPolicy::Abort => {
                warn!("tick {}: {}, aborting", self.stats.ticks, error);
                return Err(error);
            }
        };

        self.stats.fallbacks += 1;
        warn!(
            "tick {}: {}, falling back to {:?} (steer {:.3}, throttle {:.3})",
            self.stats.ticks, error, self.params.fallback, command.steering_angle, command.throttle
        );
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn relaxed_config() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 30.0;
        config
    }

    /// Config whose solver always stops on its iteration limit
    fn failing_config() -> MpcConfig {
        let mut config = relaxed_config();
        config.solver.max_iterations = 1;
        config.solver.step_tolerance = 1e-300;
        config.solver.cost_tolerance = 1e-300;
        config
    }

    fn telemetry(pose: (f64, f64, f64), waypoints: &[(f64, f64)], speed: f64) -> Telemetry {
        Telemetry {
            ptsx: waypoints.iter().map(|p| p.0).collect(),
            ptsy: waypoints.iter().map(|p| p.1).collect(),
            x: pose.0,
            y: pose.1,
            psi: pose.2,
            speed,
            steering_angle: 0.0,
            throttle: 0.0,
        }
    }

    /// Straight lane along +x at y = 1, seen from the origin heading east
    fn lane_left_of_origin() -> Telemetry {
        let pts: Vec<(f64, f64)> = (0..6).map(|i| (i as f64 * 10.0, 1.0)).collect();
        telemetry((0.0, 0.0, 0.0), &pts, 10.0)
    }

    #[test]
    fn test_step_steers_towards_lane() {
        let mut control = ControlLoop::new(relaxed_config(), ControlLoopParams::default()).unwrap();
        let cmd = control.step(&lane_left_of_origin()).unwrap();

        assert!(cmd.steering_angle < 0.0);
        assert!(cmd.steering_angle >= -1.0);
        assert!(cmd.throttle > 0.0);
        assert_eq!(cmd.mpc_x.len(), control.controller().config().horizon - 1);
        assert_eq!(cmd.next_x.len(), 30);
        assert_abs_diff_eq!(cmd.next_x[2], 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cmd.next_y[2], 1.0, epsilon = 1e-6);
        assert_eq!(control.stats(), LoopStats { ticks: 1, solved: 1, fallbacks: 0 });
        assert!(control.last_plan().is_some());
    }

    #[test]
    fn test_waypoints_moved_into_vehicle_frame() {
        // Heading north at (10, 0); a lane along x = 9 lies on the vehicle's left
        let pts: Vec<(f64, f64)> = (0..6).map(|i| (9.0, i as f64 * 10.0)).collect();
        let mut control = ControlLoop::new(relaxed_config(), ControlLoopParams::default()).unwrap();
        let cmd = control.step(&telemetry((10.0, 0.0, FRAC_PI_2), &pts, 10.0)).unwrap();

        assert!(cmd.steering_angle < 0.0);
        assert_abs_diff_eq!(cmd.next_y[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hold_last_fallback() {
        let params = ControlLoopParams { fallback: FallbackPolicy::HoldLast, ..Default::default() };
        let mut control = ControlLoop::new(failing_config(), params).unwrap();
        let cmd = control.step(&lane_left_of_origin()).unwrap();

        assert_eq!(cmd, SteerCommand::bare(0.0, 0.0));
        assert_eq!(control.stats().fallbacks, 1);
        assert!(control.last_plan().is_none());
    }

    #[test]
    fn test_brake_fallback_on_bad_waypoints() {
        let params = ControlLoopParams {
            fallback: FallbackPolicy::Brake { throttle: -0.5 },
            ..Default::default()
        };
        let mut control = ControlLoop::new(relaxed_config(), params).unwrap();
        let cmd = control.step(&lane_left_of_origin()).unwrap();

        // Two waypoints cannot carry a cubic
        let sparse = telemetry((0.0, 0.0, 0.0), &[(0.0, 1.0), (10.0, 1.0)], 10.0);
        let braking = control.step(&sparse).unwrap();

        assert_eq!(braking.throttle, -0.5);
        assert_eq!(braking.steering_angle, cmd.steering_angle);
        assert_eq!(control.stats(), LoopStats { ticks: 2, solved: 1, fallbacks: 1 });
    }

    #[test]
    fn test_abort_fallback_returns_error() {
        let params = ControlLoopParams { fallback: FallbackPolicy::Abort, ..Default::default() };
        let mut control = ControlLoop::new(failing_config(), params).unwrap();
        let err = control.step(&lane_left_of_origin()).unwrap_err();
        assert!(err.is_optimization_failure());
    }

    #[test]
    fn test_handle_frame() {
        let mut control = ControlLoop::new(relaxed_config(), ControlLoopParams::default()).unwrap();

        assert_eq!(
            control.handle_frame("42[\"telemetry\",null]").unwrap(),
            Some(MANUAL_FRAME.to_string())
        );
        assert_eq!(control.handle_frame("3probe").unwrap(), None);

        let frame = format!(
            "42[\"telemetry\",{}]",
            serde_json::to_string(&lane_left_of_origin()).unwrap()
        );
        let reply = control.handle_frame(&frame).unwrap().unwrap();
        assert!(reply.starts_with("42[\"steer\""));
    }
}
