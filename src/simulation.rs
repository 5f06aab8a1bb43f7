//! Closed-loop kinematic simulator
//!
//! Drives a bicycle-model vehicle along a waypoint track in world coordinates,
//! producing telemetry for a [`ControlLoop`] and applying its commands after an
//! actuation latency. Measurements can be corrupted with Gaussian noise.

use std::collections::VecDeque;
use std::f64::consts::PI;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::common::{Actuation, Point2D, Pose2D, TrackingError, TrackingResult};
use crate::path_tracking::vehicle_model::LF;
use crate::telemetry::{ControlLoop, Telemetry};

/// Simulator parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Control period [s]
    pub dt: f64,
    /// Integration sub-steps per control period
    pub substeps: usize,
    /// Delay between a command and its effect [s]
    pub actuation_latency: f64,
    /// Waypoints reported per telemetry sample
    pub n_waypoints: usize,
    /// Standard deviation of the position measurement noise [m]
    pub position_noise: f64,
    /// Standard deviation of the heading measurement noise [rad]
    pub heading_noise: f64,
    pub seed: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            dt: 0.1,
            substeps: 10,
            actuation_latency: 0.1,
            n_waypoints: 6,
            position_noise: 0.0,
            heading_noise: 0.0,
            seed: 42,
        }
    }
}

/// Reference track as an ordered polyline
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    points: Vec<Point2D>,
}

impl Track {
    pub fn new(points: Vec<Point2D>) -> TrackingResult<Self> {
        if points.len() < 2 {
            return Err(TrackingError::InvalidInput("a track needs at least two points".to_string()));
        }
        Ok(Track { points })
    }

    /// Straight line `y = offset` from `x = start` to `x = end`
    pub fn straight(offset: f64, start: f64, end: f64, spacing: f64) -> TrackingResult<Self> {
        check_extent(end - start, spacing)?;
        let n = ((end - start) / spacing).floor() as usize + 1;
        Self::new((0..n).map(|i| Point2D::new(start + i as f64 * spacing, offset)).collect())
    }

    /// Sine wave `y = amplitude sin(2 pi x / wavelength)`
    pub fn sine(amplitude: f64, wavelength: f64, length: f64, spacing: f64) -> TrackingResult<Self> {
        check_extent(length, spacing)?;
        let n = (length / spacing).floor() as usize + 1;
        Self::new(
            (0..n)
                .map(|i| {
                    let x = i as f64 * spacing;
                    Point2D::new(x, amplitude * (2.0 * PI * x / wavelength).sin())
                })
                .collect(),
        )
    }

    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    /// Index of the waypoint closest to `p`
    pub fn nearest(&self, p: &Point2D) -> usize {
        self.points
            .iter()
            .map(|q| q.distance(p))
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
            .0
    }

    /// Distance from `p` to the polyline
    pub fn distance_to(&self, p: &Point2D) -> f64 {
        self.points
            .windows(2)
            .map(|seg| segment_distance(p, &seg[0], &seg[1]))
            .fold(f64::INFINITY, f64::min)
    }

    /// The `n` waypoints starting just behind the one closest to `p`
    fn window(&self, p: &Point2D, n: usize) -> &[Point2D] {
        let start = self.nearest(p).saturating_sub(1);
        let end = (start + n).min(self.points.len());
        &self.points[start..end]
    }
}

fn check_extent(length: f64, spacing: f64) -> TrackingResult<()> {
    if !(spacing > 0.0) || !(length >= spacing) || !length.is_finite() {
        return Err(TrackingError::InvalidParameter(format!(
            "cannot lay out a track of length {} with spacing {}",
            length, spacing
        )));
    }
    Ok(())
}

fn segment_distance(p: &Point2D, a: &Point2D, b: &Point2D) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(&Point2D::new(a.x + t * dx, a.y + t * dy))
}

/// One simulated control period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRecord {
    pub time: f64,
    pub pose: Pose2D,
    pub speed: f64,
    /// Command issued this tick (steer in [rad])
    pub command: Actuation,
    /// Distance to the track [m]
    pub cross_track_error: f64,
}

/// World-frame vehicle simulator
#[derive(Debug, Clone)]
pub struct Simulator {
    params: SimulationParams,
    track: Track,
    pose: Pose2D,
    speed: f64,
    applied: Actuation,
    pending: VecDeque<(f64, Actuation)>,
    time: f64,
    lf: f64,
    rng: StdRng,
    position_noise: Normal<f64>,
    heading_noise: Normal<f64>,
}

impl Simulator {
    pub fn new(track: Track, pose: Pose2D, speed: f64, params: SimulationParams) -> TrackingResult<Self> {
        if !(params.dt > 0.0) || params.substeps == 0 || !(params.actuation_latency >= 0.0) {
            return Err(TrackingError::InvalidParameter(
                "simulation needs a positive period, at least one substep and a non-negative latency"
                    .to_string(),
            ));
        }
        let normal = |sigma: f64| {
            Normal::new(0.0, sigma)
                .map_err(|e| TrackingError::InvalidParameter(format!("noise level {}: {}", sigma, e)))
        };
        Ok(Simulator {
            position_noise: normal(params.position_noise)?,
            heading_noise: normal(params.heading_noise)?,
            rng: StdRng::seed_from_u64(params.seed),
            params,
            track,
            pose,
            speed,
            applied: Actuation::zero(),
            pending: VecDeque::new(),
            time: 0.0,
            lf: LF,
        })
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Current telemetry sample, with measurement noise if configured
    pub fn telemetry(&mut self) -> Telemetry {
        let mut measured = self.pose;
        if self.params.position_noise > 0.0 {
            measured.x += self.position_noise.sample(&mut self.rng);
            measured.y += self.position_noise.sample(&mut self.rng);
        }
        if self.params.heading_noise > 0.0 {
            measured.yaw += self.heading_noise.sample(&mut self.rng);
        }

        let waypoints = self.track.window(&self.pose.position(), self.params.n_waypoints);
        Telemetry {
            ptsx: waypoints.iter().map(|p| p.x).collect(),
            ptsy: waypoints.iter().map(|p| p.y).collect(),
            x: measured.x,
            y: measured.y,
            psi: measured.yaw,
            speed: self.speed,
            steering_angle: self.applied.steer,
            throttle: self.applied.accel,
        }
    }

    /// Queue a command; it takes effect after the actuation latency.
    pub fn command(&mut self, u: Actuation) {
        self.pending.push_back((self.time + self.params.actuation_latency, u));
    }

    /// Advance the world by one control period.
    pub fn advance(&mut self) {
        let h = self.params.dt / self.params.substeps as f64;
        for _ in 0..self.params.substeps {
            while let Some(&(due, u)) = self.pending.front() {
                if due > self.time + 1e-9 {
                    break;
                }
                self.applied = u;
                self.pending.pop_front();
            }

            let Pose2D { x, y, yaw } = self.pose;
            self.pose = Pose2D::new(
                x + self.speed * yaw.cos() * h,
                y + self.speed * yaw.sin() * h,
                yaw - self.speed / self.lf * self.applied.steer * h,
            );
            self.speed += self.applied.accel * h;
            self.time += h;
        }
    }

    /// Run `steps` control periods with `control` in the loop.
    pub fn run(&mut self, control: &mut ControlLoop, steps: usize) -> TrackingResult<Vec<TickRecord>> {
        let max_steer = control.controller().config().max_steer;
        let mut history = Vec::with_capacity(steps);
        info!("Simulating {} steps of {} s", steps, self.params.dt);

        for _ in 0..steps {
            let telemetry = self.telemetry();
            let reply = control.step(&telemetry)?;
            let command = Actuation::new(reply.steering_angle * max_steer, reply.throttle);
            self.command(command);

            let record = TickRecord {
                time: self.time,
                pose: self.pose,
                speed: self.speed,
                command,
                cross_track_error: self.track.distance_to(&self.pose.position()),
            };
            debug!(
                "t {:.2}: pose ({:.2}, {:.2}, {:.3}), v {:.2}, cte {:.3}",
                record.time, record.pose.x, record.pose.y, record.pose.yaw, record.speed, record.cross_track_error
            );
            history.push(record);
            self.advance();
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_tracking::mpc::MpcConfig;
    use crate::telemetry::ControlLoopParams;
    use approx::assert_abs_diff_eq;

    fn quiet(latency: f64) -> SimulationParams {
        SimulationParams { actuation_latency: latency, ..Default::default() }
    }

    #[test]
    fn test_track_geometry() {
        let track = Track::straight(2.0, 0.0, 50.0, 5.0).unwrap();
        assert_eq!(track.points().len(), 11);
        assert_eq!(track.nearest(&Point2D::new(12.0, 0.0)), 2);
        assert_abs_diff_eq!(track.distance_to(&Point2D::new(12.0, 0.0)), 2.0, epsilon = 1e-12);
        assert_eq!(track.window(&Point2D::new(12.0, 0.0), 6).len(), 6);
        assert_eq!(track.window(&Point2D::new(12.0, 0.0), 6)[0].x, 5.0);
        assert!(Track::new(vec![Point2D::origin()]).is_err());
        assert!(Track::straight(0.0, 0.0, 50.0, 0.0).is_err());
        assert!(Track::sine(1.0, 10.0, -5.0, 1.0).is_err());
    }

    #[test]
    fn test_open_loop_motion() {
        let track = Track::straight(0.0, 0.0, 100.0, 5.0).unwrap();
        let mut sim = Simulator::new(track, Pose2D::new(0.0, 0.0, 0.0), 10.0, quiet(0.0)).unwrap();
        sim.command(Actuation::new(0.0, 1.0));
        sim.advance();

        assert_abs_diff_eq!(sim.speed(), 10.1, epsilon = 1e-9);
        assert!(sim.pose().x > 1.0);
        assert_abs_diff_eq!(sim.pose().y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_commands_wait_for_latency() {
        let track = Track::straight(0.0, 0.0, 100.0, 5.0).unwrap();
        let mut sim = Simulator::new(track, Pose2D::new(0.0, 0.0, 0.0), 10.0, quiet(0.2)).unwrap();
        sim.command(Actuation::new(0.1, 0.0));
        sim.advance();
        assert_eq!(sim.pose().yaw, 0.0);
        sim.advance();
        sim.advance();
        // Positive steering turns clockwise
        assert!(sim.pose().yaw < 0.0);
    }

    #[test]
    fn test_noise_is_reproducible() {
        let track = Track::straight(0.0, 0.0, 100.0, 5.0).unwrap();
        let params = SimulationParams { position_noise: 0.3, heading_noise: 0.01, ..Default::default() };
        let mut a = Simulator::new(track.clone(), Pose2D::new(0.0, 0.0, 0.0), 5.0, params).unwrap();
        let mut b = Simulator::new(track, Pose2D::new(0.0, 0.0, 0.0), 5.0, params).unwrap();

        let (ta, tb) = (a.telemetry(), b.telemetry());
        assert_eq!(ta, tb);
        assert!(ta.x != 0.0 || ta.y != 0.0);
    }

    #[test]
    fn test_closed_loop_converges_to_offset_lane() {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 30.0;
        let mut control = ControlLoop::new(config, ControlLoopParams::default()).unwrap();

        let track = Track::straight(2.0, -10.0, 400.0, 5.0).unwrap();
        let mut sim = Simulator::new(track, Pose2D::new(0.0, 0.0, 0.0), 10.0, quiet(0.1)).unwrap();
        let history = sim.run(&mut control, 50).unwrap();

        assert_eq!(history.len(), 50);
        assert_abs_diff_eq!(history[0].cross_track_error, 2.0, epsilon = 1e-9);
        assert!(history.iter().all(|r| r.cross_track_error < 3.0));
        let last = history.last().map(|r| r.cross_track_error).unwrap_or(f64::INFINITY);
        assert!(last < 0.5, "final cross-track error {}", last);
        assert_eq!(control.stats().fallbacks, 0);
    }
}
