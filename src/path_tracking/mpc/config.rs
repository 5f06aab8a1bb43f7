//! MPC configuration parameters

use serde::{Deserialize, Serialize};
use crate::common::{TrackingError, TrackingResult};
use crate::path_tracking::vehicle_model::LF;

/// Cost weights of the tracking problem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Cross-track error squared
    pub cte: f64,
    /// Heading error squared
    pub epsi: f64,
    /// Deviation from the reference speed squared
    pub speed: f64,
    /// Steering magnitude squared
    pub steer: f64,
    /// Acceleration magnitude squared
    pub accel: f64,
    /// Change of steering between consecutive steps squared
    pub steer_rate: f64,
    /// Change of acceleration between consecutive steps squared
    pub accel_rate: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 2000.0,
            epsi: 2000.0,
            speed: 1.0,
            steer: 5.0,
            accel: 5.0,
            steer_rate: 200.0,
            accel_rate: 10.0,
        }
    }
}

impl CostWeights {
    fn as_array(&self) -> [(&'static str, f64); 7] {
        [
            ("cte", self.cte),
            ("epsi", self.epsi),
            ("speed", self.speed),
            ("steer", self.steer),
            ("accel", self.accel),
            ("steer_rate", self.steer_rate),
            ("accel_rate", self.accel_rate),
        ]
    }
}

/// Settings of the SQP solver and its QP subproblems
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Maximum number of SQP iterations
    pub max_iterations: usize,
    /// Wall clock budget of one solve [s]
    pub max_cpu_time: f64,
    /// Convergence threshold on the infinity norm of the step
    pub step_tolerance: f64,
    /// Convergence threshold on the predicted cost decrease, relative to (1 + |cost|)
    pub cost_tolerance: f64,
    /// Diagonal regularization added to the QP Hessian
    pub regularization: f64,
    /// Iteration limit of each QP subproblem
    pub qp_max_iterations: u32,
    /// Smallest line search step before the solve is declared degenerate
    pub line_search_min_step: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_cpu_time: 0.5,
            step_tolerance: 1e-6,
            cost_tolerance: 1e-9,
            regularization: 1e-8,
            qp_max_iterations: 100,
            line_search_min_step: 1e-6,
        }
    }
}

/// Configuration of the model predictive controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcConfig {
    /// Number of predicted states N
    pub horizon: usize,
    /// Duration of one prediction step [s]
    pub dt: f64,
    /// Distance between the front axle and the centre of gravity [m]
    pub lf: f64,
    /// Reference speed
    pub ref_speed: f64,
    /// Steering bound [rad]
    pub max_steer: f64,
    /// Acceleration bound (normalized throttle)
    pub max_accel: f64,
    pub weights: CostWeights,
    pub solver: SolverSettings,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            horizon: 10,
            dt: 0.1,
            lf: LF,
            ref_speed: 40.0,
            max_steer: 25.0_f64.to_radians(),
            max_accel: 1.0,
            weights: CostWeights::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl MpcConfig {
    /// Look-ahead time N * dt [s]
    pub fn lookahead(&self) -> f64 {
        self.horizon as f64 * self.dt
    }

    /// Reject configurations the optimizer cannot work with
    pub fn validate(&self) -> TrackingResult<()> {
        let invalid = |msg: String| Err(TrackingError::InvalidParameter(msg));

        if self.horizon < 2 {
            return invalid(format!("horizon must be at least 2, got {}", self.horizon));
        }
        if !(self.dt > 0.0) {
            return invalid(format!("dt must be positive, got {}", self.dt));
        }
        if !(self.lf > 0.0) {
            return invalid(format!("lf must be positive, got {}", self.lf));
        }
        if !self.ref_speed.is_finite() {
            return invalid("ref_speed must be finite".to_string());
        }
        if !(self.max_steer > 0.0) || !(self.max_accel > 0.0) {
            return invalid("actuator bounds must be positive".to_string());
        }
        for (name, w) in self.weights.as_array().iter() {
            if !(*w >= 0.0) || !w.is_finite() {
                return invalid(format!("weight `{}` must be finite and non-negative, got {}", name, w));
            }
        }
        let s = &self.solver;
        if s.max_iterations == 0 || s.qp_max_iterations == 0 {
            return invalid("solver iteration limits must be positive".to_string());
        }
        if !(s.max_cpu_time > 0.0) {
            return invalid(format!("max_cpu_time must be positive, got {}", s.max_cpu_time));
        }
        if !(s.step_tolerance > 0.0) || !(s.cost_tolerance > 0.0) {
            return invalid("solver tolerances must be positive".to_string());
        }
        if !(s.regularization >= 0.0) || !(s.line_search_min_step > 0.0 && s.line_search_min_step < 1.0) {
            return invalid("invalid regularization or line search step".to_string());
        }
        Ok(())
    }
}
