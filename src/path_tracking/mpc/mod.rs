//! Model Predictive Control for path tracking
//!
//! Each control tick solves a finite-horizon nonlinear program over N predicted
//! states and N - 1 actuations of the kinematic bicycle model, then applies
//! only the first actuation.
//!
//! - [`config`]: horizon, bounds, weights and solver settings
//! - [`decision_vector`]: flat unknown vector and its index layout
//! - [`problem`]: cost, dynamics constraints and bounds
//! - [`sqp`]: the optimizer

pub mod config;
pub mod decision_vector;
pub mod problem;
pub mod sqp;

pub use config::{CostWeights, MpcConfig, SolverSettings};
pub use decision_vector::{ActuationField, DecisionVector, Layout, StateField};
pub use problem::{MpcProblem, QuadraticCost, VariableBound};

use log::{debug, warn};

use crate::common::{Actuation, Point2D, TrackingError, TrackingResult, VehicleState, NX};
use crate::path_tracking::polynomial::Polynomial;

/// Result of one MPC solve
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// First actuation of the optimal plan
    pub actuation: Actuation,
    /// Predicted positions of all N states, starting with the current one
    pub trajectory: Vec<Point2D>,
    pub states: Vec<VehicleState>,
    pub actuations: Vec<Actuation>,
    /// Number of SQP iterations
    pub iterations: usize,
    pub cost: f64,
}

impl SolveResult {
    /// Steering command scaled to [-1, 1] by the steering bound
    pub fn normalized_steering(&self, max_steer: f64) -> f64 {
        self.actuation.steer / max_steer
    }

    /// Predicted positions after the current state
    pub fn predicted_path(&self) -> &[Point2D] {
        &self.trajectory[1..]
    }

    /// Flat form `[steer, accel, x_1, y_1, x_2, y_2, ...]`
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = vec![self.actuation.steer, self.actuation.accel];
        out.extend(self.predicted_path().iter().flat_map(|p| [p.x, p.y]));
        out
    }
}

/// Model predictive path-tracking controller
#[derive(Debug, Clone)]
pub struct MpcController {
    config: MpcConfig,
}

impl MpcController {
    pub fn new(config: MpcConfig) -> TrackingResult<Self> {
        config.validate()?;
        Ok(MpcController { config })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    /// Solve for the actuation that best tracks `path` from `state`.
    ///
    /// `state` is expressed in the vehicle frame of the current tick together
    /// with the path, with `cte` and `epsi` already filled in.
    pub fn solve(&self, state: &VehicleState, path: &Polynomial) -> TrackingResult<SolveResult> {
        if !state.is_finite() {
            return Err(TrackingError::InvalidInput(format!(
                "initial state is not finite: {:?}",
                state
            )));
        }

        let problem = MpcProblem::new(&self.config, path, *state);
        let outcome = match sqp::solve(&problem) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("MPC solve failed: {}", e);
                return Err(e);
            }
        };

        let states = outcome.solution.states();
        let actuations = outcome.solution.actuations();
        let actuation = actuations[0];
        if !outcome.solution.is_finite() || !outcome.cost.is_finite() {
            return Err(TrackingError::NumericDegeneracy(
                "optimizer returned a non-finite solution".to_string(),
            ));
        }

        debug!(
            "MPC solved in {} iterations, cost {:.4e}, steer {:.4}, accel {:.4}",
            outcome.iterations, outcome.cost, actuation.steer, actuation.accel
        );

        Ok(SolveResult {
            actuation,
            trajectory: states.iter().map(|s| s.position()).collect(),
            states,
            actuations,
            iterations: outcome.iterations,
            cost: outcome.cost,
        })
    }

    /// Flat interface: `state = [x, y, psi, v, cte, epsi]`, `coeffs` in
    /// ascending powers. Returns [`SolveResult::to_vec`].
    pub fn solve_raw(&self, state: &[f64], coeffs: &[f64]) -> TrackingResult<Vec<f64>> {
        if state.len() != NX {
            return Err(TrackingError::InvalidInput(format!(
                "state must have {} entries, got {}",
                NX,
                state.len()
            )));
        }
        let path = Polynomial::new(coeffs.to_vec())?;
        let state = VehicleState::new(state[0], state[1], state[2], state[3], state[4], state[5]);
        Ok(self.solve(&state, &path)?.to_vec())
    }
}
