//! Problem definition of one MPC solve: cost, equality constraints and bounds
//!
//! Everything the solver needs is held by [`MpcProblem`], built fresh for
//! each solve and passed by reference into the SQP routine.

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use crate::common::{Actuation, MotionModel, VehicleState, NU, NX};
use crate::path_tracking::mpc::config::MpcConfig;
use crate::path_tracking::mpc::decision_vector::{ActuationField, DecisionVector, Layout, StateField};
use crate::path_tracking::polynomial::Polynomial;
use crate::path_tracking::vehicle_model::TrackingModel;

/// Cost `0.5 z^T H z + g^T z + c`
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    pub hessian: DMatrix<f64>,
    pub linear: DVector<f64>,
    pub constant: f64,
}

impl QuadraticCost {
    fn zeros(n: usize) -> Self {
        QuadraticCost {
            hessian: DMatrix::zeros(n, n),
            linear: DVector::zeros(n),
            constant: 0.0,
        }
    }

    /// Add `w (z_i - r)^2`
    fn add_tracking(&mut self, i: usize, w: f64, r: f64) {
        self.hessian[(i, i)] += 2.0 * w;
        self.linear[i] -= 2.0 * w * r;
        self.constant += w * r * r;
    }

    /// Add `w (z_j - z_i)^2`
    fn add_difference(&mut self, i: usize, j: usize, w: f64) {
        self.hessian[(i, i)] += 2.0 * w;
        self.hessian[(j, j)] += 2.0 * w;
        self.hessian[(i, j)] -= 2.0 * w;
        self.hessian[(j, i)] -= 2.0 * w;
    }

    pub fn value(&self, z: &DVector<f64>) -> f64 {
        0.5 * z.dot(&(&self.hessian * z)) + self.linear.dot(z) + self.constant
    }

    pub fn gradient(&self, z: &DVector<f64>) -> DVector<f64> {
        &self.hessian * z + &self.linear
    }
}

/// Box bound on one entry of the decision vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableBound {
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
}

/// Finite-horizon tracking problem for one control tick
#[derive(Debug, Clone)]
pub struct MpcProblem<'a> {
    config: &'a MpcConfig,
    layout: Layout,
    model: TrackingModel<'a>,
    initial: VehicleState,
    cost: QuadraticCost,
    bounds: Vec<VariableBound>,
}

impl<'a> MpcProblem<'a> {
    /// Build cost, constraints and bounds. The configuration is assumed to be
    /// validated already.
    pub fn new(config: &'a MpcConfig, path: &'a Polynomial, initial: VehicleState) -> Self {
        let layout = Layout::new(config.horizon);
        let cost = build_cost(config, layout);
        let bounds = build_bounds(config, layout);

        MpcProblem {
            config,
            layout,
            model: TrackingModel::new(config.lf, path),
            initial,
            cost,
            bounds,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn config(&self) -> &MpcConfig {
        self.config
    }

    pub fn model(&self) -> &TrackingModel<'a> {
        &self.model
    }

    pub fn initial(&self) -> &VehicleState {
        &self.initial
    }

    pub fn cost(&self) -> &QuadraticCost {
        &self.cost
    }

    pub fn bounds(&self) -> &[VariableBound] {
        &self.bounds
    }

    /// Simulate the model from the initial state through `actuations` and pack
    /// the result. The returned vector satisfies every equality constraint.
    pub fn rollout(&self, actuations: &[Actuation]) -> DecisionVector {
        debug_assert_eq!(actuations.len(), self.layout.transitions());
        let states = self.model.rollout(&self.initial, actuations, self.config.dt);
        let mut z = DecisionVector::zeros(self.layout);
        for (k, s) in states.iter().enumerate() {
            z.set_state(k, s);
        }
        for (k, u) in actuations.iter().enumerate() {
            z.set_actuation(k, u);
        }
        z
    }

    /// Dynamics-feasible starting point with zero actuation
    pub fn initial_guess(&self) -> DecisionVector {
        self.rollout(&vec![Actuation::zero(); self.layout.transitions()])
    }

    /// Equality constraint residuals `c(z)`, one block of six rows per step:
    /// step 0 pins the initial state, step k > 0 enforces the model update.
    pub fn constraints(&self, z: &DecisionVector) -> DVector<f64> {
        let n = self.layout.horizon();
        let mut c = DVector::<f64>::zeros(self.layout.n_constraints());

        let r0 = z.state(0).to_vector() - self.initial.to_vector();
        c.rows_mut(0, NX).copy_from(&r0);

        for k in 1..n {
            let predicted = self
                .model
                .propagate(&z.state(k - 1), &z.actuation(k - 1), self.config.dt);
            let r = z.state(k).to_vector() - predicted.to_vector();
            c.rows_mut(self.layout.constraint_row(k, StateField::X), NX).copy_from(&r);
        }
        c
    }

    /// Jacobian of [`MpcProblem::constraints`] with respect to the decision vector
    pub fn constraint_jacobian(&self, z: &DecisionVector) -> DMatrix<f64> {
        let n = self.layout.horizon();
        let mut jac = DMatrix::<f64>::zeros(self.layout.n_constraints(), self.layout.len());

        for k in 0..n {
            for field in StateField::ALL.iter() {
                let row = self.layout.constraint_row(k, *field);
                jac[(row, self.layout.state_index(k, *field))] = 1.0;
            }
        }

        for k in 1..n {
            let (a, b) = self
                .model
                .jacobians(&z.state(k - 1), &z.actuation(k - 1), self.config.dt);
            for (i, row_field) in StateField::ALL.iter().enumerate() {
                let row = self.layout.constraint_row(k, *row_field);
                for (j, col_field) in StateField::ALL.iter().enumerate() {
                    jac[(row, self.layout.state_index(k - 1, *col_field))] -= a[(i, j)];
                }
                for (j, col_field) in ActuationField::ALL.iter().enumerate() {
                    jac[(row, self.layout.actuation_index(k - 1, *col_field))] -= b[(i, j)];
                }
            }
        }
        jac
    }
}

fn build_cost(config: &MpcConfig, layout: Layout) -> QuadraticCost {
    let w = &config.weights;
    let mut cost = QuadraticCost::zeros(layout.len());

    for k in 0..layout.horizon() {
        cost.add_tracking(layout.state_index(k, StateField::Cte), w.cte, 0.0);
        cost.add_tracking(layout.state_index(k, StateField::Epsi), w.epsi, 0.0);
        cost.add_tracking(layout.state_index(k, StateField::V), w.speed, config.ref_speed);
    }

    for k in 0..layout.transitions() {
        cost.add_tracking(layout.actuation_index(k, ActuationField::Steer), w.steer, 0.0);
        cost.add_tracking(layout.actuation_index(k, ActuationField::Accel), w.accel, 0.0);
    }

    // Rate terms damp oscillating commands between consecutive steps
    for (k, next) in (0..layout.transitions()).tuple_windows() {
        for (field, weight) in [
            (ActuationField::Steer, w.steer_rate),
            (ActuationField::Accel, w.accel_rate),
        ] {
            cost.add_difference(
                layout.actuation_index(k, field),
                layout.actuation_index(next, field),
                weight,
            );
        }
    }

    cost
}

fn build_bounds(config: &MpcConfig, layout: Layout) -> Vec<VariableBound> {
    let mut bounds = Vec::with_capacity(NU * layout.transitions());
    for k in 0..layout.transitions() {
        bounds.push(VariableBound {
            index: layout.actuation_index(k, ActuationField::Steer),
            lower: -config.max_steer,
            upper: config.max_steer,
        });
        bounds.push(VariableBound {
            index: layout.actuation_index(k, ActuationField::Accel),
            lower: -config.max_accel,
            upper: config.max_accel,
        });
    }
    bounds
}
