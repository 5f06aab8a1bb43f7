//! Sequential quadratic programming solver for the tracking NLP
//!
//! Gauss-Newton SQP: each iteration linearizes the dynamics constraints around
//! the current decision vector and solves the QP
//!
//! ```text
//! min  0.5 d^T (H + rho I) d + grad f(z)^T d
//! s.t. J(z) d = -c(z)
//!      lower - z <= d <= upper - z        (actuations only)
//! ```
//!
//! with the Clarabel interior-point solver. The actuation part of the step is
//! then line-searched on the cost of the re-simulated trajectory, so every
//! accepted iterate satisfies the dynamics exactly and stays inside the
//! actuator bounds. The QP step vanishes exactly at a KKT point of the NLP.

use std::time::Instant;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{NonnegativeConeT, ZeroConeT},
};
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::common::{Actuation, TrackingError, TrackingResult};
use crate::path_tracking::mpc::decision_vector::{ActuationField, DecisionVector};
use crate::path_tracking::mpc::problem::MpcProblem;

/// Sufficient decrease constant of the Armijo line search
const ARMIJO: f64 = 1e-4;

/// Converged solve
#[derive(Debug, Clone)]
pub struct SqpOutcome {
    pub solution: DecisionVector,
    pub iterations: usize,
    pub cost: f64,
}

/// Solve the problem from a zero-actuation rollout.
pub fn solve(problem: &MpcProblem) -> TrackingResult<SqpOutcome> {
    let settings = &problem.config().solver;
    let layout = problem.layout();
    let start = Instant::now();

    let mut z = problem.initial_guess();
    let mut cost = problem.cost().value(z.as_vector());
    if !z.is_finite() || !cost.is_finite() {
        return Err(TrackingError::NumericDegeneracy(
            "initial rollout is not finite".to_string(),
        ));
    }

    for iter in 0..settings.max_iterations {
        let remaining = settings.max_cpu_time - start.elapsed().as_secs_f64();
        if remaining <= 0.0 {
            return Err(TrackingError::OptimizationFailure {
                iterations: iter,
                reason: format!("time limit of {} s reached", settings.max_cpu_time),
            });
        }

        let step = solve_qp(problem, &z, remaining, iter)?;
        let slope = problem.cost().gradient(z.as_vector()).dot(&step);
        let step_norm = step.rows_range(layout.actuation_range()).amax();

        debug!(
            "sqp iter {}: cost {:.6e}, step {:.3e}, slope {:.3e}",
            iter, cost, step_norm, slope
        );

        if step_norm <= settings.step_tolerance
            || -slope <= settings.cost_tolerance * (1.0 + cost.abs())
        {
            return Ok(SqpOutcome { solution: z, iterations: iter + 1, cost });
        }

        let mut alpha = 1.0;
        loop {
            let candidate = problem.rollout(&stepped_actuations(problem, &z, &step, alpha));
            let candidate_cost = problem.cost().value(candidate.as_vector());
            if candidate.is_finite()
                && candidate_cost.is_finite()
                && candidate_cost <= cost + ARMIJO * alpha * slope
            {
                z = candidate;
                cost = candidate_cost;
                break;
            }

            alpha *= 0.5;
            if alpha < settings.line_search_min_step {
                return Err(TrackingError::NumericDegeneracy(format!(
                    "line search failed at iteration {} (step {:.3e}, slope {:.3e})",
                    iter, step_norm, slope
                )));
            }
        }
    }

    Err(TrackingError::OptimizationFailure {
        iterations: settings.max_iterations,
        reason: "iteration limit reached".to_string(),
    })
}

/// Actuations of `z + alpha * step`, clamped onto the bounds to remove the
/// interior-point solver's residual infeasibility.
fn stepped_actuations(
    problem: &MpcProblem,
    z: &DecisionVector,
    step: &DVector<f64>,
    alpha: f64,
) -> Vec<Actuation> {
    let layout = problem.layout();
    let config = problem.config();
    (0..layout.transitions())
        .map(|k| {
            let u = z.actuation(k);
            let d_steer = step[layout.actuation_index(k, ActuationField::Steer)];
            let d_accel = step[layout.actuation_index(k, ActuationField::Accel)];
            Actuation::new(
                (u.steer + alpha * d_steer).clamp(-config.max_steer, config.max_steer),
                (u.accel + alpha * d_accel).clamp(-config.max_accel, config.max_accel),
            )
        })
        .collect()
}

/// Build and solve the QP subproblem around `z`, returning the step.
fn solve_qp(
    problem: &MpcProblem,
    z: &DecisionVector,
    time_limit: f64,
    iteration: usize,
) -> TrackingResult<DVector<f64>> {
    let settings = &problem.config().solver;
    let layout = problem.layout();
    let n = layout.len();
    let m = layout.n_constraints();
    let bounds = problem.bounds();
    let n_ineq = 2 * bounds.len();

    let mut p = problem.cost().hessian.clone();
    for i in 0..n {
        p[(i, i)] += settings.regularization;
    }
    let q = problem.cost().gradient(z.as_vector());

    // Equalities first (zero cone), then the shifted bounds as `A d <= b`
    let mut a = DMatrix::<f64>::zeros(m + n_ineq, n);
    let mut b = DVector::<f64>::zeros(m + n_ineq);
    a.rows_mut(0, m).copy_from(&problem.constraint_jacobian(z));
    b.rows_mut(0, m).copy_from(&(-problem.constraints(z)));

    for (r, bound) in bounds.iter().enumerate() {
        let zi = z.as_vector()[bound.index];
        let row = m + 2 * r;
        a[(row, bound.index)] = 1.0;
        b[row] = bound.upper - zi;
        a[(row + 1, bound.index)] = -1.0;
        b[row + 1] = zi - bound.lower;
    }

    if !q.iter().chain(b.iter()).all(|v| v.is_finite()) {
        return Err(TrackingError::NumericDegeneracy(format!(
            "non-finite QP data at iteration {}",
            iteration
        )));
    }

    let cones = [ZeroConeT(m), NonnegativeConeT(n_ineq)];
    let qp_settings = DefaultSettingsBuilder::default()
        .max_iter(settings.qp_max_iterations)
        .time_limit(time_limit)
        .verbose(false)
        .build()
        .map_err(|e| TrackingError::InvalidParameter(format!("QP settings: {:?}", e)))?;

    let p_csc = dmatrix_to_csc_upper_tri(&p);
    let a_csc = dmatrix_to_csc(&a);
    let q_slice: Vec<f64> = q.iter().copied().collect();
    let b_slice: Vec<f64> = b.iter().copied().collect();

    let mut solver = DefaultSolver::new(&p_csc, &q_slice, &a_csc, &b_slice, &cones, qp_settings)
        .map_err(|_| {
            TrackingError::NumericDegeneracy(format!("QP data rejected at iteration {}", iteration))
        })?;
    solver.solve();

    let status = solver.solution.status;
    if !matches!(status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
        return Err(TrackingError::OptimizationFailure {
            iterations: iteration,
            reason: format!("QP subproblem ended with status {:?}", status),
        });
    }

    let step = DVector::from_column_slice(&solver.solution.x);
    if !step.iter().all(|v| v.is_finite()) {
        return Err(TrackingError::NumericDegeneracy(format!(
            "non-finite QP step at iteration {}",
            iteration
        )));
    }
    Ok(step)
}

/// Convert a nalgebra `DMatrix<f64>` to a Clarabel `CscMatrix<f64>` (full matrix).
fn dmatrix_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// Upper triangle of a symmetric `DMatrix<f64>` as a Clarabel `CscMatrix<f64>`.
fn dmatrix_to_csc_upper_tri(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..=j.min(nrows - 1) {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::VehicleState;
    use crate::path_tracking::mpc::config::MpcConfig;
    use crate::path_tracking::polynomial::Polynomial;

    fn relaxed() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.solver.max_cpu_time = 30.0;
        config
    }

    #[test]
    fn test_csc_upper_triangle() {
        let m = DMatrix::from_row_slice(3, 3, &[4.0, -1.0, 0.0, -1.0, 4.0, 2.0, 0.0, 2.0, 5.0]);
        let csc = dmatrix_to_csc_upper_tri(&m);
        assert_eq!(csc.colptr, vec![0, 1, 3, 5]);
        assert_eq!(csc.rowval, vec![0, 0, 1, 1, 2]);
        assert_eq!(csc.nzval, vec![4.0, -1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_csc_full_skips_zeros() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
        let csc = dmatrix_to_csc(&m);
        assert_eq!(csc.colptr, vec![0, 1, 2, 3]);
        assert_eq!(csc.rowval, vec![0, 1, 0]);
        assert_eq!(csc.nzval, vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_converged_solution_is_feasible_and_bounded() {
        let config = relaxed();
        let path = Polynomial::new(vec![1.0, 0.05, 0.0, 0.0]).unwrap();
        let initial = VehicleState::new(0.0, 0.0, 0.0, 15.0, 1.0, 0.05_f64.atan());
        let problem = MpcProblem::new(&config, &path, initial);

        let outcome = solve(&problem).unwrap();
        assert!(outcome.iterations >= 1);
        assert!(problem.constraints(&outcome.solution).amax() < 1e-9);
        for b in problem.bounds() {
            let v = outcome.solution.as_vector()[b.index];
            assert!(v >= b.lower && v <= b.upper);
        }
        assert!(outcome.cost <= problem.cost().value(problem.initial_guess().as_vector()));
    }

    #[test]
    fn test_iteration_limit_is_reported() {
        let mut config = relaxed();
        config.solver.max_iterations = 1;
        config.solver.step_tolerance = 1e-300;
        config.solver.cost_tolerance = 1e-300;
        let path = Polynomial::new(vec![2.0, 0.1, 0.0, 0.0]).unwrap();
        let initial = VehicleState::new(0.0, 0.0, 0.0, 10.0, 2.0, 0.1_f64.atan());
        let problem = MpcProblem::new(&config, &path, initial);

        match solve(&problem) {
            Err(TrackingError::OptimizationFailure { iterations, .. }) => assert_eq!(iterations, 1),
            other => panic!("expected an iteration limit failure, got {:?}", other),
        }
    }
}
