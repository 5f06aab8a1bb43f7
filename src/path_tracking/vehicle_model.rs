//! Kinematic bicycle model with path-tracking error propagation
//!
//! Discrete-time update used both for the optimizer's equality constraints
//! and for rolling out predicted trajectories.
//!
//! ```text
//! x'    = x + v cos(psi) dt
//! y'    = y + v sin(psi) dt
//! psi'  = psi - v / Lf * delta * dt
//! v'    = v + a dt
//! cte'  = f(x) - y + v sin(epsi) dt
//! epsi' = psi_des(x) - psi + v / Lf * delta * dt,   psi_des = atan(f'(x))
//! ```
//!
//! Positive steering turns the vehicle clockwise.

use nalgebra::{DMatrix, Matrix6, Matrix6x2};
use crate::common::{Actuation, MotionModel, VehicleState, NU, NX};
use crate::path_tracking::polynomial::Polynomial;

/// Distance between the front axle and the centre of gravity [m]
pub const LF: f64 = 2.67;

/// Bicycle model bound to a reference path
#[derive(Debug, Clone, Copy)]
pub struct TrackingModel<'a> {
    /// Distance between the front axle and the centre of gravity [m]
    pub lf: f64,
    path: &'a Polynomial,
}

impl<'a> TrackingModel<'a> {
    pub fn new(lf: f64, path: &'a Polynomial) -> Self {
        TrackingModel { lf, path }
    }

    pub fn path(&self) -> &Polynomial {
        self.path
    }

    /// Analytic Jacobians of the update with respect to state and actuation
    pub fn jacobians(
        &self,
        s: &VehicleState,
        u: &Actuation,
        dt: f64,
    ) -> (Matrix6<f64>, Matrix6x2<f64>) {
        let (sin_psi, cos_psi) = s.psi.sin_cos();
        let (sin_epsi, cos_epsi) = s.epsi.sin_cos();
        let df = self.path.derivative(s.x);
        let ddf = self.path.second_derivative(s.x);

        let mut a = Matrix6::<f64>::zeros();
        // x
        a[(0, 0)] = 1.0;
        a[(0, 2)] = -s.v * sin_psi * dt;
        a[(0, 3)] = cos_psi * dt;
        // y
        a[(1, 1)] = 1.0;
        a[(1, 2)] = s.v * cos_psi * dt;
        a[(1, 3)] = sin_psi * dt;
        // psi
        a[(2, 2)] = 1.0;
        a[(2, 3)] = -u.steer * dt / self.lf;
        // v
        a[(3, 3)] = 1.0;
        // cte
        a[(4, 0)] = df;
        a[(4, 1)] = -1.0;
        a[(4, 3)] = sin_epsi * dt;
        a[(4, 5)] = s.v * cos_epsi * dt;
        // epsi
        a[(5, 0)] = ddf / (1.0 + df * df);
        a[(5, 2)] = -1.0;
        a[(5, 3)] = u.steer * dt / self.lf;

        let mut b = Matrix6x2::<f64>::zeros();
        b[(2, 0)] = -s.v * dt / self.lf;
        b[(3, 1)] = dt;
        b[(5, 0)] = s.v * dt / self.lf;

        (a, b)
    }
}

impl<'a> MotionModel for TrackingModel<'a> {
    type State = VehicleState;
    type Control = Actuation;

    fn propagate(&self, s: &VehicleState, u: &Actuation, dt: f64) -> VehicleState {
        let yaw_step = s.v / self.lf * u.steer * dt;
        VehicleState {
            x: s.x + s.v * s.psi.cos() * dt,
            y: s.y + s.v * s.psi.sin() * dt,
            psi: s.psi - yaw_step,
            v: s.v + u.accel * dt,
            cte: self.path.eval(s.x) - s.y + s.v * s.epsi.sin() * dt,
            epsi: self.path.heading(s.x) - s.psi + yaw_step,
        }
    }

    fn jacobian_state(&self, s: &VehicleState, u: &Actuation, dt: f64) -> DMatrix<f64> {
        let (a, _) = self.jacobians(s, u, dt);
        DMatrix::from_column_slice(NX, NX, a.as_slice())
    }

    fn jacobian_control(&self, s: &VehicleState, u: &Actuation, dt: f64) -> DMatrix<f64> {
        let (_, b) = self.jacobians(s, u, dt);
        DMatrix::from_column_slice(NX, NU, b.as_slice())
    }
}
