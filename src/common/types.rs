//! Common types used throughout mpc_tracking

use nalgebra::{Vector2, Vector6};

/// Number of state fields [x, y, psi, v, cte, epsi]
pub const NX: usize = 6;
/// Number of actuation fields [steer, accel]
pub const NU: usize = 2;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

/// 2D pose (position + orientation) in the world frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Express a world-frame point in this pose's local frame
    /// (translate by the pose position, rotate by -yaw).
    pub fn to_local(&self, p: &Point2D) -> Point2D {
        let dx = p.x - self.x;
        let dy = p.y - self.y;
        let (s, c) = (-self.yaw).sin_cos();
        Point2D::new(dx * c - dy * s, dx * s + dy * c)
    }

    /// Inverse of [`Pose2D::to_local`]
    pub fn to_world(&self, p: &Point2D) -> Point2D {
        let (s, c) = self.yaw.sin_cos();
        Point2D::new(self.x + p.x * c - p.y * s, self.y + p.x * s + p.y * c)
    }
}

/// Vehicle state seen by the optimizer, expressed in the vehicle's local frame.
///
/// `cte = f(x) - y` and `epsi = psi_des - psi`, where `f` is the reference
/// polynomial and `psi_des = atan(f'(x))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    pub psi: f64,
    pub v: f64,
    pub cte: f64,
    pub epsi: f64,
}

impl VehicleState {
    pub fn new(x: f64, y: f64, psi: f64, v: f64, cte: f64, epsi: f64) -> Self {
        Self { x, y, psi, v, cte, epsi }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(self.x, self.y, self.psi, self.v, self.cte, self.epsi)
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

impl From<Vector6<f64>> for VehicleState {
    fn from(v: Vector6<f64>) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}

/// Steering [rad, positive turns clockwise] and normalized acceleration command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuation {
    pub steer: f64,
    pub accel: f64,
}

impl Actuation {
    pub fn new(steer: f64, accel: f64) -> Self {
        Self { steer, accel }
    }

    pub fn zero() -> Self {
        Self { steer: 0.0, accel: 0.0 }
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.steer, self.accel)
    }
}

impl From<Vector2<f64>> for Actuation {
    fn from(v: Vector2<f64>) -> Self {
        Self { steer: v[0], accel: v[1] }
    }
}
