// Path Tracking module: reference path, vehicle model and the MPC controller

pub mod polynomial;
pub mod vehicle_model;
pub mod mpc;

pub use polynomial::*;
pub use vehicle_model::*;
pub use mpc::{MpcConfig, MpcController, SolveResult};
