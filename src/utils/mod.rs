//! Utility modules for mpc_tracking

pub mod params;
pub mod visualization;

pub use params::{load, Params};
