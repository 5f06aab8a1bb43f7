//! Common types, traits, and error definitions for mpc_tracking
//!
//! This module provides the foundational building blocks shared by the
//! optimizer and the collaborators around it.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
