//! Error types for mpc_tracking

use thiserror::Error;

/// Main error type for the path tracking controller
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Malformed state or reference polynomial handed to the optimizer
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The NLP solver did not converge within its budget
    #[error("Optimization failure after {iterations} iterations: {reason}")]
    OptimizationFailure { iterations: usize, reason: String },

    /// Non-finite values or an ill-conditioned subproblem during a solve
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// Malformed telemetry message
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Plot could not be rendered
    #[error("Plot error: {0}")]
    Plot(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parameter file could not be parsed
    #[error("Cannot read the parameter file: {0}")]
    Params(#[from] toml::de::Error),

    /// JSON (de)serialisation failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrackingError {
    /// True for every error raised by the solver itself, including numeric
    /// breakdowns. Callers apply their fallback policy on these.
    pub fn is_optimization_failure(&self) -> bool {
        matches!(
            self,
            TrackingError::OptimizationFailure { .. } | TrackingError::NumericDegeneracy(_)
        )
    }
}

/// Result type alias for tracking operations
pub type TrackingResult<T> = Result<T, TrackingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackingError::OptimizationFailure {
            iterations: 12,
            reason: "time limit reached".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Optimization failure after 12 iterations: time limit reached"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrackingError = io_err.into();
        assert!(matches!(err, TrackingError::Io(_)));
    }

    #[test]
    fn test_optimization_failure_classification() {
        assert!(TrackingError::NumericDegeneracy("nan".into()).is_optimization_failure());
        assert!(TrackingError::OptimizationFailure {
            iterations: 0,
            reason: String::new()
        }
        .is_optimization_failure());
        assert!(!TrackingError::InvalidInput("x".into()).is_optimization_failure());
    }
}
