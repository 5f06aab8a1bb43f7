//! Parameter file loading

use std::fs::read_to_string;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::common::TrackingResult;
use crate::path_tracking::mpc::MpcConfig;
use crate::simulation::SimulationParams;
use crate::telemetry::ControlLoopParams;

/// Full parameter set of the controller and its demo simulator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub mpc: MpcConfig,
    pub control_loop: ControlLoopParams,
    pub simulation: SimulationParams,
}

/// Load a TOML parameter file into any deserialisable parameter struct.
///
/// Missing fields take their defaults where the struct is `#[serde(default)]`.
pub fn load<P, F>(path: F) -> TrackingResult<P>
where
    P: DeserializeOwned,
    F: AsRef<Path>,
{
    let params_str = read_to_string(path)?;
    Ok(toml::from_str(params_str.as_str())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TrackingError;
    use crate::telemetry::FallbackPolicy;

    #[test]
    fn test_shipped_params_parse() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/params/mpc.toml");
        let params: Params = load(path).unwrap();

        assert_eq!(params.mpc, MpcConfig::default());
        assert_eq!(params.control_loop, ControlLoopParams::default());
        assert!(params.mpc.validate().is_ok());
    }

    #[test]
    fn test_partial_params_use_defaults() {
        let params: Params = toml::from_str(
            r#"
            [mpc]
            horizon = 8

            [control_loop.fallback]
            policy = "brake"
            throttle = -0.5
            "#,
        )
        .unwrap();

        assert_eq!(params.mpc.horizon, 8);
        assert_eq!(params.control_loop.fallback, FallbackPolicy::Brake { throttle: -0.5 });
        assert_eq!(params.simulation, SimulationParams::default());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result: TrackingResult<Params> = load("/nonexistent/params.toml");
        assert!(matches!(result, Err(TrackingError::Io(_))));
    }

    #[test]
    fn test_malformed_file_is_params_error() {
        let dir = std::env::temp_dir().join("mpc_tracking_params_test.toml");
        std::fs::write(&dir, "horizon = \"ten\"").unwrap();
        let result: TrackingResult<MpcConfig> = load(&dir);
        assert!(matches!(result, Err(TrackingError::Params(_))));
    }
}
