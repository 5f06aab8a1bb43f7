//! Socket.io style telemetry frames
//!
//! Incoming event frames look like `42["telemetry",{...}]`, where `4` marks a
//! message and `2` an event. Frames carrying `null` data put the vehicle in
//! manual mode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Point2D, Pose2D, TrackingError, TrackingResult};

/// Prefix of a socket.io event frame
const EVENT_PREFIX: &str = "42";

/// Reply sent whenever a frame carries no telemetry
pub const MANUAL_FRAME: &str = "42[\"manual\",{}]";

/// One telemetry sample in world coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Waypoint x coordinates [m]
    pub ptsx: Vec<f64>,
    /// Waypoint y coordinates [m]
    pub ptsy: Vec<f64>,
    pub x: f64,
    pub y: f64,
    /// Heading [rad]
    pub psi: f64,
    pub speed: f64,
    /// Current steering angle [rad]
    pub steering_angle: f64,
    /// Current normalized throttle
    pub throttle: f64,
}

impl Telemetry {
    pub fn pose(&self) -> Pose2D {
        Pose2D::new(self.x, self.y, self.psi)
    }

    pub fn waypoints(&self) -> Vec<Point2D> {
        self.ptsx
            .iter()
            .zip(self.ptsy.iter())
            .map(|(&x, &y)| Point2D::new(x, y))
            .collect()
    }

    fn validate(&self) -> TrackingResult<()> {
        if self.ptsx.len() != self.ptsy.len() {
            return Err(TrackingError::Telemetry(format!(
                "{} waypoint x coordinates but {} y coordinates",
                self.ptsx.len(),
                self.ptsy.len()
            )));
        }
        let scalars = [self.x, self.y, self.psi, self.speed, self.steering_angle, self.throttle];
        if !scalars.iter().chain(self.ptsx.iter()).chain(self.ptsy.iter()).all(|v| v.is_finite()) {
            return Err(TrackingError::Telemetry("non-finite telemetry value".to_string()));
        }
        Ok(())
    }
}

/// Decoded incoming frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Telemetry(Telemetry),
    /// Event without data, answered with [`MANUAL_FRAME`]
    Manual,
    /// Non-event frame or an event this controller does not handle
    Ignored,
}

/// Decode one incoming websocket text frame.
pub fn parse_frame(frame: &str) -> TrackingResult<Frame> {
    let body = match frame.strip_prefix(EVENT_PREFIX) {
        Some(body) if !body.is_empty() => body,
        _ => return Ok(Frame::Ignored),
    };

    let value: Value = serde_json::from_str(body)?;
    let event = match value.as_array() {
        Some(event) => event,
        None => return Err(TrackingError::Telemetry("event frame is not an array".to_string())),
    };

    match (event.first().and_then(Value::as_str), event.get(1)) {
        (_, None) | (_, Some(Value::Null)) => Ok(Frame::Manual),
        (Some("telemetry"), Some(data)) => {
            let telemetry = Telemetry::deserialize(data)?;
            telemetry.validate()?;
            Ok(Frame::Telemetry(telemetry))
        }
        (Some(_), Some(_)) => Ok(Frame::Ignored),
        (None, Some(_)) => Err(TrackingError::Telemetry("event name is not a string".to_string())),
    }
}

/// Actuation reply with the predicted and reference paths for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteerCommand {
    /// Steering normalized to [-1, 1]
    pub steering_angle: f64,
    pub throttle: f64,
    /// Predicted path in the vehicle frame
    pub mpc_x: Vec<f64>,
    pub mpc_y: Vec<f64>,
    /// Fitted reference path in the vehicle frame
    pub next_x: Vec<f64>,
    pub next_y: Vec<f64>,
}

impl SteerCommand {
    /// Command without display data
    pub fn bare(steering_angle: f64, throttle: f64) -> Self {
        SteerCommand {
            steering_angle,
            throttle,
            mpc_x: Vec::new(),
            mpc_y: Vec::new(),
            next_x: Vec::new(),
            next_y: Vec::new(),
        }
    }

    /// Encode as a `42["steer",{...}]` frame
    pub fn to_frame(&self) -> TrackingResult<String> {
        Ok(format!("{}[\"steer\",{}]", EVENT_PREFIX, serde_json::to_string(self)?))
    }
}
