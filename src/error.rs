// Error taxonomy for the motion core

use std::time::Duration;

use crate::hardware::{HardwareError, MotorId};
use crate::motion::{Channel, Primitive};

/// A calibration or tuning constant is unusable. Raised before any motion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must be finite")]
    NotFinite { name: &'static str },

    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Port {port} is mapped to more than one odometry channel")]
    SharedPort { port: MotorId },
}

/// An odometry read that must not be integrated into the pose
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorFault {
    #[error("Encoder read failed on {channel} channel: {source}")]
    ReadFailed {
        channel: Channel,
        #[source]
        source: HardwareError,
    },

    #[error("Implausible jump of {delta} ticks on {channel} channel (limit {limit})")]
    ImplausibleJump {
        channel: Channel,
        delta: i64,
        limit: i64,
    },
}

/// Errors surfaced by the motion controller and the orchestration layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Sensor fault: {0}")]
    Sensor(#[from] SensorFault),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("{primitive} stalled: no arrival after {elapsed:?} (limit {limit:?})")]
    StallTimeout {
        primitive: Primitive,
        elapsed: Duration,
        limit: Duration,
    },

    #[error("Stop requested")]
    Cancelled,

    #[error("A {active} is already in flight")]
    Busy { active: Primitive },

    #[error("Invalid {primitive} target: {reason}")]
    InvalidTarget {
        primitive: Primitive,
        reason: String,
    },
}
