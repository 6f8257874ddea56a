// Hardware abstraction for the robot's motor/servo ports
//
// The motion core only ever talks to hardware through `MotorBus`. A physical
// backend lives outside this crate; `SimulatedDrivetrain` is the in-process
// stand-in used by tests and the binary.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod sim;

pub use sim::{SimulatedDrivetrain, SimulationParams};

/// Named ports on the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotorId {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
    LeftLaunch,
    RightLaunch,
    Index,
    RotateServo,
    RotateServo2,
}

impl MotorId {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MotorId::FrontLeft => "frontleft",
            MotorId::FrontRight => "frontright",
            MotorId::BackLeft => "backleft",
            MotorId::BackRight => "backright",
            MotorId::LeftLaunch => "leftlaunch",
            MotorId::RightLaunch => "rightlaunch",
            MotorId::Index => "index",
            MotorId::RotateServo => "rotate",
            MotorId::RotateServo2 => "rotate2",
        }
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four drive motors, in mixer order
pub const DRIVE_MOTORS: [MotorId; 4] = [
    MotorId::FrontLeft,
    MotorId::FrontRight,
    MotorId::BackLeft,
    MotorId::BackRight,
];

/// Motor polarity, fixed once at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

/// What a motor does when commanded to zero power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroPowerBehavior {
    #[default]
    Float,
    Brake,
}

/// Error types for hardware access
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HardwareError {
    #[error("Failed to read {id}: {reason}")]
    ReadFailed { id: MotorId, reason: String },

    #[error("Failed to write {id}: {reason}")]
    WriteFailed { id: MotorId, reason: String },

    #[error("Power {value} for {id} is outside [-1, 1]")]
    PowerOutOfRange { id: MotorId, value: f64 },
}

/// Motor/servo bus consumed by the motion core
pub trait MotorBus {
    /// Command a power in [-1, 1]
    fn set_power(&mut self, id: MotorId, power: f64) -> Result<(), HardwareError>;

    /// Read the cumulative encoder count behind a port
    fn encoder_ticks(&mut self, id: MotorId) -> Result<i32, HardwareError>;

    fn set_direction(&mut self, id: MotorId, direction: Direction) -> Result<(), HardwareError>;

    fn set_zero_power_behavior(
        &mut self,
        id: MotorId,
        behavior: ZeroPowerBehavior,
    ) -> Result<(), HardwareError>;

    /// Called once at the top of every control cycle, before any encoder read.
    /// Backends that bulk-read their encoders refresh their cache here.
    fn begin_cycle(&mut self, _dt: Duration) {}
}
