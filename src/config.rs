// Calibration, control tuning, odometry channel mapping and routine constants
//
// Everything is read once at startup from an optional JSON file. Missing
// sections fall back to the defaults below.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::hardware::{Direction, MotorId};

// Control loop frequency
pub const LOOP_HZ: u64 = 50;

// Upper bound on loop frequency accepted from the command line
pub const MAX_LOOP_HZ: u64 = 1000;

// Upper bound on the configurable stall margin and settle time (seconds)
pub const MAX_TIMING_SECS: f64 = 300.0;

/// Error loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
}

/// Full robot configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub calibration: Calibration,
    pub control: ControlConfig,
    pub odometry: OdometryChannels,
    pub routine: RoutineConfig,
}

impl RobotConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigLoadError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.calibration.validate()?;
        self.control.validate()?;
        self.odometry.validate()?;
        self.routine.validate()
    }
}

/// Dead-wheel geometry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Odometry wheel circumference (inches)
    pub wheel_circumference: f64,
    /// Encoder counts per odometry wheel revolution
    pub ticks_per_revolution: f64,
    /// Wheel revolutions per encoder shaft revolution
    pub gear_ratio: f64,
    /// Distance between the two forward pods (inches)
    pub track_width: f64,
    /// Strafe pod distance forward of the rotation centre (inches, 0 if centred)
    pub strafe_pod_offset: f64,
    /// Largest per-cycle tick delta accepted on any channel
    pub max_ticks_per_cycle: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            // 48 mm omni wheel
            wheel_circumference: 48.0 / 25.4 * std::f64::consts::PI,
            ticks_per_revolution: 2000.0,
            gear_ratio: 1.0,
            track_width: 13.0,
            strafe_pod_offset: 0.0,
            max_ticks_per_cycle: 20_000,
        }
    }
}

impl Calibration {
    /// Linear travel of an odometry wheel per encoder tick (inches)
    pub fn inches_per_tick(&self) -> f64 {
        self.wheel_circumference * self.gear_ratio / self.ticks_per_revolution
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("calibration.wheel_circumference", self.wheel_circumference)?;
        positive("calibration.ticks_per_revolution", self.ticks_per_revolution)?;
        positive("calibration.gear_ratio", self.gear_ratio)?;
        positive("calibration.track_width", self.track_width)?;
        finite("calibration.strafe_pod_offset", self.strafe_pod_offset)?;
        positive(
            "calibration.max_ticks_per_cycle",
            f64::from(self.max_ticks_per_cycle),
        )
    }
}

/// Feedback law tuning and timing bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Arrival band for drive/strafe (inches)
    pub position_tolerance: f64,
    /// Remaining distance at which drive/strafe start ramping down (inches)
    pub decel_distance: f64,
    /// Remaining angle at which turns start ramping down (degrees)
    pub decel_degrees: f64,
    /// Floor on the ramp, as a fraction of the requested power
    pub min_power_fraction: f64,
    /// Rotate power per degree of heading error while driving or strafing
    pub heading_gain: f64,
    /// Cap on the heading-hold rotate term
    pub max_heading_correction: f64,
    /// Forward speed at full power (inches/s), used for the stall bound
    pub nominal_forward_speed: f64,
    /// Strafe speed at full power (inches/s)
    pub nominal_strafe_speed: f64,
    /// Turn rate at full power (degrees/s)
    pub nominal_turn_rate: f64,
    /// Multiplier on the ideal travel time before a move counts as stalled
    pub timeout_factor: f64,
    /// Fixed slack added to every stall bound (seconds)
    pub timeout_margin_secs: f64,
    /// Time the error must stay in band before arrival (seconds, 0 = immediate)
    pub settle_time_secs: f64,
    /// Polarity of [front_left, front_right, back_left, back_right]
    pub drive_directions: [Direction; 4],
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            position_tolerance: 0.5,
            decel_distance: 12.0,
            decel_degrees: 30.0,
            min_power_fraction: 0.15,
            heading_gain: 0.02,
            max_heading_correction: 0.3,
            nominal_forward_speed: 50.0,
            nominal_strafe_speed: 40.0,
            nominal_turn_rate: 270.0,
            timeout_factor: 2.0,
            timeout_margin_secs: 1.5,
            settle_time_secs: 0.0,
            drive_directions: [
                Direction::Reverse,
                Direction::Forward,
                Direction::Reverse,
                Direction::Forward,
            ],
        }
    }
}

impl ControlConfig {
    pub fn timeout_margin(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_margin_secs).unwrap_or(Duration::MAX)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.settle_time_secs).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("control.position_tolerance", self.position_tolerance)?;
        positive("control.decel_distance", self.decel_distance)?;
        positive("control.decel_degrees", self.decel_degrees)?;
        positive("control.min_power_fraction", self.min_power_fraction)?;
        in_range("control.min_power_fraction", self.min_power_fraction, 0.0, 1.0)?;
        non_negative("control.heading_gain", self.heading_gain)?;
        in_range(
            "control.max_heading_correction",
            self.max_heading_correction,
            0.0,
            1.0,
        )?;
        positive("control.nominal_forward_speed", self.nominal_forward_speed)?;
        positive("control.nominal_strafe_speed", self.nominal_strafe_speed)?;
        positive("control.nominal_turn_rate", self.nominal_turn_rate)?;
        positive("control.timeout_factor", self.timeout_factor)?;
        in_range(
            "control.timeout_margin_secs",
            self.timeout_margin_secs,
            0.0,
            MAX_TIMING_SECS,
        )?;
        in_range(
            "control.settle_time_secs",
            self.settle_time_secs,
            0.0,
            MAX_TIMING_SECS,
        )
    }
}

/// One logical odometry channel and the port whose encoder it reads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometryChannel {
    pub port: MotorId,
    #[serde(default)]
    pub reversed: bool,
}

impl OdometryChannel {
    pub const fn new(port: MotorId) -> Self {
        Self {
            port,
            reversed: false,
        }
    }
}

/// Logical dead-wheel channels mapped onto physical ports
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdometryChannels {
    pub forward_left: OdometryChannel,
    pub forward_right: OdometryChannel,
    pub strafe: OdometryChannel,
}

impl Default for OdometryChannels {
    fn default() -> Self {
        // The pods are wired into the launcher and indexer motor ports
        Self {
            forward_left: OdometryChannel::new(MotorId::LeftLaunch),
            forward_right: OdometryChannel::new(MotorId::RightLaunch),
            strafe: OdometryChannel::new(MotorId::Index),
        }
    }
}

impl OdometryChannels {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let ports = [self.forward_left.port, self.forward_right.port, self.strafe.port];
        for (i, port) in ports.iter().enumerate() {
            if ports[i + 1..].contains(port) {
                return Err(ConfigurationError::SharedPort { port: *port });
            }
        }
        Ok(())
    }
}

/// Autonomous choreography: distances, headings, powers and timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutineConfig {
    /// Back-up distance from the start to the shooting station (inches)
    pub backup_to_shoot: f64,
    /// Forward drive through a collection lane (inches)
    pub drive_to_collect: f64,
    /// Lateral offset of each collection lane from the station (inches)
    pub strafe_lanes: Vec<f64>,
    /// Heading at the start of the run (degrees)
    pub start_heading: f64,
    /// Relative rotation before collecting (degrees, negative = counter-clockwise)
    pub rotate_to_collect: f64,
    /// Relative rotation before shooting (degrees)
    pub rotate_to_shoot: f64,
    pub drive_power: f64,
    pub rotate_power: f64,
    /// Arrival band for turns (degrees)
    pub rotation_tolerance: f64,
    pub left_launch_power: f64,
    pub right_launch_power: f64,
    pub index_shoot_power: f64,
    pub index_collect_power: f64,
    pub rotate_servo_power: f64,
    pub rotate_servo_2_power: f64,
    pub launcher_spinup_ms: u64,
    pub shooting_ms: u64,
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            backup_to_shoot: 68.0,
            drive_to_collect: 48.0,
            strafe_lanes: vec![12.0, 36.0, 60.0],
            start_heading: 45.0,
            rotate_to_collect: -135.0,
            rotate_to_shoot: 135.0,
            drive_power: 0.6,
            rotate_power: 0.6,
            rotation_tolerance: 1.0,
            left_launch_power: 0.83,
            right_launch_power: -0.83,
            index_shoot_power: -0.85,
            index_collect_power: 1.0,
            rotate_servo_power: -1.0,
            rotate_servo_2_power: 1.0,
            launcher_spinup_ms: 500,
            shooting_ms: 3700,
        }
    }
}

impl RoutineConfig {
    pub fn launcher_spinup(&self) -> Duration {
        Duration::from_millis(self.launcher_spinup_ms)
    }

    pub fn shooting_duration(&self) -> Duration {
        Duration::from_millis(self.shooting_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        finite("routine.backup_to_shoot", self.backup_to_shoot)?;
        finite("routine.drive_to_collect", self.drive_to_collect)?;
        for lane in &self.strafe_lanes {
            finite("routine.strafe_lanes", *lane)?;
        }
        finite("routine.start_heading", self.start_heading)?;
        finite("routine.rotate_to_collect", self.rotate_to_collect)?;
        finite("routine.rotate_to_shoot", self.rotate_to_shoot)?;
        in_range("routine.drive_power", self.drive_power, f64::MIN_POSITIVE, 1.0)?;
        in_range("routine.rotate_power", self.rotate_power, f64::MIN_POSITIVE, 1.0)?;
        positive("routine.rotation_tolerance", self.rotation_tolerance)?;
        for (name, power) in [
            ("routine.left_launch_power", self.left_launch_power),
            ("routine.right_launch_power", self.right_launch_power),
            ("routine.index_shoot_power", self.index_shoot_power),
            ("routine.index_collect_power", self.index_collect_power),
            ("routine.rotate_servo_power", self.rotate_servo_power),
            ("routine.rotate_servo_2_power", self.rotate_servo_2_power),
        ] {
            in_range(name, power, -1.0, 1.0)?;
        }
        Ok(())
    }
}

fn finite(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::NotFinite { name })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigurationError::NonPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    in_range(name, value, 0.0, f64::MAX)
}

fn in_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigurationError> {
    finite(name, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}
