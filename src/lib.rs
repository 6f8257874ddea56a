// Odometry-driven motion control for a four-wheel mecanum base

pub mod config;
pub mod error;
pub mod hardware;
pub mod messages;
pub mod motion;
pub mod routine;
pub mod runtime;
pub mod telemetry;

pub use error::{ConfigurationError, MotionError, SensorFault};
