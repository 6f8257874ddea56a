// Motion core for the mecanum base
//
// Provides:
// - Encoder sampling of the three dead-wheel channels
// - Dead-wheel pose estimation (forward, strafe, heading)
// - Closed-loop drive / strafe / turn primitives
// - Mecanum power mixing

pub mod controller;
pub mod encoder;
pub mod mixer;
pub mod odometry;

pub use controller::{
    MotionController, MotionReport, MotionState, MotionTarget, Outcome, Primitive,
};
pub use encoder::{Channel, EncoderSampler, EncoderSnapshot};
pub use mixer::{DriveIntent, WheelPowers, mix};
pub use odometry::{Pose, PoseEstimator, normalize180, normalize360};
