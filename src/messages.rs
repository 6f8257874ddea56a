// Telemetry records emitted by the motion core and the routine

use serde::Serialize;

use crate::motion::{MotionReport, Outcome, Pose, Primitive};

/// Where a primitive is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPhase {
    Idle,
    Running,
    Arrived,
    TimedOut,
    Cancelled,
    SensorFault,
    /// Actuation failed; the primitive was abandoned with the motors stopped
    HardwareFault,
}

impl From<&Outcome> for MotionPhase {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Arrived => MotionPhase::Arrived,
            Outcome::TimedOut => MotionPhase::TimedOut,
            Outcome::Cancelled => MotionPhase::Cancelled,
            Outcome::SensorFault(_) => MotionPhase::SensorFault,
        }
    }
}

/// One status line per control cycle while a primitive runs, and one at its end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionStatus {
    pub primitive: Option<Primitive>,
    pub phase: MotionPhase,
    pub heading: f64,
    /// Unwrapped heading, counting whole turns
    pub continuous_heading: f64,
    pub forward: f64,
    pub strafe: f64,
    /// Remaining error on the active axis (inches or degrees)
    pub error: f64,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl MotionStatus {
    pub fn idle(pose: Pose, continuous_heading: f64) -> Self {
        Self {
            primitive: None,
            phase: MotionPhase::Idle,
            heading: pose.heading,
            continuous_heading,
            forward: pose.forward,
            strafe: pose.strafe,
            error: 0.0,
            elapsed_ms: 0,
            fault: None,
        }
    }
}

impl From<&MotionReport> for MotionStatus {
    fn from(report: &MotionReport) -> Self {
        let fault = match &report.outcome {
            Outcome::SensorFault(fault) => Some(fault.to_string()),
            _ => None,
        };
        Self {
            primitive: Some(report.primitive),
            phase: MotionPhase::from(&report.outcome),
            heading: report.pose.heading,
            continuous_heading: report.continuous_heading,
            forward: report.pose.forward,
            strafe: report.pose.strafe,
            error: report.final_error,
            elapsed_ms: report.elapsed.as_millis() as u64,
            fault,
        }
    }
}

/// Choreography progress line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseUpdate {
    pub phase: String,
    pub action: String,
    pub heading: f64,
    pub forward: f64,
    pub strafe: f64,
}

impl PhaseUpdate {
    pub fn new(phase: impl Into<String>, action: impl Into<String>, pose: Pose) -> Self {
        Self {
            phase: phase.into(),
            action: action.into(),
            heading: pose.heading,
            forward: pose.forward,
            strafe: pose.strafe,
        }
    }
}
