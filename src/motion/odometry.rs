// Dead-wheel pose estimator
//
// Two forward pods and one strafe pod. Forward travel is the mean of the
// forward pods, heading change is their difference over the track width,
// strafe travel is the strafe pod with rotation-induced arc removed.

use serde::Serialize;

use super::encoder::{Channel, EncoderSnapshot};
use crate::config::Calibration;
use crate::error::SensorFault;

/// Accumulated robot-frame position and displayed heading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pose {
    /// Accumulated forward travel (inches)
    pub forward: f64,
    /// Accumulated strafe travel, positive to the right (inches)
    pub strafe: f64,
    /// Heading in [0, 360), growing clockwise (degrees)
    pub heading: f64,
}

/// Wrap an angle into [0, 360)
pub fn normalize360(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Wrap an angle difference into (-180, 180], the shortest signed turn
pub fn normalize180(degrees: f64) -> f64 {
    let wrapped = normalize360(degrees);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[derive(Debug, Clone)]
pub struct PoseEstimator {
    inches_per_tick: f64,
    track_width: f64,
    strafe_pod_offset: f64,
    max_ticks_per_cycle: i64,
    pose: Pose,
    continuous_heading: f64,
    previous: Option<EncoderSnapshot>,
}

impl PoseEstimator {
    pub fn new(calibration: &Calibration) -> Self {
        Self {
            inches_per_tick: calibration.inches_per_tick(),
            track_width: calibration.track_width,
            strafe_pod_offset: calibration.strafe_pod_offset,
            max_ticks_per_cycle: i64::from(calibration.max_ticks_per_cycle),
            pose: Pose::default(),
            continuous_heading: 0.0,
            previous: None,
        }
    }

    /// Start a run at the origin with the given field heading.
    /// The next snapshot only seeds the baseline.
    pub fn initialize(&mut self, start_heading: f64) {
        self.continuous_heading = start_heading;
        self.pose = Pose {
            forward: 0.0,
            strafe: 0.0,
            heading: normalize360(start_heading),
        };
        self.previous = None;
    }

    /// Integrate one cycle's snapshot
    pub fn update(&mut self, snapshot: EncoderSnapshot) -> Result<Pose, SensorFault> {
        let Some(previous) = self.previous else {
            self.previous = Some(snapshot);
            return Ok(self.pose);
        };

        let left = self.delta(&previous, &snapshot, Channel::ForwardLeft)?;
        let right = self.delta(&previous, &snapshot, Channel::ForwardRight)?;
        let strafe = self.delta(&previous, &snapshot, Channel::Strafe)?;
        self.previous = Some(snapshot);

        let d_left = left as f64 * self.inches_per_tick;
        let d_right = right as f64 * self.inches_per_tick;
        let d_strafe = strafe as f64 * self.inches_per_tick;

        // Clockwise positive: the left pod runs ahead when turning right
        let d_heading_rad = (d_left - d_right) / self.track_width;

        self.pose.forward += (d_left + d_right) / 2.0;
        self.pose.strafe += d_strafe - self.strafe_pod_offset * d_heading_rad;
        self.continuous_heading += d_heading_rad.to_degrees();
        self.pose.heading = normalize360(self.continuous_heading);

        Ok(self.pose)
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Heading without wraparound, for logging
    pub fn continuous_heading(&self) -> f64 {
        self.continuous_heading
    }

    /// Whether a baseline snapshot has been taken since `initialize`
    pub fn is_seeded(&self) -> bool {
        self.previous.is_some()
    }

    fn delta(
        &self,
        previous: &EncoderSnapshot,
        current: &EncoderSnapshot,
        channel: Channel,
    ) -> Result<i64, SensorFault> {
        let delta = i64::from(current.get(channel)) - i64::from(previous.get(channel));
        if delta.abs() > self.max_ticks_per_cycle {
            return Err(SensorFault::ImplausibleJump {
                channel,
                delta,
                limit: self.max_ticks_per_cycle,
            });
        }
        Ok(delta)
    }
}
