// Closed-loop drive / strafe / turn primitives
//
// Each primitive is a small state machine advanced by `step`. One step is one
// control cycle: poll cancellation, sample encoders, update the pose, run the
// proportional law, mix and actuate. Nothing in here sleeps or reads a clock;
// the caller supplies the cycle's elapsed time.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::encoder::EncoderSampler;
use super::mixer::{DriveIntent, WheelPowers, mix};
use super::odometry::{Pose, PoseEstimator, normalize180, normalize360};
use crate::config::{Calibration, ControlConfig, OdometryChannels, RobotConfig};
use crate::error::{MotionError, SensorFault};
use crate::hardware::{DRIVE_MOTORS, HardwareError, MotorBus, ZeroPowerBehavior};
use crate::messages::{MotionPhase, MotionStatus};

/// The three motion primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Drive,
    Strafe,
    Turn,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Primitive::Drive => "drive",
            Primitive::Strafe => "strafe",
            Primitive::Turn => "turn",
        })
    }
}

/// The in-flight goal of a primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTarget {
    pub kind: Primitive,
    /// Absolute target on the primitive's axis (inches, or degrees in [0, 360))
    pub target: f64,
    /// Requested power in (0, 1]
    pub power: f64,
    pub tolerance: f64,
    /// Heading to hold while driving or strafing (unused by turns)
    pub hold_heading: f64,
}

/// How a primitive ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Arrived,
    TimedOut,
    Cancelled,
    SensorFault(SensorFault),
}

impl Outcome {
    pub fn is_arrived(&self) -> bool {
        matches!(self, Outcome::Arrived)
    }
}

/// Terminal summary of one primitive
#[derive(Debug, Clone, PartialEq)]
pub struct MotionReport {
    pub primitive: Primitive,
    pub outcome: Outcome,
    pub pose: Pose,
    pub continuous_heading: f64,
    pub final_error: f64,
    pub elapsed: Duration,
    pub limit: Duration,
}

impl MotionReport {
    /// Arrival is success; every other ending becomes the matching error
    pub fn into_result(self) -> Result<Self, MotionError> {
        match self.outcome {
            Outcome::Arrived => Ok(self),
            Outcome::TimedOut => Err(MotionError::StallTimeout {
                primitive: self.primitive,
                elapsed: self.elapsed,
                limit: self.limit,
            }),
            Outcome::Cancelled => Err(MotionError::Cancelled),
            Outcome::SensorFault(fault) => Err(MotionError::Sensor(fault)),
        }
    }
}

/// Result of advancing the controller by one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum MotionState {
    Idle,
    Running,
    Finished(MotionReport),
}

#[derive(Debug, Clone)]
struct ActiveMotion {
    target: MotionTarget,
    limit: Duration,
    elapsed: Duration,
    in_band_for: Duration,
    error: f64,
}

/// Owns the drivetrain for the whole run: odometry, feedback law and actuation
pub struct MotionController<B: MotorBus> {
    bus: B,
    sampler: EncoderSampler,
    estimator: PoseEstimator,
    control: ControlConfig,
    active: Option<ActiveMotion>,
}

impl<B: MotorBus> MotionController<B> {
    /// Validate the configuration, then fix drive motor polarity and brake mode
    pub fn new(
        mut bus: B,
        calibration: &Calibration,
        control: ControlConfig,
        channels: OdometryChannels,
    ) -> Result<Self, MotionError> {
        calibration.validate()?;
        control.validate()?;
        channels.validate()?;

        info!(
            "Configuring drivetrain: track width {:.2} in, {:.5} in/tick",
            calibration.track_width,
            calibration.inches_per_tick()
        );
        for (id, direction) in DRIVE_MOTORS.into_iter().zip(control.drive_directions) {
            bus.set_direction(id, direction)?;
            bus.set_zero_power_behavior(id, ZeroPowerBehavior::Brake)?;
            bus.set_power(id, 0.0)?;
        }

        Ok(Self {
            bus,
            sampler: EncoderSampler::new(channels),
            estimator: PoseEstimator::new(calibration),
            control,
            active: None,
        })
    }

    pub fn from_config(bus: B, config: &RobotConfig) -> Result<Self, MotionError> {
        Self::new(
            bus,
            &config.calibration,
            config.control.clone(),
            config.odometry,
        )
    }

    /// Start the pose at the origin facing `start_heading`
    pub fn initialize(&mut self, start_heading: f64) {
        info!("Initializing odometry at heading {:.1}", start_heading);
        self.estimator.initialize(start_heading);
    }

    /// Drive `distance` inches along the forward axis (negative reverses)
    pub fn begin_drive(
        &mut self,
        distance: f64,
        power: f64,
        hold_heading: f64,
    ) -> Result<(), MotionError> {
        self.begin_linear(Primitive::Drive, distance, power, hold_heading)
    }

    /// Slide `distance` inches sideways (positive is right)
    pub fn begin_strafe(
        &mut self,
        distance: f64,
        power: f64,
        hold_heading: f64,
    ) -> Result<(), MotionError> {
        self.begin_linear(Primitive::Strafe, distance, power, hold_heading)
    }

    /// Turn the shorter way to an absolute heading
    pub fn begin_turn_to(
        &mut self,
        heading: f64,
        power: f64,
        tolerance: f64,
    ) -> Result<(), MotionError> {
        self.check_idle()?;
        check_power(Primitive::Turn, power)?;
        check_finite(Primitive::Turn, "heading", heading)?;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(MotionError::InvalidTarget {
                primitive: Primitive::Turn,
                reason: format!("tolerance {tolerance} must be positive"),
            });
        }

        let target = normalize360(heading);
        let error = normalize180(target - self.estimator.pose().heading);
        let limit = self.stall_limit(
            Primitive::Turn,
            error.abs(),
            power,
            self.control.nominal_turn_rate,
        )?;
        self.start(
            MotionTarget {
                kind: Primitive::Turn,
                target,
                power,
                tolerance,
                hold_heading: target,
            },
            error,
            limit,
        );
        Ok(())
    }

    fn begin_linear(
        &mut self,
        kind: Primitive,
        distance: f64,
        power: f64,
        hold_heading: f64,
    ) -> Result<(), MotionError> {
        self.check_idle()?;
        check_power(kind, power)?;
        check_finite(kind, "distance", distance)?;
        check_finite(kind, "hold heading", hold_heading)?;

        let pose = self.estimator.pose();
        let (origin, speed) = match kind {
            Primitive::Strafe => (pose.strafe, self.control.nominal_strafe_speed),
            _ => (pose.forward, self.control.nominal_forward_speed),
        };
        let limit = self.stall_limit(kind, distance.abs(), power, speed)?;
        self.start(
            MotionTarget {
                kind,
                target: origin + distance,
                power,
                tolerance: self.control.position_tolerance,
                hold_heading: normalize360(hold_heading),
            },
            distance,
            limit,
        );
        Ok(())
    }

    fn start(&mut self, target: MotionTarget, error: f64, limit: Duration) {
        info!(
            "Starting {} to {:.2} at power {:.2} (stall limit {:?})",
            target.kind, target.target, target.power, limit
        );
        self.active = Some(ActiveMotion {
            target,
            limit,
            elapsed: Duration::ZERO,
            in_band_for: Duration::ZERO,
            error,
        });
    }

    /// Run one control cycle of the in-flight primitive
    pub fn step(&mut self, dt: Duration, stop_requested: bool) -> Result<MotionState, MotionError> {
        let Some(mut active) = self.active.take() else {
            return Ok(MotionState::Idle);
        };

        if stop_requested {
            return Ok(self.finish(active, Outcome::Cancelled));
        }

        self.bus.begin_cycle(dt);
        let pose = match self.sample() {
            Ok(pose) => pose,
            Err(fault) => return Ok(self.finish(active, Outcome::SensorFault(fault))),
        };

        active.elapsed += dt;
        active.error = axis_error(&active.target, pose);

        if active.error.abs() <= active.target.tolerance {
            active.in_band_for += dt;
            if active.in_band_for >= self.control.settle_time() {
                return Ok(self.finish(active, Outcome::Arrived));
            }
        } else {
            active.in_band_for = Duration::ZERO;
        }

        if active.elapsed > active.limit {
            return Ok(self.finish(active, Outcome::TimedOut));
        }

        let intent = self.intent(&active, pose);
        let wheels = mix(intent);
        if let Err(e) = self.apply(wheels) {
            warn!("Actuation failed during {}: {}", active.target.kind, e);
            self.stop_motors();
            return Err(e.into());
        }

        debug!(
            "{} error {:.3} intent ({:.3}, {:.3}, {:.3})",
            active.target.kind, active.error, intent.forward, intent.strafe, intent.rotate
        );
        self.active = Some(active);
        Ok(MotionState::Running)
    }

    /// Sample and integrate without touching the motors (between primitives)
    pub fn track(&mut self, dt: Duration) -> Result<Pose, SensorFault> {
        self.bus.begin_cycle(dt);
        self.sample()
    }

    /// Abandon the in-flight primitive, if any, as cancelled
    pub fn abort(&mut self) -> Option<MotionReport> {
        let active = self.active.take()?;
        match self.finish(active, Outcome::Cancelled) {
            MotionState::Finished(report) => Some(report),
            _ => None,
        }
    }

    fn sample(&mut self) -> Result<Pose, SensorFault> {
        let snapshot = self.sampler.sample(&mut self.bus)?;
        self.estimator.update(snapshot)
    }

    fn intent(&self, active: &ActiveMotion, pose: Pose) -> DriveIntent {
        let target = &active.target;
        match target.kind {
            Primitive::Drive => DriveIntent::new(
                self.ramp(active.error, target, self.control.decel_distance),
                0.0,
                self.heading_correction(target.hold_heading, pose.heading),
            ),
            Primitive::Strafe => DriveIntent::new(
                0.0,
                self.ramp(active.error, target, self.control.decel_distance),
                self.heading_correction(target.hold_heading, pose.heading),
            ),
            Primitive::Turn => DriveIntent::new(
                0.0,
                0.0,
                self.ramp(active.error, target, self.control.decel_degrees),
            ),
        }
    }

    /// Proportional ramp-down with a floor, capped at the requested power.
    /// Zero inside the tolerance band so settling does not dither.
    fn ramp(&self, error: f64, target: &MotionTarget, decel: f64) -> f64 {
        if error.abs() <= target.tolerance {
            return 0.0;
        }
        let fraction = (error.abs() / decel)
            .max(self.control.min_power_fraction)
            .min(1.0);
        (error.signum() * target.power * fraction).clamp(-target.power, target.power)
    }

    fn heading_correction(&self, hold: f64, heading: f64) -> f64 {
        let limit = self.control.max_heading_correction;
        (normalize180(hold - heading) * self.control.heading_gain).clamp(-limit, limit)
    }

    fn stall_limit(
        &self,
        kind: Primitive,
        amount: f64,
        power: f64,
        full_speed: f64,
    ) -> Result<Duration, MotionError> {
        let ideal = amount / (power * full_speed);
        let expected = Duration::try_from_secs_f64(self.control.timeout_factor * ideal)
            .map_err(|_| MotionError::InvalidTarget {
                primitive: kind,
                reason: format!("power {power} is too small to finish {amount:.2} in bounded time"),
            })?;
        Ok(expected.saturating_add(self.control.timeout_margin()))
    }

    fn apply(&mut self, wheels: WheelPowers) -> Result<(), HardwareError> {
        for (id, power) in wheels.by_motor() {
            self.bus.set_power(id, power)?;
        }
        Ok(())
    }

    fn stop_motors(&mut self) {
        for id in DRIVE_MOTORS {
            if let Err(e) = self.bus.set_power(id, 0.0) {
                warn!("Failed to stop {}: {}", id, e);
            }
        }
    }

    fn finish(&mut self, active: ActiveMotion, outcome: Outcome) -> MotionState {
        self.stop_motors();
        let report = MotionReport {
            primitive: active.target.kind,
            pose: self.estimator.pose(),
            continuous_heading: self.estimator.continuous_heading(),
            final_error: active.error,
            elapsed: active.elapsed,
            limit: active.limit,
            outcome,
        };

        match &report.outcome {
            Outcome::Arrived => info!(
                "{} arrived in {:?} (error {:.3})",
                report.primitive, report.elapsed, report.final_error
            ),
            Outcome::TimedOut => warn!(
                "{} stalled after {:?} with {:.3} remaining",
                report.primitive, report.elapsed, report.final_error
            ),
            Outcome::Cancelled => info!("{} cancelled after {:?}", report.primitive, report.elapsed),
            Outcome::SensorFault(fault) => {
                warn!("{} aborted on sensor fault: {}", report.primitive, fault)
            }
        }

        MotionState::Finished(report)
    }

    fn check_idle(&self) -> Result<(), MotionError> {
        match &self.active {
            Some(active) => Err(MotionError::Busy {
                active: active.target.kind,
            }),
            None => Ok(()),
        }
    }

    /// Current status line for telemetry
    pub fn status(&self) -> MotionStatus {
        let pose = self.estimator.pose();
        match &self.active {
            Some(active) => MotionStatus {
                primitive: Some(active.target.kind),
                phase: MotionPhase::Running,
                heading: pose.heading,
                continuous_heading: self.estimator.continuous_heading(),
                forward: pose.forward,
                strafe: pose.strafe,
                error: active.error,
                elapsed_ms: active.elapsed.as_millis() as u64,
                fault: None,
            },
            None => MotionStatus::idle(pose, self.estimator.continuous_heading()),
        }
    }

    pub fn pose(&self) -> Pose {
        self.estimator.pose()
    }

    pub fn active_target(&self) -> Option<&MotionTarget> {
        self.active.as_ref().map(|active| &active.target)
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Direct port access for the launcher/indexer between primitives
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}

impl<B: MotorBus> Drop for MotionController<B> {
    fn drop(&mut self) {
        // Never leave the base driving
        self.stop_motors();
    }
}

fn axis_error(target: &MotionTarget, pose: Pose) -> f64 {
    match target.kind {
        Primitive::Drive => target.target - pose.forward,
        Primitive::Strafe => target.target - pose.strafe,
        Primitive::Turn => normalize180(target.target - pose.heading),
    }
}

fn check_power(primitive: Primitive, power: f64) -> Result<(), MotionError> {
    if power.is_finite() && power > 0.0 && power <= 1.0 {
        Ok(())
    } else {
        Err(MotionError::InvalidTarget {
            primitive,
            reason: format!("power {power} is outside (0, 1]"),
        })
    }
}

fn check_finite(primitive: Primitive, what: &str, value: f64) -> Result<(), MotionError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MotionError::InvalidTarget {
            primitive,
            reason: format!("{what} must be finite"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;
    use crate::hardware::{Direction, MotorId, SimulatedDrivetrain, SimulationParams};

    const DT: Duration = Duration::from_millis(20);

    fn controller() -> MotionController<SimulatedDrivetrain> {
        controller_with(RobotConfig::default())
    }

    fn controller_with(config: RobotConfig) -> MotionController<SimulatedDrivetrain> {
        let sim = SimulatedDrivetrain::new(SimulationParams::from_config(&config));
        MotionController::from_config(sim, &config).unwrap()
    }

    fn run(controller: &mut MotionController<SimulatedDrivetrain>) -> MotionReport {
        for _ in 0..5000 {
            match controller.step(DT, false).unwrap() {
                MotionState::Running => {}
                MotionState::Finished(report) => return report,
                MotionState::Idle => panic!("no motion in flight"),
            }
        }
        panic!("primitive never terminated");
    }

    #[test]
    fn test_setup_fixes_polarity_and_brake() {
        let controller = controller();
        let sim = controller.bus();
        assert_eq!(sim.direction(MotorId::FrontLeft), Direction::Reverse);
        assert_eq!(sim.direction(MotorId::BackLeft), Direction::Reverse);
        assert_eq!(sim.direction(MotorId::FrontRight), Direction::Forward);
        assert_eq!(sim.direction(MotorId::BackRight), Direction::Forward);
        assert_eq!(
            sim.zero_power_behavior(MotorId::BackRight),
            ZeroPowerBehavior::Brake
        );
    }

    #[test]
    fn test_invalid_calibration_fails_fast() {
        let mut config = RobotConfig::default();
        config.calibration.ticks_per_revolution = -1.0;
        let sim = SimulatedDrivetrain::new(SimulationParams::default());
        let err = MotionController::from_config(sim, &config).err().unwrap();
        assert!(matches!(
            err,
            MotionError::Configuration(ConfigurationError::NonPositive {
                name: "calibration.ticks_per_revolution",
                ..
            })
        ));
    }

    #[test]
    fn test_drive_backwards_arrives_within_tolerance() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.begin_drive(-68.0, 0.6, 0.0).unwrap();

        let report = run(&mut controller);
        assert_eq!(report.outcome, Outcome::Arrived);
        assert!(
            (-69.0..=-67.0).contains(&report.pose.forward),
            "forward {}",
            report.pose.forward
        );
        assert!((report.pose.forward + 68.0).abs() <= 0.5);
        assert_eq!(controller.bus().drive_powers(), [0.0; 4]);
        assert!(controller.is_idle());
    }

    #[test]
    fn test_drive_slows_near_target() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.begin_drive(30.0, 0.8, 0.0).unwrap();

        controller.step(DT, false).unwrap();
        controller.step(DT, false).unwrap();
        let early = controller.bus().power(MotorId::FrontRight);
        assert!((early - 0.8).abs() < 1e-9);

        while controller.pose().forward < 28.0 {
            assert_eq!(controller.step(DT, false).unwrap(), MotionState::Running);
        }
        let late = controller.bus().power(MotorId::FrontRight);
        assert!(late > 0.0 && late < 0.3, "late power {late}");
    }

    #[test]
    fn test_turn_takes_shortest_path() {
        let mut controller = controller();
        controller.initialize(45.0);
        controller.begin_turn_to(-90.0, 0.6, 1.0).unwrap();
        assert_eq!(controller.active_target().unwrap().target, 270.0);

        let mut peak_clockwise = 0.0f64;
        let report = loop {
            match controller.step(DT, false).unwrap() {
                MotionState::Running => {
                    peak_clockwise = peak_clockwise.max(controller.bus().true_pose().heading)
                }
                MotionState::Finished(report) => break report,
                MotionState::Idle => unreachable!(),
            }
        };

        assert_eq!(report.outcome, Outcome::Arrived);
        assert!(normalize180(270.0 - report.pose.heading).abs() <= 1.0);
        // Counter-clockwise by 135, never the 225 clockwise way round
        let turned = controller.bus().true_pose().heading;
        assert!((turned + 135.0).abs() < 1.5, "turned {turned}");
        assert_eq!(peak_clockwise, 0.0);
    }

    #[test]
    fn test_strafe_holds_heading() {
        let mut controller = controller();
        controller.initialize(90.0);
        controller.begin_strafe(-24.0, 0.6, 90.0).unwrap();

        let report = run(&mut controller);
        assert_eq!(report.outcome, Outcome::Arrived);
        assert!((report.pose.strafe + 24.0).abs() <= 0.5);
        assert!(report.pose.forward.abs() < 0.1);
        assert!(normalize180(report.pose.heading - 90.0).abs() < 0.5);
    }

    #[test]
    fn test_drive_corrects_toward_hold_heading() {
        let mut controller = controller();
        controller.initialize(10.0);
        controller.begin_drive(48.0, 0.6, 0.0).unwrap();

        let report = run(&mut controller);
        assert_eq!(report.outcome, Outcome::Arrived);
        assert!(normalize180(report.pose.heading).abs() < 1.0);
    }

    #[test]
    fn test_jammed_drive_times_out() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.bus_mut().set_jammed(true);
        controller.begin_drive(24.0, 0.5, 0.0).unwrap();

        let report = run(&mut controller);
        assert_eq!(report.outcome, Outcome::TimedOut);
        assert!(report.elapsed <= report.limit + DT);
        assert_eq!(controller.bus().drive_powers(), [0.0; 4]);
        assert!(matches!(
            report.into_result(),
            Err(MotionError::StallTimeout {
                primitive: Primitive::Drive,
                ..
            })
        ));
    }

    #[test]
    fn test_jammed_turn_and_strafe_time_out() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.bus_mut().set_jammed(true);

        controller.begin_turn_to(90.0, 0.5, 1.0).unwrap();
        assert_eq!(run(&mut controller).outcome, Outcome::TimedOut);

        controller.begin_strafe(10.0, 0.5, 0.0).unwrap();
        assert_eq!(run(&mut controller).outcome, Outcome::TimedOut);
    }

    #[test]
    fn test_stop_request_cancels_and_keeps_pose() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.begin_drive(40.0, 0.6, 0.0).unwrap();
        for _ in 0..25 {
            controller.step(DT, false).unwrap();
        }
        let moved = controller.pose().forward;
        assert!(moved > 5.0);

        let MotionState::Finished(report) = controller.step(DT, true).unwrap() else {
            panic!("expected terminal state");
        };
        assert_eq!(report.outcome, Outcome::Cancelled);
        assert_eq!(report.pose.forward, moved);
        assert_eq!(controller.bus().drive_powers(), [0.0; 4]);
        assert_eq!(report.into_result(), Err(MotionError::Cancelled));
    }

    #[test]
    fn test_read_failure_aborts_with_sensor_fault() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.begin_drive(40.0, 0.6, 0.0).unwrap();
        for _ in 0..10 {
            controller.step(DT, false).unwrap();
        }
        let before = controller.pose();
        controller.bus_mut().fail_reads(MotorId::LeftLaunch);

        let report = run(&mut controller);
        assert!(matches!(
            report.outcome,
            Outcome::SensorFault(SensorFault::ReadFailed { .. })
        ));
        assert_eq!(report.pose, before);
        assert_eq!(controller.bus().drive_powers(), [0.0; 4]);
    }

    #[test]
    fn test_tick_jump_aborts_with_sensor_fault() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.begin_drive(40.0, 0.6, 0.0).unwrap();
        controller.step(DT, false).unwrap();
        controller.bus_mut().inject_tick_jump(MotorId::Index, 1_000_000);

        let report = run(&mut controller);
        assert!(matches!(
            report.outcome,
            Outcome::SensorFault(SensorFault::ImplausibleJump { .. })
        ));
    }

    #[test]
    fn test_second_primitive_is_rejected_while_running() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.begin_drive(10.0, 0.5, 0.0).unwrap();
        assert_eq!(
            controller.begin_turn_to(90.0, 0.5, 1.0),
            Err(MotionError::Busy {
                active: Primitive::Drive
            })
        );
    }

    #[test]
    fn test_invalid_power_rejected() {
        let mut controller = controller();
        for power in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                controller.begin_drive(10.0, power, 0.0),
                Err(MotionError::InvalidTarget { .. })
            ));
        }
        assert!(controller.is_idle());
    }

    #[test]
    fn test_vanishing_power_rejected() {
        let mut controller = controller();
        controller.initialize(0.0);
        assert!(matches!(
            controller.begin_drive(10.0, 1e-300, 0.0),
            Err(MotionError::InvalidTarget {
                primitive: Primitive::Drive,
                ..
            })
        ));
        assert!(matches!(
            controller.begin_turn_to(90.0, 1e-300, 1.0),
            Err(MotionError::InvalidTarget {
                primitive: Primitive::Turn,
                ..
            })
        ));
        assert!(controller.is_idle());
    }

    #[test]
    fn test_step_when_idle() {
        let mut controller = controller();
        assert_eq!(controller.step(DT, false).unwrap(), MotionState::Idle);
    }

    #[test]
    fn test_settle_time_delays_arrival() {
        let mut config = RobotConfig::default();
        config.control.settle_time_secs = 0.2;
        let mut controller = controller_with(config);
        controller.initialize(0.0);
        controller.begin_drive(12.0, 0.5, 0.0).unwrap();

        let mut in_band_cycles = 0;
        let report = loop {
            match controller.step(DT, false).unwrap() {
                MotionState::Running => {
                    if (controller.pose().forward - 12.0).abs() <= 0.5 {
                        in_band_cycles += 1;
                    }
                }
                MotionState::Finished(report) => break report,
                MotionState::Idle => unreachable!(),
            }
        };
        assert_eq!(report.outcome, Outcome::Arrived);
        assert!(in_band_cycles >= 9, "arrived after {in_band_cycles} in-band cycles");
    }

    #[test]
    fn test_pose_accumulates_across_primitives() {
        let mut controller = controller();
        controller.initialize(0.0);

        controller.begin_drive(20.0, 0.6, 0.0).unwrap();
        assert!(run(&mut controller).outcome.is_arrived());
        controller.begin_strafe(10.0, 0.6, 0.0).unwrap();
        assert!(run(&mut controller).outcome.is_arrived());
        controller.begin_drive(-5.0, 0.6, 0.0).unwrap();
        let report = run(&mut controller);

        assert!(report.outcome.is_arrived());
        assert!((report.pose.forward - 15.0).abs() <= 1.0);
        assert!((report.pose.strafe - 10.0).abs() <= 1.0);
    }

    #[test]
    fn test_track_integrates_between_primitives() {
        let mut controller = controller();
        controller.initialize(0.0);
        controller.track(DT).unwrap();
        controller.bus_mut().set_ticks(MotorId::LeftLaunch, 1000);
        controller.bus_mut().set_ticks(MotorId::RightLaunch, 1000);

        let pose = controller.track(DT).unwrap();
        let expected = 1000.0 * RobotConfig::default().calibration.inches_per_tick();
        assert!((pose.forward - expected).abs() < 1e-9);
    }

    #[test]
    fn test_status_reports_running_primitive() {
        let mut controller = controller();
        controller.initialize(0.0);
        assert_eq!(controller.status().phase, MotionPhase::Idle);

        controller.begin_strafe(12.0, 0.5, 0.0).unwrap();
        controller.step(DT, false).unwrap();
        let status = controller.status();
        assert_eq!(status.primitive, Some(Primitive::Strafe));
        assert_eq!(status.phase, MotionPhase::Running);
        assert_eq!(status.elapsed_ms, 20);
    }
}
