// In-process drivetrain simulator
//
// Integrates mecanum forward kinematics from the four drive powers and
// turns the resulting body motion into dead-wheel encoder counts on the
// ports the odometry pods are wired to. No inertia: the base moves at
// (power * top speed) for the whole cycle.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Direction, HardwareError, MotorBus, MotorId, ZeroPowerBehavior, DRIVE_MOTORS};
use crate::config::{OdometryChannels, RobotConfig};
use crate::motion::mixer::{WheelPowers, unmix};

/// Physical parameters of the simulated base
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub inches_per_tick: f64,
    pub track_width: f64,
    pub strafe_pod_offset: f64,
    /// Forward speed at full power (inches/s)
    pub forward_speed: f64,
    /// Strafe speed at full power (inches/s)
    pub strafe_speed: f64,
    /// Turn rate at full power (degrees/s, clockwise positive)
    pub turn_rate: f64,
    pub odometry: OdometryChannels,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self::from_config(&RobotConfig::default())
    }
}

impl SimulationParams {
    /// A base that matches the configured calibration and nominal speeds
    pub fn from_config(config: &RobotConfig) -> Self {
        Self {
            inches_per_tick: config.calibration.inches_per_tick(),
            track_width: config.calibration.track_width,
            strafe_pod_offset: config.calibration.strafe_pod_offset,
            forward_speed: config.control.nominal_forward_speed,
            strafe_speed: config.control.nominal_strafe_speed,
            turn_rate: config.control.nominal_turn_rate,
            odometry: config.odometry,
        }
    }
}

/// Ground-truth body motion since the simulation started
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TruePose {
    pub forward: f64,
    pub strafe: f64,
    /// Unwrapped heading change (degrees)
    pub heading: f64,
}

#[derive(Debug)]
pub struct SimulatedDrivetrain {
    params: SimulationParams,
    powers: [f64; 9],
    directions: [Direction; 9],
    zero_power: [ZeroPowerBehavior; 9],
    // Fractional ticks so slow motion still accumulates
    ticks: [f64; 9],
    pose: TruePose,
    elapsed: Duration,
    jammed: bool,
    failing: HashSet<MotorId>,
    failing_writes: HashSet<MotorId>,
    pending_jump: Option<(MotorId, i32)>,
}

impl SimulatedDrivetrain {
    pub fn new(params: SimulationParams) -> Self {
        Self {
            params,
            powers: [0.0; 9],
            directions: [Direction::Forward; 9],
            zero_power: [ZeroPowerBehavior::Float; 9],
            ticks: [0.0; 9],
            pose: TruePose::default(),
            elapsed: Duration::ZERO,
            jammed: false,
            failing: HashSet::new(),
            failing_writes: HashSet::new(),
            pending_jump: None,
        }
    }

    /// Advance the physics by one cycle
    pub fn advance(&mut self, dt: Duration) {
        self.elapsed += dt;
        if self.jammed {
            return;
        }

        let intent = unmix(self.ground_powers());
        let secs = dt.as_secs_f64();
        let d_forward = intent.forward * self.params.forward_speed * secs;
        let d_strafe = intent.strafe * self.params.strafe_speed * secs;
        let d_heading_deg = intent.rotate * self.params.turn_rate * secs;
        let d_heading_rad = d_heading_deg.to_radians();

        self.pose.forward += d_forward;
        self.pose.strafe += d_strafe;
        self.pose.heading += d_heading_deg;

        let half_track = self.params.track_width / 2.0;
        let odometry = self.params.odometry;
        self.add_pod_travel(
            odometry.forward_left.port,
            odometry.forward_left.reversed,
            d_forward + half_track * d_heading_rad,
        );
        self.add_pod_travel(
            odometry.forward_right.port,
            odometry.forward_right.reversed,
            d_forward - half_track * d_heading_rad,
        );
        self.add_pod_travel(
            odometry.strafe.port,
            odometry.strafe.reversed,
            d_strafe + self.params.strafe_pod_offset * d_heading_rad,
        );
    }

    /// Wheel ground drive: direction flips the shaft, the left side is mounted mirrored
    fn ground_powers(&self) -> WheelPowers {
        let ground = |id: MotorId| {
            let mount = match id {
                MotorId::FrontLeft | MotorId::BackLeft => -1.0,
                _ => 1.0,
            };
            self.powers[id.index()] * self.directions[id.index()].sign() * mount
        };
        WheelPowers {
            front_left: ground(DRIVE_MOTORS[0]),
            front_right: ground(DRIVE_MOTORS[1]),
            back_left: ground(DRIVE_MOTORS[2]),
            back_right: ground(DRIVE_MOTORS[3]),
        }
    }

    fn add_pod_travel(&mut self, port: MotorId, reversed: bool, inches: f64) {
        let sign = if reversed { -1.0 } else { 1.0 };
        self.ticks[port.index()] += sign * inches / self.params.inches_per_tick;
    }

    /// Wheels stop responding to power (a jammed or disconnected drivetrain)
    pub fn set_jammed(&mut self, jammed: bool) {
        self.jammed = jammed;
    }

    /// Every read of this port fails until cleared
    pub fn fail_reads(&mut self, id: MotorId) {
        self.failing.insert(id);
    }

    /// Every power command to `id` is refused until the faults are cleared
    pub fn fail_writes(&mut self, id: MotorId) {
        self.failing_writes.insert(id);
    }

    pub fn clear_faults(&mut self) {
        self.failing.clear();
        self.failing_writes.clear();
    }

    /// The next read of `id` comes back offset by `ticks`, once
    pub fn inject_tick_jump(&mut self, id: MotorId, ticks: i32) {
        self.pending_jump = Some((id, ticks));
    }

    pub fn set_ticks(&mut self, id: MotorId, ticks: i32) {
        self.ticks[id.index()] = f64::from(ticks);
    }

    pub fn power(&self, id: MotorId) -> f64 {
        self.powers[id.index()]
    }

    pub fn direction(&self, id: MotorId) -> Direction {
        self.directions[id.index()]
    }

    pub fn zero_power_behavior(&self, id: MotorId) -> ZeroPowerBehavior {
        self.zero_power[id.index()]
    }

    pub fn drive_powers(&self) -> [f64; 4] {
        DRIVE_MOTORS.map(|id| self.power(id))
    }

    pub fn true_pose(&self) -> TruePose {
        self.pose
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl MotorBus for SimulatedDrivetrain {
    fn set_power(&mut self, id: MotorId, power: f64) -> Result<(), HardwareError> {
        if !power.is_finite() || power.abs() > 1.0 {
            return Err(HardwareError::PowerOutOfRange { id, value: power });
        }
        if self.failing_writes.contains(&id) {
            return Err(HardwareError::WriteFailed {
                id,
                reason: "simulated write failure".to_string(),
            });
        }
        self.powers[id.index()] = power;
        Ok(())
    }

    fn encoder_ticks(&mut self, id: MotorId) -> Result<i32, HardwareError> {
        if self.failing.contains(&id) {
            return Err(HardwareError::ReadFailed {
                id,
                reason: "simulated read failure".to_string(),
            });
        }

        let mut ticks = self.ticks[id.index()].round() as i32;
        if let Some((_, jump)) = self.pending_jump.filter(|(jump_id, _)| *jump_id == id) {
            warn!("Injecting {} tick jump on {}", jump, id);
            self.pending_jump = None;
            ticks = ticks.wrapping_add(jump);
        }
        Ok(ticks)
    }

    fn set_direction(&mut self, id: MotorId, direction: Direction) -> Result<(), HardwareError> {
        debug!("{} direction {:?}", id, direction);
        self.directions[id.index()] = direction;
        Ok(())
    }

    fn set_zero_power_behavior(
        &mut self,
        id: MotorId,
        behavior: ZeroPowerBehavior,
    ) -> Result<(), HardwareError> {
        self.zero_power[id.index()] = behavior;
        Ok(())
    }

    fn begin_cycle(&mut self, dt: Duration) {
        self.advance(dt);
    }
}
