// Autonomous choreography: back up to the shooting station, shoot the
// preload, then for each collection lane rotate, strafe over, drive through
// collecting, come back and shoot.

use tracing::{info, warn};

use crate::config::RoutineConfig;
use crate::error::MotionError;
use crate::hardware::{HardwareError, MotorBus, MotorId};
use crate::motion::{MotionReport, Pose, normalize360};
use crate::runtime::{Host, Robot};
use crate::telemetry::TelemetrySink;

/// Launcher and indexer actuation, triggered between motion calls
pub trait Mechanisms {
    fn start_launcher(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError>;

    fn start_feed(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError>;

    fn start_intake(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError>;

    fn stop_all(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError>;
}

/// Launcher, index motor and feed servos on their own ports
#[derive(Debug, Clone)]
pub struct MotorMechanisms {
    left_launch: f64,
    right_launch: f64,
    index_shoot: f64,
    index_collect: f64,
    rotate_servo: f64,
    rotate_servo_2: f64,
}

impl MotorMechanisms {
    pub fn new(routine: &RoutineConfig) -> Self {
        Self {
            left_launch: routine.left_launch_power,
            right_launch: routine.right_launch_power,
            index_shoot: routine.index_shoot_power,
            index_collect: routine.index_collect_power,
            rotate_servo: routine.rotate_servo_power,
            rotate_servo_2: routine.rotate_servo_2_power,
        }
    }
}

impl Mechanisms for MotorMechanisms {
    fn start_launcher(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError> {
        bus.set_power(MotorId::LeftLaunch, self.left_launch)?;
        bus.set_power(MotorId::RightLaunch, self.right_launch)
    }

    fn start_feed(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError> {
        bus.set_power(MotorId::Index, self.index_shoot)?;
        bus.set_power(MotorId::RotateServo, self.rotate_servo)?;
        bus.set_power(MotorId::RotateServo2, self.rotate_servo_2)
    }

    fn start_intake(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError> {
        bus.set_power(MotorId::Index, self.index_collect)
    }

    fn stop_all(&mut self, bus: &mut dyn MotorBus) -> Result<(), HardwareError> {
        for id in [
            MotorId::LeftLaunch,
            MotorId::RightLaunch,
            MotorId::Index,
            MotorId::RotateServo,
            MotorId::RotateServo2,
        ] {
            bus.set_power(id, 0.0)?;
        }
        Ok(())
    }
}

/// What the routine got through
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineSummary {
    pub cycles_completed: usize,
    pub final_pose: Pose,
}

/// Run the full routine. Any primitive that does not arrive ends the run
/// with its error; the mechanisms are stopped on every exit path.
pub async fn run_autonomous<B, H, T, M>(
    robot: &mut Robot<B, H, T>,
    mechanisms: &mut M,
    routine: &RoutineConfig,
) -> Result<RoutineSummary, MotionError>
where
    B: MotorBus,
    H: Host,
    T: TelemetrySink,
    M: Mechanisms,
{
    robot.initialize(routine.start_heading);
    let result = choreography(robot, mechanisms, routine).await;
    stop_after(robot, mechanisms, result)
}

/// Stop the mechanisms once `result` is known. A failure to stop only
/// replaces a successful result; otherwise it is logged and the original
/// error is kept.
fn stop_after<B, H, T, M, R>(
    robot: &mut Robot<B, H, T>,
    mechanisms: &mut M,
    result: Result<R, MotionError>,
) -> Result<R, MotionError>
where
    B: MotorBus,
    H: Host,
    T: TelemetrySink,
    M: Mechanisms,
{
    match (mechanisms.stop_all(robot.controller_mut().bus_mut()), result) {
        (Err(e), Ok(_)) => Err(e.into()),
        (Err(e), Err(primary)) => {
            warn!("Failed to stop mechanisms after error ({}): {}", primary, e);
            Err(primary)
        }
        (Ok(()), result) => result,
    }
}

async fn choreography<B, H, T, M>(
    robot: &mut Robot<B, H, T>,
    mechanisms: &mut M,
    routine: &RoutineConfig,
) -> Result<RoutineSummary, MotionError>
where
    B: MotorBus,
    H: Host,
    T: TelemetrySink,
    M: Mechanisms,
{
    let power = routine.drive_power;
    let mut heading = normalize360(routine.start_heading);

    robot.phase(
        "Initial",
        format!("Backing up {} inches", routine.backup_to_shoot),
    );
    robot.drive(-routine.backup_to_shoot, power, heading).await?.into_result()?;
    robot.phase("Initial", "Shooting pre-loaded balls");
    shoot(robot, mechanisms, routine).await?;

    let mut cycles_completed = 0;
    for (i, &lane) in routine.strafe_lanes.iter().enumerate() {
        let cycle = format!("Cycle {}", i + 1);

        robot.phase(
            &cycle,
            format!("Rotating {:.0} degrees to collect", routine.rotate_to_collect),
        );
        heading = normalize360(heading + routine.rotate_to_collect);
        robot
            .turn_to(heading, routine.rotate_power, routine.rotation_tolerance)
            .await?
            .into_result()?;

        robot.phase(&cycle, format!("Strafing left {lane:.0} inches"));
        robot.strafe(-lane, power, heading).await?.into_result()?;

        robot.phase(
            &cycle,
            format!("Collecting balls ({} inches)", routine.drive_to_collect),
        );
        mechanisms.start_intake(robot.controller_mut().bus_mut())?;
        let collected = robot
            .drive(routine.drive_to_collect, power, heading)
            .await
            .and_then(MotionReport::into_result);
        stop_after(robot, mechanisms, collected)?;

        robot.phase(&cycle, "Returning to lane");
        robot
            .drive(-routine.drive_to_collect, power, heading)
            .await?
            .into_result()?;

        robot.phase(&cycle, format!("Strafing right {lane:.0} inches"));
        robot.strafe(lane, power, heading).await?.into_result()?;

        robot.phase(
            &cycle,
            format!("Rotating {:.0} degrees to shoot", routine.rotate_to_shoot),
        );
        heading = normalize360(heading + routine.rotate_to_shoot);
        robot
            .turn_to(heading, routine.rotate_power, routine.rotation_tolerance)
            .await?
            .into_result()?;

        robot.phase(&cycle, "Shooting balls");
        shoot(robot, mechanisms, routine).await?;

        cycles_completed += 1;
        info!("{} complete", cycle);
    }

    robot.phase("Complete", format!("{cycles_completed} cycles"));
    Ok(RoutineSummary {
        cycles_completed,
        final_pose: robot.pose(),
    })
}

/// Spin up, feed for the shooting window, then stop everything
async fn shoot<B, H, T, M>(
    robot: &mut Robot<B, H, T>,
    mechanisms: &mut M,
    routine: &RoutineConfig,
) -> Result<(), MotionError>
where
    B: MotorBus,
    H: Host,
    T: TelemetrySink,
    M: Mechanisms,
{
    mechanisms.start_launcher(robot.controller_mut().bus_mut())?;
    robot.hold(routine.launcher_spinup()).await?;
    mechanisms.start_feed(robot.controller_mut().bus_mut())?;
    robot.hold(routine.shooting_duration()).await?;
    mechanisms.stop_all(robot.controller_mut().bus_mut())?;
    Ok(())
}
