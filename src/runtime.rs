// Cycle-driven orchestration
// Turns the non-blocking controller into awaitable drive/strafe/turn calls:
// each call begins a primitive, then steps it once per host cycle until it
// reaches a terminal state.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::config::{LOOP_HZ, MAX_LOOP_HZ, RobotConfig};
use crate::error::MotionError;
use crate::hardware::{MotorBus, SimulatedDrivetrain, SimulationParams};
use crate::messages::{MotionPhase, MotionStatus, PhaseUpdate};
use crate::motion::{MotionController, MotionReport, MotionState, Pose, normalize360};
use crate::routine::{MotorMechanisms, run_autonomous};
use crate::telemetry::{JsonLinesSink, TelemetrySink, TracingSink};

/// The loop that drives the core: a cycle boundary and a stop poll
pub trait Host {
    /// Wait for the next cycle and return the time since the previous one
    fn next_cycle(&mut self) -> impl Future<Output = Duration>;

    /// Operator-requested stop, polled once per cycle
    fn stop_requested(&self) -> bool;
}

/// Fixed-rate host on a tokio interval
pub struct IntervalHost {
    tick: Interval,
    last: Instant,
    stop: Arc<AtomicBool>,
    time_scale: f64,
}

impl IntervalHost {
    pub fn new(cycle_hz: u64, stop: Arc<AtomicBool>) -> Self {
        let cycle_hz = cycle_hz.clamp(1, MAX_LOOP_HZ);
        let mut tick = interval(Duration::from_millis(1000 / cycle_hz));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            tick,
            last: Instant::now(),
            stop,
            time_scale: 1.0,
        }
    }

    /// Report cycle time multiplied by `scale` (simulation speed-up)
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }
}

impl Host for IntervalHost {
    async fn next_cycle(&mut self) -> Duration {
        self.tick.tick().await;
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        dt.mul_f64(self.time_scale)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Owns the controller, the host loop and the telemetry sink for a run
pub struct Robot<B: MotorBus, H: Host, T: TelemetrySink> {
    controller: MotionController<B>,
    host: H,
    telemetry: T,
}

impl<B: MotorBus, H: Host, T: TelemetrySink> Robot<B, H, T> {
    pub fn new(controller: MotionController<B>, host: H, telemetry: T) -> Self {
        Self {
            controller,
            host,
            telemetry,
        }
    }

    pub fn initialize(&mut self, start_heading: f64) {
        self.controller.initialize(start_heading);
    }

    pub async fn drive(
        &mut self,
        inches: f64,
        power: f64,
        hold_heading: f64,
    ) -> Result<MotionReport, MotionError> {
        self.controller.begin_drive(inches, power, hold_heading)?;
        self.run_to_completion().await
    }

    pub async fn strafe(
        &mut self,
        inches: f64,
        power: f64,
        hold_heading: f64,
    ) -> Result<MotionReport, MotionError> {
        self.controller.begin_strafe(inches, power, hold_heading)?;
        self.run_to_completion().await
    }

    pub async fn turn_to(
        &mut self,
        heading: f64,
        power: f64,
        tolerance: f64,
    ) -> Result<MotionReport, MotionError> {
        self.controller.begin_turn_to(heading, power, tolerance)?;
        self.run_to_completion().await
    }

    /// Turn by `degrees` from the current heading (negative is counter-clockwise)
    pub async fn rotate_relative(
        &mut self,
        degrees: f64,
        power: f64,
        tolerance: f64,
    ) -> Result<MotionReport, MotionError> {
        let target = normalize360(self.controller.pose().heading + degrees);
        self.turn_to(target, power, tolerance).await
    }

    /// Stay put for `duration` while keeping the pose integrated
    pub async fn hold(&mut self, duration: Duration) -> Result<(), MotionError> {
        let mut waited = Duration::ZERO;
        while waited < duration {
            let dt = self.host.next_cycle().await;
            if self.host.stop_requested() {
                return Err(MotionError::Cancelled);
            }
            self.controller.track(dt)?;
            waited += dt;
        }
        Ok(())
    }

    /// Step the in-flight primitive once per cycle until it terminates
    async fn run_to_completion(&mut self) -> Result<MotionReport, MotionError> {
        loop {
            let dt = self.host.next_cycle().await;
            let running = self.controller.status();
            let state = match self.controller.step(dt, self.host.stop_requested()) {
                Ok(state) => state,
                Err(e) => {
                    // The controller is idle again; report where the base stopped
                    let stopped = self.controller.status();
                    self.telemetry.motion(&MotionStatus {
                        primitive: running.primitive,
                        phase: MotionPhase::HardwareFault,
                        error: running.error,
                        elapsed_ms: running.elapsed_ms,
                        fault: Some(e.to_string()),
                        ..stopped
                    });
                    return Err(e);
                }
            };
            match state {
                MotionState::Running => self.telemetry.motion(&self.controller.status()),
                MotionState::Finished(report) => {
                    self.telemetry.motion(&MotionStatus::from(&report));
                    return Ok(report);
                }
                MotionState::Idle => {
                    warn!("Stepped with no primitive in flight");
                    return Err(MotionError::Cancelled);
                }
            }
        }
    }

    /// Emit a choreography progress line
    pub fn phase(&mut self, phase: &str, action: impl Into<String>) {
        let update = PhaseUpdate::new(phase, action, self.controller.pose());
        self.telemetry.phase(&update);
    }

    pub fn pose(&self) -> Pose {
        self.controller.pose()
    }

    pub fn controller(&self) -> &MotionController<B> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut MotionController<B> {
        &mut self.controller
    }

    pub fn telemetry(&self) -> &T {
        &self.telemetry
    }
}

/// Telemetry output selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryFormat {
    #[default]
    Log,
    Json,
}

/// Options for a full autonomous run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub cycle_hz: u64,
    pub telemetry: TelemetryFormat,
    pub time_scale: f64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config: None,
            cycle_hz: LOOP_HZ,
            telemetry: TelemetryFormat::Log,
            time_scale: 1.0,
        }
    }
}

/// Run the autonomous routine against the simulated drivetrain
pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &options.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            RobotConfig::load(path)?
        }
        None => RobotConfig::default(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, halting at the next cycle");
            stop_flag.store(true, Ordering::Relaxed);
        }
    });

    let sim = SimulatedDrivetrain::new(SimulationParams::from_config(&config));
    let controller = MotionController::from_config(sim, &config)?;
    let host = IntervalHost::new(options.cycle_hz, stop).with_time_scale(options.time_scale);
    let telemetry: Box<dyn TelemetrySink> = match options.telemetry {
        TelemetryFormat::Log => Box::new(TracingSink),
        TelemetryFormat::Json => Box::new(JsonLinesSink::stdout()),
    };
    let mut robot = Robot::new(controller, host, telemetry);

    info!(
        "Runtime started: {}Hz loop, {} collection lanes",
        options.cycle_hz,
        config.routine.strafe_lanes.len()
    );

    let mut mechanisms = MotorMechanisms::new(&config.routine);
    match run_autonomous(&mut robot, &mut mechanisms, &config.routine).await {
        Ok(summary) => {
            info!(
                "Autonomous complete: {} cycles, heading {:.1}, forward {:.2} in, strafe {:.2} in",
                summary.cycles_completed,
                summary.final_pose.heading,
                summary.final_pose.forward,
                summary.final_pose.strafe
            );
            Ok(())
        }
        Err(MotionError::Cancelled) => {
            info!("Autonomous stopped by operator at {:?}", robot.pose());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareError, MotorId};
    use crate::motion::{Outcome, Primitive, normalize180};
    use crate::telemetry::MemorySink;

    /// Host with a fixed cycle and a stop that trips after N cycles
    struct StepHost {
        dt: Duration,
        cycles: u32,
        stop_after: Option<u32>,
    }

    impl Host for StepHost {
        async fn next_cycle(&mut self) -> Duration {
            self.cycles += 1;
            self.dt
        }

        fn stop_requested(&self) -> bool {
            self.stop_after.is_some_and(|n| self.cycles > n)
        }
    }

    fn robot(stop_after: Option<u32>) -> Robot<SimulatedDrivetrain, StepHost, MemorySink> {
        let config = RobotConfig::default();
        let sim = SimulatedDrivetrain::new(SimulationParams::from_config(&config));
        let controller = MotionController::from_config(sim, &config).unwrap();
        let host = StepHost {
            dt: Duration::from_millis(20),
            cycles: 0,
            stop_after,
        };
        Robot::new(controller, host, MemorySink::default())
    }

    #[tokio::test]
    async fn test_drive_blocks_until_arrival() {
        let mut robot = robot(None);
        robot.initialize(0.0);
        let report = robot.drive(-68.0, 0.6, 0.0).await.unwrap();

        assert_eq!(report.outcome, Outcome::Arrived);
        assert!((-69.0..=-67.0).contains(&robot.pose().forward));

        // One line per running cycle plus exactly one terminal line
        let lines = &robot.telemetry().motion;
        assert!(lines.len() > 10);
        let (last, running) = lines.split_last().unwrap();
        assert_eq!(last.phase, MotionPhase::Arrived);
        assert!(running.iter().all(|s| s.phase == MotionPhase::Running));
    }

    #[tokio::test]
    async fn test_rotate_relative_wraps_target() {
        let mut robot = robot(None);
        robot.initialize(45.0);
        let report = robot.rotate_relative(-135.0, 0.6, 1.0).await.unwrap();
        assert_eq!(report.outcome, Outcome::Arrived);
        assert!((report.pose.heading - 270.0).abs() <= 1.0);

        let report = robot.rotate_relative(135.0, 0.6, 1.0).await.unwrap();
        assert_eq!(report.outcome, Outcome::Arrived);
        // Target was taken from the heading actually reached, so errors can stack
        assert!(normalize180(report.pose.heading - 45.0).abs() <= 2.0);
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_drive() {
        let mut robot = robot(Some(30));
        robot.initialize(0.0);
        let report = robot.drive(60.0, 0.6, 0.0).await.unwrap();
        assert_eq!(report.outcome, Outcome::Cancelled);
        assert!(report.pose.forward > 0.0 && report.pose.forward < 60.0);
        assert_eq!(robot.controller().bus().drive_powers(), [0.0; 4]);
        assert_eq!(
            robot.telemetry().motion.last().unwrap().phase,
            MotionPhase::Cancelled
        );
    }

    #[tokio::test]
    async fn test_hold_waits_and_honours_stop() {
        let mut robot = robot(Some(10));
        robot.initialize(0.0);
        assert_eq!(
            robot.hold(Duration::from_secs(1)).await,
            Err(MotionError::Cancelled)
        );

        let mut robot = self::robot(None);
        robot.initialize(0.0);
        robot.hold(Duration::from_millis(100)).await.unwrap();
        assert_eq!(robot.controller().bus().elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_actuation_failure_ends_with_terminal_line() {
        let mut robot = robot(None);
        robot.initialize(0.0);
        robot.controller_mut().bus_mut().fail_writes(MotorId::FrontLeft);

        let err = robot.drive(20.0, 0.6, 0.0).await.unwrap_err();
        assert!(matches!(
            err,
            MotionError::Hardware(HardwareError::WriteFailed {
                id: MotorId::FrontLeft,
                ..
            })
        ));
        assert!(robot.controller().is_idle());

        let lines = &robot.telemetry().motion;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].phase, MotionPhase::HardwareFault);
        assert_eq!(lines[0].primitive, Some(Primitive::Drive));
        assert!(lines[0].fault.as_deref().unwrap().contains("frontleft"));
    }

    #[tokio::test]
    async fn test_terminal_line_carries_continuous_heading() {
        let mut robot = robot(None);
        robot.initialize(350.0);
        let report = robot.turn_to(20.0, 0.6, 1.0).await.unwrap();
        assert_eq!(report.outcome, Outcome::Arrived);
        assert!((report.continuous_heading - 380.0).abs() <= 1.0);

        let last = robot.telemetry().motion.last().unwrap();
        assert_eq!(last.continuous_heading, report.continuous_heading);
        assert!((last.heading - 20.0).abs() <= 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_host_scales_cycle_time() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut host = IntervalHost::new(50, stop.clone()).with_time_scale(2.0);

        // The first tick fires immediately
        assert_eq!(host.next_cycle().await, Duration::ZERO);
        assert_eq!(host.next_cycle().await, Duration::from_millis(40));
        assert_eq!(host.next_cycle().await, Duration::from_millis(40));

        assert!(!host.stop_requested());
        stop.store(true, Ordering::Relaxed);
        assert!(host.stop_requested());
    }

    #[tokio::test]
    async fn test_invalid_target_returns_error_without_cycling() {
        let mut robot = robot(None);
        robot.initialize(0.0);
        assert!(matches!(
            robot.strafe(10.0, 2.0, 0.0).await,
            Err(MotionError::InvalidTarget { .. })
        ));
        assert!(robot.telemetry().motion.is_empty());
    }
}
