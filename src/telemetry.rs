// Telemetry sinks
//
// Publishing is fire-and-forget: a sink never returns an error to the
// control loop and never blocks it.

use std::io::Write;

use serde::Serialize;
use tracing::{debug, info};

use crate::messages::{MotionPhase, MotionStatus, PhaseUpdate};

pub trait TelemetrySink {
    fn motion(&mut self, status: &MotionStatus);

    fn phase(&mut self, update: &PhaseUpdate);
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Box<T> {
    fn motion(&mut self, status: &MotionStatus) {
        (**self).motion(status)
    }

    fn phase(&mut self, update: &PhaseUpdate) {
        (**self).phase(update)
    }
}

/// Structured `tracing` events; running lines at debug, terminal lines at info
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn motion(&mut self, status: &MotionStatus) {
        let primitive = status
            .primitive
            .map(|p| p.to_string())
            .unwrap_or_else(|| "none".to_string());
        match status.phase {
            MotionPhase::Running | MotionPhase::Idle => debug!(
                primitive = %primitive,
                phase = ?status.phase,
                heading = status.heading,
                continuous_heading = status.continuous_heading,
                forward = status.forward,
                strafe = status.strafe,
                error = status.error,
                elapsed_ms = status.elapsed_ms,
                "motion"
            ),
            _ => info!(
                primitive = %primitive,
                phase = ?status.phase,
                heading = status.heading,
                continuous_heading = status.continuous_heading,
                forward = status.forward,
                strafe = status.strafe,
                error = status.error,
                elapsed_ms = status.elapsed_ms,
                fault = status.fault.as_deref().unwrap_or(""),
                "motion finished"
            ),
        }
    }

    fn phase(&mut self, update: &PhaseUpdate) {
        info!(
            phase = %update.phase,
            heading = format_args!("{:.1}", update.heading),
            forward = format_args!("{:.1}", update.forward),
            strafe = format_args!("{:.1}", update.strafe),
            "{}",
            update.action
        );
    }
}

/// One JSON object per line on a writer (stdout by default)
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write<T: Serialize>(&mut self, kind: &str, record: &T) {
        #[derive(Serialize)]
        struct Line<'a, T> {
            kind: &'a str,
            #[serde(flatten)]
            record: &'a T,
        }

        let line = Line { kind, record };
        let result = serde_json::to_writer(&mut self.out, &line)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"));
        if let Err(e) = result {
            debug!("Dropped telemetry line: {}", e);
        }
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn motion(&mut self, status: &MotionStatus) {
        self.write("motion", status);
    }

    fn phase(&mut self, update: &PhaseUpdate) {
        self.write("phase", update);
    }
}

/// Keeps every record; for tests and post-run inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    pub motion: Vec<MotionStatus>,
    pub phases: Vec<PhaseUpdate>,
}

impl TelemetrySink for MemorySink {
    fn motion(&mut self, status: &MotionStatus) {
        self.motion.push(status.clone());
    }

    fn phase(&mut self, update: &PhaseUpdate) {
        self.phases.push(update.clone());
    }
}
