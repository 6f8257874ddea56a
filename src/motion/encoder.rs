// Encoder sampling for the three dead-wheel channels

use std::fmt;

use serde::Serialize;

use crate::config::{OdometryChannel, OdometryChannels};
use crate::error::SensorFault;
use crate::hardware::MotorBus;

/// Logical odometry channels, independent of the port that carries them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    ForwardLeft,
    ForwardRight,
    Strafe,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::ForwardLeft => "forward-left",
            Channel::ForwardRight => "forward-right",
            Channel::Strafe => "strafe",
        })
    }
}

/// Tick counts from one control cycle, polarity already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderSnapshot {
    pub forward_left: i32,
    pub forward_right: i32,
    pub strafe: i32,
}

impl EncoderSnapshot {
    pub fn new(forward_left: i32, forward_right: i32, strafe: i32) -> Self {
        Self {
            forward_left,
            forward_right,
            strafe,
        }
    }

    pub fn get(&self, channel: Channel) -> i32 {
        match channel {
            Channel::ForwardLeft => self.forward_left,
            Channel::ForwardRight => self.forward_right,
            Channel::Strafe => self.strafe,
        }
    }
}

/// Reads the odometry channels through whichever ports they are wired to
#[derive(Debug, Clone)]
pub struct EncoderSampler {
    channels: OdometryChannels,
}

impl EncoderSampler {
    pub fn new(channels: OdometryChannels) -> Self {
        Self { channels }
    }

    /// Read all three channels. A failed read is a fault, never a zero delta.
    pub fn sample<B: MotorBus + ?Sized>(&self, bus: &mut B) -> Result<EncoderSnapshot, SensorFault> {
        Ok(EncoderSnapshot {
            forward_left: read(bus, Channel::ForwardLeft, self.channels.forward_left)?,
            forward_right: read(bus, Channel::ForwardRight, self.channels.forward_right)?,
            strafe: read(bus, Channel::Strafe, self.channels.strafe)?,
        })
    }
}

fn read<B: MotorBus + ?Sized>(
    bus: &mut B,
    channel: Channel,
    mapping: OdometryChannel,
) -> Result<i32, SensorFault> {
    let ticks = bus
        .encoder_ticks(mapping.port)
        .map_err(|source| SensorFault::ReadFailed { channel, source })?;
    Ok(if mapping.reversed {
        ticks.wrapping_neg()
    } else {
        ticks
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareError, MotorId, SimulatedDrivetrain, SimulationParams};

    #[test]
    fn test_sample_reads_mapped_ports() {
        let mut sim = SimulatedDrivetrain::new(SimulationParams::default());
        sim.set_ticks(MotorId::LeftLaunch, 120);
        sim.set_ticks(MotorId::RightLaunch, -40);
        sim.set_ticks(MotorId::Index, 7);

        let sampler = EncoderSampler::new(OdometryChannels::default());
        let snapshot = sampler.sample(&mut sim).unwrap();
        assert_eq!(snapshot, EncoderSnapshot::new(120, -40, 7));
    }

    #[test]
    fn test_reversed_channel_is_negated() {
        let mut sim = SimulatedDrivetrain::new(SimulationParams::default());
        sim.set_ticks(MotorId::Index, 300);

        let mut channels = OdometryChannels::default();
        channels.strafe.reversed = true;
        let snapshot = EncoderSampler::new(channels).sample(&mut sim).unwrap();
        assert_eq!(snapshot.strafe, -300);
    }

    #[test]
    fn test_read_failure_names_channel() {
        let mut sim = SimulatedDrivetrain::new(SimulationParams::default());
        sim.fail_reads(MotorId::RightLaunch);

        let err = EncoderSampler::new(OdometryChannels::default())
            .sample(&mut sim)
            .unwrap_err();
        match err {
            SensorFault::ReadFailed { channel, source } => {
                assert_eq!(channel, Channel::ForwardRight);
                assert!(matches!(
                    source,
                    HardwareError::ReadFailed { id: MotorId::RightLaunch, .. }
                ));
            }
            other => panic!("unexpected fault: {other:?}"),
        }
    }
}
