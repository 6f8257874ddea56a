// Mecanum mixing for the four-wheel X-configuration base
// Converts a body-frame intent (forward, strafe, rotate) into per-wheel powers.
//
// Polarity: forward > 0 drives forward, strafe > 0 slides right and
// rotate > 0 turns clockwise, all with the drive motor directions set up
// so that +power rolls every wheel forward.

use serde::Serialize;

use crate::hardware::{DRIVE_MOTORS, MotorId};

/// Body-frame motion request, each term roughly in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DriveIntent {
    pub forward: f64,
    pub strafe: f64,
    pub rotate: f64,
}

impl DriveIntent {
    pub fn new(forward: f64, strafe: f64, rotate: f64) -> Self {
        Self {
            forward,
            strafe,
            rotate,
        }
    }
}

/// Power commands for the four drive motors
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelPowers {
    pub front_left: f64,
    pub front_right: f64,
    pub back_left: f64,
    pub back_right: f64,
}

impl WheelPowers {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns powers as array [front_left, front_right, back_left, back_right]
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }

    /// Pairs each power with the motor it drives
    pub fn by_motor(&self) -> [(MotorId, f64); 4] {
        let powers = self.as_array();
        [
            (DRIVE_MOTORS[0], powers[0]),
            (DRIVE_MOTORS[1], powers[1]),
            (DRIVE_MOTORS[2], powers[2]),
            (DRIVE_MOTORS[3], powers[3]),
        ]
    }

    pub fn max_magnitude(&self) -> f64 {
        self.as_array().iter().fold(0.0f64, |acc, p| acc.max(p.abs()))
    }
}

/// Mix an intent into wheel powers, scaling all four down together if any
/// would exceed 1 so the direction of motion is preserved
pub fn mix(intent: DriveIntent) -> WheelPowers {
    let DriveIntent {
        forward,
        strafe,
        rotate,
    } = intent;

    let mut wheels = WheelPowers {
        front_left: forward + strafe + rotate,
        front_right: forward - strafe - rotate,
        back_left: forward - strafe + rotate,
        back_right: forward + strafe - rotate,
    };

    let max = wheels.max_magnitude();
    if max > 1.0 {
        let scale = 1.0 / max;
        wheels.front_left *= scale;
        wheels.front_right *= scale;
        wheels.back_left *= scale;
        wheels.back_right *= scale;
    }

    wheels
}

/// Recover the body intent from four wheel powers (inverse of `mix` before scaling)
pub fn unmix(wheels: WheelPowers) -> DriveIntent {
    let [fl, fr, bl, br] = wheels.as_array();
    DriveIntent {
        forward: (fl + fr + bl + br) / 4.0,
        strafe: (fl - fr - bl + br) / 4.0,
        rotate: (fl - fr + bl - br) / 4.0,
    }
}
