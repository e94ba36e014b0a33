// Arcade drive mixing for the differential base
//
// Converts a normalized (throttle, steering, speed_limit) intent into
// per-side wheel power. Pure and deterministic; actuation happens elsewhere.

use crate::config::MixerConfig;

/// Normalized drive intent produced by a session each tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveCommand {
    pub throttle: f64,    // [-1, 1], positive = forward
    pub steering: f64,    // [-1, 1], positive = right
    pub speed_limit: f64, // [0, 100] percent
}

impl DriveCommand {
    pub fn new(throttle: f64, steering: f64, speed_limit: f64) -> Self {
        Self {
            throttle,
            steering,
            speed_limit,
        }
    }

    /// Straight-line motion
    pub fn straight(throttle: f64, speed_limit: f64) -> Self {
        Self::new(throttle, 0.0, speed_limit)
    }

    /// Rotate in place. Negative power turns left.
    pub fn pivot(power: f64, speed_limit: f64) -> Self {
        Self::new(0.0, power, speed_limit)
    }
}

/// Per-side wheel power, each in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelPower {
    pub left: f64,
    pub right: f64,
}

impl WheelPower {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Arcade mixer with speed scaling and a minimum-effective-power floor
#[derive(Debug, Clone, Copy)]
pub struct DriveMixer {
    min_pwm: f64,
    deadzone: f64,
}

impl Default for DriveMixer {
    fn default() -> Self {
        Self::new(MixerConfig::default())
    }
}

impl DriveMixer {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            min_pwm: config.min_pwm,
            deadzone: config.deadzone,
        }
    }

    pub fn mix(&self, cmd: DriveCommand) -> WheelPower {
        let throttle = finite_or_zero(cmd.throttle);
        let steering = finite_or_zero(cmd.steering);

        // 1. Arcade mixing, clamped per side
        let left = (throttle + steering).clamp(-1.0, 1.0);
        let right = (throttle - steering).clamp(-1.0, 1.0);

        // 2. Speed scaling
        let scale = finite_or_zero(cmd.speed_limit).clamp(0.0, 100.0) / 100.0;

        // 3. Power floor
        WheelPower {
            left: self.apply_floor(left * scale),
            right: self.apply_floor(right * scale),
        }
    }

    /// Maps |v| in [deadzone, 1] onto [min_pwm, 1]; anything smaller is zero
    fn apply_floor(&self, value: f64) -> f64 {
        let magnitude = value.abs();
        if magnitude == 0.0 || magnitude < self.deadzone {
            return 0.0;
        }
        let mapped = self.min_pwm + magnitude * (1.0 - self.min_pwm);
        value.signum() * mapped.min(1.0)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
