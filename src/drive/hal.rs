// Actuation side of the hardware abstraction layer
//
// Anything that can turn wheels implements MotorSink. Calls must be cheap
// enough to run every control tick and idempotent.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::mixer::WheelPower;
use crate::error::HalError;

/// Drive actuation sink
pub trait MotorSink: Send {
    fn set_wheel_power(&mut self, power: WheelPower) -> Result<(), HalError>;

    fn stop(&mut self) -> Result<(), HalError> {
        self.set_wheel_power(WheelPower::zero())
    }
}

impl MotorSink for Box<dyn MotorSink> {
    fn set_wheel_power(&mut self, power: WheelPower) -> Result<(), HalError> {
        (**self).set_wheel_power(power)
    }

    fn stop(&mut self) -> Result<(), HalError> {
        (**self).stop()
    }
}

/// Audible alert output (buzzer)
pub trait AlertSink: Send {
    fn set_alert(&mut self, on: bool);
}

/// Alert sink that only logs transitions
#[derive(Debug, Default)]
pub struct LogAlert {
    on: bool,
}

impl AlertSink for LogAlert {
    fn set_alert(&mut self, on: bool) {
        if on != self.on {
            if on {
                warn!("Alert ON");
            } else {
                info!("Alert off");
            }
            self.on = on;
        }
    }
}

/// Shared record of every power value written to a simulated sink
pub type MotorLog = Arc<Mutex<Vec<WheelPower>>>;

/// Motor sink used without hardware. Renders the output as bars at debug
/// level and optionally records it.
#[derive(Debug, Default)]
pub struct SimulatedMotors {
    last: WheelPower,
    log: Option<MotorLog>,
}

impl SimulatedMotors {
    pub fn new() -> Self {
        info!("Motor driver running in simulation");
        Self::default()
    }

    /// Simulated sink plus a handle to its output history
    pub fn with_log() -> (Self, MotorLog) {
        let log = MotorLog::default();
        let motors = Self {
            last: WheelPower::zero(),
            log: Some(Arc::clone(&log)),
        };
        (motors, log)
    }

    pub fn last(&self) -> WheelPower {
        self.last
    }
}

impl MotorSink for SimulatedMotors {
    fn set_wheel_power(&mut self, power: WheelPower) -> Result<(), HalError> {
        if power != self.last {
            if power.is_zero() {
                debug!("[STOP] Motors halted");
            } else {
                debug!(
                    "L:{:+.2} {:<15} | R:{:+.2} {:<15}",
                    power.left,
                    bar(power.left),
                    power.right,
                    bar(power.right)
                );
            }
        }
        self.last = power;
        if let Some(log) = &self.log {
            if let Ok(mut entries) = log.lock() {
                entries.push(power);
            }
        }
        Ok(())
    }
}

fn bar(value: f64) -> String {
    let glyph = if value > 0.0 { "█" } else { "░" };
    glyph.repeat((value.abs() * 15.0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let (mut motors, log) = SimulatedMotors::with_log();
        motors.set_wheel_power(WheelPower::new(0.7, 0.7)).unwrap();
        motors.stop().unwrap();
        motors.stop().unwrap();

        let entries = log.lock().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1], WheelPower::zero());
        assert_eq!(entries[2], WheelPower::zero());
        assert_eq!(motors.last(), WheelPower::zero());
    }

    #[test]
    fn test_boxed_sink_forwards() {
        let (motors, log) = SimulatedMotors::with_log();
        let mut boxed: Box<dyn MotorSink> = Box::new(motors);
        boxed.set_wheel_power(WheelPower::new(-0.5, 0.5)).unwrap();
        boxed.stop().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![WheelPower::new(-0.5, 0.5), WheelPower::zero()]
        );
    }

    #[test]
    fn test_bar_length() {
        assert_eq!(bar(1.0).chars().count(), 15);
        assert_eq!(bar(-0.4).chars().count(), 6);
        assert_eq!(bar(0.0), "");
    }
}
