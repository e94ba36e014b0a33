// Tunables, topics, and startup validation
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::messages::ControllerKind;

// Dispatcher loop frequency (command drain + status egress)
pub const DISPATCH_HZ: u64 = 100;

// Zenoh topics
pub const TOPIC_CMD_CONTROL: &str = "raspbot/cmd/control"; // commands
pub const TOPIC_STATUS: &str = "raspbot/state/status"; // mode/state changes

// Serial bridge defaults
pub const BRIDGE_PORT: &str = "/dev/ttyAMA0";
pub const BRIDGE_BAUDRATE: u32 = 115_200;

/// Full runtime configuration. Every section falls back to its defaults, so a
/// partial JSON file only overrides the keys it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub mixer: MixerConfig,
    pub fusion: FusionConfig,
    pub avoidance: AvoidanceConfig,
    pub tracking: TrackingConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Minimum duty cycle that still turns the wheels
    pub min_pwm: f64,
    /// Stick deadzone (post-scale magnitude below which output is zero)
    pub deadzone: f64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            min_pwm: 0.40,
            deadzone: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// EMA weight of the newest sample
    pub alpha: f64,
    pub min_valid_cm: f64,
    pub max_valid_cm: f64,
    /// Distance reported when the ranging sensor is missing or has failed
    pub failure_distance_cm: f64,
    pub period_ms: u64,
    pub read_timeout_ms: u64,
    /// Consecutive rejected samples before the sensor counts as failed
    pub max_consecutive_faults: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            min_valid_cm: 2.0,
            max_valid_cm: 400.0,
            failure_distance_cm: 400.0,
            period_ms: 40,
            read_timeout_ms: 30,
            max_consecutive_faults: 25,
        }
    }
}

impl FusionConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Obstacle avoidance thresholds (cm), powers and open-loop timings (ms)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    pub critical_cm: f64,
    pub break_cm: f64,
    pub clear_path_cm: f64,
    pub emergency_hysteresis_cm: f64,

    pub cruise_throttle: f64,
    pub reverse_throttle: f64,
    pub turn_power: f64,
    pub speed_limit: f64,

    pub max_retreat_ms: u64,
    pub scan_turn_ms: u64,
    pub scan_turn_back_ms: u64,
    pub settle_ms: u64,
    pub turn_left_ms: u64,
    pub turn_right_ms: u64,
    pub dead_end_alert_ms: u64,

    pub line_throttle: f64,
    pub line_near_steer: f64,
    pub line_far_steer: f64,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            critical_cm: 10.0,
            break_cm: 20.0,
            clear_path_cm: 30.0,
            emergency_hysteresis_cm: 5.0,
            cruise_throttle: 0.5,
            reverse_throttle: 0.5,
            turn_power: 0.7,
            speed_limit: 60.0,
            max_retreat_ms: 1500,
            scan_turn_ms: 350,
            scan_turn_back_ms: 700,
            settle_ms: 200,
            turn_left_ms: 700,
            turn_right_ms: 150,
            dead_end_alert_ms: 1000,
            line_throttle: 0.4,
            line_near_steer: 0.4,
            line_far_steer: 0.8,
        }
    }
}

impl AvoidanceConfig {
    /// Enforces critical < break < clear path and sane powers/timings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.critical_cm > 0.0
            && self.critical_cm < self.break_cm
            && self.break_cm < self.clear_path_cm;
        if !ordered {
            return Err(ConfigError::ThresholdOrder {
                critical: self.critical_cm,
                brake: self.break_cm,
                clear: self.clear_path_cm,
            });
        }

        check_range(
            "avoidance.emergency_hysteresis_cm",
            self.emergency_hysteresis_cm,
            0.0,
            f64::MAX,
            "non-negative",
        )?;
        check_range("avoidance.speed_limit", self.speed_limit, 0.0, 100.0, "0..=100")?;
        for (name, value) in [
            ("avoidance.cruise_throttle", self.cruise_throttle),
            ("avoidance.reverse_throttle", self.reverse_throttle),
            ("avoidance.turn_power", self.turn_power),
            ("avoidance.line_throttle", self.line_throttle),
            ("avoidance.line_near_steer", self.line_near_steer),
            ("avoidance.line_far_steer", self.line_far_steer),
        ] {
            check_range(name, value, 0.0, 1.0, "0..=1")?;
        }

        for (name, ms) in [
            ("avoidance.max_retreat_ms", self.max_retreat_ms),
            ("avoidance.scan_turn_ms", self.scan_turn_ms),
            ("avoidance.scan_turn_back_ms", self.scan_turn_back_ms),
            ("avoidance.settle_ms", self.settle_ms),
            ("avoidance.turn_left_ms", self.turn_left_ms),
            ("avoidance.turn_right_ms", self.turn_right_ms),
            ("avoidance.dead_end_alert_ms", self.dead_end_alert_ms),
        ] {
            check_nonzero(name, ms)?;
        }
        Ok(())
    }

    pub fn max_retreat(&self) -> Duration {
        Duration::from_millis(self.max_retreat_ms)
    }

    pub fn scan_turn(&self) -> Duration {
        Duration::from_millis(self.scan_turn_ms)
    }

    pub fn scan_turn_back(&self) -> Duration {
        Duration::from_millis(self.scan_turn_back_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn turn_left(&self) -> Duration {
        Duration::from_millis(self.turn_left_ms)
    }

    pub fn turn_right(&self) -> Duration {
        Duration::from_millis(self.turn_right_ms)
    }

    pub fn dead_end_alert(&self) -> Duration {
        Duration::from_millis(self.dead_end_alert_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Proportional gain from horizontal target error to steering
    pub kp: f64,
    pub speed_limit: f64,
    /// |error_x| at or below which a target counts as centred
    pub center_tolerance: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            kp: 0.6,
            speed_limit: 40.0,
            center_tolerance: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Bounded wait for an incoming command each tick
    pub intake_timeout_ms: u64,
    pub manual_tick_ms: u64,
    pub avoid_tick_ms: u64,
    pub tracking_tick_ms: u64,
    /// Per-session command queue depth
    pub command_queue: usize,
    /// Manual watchdog: stop if no drive command within this window
    pub command_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            intake_timeout_ms: 20,
            manual_tick_ms: 10,
            avoid_tick_ms: 40,
            tracking_tick_ms: 20,
            command_queue: 32,
            command_timeout_ms: 250,
        }
    }
}

impl SchedulerConfig {
    pub fn intake_timeout(&self) -> Duration {
        Duration::from_millis(self.intake_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Delay after each actuation for a session of this kind
    pub fn tick_for(&self, kind: ControllerKind) -> Duration {
        let ms = match kind {
            ControllerKind::Manual => self.manual_tick_ms,
            ControllerKind::Avoid | ControllerKind::Autopilot => self.avoid_tick_ms,
            ControllerKind::Tracking | ControllerKind::Recognition | ControllerKind::Qr => {
                self.tracking_tick_ms
            }
        };
        Duration::from_millis(ms)
    }
}

impl RobotConfig {
    /// Load from a JSON file. A missing file falls back to defaults so the
    /// robot still starts; a broken file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("mixer.min_pwm", self.mixer.min_pwm, 0.0, 0.999, "0..1")?;
        check_range("mixer.deadzone", self.mixer.deadzone, 0.0, 0.999, "0..1")?;

        let f = &self.fusion;
        if !(f.alpha > 0.0 && f.alpha <= 1.0) {
            return Err(ConfigError::OutOfRange {
                name: "fusion.alpha",
                value: f.alpha,
                expected: "0 < alpha <= 1",
            });
        }
        if !(f.min_valid_cm >= 0.0 && f.min_valid_cm < f.max_valid_cm) {
            return Err(ConfigError::OutOfRange {
                name: "fusion.min_valid_cm",
                value: f.min_valid_cm,
                expected: "0 <= min_valid_cm < max_valid_cm",
            });
        }
        check_range(
            "fusion.failure_distance_cm",
            f.failure_distance_cm,
            0.0,
            f64::MAX,
            "non-negative",
        )?;
        check_nonzero("fusion.period_ms", f.period_ms)?;
        check_nonzero("fusion.read_timeout_ms", f.read_timeout_ms)?;

        self.avoidance.validate()?;

        check_range("tracking.kp", self.tracking.kp, 0.0, f64::MAX, "non-negative")?;
        check_range("tracking.speed_limit", self.tracking.speed_limit, 0.0, 100.0, "0..=100")?;
        check_range(
            "tracking.center_tolerance",
            self.tracking.center_tolerance,
            0.0,
            1.0,
            "0..=1",
        )?;

        let s = &self.scheduler;
        check_nonzero("scheduler.intake_timeout_ms", s.intake_timeout_ms)?;
        check_nonzero("scheduler.manual_tick_ms", s.manual_tick_ms)?;
        check_nonzero("scheduler.avoid_tick_ms", s.avoid_tick_ms)?;
        check_nonzero("scheduler.tracking_tick_ms", s.tracking_tick_ms)?;
        check_nonzero("scheduler.command_timeout_ms", s.command_timeout_ms)?;
        if s.command_queue == 0 {
            return Err(ConfigError::OutOfRange {
                name: "scheduler.command_queue",
                value: 0.0,
                expected: "at least 1",
            });
        }
        Ok(())
    }
}

fn check_range(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            expected,
        })
    }
}

fn check_nonzero(name: &'static str, ms: u64) -> Result<(), ConfigError> {
    if ms == 0 {
        Err(ConfigError::ZeroDuration { name })
    } else {
        Ok(())
    }
}
