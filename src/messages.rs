// Message types for command intake and status egress

use serde::{Deserialize, Serialize};

use crate::drive::DriveCommand;
use crate::error::CommandError;

/// Line sensor channel order: [far-left, left, mid, right, far-right]
pub const LINE_CHANNELS: usize = 5;

/// Behaviour selected by the controlling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMode {
    #[default]
    Standby,
    PureAvoid,
    HybridLineAvoid,
}

impl BehaviorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorMode::Standby => "standby",
            BehaviorMode::PureAvoid => "pure_avoid",
            BehaviorMode::HybridLineAvoid => "hybrid_line_avoid",
        }
    }
}

/// Which line channels are honoured in hybrid mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorMask(pub [bool; LINE_CHANNELS]);

impl SensorMask {
    pub const ALL: SensorMask = SensorMask([true; LINE_CHANNELS]);

    /// Channel-wise AND of raw readings with the enable mask
    pub fn apply(&self, raw: [bool; LINE_CHANNELS]) -> [bool; LINE_CHANNELS] {
        std::array::from_fn(|i| raw[i] && self.0[i])
    }
}

impl Default for SensorMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Control surfaces that can own the drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    Manual,
    Autopilot,
    Tracking,
    Recognition,
    Qr,
    Avoid,
}

impl ControllerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerKind::Manual => "manual",
            ControllerKind::Autopilot => "autopilot",
            ControllerKind::Tracking => "tracking",
            ControllerKind::Recognition => "recognition",
            ControllerKind::Qr => "qr",
            ControllerKind::Avoid => "avoid",
        }
    }
}

fn default_speed() -> f64 {
    100.0
}

/// Command from the transport collaborator -> runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Manual drive intent. `x` is steering, `y` is throttle.
    Move {
        #[serde(rename = "y")]
        throttle: f64,
        #[serde(rename = "x")]
        steering: f64,
        #[serde(default = "default_speed")]
        speed: f64,
    },
    Stop,
    Mode {
        mode: BehaviorMode,
        #[serde(default)]
        mask: Option<SensorMask>,
    },
    /// Attach a session of this kind, pre-empting the current one
    Controller { kind: ControllerKind },
    /// Detach the current session
    Release,
    /// Perception result for tracking controllers
    Target {
        found: bool,
        #[serde(default)]
        error_x: f64,
    },
}

impl ControlMessage {
    /// Parse and range-check a JSON payload
    pub fn parse(payload: &[u8]) -> Result<Self, CommandError> {
        let msg: ControlMessage = serde_json::from_slice(payload)?;
        msg.validate()?;
        Ok(msg)
    }

    pub fn validate(&self) -> Result<(), CommandError> {
        match *self {
            ControlMessage::Move {
                throttle,
                steering,
                speed,
            } => {
                check_field("y", throttle, -1.0, 1.0)?;
                check_field("x", steering, -1.0, 1.0)?;
                check_field("speed", speed, 0.0, 100.0)
            }
            ControlMessage::Target { error_x, .. } => check_field("error_x", error_x, -1.0, 1.0),
            _ => Ok(()),
        }
    }

    /// Drive command carried by a `move` message
    pub fn drive_command(&self) -> Option<DriveCommand> {
        match *self {
            ControlMessage::Move {
                throttle,
                steering,
                speed,
            } => Some(DriveCommand::new(throttle, steering, speed)),
            _ => None,
        }
    }
}

fn check_field(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), CommandError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CommandError::OutOfRange { field, value })
    }
}

/// Status published by runtime on changes only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub mode: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl StatusReport {
    pub fn new(mode: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            state: state.into(),
            controller: None,
            fault: None,
        }
    }

    /// Report emitted when no session owns the drive
    pub fn idle() -> Self {
        Self::new(BehaviorMode::Standby.as_str(), "idle")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move() {
        let msg = ControlMessage::parse(br#"{"cmd":"move","x":0.25,"y":-0.5,"speed":80}"#).unwrap();
        assert_eq!(
            msg,
            ControlMessage::Move {
                throttle: -0.5,
                steering: 0.25,
                speed: 80.0
            }
        );
        let cmd = msg.drive_command().unwrap();
        assert_eq!(cmd.throttle, -0.5);
        assert_eq!(cmd.steering, 0.25);
    }

    #[test]
    fn test_move_speed_defaults_to_full() {
        let msg = ControlMessage::parse(br#"{"cmd":"move","x":0,"y":0.3}"#).unwrap();
        assert!(matches!(msg, ControlMessage::Move { speed, .. } if speed == 100.0));
    }

    #[test]
    fn test_parse_mode_with_mask() {
        let msg = ControlMessage::parse(
            br#"{"cmd":"mode","mode":"hybrid_line_avoid","mask":[false,true,true,true,false]}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ControlMessage::Mode {
                mode: BehaviorMode::HybridLineAvoid,
                mask: Some(SensorMask([false, true, true, true, false])),
            }
        );
    }

    #[test]
    fn test_unknown_and_malformed_rejected() {
        assert!(ControlMessage::parse(br#"{"cmd":"dance"}"#).is_err());
        assert!(ControlMessage::parse(br#"{"cmd":"mode","mode":"warp"}"#).is_err());
        assert!(ControlMessage::parse(b"not json").is_err());
        assert!(ControlMessage::parse(br#"{"cmd":"controller","kind":"pilot"}"#).is_err());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = ControlMessage::parse(br#"{"cmd":"move","x":1.5,"y":0}"#).unwrap_err();
        assert!(matches!(err, CommandError::OutOfRange { field: "x", .. }));
        assert!(ControlMessage::parse(br#"{"cmd":"move","x":0,"y":0,"speed":120}"#).is_err());
        assert!(ControlMessage::parse(br#"{"cmd":"target","found":true,"error_x":-2}"#).is_err());
    }

    #[test]
    fn test_mask_apply() {
        let mask = SensorMask([true, false, true, false, true]);
        assert_eq!(mask.apply([true; 5]), [true, false, true, false, true]);
        assert_eq!(mask.apply([false, true, false, true, false]), [false; 5]);
    }

    #[test]
    fn test_status_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&StatusReport::new("pure_avoid", "forward")).unwrap();
        assert_eq!(json, r#"{"mode":"pure_avoid","state":"forward"}"#);
    }
}
