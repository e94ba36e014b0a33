// Per-kind session controllers
//
// A controller turns intake messages plus the latest sensor snapshot into one
// TickOutput per control tick. It never touches the motors itself; the session
// loop routes its output through the arbiter.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::state_machine::{Actuation, SafetyStateMachine, TickOutput};
use crate::config::{RobotConfig, TrackingConfig};
use crate::drive::DriveCommand;
use crate::error::ConfigError;
use crate::messages::{BehaviorMode, ControlMessage, ControllerKind, SensorMask, StatusReport};
use crate::sensors::SensorSnapshot;

pub trait Controller: Send {
    fn kind(&self) -> ControllerKind;

    /// Apply one intake message. Messages the controller has no use for are ignored.
    fn on_message(&mut self, msg: &ControlMessage, now: Instant);

    /// Compute this tick's output. Runs after command intake.
    fn update(&mut self, now: Instant, snapshot: &SensorSnapshot) -> TickOutput;

    fn status(&self) -> StatusReport;
}

/// Build the controller for a session kind
pub fn controller_for(
    kind: ControllerKind,
    config: &RobotConfig,
) -> Result<Box<dyn Controller>, ConfigError> {
    let timeout = config.scheduler.command_timeout();
    Ok(match kind {
        ControllerKind::Manual => Box::new(ManualController::new(timeout)),
        ControllerKind::Avoid => Box::new(AvoidController::new(
            kind,
            config,
            BehaviorMode::PureAvoid,
            SensorMask::ALL,
        )?),
        ControllerKind::Autopilot => Box::new(AvoidController::new(
            kind,
            config,
            BehaviorMode::HybridLineAvoid,
            SensorMask::ALL,
        )?),
        ControllerKind::Tracking => Box::new(TrackingController::new(
            kind,
            TrackingPolicy::Follow,
            config.tracking,
            timeout,
        )),
        ControllerKind::Recognition | ControllerKind::Qr => Box::new(TrackingController::new(
            kind,
            TrackingPolicy::HoldOnTarget,
            config.tracking,
            timeout,
        )),
    })
}

/// Freshness of the manual drive command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandHealth {
    Ok,
    CmdStale,
    PanicHold,
}

impl CommandHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandHealth::Ok => "ok",
            CommandHealth::CmdStale => "cmd_stale",
            CommandHealth::PanicHold => "panic_hold",
        }
    }
}

/// Direct pass-through of teleop commands, with a command watchdog
pub struct ManualController {
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    timeout: Duration,
    health: CommandHealth,
}

impl ManualController {
    pub fn new(timeout: Duration) -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            timeout,
            health: CommandHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> CommandHealth {
        self.health
    }

    /// Re-run the watchdog and panic hold without producing an output
    pub fn refresh_health(&mut self, now: Instant, panic: bool) -> CommandHealth {
        let cmd_age = now.saturating_duration_since(self.cmd_received_at);
        let health = match self.latest_cmd {
            // Watchdog triggered - stop the robot
            Some(_) if cmd_age > self.timeout => CommandHealth::CmdStale,
            Some(cmd) if panic && cmd.throttle > 0.0 => CommandHealth::PanicHold,
            Some(_) => CommandHealth::Ok,
            // Explicit stop or no command ever received
            None => CommandHealth::CmdStale,
        };
        self.set_health(health, cmd_age);
        health
    }

    fn set_health(&mut self, health: CommandHealth, cmd_age: Duration) {
        if health != self.health {
            match health {
                CommandHealth::CmdStale if self.latest_cmd.is_some() => {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age)
                }
                CommandHealth::PanicHold => warn!("Panic input, forward motion blocked"),
                _ => {}
            }
            self.health = health;
        }
    }
}

impl Controller for ManualController {
    fn kind(&self) -> ControllerKind {
        ControllerKind::Manual
    }

    fn on_message(&mut self, msg: &ControlMessage, now: Instant) {
        match msg {
            ControlMessage::Move { .. } => {
                self.latest_cmd = msg.drive_command();
                self.cmd_received_at = now;
            }
            ControlMessage::Stop => {
                self.latest_cmd = None;
                self.cmd_received_at = now;
            }
            _ => {}
        }
    }

    fn update(&mut self, now: Instant, snapshot: &SensorSnapshot) -> TickOutput {
        match (self.refresh_health(now, snapshot.panic), self.latest_cmd) {
            (CommandHealth::Ok, Some(cmd)) => TickOutput::drive(cmd),
            _ => TickOutput::stop(),
        }
    }

    fn status(&self) -> StatusReport {
        StatusReport::new(ControllerKind::Manual.as_str(), self.health.as_str())
    }
}

/// Obstacle avoidance and hybrid line-follow through the safety state machine
pub struct AvoidController {
    kind: ControllerKind,
    machine: SafetyStateMachine,
}

impl AvoidController {
    pub fn new(
        kind: ControllerKind,
        config: &RobotConfig,
        mode: BehaviorMode,
        mask: SensorMask,
    ) -> Result<Self, ConfigError> {
        let mut machine = SafetyStateMachine::new(config.avoidance)?;
        machine.set_mask(mask);
        machine.set_mode(mode, Instant::now());
        Ok(Self { kind, machine })
    }

    pub fn machine(&self) -> &SafetyStateMachine {
        &self.machine
    }
}

impl Controller for AvoidController {
    fn kind(&self) -> ControllerKind {
        self.kind
    }

    fn on_message(&mut self, msg: &ControlMessage, now: Instant) {
        match msg {
            ControlMessage::Mode { mode, mask } => {
                if let Some(mask) = mask {
                    self.machine.set_mask(*mask);
                }
                self.machine.set_mode(*mode, now);
            }
            ControlMessage::Stop => self.machine.set_mode(BehaviorMode::Standby, now),
            _ => {}
        }
    }

    fn update(&mut self, now: Instant, snapshot: &SensorSnapshot) -> TickOutput {
        let masked = snapshot.masked(self.machine.mask());
        self.machine.tick(now, &masked)
    }

    fn status(&self) -> StatusReport {
        StatusReport::new(self.machine.mode().as_str(), self.machine.state().as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingPolicy {
    /// Rotate to keep the target centred
    Follow,
    /// Manual driving that halts once the target is found and centred
    HoldOnTarget,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Target {
    found: bool,
    error_x: f64,
    seen_at: Instant,
}

/// Steering from perception results (face/colour tracking, gesture and QR holds)
pub struct TrackingController {
    kind: ControllerKind,
    policy: TrackingPolicy,
    config: TrackingConfig,
    /// Perception results older than this count as lost
    target_timeout: Duration,
    target: Option<Target>,
    manual: ManualController,
    state: &'static str,
}

impl TrackingController {
    pub fn new(
        kind: ControllerKind,
        policy: TrackingPolicy,
        config: TrackingConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            kind,
            policy,
            config,
            target_timeout: timeout,
            target: None,
            manual: ManualController::new(timeout),
            state: "searching",
        }
    }

    fn fresh_target(&self, now: Instant) -> Option<Target> {
        self.target
            .filter(|t| t.found && now.saturating_duration_since(t.seen_at) <= self.target_timeout)
    }

    fn set_state(&mut self, state: &'static str) {
        if state != self.state {
            info!("{} tracking: {} -> {}", self.kind.as_str(), self.state, state);
            self.state = state;
        }
    }
}

impl Controller for TrackingController {
    fn kind(&self) -> ControllerKind {
        self.kind
    }

    fn on_message(&mut self, msg: &ControlMessage, now: Instant) {
        match *msg {
            ControlMessage::Target { found, error_x } => {
                self.target = Some(Target {
                    found,
                    error_x,
                    seen_at: now,
                });
            }
            ControlMessage::Move { .. } | ControlMessage::Stop => self.manual.on_message(msg, now),
            _ => {}
        }
    }

    fn update(&mut self, now: Instant, snapshot: &SensorSnapshot) -> TickOutput {
        if snapshot.panic {
            self.set_state("panic_hold");
            return TickOutput::stop();
        }

        let target = self.fresh_target(now);
        match self.policy {
            TrackingPolicy::Follow => match target {
                Some(t) => {
                    self.set_state("tracking");
                    let steering = (t.error_x * self.config.kp).clamp(-1.0, 1.0);
                    TickOutput::drive(DriveCommand::pivot(steering, self.config.speed_limit))
                }
                None => {
                    self.set_state("searching");
                    TickOutput::stop()
                }
            },
            TrackingPolicy::HoldOnTarget => {
                let centred = target
                    .map(|t| t.error_x.abs() <= self.config.center_tolerance)
                    .unwrap_or(false);
                if centred {
                    self.set_state("holding");
                    self.manual.refresh_health(now, snapshot.panic);
                    TickOutput::stop()
                } else {
                    let out = self.manual.update(now, snapshot);
                    self.set_state(match out.actuation {
                        Actuation::Drive(_) => "driving",
                        Actuation::Stop => "searching",
                    });
                    out
                }
            }
        }
    }

    fn status(&self) -> StatusReport {
        StatusReport::new(self.kind.as_str(), self.state)
    }
}
