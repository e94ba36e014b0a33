// Obstacle avoidance / line-follow state machine with a panic override
//
// Evaluated once per control tick. Every tick runs the panic check before any
// state logic, and at most one transition happens per tick. A transition tick
// always actuates stop; the new state starts moving on the following tick.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::line::{LineAction, follow_line};
use crate::config::AvoidanceConfig;
use crate::drive::DriveCommand;
use crate::error::ConfigError;
use crate::messages::{BehaviorMode, SensorMask};
use crate::sensors::SensorSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlState {
    Idle,
    Forward,
    Retreat,
    ScanInit,
    ScanTurnLeft,
    ScanReadLeft,
    ScanTurnRight,
    ScanReadRight,
    Decide,
    TurnToTarget,
    ResetAndGo,
    DeadEnd,
    Emergency,
}

impl ControlState {
    pub const ALL: [ControlState; 13] = [
        ControlState::Idle,
        ControlState::Forward,
        ControlState::Retreat,
        ControlState::ScanInit,
        ControlState::ScanTurnLeft,
        ControlState::ScanReadLeft,
        ControlState::ScanTurnRight,
        ControlState::ScanReadRight,
        ControlState::Decide,
        ControlState::TurnToTarget,
        ControlState::ResetAndGo,
        ControlState::DeadEnd,
        ControlState::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Idle => "idle",
            ControlState::Forward => "forward",
            ControlState::Retreat => "retreat",
            ControlState::ScanInit => "scan_init",
            ControlState::ScanTurnLeft => "scan_turn_left",
            ControlState::ScanReadLeft => "scan_read_left",
            ControlState::ScanTurnRight => "scan_turn_right",
            ControlState::ScanReadRight => "scan_read_right",
            ControlState::Decide => "decide",
            ControlState::TurnToTarget => "turn_to_target",
            ControlState::ResetAndGo => "reset_and_go",
            ControlState::DeadEnd => "dead_end",
            ControlState::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// What a controller wants the drive to do this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Actuation {
    Stop,
    Drive(DriveCommand),
}

/// Result of one state machine tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    pub actuation: Actuation,
    /// Buzzer request (dead end)
    pub alert: bool,
}

impl TickOutput {
    pub fn stop() -> Self {
        Self {
            actuation: Actuation::Stop,
            alert: false,
        }
    }

    pub fn drive(cmd: DriveCommand) -> Self {
        Self {
            actuation: Actuation::Drive(cmd),
            alert: false,
        }
    }
}

/// Side to turn toward after a scan. Both sides must exceed the clear-path
/// threshold to compare; a tie goes right since the scan ends facing right.
pub fn choose_side(dist_left: f64, dist_right: f64, clear_path_cm: f64) -> Option<Side> {
    match (dist_left > clear_path_cm, dist_right > clear_path_cm) {
        (true, true) if dist_left > dist_right => Some(Side::Left),
        (true, true) => Some(Side::Right),
        (true, false) => Some(Side::Left),
        (false, true) => Some(Side::Right),
        (false, false) => None,
    }
}

pub struct SafetyStateMachine {
    config: AvoidanceConfig,
    mode: BehaviorMode,
    mask: SensorMask,
    state: ControlState,
    entered_at: Instant,
    retreat_locked: bool,
    dist_left: Option<f64>,
    dist_right: Option<f64>,
    target: Option<Side>,
}

impl SafetyStateMachine {
    /// Fails if the threshold ordering or timings are invalid
    pub fn new(config: AvoidanceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            mode: BehaviorMode::Standby,
            mask: SensorMask::ALL,
            state: ControlState::Idle,
            entered_at: Instant::now(),
            retreat_locked: false,
            dist_left: None,
            dist_right: None,
            target: None,
        })
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn mode(&self) -> BehaviorMode {
        self.mode
    }

    pub fn mask(&self) -> SensorMask {
        self.mask
    }

    pub fn retreat_locked(&self) -> bool {
        self.retreat_locked
    }

    /// Last scan readings (left, right)
    pub fn scan_readings(&self) -> (Option<f64>, Option<f64>) {
        (self.dist_left, self.dist_right)
    }

    pub fn target(&self) -> Option<Side> {
        self.target
    }

    /// Switch behaviour. Entering or leaving Standby discards all state;
    /// switching between active modes keeps the current manoeuvre.
    pub fn set_mode(&mut self, mode: BehaviorMode, now: Instant) {
        if mode == self.mode {
            return;
        }
        info!("Behavior mode {} -> {}", self.mode.as_str(), mode.as_str());
        if mode == BehaviorMode::Standby || self.mode == BehaviorMode::Standby {
            self.reset(now);
        }
        self.mode = mode;
    }

    pub fn set_mask(&mut self, mask: SensorMask) {
        self.mask = mask;
    }

    /// Back to Idle with no latch, readings or timers left over
    pub fn reset(&mut self, now: Instant) {
        self.state = ControlState::Idle;
        self.entered_at = now;
        self.retreat_locked = false;
        self.dist_left = None;
        self.dist_right = None;
        self.target = None;
    }

    fn enter(&mut self, next: ControlState, now: Instant) {
        debug!("State {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        self.entered_at = now;
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.entered_at)
    }

    /// Transition to `next` and stop for this tick
    fn transition(&mut self, next: ControlState, now: Instant) -> TickOutput {
        self.enter(next, now);
        TickOutput::stop()
    }

    pub fn tick(&mut self, now: Instant, snapshot: &SensorSnapshot) -> TickOutput {
        if self.mode == BehaviorMode::Standby {
            if self.state != ControlState::Idle {
                self.reset(now);
            }
            return TickOutput::stop();
        }

        // Panic preempts everything. The latch is only set here, so a cycle
        // started by distance alone still reacts to a bump.
        if snapshot.panic && !self.retreat_locked {
            warn!("Panic input in {}, emergency stop", self.state.as_str());
            self.retreat_locked = true;
            return self.transition(ControlState::Emergency, now);
        }

        let cfg = self.config;
        let distance = snapshot.distance_cm;
        let elapsed = self.elapsed(now);

        match self.state {
            ControlState::Idle => self.transition(ControlState::Forward, now),

            ControlState::Forward => {
                if distance < cfg.critical_cm && !self.retreat_locked {
                    info!("Obstacle at {:.1} cm (critical), retreating", distance);
                    self.transition(ControlState::Retreat, now)
                } else if distance <= cfg.break_cm {
                    info!("Obstacle at {:.1} cm, scanning", distance);
                    self.transition(ControlState::ScanInit, now)
                } else {
                    self.cruise(snapshot)
                }
            }

            ControlState::Retreat => {
                if distance >= cfg.break_cm {
                    self.transition(ControlState::ScanInit, now)
                } else if elapsed > cfg.max_retreat() {
                    warn!("Retreat timed out at {:.1} cm", distance);
                    self.transition(ControlState::ScanInit, now)
                } else {
                    TickOutput::drive(DriveCommand::straight(
                        -cfg.reverse_throttle,
                        cfg.speed_limit,
                    ))
                }
            }

            ControlState::ScanInit => {
                self.dist_left = None;
                self.dist_right = None;
                self.target = None;
                self.transition(ControlState::ScanTurnLeft, now)
            }

            ControlState::ScanTurnLeft => {
                if elapsed >= cfg.scan_turn() {
                    self.transition(ControlState::ScanReadLeft, now)
                } else {
                    TickOutput::drive(DriveCommand::pivot(-cfg.turn_power, cfg.speed_limit))
                }
            }

            ControlState::ScanReadLeft => {
                if elapsed >= cfg.settle() {
                    debug!("Scan left: {:.1} cm", distance);
                    self.dist_left = Some(distance);
                    self.transition(ControlState::ScanTurnRight, now)
                } else {
                    TickOutput::stop()
                }
            }

            ControlState::ScanTurnRight => {
                if elapsed >= cfg.scan_turn_back() {
                    self.transition(ControlState::ScanReadRight, now)
                } else {
                    TickOutput::drive(DriveCommand::pivot(cfg.turn_power, cfg.speed_limit))
                }
            }

            ControlState::ScanReadRight => {
                if elapsed >= cfg.settle() {
                    debug!("Scan right: {:.1} cm", distance);
                    self.dist_right = Some(distance);
                    self.transition(ControlState::Decide, now)
                } else {
                    TickOutput::stop()
                }
            }

            ControlState::Decide => {
                let left = self.dist_left.unwrap_or(0.0);
                let right = self.dist_right.unwrap_or(0.0);
                self.target = choose_side(left, right, cfg.clear_path_cm);
                match self.target {
                    Some(side) => {
                        info!("Clear path {:?} (L={:.1} R={:.1})", side, left, right);
                        self.transition(ControlState::TurnToTarget, now)
                    }
                    None => {
                        warn!("Dead end (L={:.1} R={:.1})", left, right);
                        self.transition(ControlState::DeadEnd, now)
                    }
                }
            }

            ControlState::TurnToTarget => {
                let (duration, power) = match self.target {
                    Some(Side::Left) => (cfg.turn_left(), -cfg.turn_power),
                    _ => (cfg.turn_right(), cfg.turn_power),
                };
                if elapsed >= duration {
                    self.transition(ControlState::ResetAndGo, now)
                } else {
                    TickOutput::drive(DriveCommand::pivot(power, cfg.speed_limit))
                }
            }

            ControlState::ResetAndGo => {
                self.retreat_locked = false;
                self.transition(ControlState::Forward, now)
            }

            ControlState::DeadEnd => {
                if elapsed >= cfg.dead_end_alert() {
                    self.transition(ControlState::ScanInit, now)
                } else {
                    TickOutput {
                        actuation: Actuation::Stop,
                        alert: true,
                    }
                }
            }

            // Exit through the rescan cycle, not Forward: only ResetAndGo clears the latch
            ControlState::Emergency => {
                if snapshot.panic {
                    TickOutput::stop()
                } else if distance >= cfg.critical_cm + cfg.emergency_hysteresis_cm {
                    info!("Emergency cleared at {:.1} cm, rescanning", distance);
                    self.transition(ControlState::ScanInit, now)
                } else {
                    info!("Emergency cleared at {:.1} cm, backing out", distance);
                    self.transition(ControlState::Retreat, now)
                }
            }
        }
    }

    /// Forward motion for the current behaviour
    fn cruise(&self, snapshot: &SensorSnapshot) -> TickOutput {
        let cfg = &self.config;
        match self.mode {
            BehaviorMode::HybridLineAvoid => {
                match follow_line(snapshot.line_mask, self.mask, cfg) {
                    LineAction::Drive(cmd) => TickOutput::drive(cmd),
                    LineAction::LostLine | LineAction::AllLines => TickOutput::stop(),
                }
            }
            _ => TickOutput::drive(DriveCommand::straight(cfg.cruise_throttle, cfg.speed_limit)),
        }
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: ControlState, now: Instant) {
        self.enter(state, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn at(distance_cm: f64) -> SensorSnapshot {
        SensorSnapshot::clear(distance_cm)
    }

    fn panic_at(distance_cm: f64) -> SensorSnapshot {
        SensorSnapshot {
            panic: true,
            ..SensorSnapshot::clear(distance_cm)
        }
    }

    fn machine(mode: BehaviorMode, t0: Instant) -> SafetyStateMachine {
        let mut sm = SafetyStateMachine::new(AvoidanceConfig::default()).unwrap();
        sm.set_mode(mode, t0);
        sm
    }

    /// Machine already cruising in Forward
    fn forward(t0: Instant) -> SafetyStateMachine {
        let mut sm = machine(BehaviorMode::PureAvoid, t0);
        assert_eq!(sm.tick(t0, &at(100.0)).actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::Forward);
        sm
    }

    #[test]
    fn test_rejects_bad_threshold_order() {
        let config = AvoidanceConfig {
            critical_cm: 25.0,
            ..AvoidanceConfig::default()
        };
        assert!(SafetyStateMachine::new(config).is_err());
    }

    #[test]
    fn test_standby_holds_idle() {
        let t0 = Instant::now();
        let mut sm = machine(BehaviorMode::Standby, t0);
        for i in 0..5 {
            assert_eq!(sm.tick(t0 + ms(i * 40), &at(5.0)), TickOutput::stop());
            assert_eq!(sm.state(), ControlState::Idle);
        }
    }

    #[test]
    fn test_forward_drives_when_clear() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        match sm.tick(t0 + ms(40), &at(100.0)).actuation {
            Actuation::Drive(cmd) => {
                assert!(cmd.throttle > 0.0);
                assert_eq!(cmd.steering, 0.0);
            }
            other => panic!("expected drive, got {:?}", other),
        }
    }

    #[test]
    fn test_critical_distance_retreats_with_stop_first() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        assert!(!sm.retreat_locked());

        let out = sm.tick(t0 + ms(40), &at(8.0));
        assert_eq!(out.actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::Retreat);
        assert!(!sm.retreat_locked());

        match sm.tick(t0 + ms(80), &at(8.0)).actuation {
            Actuation::Drive(cmd) => assert!(cmd.throttle < 0.0),
            other => panic!("expected reverse, got {:?}", other),
        }
    }

    #[test]
    fn test_break_distance_scans() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        let out = sm.tick(t0 + ms(40), &at(18.0));
        assert_eq!(out.actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::ScanInit);
        assert!(!sm.retreat_locked());
    }

    #[test]
    fn test_retreat_ends_on_clearance_or_timeout() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0, &at(5.0));
        sm.tick(t0 + ms(40), &at(12.0));
        assert_eq!(sm.state(), ControlState::Retreat);
        sm.tick(t0 + ms(80), &at(21.0));
        assert_eq!(sm.state(), ControlState::ScanInit);

        let mut sm = forward(t0);
        sm.tick(t0, &at(5.0));
        sm.tick(t0 + ms(1000), &at(6.0));
        assert_eq!(sm.state(), ControlState::Retreat);
        let out = sm.tick(t0 + ms(1600), &at(6.0));
        assert_eq!(out.actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::ScanInit);
    }

    /// Drive a machine sitting in ScanInit through the scan to Decide
    fn run_scan(sm: &mut SafetyStateMachine, start: Instant, left: f64, right: f64) -> Instant {
        let cfg = AvoidanceConfig::default();
        let mut t = start;
        sm.tick(t, &at(15.0));
        assert_eq!(sm.state(), ControlState::ScanTurnLeft);

        match sm.tick(t, &at(15.0)).actuation {
            Actuation::Drive(cmd) => assert!(cmd.steering < 0.0),
            other => panic!("expected left pivot, got {:?}", other),
        }
        t += cfg.scan_turn();
        sm.tick(t, &at(left));
        assert_eq!(sm.state(), ControlState::ScanReadLeft);

        // Still settling
        assert_eq!(sm.tick(t + ms(10), &at(left)).actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::ScanReadLeft);
        t += cfg.settle();
        sm.tick(t, &at(left));
        assert_eq!(sm.state(), ControlState::ScanTurnRight);

        match sm.tick(t, &at(left)).actuation {
            Actuation::Drive(cmd) => assert!(cmd.steering > 0.0),
            other => panic!("expected right pivot, got {:?}", other),
        }
        t += cfg.scan_turn_back();
        sm.tick(t, &at(right));
        assert_eq!(sm.state(), ControlState::ScanReadRight);
        t += cfg.settle();
        sm.tick(t, &at(right));
        assert_eq!(sm.state(), ControlState::Decide);
        assert_eq!(sm.scan_readings(), (Some(left), Some(right)));
        t
    }

    #[test]
    fn test_full_retreat_and_rescan_cycle_clears_lock() {
        let cfg = AvoidanceConfig::default();
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0, &panic_at(40.0));
        assert!(sm.retreat_locked());
        sm.tick(t0 + ms(40), &at(40.0));
        assert_eq!(sm.state(), ControlState::ScanInit);

        let mut t = run_scan(&mut sm, t0 + ms(80), 80.0, 45.0);
        sm.tick(t, &at(80.0));
        assert_eq!(sm.state(), ControlState::TurnToTarget);
        assert_eq!(sm.target(), Some(Side::Left));

        match sm.tick(t + ms(10), &at(80.0)).actuation {
            Actuation::Drive(cmd) => assert!(cmd.steering < 0.0),
            other => panic!("expected left turn, got {:?}", other),
        }
        t += cfg.turn_left();
        sm.tick(t, &at(80.0));
        assert_eq!(sm.state(), ControlState::ResetAndGo);
        assert!(sm.retreat_locked());

        sm.tick(t + ms(40), &at(80.0));
        assert_eq!(sm.state(), ControlState::Forward);
        assert!(!sm.retreat_locked());
    }

    #[test]
    fn test_decide_side_selection() {
        assert_eq!(choose_side(80.0, 45.0, 30.0), Some(Side::Left));
        assert_eq!(choose_side(45.0, 80.0, 30.0), Some(Side::Right));
        assert_eq!(choose_side(50.0, 50.0, 30.0), Some(Side::Right));
        assert_eq!(choose_side(50.0, 12.0, 30.0), Some(Side::Left));
        assert_eq!(choose_side(30.0, 31.0, 30.0), Some(Side::Right));
        assert_eq!(choose_side(30.0, 30.0, 30.0), None);
    }

    #[test]
    fn test_dead_end_alerts_then_rescans() {
        let cfg = AvoidanceConfig::default();
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0, &at(18.0));
        let t = run_scan(&mut sm, t0 + ms(40), 12.0, 14.0);
        sm.tick(t, &at(14.0));
        assert_eq!(sm.state(), ControlState::DeadEnd);

        let out = sm.tick(t + ms(40), &at(14.0));
        assert!(out.alert);
        assert_eq!(out.actuation, Actuation::Stop);

        let out = sm.tick(t + cfg.dead_end_alert(), &at(14.0));
        assert!(!out.alert);
        assert_eq!(sm.state(), ControlState::ScanInit);
    }

    #[test]
    fn test_panic_preempts_every_state() {
        let t0 = Instant::now();
        for state in ControlState::ALL {
            if state == ControlState::Emergency {
                continue;
            }
            let mut sm = machine(BehaviorMode::PureAvoid, t0);
            sm.force_state(state, t0);
            assert!(!sm.retreat_locked());

            let out = sm.tick(t0 + ms(40), &panic_at(100.0));
            assert_eq!(out.actuation, Actuation::Stop, "from {:?}", state);
            assert_eq!(sm.state(), ControlState::Emergency, "from {:?}", state);
            assert!(sm.retreat_locked());
        }
    }

    #[test]
    fn test_emergency_holds_while_panic() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0, &panic_at(50.0));
        for i in 1..10 {
            assert_eq!(sm.tick(t0 + ms(i * 40), &panic_at(50.0)), TickOutput::stop());
            assert_eq!(sm.state(), ControlState::Emergency);
        }
    }

    #[test]
    fn test_emergency_exit_uses_hysteresis() {
        let t0 = Instant::now();

        // 12 cm clears critical (10) but not critical + hysteresis (15)
        let mut sm = forward(t0);
        sm.tick(t0, &panic_at(12.0));
        sm.tick(t0 + ms(40), &at(12.0));
        assert_eq!(sm.state(), ControlState::Retreat);
        assert!(sm.retreat_locked());

        let mut sm = forward(t0);
        sm.tick(t0, &panic_at(40.0));
        sm.tick(t0 + ms(40), &at(40.0));
        assert_eq!(sm.state(), ControlState::ScanInit);
        assert!(sm.retreat_locked());
    }

    #[test]
    fn test_panic_latch_ignores_retrigger_while_backing_out() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0, &panic_at(6.0));
        sm.tick(t0 + ms(40), &at(6.0));
        assert_eq!(sm.state(), ControlState::Retreat);
        assert!(sm.retreat_locked());

        // The bump sensor re-triggering during its own evasive manoeuvre
        match sm.tick(t0 + ms(80), &panic_at(6.0)).actuation {
            Actuation::Drive(cmd) => assert!(cmd.throttle < 0.0),
            other => panic!("expected reverse, got {:?}", other),
        }
        assert_eq!(sm.state(), ControlState::Retreat);
    }

    #[test]
    fn test_panic_stops_distance_triggered_retreat() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0 + ms(40), &at(8.0));
        assert_eq!(sm.state(), ControlState::Retreat);
        assert!(!sm.retreat_locked());

        let out = sm.tick(t0 + ms(80), &panic_at(8.0));
        assert_eq!(out.actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::Emergency);
        assert!(sm.retreat_locked());
    }

    #[test]
    fn test_panic_stops_distance_triggered_scan() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0 + ms(40), &at(8.0));
        sm.tick(t0 + ms(80), &at(25.0));
        sm.tick(t0 + ms(120), &at(25.0));
        assert_eq!(sm.state(), ControlState::ScanTurnLeft);
        assert!(matches!(
            sm.tick(t0 + ms(160), &at(25.0)).actuation,
            Actuation::Drive(_)
        ));

        let out = sm.tick(t0 + ms(200), &panic_at(25.0));
        assert_eq!(out.actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::Emergency);
    }

    #[test]
    fn test_standby_round_trip_resets() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0, &panic_at(5.0));
        assert!(sm.retreat_locked());

        sm.set_mode(BehaviorMode::Standby, t0 + ms(40));
        assert_eq!(sm.state(), ControlState::Idle);
        assert!(!sm.retreat_locked());
        sm.set_mode(BehaviorMode::PureAvoid, t0 + ms(80));

        sm.tick(t0 + ms(120), &at(100.0));
        assert_eq!(sm.state(), ControlState::Forward);
        assert!(!sm.retreat_locked());
        assert_eq!(sm.scan_readings(), (None, None));
    }

    #[test]
    fn test_switching_active_modes_keeps_manoeuvre() {
        let t0 = Instant::now();
        let mut sm = forward(t0);
        sm.tick(t0, &at(5.0));
        sm.set_mode(BehaviorMode::HybridLineAvoid, t0 + ms(10));
        assert_eq!(sm.state(), ControlState::Retreat);
        assert_eq!(sm.mode(), BehaviorMode::HybridLineAvoid);
    }

    #[test]
    fn test_hybrid_follows_line_and_honours_mask() {
        let t0 = Instant::now();
        let mut sm = machine(BehaviorMode::HybridLineAvoid, t0);
        sm.tick(t0, &at(100.0));

        let mut snapshot = at(100.0);
        snapshot.line_mask = [false, true, false, false, false];
        match sm.tick(t0 + ms(40), &snapshot).actuation {
            Actuation::Drive(cmd) => assert!(cmd.steering < 0.0),
            other => panic!("expected left correction, got {:?}", other),
        }

        sm.set_mask(SensorMask([true, false, true, true, true]));
        assert_eq!(sm.tick(t0 + ms(80), &snapshot).actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::Forward);
    }

    #[test]
    fn test_hybrid_obstacle_overrides_line() {
        let t0 = Instant::now();
        let mut sm = machine(BehaviorMode::HybridLineAvoid, t0);
        sm.tick(t0, &at(100.0));

        let mut snapshot = at(19.0);
        snapshot.line_mask = [false, false, true, false, false];
        assert_eq!(sm.tick(t0 + ms(40), &snapshot).actuation, Actuation::Stop);
        assert_eq!(sm.state(), ControlState::ScanInit);
    }
}
