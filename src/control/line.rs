// Line-follow steering for hybrid mode
//
// Channel order: [far-left, left, mid, right, far-right]. Only channels
// enabled in the session mask are passed in as active.

use crate::config::AvoidanceConfig;
use crate::drive::DriveCommand;
use crate::messages::{LINE_CHANNELS, SensorMask};

const FAR_LEFT: usize = 0;
const LEFT: usize = 1;
const MID: usize = 2;
const RIGHT: usize = 3;
const FAR_RIGHT: usize = 4;

/// Outcome of one line-follow decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineAction {
    Drive(DriveCommand),
    /// No line under any enabled channel
    LostLine,
    /// Every enabled channel sees the line (crossing or finish bar)
    AllLines,
}

/// Pick a drive command from masked line readings.
///
/// Priority: all enabled channels -> stop, mid -> straight, near side ->
/// gentle turn, far side -> pivot, nothing -> stop.
///
/// The all-lines check runs first because every enabled channel seeing the
/// line includes the mid channel, so checking mid first would shadow it.
pub fn follow_line(
    active: [bool; LINE_CHANNELS],
    mask: SensorMask,
    config: &AvoidanceConfig,
) -> LineAction {
    let active = mask.apply(active);
    let enabled = mask.0.iter().filter(|&&on| on).count();
    let seen = active.iter().filter(|&&on| on).count();

    if enabled >= 2 && seen == enabled {
        return LineAction::AllLines;
    }

    let limit = config.speed_limit;
    let command = if active[MID] || (active[LEFT] && active[RIGHT]) {
        DriveCommand::straight(config.line_throttle, limit)
    } else if active[LEFT] {
        DriveCommand::new(config.line_throttle, -config.line_near_steer, limit)
    } else if active[RIGHT] {
        DriveCommand::new(config.line_throttle, config.line_near_steer, limit)
    } else if active[FAR_LEFT] {
        DriveCommand::pivot(-config.line_far_steer, limit)
    } else if active[FAR_RIGHT] {
        DriveCommand::pivot(config.line_far_steer, limit)
    } else {
        return LineAction::LostLine;
    };
    LineAction::Drive(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(active: [bool; 5], mask: SensorMask) -> LineAction {
        follow_line(active, mask, &AvoidanceConfig::default())
    }

    fn steering(action: LineAction) -> f64 {
        match action {
            LineAction::Drive(cmd) => cmd.steering,
            other => panic!("expected drive, got {:?}", other),
        }
    }

    #[test]
    fn test_mid_goes_straight() {
        let action = decide([false, true, true, false, false], SensorMask::ALL);
        assert_eq!(steering(action), 0.0);
    }

    #[test]
    fn test_near_beats_far() {
        let action = decide([false, false, false, true, true], SensorMask::ALL);
        let cfg = AvoidanceConfig::default();
        assert_eq!(steering(action), cfg.line_near_steer);
    }

    #[test]
    fn test_far_sides_pivot() {
        let cfg = AvoidanceConfig::default();
        match decide([true, false, false, false, false], SensorMask::ALL) {
            LineAction::Drive(cmd) => {
                assert_eq!(cmd.throttle, 0.0);
                assert_eq!(cmd.steering, -cfg.line_far_steer);
            }
            other => panic!("expected pivot, got {:?}", other),
        }
        assert_eq!(
            steering(decide([false, false, false, false, true], SensorMask::ALL)),
            cfg.line_far_steer
        );
    }

    #[test]
    fn test_no_line_and_all_lines_stop() {
        assert_eq!(decide([false; 5], SensorMask::ALL), LineAction::LostLine);
        assert_eq!(decide([true; 5], SensorMask::ALL), LineAction::AllLines);
    }

    #[test]
    fn test_disabled_channels_never_steer() {
        // Every combination of raw readings with only the mid channel enabled
        let mask = SensorMask([false, false, true, false, false]);
        for bits in 0u8..32 {
            let raw: [bool; 5] = std::array::from_fn(|i| bits & (1 << i) != 0);
            let action = decide(raw, mask);
            if raw[2] {
                assert_eq!(steering(action), 0.0);
            } else {
                assert_eq!(action, LineAction::LostLine);
            }
        }
    }

    #[test]
    fn test_masked_channel_does_not_count_for_all_lines() {
        let mask = SensorMask([false, true, true, true, false]);
        assert_eq!(
            decide([false, true, true, true, false], mask),
            LineAction::AllLines
        );
        // A masked far-left reading alone is ignored
        assert_eq!(
            decide([true, false, false, false, false], mask),
            LineAction::LostLine
        );
    }
}
