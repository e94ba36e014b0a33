// Sensor source contract and the non-hardware implementations

use std::collections::VecDeque;

use crate::messages::LINE_CHANNELS;

/// Raw sensor reads from the hardware collaborator.
///
/// Reads must be time-boxed by the implementation. A missing device never
/// errors: distance reads return `None`, line reads all-false and panic reads
/// an empty list.
pub trait SensorSource: Send {
    /// Ranging distance in cm, `None` on failure or no echo
    fn read_distance_cm(&mut self) -> Option<f64>;

    /// Raw line channels, [far-left, left, mid, right, far-right]
    fn read_line_channels(&mut self) -> [bool; LINE_CHANNELS];

    /// Triggered state of each proximity/bump input (zero or more)
    fn read_panic_inputs(&mut self) -> Vec<bool>;
}

/// Stand-in for a robot with no sensors wired up
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSensors;

impl SensorSource for NullSensors {
    fn read_distance_cm(&mut self) -> Option<f64> {
        None
    }

    fn read_line_channels(&mut self) -> [bool; LINE_CHANNELS] {
        [false; LINE_CHANNELS]
    }

    fn read_panic_inputs(&mut self) -> Vec<bool> {
        Vec::new()
    }
}

/// Replays queued distance samples; line and panic inputs are held values.
/// The last distance sample repeats once the queue runs dry.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSensors {
    distances: VecDeque<Option<f64>>,
    last_distance: Option<f64>,
    pub line: [bool; LINE_CHANNELS],
    pub panic: Vec<bool>,
}

impl ScriptedSensors {
    pub fn new(distances: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            distances: distances.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl SensorSource for ScriptedSensors {
    fn read_distance_cm(&mut self) -> Option<f64> {
        if let Some(sample) = self.distances.pop_front() {
            self.last_distance = sample;
        }
        self.last_distance
    }

    fn read_line_channels(&mut self) -> [bool; LINE_CHANNELS] {
        self.line
    }

    fn read_panic_inputs(&mut self) -> Vec<bool> {
        self.panic.clone()
    }
}
