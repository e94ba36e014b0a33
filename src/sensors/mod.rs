// Sensor side of the HAL and the background fusion task

pub mod fusion;
pub mod source;

pub use fusion::{DistanceFilter, SensorFusion, SensorHandle, SensorSnapshot};
pub use source::{NullSensors, ScriptedSensors, SensorSource};
