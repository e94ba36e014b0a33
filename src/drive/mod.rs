// Drive path: command mixing and the motor side of the HAL
//
// Provides:
// - Arcade mixing with speed scaling and a power floor
// - Motor sink trait plus a simulated backend
// - Serial bridge backend for the motor/sensor microcontroller

pub mod bridge;
pub mod hal;
pub mod mixer;

pub use hal::{AlertSink, LogAlert, MotorLog, MotorSink, SimulatedMotors};
pub use mixer::{DriveCommand, DriveMixer, WheelPower};
