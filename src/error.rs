// Error types for the control runtime
//
// Config errors are fatal before the control loop starts. HAL errors are
// surfaced to the session and never crash the process. Command errors are
// logged and the offending message is dropped.

/// Invalid or inconsistent configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Need critical < break < clear path, got {critical} / {brake} / {clear} cm")]
    ThresholdOrder { critical: f64, brake: f64, clear: f64 },

    #[error("Parameter {name} out of range: {value} ({expected})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("Duration {name} must be non-zero")]
    ZeroDuration { name: &'static str },

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Hardware abstraction layer failures
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from bridge: {reason}")]
    InvalidResponse { reason: String },

    #[error("Checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Bridge returned error status: 0x{status:02X}")]
    DeviceError { status: u8 },

    #[error("Timeout waiting for bridge response")]
    Timeout,
}

/// Rejected command intake message
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Top-level runtime error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hal(#[from] HalError),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, Error>;
