use crate::{FrequencyGrid, LevelControlMode};
use std::time::Duration;
use thiserror::Error;

/// Request rejected before any device I/O.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{value} is outside the allowed range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("sweep stop frequency {stop} Hz must be above start frequency {start} Hz")]
    EmptySweep { start: f64, stop: f64 },
    #[error("sweep step {0} Hz must be positive and no larger than the sweep span")]
    InvalidStep(f64),
    #[error("sweep step duration must be non-zero")]
    ZeroStepDuration,
    #[error("sweep would last {duration:?}, allowed range is [{min:?}, {max:?}]")]
    SweepDurationOutOfRange {
        duration: Duration,
        min: Duration,
        max: Duration,
    },
    #[error("sweep starts inside the FM stop band")]
    SweepInStopBand,
    #[error("an FM sweep is already active")]
    SweepAlreadyActive,
    #[error("{0} is not supported by this generator")]
    UnsupportedGrid(FrequencyGrid),
    #[error("level control mode {0:?} is not supported by this generator")]
    UnsupportedLevelControl(LevelControlMode),
}

/// Failure while talking to the device.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("generator is not connected")]
    NotConnected,
    #[error("device rejected the command: {0}")]
    Rejected(String),
    #[error("calibration unavailable: {0}")]
    CalibrationUnavailable(String),
    #[error("device did not acknowledge in time")]
    HandshakeTimeout,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl DeviceError {
    /// Failures detected before the device was involved are not broadcast.
    pub fn is_precondition(&self) -> bool {
        matches!(self, DeviceError::NotConnected)
    }
}

/// Failure to bring a device link up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectError {
    #[error("port unavailable: {0}")]
    PortUnavailable(String),
    #[error("device did not answer the handshake in time")]
    HandshakeTimeout,
    #[error("initial device setup failed: {0}")]
    Setup(#[from] DeviceError),
}

/// Any error a generator operation can return.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("generator control sequence has shut down")]
    EngineGone,
}

impl GeneratorError {
    /// Whether the error should also be broadcast as an `Event::Error`.
    pub fn is_broadcast(&self) -> bool {
        match self {
            GeneratorError::Validation(_) | GeneratorError::EngineGone => false,
            GeneratorError::Device(e) => !e.is_precondition(),
            GeneratorError::Connect(_) => true,
        }
    }
}
