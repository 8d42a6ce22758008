//! Types shared between the generator control engine and its callers.

mod command;
mod error;
mod event;
mod state;
mod sweep;
mod units;

pub use command::{Command, NetworkMessage};
pub use error::{ConnectError, DeviceError, GeneratorError, ValidationError};
pub use event::Event;
pub use state::{FrequencyGrid, GeneratorIdentity, GeneratorState, LevelControlMode};
pub use sweep::{SweepMode, SweepSpec};
pub use units::{Decibels, Hertz, Volts};
