use crate::{GeneratorIdentity, GeneratorState, Hertz, Volts};

/// Notifications broadcast by a generator to every subscriber.
///
/// Subscribers see state-change events in the order the changes were
/// committed.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Full state, sent first to every new subscriber.
    StateSnapshot(GeneratorState),
    /// The device link was opened and the handshake succeeded.
    Connected(GeneratorIdentity),
    /// The device link was closed.
    Disconnected,
    /// A device-side failure or fault report.
    Error(String),
    FrequencyChanged(Hertz),
    AmplitudeChanged(Volts),
    PowerChanged(bool),
    /// A remote client attached (`true`) or detached (`false`).
    NetworkControlChanged(bool),
    /// Total duration in seconds of the sweep that just started.
    FmDurationChanged(f64),
    /// The active sweep ended.
    FmStopped,
}
