use crate::{SweepMode, SweepSpec};

/// Commands understood by a generator, whoever issues them.
///
/// Local callers and the remote command channel share this vocabulary and
/// go through the same validation path.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Switch the RF output on or off.
    TurnOn(bool),
    /// Set the carrier frequency in Hz.
    SetFrequency(f64),
    /// Set the output amplitude in volts.
    SetAmplitude(f64),
    /// Start an FM sweep.
    StartFm(SweepSpec, SweepMode),
    /// Stop the active FM sweep, if any.
    StopFm,
}

/// Traffic delivered by the remote command channel.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkMessage {
    /// A remote client issued a command.
    Command(Command),
    /// A remote client attached to the channel.
    ServerConnected,
    /// The remote client went away.
    ServerDisconnected,
}
