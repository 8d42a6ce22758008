use flume::{Receiver, Sender};
use rfgen_messages::{
    Command, ConnectError, Event, FrequencyGrid, GeneratorError, GeneratorState,
    LevelControlMode, NetworkMessage, SweepMode, SweepSpec,
};

use crate::link::PortDescriptor;

type Reply<T> = Sender<T>;

/// Requests serialized onto a generator's control sequence.
#[derive(Debug)]
pub enum Request {
    Connect(PortDescriptor, Reply<Result<(), ConnectError>>),
    Disconnect(Reply<()>),
    Command(Command, Reply<Result<(), GeneratorError>>),
    SetFrequencyGrid(FrequencyGrid, Reply<Result<(), GeneratorError>>),
    SetLevelControlMode(LevelControlMode, Reply<Result<(), GeneratorError>>),
    /// Traffic from the remote command channel; results are only visible
    /// through notifications.
    Network(NetworkMessage),
    Subscribe(Reply<Receiver<Event>>),
    Snapshot(Reply<GeneratorState>),
    /// Disconnect and end the control sequence.
    Stop,
}

/// Local, blocking access to a generator running on an engine thread.
///
/// Every call waits for the control sequence to process it and returns the
/// outcome synchronously.
#[derive(Debug, Clone)]
pub struct GeneratorHandle {
    tx: Sender<Request>,
}

impl GeneratorHandle {
    pub fn new(tx: Sender<Request>) -> Self {
        Self { tx }
    }

    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, GeneratorError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        self.tx
            .send(make(reply_tx))
            .map_err(|_| GeneratorError::EngineGone)?;
        reply_rx.recv().map_err(|_| GeneratorError::EngineGone)
    }

    pub fn connect(&self, port: PortDescriptor) -> Result<(), GeneratorError> {
        self.call(|reply| Request::Connect(port, reply))?
            .map_err(GeneratorError::from)
    }

    pub fn disconnect(&self) -> Result<(), GeneratorError> {
        self.call(Request::Disconnect)
    }

    pub fn execute(&self, command: Command) -> Result<(), GeneratorError> {
        self.call(|reply| Request::Command(command, reply))?
    }

    pub fn turn_on(&self, enable: bool) -> Result<(), GeneratorError> {
        self.execute(Command::TurnOn(enable))
    }

    pub fn set_frequency(&self, hz: f64) -> Result<(), GeneratorError> {
        self.execute(Command::SetFrequency(hz))
    }

    pub fn set_amplitude(&self, volts: f64) -> Result<(), GeneratorError> {
        self.execute(Command::SetAmplitude(volts))
    }

    pub fn start_fm(&self, spec: SweepSpec, mode: SweepMode) -> Result<(), GeneratorError> {
        self.execute(Command::StartFm(spec, mode))
    }

    pub fn stop_fm(&self) -> Result<(), GeneratorError> {
        self.execute(Command::StopFm)
    }

    pub fn set_frequency_grid(&self, grid: FrequencyGrid) -> Result<(), GeneratorError> {
        self.call(|reply| Request::SetFrequencyGrid(grid, reply))?
    }

    pub fn set_level_control_mode(&self, mode: LevelControlMode) -> Result<(), GeneratorError> {
        self.call(|reply| Request::SetLevelControlMode(mode, reply))?
    }

    /// Subscribe to notifications. The first event is a state snapshot.
    pub fn subscribe(&self) -> Result<Receiver<Event>, GeneratorError> {
        self.call(Request::Subscribe)
    }

    pub fn snapshot(&self) -> Result<GeneratorState, GeneratorError> {
        self.call(Request::Snapshot)
    }

    /// Ask the engine to disconnect and exit. Does not wait.
    pub fn stop(&self) {
        let _ = self.tx.send(Request::Stop);
    }

    /// Entry point for a remote command server attached to this generator.
    pub fn command_channel(&self) -> CommandChannel {
        CommandChannel {
            tx: self.tx.clone(),
        }
    }
}

/// Feeds remote traffic into a generator's control sequence.
///
/// The wire protocol lives in the server that owns this value; it only has
/// to translate what it receives into [`NetworkMessage`]s.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    tx: Sender<Request>,
}

impl CommandChannel {
    pub fn deliver(&self, message: NetworkMessage) -> Result<(), GeneratorError> {
        self.tx
            .send(Request::Network(message))
            .map_err(|_| GeneratorError::EngineGone)
    }

    pub fn command(&self, command: Command) -> Result<(), GeneratorError> {
        self.deliver(NetworkMessage::Command(command))
    }

    pub fn server_connected(&self) -> Result<(), GeneratorError> {
        self.deliver(NetworkMessage::ServerConnected)
    }

    pub fn server_disconnected(&self) -> Result<(), GeneratorError> {
        self.deliver(NetworkMessage::ServerDisconnected)
    }
}
