//! Control engine for USB RF signal generators.
//!
//! A [`GeneratorCore`] holds the state machine of one generator. The
//! [`Engine`] runs it on a dedicated thread, serializing local requests,
//! remote commands, sweep ticks and the connection watchdog onto a single
//! control sequence.

mod calibration;
mod generator;
mod handle;
mod link;
mod manager;
mod model;
mod notify;
mod sim;
mod sweep;

pub use calibration::{CalibrationError, Calibrator, TableCalibrator, Uncalibrated};
pub use generator::GeneratorCore;
pub use handle::{CommandChannel, GeneratorHandle, Request};
pub use link::{Ack, DeviceCommand, DeviceEvent, DeviceLink, Level, LinkError, PortDescriptor};
pub use manager::{GeneratorId, GeneratorManager};
pub use model::{GeneratorModel, ModelProfile};
pub use notify::Notifier;
pub use sim::{SimulatedDevice, SimulatedLink};
pub use sweep::{Step, SweepEngine, SweepPlan, SweepRuntime, SweepState};

use anyhow::{Context, Result};
use flume::{Receiver, RecvTimeoutError};
use log::{debug, info};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Timing of the control sequence.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest wait for a request when nothing is scheduled
    pub idle_poll: Duration,
    /// How often a connected device link is checked for presence
    pub watchdog_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_millis(100),
            watchdog_interval: Duration::from_secs(1),
        }
    }
}

/// Runs one generator's control sequence.
/// Owns the core and processes requests from handles and the command channel.
pub struct Engine {
    core: GeneratorCore,
    cmd_rx: Receiver<Request>,
    config: EngineConfig,
    should_exit: bool,
}

impl Engine {
    /// Create a new Engine instance.
    pub fn new(core: GeneratorCore, cmd_rx: Receiver<Request>, config: EngineConfig) -> Self {
        debug!("Constructing a new engine");
        Self {
            core,
            cmd_rx,
            config,
            should_exit: false,
        }
    }

    /// Start the engine on its own thread and return a handle to it.
    pub fn spawn(
        core: GeneratorCore,
        config: EngineConfig,
        name: &str,
    ) -> Result<(GeneratorHandle, JoinHandle<()>)> {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let engine = Engine::new(core, cmd_rx, config);
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || engine.run())
            .with_context(|| format!("failed to spawn engine thread {}", name))?;
        Ok((GeneratorHandle::new(cmd_tx), join))
    }

    /// Run the engine (blocking) until a `Stop` request arrives or every
    /// sender is gone.
    pub fn run(mut self) {
        info!(
            "Engine started for {:04x}:{:04x}",
            self.core.vid(),
            self.core.pid()
        );
        let mut next_watchdog = Instant::now() + self.config.watchdog_interval;

        while !self.should_exit {
            let mut wake = Instant::now() + self.config.idle_poll;
            if let Some(due) = self.core.next_deadline() {
                wake = wake.min(due);
            }
            if self.core.state().connected {
                wake = wake.min(next_watchdog);
            }

            let msg = self.cmd_rx.recv_deadline(wake);
            match msg {
                Ok(Request::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    self.should_exit = true;
                }
                Ok(request) => self.handle(request),
                Err(RecvTimeoutError::Timeout) => {}
            }

            let now = Instant::now();
            self.core.poll(now);
            if now >= next_watchdog {
                self.core.check_link();
                next_watchdog = now + self.config.watchdog_interval;
            }
        }

        self.core.disconnect();
        info!("Engine stopped");
    }

    fn handle(&mut self, request: Request) {
        debug!("Engine received request: {:?}", request);
        // A caller that gave up waiting is not an error for the engine.
        match request {
            Request::Connect(port, reply) => {
                let _ = reply.send(self.core.connect(port));
            }
            Request::Disconnect(reply) => {
                self.core.disconnect();
                let _ = reply.send(());
            }
            Request::Command(command, reply) => {
                let _ = reply.send(self.core.execute(command));
            }
            Request::SetFrequencyGrid(grid, reply) => {
                let _ = reply.send(self.core.set_frequency_grid(grid));
            }
            Request::SetLevelControlMode(mode, reply) => {
                let _ = reply.send(self.core.set_level_control_mode(mode));
            }
            Request::Network(message) => self.core.on_network_message(message),
            Request::Subscribe(reply) => {
                let _ = reply.send(self.core.subscribe());
            }
            Request::Snapshot(reply) => {
                let _ = reply.send(self.core.state().clone());
            }
            Request::Stop => self.should_exit = true,
        }
    }
}
