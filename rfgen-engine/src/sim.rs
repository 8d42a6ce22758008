use flume::{Receiver, Sender};
use log::debug;
use rfgen_messages::Hertz;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::link::{Ack, DeviceCommand, DeviceEvent, DeviceLink, LinkError, PortDescriptor};

#[derive(Debug)]
struct SimState {
    available: bool,
    handshake_timeout: bool,
    alive: bool,
    open: bool,
    pending_failures: VecDeque<LinkError>,
    sent: Vec<DeviceCommand>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory generator standing in for real hardware.
///
/// Acknowledges every command unless a failure has been queued through the
/// paired [`SimulatedDevice`].
#[derive(Debug)]
pub struct SimulatedLink {
    state: Arc<Mutex<SimState>>,
    events: Receiver<DeviceEvent>,
}

/// Control side of a [`SimulatedLink`], used to script faults and inspect
/// the traffic the generator produced.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
    events: Sender<DeviceEvent>,
}

impl SimulatedLink {
    /// Create a link and its controlling device handle.
    pub fn new() -> (Self, SimulatedDevice) {
        let state = Arc::new(Mutex::new(SimState {
            available: true,
            handshake_timeout: false,
            alive: true,
            open: false,
            pending_failures: VecDeque::new(),
            sent: Vec::new(),
        }));
        let (event_tx, event_rx) = flume::unbounded();
        (
            Self {
                state: state.clone(),
                events: event_rx,
            },
            SimulatedDevice {
                state,
                events: event_tx,
            },
        )
    }
}

impl DeviceLink for SimulatedLink {
    fn open(&mut self, port: &PortDescriptor) -> Result<(), LinkError> {
        let mut state = lock(&self.state);
        if !state.available {
            return Err(LinkError::Unavailable(port.name.clone()));
        }
        if state.handshake_timeout {
            return Err(LinkError::Timeout);
        }
        debug!("Simulated device opened on {}", port);
        state.open = true;
        state.alive = true;
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.state).open = false;
    }

    fn send(&mut self, command: DeviceCommand) -> Result<Ack, LinkError> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(LinkError::Transport("port is closed".into()));
        }
        if let Some(err) = state.pending_failures.pop_front() {
            return Err(err);
        }
        state.sent.push(command);
        Ok(Ack)
    }

    fn poll_event(&mut self) -> Option<DeviceEvent> {
        self.events.try_recv().ok()
    }

    fn is_alive(&mut self) -> bool {
        lock(&self.state).alive
    }
}

impl SimulatedDevice {
    /// Make the port appear present or absent for the next `open`.
    pub fn set_available(&self, available: bool) {
        lock(&self.state).available = available;
    }

    /// Make the next `open` time out during the handshake.
    pub fn set_handshake_timeout(&self, timeout: bool) {
        lock(&self.state).handshake_timeout = timeout;
    }

    /// Fail the next `send` with `err` instead of acknowledging it.
    pub fn fail_next(&self, err: LinkError) {
        lock(&self.state).pending_failures.push_back(err);
    }

    /// Report an unsolicited event to the generator.
    pub fn inject_event(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }

    /// Simulate the cable being pulled.
    pub fn unplug(&self) {
        lock(&self.state).alive = false;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Every acknowledged command, oldest first.
    pub fn sent(&self) -> Vec<DeviceCommand> {
        lock(&self.state).sent.clone()
    }

    /// Frequencies of the acknowledged `Tune` commands, oldest first.
    pub fn tuned_frequencies(&self) -> Vec<Hertz> {
        lock(&self.state)
            .sent
            .iter()
            .filter_map(|cmd| match cmd {
                DeviceCommand::Tune { frequency, .. } => Some(*frequency),
                DeviceCommand::Power(_) => None,
            })
            .collect()
    }

    pub fn clear_sent(&self) {
        lock(&self.state).sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Level;
    use rfgen_messages::Volts;

    fn port() -> PortDescriptor {
        PortDescriptor::new("sim0", 0x0483, 0x5740)
    }

    #[test]
    fn test_send_requires_open_port() {
        let (mut link, _device) = SimulatedLink::new();
        assert!(matches!(
            link.send(DeviceCommand::Power(true)),
            Err(LinkError::Transport(_))
        ));
    }

    #[test]
    fn test_records_acknowledged_commands() {
        let (mut link, device) = SimulatedLink::new();
        link.open(&port()).unwrap();

        link.send(DeviceCommand::Power(true)).unwrap();
        link.send(DeviceCommand::Tune {
            frequency: Hertz::mhz(10),
            level: Level::Amplitude(Volts(0.5)),
        })
        .unwrap();

        assert_eq!(device.sent().len(), 2);
        assert_eq!(device.tuned_frequencies(), vec![Hertz::mhz(10)]);
    }

    #[test]
    fn test_queued_failures_are_consumed_in_order() {
        let (mut link, device) = SimulatedLink::new();
        link.open(&port()).unwrap();
        device.fail_next(LinkError::Timeout);
        device.fail_next(LinkError::Rejected("busy".into()));

        assert_eq!(link.send(DeviceCommand::Power(true)), Err(LinkError::Timeout));
        assert_eq!(
            link.send(DeviceCommand::Power(true)),
            Err(LinkError::Rejected("busy".into()))
        );
        assert_eq!(link.send(DeviceCommand::Power(true)), Ok(Ack));
        assert_eq!(device.sent(), vec![DeviceCommand::Power(true)]);
    }

    #[test]
    fn test_open_failures() {
        let (mut link, device) = SimulatedLink::new();
        device.set_available(false);
        assert_eq!(link.open(&port()), Err(LinkError::Unavailable("sim0".into())));

        device.set_available(true);
        device.set_handshake_timeout(true);
        assert_eq!(link.open(&port()), Err(LinkError::Timeout));
        assert!(!device.is_open());
    }

    #[test]
    fn test_events_and_liveness() {
        let (mut link, device) = SimulatedLink::new();
        link.open(&port()).unwrap();
        assert!(link.poll_event().is_none());

        device.inject_event(DeviceEvent::Fault("overheat".into()));
        assert_eq!(link.poll_event(), Some(DeviceEvent::Fault("overheat".into())));

        assert!(link.is_alive());
        device.unplug();
        assert!(!link.is_alive());
    }
}
