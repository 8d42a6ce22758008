use rfgen_messages::{ConnectError, Decibels, DeviceError, Hertz, Volts};
use thiserror::Error;

/// Identifies the physical port a generator is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    /// OS-level port name, e.g. `/dev/ttyACM0`
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name: name.into(),
            vendor_id,
            product_id,
        }
    }
}

impl std::fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x})",
            self.name, self.vendor_id, self.product_id
        )
    }
}

/// Output level as encoded for the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level {
    Amplitude(Volts),
    Attenuation(Decibels),
}

/// Commands written to the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    Power(bool),
    /// Program carrier frequency and calibrated output level together.
    Tune { frequency: Hertz, level: Level },
}

/// Positive acknowledgement of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// Unsolicited notifications from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Recoverable fault condition reported by the hardware.
    Fault(String),
    /// The transport underneath the link failed and will not recover.
    TransportFault(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("port unavailable: {0}")]
    Unavailable(String),
    #[error("timed out waiting for acknowledgement")]
    Timeout,
    #[error("device rejected command: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<LinkError> for DeviceError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Timeout => DeviceError::HandshakeTimeout,
            LinkError::Rejected(msg) => DeviceError::Rejected(msg),
            LinkError::Unavailable(msg) | LinkError::Transport(msg) => DeviceError::Transport(msg),
        }
    }
}

impl From<LinkError> for ConnectError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Unavailable(msg) => ConnectError::PortUnavailable(msg),
            LinkError::Timeout => ConnectError::HandshakeTimeout,
            other => ConnectError::Setup(other.into()),
        }
    }
}

/// Abstraction over the physical connection to a generator.
///
/// Implementations own framing and enumeration details. `send` blocks for at
/// most the implementation's acknowledgement timeout.
pub trait DeviceLink: Send {
    /// Open the port and perform the device handshake.
    fn open(&mut self, port: &PortDescriptor) -> Result<(), LinkError>;

    /// Close the port. Closing a closed link does nothing.
    fn close(&mut self);

    /// Write a command and wait for its acknowledgement.
    fn send(&mut self, command: DeviceCommand) -> Result<Ack, LinkError>;

    /// Next unsolicited device event, if one is pending.
    fn poll_event(&mut self) -> Option<DeviceEvent>;

    /// Whether the underlying port is still present.
    fn is_alive(&mut self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_maps_to_device_error() {
        assert_eq!(DeviceError::from(LinkError::Timeout), DeviceError::HandshakeTimeout);
        assert_eq!(
            DeviceError::from(LinkError::Rejected("bad level".into())),
            DeviceError::Rejected("bad level".into())
        );
        assert_eq!(
            DeviceError::from(LinkError::Transport("unplugged".into())),
            DeviceError::Transport("unplugged".into())
        );
    }

    #[test]
    fn test_link_error_maps_to_connect_error() {
        assert_eq!(
            ConnectError::from(LinkError::Unavailable("busy".into())),
            ConnectError::PortUnavailable("busy".into())
        );
        assert_eq!(ConnectError::from(LinkError::Timeout), ConnectError::HandshakeTimeout);
    }

    #[test]
    fn test_port_descriptor_display() {
        let port = PortDescriptor::new("/dev/ttyACM0", 0x0483, 0x5740);
        assert_eq!(port.to_string(), "/dev/ttyACM0 (0483:5740)");
    }
}
