use flume::Receiver;
use log::{debug, info, warn};
use rfgen_messages::{
    Command, ConnectError, DeviceError, Event, FrequencyGrid, GeneratorError, GeneratorIdentity,
    GeneratorState, Hertz, LevelControlMode, NetworkMessage, SweepMode, SweepSpec,
    ValidationError, Volts,
};
use std::time::Instant;

use crate::calibration::Calibrator;
use crate::link::{DeviceCommand, DeviceEvent, DeviceLink, PortDescriptor};
use crate::model::GeneratorModel;
use crate::notify::Notifier;
use crate::sweep::{Step, SweepEngine, SweepPlan};

/// Control state machine of one generator.
///
/// Owns the device link, the sweep engine and the observable state. Every
/// mutation goes through these methods, and state only changes after the
/// device acknowledged the corresponding command.
pub struct GeneratorCore {
    model: Box<dyn GeneratorModel>,
    link: Box<dyn DeviceLink>,
    calibrator: Box<dyn Calibrator>,
    notifier: Notifier,
    sweep: SweepEngine,
    state: GeneratorState,
    port: Option<PortDescriptor>,
}

impl GeneratorCore {
    pub fn new(
        model: Box<dyn GeneratorModel>,
        link: Box<dyn DeviceLink>,
        calibrator: Box<dyn Calibrator>,
    ) -> Self {
        let grid = model.default_grid();
        let state = GeneratorState {
            connected: false,
            powered_on: false,
            frequency: model.default_frequency(),
            amplitude: model.default_amplitude(),
            grid,
            level_mode: LevelControlMode::Amplitude,
            network_control: false,
            fm_active: false,
        };
        Self {
            model,
            link,
            calibrator,
            notifier: Notifier::new(),
            sweep: SweepEngine::new(),
            state,
            port: None,
        }
    }

    pub fn identity(&self) -> &GeneratorIdentity {
        self.model.identity()
    }

    pub fn vid(&self) -> u16 {
        self.identity().vendor_id
    }

    pub fn pid(&self) -> u16 {
        self.identity().product_id
    }

    pub fn state(&self) -> &GeneratorState {
        &self.state
    }

    /// Port of the current connection.
    pub fn port(&self) -> Option<&PortDescriptor> {
        self.port.as_ref()
    }

    pub fn sweep(&self) -> &SweepEngine {
        &self.sweep
    }

    /// Receive every event from now on, preceded by a state snapshot.
    pub fn subscribe(&mut self) -> Receiver<Event> {
        self.notifier
            .subscribe_with(Event::StateSnapshot(self.state.clone()))
    }

    /// When the next scheduled sweep tick is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sweep.next_due()
    }

    pub fn connect(&mut self, port: PortDescriptor) -> Result<(), ConnectError> {
        if self.state.connected {
            self.disconnect();
        }
        info!("Connecting to {}", port);
        self.link
            .open(&port)
            .map_err(|e| self.report(ConnectError::from(e)))?;

        let frequency = self
            .state
            .grid
            .round(self.model.default_frequency().as_f64())
            .unwrap_or_else(|| self.model.default_frequency());
        let amplitude = self.model.default_amplitude();
        if let Err(e) = self.apply(frequency, amplitude) {
            self.link.close();
            let err = match e {
                DeviceError::HandshakeTimeout => ConnectError::HandshakeTimeout,
                other => ConnectError::Setup(other),
            };
            return Err(self.report(err));
        }

        self.state.connected = true;
        self.state.powered_on = false;
        self.state.frequency = frequency;
        self.state.amplitude = amplitude;
        self.port = Some(port);
        self.notifier
            .emit(Event::Connected(self.model.identity().clone()));
        Ok(())
    }

    /// Stop any sweep, power down, close the link. Does nothing when
    /// already disconnected.
    pub fn disconnect(&mut self) {
        if !self.state.connected {
            return;
        }
        self.stop_fm();
        if self.state.powered_on {
            if let Err(e) = self.link.send(DeviceCommand::Power(false)) {
                warn!("Power-off during disconnect failed: {}", e);
            }
            self.state.powered_on = false;
            self.notifier.emit(Event::PowerChanged(false));
        }
        self.link.close();
        self.state.connected = false;
        if let Some(port) = self.port.take() {
            info!("Disconnected from {}", port);
        }
        self.notifier.emit(Event::Disconnected);
    }

    pub fn turn_on(&mut self, enable: bool) -> Result<(), DeviceError> {
        if !self.state.connected {
            return Err(DeviceError::NotConnected);
        }
        if self.state.powered_on == enable {
            return Ok(());
        }
        self.link
            .send(DeviceCommand::Power(enable))
            .map_err(|e| self.report(DeviceError::from(e)))?;
        self.state.powered_on = enable;
        self.notifier.emit(Event::PowerChanged(enable));
        Ok(())
    }

    pub fn set_frequency(&mut self, target_hz: f64) -> Result<(), GeneratorError> {
        let identity = self.model.identity();
        let out_of_range = |value: f64| ValidationError::OutOfRange {
            value,
            min: identity.lowest_frequency.as_f64(),
            max: identity.highest_frequency.as_f64(),
        };
        if !identity.contains(target_hz) {
            return Err(out_of_range(target_hz).into());
        }
        let rounded = self
            .state
            .grid
            .round(target_hz)
            .ok_or_else(|| out_of_range(target_hz))?;
        if !identity.contains(rounded.as_f64()) {
            return Err(out_of_range(rounded.as_f64()).into());
        }
        if !self.state.connected {
            return Err(DeviceError::NotConnected.into());
        }

        self.apply(rounded, self.state.amplitude)
            .map_err(|e| self.report(GeneratorError::from(e)))?;
        self.state.frequency = rounded;
        self.notifier.emit(Event::FrequencyChanged(rounded));
        Ok(())
    }

    pub fn set_amplitude(&mut self, target_v: f64) -> Result<(), GeneratorError> {
        let (min, max) = self.model.amplitude_range();
        if !(target_v >= min && target_v <= max) {
            return Err(ValidationError::OutOfRange {
                value: target_v,
                min,
                max,
            }
            .into());
        }
        if !self.state.connected {
            return Err(DeviceError::NotConnected.into());
        }

        let amplitude = Volts(target_v);
        self.apply(self.state.frequency, amplitude)
            .map_err(|e| self.report(GeneratorError::from(e)))?;
        self.state.amplitude = amplitude;
        self.notifier.emit(Event::AmplitudeChanged(amplitude));
        Ok(())
    }

    /// Switch grid step. A connected generator is re-tuned onto the new grid;
    /// the old grid is kept if that fails. A disconnected one only has its
    /// stored frequency moved onto the grid.
    pub fn set_frequency_grid(&mut self, grid: FrequencyGrid) -> Result<(), GeneratorError> {
        if !self.model.supports_grid(grid) {
            return Err(ValidationError::UnsupportedGrid(grid).into());
        }
        if self.state.grid == grid {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.state.grid, grid);
        if !grid.is_aligned(self.state.frequency) {
            if self.state.connected {
                if let Err(e) = self.set_frequency(self.state.frequency.as_f64()) {
                    self.state.grid = previous;
                    return Err(e);
                }
            } else {
                let aligned = self.offline_alignment(grid);
                self.state.frequency = aligned;
                self.notifier.emit(Event::FrequencyChanged(aligned));
            }
        }
        debug!("Frequency grid set to {}", grid);
        Ok(())
    }

    /// Nearest in-range grid point to the stored frequency, falling back to
    /// the model default when rounding leaves the device range.
    fn offline_alignment(&self, grid: FrequencyGrid) -> Hertz {
        let identity = self.model.identity();
        let in_range = |f: &Hertz| identity.contains(f.as_f64());
        grid.round(self.state.frequency.as_f64())
            .filter(in_range)
            .or_else(|| grid.round(self.model.default_frequency().as_f64()).filter(in_range))
            .unwrap_or_else(|| self.model.default_frequency())
    }

    /// Switch between amplitude and attenuation level control. A connected
    /// generator is re-programmed in the new mode.
    pub fn set_level_control_mode(&mut self, mode: LevelControlMode) -> Result<(), GeneratorError> {
        if !self.model.supports_level_control(mode) {
            return Err(ValidationError::UnsupportedLevelControl(mode).into());
        }
        if self.state.level_mode == mode {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.state.level_mode, mode);
        if self.state.connected {
            if let Err(e) = self.apply(self.state.frequency, self.state.amplitude) {
                self.state.level_mode = previous;
                return Err(self.report(GeneratorError::from(e)));
            }
        }
        Ok(())
    }

    pub fn start_fm(&mut self, spec: SweepSpec, mode: SweepMode) -> Result<(), GeneratorError> {
        self.start_fm_at(spec, mode, Instant::now())
    }

    /// Start a sweep whose first tick is due at `now`.
    pub fn start_fm_at(
        &mut self,
        spec: SweepSpec,
        mode: SweepMode,
        now: Instant,
    ) -> Result<(), GeneratorError> {
        if self.sweep.is_active() {
            return Err(ValidationError::SweepAlreadyActive.into());
        }
        let plan = SweepPlan::new(spec, mode, self.model.identity(), self.state.grid)?;
        if !self.state.connected {
            return Err(DeviceError::NotConnected.into());
        }
        let seconds = plan.total_duration().as_secs_f64();
        info!(
            "FM sweep started: {}, {} - {} Hz over {} points, {:.3} s",
            mode,
            plan.spec().start_freq,
            plan.spec().stop_freq,
            plan.points(),
            seconds
        );
        self.sweep.start(plan, now)?;
        self.state.fm_active = true;
        self.notifier.emit(Event::FmDurationChanged(seconds));
        Ok(())
    }

    /// Cancel the sweep, leaving the carrier on its last frequency.
    pub fn stop_fm(&mut self) {
        if self.sweep.stop() {
            self.state.fm_active = false;
            debug!("FM sweep stopped");
            self.notifier.emit(Event::FmStopped);
        }
    }

    /// Run a command from any origin.
    pub fn execute(&mut self, command: Command) -> Result<(), GeneratorError> {
        match command {
            Command::TurnOn(enable) => self.turn_on(enable).map_err(GeneratorError::from),
            Command::SetFrequency(hz) => self.set_frequency(hz),
            Command::SetAmplitude(v) => self.set_amplitude(v),
            Command::StartFm(spec, mode) => self.start_fm(spec, mode),
            Command::StopFm => {
                self.stop_fm();
                Ok(())
            }
        }
    }

    /// Run a command issued by the remote channel. Identical to a local call.
    pub fn on_network_command(&mut self, command: Command) -> Result<(), GeneratorError> {
        debug!("Network command: {:?}", command);
        self.execute(command)
    }

    pub fn on_network_message(&mut self, message: NetworkMessage) {
        match message {
            NetworkMessage::Command(command) => {
                if let Err(e) = self.on_network_command(command) {
                    debug!("Network command failed: {}", e);
                }
            }
            NetworkMessage::ServerConnected => self.set_network_control(true),
            NetworkMessage::ServerDisconnected => self.set_network_control(false),
        }
    }

    fn set_network_control(&mut self, attached: bool) {
        info!("Remote control {}", if attached { "attached" } else { "detached" });
        self.state.network_control = attached;
        self.notifier.emit(Event::NetworkControlChanged(attached));
    }

    pub fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Fault(msg) => {
                warn!("Device fault: {}", msg);
                self.notifier.emit(Event::Error(msg));
            }
            DeviceEvent::TransportFault(msg) => {
                warn!("Transport fault: {}", msg);
                self.notifier.emit(Event::Error(msg));
                if self.sweep.is_active() {
                    self.disconnect();
                }
            }
        }
    }

    /// Drain device events and run the sweep tick if it is due.
    pub fn poll(&mut self, now: Instant) {
        while let Some(event) = self.link.poll_event() {
            self.on_device_event(event);
        }
        if self.sweep.is_due(now) {
            self.sweep_tick(now);
        }
    }

    /// Connection watchdog: a vanished port forces a disconnect.
    pub fn check_link(&mut self) {
        if self.state.connected && !self.link.is_alive() {
            warn!("Device link lost");
            self.notifier.emit(Event::Error("connection to device lost".into()));
            self.disconnect();
        }
    }

    fn sweep_tick(&mut self, now: Instant) {
        let step = self
            .sweep
            .tick(now, self.model.identity(), self.state.grid);
        match step {
            Step::Commit(frequency) => {
                if let Err(e) = self.set_frequency(frequency.as_f64()) {
                    warn!("Sweep stopped at {}: {}", frequency, e);
                    if !e.is_broadcast() {
                        self.notifier.emit(Event::Error(e.to_string()));
                    }
                    self.stop_fm();
                    if matches!(e, GeneratorError::Device(DeviceError::Transport(_))) {
                        self.disconnect();
                    }
                }
            }
            Step::Skip => debug!("Sweep tick skipped"),
            Step::Complete => {
                self.state.fm_active = false;
                info!("FM sweep complete");
                self.notifier.emit(Event::FmStopped);
            }
        }
    }

    /// Calibrate and send a tune command.
    fn apply(&mut self, frequency: Hertz, amplitude: Volts) -> Result<(), DeviceError> {
        let calibrated = self
            .calibrator
            .correct(self.model.identity(), frequency, amplitude)
            .map_err(|e| DeviceError::CalibrationUnavailable(e.to_string()))?;
        let command = self.model.tune(frequency, calibrated, self.state.level_mode);
        debug!("Sending {:?}", command);
        self.link.send(command)?;
        Ok(())
    }

    /// Broadcast a failure that involved the device, then hand it back.
    fn report<E>(&mut self, err: E) -> E
    where
        E: Clone + Into<GeneratorError>,
    {
        let general: GeneratorError = err.clone().into();
        if general.is_broadcast() {
            warn!("{}", general);
            self.notifier.emit(Event::Error(general.to_string()));
        }
        err
    }
}

impl Drop for GeneratorCore {
    fn drop(&mut self) {
        self.disconnect();
    }
}
