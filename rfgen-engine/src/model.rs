use rfgen_messages::{
    Decibels, FrequencyGrid, GeneratorIdentity, Hertz, LevelControlMode, Volts,
};
use std::time::Duration;

use crate::link::{DeviceCommand, Level};

/// Capabilities of one generator variant.
///
/// `GeneratorCore` only talks to hardware specifics through this trait.
pub trait GeneratorModel: Send {
    fn identity(&self) -> &GeneratorIdentity;

    /// Frequency the device comes up with after a handshake.
    fn default_frequency(&self) -> Hertz;

    /// Amplitude the device comes up with after a handshake.
    fn default_amplitude(&self) -> Volts;

    /// Inclusive amplitude bounds in volts.
    fn amplitude_range(&self) -> (f64, f64);

    fn default_grid(&self) -> FrequencyGrid;

    fn supports_grid(&self, grid: FrequencyGrid) -> bool;

    fn supports_level_control(&self, mode: LevelControlMode) -> bool;

    /// Encode a calibrated amplitude for the given level control mode.
    fn encode_level(&self, calibrated: Volts, mode: LevelControlMode) -> Level;

    /// Command programming `frequency` with an already calibrated amplitude.
    fn tune(&self, frequency: Hertz, calibrated: Volts, mode: LevelControlMode) -> DeviceCommand {
        DeviceCommand::Tune {
            frequency,
            level: self.encode_level(calibrated, mode),
        }
    }
}

/// Data-driven description of a generator variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProfile {
    pub name: String,
    pub identity: GeneratorIdentity,
    pub default_frequency: Hertz,
    pub default_amplitude: Volts,
    pub min_amplitude: Volts,
    /// Full-scale output; attenuation is measured from here
    pub max_amplitude: Volts,
    pub grids: Vec<FrequencyGrid>,
    pub level_modes: Vec<LevelControlMode>,
}

impl ModelProfile {
    /// 100 kHz - 60 MHz generator without a stop band, amplitude control only.
    pub fn rfg60() -> Self {
        Self {
            name: "RFG-60".to_string(),
            identity: GeneratorIdentity {
                vendor_id: 0x0483,
                product_id: 0x5740,
                lowest_frequency: Hertz::khz(100),
                highest_frequency: Hertz::mhz(60),
                min_fm_duration: Duration::from_millis(10),
                max_fm_duration: Duration::from_secs(60),
                fm_stop_band: Hertz::mhz(61),
            },
            default_frequency: Hertz::mhz(10),
            default_amplitude: Volts(0.1),
            min_amplitude: Volts(0.001),
            max_amplitude: Volts(1.0),
            grids: FrequencyGrid::ALL.to_vec(),
            level_modes: vec![LevelControlMode::Amplitude],
        }
    }

    /// 25 MHz - 400 MHz generator whose synthesizer switches bands at
    /// 200 MHz, with amplitude and attenuation control.
    pub fn rfg400() -> Self {
        Self {
            name: "RFG-400".to_string(),
            identity: GeneratorIdentity {
                vendor_id: 0x0483,
                product_id: 0x5741,
                lowest_frequency: Hertz::mhz(25),
                highest_frequency: Hertz::mhz(400),
                min_fm_duration: Duration::from_millis(20),
                max_fm_duration: Duration::from_secs(120),
                fm_stop_band: Hertz::mhz(200),
            },
            default_frequency: Hertz::mhz(100),
            default_amplitude: Volts(0.05),
            min_amplitude: Volts(0.0005),
            max_amplitude: Volts(0.5),
            grids: vec![FrequencyGrid::Grid5, FrequencyGrid::Grid10],
            level_modes: vec![LevelControlMode::Amplitude, LevelControlMode::Attenuation],
        }
    }

    /// Every profile this crate knows about.
    pub fn known() -> Vec<ModelProfile> {
        vec![Self::rfg60(), Self::rfg400()]
    }

    /// Profile matching a USB vendor/product id pair.
    pub fn lookup(vendor_id: u16, product_id: u16) -> Option<ModelProfile> {
        Self::known().into_iter().find(|p| {
            p.identity.vendor_id == vendor_id && p.identity.product_id == product_id
        })
    }

    /// Case-insensitive lookup by model name.
    pub fn by_name(name: &str) -> Option<ModelProfile> {
        Self::known()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

impl GeneratorModel for ModelProfile {
    fn identity(&self) -> &GeneratorIdentity {
        &self.identity
    }

    fn default_frequency(&self) -> Hertz {
        self.default_frequency
    }

    fn default_amplitude(&self) -> Volts {
        self.default_amplitude
    }

    fn amplitude_range(&self) -> (f64, f64) {
        (self.min_amplitude.0, self.max_amplitude.0)
    }

    fn default_grid(&self) -> FrequencyGrid {
        self.grids.first().copied().unwrap_or_default()
    }

    fn supports_grid(&self, grid: FrequencyGrid) -> bool {
        self.grids.contains(&grid)
    }

    fn supports_level_control(&self, mode: LevelControlMode) -> bool {
        self.level_modes.contains(&mode)
    }

    fn encode_level(&self, calibrated: Volts, mode: LevelControlMode) -> Level {
        match mode {
            LevelControlMode::Amplitude => Level::Amplitude(calibrated),
            LevelControlMode::Attenuation => {
                let ratio = self.max_amplitude.0 / calibrated.0.max(f64::MIN_POSITIVE);
                Level::Attenuation(Decibels::from_linear(ratio as f32))
            }
        }
    }
}
