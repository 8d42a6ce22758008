use crate::{Hertz, Volts};
use std::time::Duration;

/// Fixed description of a generator variant.
///
/// Defines every validity bound for the lifetime of a generator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorIdentity {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
    /// Lowest frequency the synthesizer can produce
    pub lowest_frequency: Hertz,
    /// Highest frequency the synthesizer can produce
    pub highest_frequency: Hertz,
    /// Shortest total FM sweep the device supports
    pub min_fm_duration: Duration,
    /// Longest total FM sweep the device supports
    pub max_fm_duration: Duration,
    /// Start of the band a sweep must never enter. Set above
    /// `highest_frequency` when the device has no such band.
    pub fm_stop_band: Hertz,
}

impl GeneratorIdentity {
    /// Whether `hz` lies within `[lowest_frequency, highest_frequency]`.
    pub fn contains(&self, hz: f64) -> bool {
        hz >= self.lowest_frequency.as_f64() && hz <= self.highest_frequency.as_f64()
    }

    pub fn has_stop_band(&self) -> bool {
        self.fm_stop_band <= self.highest_frequency
    }

    /// Whether a sweep is forbidden from commanding `frequency`.
    pub fn in_stop_band(&self, frequency: Hertz) -> bool {
        self.has_stop_band() && frequency >= self.fm_stop_band
    }
}

/// Frequency grid step of the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrequencyGrid {
    /// 1 kHz
    #[default]
    Grid1,
    /// 2 kHz
    Grid2,
    /// 5 kHz
    Grid5,
    /// 10 kHz
    Grid10,
}

impl FrequencyGrid {
    pub const ALL: [FrequencyGrid; 4] = [Self::Grid1, Self::Grid2, Self::Grid5, Self::Grid10];

    pub const fn step(self) -> Hertz {
        match self {
            Self::Grid1 => Hertz::khz(1),
            Self::Grid2 => Hertz::khz(2),
            Self::Grid5 => Hertz::khz(5),
            Self::Grid10 => Hertz::khz(10),
        }
    }

    /// Round a requested frequency to the nearest grid multiple, halves up.
    ///
    /// Returns `None` for values that cannot name a frequency (NaN, infinite,
    /// negative or beyond `u64` Hz).
    pub fn round(self, hz: f64) -> Option<Hertz> {
        if !hz.is_finite() || hz < 0.0 {
            return None;
        }
        let step = self.step().as_hz();
        let steps = (hz / step as f64 + 0.5).floor();
        if steps >= u64::MAX as f64 {
            return None;
        }
        (steps as u64).checked_mul(step).map(Hertz)
    }

    pub fn is_aligned(self, frequency: Hertz) -> bool {
        frequency.as_hz() % self.step().as_hz() == 0
    }
}

impl std::fmt::Display for FrequencyGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} kHz grid", self.step().as_hz() / 1_000)
    }
}

/// How the output level of the generator is commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LevelControlMode {
    /// Output level set as an amplitude in volts
    #[default]
    Amplitude,
    /// Output level set as attenuation below the full-scale output
    Attenuation,
}

/// Current state of a generator instance.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorState {
    pub connected: bool,
    pub powered_on: bool,
    /// Last acknowledged carrier frequency
    pub frequency: Hertz,
    /// Last acknowledged output amplitude (before calibration)
    pub amplitude: Volts,
    pub grid: FrequencyGrid,
    pub level_mode: LevelControlMode,
    /// A remote command channel currently has a client attached
    pub network_control: bool,
    /// An FM sweep is running
    pub fm_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(stop_band: Hertz) -> GeneratorIdentity {
        GeneratorIdentity {
            vendor_id: 0x0483,
            product_id: 0x5740,
            lowest_frequency: Hertz::mhz(1),
            highest_frequency: Hertz::mhz(200),
            min_fm_duration: Duration::from_millis(1),
            max_fm_duration: Duration::from_secs(10),
            fm_stop_band: stop_band,
        }
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(FrequencyGrid::Grid10.round(100_025_000.0), Some(Hertz(100_030_000)));
        assert_eq!(FrequencyGrid::Grid10.round(100_024_999.0), Some(Hertz(100_020_000)));
        assert_eq!(FrequencyGrid::Grid1.round(1_500.0), Some(Hertz(2_000)));
        assert_eq!(FrequencyGrid::Grid2.round(2_999.0), Some(Hertz(2_000)));
        assert_eq!(FrequencyGrid::Grid5.round(7_500.0), Some(Hertz(10_000)));
    }

    #[test]
    fn test_round_rejects_unrepresentable() {
        assert_eq!(FrequencyGrid::Grid1.round(f64::NAN), None);
        assert_eq!(FrequencyGrid::Grid1.round(f64::INFINITY), None);
        assert_eq!(FrequencyGrid::Grid1.round(-1.0), None);
        assert_eq!(FrequencyGrid::Grid10.round(1.0e20), None);
        assert_eq!(FrequencyGrid::Grid1.round(f64::MAX), None);
    }

    #[test]
    fn test_rounded_values_are_aligned() {
        for grid in FrequencyGrid::ALL {
            for hz in [0.0, 999.0, 12_345.6, 99_999_999.5, 150_000_001.0] {
                let rounded = grid.round(hz).unwrap();
                assert!(grid.is_aligned(rounded), "{} not aligned to {}", rounded, grid);
            }
        }
    }

    #[test]
    fn test_stop_band() {
        let banded = identity(Hertz::mhz(150));
        assert!(banded.has_stop_band());
        assert!(banded.in_stop_band(Hertz::mhz(150)));
        assert!(!banded.in_stop_band(Hertz(149_999_000)));

        let open = identity(Hertz::mhz(201));
        assert!(!open.has_stop_band());
        assert!(!open.in_stop_band(Hertz::mhz(200)));
    }
}
