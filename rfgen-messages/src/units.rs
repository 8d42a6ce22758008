/// Frequency in Hertz.
///
/// Committed generator frequencies are always whole multiples of the active
/// grid step, so an integer representation is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hertz(pub u64);

impl std::fmt::Display for Hertz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

impl Hertz {
    pub const fn khz(khz: u64) -> Self {
        Self(khz * 1_000)
    }

    pub const fn mhz(mhz: u64) -> Self {
        Self(mhz * 1_000_000)
    }

    pub const fn as_hz(self) -> u64 {
        self.0
    }

    /// Value as a request-side frequency, for comparisons against `f64`
    /// bounds and sweep arithmetic.
    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

/// Output amplitude in Volts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Volts(pub f64);

impl std::fmt::Display for Volts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} V", self.0)
    }
}

/// Attenuation level in Decibels.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Decibels(pub f32);

impl std::fmt::Display for Decibels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1} dB", self.0)
    }
}

impl Decibels {
    /// dB for a linear amplitude ratio: 20 * log10(ratio)
    pub fn from_linear(ratio: f32) -> Self {
        Self(20.0 * ratio.log10())
    }

    pub const fn as_db(self) -> f32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hertz_constructors() {
        assert_eq!(Hertz::khz(10), Hertz(10_000));
        assert_eq!(Hertz::mhz(100), Hertz(100_000_000));
        assert_eq!(Hertz::mhz(3).to_string(), "3000000 Hz");
        assert_eq!(Hertz::khz(2_500).as_f64(), 2.5e6);
        assert_eq!(Hertz::khz(7).as_hz(), 7_000);
    }

    #[test]
    fn test_display() {
        assert_eq!(Volts(0.25).to_string(), "0.250 V");
        assert_eq!(Decibels(-3.0).to_string(), "-3.0 dB");
    }

    #[test]
    fn test_decibels_from_amplitude_ratio() {
        assert!((Decibels::from_linear(10.0).as_db() - 20.0).abs() < 1e-4);
        assert!((Decibels::from_linear(0.5).as_db() + 6.0206).abs() < 1e-3);
    }
}
