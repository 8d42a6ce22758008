use rfgen_messages::{GeneratorIdentity, Hertz, Volts};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("no calibration table for device {vendor_id:04x}:{product_id:04x}")]
    UnknownDevice { vendor_id: u16, product_id: u16 },
    #[error("no calibration entry covering {0}")]
    MissingEntry(Hertz),
}

/// Maps a requested output amplitude to the value the hardware must be
/// programmed with so the delivered amplitude matches the request.
///
/// Implementations are pure: the same inputs always give the same output.
pub trait Calibrator: Send {
    fn correct(
        &self,
        identity: &GeneratorIdentity,
        frequency: Hertz,
        amplitude: Volts,
    ) -> Result<Volts, CalibrationError>;
}

/// Passes amplitudes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncalibrated;

impl Calibrator for Uncalibrated {
    fn correct(
        &self,
        _identity: &GeneratorIdentity,
        _frequency: Hertz,
        amplitude: Volts,
    ) -> Result<Volts, CalibrationError> {
        Ok(amplitude)
    }
}

/// Gain correction table for one device model.
///
/// Each point holds the factor the requested amplitude is multiplied by at
/// that frequency; factors between points are interpolated linearly.
/// Frequencies outside the table have no entry.
#[derive(Debug, Clone)]
pub struct TableCalibrator {
    vendor_id: u16,
    product_id: u16,
    points: Vec<(Hertz, f64)>,
}

impl TableCalibrator {
    pub fn new(vendor_id: u16, product_id: u16, mut points: Vec<(Hertz, f64)>) -> Self {
        points.sort_by_key(|(f, _)| *f);
        points.dedup_by_key(|(f, _)| *f);
        Self {
            vendor_id,
            product_id,
            points,
        }
    }

    fn gain_at(&self, frequency: Hertz) -> Option<f64> {
        let idx = self.points.partition_point(|(f, _)| *f < frequency);
        let (hi_f, hi_g) = *self.points.get(idx)?;
        if hi_f == frequency {
            return Some(hi_g);
        }
        let (lo_f, lo_g) = *self.points.get(idx.checked_sub(1)?)?;
        let t = (frequency.as_f64() - lo_f.as_f64()) / (hi_f.as_f64() - lo_f.as_f64());
        Some(lo_g + t * (hi_g - lo_g))
    }
}

impl Calibrator for TableCalibrator {
    fn correct(
        &self,
        identity: &GeneratorIdentity,
        frequency: Hertz,
        amplitude: Volts,
    ) -> Result<Volts, CalibrationError> {
        if identity.vendor_id != self.vendor_id || identity.product_id != self.product_id {
            return Err(CalibrationError::UnknownDevice {
                vendor_id: identity.vendor_id,
                product_id: identity.product_id,
            });
        }
        let gain = self
            .gain_at(frequency)
            .ok_or(CalibrationError::MissingEntry(frequency))?;
        Ok(Volts(amplitude.0 * gain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn identity() -> GeneratorIdentity {
        GeneratorIdentity {
            vendor_id: 0x0483,
            product_id: 0x5740,
            lowest_frequency: Hertz::mhz(1),
            highest_frequency: Hertz::mhz(100),
            min_fm_duration: Duration::from_millis(1),
            max_fm_duration: Duration::from_secs(1),
            fm_stop_band: Hertz::mhz(101),
        }
    }

    fn table() -> TableCalibrator {
        TableCalibrator::new(
            0x0483,
            0x5740,
            vec![(Hertz::mhz(50), 1.5), (Hertz::mhz(1), 1.0), (Hertz::mhz(100), 2.0)],
        )
    }

    #[test]
    fn test_exact_points() {
        let cal = table();
        assert_eq!(cal.correct(&identity(), Hertz::mhz(1), Volts(1.0)), Ok(Volts(1.0)));
        assert_eq!(cal.correct(&identity(), Hertz::mhz(100), Volts(0.5)), Ok(Volts(1.0)));
    }

    #[test]
    fn test_interpolates_between_points() {
        let cal = table();
        let corrected = cal
            .correct(&identity(), Hertz::mhz(75), Volts(1.0))
            .unwrap();
        assert!((corrected.0 - 1.75).abs() < 1e-12);
    }

    #[test]
    fn test_outside_table_has_no_entry() {
        let cal = TableCalibrator::new(
            0x0483,
            0x5740,
            vec![(Hertz::mhz(10), 1.0), (Hertz::mhz(20), 1.0)],
        );
        assert_eq!(
            cal.correct(&identity(), Hertz::mhz(5), Volts(1.0)),
            Err(CalibrationError::MissingEntry(Hertz::mhz(5)))
        );
        assert_eq!(
            cal.correct(&identity(), Hertz::mhz(25), Volts(1.0)),
            Err(CalibrationError::MissingEntry(Hertz::mhz(25)))
        );
    }

    #[test]
    fn test_rejects_other_devices() {
        let cal = TableCalibrator::new(0x1234, 0x0001, vec![(Hertz::mhz(1), 1.0)]);
        assert!(matches!(
            cal.correct(&identity(), Hertz::mhz(1), Volts(1.0)),
            Err(CalibrationError::UnknownDevice { .. })
        ));
    }

    #[test]
    fn test_uncalibrated_is_identity() {
        assert_eq!(
            Uncalibrated.correct(&identity(), Hertz::mhz(3), Volts(0.25)),
            Ok(Volts(0.25))
        );
    }
}
