use std::time::Duration;

/// Parameters of a frequency-modulated sweep. Frequencies are in Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSpec {
    pub start_freq: f64,
    pub stop_freq: f64,
    pub step_freq: f64,
    /// Dwell time on each step; also the tick period
    pub step_duration: Duration,
    /// `None` runs a single pass. `Some` keeps restarting the pass until the
    /// given amount of schedule time has been used.
    pub budget: Option<Duration>,
}

impl SweepSpec {
    /// A single-pass sweep.
    pub fn new(start_freq: f64, stop_freq: f64, step_freq: f64, step_duration: Duration) -> Self {
        Self {
            start_freq,
            stop_freq,
            step_freq,
            step_duration,
            budget: None,
        }
    }

    /// Keep sweeping for `budget` instead of stopping after one pass.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Time needed to walk from start to stop: `(stop - start) / step` steps
    /// of `step_duration` each.
    pub fn total_duration(&self) -> Duration {
        let steps = (self.stop_freq - self.start_freq) / self.step_freq;
        if !steps.is_finite() || steps <= 0.0 {
            return Duration::ZERO;
        }
        let whole = steps.round();
        if (steps - whole).abs() < 1e-9 && whole <= u32::MAX as f64 {
            return self.step_duration * whole as u32;
        }
        self.step_duration.mul_f64(steps)
    }
}

/// Step selection policy of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    /// Lowest to highest frequency
    #[default]
    UpChirp,
    /// Highest to lowest frequency
    DownChirp,
    /// Pseudo-random hopping, reproducible from the seed
    Fhss { seed: u64 },
}

impl std::fmt::Display for SweepMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpChirp => write!(f, "up-chirp"),
            Self::DownChirp => write!(f, "down-chirp"),
            Self::Fhss { seed } => write!(f, "fhss(seed={})", seed),
        }
    }
}
