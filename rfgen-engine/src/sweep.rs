use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rfgen_messages::{
    FrequencyGrid, GeneratorIdentity, Hertz, SweepMode, SweepSpec, ValidationError,
};
use std::time::{Duration, Instant};

/// Sweep engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Sweeping,
}

/// Direction the runtime walks the frequency ladder in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
    Hop,
}

/// A [`SweepSpec`] that passed validation, with its ladder precomputed.
///
/// The ladder is `start + i * step` for `i` in `0..=last_index`, each point
/// rounded to the frequency grid.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    spec: SweepSpec,
    mode: SweepMode,
    last_index: u64,
    /// Highest ladder index below the stop band
    top_index: u64,
    total_duration: Duration,
}

impl SweepPlan {
    /// Validate `spec` against the device bounds.
    pub fn new(
        spec: SweepSpec,
        mode: SweepMode,
        identity: &GeneratorIdentity,
        grid: FrequencyGrid,
    ) -> Result<Self, ValidationError> {
        let (start, stop, step) = (spec.start_freq, spec.stop_freq, spec.step_freq);
        if !start.is_finite() || !stop.is_finite() || stop <= start {
            return Err(ValidationError::EmptySweep { start, stop });
        }
        for value in [start, stop] {
            if !identity.contains(value) {
                return Err(ValidationError::OutOfRange {
                    value,
                    min: identity.lowest_frequency.as_f64(),
                    max: identity.highest_frequency.as_f64(),
                });
            }
        }
        if !step.is_finite() || step <= 0.0 || step > stop - start {
            return Err(ValidationError::InvalidStep(step));
        }
        if spec.step_duration.is_zero() {
            return Err(ValidationError::ZeroStepDuration);
        }

        let total_duration = spec.total_duration();
        if total_duration < identity.min_fm_duration || total_duration > identity.max_fm_duration {
            return Err(ValidationError::SweepDurationOutOfRange {
                duration: total_duration,
                min: identity.min_fm_duration,
                max: identity.max_fm_duration,
            });
        }

        let last_index = ((stop - start) / step + 1e-9).floor() as u64;
        let mut plan = Self {
            spec,
            mode,
            last_index,
            top_index: last_index,
            total_duration,
        };

        if identity.in_stop_band(plan.frequency_at(0, grid)) {
            return Err(ValidationError::SweepInStopBand);
        }
        // Ladder is monotonic and the stop band is upward closed.
        let (mut lo, mut hi) = (0, last_index);
        while lo < hi {
            let mid = lo + (hi - lo).div_ceil(2);
            if identity.in_stop_band(plan.frequency_at(mid, grid)) {
                hi = mid - 1;
            } else {
                lo = mid;
            }
        }
        plan.top_index = lo;
        Ok(plan)
    }

    pub fn spec(&self) -> &SweepSpec {
        &self.spec
    }

    pub fn mode(&self) -> SweepMode {
        self.mode
    }

    /// `(stop - start) / step * step_duration`
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// Number of ladder points.
    pub fn points(&self) -> u64 {
        self.last_index + 1
    }

    fn frequency_at(&self, index: u64, grid: FrequencyGrid) -> Hertz {
        let hz = self.spec.start_freq + index as f64 * self.spec.step_freq;
        // start and step are finite and positive after validation
        grid.round(hz).unwrap_or_default()
    }
}

/// Bookkeeping for the sweep in progress.
#[derive(Debug)]
pub struct SweepRuntime {
    plan: SweepPlan,
    current_index: Option<u64>,
    started_at: Instant,
    next_due: Instant,
    direction: Direction,
    rng: Option<StdRng>,
}

impl SweepRuntime {
    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// What a tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Command this frequency.
    Commit(Hertz),
    /// Nothing valid to command this tick.
    Skip,
    /// The sweep ran its course.
    Complete,
}

enum Candidate {
    Index(u64),
    Overshoot,
}

/// Timer-driven FM sweep state machine.
///
/// The owner calls [`SweepEngine::tick`] whenever [`SweepEngine::next_due`]
/// has passed and commits the returned frequency itself.
#[derive(Debug, Default)]
pub struct SweepEngine {
    runtime: Option<SweepRuntime>,
}

impl SweepEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SweepState {
        if self.runtime.is_some() {
            SweepState::Sweeping
        } else {
            SweepState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn runtime(&self) -> Option<&SweepRuntime> {
        self.runtime.as_ref()
    }

    /// Arm a sweep. The first tick is due immediately.
    pub fn start(&mut self, plan: SweepPlan, now: Instant) -> Result<(), ValidationError> {
        if self.runtime.is_some() {
            return Err(ValidationError::SweepAlreadyActive);
        }
        let (direction, rng) = match plan.mode {
            SweepMode::UpChirp => (Direction::Up, None),
            SweepMode::DownChirp => (Direction::Down, None),
            SweepMode::Fhss { seed } => (Direction::Hop, Some(StdRng::seed_from_u64(seed))),
        };
        debug!(
            "Sweep armed: {} over {} points, {:?} per step",
            plan.mode,
            plan.points(),
            plan.spec.step_duration
        );
        self.runtime = Some(SweepRuntime {
            plan,
            current_index: None,
            started_at: now,
            next_due: now,
            direction,
            rng,
        });
        Ok(())
    }

    /// Disarm the sweep. Returns whether one was active.
    pub fn stop(&mut self) -> bool {
        self.runtime.take().is_some()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.runtime.as_ref().map(|rt| rt.next_due)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due().is_some_and(|due| now >= due)
    }

    /// Time since the sweep started.
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.runtime
            .as_ref()
            .map(|rt| now.saturating_duration_since(rt.started_at))
    }

    /// Whether a chirp with a time budget has run past it at `now`.
    /// Hop sequences never spend their budget.
    pub fn budget_spent(&self, now: Instant) -> bool {
        let Some(rt) = self.runtime.as_ref() else {
            return false;
        };
        let Some(budget) = rt.plan.spec.budget else {
            return false;
        };
        rt.direction != Direction::Hop && self.elapsed(now).is_some_and(|e| e > budget)
    }

    /// Run one tick. On `Complete` the engine is back to `Idle`.
    pub fn tick(
        &mut self,
        now: Instant,
        identity: &GeneratorIdentity,
        grid: FrequencyGrid,
    ) -> Step {
        if self.budget_spent(now) {
            debug!("Sweep budget spent");
            self.runtime = None;
            return Step::Complete;
        }
        let Some(rt) = self.runtime.as_mut() else {
            return Step::Complete;
        };

        let step = Self::select(rt, identity, grid);
        let mut next_due = rt.next_due + rt.plan.spec.step_duration;
        if next_due <= now {
            next_due = now + rt.plan.spec.step_duration;
        }
        rt.next_due = next_due;

        if step == Step::Complete {
            self.runtime = None;
        }
        step
    }

    fn select(rt: &mut SweepRuntime, identity: &GeneratorIdentity, grid: FrequencyGrid) -> Step {
        let in_band =
            |plan: &SweepPlan, index: u64| identity.in_stop_band(plan.frequency_at(index, grid));

        let from = rt.current_index;
        let mut candidate = Self::next_candidate(rt, from);
        if let Candidate::Index(index) = candidate {
            if in_band(&rt.plan, index) {
                debug!(
                    "Sweep candidate {} is in the stop band, recomputing",
                    rt.plan.frequency_at(index, grid)
                );
                candidate = Self::next_candidate(rt, Some(index));
                if let Candidate::Index(retry) = candidate {
                    if in_band(&rt.plan, retry) {
                        candidate = match rt.direction {
                            Direction::Up => Candidate::Overshoot,
                            Direction::Down => {
                                rt.current_index = Some(retry);
                                return Step::Skip;
                            }
                            Direction::Hop => Candidate::Index(retry % (rt.plan.top_index + 1)),
                        };
                    }
                }
            }
        }

        let index = match candidate {
            Candidate::Index(index) => index,
            Candidate::Overshoot if rt.plan.spec.budget.is_none() => return Step::Complete,
            Candidate::Overshoot => match rt.direction {
                Direction::Down => rt.plan.top_index,
                _ => 0,
            },
        };
        rt.current_index = Some(index);
        let frequency = rt.plan.frequency_at(index, grid);
        if identity.in_stop_band(frequency) {
            return Step::Skip;
        }
        Step::Commit(frequency)
    }

    fn next_candidate(rt: &mut SweepRuntime, from: Option<u64>) -> Candidate {
        let last = rt.plan.last_index;
        match (rt.direction, from) {
            (Direction::Up, None) => Candidate::Index(0),
            (Direction::Up, Some(i)) if i < last => Candidate::Index(i + 1),
            (Direction::Down, None) => Candidate::Index(rt.plan.top_index),
            (Direction::Down, Some(i)) if i > 0 => Candidate::Index(i - 1),
            (Direction::Up | Direction::Down, Some(_)) => Candidate::Overshoot,
            (Direction::Hop, _) => {
                let index = rt
                    .rng
                    .as_mut()
                    .map(|rng| rng.gen_range(0..=last))
                    .unwrap_or(0);
                Candidate::Index(index)
            }
        }
    }
}
