//! Sampled acceleration profiles
//!
//! An [`AccelerationProfile`] turns a requested velocity change into
//! evenly spaced acceleration, velocity and position samples. The
//! acceleration rises along a ramp, holds a constant plateau if the change
//! needs one, then falls along the mirrored ramp. The peak is then trimmed
//! in small steps until the final velocity lands at or just under the
//! request.
//!
//! Solutions are memoized by the delta rounded to a fixed number of
//! decimals, since corners in one file request the same handful of deltas
//! over and over.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::error::VelocityError;

/// Default number of cached solutions
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Cumulative trapezoidal integral of evenly spaced samples, starting at 0
pub fn cumulative_trapezoid(samples: &[f64], dt: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    let mut total = 0.0;
    out.push(total);
    for pair in samples.windows(2) {
        total += (pair[0] + pair[1]) * dt / 2.0;
        out.push(total);
    }
    out.truncate(samples.len());
    out
}

/// Acceleration and velocity samples for a positive velocity change
#[derive(Debug, Clone, PartialEq)]
pub struct RampSolution {
    /// Acceleration per sample (mm/s²)
    pub accel: Vec<f64>,
    /// Velocity change per sample (mm/s), starting at 0
    pub velocity: Vec<f64>,
}

impl RampSolution {
    /// Velocity change reached at the last sample
    pub fn final_velocity(&self) -> f64 {
        self.velocity.last().copied().unwrap_or(0.0)
    }
}

/// Samples for a concrete change between two speeds
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSamples {
    /// Acceleration magnitude per sample (mm/s²)
    pub accel: Vec<f64>,
    /// Absolute velocity per sample (mm/s)
    pub velocity: Vec<f64>,
    /// Distance traveled since the first sample (mm)
    pub position: Vec<f64>,
}

impl ProfileSamples {
    /// Distance covered by each step paired with the velocity at its far end
    pub fn steps(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.position
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .zip(self.velocity.iter().skip(1).copied())
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.velocity.len()
    }

    /// Whether there are no samples
    pub fn is_empty(&self) -> bool {
        self.velocity.is_empty()
    }
}

/// Bounded least-recently-used store of ramp solutions
#[derive(Debug)]
struct SolutionCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<i64, (Rc<RampSolution>, u64)>,
}

impl SolutionCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY)),
        }
    }

    fn get(&mut self, key: i64) -> Option<Rc<RampSolution>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&key).map(|(solution, used)| {
            *used = tick;
            Rc::clone(solution)
        })
    }

    fn insert(&mut self, key: i64, solution: Rc<RampSolution>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.tick += 1;
        self.entries.insert(key, (solution, self.tick));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Acceleration profile with ramped onset and release
#[derive(Debug)]
pub struct AccelerationProfile {
    ramp: Vec<f64>,
    dt: f64,
    accel_step: f64,
    const_accel: f64,
    stop_now_velocity: Vec<f64>,
    precision: i32,
    cache: SolutionCache,
}

impl AccelerationProfile {
    /// Create a profile from an explicit acceleration ramp.
    ///
    /// # Arguments
    /// * `ramp` - Acceleration samples rising from 0 towards `const_accel`
    /// * `dt` - Time between samples (s)
    /// * `accel_step` - Amount the peak is lowered per trimming iteration
    /// * `const_accel` - Plateau acceleration held between the ramps
    pub fn new(
        ramp: Vec<f64>,
        dt: f64,
        accel_step: f64,
        const_accel: f64,
    ) -> Result<Self, VelocityError> {
        if ramp.len() < 2 {
            return Err(VelocityError::invalid("ramp", "needs at least two samples"));
        }
        if ramp.iter().any(|a| !a.is_finite() || *a < 0.0) {
            return Err(VelocityError::invalid(
                "ramp",
                "samples must be finite and non-negative",
            ));
        }
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(VelocityError::invalid("dt", format!("must be > 0, got {}", dt)));
        }
        if !(accel_step > 0.0 && accel_step.is_finite()) {
            return Err(VelocityError::invalid(
                "accel_step",
                format!("must be > 0, got {}", accel_step),
            ));
        }
        if !(const_accel > 0.0 && const_accel.is_finite()) {
            return Err(VelocityError::invalid(
                "const_accel",
                format!("must be > 0, got {}", const_accel),
            ));
        }

        let stop_now_velocity = cumulative_trapezoid(&ramp, dt)
            .into_iter()
            .map(|v| v * 2.0)
            .collect();

        Ok(Self {
            ramp,
            dt,
            accel_step,
            const_accel,
            stop_now_velocity,
            precision: 0,
            cache: SolutionCache::new(DEFAULT_CACHE_CAPACITY),
        })
    }

    /// Create a profile whose acceleration ramps linearly from 0 to
    /// `max_accel` over `ramp_time` seconds.
    pub fn s_curve(
        ramp_time: f64,
        max_accel: f64,
        dt: f64,
        accel_step: f64,
    ) -> Result<Self, VelocityError> {
        if !(ramp_time > 0.0 && ramp_time.is_finite()) {
            return Err(VelocityError::invalid(
                "ramp_time",
                format!("must be > 0, got {}", ramp_time),
            ));
        }
        if !(dt > 0.0 && dt <= ramp_time) {
            return Err(VelocityError::invalid(
                "dt",
                format!("must be in (0, ramp_time], got {}", dt),
            ));
        }

        let count = (ramp_time / dt).round() as usize + 1;
        let ramp = (0..count)
            .map(|i| max_accel * (i as f64 * dt / ramp_time).min(1.0))
            .collect();
        Self::new(ramp, dt, accel_step, max_accel)
    }

    /// Round deltas to `places` decimals before solving and caching
    pub fn with_precision(mut self, places: i32) -> Self {
        self.precision = places;
        self
    }

    /// Bound the number of cached solutions
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = SolutionCache::new(capacity);
        self
    }

    /// Time between samples (s)
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Number of cached solutions
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Velocity change covered by the two ramps alone
    pub fn ramps_only_velocity(&self) -> f64 {
        self.stop_now_velocity.last().copied().unwrap_or(0.0)
    }

    fn scale(&self) -> f64 {
        10f64.powi(self.precision)
    }

    /// Integer cache key for a delta at the configured precision
    pub fn quantize(&self, delta: f64) -> i64 {
        (delta * self.scale()).round() as i64
    }

    /// Solve the samples for a strictly positive velocity change.
    pub fn solve(&self, delta: f64) -> Result<RampSolution, VelocityError> {
        if !(delta > 0.0 && delta.is_finite()) {
            return Err(VelocityError::NonPositiveDelta { delta });
        }

        let (mut accel, mut reached) = if self.ramps_only_velocity() >= delta {
            let stop = self
                .stop_now_velocity
                .iter()
                .position(|v| *v >= delta)
                .unwrap_or(self.ramp.len() - 1);
            let mut accel = self.ramp[..stop].to_vec();
            accel.extend(self.ramp[..=stop].iter().rev());
            (accel, self.ramp[stop])
        } else {
            // Round the plateau up; trimming below only ever lowers the result
            let plateau_time = (delta - self.ramps_only_velocity()) / self.const_accel;
            let plateau = (plateau_time / self.dt).ceil() as usize;
            let mut accel = self.ramp.clone();
            accel.extend(std::iter::repeat(self.const_accel).take(plateau));
            accel.extend(self.ramp.iter().rev());
            (accel, self.const_accel)
        };

        let mut iterations = 0usize;
        let velocity = loop {
            let velocity = cumulative_trapezoid(&accel, self.dt);
            if velocity.last().is_some_and(|v| *v <= delta) {
                break velocity;
            }
            reached -= self.accel_step;
            for a in accel.iter_mut() {
                *a = a.min(reached);
            }
            iterations += 1;
        };

        trace!(
            "Solved delta {} in {} samples after {} trims",
            delta,
            accel.len(),
            iterations
        );
        Ok(RampSolution { accel, velocity })
    }

    /// Solve with memoization by quantized delta
    pub fn solve_cached(&mut self, delta: f64) -> Result<Rc<RampSolution>, VelocityError> {
        let key = self.quantize(delta);
        if let Some(solution) = self.cache.get(key) {
            return Ok(solution);
        }
        let solution = Rc::new(self.solve(key as f64 / self.scale())?);
        self.cache.insert(key, Rc::clone(&solution));
        Ok(solution)
    }

    /// Samples for moving between two speeds.
    ///
    /// Velocities are absolute and never leave the range spanned by `from`
    /// and `to`, even when the quantized delta is larger than the requested
    /// one. When slowing down the velocity samples run from `from` down to
    /// `to`. Positions are integrated from the absolute velocity.
    pub fn calc(&mut self, from: f64, to: f64) -> Result<ProfileSamples, VelocityError> {
        let key = self.quantize(to - from);
        if key == 0 {
            return Err(VelocityError::NonPositiveDelta { delta: to - from });
        }

        let solution = self.solve_cached((key.abs() as f64) / self.scale())?;
        let (lo, hi) = (from.min(to), from.max(to));
        let velocity: Vec<f64> = if key < 0 {
            solution
                .velocity
                .iter()
                .rev()
                .map(|v| (v + to).clamp(lo, hi))
                .collect()
        } else {
            solution
                .velocity
                .iter()
                .map(|v| (v + from).clamp(lo, hi))
                .collect()
        };
        let position = cumulative_trapezoid(&velocity, self.dt);

        Ok(ProfileSamples {
            accel: solution.accel.clone(),
            velocity,
            position,
        })
    }
}
