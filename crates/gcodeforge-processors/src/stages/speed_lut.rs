//! Pressure advance from a speed lookup table
//!
//! The table is interpolated with a natural cubic spline. Feeds outside the
//! table are clamped to its first or last speed before interpolation.

use gcodeforge_core::{GcodeFile, LineId};
use gcodeforge_settings::SpeedLutSettings;
use tracing::info;

use super::{insert_annotated, pressure_advance_line};
use crate::error::{ProcessorError, ProcessorResult};
use crate::pipeline::FileProcessor;

/// Natural cubic spline through a set of knots
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalCubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivative at each knot; zero at both ends
    m: Vec<f64>,
}

impl NaturalCubicSpline {
    /// Fit a spline. `xs` must hold at least two strictly increasing values.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> ProcessorResult<Self> {
        if xs.len() != ys.len() {
            return Err(ProcessorError::InvalidLookupTable(format!(
                "{} knots but {} values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(ProcessorError::InvalidLookupTable(
                "at least two knots are required".to_string(),
            ));
        }
        if xs.iter().chain(&ys).any(|v| !v.is_finite()) {
            return Err(ProcessorError::InvalidLookupTable(
                "knots must be finite".to_string(),
            ));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ProcessorError::InvalidLookupTable(
                "knots must be strictly increasing".to_string(),
            ));
        }

        let m = second_derivatives(&xs, &ys);
        Ok(Self { xs, ys, m })
    }

    /// Smallest knot
    pub fn min_x(&self) -> f64 {
        self.xs[0]
    }

    /// Largest knot
    pub fn max_x(&self) -> f64 {
        self.xs[self.xs.len() - 1]
    }

    /// Evaluate at `x`, clamped to the knot range
    pub fn eval_clamped(&self, x: f64) -> f64 {
        let x = x.clamp(self.min_x(), self.max_x());
        let i = self
            .xs
            .partition_point(|knot| *knot <= x)
            .saturating_sub(1)
            .min(self.xs.len() - 2);

        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let a = x1 - x;
        let b = x - x0;

        m0 * a.powi(3) / (6.0 * h)
            + m1 * b.powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * a
            + (y1 / h - m1 * h / 6.0) * b
    }
}

/// Solve the tridiagonal system for the interior second derivatives
fn second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let slope: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    // Thomas algorithm over unknowns 1..n-1
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];
    for k in 1..n - 1 {
        let sub = h[k - 1];
        let diag = 2.0 * (h[k - 1] + h[k]);
        let sup = h[k];
        let rhs = 6.0 * (slope[k] - slope[k - 1]);

        let denom = diag - sub * c_prime[k - 1];
        c_prime[k] = sup / denom;
        d_prime[k] = (rhs - sub * d_prime[k - 1]) / denom;
    }

    for k in (1..n - 1).rev() {
        m[k] = d_prime[k] - c_prime[k] * m[k + 1];
    }
    m
}

/// Inserts `SET_PRESSURE_ADVANCE` before every move that sets a feed.
#[derive(Debug, Clone)]
pub struct SpeedLutPressureAdvance {
    settings: SpeedLutSettings,
    spline: NaturalCubicSpline,
}

impl SpeedLutPressureAdvance {
    pub fn new(settings: SpeedLutSettings) -> ProcessorResult<Self> {
        let spline =
            NaturalCubicSpline::new(settings.speeds_mms.clone(), settings.pa_values.clone())?;
        Ok(Self { settings, spline })
    }

    /// Pressure advance for a feed in mm/s
    pub fn pressure_advance(&self, feed_mms: f64) -> f64 {
        self.spline.eval_clamped(feed_mms)
    }
}

impl FileProcessor for SpeedLutPressureAdvance {
    fn name(&self) -> &str {
        "speed_lut_pressure_advance"
    }

    fn description(&self) -> &str {
        "Sets extruder pressure advance before each feed change from a speed lookup table"
    }

    fn process(&mut self, file: &mut GcodeFile) -> ProcessorResult<()> {
        let targets: Vec<(LineId, f64)> = file
            .lines()
            .filter_map(|id| {
                let line = file.line(id);
                if !line.is_move() {
                    return None;
                }
                line.number('F').map(|f| (id, f / 60.0))
            })
            .collect();

        for (id, feed_mms) in &targets {
            let pa = self.pressure_advance(*feed_mms);
            let section = file.section_of(*id);
            insert_annotated(file, section, Some(*id), [pressure_advance_line(pa)]);
        }

        info!("Inserted {} pressure advance changes", targets.len());
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }
}
