use crate::error::{Result, SpectrumError};

// ---------------------------------------------------------------------------
// Natural cubic spline
// ---------------------------------------------------------------------------

/// A natural cubic spline (zero second derivative at both ends).
#[derive(Debug, Clone)]
pub struct CubicSpline {
    /// Knots, strictly increasing.
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot.
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Build the spline through `(xs[i], ys[i])`.
    ///
    /// Needs at least two knots and strictly increasing `xs`.
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(SpectrumError::ShapeMismatch {
                what: "spline ordinates",
                expected: xs.len(),
                found: ys.len(),
            });
        }
        if xs.len() < 2 {
            return Err(SpectrumError::InvalidParameter(format!(
                "a spline needs at least 2 points, got {}",
                xs.len()
            )));
        }
        if let Some(index) = xs.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SpectrumError::NotMonotonic { index: index + 1 });
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n - 1];

        // Forward sweep of the tridiagonal system
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            u[i] = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * u[i] / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        // Back substitution; y2s[n - 1] stays 0 (natural boundary)
        for k in (0..n - 2).rev() {
            y2s[k + 1] = y2s[k + 1] * y2s[k + 2] + u[k + 1];
        }

        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            y2s,
        })
    }

    /// Evaluate at `x`. Outside the knots the boundary cubic is extended.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();

        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xs[mid] > x {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;

        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }
}

// ---------------------------------------------------------------------------
// Uniform resampling
// ---------------------------------------------------------------------------

/// Largest number of nodes a resampling grid may hold.
pub const MAX_GRID_POINTS: usize = 10_000_000;

/// Uniform grid from `floor(min)` to `ceil(max)` inclusive, spaced by `step`.
///
/// Nodes are computed as `start + i * step` so spacing does not drift. A
/// step that would need more than [`MAX_GRID_POINTS`] nodes is rejected.
pub fn uniform_grid(min: f64, max: f64, step: f64) -> Result<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(SpectrumError::InvalidParameter(format!(
            "interpolation step must be positive, got {step}"
        )));
    }
    let start = min.floor();
    let stop = max.ceil();
    let intervals = ((stop - start) / step + 1e-9).floor();
    if !(intervals.is_finite() && intervals < MAX_GRID_POINTS as f64) {
        return Err(SpectrumError::InvalidParameter(format!(
            "step {step} over [{start}, {stop}] needs more than {MAX_GRID_POINTS} points"
        )));
    }
    let count = intervals as usize + 1;
    Ok((0..count).map(|i| start + i as f64 * step).collect())
}

/// Resample `(x, y)` onto a uniform grid of spacing `step`.
pub fn resample(x: &[f64], y: &[f64], step: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    let spline = CubicSpline::new(x, y)?;
    let grid = uniform_grid(x[0], x[x.len() - 1], step)?;
    let values = grid.iter().map(|&g| spline.evaluate(g)).collect();
    Ok((grid, values))
}
