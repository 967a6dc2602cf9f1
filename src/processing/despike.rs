use serde::{Deserialize, Serialize};

use crate::data::model::Spectrum;
use crate::error::{Result, SpectrumError};

/// Raman-shift span (cm⁻¹) an automatic despike window covers.
pub const AUTO_WINDOW_SPAN: f64 = 5.0;

/// Removes narrow high-amplitude artefacts (cosmic rays) from a signal.
pub trait Despiker {
    /// Return a cleaned copy of `y`, same length as the input.
    fn despike(&self, x: &[f64], y: &[f64], window_length: usize, threshold: f64)
        -> Result<Vec<f64>>;
}

/// Neighbourhood size handed to the despiker.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowLength {
    /// `round(5 / dx)`: a fixed 5 cm⁻¹ neighbourhood whatever the step.
    #[default]
    Auto,
    Fixed(usize),
}

impl WindowLength {
    pub fn resolve(self, dx: f64) -> Result<usize> {
        match self {
            WindowLength::Auto => default_window_length(dx),
            WindowLength::Fixed(0) => Err(SpectrumError::InvalidParameter(
                "despike window must hold at least one point".to_string(),
            )),
            WindowLength::Fixed(n) => Ok(n),
        }
    }
}

/// `round(5 / dx)`, never less than one point.
pub fn default_window_length(dx: f64) -> Result<usize> {
    if !(dx.is_finite() && dx > 0.0) {
        return Err(SpectrumError::InvalidParameter(format!(
            "cannot derive a despike window from spacing {dx}"
        )));
    }
    Ok(((AUTO_WINDOW_SPAN / dx).round() as usize).max(1))
}

impl Spectrum {
    /// Run `despiker` over the working data.
    pub fn despike(
        &mut self,
        despiker: &dyn Despiker,
        window: WindowLength,
        threshold: f64,
    ) -> Result<()> {
        let window_length = window.resolve(self.dx())?;
        let cleaned = despiker.despike(self.x(), self.y(), window_length, threshold)?;
        log::debug!("{}: despiked with window {window_length}", self.name);
        self.set_y(cleaned)
    }
}

// ---------------------------------------------------------------------------
// Rolling median despiker
// ---------------------------------------------------------------------------

/// Flags points whose deviation from the rolling median has a z-score above
/// the threshold, and replaces them with the median of the unflagged points
/// in their window.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingMedianDespiker;

impl Despiker for RollingMedianDespiker {
    fn despike(
        &self,
        _x: &[f64],
        y: &[f64],
        window_length: usize,
        threshold: f64,
    ) -> Result<Vec<f64>> {
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(SpectrumError::InvalidParameter(format!(
                "despike threshold must be positive, got {threshold}"
            )));
        }
        let n = y.len();
        if n < 3 {
            return Ok(y.to_vec());
        }
        let half = (window_length / 2).max(1);
        let window = |i: usize| i.saturating_sub(half)..(i + half + 1).min(n);

        let smooth: Vec<f64> = (0..n).map(|i| median(&y[window(i)])).collect();
        let residual: Vec<f64> = y.iter().zip(&smooth).map(|(a, b)| (a - b).abs()).collect();
        let mean = residual.iter().sum::<f64>() / n as f64;
        let std = (residual.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
        if std == 0.0 {
            return Ok(y.to_vec());
        }
        let spikes: Vec<bool> = residual
            .iter()
            .map(|r| (r - mean) / std > threshold)
            .collect();

        let cleaned = (0..n)
            .map(|i| {
                if !spikes[i] {
                    return y[i];
                }
                let neighbours: Vec<f64> = window(i)
                    .filter(|&j| !spikes[j])
                    .map(|j| y[j])
                    .collect();
                if neighbours.is_empty() {
                    smooth[i]
                } else {
                    median(&neighbours)
                }
            })
            .collect();
        Ok(cleaned)
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
