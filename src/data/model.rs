use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::spline;
use crate::error::{Result, SpectrumError};

// ---------------------------------------------------------------------------
// Acquisition – instrument metadata of one measurement
// ---------------------------------------------------------------------------

/// Instrument and timing parameters recorded with a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    /// When the measurement was taken.
    pub date: Option<NaiveDateTime>,
    /// Acquisition time per scan, in seconds.
    pub exposure: u32,
    /// Number of averaged scans, always ≥ 1.
    pub accumulation: u32,
    /// Grating (grooves/mm).
    pub grating: Option<u32>,
    /// Laser wavelength (nm).
    pub laser: Option<u32>,
    pub lens: Option<String>,
    /// Laser power (mW).
    pub power: Option<f64>,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self {
            date: None,
            exposure: 0,
            accumulation: 1,
            grating: None,
            laser: None,
            lens: None,
            power: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum – one measurement
// ---------------------------------------------------------------------------

/// A single Raman measurement.
///
/// Two buffers are kept: the raw snapshot taken at construction, which is
/// never modified, and the working `x`/`y` that every transform replaces.
/// `interpolate` always reads the raw snapshot; `extract_range` and the
/// despike adapter read the working data.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Free-form identity, `"unnamed"` by default.
    pub name: String,
    pub acquisition: Acquisition,
    raw_x: Vec<f64>,
    raw_y: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    source_paths: BTreeSet<PathBuf>,
    /// Spacing of the working grid.
    dx: f64,
}

impl Spectrum {
    /// Build a spectrum from Raman shift `x` and intensity `y`.
    ///
    /// `x` must be strictly increasing and both arrays finite and of equal
    /// length.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(SpectrumError::ShapeMismatch {
                what: "intensity",
                expected: x.len(),
                found: y.len(),
            });
        }
        if let Some(i) = x.iter().chain(y.iter()).position(|v| !v.is_finite()) {
            return Err(SpectrumError::TypeMismatch(format!(
                "value at position {i} is not a finite number"
            )));
        }
        if let Some(index) = x.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SpectrumError::NotMonotonic { index: index + 1 });
        }

        let dx = mean_spacing(&x);
        Ok(Spectrum {
            name: "unnamed".to_string(),
            acquisition: Acquisition::default(),
            raw_x: x.clone(),
            raw_y: y.clone(),
            x,
            y,
            source_paths: BTreeSet::new(),
            dx,
        })
    }

    /// Build and immediately resample onto a uniform grid of `step`.
    pub fn with_step(x: Vec<f64>, y: Vec<f64>, step: f64) -> Result<Self> {
        let mut spectrum = Self::new(x, y)?;
        spectrum.interpolate(step)?;
        Ok(spectrum)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_source(mut self, path: impl AsRef<Path>) -> Self {
        self.source_paths.insert(path.as_ref().to_path_buf());
        self
    }

    /// Attach acquisition metadata. `accumulation` of 0 is raised to 1.
    pub fn with_acquisition(mut self, mut acquisition: Acquisition) -> Self {
        acquisition.accumulation = acquisition.accumulation.max(1);
        self.acquisition = acquisition;
        self
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn raw_x(&self) -> &[f64] {
        &self.raw_x
    }

    pub fn raw_y(&self) -> &[f64] {
        &self.raw_y
    }

    pub fn source_paths(&self) -> &BTreeSet<PathBuf> {
        &self.source_paths
    }

    pub fn exposure(&self) -> u32 {
        self.acquisition.exposure
    }

    pub fn accumulation(&self) -> u32 {
        self.acquisition.accumulation
    }

    /// Spacing of the working grid (the step after `interpolate`, the mean
    /// raw spacing otherwise).
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Number of working points.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// `(min, max)` of the working Raman shift, `None` when empty.
    pub fn raman_range(&self) -> Option<(f64, f64)> {
        Some((*self.x.first()?, *self.x.last()?))
    }

    /// Restore the working data from the raw snapshot.
    pub fn reset_to_raw(&mut self) {
        self.x = self.raw_x.clone();
        self.y = self.raw_y.clone();
        self.dx = mean_spacing(&self.x);
    }

    /// Resample the raw snapshot onto a uniform grid of spacing `step`.
    ///
    /// Reading from the raw snapshot makes repeated calls independent of
    /// each other; a previous `extract_range` is discarded.
    pub fn interpolate(&mut self, step: f64) -> Result<()> {
        let (x, y) = spline::resample(&self.raw_x, &self.raw_y, step)?;
        log::debug!(
            "{}: resampled {} raw points onto {} points (step {step})",
            self.name,
            self.raw_x.len(),
            x.len()
        );
        self.x = x;
        self.y = y;
        self.dx = step;
        Ok(())
    }

    /// Keep only the points with `low <= x <= high`.
    ///
    /// An empty result is valid; callers that need data must check `len()`.
    pub fn extract_range(&mut self, low: f64, high: f64) {
        let (x, y): (Vec<f64>, Vec<f64>) = self
            .x
            .iter()
            .zip(self.y.iter())
            .filter(|(x, _)| **x >= low && **x <= high)
            .map(|(x, y)| (*x, *y))
            .unzip();
        self.x = x;
        self.y = y;
    }

    /// Whether both spectra share an identical working Raman shift.
    pub fn is_same_range(&self, other: &Spectrum) -> bool {
        self.x == other.x
    }

    /// Replace the working intensity, keeping the grid.
    pub(crate) fn set_y(&mut self, y: Vec<f64>) -> Result<()> {
        if y.len() != self.x.len() {
            return Err(SpectrumError::ShapeMismatch {
                what: "intensity",
                expected: self.x.len(),
                found: y.len(),
            });
        }
        self.y = y;
        Ok(())
    }

    // -- Combination algebra --

    /// Concatenate exposure time: intensities and exposures are summed.
    ///
    /// Requires an identical Raman shift; everything except the exposure and
    /// the source paths is taken from `self`.
    pub fn combine_add(&self, other: &Spectrum) -> Result<Spectrum> {
        self.ensure_same_range(other)?;
        let exposure = checked_sum(
            "exposure",
            self.acquisition.exposure,
            other.acquisition.exposure,
        )?;
        let y = self.y.iter().zip(other.y.iter()).map(|(a, b)| a + b).collect();
        let mut result = self.derive(y);
        result.acquisition.exposure = exposure;
        result.source_paths.extend(other.source_paths.iter().cloned());
        Ok(result)
    }

    /// Average repeated acquisitions, weighted by their accumulation counts.
    ///
    /// Requires an identical Raman shift and an identical exposure.
    pub fn combine_accumulate(&self, other: &Spectrum) -> Result<Spectrum> {
        self.ensure_same_range(other)?;
        if self.acquisition.exposure != other.acquisition.exposure {
            return Err(SpectrumError::ExposureMismatch {
                left: self.acquisition.exposure,
                right: other.acquisition.exposure,
            });
        }
        let accumulation = checked_sum(
            "accumulation",
            self.acquisition.accumulation,
            other.acquisition.accumulation,
        )?;
        let acc_left = f64::from(self.acquisition.accumulation);
        let acc_right = f64::from(other.acquisition.accumulation);
        let y = self
            .y
            .iter()
            .zip(other.y.iter())
            .map(|(a, b)| (acc_left * a + acc_right * b) / (acc_left + acc_right))
            .collect();
        let mut result = self.derive(y);
        result.acquisition.accumulation = accumulation;
        result.source_paths.extend(other.source_paths.iter().cloned());
        Ok(result)
    }

    /// Shift every intensity by `value`.
    pub fn offset(&self, value: f64) -> Result<Spectrum> {
        if !value.is_finite() {
            return Err(SpectrumError::TypeMismatch(format!(
                "offset must be a real number, got {value}"
            )));
        }
        Ok(self.derive(self.y.iter().map(|v| v + value).collect()))
    }

    /// Multiply every intensity by `factor`.
    pub fn scale(&self, factor: f64) -> Result<Spectrum> {
        if !factor.is_finite() {
            return Err(SpectrumError::TypeMismatch(format!(
                "scale factor must be a real number, got {factor}"
            )));
        }
        Ok(self.derive(self.y.iter().map(|v| v * factor).collect()))
    }

    fn ensure_same_range(&self, other: &Spectrum) -> Result<()> {
        if self.is_same_range(other) {
            Ok(())
        } else {
            Err(SpectrumError::RangeMismatch {
                left: self.name.clone(),
                right: other.name.clone(),
            })
        }
    }

    /// New spectrum on the same grid and metadata with intensity `y`. The
    /// combined data becomes the raw snapshot of the result.
    fn derive(&self, y: Vec<f64>) -> Spectrum {
        Spectrum {
            name: self.name.clone(),
            acquisition: self.acquisition.clone(),
            raw_x: self.x.clone(),
            raw_y: y.clone(),
            x: self.x.clone(),
            y,
            source_paths: self.source_paths.clone(),
            dx: self.dx,
        }
    }
}

fn checked_sum(what: &str, left: u32, right: u32) -> Result<u32> {
    left.checked_add(right).ok_or_else(|| {
        SpectrumError::InvalidParameter(format!("combined {what} {left} + {right} overflows"))
    })
}

impl fmt::Display for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        writeln!(f, "  Spectrum: {}", self.name)?;
        writeln!(f, "      date: {}", opt(&self.acquisition.date))?;
        writeln!(f, "   grating: {}", opt(&self.acquisition.grating))?;
        writeln!(f, "     laser: {}", opt(&self.acquisition.laser))?;
        writeln!(f, "  exposure: {} s", self.acquisition.exposure)?;
        write!(f, "      accu: {}", self.acquisition.accumulation)
    }
}

fn mean_spacing(x: &[f64]) -> f64 {
    if x.len() < 2 {
        return f64::NAN;
    }
    (x[x.len() - 1] - x[0]) / (x.len() - 1) as f64
}

// ---------------------------------------------------------------------------
// SpectrumSet – a batch of measurements
// ---------------------------------------------------------------------------

/// An ordered batch of spectra processed together.
#[derive(Debug, Clone, Default)]
pub struct SpectrumSet {
    pub spectra: Vec<Spectrum>,
    /// Overall `(min, max)` Raman shift across all spectra.
    range: Option<(f64, f64)>,
}

impl SpectrumSet {
    pub fn from_spectra(spectra: Vec<Spectrum>) -> Self {
        let mut set = SpectrumSet {
            spectra,
            range: None,
        };
        set.update_range();
        set
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn raman_range(&self) -> Option<(f64, f64)> {
        self.range
    }

    /// Resample every spectrum. Stops at the first failure.
    pub fn interpolate(&mut self, step: f64) -> Result<()> {
        for spectrum in &mut self.spectra {
            spectrum.interpolate(step)?;
        }
        self.update_range();
        Ok(())
    }

    pub fn extract_range(&mut self, low: f64, high: f64) {
        for spectrum in &mut self.spectra {
            spectrum.extract_range(low, high);
        }
        self.update_range();
    }

    /// Fold all spectra with [`Spectrum::combine_accumulate`].
    pub fn accumulate(&self) -> Result<Option<Spectrum>> {
        self.fold(Spectrum::combine_accumulate)
    }

    /// Fold all spectra with [`Spectrum::combine_add`].
    pub fn sum(&self) -> Result<Option<Spectrum>> {
        self.fold(Spectrum::combine_add)
    }

    fn fold(
        &self,
        op: impl Fn(&Spectrum, &Spectrum) -> Result<Spectrum>,
    ) -> Result<Option<Spectrum>> {
        let mut iter = self.spectra.iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut acc = first.clone();
        for spectrum in iter {
            acc = op(&acc, spectrum)?;
        }
        Ok(Some(acc))
    }

    fn update_range(&mut self) {
        self.range = self
            .spectra
            .iter()
            .filter_map(Spectrum::raman_range)
            .fold(None, |acc, (lo, hi)| match acc {
                None => Some((lo, hi)),
                Some((a, b)) => Some((f64::min(a, lo), f64::max(b, hi))),
            });
    }
}
