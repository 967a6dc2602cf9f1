//! Extended multiplicative signal correction.
//!
//! A measured signal is modelled as a linear combination of reference
//! spectra and a polynomial baseline in the Raman shift:
//!
//! ```text
//!  signal ≈ c_a·analyte + Σ c_i·interferent_i + Σ_p b_p·shift^p
//! ```
//!
//! After fitting, everything except the analyte term is subtracted and the
//! remainder divided by `c_a`, giving the analyte contribution on the scale
//! of its reference.

use serde::{Deserialize, Serialize};

use super::lstsq;
use crate::data::model::Spectrum;
use crate::error::{Result, SpectrumError};

/// `transform` fails with `SingularModel` when the analyte coefficient is
/// not finite or `|c_analyte|·‖analyte‖ <= SINGULAR_CONTRIBUTION·‖prediction‖`,
/// i.e. the analyte carries a negligible share of the fitted signal.
pub const SINGULAR_CONTRIBUTION: f64 = 1e-9;

/// Part a reference plays in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRole {
    /// The component `transform` extracts. At most one per model.
    Analyte,
    /// Modelled and subtracted as background.
    Interferent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub role: ReferenceRole,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Fit {
    coefficients: Vec<f64>,
    prediction: Vec<f64>,
    score: f64,
}

/// EMSC model over a fixed Raman-shift grid.
#[derive(Debug, Clone)]
pub struct Emsc {
    raman_shift: Vec<f64>,
    order: Option<usize>,
    /// `shift^0 ..= shift^order`, built once.
    baseline: Vec<Vec<f64>>,
    references: Vec<Reference>,
    fit: Option<Fit>,
}

impl Emsc {
    /// Model with a polynomial baseline of degree `order` (0 = constant).
    pub fn new(raman_shift: Vec<f64>, order: usize) -> Self {
        Self::build(raman_shift, Some(order))
    }

    /// Model made of references only.
    pub fn without_baseline(raman_shift: Vec<f64>) -> Self {
        Self::build(raman_shift, None)
    }

    fn build(raman_shift: Vec<f64>, order: Option<usize>) -> Self {
        let baseline = match order {
            Some(order) => (0..=order as i32)
                .map(|p| raman_shift.iter().map(|x| x.powi(p)).collect())
                .collect(),
            None => Vec::new(),
        };
        Emsc {
            raman_shift,
            order,
            baseline,
            references: Vec::new(),
            fit: None,
        }
    }

    pub fn raman_shift(&self) -> &[f64] {
        &self.raman_shift
    }

    pub fn order(&self) -> Option<usize> {
        self.order
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    /// The reference `transform` extracts, if any.
    pub fn analyte(&self) -> Option<&Reference> {
        self.references
            .iter()
            .find(|r| r.role == ReferenceRole::Analyte)
    }

    /// Append a reference column. The first reference of a model becomes
    /// the analyte, later ones are interferents.
    pub fn add_reference(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let role = if self.analyte().is_none() {
            ReferenceRole::Analyte
        } else {
            ReferenceRole::Interferent
        };
        self.push_reference(name.into(), role, values)
    }

    /// Append a reference column as the analyte. A previous analyte is kept
    /// as an interferent.
    pub fn add_analyte(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.check_len("reference", values.len())?;
        for reference in &mut self.references {
            reference.role = ReferenceRole::Interferent;
        }
        self.push_reference(name.into(), ReferenceRole::Analyte, values)
    }

    /// Add the working data of `spectrum` as a reference; its grid must be
    /// the model's grid exactly.
    pub fn add_spectrum_reference(&mut self, spectrum: &Spectrum, role: ReferenceRole) -> Result<()> {
        if spectrum.x() != self.raman_shift.as_slice() {
            return Err(SpectrumError::RangeMismatch {
                left: "model".to_string(),
                right: spectrum.name.clone(),
            });
        }
        match role {
            ReferenceRole::Analyte => self.add_analyte(spectrum.name.clone(), spectrum.y().to_vec()),
            ReferenceRole::Interferent => {
                self.push_reference(spectrum.name.clone(), role, spectrum.y().to_vec())
            }
        }
    }

    fn push_reference(&mut self, name: String, role: ReferenceRole, values: Vec<f64>) -> Result<()> {
        self.check_len("reference", values.len())?;
        log::debug!("EMSC: added {role:?} reference `{name}`");
        self.references.push(Reference { name, role, values });
        // The design matrix changed; old coefficients no longer apply.
        self.fit = None;
        Ok(())
    }

    fn check_len(&self, what: &'static str, found: usize) -> Result<()> {
        if found != self.raman_shift.len() {
            return Err(SpectrumError::ShapeMismatch {
                what,
                expected: self.raman_shift.len(),
                found,
            });
        }
        Ok(())
    }

    /// Design columns: references in insertion order, then ascending powers.
    fn columns(&self) -> Vec<Vec<f64>> {
        self.references
            .iter()
            .map(|r| r.values.clone())
            .chain(self.baseline.iter().cloned())
            .collect()
    }

    /// Fit the model to `signal`, replacing any previous fit.
    pub fn fit(&mut self, signal: &[f64]) -> Result<()> {
        self.check_len("composite signal", signal.len())?;
        if self.references.is_empty() {
            return Err(SpectrumError::InvalidParameter(
                "EMSC needs at least one reference".to_string(),
            ));
        }
        let solution = lstsq::solve(&self.columns(), signal)?;
        let score = lstsq::r_squared(signal, &solution.prediction);
        log::debug!("EMSC: fitted {} columns, R² = {score:.6}", solution.coefficients.len());
        self.fit = Some(Fit {
            coefficients: solution.coefficients,
            prediction: solution.prediction,
            score,
        });
        Ok(())
    }

    fn fitted(&self) -> Result<&Fit> {
        self.fit.as_ref().ok_or(SpectrumError::NotFitted)
    }

    /// Coefficients, references first then ascending baseline powers.
    pub fn coefficients(&self) -> Result<&[f64]> {
        Ok(&self.fitted()?.coefficients)
    }

    /// Coefficient of a named reference.
    pub fn coefficient(&self, name: &str) -> Result<Option<f64>> {
        let fit = self.fitted()?;
        Ok(self
            .references
            .iter()
            .position(|r| r.name == name)
            .map(|i| fit.coefficients[i]))
    }

    /// Goodness of fit (R²) of the last fit.
    pub fn score(&self) -> Result<f64> {
        Ok(self.fitted()?.score)
    }

    /// Model output on the fitted signal.
    pub fn prediction(&self) -> Result<&[f64]> {
        Ok(&self.fitted()?.prediction)
    }

    /// Fitted polynomial baseline alone.
    pub fn baseline(&self) -> Result<Vec<f64>> {
        let fit = self.fitted()?;
        let offset = self.references.len();
        Ok(self.combine(&fit.coefficients, |i| i >= offset))
    }

    /// Remove every fitted component but the analyte from `signal` and
    /// express the rest in units of the analyte reference. With `normalize`
    /// the result is min-max scaled to `[0, 1]` (a flat result maps to 0).
    pub fn transform(&self, signal: &[f64], normalize: bool) -> Result<Vec<f64>> {
        let fit = self.fitted()?;
        self.check_len("composite signal", signal.len())?;
        let analyte = self
            .references
            .iter()
            .position(|r| r.role == ReferenceRole::Analyte)
            .ok_or_else(|| SpectrumError::InvalidParameter("model has no analyte".to_string()))?;
        let scale = fit.coefficients[analyte];
        let contribution = scale.abs() * norm(&self.references[analyte].values);
        if !scale.is_finite() || contribution <= SINGULAR_CONTRIBUTION * norm(&fit.prediction) {
            return Err(SpectrumError::SingularModel(format!(
                "analyte coefficient {scale:e} is too close to zero"
            )));
        }

        let background = self.combine(&fit.coefficients, |i| i != analyte);
        let mut corrected: Vec<f64> = signal
            .iter()
            .zip(&background)
            .map(|(s, b)| (s - b) / scale)
            .collect();

        if normalize {
            let min = corrected.iter().copied().fold(f64::INFINITY, f64::min);
            let max = corrected.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let span = max - min;
            for v in &mut corrected {
                *v = if span > 0.0 { (*v - min) / span } else { 0.0 };
            }
        }
        Ok(corrected)
    }

    /// Σ coefficient·column over the columns selected by `keep`.
    fn combine(&self, coefficients: &[f64], keep: impl Fn(usize) -> bool) -> Vec<f64> {
        let mut out = vec![0.0; self.raman_shift.len()];
        let columns = self
            .references
            .iter()
            .map(|r| &r.values)
            .chain(self.baseline.iter());
        for (i, (column, c)) in columns.zip(coefficients).enumerate() {
            if !keep(i) {
                continue;
            }
            for (o, v) in out.iter_mut().zip(column) {
                *o += c * v;
            }
        }
        out
    }
}

fn norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}
