//! End-to-end run: load, resample, despike, merge, EMSC.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::data::loader;
use crate::data::model::{Acquisition, Spectrum, SpectrumSet};
use crate::processing::despike::RollingMedianDespiker;
use crate::processing::emsc::{Emsc, ReferenceRole};

/// Fitted contribution of one reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceReport {
    pub name: String,
    pub role: ReferenceRole,
    pub coefficient: f64,
}

/// Summary written next to the corrected spectrum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub name: String,
    pub sources: Vec<PathBuf>,
    pub acquisition: Acquisition,
    pub points: usize,
    pub raman_range: Option<(f64, f64)>,
    pub references: Vec<ReferenceReport>,
    /// Ascending powers of the Raman shift.
    pub baseline: Vec<f64>,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Merged measurement the model was fitted to.
    pub composite: Spectrum,
    pub corrected: Vec<f64>,
    pub report: RunReport,
}

#[derive(Serialize)]
struct Row {
    raman_shift: f64,
    intensity: f64,
}

/// Merge measurements of one sample: repeated acquisitions of the same
/// exposure are averaged, then the exposure groups are summed. Metadata of
/// the result comes from the longest exposure.
pub fn merge_measurements(spectra: Vec<Spectrum>) -> Result<Option<Spectrum>> {
    let mut groups: BTreeMap<u32, Vec<Spectrum>> = BTreeMap::new();
    for spectrum in spectra {
        groups.entry(spectrum.exposure()).or_default().push(spectrum);
    }
    let mut merged = Vec::with_capacity(groups.len());
    for (exposure, group) in groups.into_iter().rev() {
        let count = group.len();
        if let Some(spectrum) = SpectrumSet::from_spectra(group).accumulate()? {
            log::debug!("accumulated {count} spectra at {exposure} s");
            merged.push(spectrum);
        }
    }
    Ok(SpectrumSet::from_spectra(merged).sum()?)
}

/// Intersection of the Raman ranges of all spectra.
fn common_range<'a>(spectra: impl IntoIterator<Item = &'a Spectrum>) -> Option<(f64, f64)> {
    spectra
        .into_iter()
        .map(Spectrum::raman_range)
        .try_fold(None, |acc: Option<(f64, f64)>, range| {
            let (lo, hi) = range?;
            Some(Some(match acc {
                None => (lo, hi),
                Some((a, b)) => (a.max(lo), b.min(hi)),
            }))
        })
        .flatten()
}

/// Run the configured processing chain.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let step = Some(config.step);

    let mut samples = config
        .samples
        .iter()
        .map(|p| loader::read_spectrum(p, &config.schema, step))
        .collect::<Result<Vec<_>>>()?;
    log::info!("loaded {} sample spectra", samples.len());

    let mut references = Vec::with_capacity(config.references.len());
    for source in &config.references {
        let mut spectrum = loader::read_spectrum(&source.path, &config.reference_schema, step)?;
        if let Some(name) = &source.name {
            spectrum.name = name.clone();
        }
        references.push((spectrum, source.role));
    }

    if let Some(despike) = &config.despike {
        for spectrum in &mut samples {
            spectrum
                .despike(&RollingMedianDespiker, despike.window_length, despike.threshold)
                .with_context(|| format!("despiking {}", spectrum.name))?;
        }
    }

    let (low, high) = match config.range {
        Some([low, high]) => (low, high),
        None => common_range(samples.iter().chain(references.iter().map(|(s, _)| s)))
            .context("a spectrum has no data points")?,
    };
    if low > high {
        bail!("spectra share no common Raman range");
    }
    for spectrum in samples
        .iter_mut()
        .chain(references.iter_mut().map(|(s, _)| s))
    {
        spectrum.extract_range(low, high);
        if spectrum.is_empty() {
            bail!("{} has no points within [{low}, {high}]", spectrum.name);
        }
    }
    log::info!("restricted spectra to [{low}, {high}] cm⁻¹");

    let composite = merge_measurements(samples)?.context("no sample spectra to merge")?;
    log::info!("composite: {composite}");

    let shift = composite.x().to_vec();
    let mut model = match config.emsc.order {
        Some(order) => Emsc::new(shift, order),
        None => Emsc::without_baseline(shift),
    };
    for (spectrum, role) in &references {
        let role = role.unwrap_or(if model.analyte().is_none() {
            ReferenceRole::Analyte
        } else {
            ReferenceRole::Interferent
        });
        model
            .add_spectrum_reference(spectrum, role)
            .with_context(|| format!("adding reference {}", spectrum.name))?;
    }
    model.fit(composite.y()).context("fitting EMSC model")?;
    let corrected = model.transform(composite.y(), config.emsc.normalize)?;

    let coefficients = model.coefficients()?;
    let (reference_coefficients, baseline) = coefficients.split_at(model.references().len());
    let report = RunReport {
        name: composite.name.clone(),
        sources: composite.source_paths().iter().cloned().collect(),
        acquisition: composite.acquisition.clone(),
        points: composite.len(),
        raman_range: composite.raman_range(),
        references: model
            .references()
            .iter()
            .zip(reference_coefficients)
            .map(|(r, c)| ReferenceReport {
                name: r.name.clone(),
                role: r.role,
                coefficient: *c,
            })
            .collect(),
        baseline: baseline.to_vec(),
        score: model.score()?,
    };
    log::info!("EMSC fit of {}: R² = {:.6}", report.name, report.score);

    Ok(PipelineOutput {
        composite,
        corrected,
        report,
    })
}

/// Write the corrected spectrum as `raman_shift,intensity` CSV to `path`
/// and the report as JSON beside it.
pub fn write_outputs(output: &PipelineOutput, path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for (raman_shift, intensity) in output.composite.x().iter().zip(&output.corrected) {
        writer.serialize(Row {
            raman_shift: *raman_shift,
            intensity: *intensity,
        })?;
    }
    writer.flush()?;

    let report_path = path.with_extension("json");
    let file = std::fs::File::create(&report_path)
        .with_context(|| format!("creating {}", report_path.display()))?;
    serde_json::to_writer_pretty(file, &output.report)?;
    log::info!("wrote {} and {}", path.display(), report_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(exposure: u32, accumulation: u32, level: f64, path: &str) -> Spectrum {
        let x: Vec<f64> = (0..10).map(|i| 1000.0 + i as f64).collect();
        Spectrum::new(x, vec![level; 10])
            .unwrap()
            .with_source(path)
            .with_acquisition(Acquisition {
                exposure,
                accumulation,
                ..Acquisition::default()
            })
    }

    #[test]
    fn merge_accumulates_then_adds() {
        let merged = merge_measurements(vec![
            flat(60, 1, 1.0, "a"),
            flat(30, 1, 5.0, "c"),
            flat(60, 3, 3.0, "b"),
        ])
        .unwrap()
        .unwrap();
        // 60 s group: (1·1 + 3·3) / 4 = 2.5; plus the 30 s spectrum.
        assert!(merged.y().iter().all(|v| (v - 7.5).abs() < 1e-12));
        assert_eq!(merged.exposure(), 90);
        assert_eq!(merged.source_paths().len(), 3);
    }

    #[test]
    fn merge_of_nothing_is_none() {
        assert!(merge_measurements(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn merge_rejects_different_grids() {
        let other = Spectrum::new(vec![0.0, 1.0], vec![1.0, 1.0]).unwrap();
        assert!(merge_measurements(vec![flat(60, 1, 1.0, "a"), other]).is_err());
    }

    #[test]
    fn common_range_is_intersection() {
        let a = Spectrum::new(vec![0.0, 10.0], vec![1.0, 1.0]).unwrap();
        let b = Spectrum::new(vec![5.0, 20.0], vec![1.0, 1.0]).unwrap();
        assert_eq!(common_range([&a, &b]), Some((5.0, 10.0)));
    }
}
