use std::path::Path;

use anyhow::{bail, Context, Result};

use super::model::{Acquisition, Spectrum, SpectrumSet};
use super::naming::{self, FileNameSchema};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load the `(raman_shift, intensity)` columns of a measurement file.
/// Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.tsv` – columns separated by any run of tabs or spaces, as
///   exported by the spectrometer software
/// * `.csv` – comma separated
///
/// Rows are returned sorted by ascending Raman shift; exports written
/// shift-descending are reversed.
pub fn load_two_column(path: &Path) -> Result<(Vec<f64>, Vec<f64>)> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let delimiter = match ext.as_str() {
        "txt" | "tsv" => b'\t',
        "csv" => b',',
        other => bail!("Unsupported file extension: .{other}"),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows: Vec<(f64, f64)> = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("{}: row {row_no}", path.display()))?;
        let fields: Vec<&str> = if delimiter == b'\t' {
            record.iter().flat_map(str::split_whitespace).collect()
        } else {
            record.iter().filter(|f| !f.is_empty()).collect()
        };
        if fields.is_empty() {
            continue;
        }
        if fields.len() != 2 {
            bail!(
                "{}: row {row_no} has {} columns, expected 2",
                path.display(),
                fields.len()
            );
        }
        let shift = parse_float(fields[0], row_no, "raman shift")?;
        let intensity = parse_float(fields[1], row_no, "intensity")?;
        rows.push((shift, intensity));
    }

    if rows.first().zip(rows.last()).is_some_and(|(a, b)| a.0 > b.0) {
        rows.reverse();
    }
    Ok(rows.into_iter().unzip())
}

/// Load one measurement file into a [`Spectrum`].
///
/// Metadata is decoded from the file name with `schema`; `step` resamples
/// the spectrum right away.
pub fn read_spectrum(path: &Path, schema: &FileNameSchema, step: Option<f64>) -> Result<Spectrum> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no file name", path.display()))?;
    let parsed = naming::parse(file_name, schema)
        .with_context(|| format!("decoding file name of {}", path.display()))?;

    let (x, y) = load_two_column(path)?;
    let spectrum = match step {
        Some(step) => Spectrum::with_step(x, y, step),
        None => Spectrum::new(x, y),
    }
    .with_context(|| format!("building spectrum from {}", path.display()))?;

    let name = match (&parsed.name, parsed.id) {
        (Some(name), _) => name.clone(),
        (None, Some(id)) => id.to_string(),
        (None, None) => file_name.to_string(),
    };
    let acquisition = Acquisition {
        date: Some(parsed.timestamp),
        exposure: parsed.exposure.unwrap_or(0),
        accumulation: parsed.accumulation.unwrap_or(1),
        grating: parsed.grating,
        laser: parsed.laser,
        lens: parsed.lens,
        power: parsed.power,
    };

    log::debug!("loaded {} ({} points)", path.display(), spectrum.len());
    Ok(spectrum
        .with_name(name)
        .with_source(path)
        .with_acquisition(acquisition))
}

/// Load every `*.txt` measurement of a folder, sorted by file name.
pub fn read_dir(dir: &Path, schema: &FileNameSchema, step: Option<f64>) -> Result<SpectrumSet> {
    if !dir.is_dir() {
        bail!("The folder {} is not found", dir.display());
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("reading an entry of {}", dir.display()))?
            .path();
        if path.extension().and_then(|e| e.to_str()) == Some("txt") {
            paths.push(path);
        }
    }
    paths.sort();

    let spectra = paths
        .iter()
        .map(|p| read_spectrum(p, schema, step))
        .collect::<Result<Vec<_>>>()?;
    log::info!("loaded {} spectra from {}", spectra.len(), dir.display());
    Ok(SpectrumSet::from_spectra(spectra))
}

fn parse_float(s: &str, row: usize, col: &str) -> Result<f64> {
    s.parse::<f64>()
        .with_context(|| format!("Row {row}, {col}: '{s}' is not a number"))
}
