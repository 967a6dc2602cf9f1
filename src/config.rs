use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::naming::FileNameSchema;
use crate::processing::despike::WindowLength;
use crate::processing::emsc::ReferenceRole;

fn default_step() -> f64 {
    1.0
}

fn default_order() -> Option<usize> {
    Some(5)
}

fn default_threshold() -> f64 {
    3.0
}

fn default_true() -> bool {
    true
}

fn default_reference_schema() -> FileNameSchema {
    FileNameSchema::reference()
}

/// One reference measurement fed to the EMSC model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceSource {
    pub path: PathBuf,
    /// Overrides the name decoded from the file name.
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to analyte for the first reference, interferent after.
    #[serde(default)]
    pub role: Option<ReferenceRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DespikeConfig {
    #[serde(default)]
    pub window_length: WindowLength,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmscConfig {
    /// Baseline polynomial degree; `null` fits references only.
    #[serde(default = "default_order")]
    pub order: Option<usize>,
    #[serde(default = "default_true")]
    pub normalize: bool,
}

impl Default for EmscConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            normalize: true,
        }
    }
}

/// Settings of one pipeline run, read from a JSON file.
///
/// ```json
/// {
///   "samples": ["finger/0_600_785 nm_60 s_1_2024_03_19_08_31_34_01.txt"],
///   "references": [{ "path": "ref/glucose_600_785 nm_60 s_1_2024_03_19_08_00_00_01.txt" }],
///   "schema": ["id", "grating", "laser", "exposure", "accumulation",
///              "year", "month", "date", "hour", "minute", "second", "skip"],
///   "step": 1.0,
///   "range": [900.0, 1600.0],
///   "despike": { "window_length": "auto", "threshold": 3.0 },
///   "emsc": { "order": 5, "normalize": true },
///   "output": "corrected.csv"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub samples: Vec<PathBuf>,
    pub references: Vec<ReferenceSource>,
    /// File name schema of the samples.
    #[serde(default)]
    pub schema: FileNameSchema,
    #[serde(default = "default_reference_schema")]
    pub reference_schema: FileNameSchema,
    /// Resampling step (cm⁻¹).
    #[serde(default = "default_step")]
    pub step: f64,
    /// Inclusive `[low, high]` Raman-shift window.
    #[serde(default)]
    pub range: Option<[f64; 2]>,
    #[serde(default)]
    pub despike: Option<DespikeConfig>,
    #[serde(default)]
    pub emsc: EmscConfig,
    pub output: PathBuf,
}

impl PipelineConfig {
    /// Read and validate a configuration. Relative paths are resolved
    /// against the directory of the configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: PipelineConfig =
            serde_json::from_str(&text).context("parsing config JSON")?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.samples.iter_mut().for_each(resolve);
        self.references.iter_mut().for_each(|r| resolve(&mut r.path));
        resolve(&mut self.output);
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples.is_empty() {
            bail!("config lists no samples");
        }
        if self.references.is_empty() {
            bail!("config lists no references");
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            bail!("step must be positive, got {}", self.step);
        }
        if let Some([low, high]) = self.range {
            if !(low < high) {
                bail!("range [{low}, {high}] is empty");
            }
        }
        if let Some(despike) = &self.despike {
            if !(despike.threshold.is_finite() && despike.threshold > 0.0) {
                bail!("despike threshold must be positive, got {}", despike.threshold);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "samples": ["a.txt"],
        "references": [{ "path": "/data/glucose.txt" }],
        "output": "out.csv"
    }"#;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(config.step, 1.0);
        assert_eq!(config.emsc.order, Some(5));
        assert!(config.emsc.normalize);
        assert_eq!(config.schema, FileNameSchema::sample());
        assert_eq!(config.range, None);
        assert_eq!(config.despike, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn null_order_disables_baseline() {
        let text = MINIMAL.replace(
            r#""output""#,
            r#""emsc": { "order": null }, "despike": { "window_length": { "fixed": 7 } }, "output""#,
        );
        let config: PipelineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(config.emsc.order, None);
        let despike = config.despike.unwrap();
        assert_eq!(despike.window_length, WindowLength::Fixed(7));
        assert_eq!(despike.threshold, 3.0);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        config.step = 0.0;
        assert!(config.validate().is_err());
        config.step = 1.0;
        config.range = Some([1600.0, 900.0]);
        assert!(config.validate().is_err());
        config.range = None;
        config.samples.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let text = MINIMAL.replace(r#""output""#, r#""stepp": 2.0, "output""#);
        assert!(serde_json::from_str::<PipelineConfig>(&text).is_err());
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.samples[0], dir.path().join("a.txt"));
        assert_eq!(config.references[0].path, PathBuf::from("/data/glucose.txt"));
        assert_eq!(config.output, dir.path().join("out.csv"));
    }
}
