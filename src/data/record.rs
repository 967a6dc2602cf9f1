use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::model::{Acquisition, Spectrum};
use super::naming::ParsedName;
use crate::error::{RecordError, SpectrumError};

/// What was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// In-vivo finger measurement, identified by subject.
    Finger,
    /// Calibration reference (e.g. pure glucose).
    Reference,
    /// Blood sample with a known glucose value.
    Blood,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Finger => "finger",
            RecordKind::Reference => "reference",
            RecordKind::Blood => "blood",
        }
    }
}

impl std::str::FromStr for RecordKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finger" => Ok(RecordKind::Finger),
            "reference" => Ok(RecordKind::Reference),
            "blood" => Ok(RecordKind::Blood),
            other => Err(RecordError::InvalidField {
                field: "kind",
                value: other.to_string(),
            }),
        }
    }
}

fn default_lens() -> String {
    "x10".to_string()
}

fn default_power() -> f64 {
    7.0
}

/// Flat persistence form of a measurement: scalar metadata plus the two
/// numeric arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub kind: RecordKind,
    /// Reference/blood name, or the measurement id of a finger record.
    pub name: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub glucose: Option<f64>,
    pub grating: u32,
    pub laser: u32,
    pub exposure: u32,
    pub accumulation: u32,
    pub timestamp: NaiveDateTime,
    #[serde(default = "default_lens")]
    pub lens: String,
    #[serde(default = "default_power")]
    pub power: f64,
    #[serde(default)]
    pub slit: Option<f64>,
    pub raman_shift: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl MeasurementRecord {
    /// Build a record from a decoded file name and the loaded arrays.
    pub fn from_parsed(
        kind: RecordKind,
        parsed: ParsedName,
        raman_shift: Vec<f64>,
        intensity: Vec<f64>,
    ) -> Result<Self, RecordError> {
        let name = match (parsed.name, parsed.id) {
            (Some(name), _) => name,
            (None, Some(id)) => id.to_string(),
            (None, None) => return Err(RecordError::MissingField("name")),
        };
        Ok(MeasurementRecord {
            kind,
            name,
            subject_id: None,
            glucose: parsed.glucose,
            grating: parsed.grating.ok_or(RecordError::MissingField("grating"))?,
            laser: parsed.laser.ok_or(RecordError::MissingField("laser"))?,
            exposure: parsed.exposure.ok_or(RecordError::MissingField("exposure"))?,
            accumulation: parsed
                .accumulation
                .ok_or(RecordError::MissingField("accumulation"))?,
            timestamp: parsed.timestamp,
            lens: parsed.lens.unwrap_or_else(default_lens),
            power: parsed.power.unwrap_or_else(default_power),
            slit: parsed.slit,
            raman_shift,
            intensity,
        })
    }

    /// Snapshot the working data and metadata of `spectrum`.
    pub fn from_spectrum(kind: RecordKind, spectrum: &Spectrum) -> Result<Self, RecordError> {
        let acq = &spectrum.acquisition;
        Ok(MeasurementRecord {
            kind,
            name: spectrum.name.clone(),
            subject_id: None,
            glucose: None,
            grating: acq.grating.ok_or(RecordError::MissingField("grating"))?,
            laser: acq.laser.ok_or(RecordError::MissingField("laser"))?,
            exposure: acq.exposure,
            accumulation: acq.accumulation,
            timestamp: acq.date.ok_or(RecordError::MissingField("timestamp"))?,
            lens: acq.lens.clone().unwrap_or_else(default_lens),
            power: acq.power.unwrap_or_else(default_power),
            slit: None,
            raman_shift: spectrum.x().to_vec(),
            intensity: spectrum.y().to_vec(),
        })
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Uniqueness identity: the subject for finger records, the name otherwise.
    pub fn identity(&self) -> Option<&str> {
        match self.kind {
            RecordKind::Finger => self.subject_id.as_deref(),
            RecordKind::Reference | RecordKind::Blood => Some(self.name.as_str()),
        }
    }

    /// Display name of the resulting spectrum.
    pub fn spectrum_name(&self) -> String {
        match (self.kind, &self.subject_id) {
            (RecordKind::Finger, Some(subject)) => format!("{subject}_{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Build a [`Spectrum`], optionally resampled onto a grid of `step`.
    pub fn to_spectrum(&self, step: Option<f64>) -> Result<Spectrum, SpectrumError> {
        let x = self.raman_shift.clone();
        let y = self.intensity.clone();
        let spectrum = match step {
            Some(step) => Spectrum::with_step(x, y, step)?,
            None => Spectrum::new(x, y)?,
        };
        Ok(spectrum
            .with_name(self.spectrum_name())
            .with_acquisition(Acquisition {
                date: Some(self.timestamp),
                exposure: self.exposure,
                accumulation: self.accumulation,
                grating: Some(self.grating),
                laser: Some(self.laser),
                lens: Some(self.lens.clone()),
                power: Some(self.power),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::naming::{self, FileNameSchema};

    fn finger() -> MeasurementRecord {
        let parsed = naming::parse(
            "7_600_785 nm_60 s_1_2024_03_19_08_31_34_01.txt",
            &FileNameSchema::finger(),
        )
        .unwrap();
        MeasurementRecord::from_parsed(
            RecordKind::Finger,
            parsed,
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn finger_identity_is_subject() {
        let record = finger();
        assert_eq!(record.name, "7");
        assert_eq!(record.identity(), None);
        let record = record.with_subject("alice");
        assert_eq!(record.identity(), Some("alice"));
        assert_eq!(record.spectrum_name(), "alice_7");
        assert_eq!(record.lens, "x10");
    }

    #[test]
    fn record_maps_to_spectrum_and_back() {
        let record = finger().with_subject("alice");
        let spectrum = record.to_spectrum(None).unwrap();
        assert_eq!(spectrum.name, "alice_7");
        assert_eq!(spectrum.exposure(), 60);
        assert_eq!(spectrum.acquisition.grating, Some(600));
        assert_eq!(spectrum.y(), &[4.0, 5.0, 6.0]);

        let back = MeasurementRecord::from_spectrum(RecordKind::Reference, &spectrum).unwrap();
        assert_eq!(back.raman_shift, record.raman_shift);
        assert_eq!(back.timestamp, record.timestamp);
        assert_eq!(back.identity(), Some("alice_7"));
    }

    #[test]
    fn invalid_arrays_are_rejected() {
        let mut record = finger();
        record.intensity.pop();
        assert!(matches!(
            record.to_spectrum(None),
            Err(SpectrumError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn serializes_with_snake_case_kind() {
        let json = serde_json::to_value(finger()).unwrap();
        assert_eq!(json["kind"], "finger");
        assert_eq!(json["timestamp"], "2024-03-19T08:31:34");
        let back: MeasurementRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, finger());
    }
}
