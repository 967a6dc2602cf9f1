use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

// ---------------------------------------------------------------------------
// File name schema
// ---------------------------------------------------------------------------

/// One `_`-delimited segment of a measurement file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameField {
    /// Free text identity.
    Name,
    /// Integer measurement id.
    Id,
    /// `"<glucose>-<name>"`, e.g. `128-blood`.
    GlucoseName,
    Lens,
    /// Decimal written with `-`, e.g. `0-42`.
    Power,
    /// Decimal written with `-`.
    Slit,
    Grating,
    /// Number followed by a unit, e.g. `785 nm`.
    Laser,
    /// Number followed by a unit, e.g. `60 s`.
    Exposure,
    Accumulation,
    Year,
    Month,
    Date,
    Hour,
    Minute,
    Second,
    /// Ignored segment (the trailing `01` counter).
    Skip,
}

/// Ordered list of fields a file name is split into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileNameSchema(pub Vec<NameField>);

const TIMESTAMP: [NameField; 6] = [
    NameField::Year,
    NameField::Month,
    NameField::Date,
    NameField::Hour,
    NameField::Minute,
    NameField::Second,
];

impl FileNameSchema {
    fn with_prefix(prefix: &[NameField]) -> Self {
        let mut fields = prefix.to_vec();
        fields.extend([
            NameField::Grating,
            NameField::Laser,
            NameField::Exposure,
            NameField::Accumulation,
        ]);
        fields.extend(TIMESTAMP);
        fields.push(NameField::Skip);
        FileNameSchema(fields)
    }

    /// `silicon-down_600_785 nm_90 s_1_2024_11_19_16_41_27_01`
    pub fn sample() -> Self {
        Self::with_prefix(&[NameField::Name])
    }

    /// `0_600_785 nm_60 s_1_2024_03_19_08_31_34_01`
    pub fn finger() -> Self {
        Self::with_prefix(&[NameField::Id])
    }

    /// `glucose_600_785 nm_60 s_1_2024_03_19_08_31_34_01`
    pub fn reference() -> Self {
        Self::sample()
    }

    /// `128-blood_macro_0-42_0-10_600_785 nm_60 s_5_2025_06_09_19_53_53_01`
    pub fn blood() -> Self {
        Self::with_prefix(&[
            NameField::GlucoseName,
            NameField::Lens,
            NameField::Power,
            NameField::Slit,
        ])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for FileNameSchema {
    fn default() -> Self {
        Self::sample()
    }
}

// ---------------------------------------------------------------------------
// Parsed file name
// ---------------------------------------------------------------------------

/// Metadata decoded from a file name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    pub name: Option<String>,
    pub id: Option<i64>,
    pub glucose: Option<f64>,
    pub lens: Option<String>,
    pub power: Option<f64>,
    pub slit: Option<f64>,
    pub grating: Option<u32>,
    pub laser: Option<u32>,
    pub exposure: Option<u32>,
    pub accumulation: Option<u32>,
    pub timestamp: NaiveDateTime,
}

/// Decode `file_name` (extension optional) with `schema`.
pub fn parse(file_name: &str, schema: &FileNameSchema) -> Result<ParsedName, RecordError> {
    let stem = file_name
        .rsplit_once('.')
        .filter(|(_, ext)| !ext.contains(' ') && !ext.contains('_'))
        .map_or(file_name, |(stem, _)| stem);
    let segments: Vec<&str> = stem.split('_').collect();
    if segments.len() != schema.len() {
        return Err(RecordError::SchemaMismatch {
            file_name: file_name.to_string(),
            expected: schema.len(),
            found: segments.len(),
        });
    }

    let mut parsed = ParsedNameBuilder::default();
    for (field, value) in schema.0.iter().zip(segments) {
        match field {
            NameField::Name => parsed.name = Some(value.to_string()),
            NameField::Id => parsed.id = Some(parse_number("id", value)?),
            NameField::GlucoseName => {
                let (glucose, name) = value.split_once('-').ok_or_else(|| RecordError::InvalidField {
                    field: "glucose_name",
                    value: value.to_string(),
                })?;
                parsed.glucose = Some(parse_number("glucose", glucose)?);
                parsed.name = Some(name.to_string());
            }
            NameField::Lens => parsed.lens = Some(value.to_string()),
            NameField::Power => parsed.power = Some(parse_dashed_decimal("power", value)?),
            NameField::Slit => parsed.slit = Some(parse_dashed_decimal("slit", value)?),
            NameField::Grating => parsed.grating = Some(parse_number("grating", value)?),
            NameField::Laser => parsed.laser = Some(parse_with_unit("laser", value)?),
            NameField::Exposure => parsed.exposure = Some(parse_with_unit("exposure", value)?),
            NameField::Accumulation => {
                parsed.accumulation = Some(parse_number("accumulation", value)?)
            }
            NameField::Year
            | NameField::Month
            | NameField::Date
            | NameField::Hour
            | NameField::Minute
            | NameField::Second => parsed.timestamp.push((*field, value)),
            NameField::Skip => {}
        }
    }
    parsed.finish()
}

#[derive(Default)]
struct ParsedNameBuilder<'a> {
    name: Option<String>,
    id: Option<i64>,
    glucose: Option<f64>,
    lens: Option<String>,
    power: Option<f64>,
    slit: Option<f64>,
    grating: Option<u32>,
    laser: Option<u32>,
    exposure: Option<u32>,
    accumulation: Option<u32>,
    timestamp: Vec<(NameField, &'a str)>,
}

impl ParsedNameBuilder<'_> {
    fn finish(self) -> Result<ParsedName, RecordError> {
        // Components are concatenated in calendar order regardless of where
        // the schema places them.
        let mut digits = String::with_capacity(14);
        for component in TIMESTAMP {
            let (_, value) = self
                .timestamp
                .iter()
                .find(|(f, _)| *f == component)
                .ok_or(RecordError::MissingField("timestamp"))?;
            digits.push_str(value);
        }
        let timestamp = NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S").map_err(|_| {
            RecordError::InvalidField {
                field: "timestamp",
                value: digits.clone(),
            }
        })?;

        Ok(ParsedName {
            name: self.name,
            id: self.id,
            glucose: self.glucose,
            lens: self.lens,
            power: self.power,
            slit: self.slit,
            grating: self.grating,
            laser: self.laser,
            exposure: self.exposure,
            accumulation: self.accumulation,
            timestamp,
        })
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, RecordError> {
    value.trim().parse().map_err(|_| RecordError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// `"785 nm"` → 785
fn parse_with_unit(field: &'static str, value: &str) -> Result<u32, RecordError> {
    let number = value.split(' ').next().unwrap_or(value);
    parse_number(field, number)
}

/// `"0-42"` → 0.42
fn parse_dashed_decimal(field: &'static str, value: &str) -> Result<f64, RecordError> {
    parse_number(field, &value.replace('-', "."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn parses_sample_name() {
        let parsed = parse(
            "silicon-down_600_785 nm_90 s_1_2024_11_19_16_41_27_01.txt",
            &FileNameSchema::sample(),
        )
        .unwrap();
        assert_eq!(parsed.name.as_deref(), Some("silicon-down"));
        assert_eq!(parsed.grating, Some(600));
        assert_eq!(parsed.laser, Some(785));
        assert_eq!(parsed.exposure, Some(90));
        assert_eq!(parsed.accumulation, Some(1));
        assert_eq!(parsed.timestamp, at(2024, 11, 19, 16, 41, 27));
    }

    #[test]
    fn parses_finger_name() {
        let parsed = parse(
            "24_600_785 nm_60 s_1_2024_03_19_10_30_09_01",
            &FileNameSchema::finger(),
        )
        .unwrap();
        assert_eq!(parsed.id, Some(24));
        assert_eq!(parsed.name, None);
        assert_eq!(parsed.timestamp, at(2024, 3, 19, 10, 30, 9));
    }

    #[test]
    fn parses_blood_name() {
        let parsed = parse(
            "128-blood_macro_0-42_0-10_600_785 nm_60 s_5_2025_06_09_19_53_53_01.txt",
            &FileNameSchema::blood(),
        )
        .unwrap();
        assert_eq!(parsed.glucose, Some(128.0));
        assert_eq!(parsed.name.as_deref(), Some("blood"));
        assert_eq!(parsed.lens.as_deref(), Some("macro"));
        assert_eq!(parsed.power, Some(0.42));
        assert_eq!(parsed.slit, Some(0.10));
        assert_eq!(parsed.accumulation, Some(5));
    }

    #[test]
    fn rejects_wrong_segment_count() {
        let err = parse("glucose_600_785 nm.txt", &FileNameSchema::reference()).unwrap_err();
        assert_eq!(
            err,
            RecordError::SchemaMismatch {
                file_name: "glucose_600_785 nm.txt".to_string(),
                expected: 12,
                found: 3,
            }
        );
    }

    #[test]
    fn rejects_bad_numbers_and_dates() {
        let err = parse(
            "x_six_785 nm_60 s_1_2024_03_19_10_30_09_01",
            &FileNameSchema::sample(),
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::InvalidField { field: "grating", .. }));

        let err = parse(
            "x_600_785 nm_60 s_1_2024_13_19_10_30_09_01",
            &FileNameSchema::sample(),
        )
        .unwrap_err();
        assert!(matches!(err, RecordError::InvalidField { field: "timestamp", .. }));
    }

    #[test]
    fn missing_date_component_is_reported() {
        let schema = FileNameSchema(vec![NameField::Name, NameField::Year]);
        assert_eq!(
            parse("x_2024", &schema).unwrap_err(),
            RecordError::MissingField("timestamp")
        );
    }

    #[test]
    fn schema_deserializes_from_field_names() {
        let schema: FileNameSchema =
            serde_json::from_str(r#"["name", "exposure", "year", "skip"]"#).unwrap();
        assert_eq!(
            schema.0,
            vec![NameField::Name, NameField::Exposure, NameField::Year, NameField::Skip]
        );
    }
}
