use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, Int64Array, LargeListArray, ListArray,
    ListBuilder, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::filter::{filtered_indices, RecordFilter};
use super::record::{MeasurementRecord, RecordKind};
use crate::error::RecordError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ---------------------------------------------------------------------------
// RecordStore – measurement records keyed by (identity, timestamp)
// ---------------------------------------------------------------------------

/// In-memory collection of measurement records with a unique
/// `(kind, identity, timestamp)` key, persisted to JSON or Parquet files.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<MeasurementRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Add a new record. Fails on a duplicate key or a finger record
    /// without a subject.
    pub fn insert(&mut self, record: MeasurementRecord) -> Result<(), RecordError> {
        let identity = identity_of(&record)?;
        if self.position(record.kind, identity, &record.timestamp).is_some() {
            return Err(RecordError::DuplicateKey {
                identity: identity.to_string(),
                timestamp: record.timestamp.to_string(),
            });
        }
        log::debug!(
            "inserting {} record `{identity}` at {}",
            record.kind.as_str(),
            record.timestamp
        );
        self.records.push(record);
        Ok(())
    }

    /// Insert, or replace the record with the same key.
    pub fn upsert(&mut self, record: MeasurementRecord) -> Result<(), RecordError> {
        let identity = identity_of(&record)?;
        match self.position(record.kind, identity, &record.timestamp) {
            Some(i) => self.records[i] = record,
            None => self.records.push(record),
        }
        Ok(())
    }

    pub fn get(
        &self,
        kind: RecordKind,
        identity: &str,
        timestamp: &NaiveDateTime,
    ) -> Option<&MeasurementRecord> {
        self.position(kind, identity, timestamp)
            .map(|i| &self.records[i])
    }

    pub fn remove(
        &mut self,
        kind: RecordKind,
        identity: &str,
        timestamp: &NaiveDateTime,
    ) -> Option<MeasurementRecord> {
        self.position(kind, identity, timestamp)
            .map(|i| self.records.remove(i))
    }

    pub fn query(&self, filter: &RecordFilter) -> Vec<&MeasurementRecord> {
        filtered_indices(&self.records, filter)
            .into_iter()
            .map(|i| &self.records[i])
            .collect()
    }

    /// Finger records of one subject, oldest first.
    pub fn by_subject(&self, subject_id: &str) -> Vec<&MeasurementRecord> {
        let mut records = self.query(&RecordFilter::subject(subject_id));
        records.sort_by_key(|r| r.timestamp);
        records
    }

    fn position(&self, kind: RecordKind, identity: &str, timestamp: &NaiveDateTime) -> Option<usize> {
        self.records.iter().position(|r| {
            r.kind == kind && r.identity() == Some(identity) && r.timestamp == *timestamp
        })
    }

    fn from_records(records: Vec<MeasurementRecord>) -> Result<Self> {
        let mut store = RecordStore::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    // -- JSON --

    /// Load a store written by [`RecordStore::save_json`]. Duplicate keys
    /// in the file are an error.
    pub fn load_json(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let records: Vec<MeasurementRecord> =
            serde_json::from_str(&text).context("parsing record JSON")?;
        let store = Self::from_records(records)?;
        log::info!("loaded {} records from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.records).context("serializing records")?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    // -- Parquet --

    pub fn save_parquet(&self, path: &Path) -> Result<()> {
        let batch = records_to_batch(&self.records)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        let mut writer =
            ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
        writer.write(&batch).context("writing record batch")?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    }

    pub fn load_parquet(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).context("opening parquet file")?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
        let reader = builder.build().context("building parquet reader")?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result.context("reading parquet record batch")?;
            records.extend(batch_to_records(&batch)?);
        }
        let store = Self::from_records(records)?;
        log::info!("loaded {} records from {}", store.len(), path.display());
        Ok(store)
    }
}

fn identity_of(record: &MeasurementRecord) -> Result<&str, RecordError> {
    record.identity().ok_or(RecordError::MissingField("subject_id"))
}

// ---------------------------------------------------------------------------
// Arrow conversion
// ---------------------------------------------------------------------------

fn list_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )
}

fn record_schema() -> Schema {
    Schema::new(vec![
        Field::new("kind", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("subject_id", DataType::Utf8, true),
        Field::new("glucose", DataType::Float64, true),
        Field::new("grating", DataType::Int64, false),
        Field::new("laser", DataType::Int64, false),
        Field::new("exposure", DataType::Int64, false),
        Field::new("accumulation", DataType::Int64, false),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("lens", DataType::Utf8, false),
        Field::new("power", DataType::Float64, false),
        Field::new("slit", DataType::Float64, true),
        list_field("raman_shift"),
        list_field("intensity"),
    ])
}

fn list_array<'a>(rows: impl Iterator<Item = &'a Vec<f64>>) -> ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    builder.finish()
}

fn records_to_batch(records: &[MeasurementRecord]) -> Result<RecordBatch> {
    let int_column = |f: fn(&MeasurementRecord) -> u32| -> ArrayRef {
        Arc::new(Int64Array::from(
            records.iter().map(|r| i64::from(f(r))).collect::<Vec<_>>(),
        ))
    };
    let timestamps: Vec<String> = records
        .iter()
        .map(|r| r.timestamp.format(TIMESTAMP_FORMAT).to_string())
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            records.iter().map(|r| r.kind.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            records
                .iter()
                .map(|r| r.subject_id.as_deref())
                .collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.glucose).collect::<Vec<_>>(),
        )),
        int_column(|r| r.grating),
        int_column(|r| r.laser),
        int_column(|r| r.exposure),
        int_column(|r| r.accumulation),
        Arc::new(StringArray::from(
            timestamps.iter().map(String::as_str).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.lens.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.power).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            records.iter().map(|r| r.slit).collect::<Vec<_>>(),
        )),
        Arc::new(list_array(records.iter().map(|r| &r.raman_shift))),
        Arc::new(list_array(records.iter().map(|r| &r.intensity))),
    ];

    RecordBatch::try_new(Arc::new(record_schema()), columns).context("building record batch")
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow!("Parquet file missing '{name}' column"))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("column '{name}' has unexpected type"))
}

fn optional<T>(array: &dyn Array, row: usize, value: impl FnOnce() -> T) -> Option<T> {
    if array.is_null(row) {
        None
    } else {
        Some(value())
    }
}

fn to_u32(array: &Int64Array, row: usize, name: &str) -> Result<u32> {
    u32::try_from(array.value(row)).with_context(|| format!("Row {row}: '{name}' out of range"))
}

fn batch_to_records(batch: &RecordBatch) -> Result<Vec<MeasurementRecord>> {
    let kind = column::<StringArray>(batch, "kind")?;
    let name = column::<StringArray>(batch, "name")?;
    let subject_id = column::<StringArray>(batch, "subject_id")?;
    let glucose = column::<Float64Array>(batch, "glucose")?;
    let grating = column::<Int64Array>(batch, "grating")?;
    let laser = column::<Int64Array>(batch, "laser")?;
    let exposure = column::<Int64Array>(batch, "exposure")?;
    let accumulation = column::<Int64Array>(batch, "accumulation")?;
    let timestamp = column::<StringArray>(batch, "timestamp")?;
    let lens = column::<StringArray>(batch, "lens")?;
    let power = column::<Float64Array>(batch, "power")?;
    let slit = column::<Float64Array>(batch, "slit")?;
    let raman_shift = batch.column(batch.schema().index_of("raman_shift")?).clone();
    let intensity = batch.column(batch.schema().index_of("intensity")?).clone();

    (0..batch.num_rows())
        .map(|row| -> Result<MeasurementRecord> {
            Ok(MeasurementRecord {
                kind: kind.value(row).parse()?,
                name: name.value(row).to_string(),
                subject_id: optional(subject_id, row, || subject_id.value(row).to_string()),
                glucose: optional(glucose, row, || glucose.value(row)),
                grating: to_u32(grating, row, "grating")?,
                laser: to_u32(laser, row, "laser")?,
                exposure: to_u32(exposure, row, "exposure")?,
                accumulation: to_u32(accumulation, row, "accumulation")?,
                timestamp: NaiveDateTime::parse_from_str(timestamp.value(row), TIMESTAMP_FORMAT)
                    .with_context(|| format!("Row {row}: invalid timestamp"))?,
                lens: lens.value(row).to_string(),
                power: power.value(row),
                slit: optional(slit, row, || slit.value(row)),
                raman_shift: extract_f64_list(&raman_shift, row)
                    .with_context(|| format!("Row {row}: failed to read 'raman_shift'"))?,
                intensity: extract_f64_list(&intensity, row)
                    .with_context(|| format!("Row {row}: failed to read 'intensity'"))?,
            })
        })
        .collect()
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .context("expected ListArray")?
            .value(row),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .context("expected LargeListArray")?
            .value(row),
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    let values = values_array
        .as_any()
        .downcast_ref::<Float64Array>()
        .with_context(|| {
            format!(
                "List inner type is {:?}, expected Float64",
                values_array.data_type()
            )
        })?;
    Ok(values.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 19)
            .unwrap()
            .and_hms_opt(hour, 31, 34)
            .unwrap()
    }

    fn finger(subject: Option<&str>, hour: u32) -> MeasurementRecord {
        MeasurementRecord {
            kind: RecordKind::Finger,
            name: "0".to_string(),
            subject_id: subject.map(str::to_string),
            glucose: Some(104.0),
            grating: 600,
            laser: 785,
            exposure: 60,
            accumulation: 1,
            timestamp: at(hour),
            lens: "x10".to_string(),
            power: 7.0,
            slit: None,
            raman_shift: vec![400.0, 401.0, 402.0],
            intensity: vec![1.0, 2.5, 1.5],
        }
    }

    fn reference(hour: u32) -> MeasurementRecord {
        MeasurementRecord {
            kind: RecordKind::Reference,
            name: "glucose".to_string(),
            subject_id: None,
            glucose: None,
            slit: Some(0.1),
            ..finger(None, hour)
        }
    }

    #[test]
    fn insert_rejects_duplicates_and_missing_subject() {
        let mut store = RecordStore::new();
        store.insert(finger(Some("alice"), 8)).unwrap();
        assert!(matches!(
            store.insert(finger(Some("alice"), 8)),
            Err(RecordError::DuplicateKey { .. })
        ));
        assert_eq!(
            store.insert(finger(None, 9)),
            Err(RecordError::MissingField("subject_id"))
        );
        store.insert(finger(Some("alice"), 9)).unwrap();
        store.insert(reference(8)).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn upsert_replaces_and_remove_deletes() {
        let mut store = RecordStore::new();
        store.insert(finger(Some("alice"), 8)).unwrap();
        let mut updated = finger(Some("alice"), 8);
        updated.glucose = Some(140.0);
        store.upsert(updated).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store
                .get(RecordKind::Finger, "alice", &at(8))
                .and_then(|r| r.glucose),
            Some(140.0)
        );
        assert!(store.remove(RecordKind::Finger, "alice", &at(8)).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn by_subject_sorts_by_time() {
        let mut store = RecordStore::new();
        store.insert(finger(Some("alice"), 10)).unwrap();
        store.insert(finger(Some("bob"), 9)).unwrap();
        store.insert(finger(Some("alice"), 8)).unwrap();
        let hours: Vec<_> = store
            .by_subject("alice")
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(hours, vec![at(8), at(10)]);
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut store = RecordStore::new();
        store.insert(finger(Some("alice"), 8)).unwrap();
        store.insert(reference(8)).unwrap();
        store.save_json(&path).unwrap();

        let loaded = RecordStore::load_json(&path).unwrap();
        assert_eq!(loaded.records(), store.records());
    }

    #[test]
    fn parquet_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.parquet");
        let mut store = RecordStore::new();
        store.insert(finger(Some("alice"), 8)).unwrap();
        store.insert(reference(9)).unwrap();
        store.save_parquet(&path).unwrap();

        let loaded = RecordStore::load_parquet(&path).unwrap();
        assert_eq!(loaded.records(), store.records());
    }
}
