use chrono::NaiveDateTime;

use super::record::{MeasurementRecord, RecordKind};

// ---------------------------------------------------------------------------
// Filter predicate: which records a query selects
// ---------------------------------------------------------------------------

/// Per-field record selection. A field left at `None` means "no filter".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub identity: Option<String>,
    pub exposure: Option<u32>,
    pub grating: Option<u32>,
    pub laser: Option<u32>,
    /// Inclusive lower bound on the timestamp.
    pub from: Option<NaiveDateTime>,
    /// Inclusive upper bound on the timestamp.
    pub to: Option<NaiveDateTime>,
}

impl RecordFilter {
    /// All finger records of one subject.
    pub fn subject(subject_id: &str) -> Self {
        RecordFilter {
            kind: Some(RecordKind::Finger),
            identity: Some(subject_id.to_string()),
            ..RecordFilter::default()
        }
    }

    /// A record passes when every active field matches.
    pub fn matches(&self, record: &MeasurementRecord) -> bool {
        fn check<T: PartialEq>(wanted: &Option<T>, value: T) -> bool {
            wanted.as_ref().map_or(true, |w| *w == value)
        }

        if let Some(identity) = &self.identity {
            if record.identity() != Some(identity.as_str()) {
                return false;
            }
        }
        if self.from.is_some_and(|from| record.timestamp < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.timestamp > to) {
            return false;
        }
        check(&self.kind, record.kind)
            && check(&self.exposure, record.exposure)
            && check(&self.grating, record.grating)
            && check(&self.laser, record.laser)
    }
}

/// Return indices of records that pass the filter.
pub fn filtered_indices(records: &[MeasurementRecord], filter: &RecordFilter) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, record)| filter.matches(record))
        .map(|(i, _)| i)
        .collect()
}
