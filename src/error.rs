use thiserror::Error;

/// Failures raised by the spectral core (spectrum algebra, resampling, EMSC).
///
/// Every variant is raised before any state is modified, so a failed call
/// leaves its receiver untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    #[error("shape mismatch: {what} has {found} values, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("raman shift ranges differ between `{left}` and `{right}`")]
    RangeMismatch { left: String, right: String },

    #[error("exposure differs between operands ({left} s vs {right} s)")]
    ExposureMismatch { left: u32, right: u32 },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("raman shift is not strictly increasing at index {index}")]
    NotMonotonic { index: usize },

    #[error("the model has not been fitted yet")]
    NotFitted,

    #[error("singular model: {0}")]
    SingularModel(String),
}

/// Failures raised while mapping file names and persistence records.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("file name schema has {expected} fields but `{file_name}` splits into {found}")]
    SchemaMismatch {
        file_name: String,
        expected: usize,
        found: usize,
    },

    #[error("field `{field}` cannot be parsed from `{value}`")]
    InvalidField { field: &'static str, value: String },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("duplicate entry for `{identity}` at {timestamp}")]
    DuplicateKey { identity: String, timestamp: String },

    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
}

pub type Result<T, E = SpectrumError> = std::result::Result<T, E>;
