//! Raman spectrum processing for glucose measurement.
//!
//! [`Spectrum`] holds one measurement and its combination algebra,
//! [`data::spline`] resamples spectra onto a common grid, and [`Emsc`]
//! separates an analyte signal from references and a polynomial baseline.

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod processing;

pub use data::model::{Acquisition, Spectrum, SpectrumSet};
pub use error::{RecordError, SpectrumError};
pub use processing::despike::{Despiker, RollingMedianDespiker, WindowLength};
pub use processing::emsc::{Emsc, ReferenceRole};
