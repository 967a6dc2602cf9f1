//! Signal processing applied to resampled spectra: despiking and EMSC
//! baseline correction.

pub mod despike;
pub mod emsc;
pub mod lstsq;
