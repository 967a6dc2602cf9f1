//! Data layer: measurement model, resampling, ingestion and persistence.
//!
//! Architecture:
//! ```text
//!  *_600_785 nm_60 s_1_..._01.txt
//!        │
//!        ▼
//!   ┌──────────┐    ┌──────────┐
//!   │  loader   │───▶│  naming   │  file name → acquisition metadata
//!   └──────────┘    └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐    ┌──────────┐
//!   │  model    │───▶│  spline   │  Spectrum, resampled onto a uniform grid
//!   └──────────┘    └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐    ┌──────────┐
//!   │  record   │◀──▶│  store    │  flat records, JSON / Parquet, filter
//!   └──────────┘    └──────────┘
//! ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod naming;
pub mod record;
pub mod spline;
pub mod store;
