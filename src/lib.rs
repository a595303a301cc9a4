//! # Scholar Harvest
//!
//! Scrapes Google Scholar search results into an on-disk cache, one file per
//! result grouped by query, and exports the cache as JSON, CSV and BibTeX.
//!
//! ## Architecture
//!
//! The two stages only share the cache directory:
//!
//! - [`harvest`]: the scraper, driving a [`sources::ScholarSource`] over the
//!   configured queries and writing a progress marker at the end
//! - [`export`]: the exporter, turning cached records into flat metadata
//! - [`models`]: cached publications and the progress marker
//! - [`sources`]: search providers behind a trait
//! - [`utils`]: record cache, BibTeX, HTTP client
//! - [`config`]: configuration loading

pub mod config;
pub mod export;
pub mod harvest;
pub mod models;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use export::{ExportOutputs, Exporter, MetadataEntry};
pub use harvest::Harvester;
pub use models::{ProgressMarker, Publication};
pub use sources::{GoogleScholarSource, ScholarSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
