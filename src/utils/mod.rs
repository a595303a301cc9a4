//! Utility modules supporting the scraper and the exporter.
//!
//! - [`RecordCache`]: per-query directory of cached publications
//! - [`format_entry`] / [`parse_entry`]: BibTeX writing and reading
//! - [`HttpClient`]: shared HTTP client with browser-like defaults
//!
//! # BibTeX
//!
//! ```rust
//! use scholar_harvest::models::PublicationBuilder;
//! use scholar_harvest::utils::format_entry;
//!
//! let publication = PublicationBuilder::new("X").bib("bib_id", "smith2020").build();
//! assert_eq!(format_entry(&publication), "@article{smith2020,\n  title = {X},\n}\n\n");
//! ```

mod bibtex;
mod cache;
mod http;

pub use bibtex::{format_entry, parse_entry, BibtexEntry, BibtexError, MISSING_KEY};
pub use cache::{to_json_pretty, CacheError, RecordCache, CACHE_EXTENSION};
pub(crate) use cache::{read_json_file, write_json_file};
pub use http::{HttpClient, BROWSER_USER_AGENT};
