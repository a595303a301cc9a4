//! Core data models for cached publications and scrape progress.

mod progress;
mod publication;

pub use progress::{ProgressMarker, NO_ERROR, NO_INDEX};
pub use publication::{value_to_text, BibFields, Publication, PublicationBuilder, BIB_ID_KEY};
