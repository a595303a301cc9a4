//! Academic search providers.
//!
//! A provider implements [`ScholarSource`]: a lazy stream of search results
//! per query and a `fill` operation that completes one result with its full
//! bibliographic detail. Both are network-bound and outside our control, so
//! the harvester only ever talks to this trait.
//!
//! - [`GoogleScholarSource`]: scrapes scholar.google.com
//! - [`MockSource`]: canned results for tests

mod google_scholar;
pub mod mock;

pub use google_scholar::GoogleScholarSource;
pub use mock::MockSource;

use crate::models::Publication;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Lazily produced search results
pub type PublicationStream<'a> = BoxStream<'a, Result<Publication, SourceError>>;

/// Interface of an academic search provider.
#[async_trait]
pub trait ScholarSource: Send + Sync + std::fmt::Debug {
    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Search for publications matching `query`.
    ///
    /// Results are fetched page by page as the stream is polled.
    fn search<'a>(&'a self, query: &'a str) -> PublicationStream<'a>;

    /// Fetch the full detail of a search result
    async fn fill(&self, publication: Publication) -> Result<Publication, SourceError>;
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Parsing error (HTML, BibTeX, JSON)
    #[error("Parse error: {0}")]
    Parse(String),

    /// The provider refused to serve more requests (429 or captcha page)
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Publication not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// API error from the source
    #[error("API error: {0}")]
    Api(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Network(err.to_string())
    }
}

impl From<crate::utils::BibtexError> for SourceError {
    fn from(err: crate::utils::BibtexError) -> Self {
        SourceError::Parse(format!("BibTeX: {}", err))
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::RateLimit("captcha".to_string());
        assert_eq!(err.to_string(), "Rate limit exceeded: captcha");

        let err: SourceError = serde_json::from_str::<u32>("x").unwrap_err().into();
        assert!(matches!(err, SourceError::Parse(_)));
    }
}
