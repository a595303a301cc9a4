//! Mock source for testing purposes.

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{Publication, PublicationBuilder};
use crate::sources::{PublicationStream, ScholarSource, SourceError};

/// A mock source for testing that returns predefined results.
///
/// Queries without configured results yield an empty stream. A query
/// registered with [`MockSource::fail_on`] yields its configured results
/// and then an error.
#[derive(Debug, Default)]
pub struct MockSource {
    results: Mutex<HashMap<String, Vec<Publication>>>,
    failures: Mutex<HashMap<String, String>>,
    fill_calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the results returned for a query.
    pub fn set_results(&self, query: &str, publications: Vec<Publication>) {
        let mut guard = self.results.lock().unwrap();
        guard.insert(query.to_string(), publications);
    }

    /// Make the search stream for `query` end with an error.
    pub fn fail_on(&self, query: &str, message: &str) {
        let mut guard = self.failures.lock().unwrap();
        guard.insert(query.to_string(), message.to_string());
    }

    /// Number of `fill` calls made so far.
    pub fn fill_calls(&self) -> usize {
        self.fill_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScholarSource for MockSource {
    fn name(&self) -> &str {
        "Mock Source"
    }

    fn search<'a>(&'a self, query: &'a str) -> PublicationStream<'a> {
        let results = self
            .results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        let failure = self.failures.lock().unwrap().get(query).cloned();

        let items = results
            .into_iter()
            .map(Ok)
            .chain(failure.map(|msg| Err(SourceError::Api(msg))));
        stream::iter(items).boxed()
    }

    async fn fill(&self, mut publication: Publication) -> Result<Publication, SourceError> {
        self.fill_calls.fetch_add(1, Ordering::SeqCst);
        publication.filled = true;
        Ok(publication)
    }
}

/// Helper function to create a mock publication for testing.
pub fn make_publication(bib_id: &str, title: &str) -> Publication {
    PublicationBuilder::new(title)
        .bib("bib_id", bib_id)
        .authors(["Ada Lovelace", "Charles Babbage"])
        .bib("pub_year", "1843")
        .pub_url(format!("http://example.com/{}", bib_id))
        .citations(7)
        .build()
}
