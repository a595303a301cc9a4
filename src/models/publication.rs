//! Publication model representing one cached Google Scholar result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which the citation key is stored inside [`BibFields`]
pub const BIB_ID_KEY: &str = "bib_id";

/// Insertion-ordered bibliographic fields (`title`, `author`, `pub_year`, ...)
///
/// Values are kept as raw JSON so that whatever shape the provider returned
/// (a string, a list of authors, a number) survives the cache unchanged.
/// Field order is significant: it is the order of the lines in the
/// generated BibTeX entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BibFields(Map<String, Value>);

impl BibFields {
    /// Create an empty field set
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Insert or replace a field, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw value of a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Field rendered as text, see [`value_to_text`]
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(value_to_text)
    }

    /// The citation key, if the record has one
    pub fn bib_id(&self) -> Option<String> {
        self.text(BIB_ID_KEY)
    }

    /// Iterate over fields in stored order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for BibFields {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Render a JSON value as plain text.
///
/// Strings are returned verbatim, arrays of strings are joined with `" and "`
/// (the BibTeX author separator), `null` becomes an empty string and anything
/// else is rendered as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" and "),
        other => other.to_string(),
    }
}

/// A single search result as returned by the provider and stored in the cache
///
/// Known keys are typed and optional; anything else the provider sends is
/// kept in `extra` so the cached file is a faithful copy of the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Bibliographic fields (title, author, venue, pub_year, abstract, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bib: Option<BibFields>,

    /// Whether the detail fetch has completed for this record
    #[serde(default)]
    pub filled: bool,

    /// Rank of the result on the search page (1-based)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsrank: Option<u32>,

    /// Publisher page for the paper
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_url: Option<String>,

    /// Google Scholar cluster id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    /// Number of citations reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_citations: Option<u64>,

    /// Link to the list of citing papers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citedby_url: Option<String>,

    /// Link to the citation export page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_scholarbib: Option<String>,

    /// Direct link to a full-text copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eprint_url: Option<String>,

    /// Query (cache directory) the record was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Provider keys without a typed field
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Publication {
    /// Create a publication from its bibliographic fields
    pub fn new(bib: BibFields) -> Self {
        Self {
            bib: Some(bib),
            ..Default::default()
        }
    }

    /// Read a bibliographic field as text
    pub fn bib_text(&self, key: &str) -> Option<String> {
        self.bib.as_ref().and_then(|bib| bib.text(key))
    }

    /// Title, if present
    pub fn title(&self) -> Option<String> {
        self.bib_text("title")
    }
}

/// Builder for constructing Publication objects
#[derive(Debug, Clone, Default)]
pub struct PublicationBuilder {
    publication: Publication,
}

impl PublicationBuilder {
    /// Create a new builder with a title
    pub fn new(title: impl Into<String>) -> Self {
        let mut bib = BibFields::new();
        bib.insert("title", title.into());
        Self {
            publication: Publication::new(bib),
        }
    }

    /// Set a bibliographic field
    pub fn bib(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.publication
            .bib
            .get_or_insert_with(BibFields::new)
            .insert(key, value);
        self
    }

    /// Set authors as a list
    pub fn authors<I, S>(self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list: Vec<Value> = authors
            .into_iter()
            .map(|a| Value::String(a.into()))
            .collect();
        self.bib("author", Value::Array(list))
    }

    /// Set the search rank
    pub fn gsrank(mut self, rank: u32) -> Self {
        self.publication.gsrank = Some(rank);
        self
    }

    /// Set the publisher URL
    pub fn pub_url(mut self, url: impl Into<String>) -> Self {
        self.publication.pub_url = Some(url.into());
        self
    }

    /// Set the cluster id
    pub fn cluster_id(mut self, id: impl Into<String>) -> Self {
        self.publication.cluster_id = Some(id.into());
        self
    }

    /// Set citation count
    pub fn citations(mut self, count: u64) -> Self {
        self.publication.num_citations = Some(count);
        self
    }

    /// Set the cited-by link
    pub fn citedby_url(mut self, url: impl Into<String>) -> Self {
        self.publication.citedby_url = Some(url.into());
        self
    }

    /// Set the citation export link
    pub fn url_scholarbib(mut self, url: impl Into<String>) -> Self {
        self.publication.url_scholarbib = Some(url.into());
        self
    }

    /// Set the full-text link
    pub fn eprint_url(mut self, url: impl Into<String>) -> Self {
        self.publication.eprint_url = Some(url.into());
        self
    }

    /// Add extra provider metadata
    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.publication.extra.insert(key.into(), value);
        self
    }

    /// Build the Publication
    pub fn build(self) -> Publication {
        self.publication
    }
}
