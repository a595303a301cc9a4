//! Google Scholar research source implementation.
//!
//! Google Scholar does not have an official public API. Search result pages
//! are scraped, and the full record of a result is obtained from the
//! citation export link (BibTeX) of its cluster. Aggressive use gets the
//! client blocked with a captcha page; callers are expected to pace requests.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::Arc;

use crate::models::{BibFields, Publication, PublicationBuilder};
use crate::sources::{PublicationStream, ScholarSource, SourceError};
use crate::utils::{parse_entry, BibtexEntry, HttpClient};

const GOOGLE_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Results per search page
const PAGE_SIZE: usize = 10;

/// Google Scholar research source
#[derive(Debug, Clone)]
pub struct GoogleScholarSource {
    client: Arc<HttpClient>,
    base_url: String,
    patterns: Patterns,
}

#[derive(Debug, Clone)]
struct Patterns {
    /// `[PDF]`, `[HTML]`, `[CITATION][C]` prefixes in result titles
    title_tags: Regex,
    year: Regex,
    cited_by: Regex,
}

impl Patterns {
    fn new() -> Result<Self, SourceError> {
        let compile = |re: &str| {
            Regex::new(re).map_err(|e| SourceError::Other(format!("bad pattern {}: {}", re, e)))
        };
        Ok(Self {
            title_tags: compile(r"^(\s*\[[^\]]+\])+\s*")?,
            year: compile(r"\b(1[5-9]\d{2}|20\d{2})\b")?,
            cited_by: compile(r"Cited by (\d+)")?,
        })
    }
}

/// One parsed search page
struct ResultsPage {
    publications: Vec<Publication>,
    has_next: bool,
}

impl GoogleScholarSource {
    pub fn new() -> Result<Self, SourceError> {
        Self::with_base_url(GOOGLE_SCHOLAR_URL)
    }

    /// Point the source at another host (a mirror or a test server)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            patterns: Patterns::new()?,
        })
    }

    fn search_url(&self, query: &str, start: usize) -> String {
        format!(
            "{}/scholar?hl=en&q={}&start={}",
            self.base_url,
            urlencoding::encode(query),
            start
        )
    }

    /// Relative link of the citation export page of a cluster
    fn cite_path(cluster_id: &str, rank: u32) -> String {
        format!(
            "/scholar?hl=en&q=info:{}:scholar.google.com/&output=cite&scirp={}",
            cluster_id,
            rank.saturating_sub(1)
        )
    }

    /// Resolve a link found in a page against the base URL
    fn absolute(&self, href: &str) -> String {
        url::Url::parse(&self.base_url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }

    async fn fetch_page(&self, url: &str) -> Result<String, SourceError> {
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            SourceError::Network(format!("Failed to reach Google Scholar: {}", e))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimit(format!(
                "Google Scholar returned status: {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(SourceError::Api(format!(
                "Google Scholar returned status: {}",
                status
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to read response: {}", e)))?;

        if text.contains("gs_captcha_f") || text.contains("id=\"captcha-form\"") {
            return Err(SourceError::RateLimit(
                "Google Scholar served a captcha page".to_string(),
            ));
        }

        Ok(text)
    }

    fn parse_results(&self, html: &str, start: usize) -> Result<ResultsPage, SourceError> {
        let document = Html::parse_document(html);
        let result_selector = selector("div.gs_r.gs_or.gs_scl")?;
        let next_icon = selector(".gs_ico_nav_next")?;
        let next_button = selector("button.gs_btnPR")?;

        let publications = document
            .select(&result_selector)
            .enumerate()
            .filter_map(|(pos, elem)| self.parse_result(&elem, (start + pos + 1) as u32))
            .collect();

        let has_next = document.select(&next_icon).next().is_some()
            || document
                .select(&next_button)
                .any(|b| b.value().attr("disabled").is_none());

        Ok(ResultsPage {
            publications,
            has_next,
        })
    }

    /// Parse one result block; blocks without a title are skipped
    fn parse_result(&self, elem: &ElementRef, rank: u32) -> Option<Publication> {
        let title_selector = Selector::parse("h3.gs_rt").ok()?;
        let title_link_selector = Selector::parse("h3.gs_rt a").ok()?;
        let byline_selector = Selector::parse("div.gs_a").ok()?;
        let snippet_selector = Selector::parse("div.gs_rs").ok()?;
        let footer_link_selector = Selector::parse("div.gs_fl a").ok()?;
        let eprint_selector = Selector::parse("div.gs_or_ggsm a").ok()?;

        let title_elem = elem.select(&title_selector).next()?;
        let title_link = elem.select(&title_link_selector).next();
        let title = match title_link {
            Some(link) => element_text(&link),
            None => self
                .patterns
                .title_tags
                .replace(&element_text(&title_elem), "")
                .into_owned(),
        };
        if title.is_empty() {
            return None;
        }

        let byline = elem
            .select(&byline_selector)
            .next()
            .map(|b| element_text(&b))
            .unwrap_or_default();
        let (authors, year, venue) = self.parse_byline(&byline);

        let mut builder = PublicationBuilder::new(title)
            .authors(authors)
            .gsrank(rank)
            .extra("container_type", Value::from("Publication"))
            .extra("source", Value::from("PUBLICATION_SEARCH_SNIPPET"));

        if let Some(year) = year {
            builder = builder.bib("pub_year", year);
        }
        if let Some(venue) = venue {
            builder = builder.bib("venue", venue);
        }
        if let Some(snippet) = elem.select(&snippet_selector).next() {
            builder = builder.bib("abstract", element_text(&snippet));
        }

        if let Some(href) = title_link.and_then(|a| a.value().attr("href")) {
            builder = builder.pub_url(self.absolute(href));
        }

        if let Some(cluster_id) = elem.value().attr("data-cid") {
            builder = builder
                .cluster_id(cluster_id)
                .url_scholarbib(Self::cite_path(cluster_id, rank));
        }

        for link in elem.select(&footer_link_selector) {
            let text = element_text(&link);
            if let Some(caps) = self.patterns.cited_by.captures(&text) {
                if let Ok(count) = caps[1].parse::<u64>() {
                    builder = builder.citations(count);
                }
                if let Some(href) = link.value().attr("href") {
                    builder = builder.citedby_url(self.absolute(href));
                }
            }
        }

        if let Some(href) = elem
            .select(&eprint_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
        {
            builder = builder.eprint_url(self.absolute(href));
        }

        Some(builder.build())
    }

    /// Split `"J Smith, A Doe - Nature, 2020 - nature.com"` into authors,
    /// year and venue.
    fn parse_byline(&self, byline: &str) -> (Vec<String>, Option<String>, Option<String>) {
        let mut parts = byline.split(" - ");

        let authors = parts
            .next()
            .unwrap_or_default()
            .split(',')
            .map(|a| a.trim().trim_matches('…').trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();

        let Some(venue_part) = parts.next() else {
            return (authors, None, None);
        };

        let year = self
            .patterns
            .year
            .find_iter(venue_part)
            .last()
            .map(|m| m.as_str().to_string());

        let venue = match &year {
            Some(y) => venue_part.replace(y.as_str(), ""),
            None => venue_part.to_string(),
        };
        let venue = venue
            .trim_matches(|c: char| c == ',' || c == '…' || c.is_whitespace())
            .to_string();

        (authors, year, (!venue.is_empty()).then_some(venue))
    }

    /// Walk result pages until one comes back empty or has no next button
    fn result_pages<'a>(
        &'a self,
        query: &'a str,
    ) -> impl Stream<Item = Result<Publication, SourceError>> + Send + 'a {
        try_stream! {
            let mut start = 0;
            loop {
                let html = self.fetch_page(&self.search_url(query, start)).await?;
                let page = self.parse_results(&html, start)?;
                let count = page.publications.len();
                tracing::debug!("Page at {} returned {} results for '{}'", start, count, query);

                for publication in page.publications {
                    yield publication;
                }

                if count == 0 || !page.has_next {
                    break;
                }
                start += PAGE_SIZE;
            }
        }
    }

    /// Find the BibTeX link on a citation export page
    fn parse_bibtex_link(&self, html: &str) -> Result<Option<String>, SourceError> {
        let document = Html::parse_document(html);
        let link_selector = selector("a.gs_citi")?;
        let link = document
            .select(&link_selector)
            .find(|a| element_text(a).eq_ignore_ascii_case("bibtex"))
            .and_then(|a| a.value().attr("href"))
            .map(|href| self.absolute(href));
        Ok(link)
    }
}

/// Merge a parsed BibTeX entry into the record's bibliographic fields.
///
/// Existing keys are overwritten in place; `year` is stored as `pub_year`.
fn merge_bibtex(bib: &mut BibFields, entry: BibtexEntry) {
    bib.insert("pub_type", entry.entry_type);
    bib.insert("bib_id", entry.key);
    for (name, value) in entry.fields {
        let name = if name == "year" {
            "pub_year".to_string()
        } else {
            name
        };
        bib.insert(name, value);
    }
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Parse(format!("selector {}: {}", css, e)))
}

fn element_text(elem: &ElementRef) -> String {
    elem.text()
        .collect::<String>()
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl ScholarSource for GoogleScholarSource {
    fn name(&self) -> &str {
        "Google Scholar"
    }

    fn search<'a>(&'a self, query: &'a str) -> PublicationStream<'a> {
        self.result_pages(query).boxed()
    }

    async fn fill(&self, mut publication: Publication) -> Result<Publication, SourceError> {
        let Some(cite_path) = publication.url_scholarbib.clone() else {
            tracing::debug!("No citation link; keeping search snippet as is");
            publication.filled = true;
            return Ok(publication);
        };

        let cite_page = self.fetch_page(&self.absolute(&cite_path)).await?;
        let bibtex_url = self.parse_bibtex_link(&cite_page)?.ok_or_else(|| {
            SourceError::NotFound(format!("No BibTeX export link at {}", cite_path))
        })?;

        let bibtex = self.fetch_page(&bibtex_url).await?;
        let entry = parse_entry(&bibtex)?;

        merge_bibtex(publication.bib.get_or_insert_with(BibFields::new), entry);
        publication.filled = true;
        Ok(publication)
    }
}
