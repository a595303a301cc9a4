//! The exporter.
//!
//! Loads every cached record, reduces it to a [`MetadataEntry`] and a BibTeX
//! entry, and writes three files: a JSON array, a CSV table and a `.bib`
//! bibliography. Outputs are overwritten on every run.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{value_to_text, Publication};
use crate::utils::{format_entry, to_json_pretty, CacheError, RecordCache};

/// Placeholder for a missing text field
pub const MISSING: &str = "N/A";

/// Column order of the CSV export
pub const CSV_HEADER: [&str; 8] = [
    "title",
    "authors",
    "year",
    "venue",
    "abstract",
    "citations",
    "url",
    "query",
];

/// Errors that abort an export
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Flat metadata extracted from one cached record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub title: String,
    pub authors: String,
    pub year: String,
    pub venue: String,
    #[serde(rename = "abstract")]
    pub r#abstract: String,
    pub citations: u64,
    pub url: String,
    pub query: String,
}

impl MetadataEntry {
    /// Extract the exported fields, defaulting anything missing.
    ///
    /// Text fields that are absent or `null` fall back to [`MISSING`], the
    /// citation count to 0.
    pub fn from_publication(publication: &Publication) -> Self {
        let bib = |key: &str| {
            publication
                .bib
                .as_ref()
                .and_then(|bib| bib.get(key))
                .filter(|value| !value.is_null())
                .map(value_to_text)
                .unwrap_or_else(|| MISSING.to_string())
        };

        Self {
            title: bib("title"),
            authors: bib("author"),
            year: bib("pub_year"),
            venue: bib("venue"),
            r#abstract: bib("abstract"),
            citations: publication.num_citations.unwrap_or(0),
            url: publication
                .pub_url
                .clone()
                .unwrap_or_else(|| MISSING.to_string()),
            query: publication
                .query
                .clone()
                .unwrap_or_else(|| MISSING.to_string()),
        }
    }

    fn csv_row(&self) -> [String; 8] {
        [
            self.title.clone(),
            self.authors.clone(),
            self.year.clone(),
            self.venue.clone(),
            self.r#abstract.clone(),
            self.citations.to_string(),
            self.url.clone(),
            self.query.clone(),
        ]
    }
}

/// Where the three exports are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutputs {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub bib: PathBuf,
}

impl Default for ExportOutputs {
    fn default() -> Self {
        Self {
            json: PathBuf::from("scholar_results.json"),
            csv: PathBuf::from("scholar_results.csv"),
            bib: PathBuf::from("scholar_results.bib"),
        }
    }
}

/// Outcome of an export run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of records exported
    pub records: usize,
    /// Number of distinct queries among them
    pub queries: usize,
}

/// Metadata entries and BibTeX entries for a set of records, in input order
pub fn extract(publications: &[Publication]) -> (Vec<MetadataEntry>, Vec<String>) {
    publications
        .iter()
        .map(|p| (MetadataEntry::from_publication(p), format_entry(p)))
        .unzip()
}

/// JSON array with a four-space indent
pub fn render_json(entries: &[MetadataEntry]) -> Result<Vec<u8>, ExportError> {
    Ok(to_json_pretty(entries)?)
}

/// CSV table; the header is present even without rows
pub fn render_csv(entries: &[MetadataEntry]) -> Result<Vec<u8>, ExportError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;
    for entry in entries {
        wtr.write_record(entry.csv_row())?;
    }
    wtr.into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))
}

/// Every BibTeX entry concatenated
pub fn render_bib(entries: &[String]) -> Vec<u8> {
    entries.concat().into_bytes()
}

/// Loads the cache and writes the exports
#[derive(Debug, Clone)]
pub struct Exporter {
    cache: RecordCache,
}

impl Exporter {
    pub fn new(cache: RecordCache) -> Self {
        Self { cache }
    }

    /// Export every cached record to `outputs`
    pub fn export(&self, outputs: &ExportOutputs) -> Result<ExportSummary, ExportError> {
        let publications = self.cache.load_all()?;
        tracing::info!(
            "Loaded {} records from {}",
            publications.len(),
            self.cache.root().display()
        );

        let (entries, bib_entries) = extract(&publications);

        write_output(&outputs.json, &render_json(&entries)?)?;
        write_output(&outputs.csv, &render_csv(&entries)?)?;
        write_output(&outputs.bib, &render_bib(&bib_entries))?;

        let mut queries: Vec<&str> = entries.iter().map(|e| e.query.as_str()).collect();
        queries.sort_unstable();
        queries.dedup();

        Ok(ExportSummary {
            records: entries.len(),
            queries: queries.len(),
        })
    }
}

fn write_output(path: &Path, content: &[u8]) -> Result<(), ExportError> {
    fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BibFields, PublicationBuilder};
    use crate::sources::mock::make_publication;
    use tempfile::TempDir;

    fn outputs(dir: &TempDir) -> ExportOutputs {
        ExportOutputs {
            json: dir.path().join("out.json"),
            csv: dir.path().join("out.csv"),
            bib: dir.path().join("out.bib"),
        }
    }

    #[test]
    fn test_record_without_bib_uses_defaults() {
        let entry = MetadataEntry::from_publication(&Publication::default());
        assert_eq!(entry.title, MISSING);
        assert_eq!(entry.authors, MISSING);
        assert_eq!(entry.year, MISSING);
        assert_eq!(entry.venue, MISSING);
        assert_eq!(entry.r#abstract, MISSING);
        assert_eq!(entry.url, MISSING);
        assert_eq!(entry.citations, 0);
    }

    #[test]
    fn test_fields_are_extracted() {
        let mut publication = make_publication("lovelace1843", "Sketch of the Analytical Engine");
        publication.query = Some("engines".to_string());

        let entry = MetadataEntry::from_publication(&publication);
        assert_eq!(entry.title, "Sketch of the Analytical Engine");
        assert_eq!(entry.authors, "Ada Lovelace and Charles Babbage");
        assert_eq!(entry.year, "1843");
        assert_eq!(entry.venue, MISSING);
        assert_eq!(entry.citations, 7);
        assert_eq!(entry.url, "http://example.com/lovelace1843");
        assert_eq!(entry.query, "engines");
    }

    #[test]
    fn test_non_string_author_is_stringified() {
        let publication = PublicationBuilder::new("T")
            .bib("author", serde_json::json!({"name": "Smith"}))
            .build();
        let entry = MetadataEntry::from_publication(&publication);
        assert_eq!(entry.authors, r#"{"name":"Smith"}"#);
    }

    #[test]
    fn test_null_fields_count_as_missing() {
        let publication = PublicationBuilder::new("T")
            .bib("author", serde_json::Value::Null)
            .bib("venue", serde_json::Value::Null)
            .build();
        let entry = MetadataEntry::from_publication(&publication);
        assert_eq!(entry.authors, MISSING);
        assert_eq!(entry.venue, MISSING);
        assert_eq!(entry.title, "T");
    }

    #[test]
    fn test_json_uses_abstract_key() {
        let entry = MetadataEntry::from_publication(&Publication::default());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["abstract"], "N/A");
        assert_eq!(value["citations"], 0);
    }

    #[test]
    fn test_csv_quotes_embedded_commas() {
        let publication = PublicationBuilder::new("Graphs, trees and paths")
            .bib("abstract", "line one\nline two")
            .build();
        let (entries, _) = extract(&[publication]);
        let csv = String::from_utf8(render_csv(&entries).unwrap()).unwrap();
        assert!(csv.starts_with("title,authors,year,venue,abstract,citations,url,query\n"));
        assert!(csv.contains("\"Graphs, trees and paths\""));
        assert!(csv.contains("\"line one\nline two\""));
    }

    #[test]
    fn test_bib_entries_keep_input_order() {
        let bib: BibFields = [
            ("bib_id".to_string(), "smith2020".into()),
            ("title".to_string(), "X".into()),
            ("author".to_string(), "Smith".into()),
        ]
        .into_iter()
        .collect();
        let first = Publication::new(bib);
        let second = make_publication("b", "Y");

        let (_, bibs) = extract(&[first, second]);
        let text = String::from_utf8(render_bib(&bibs)).unwrap();
        assert!(text.starts_with("@article{smith2020,\n  title = {X},\n  author = {Smith},\n}\n\n"));
        assert!(text.ends_with("}\n\n"));
        assert_eq!(text.matches("@article{").count(), 2);
    }

    #[test]
    fn test_export_empty_cache() {
        let dir = TempDir::new().unwrap();
        let out = outputs(&dir);
        let exporter = Exporter::new(RecordCache::new(dir.path().join("missing")));

        let summary = exporter.export(&out).unwrap();

        assert_eq!(summary, ExportSummary { records: 0, queries: 0 });
        assert_eq!(fs::read_to_string(&out.json).unwrap(), "[]");
        assert_eq!(
            fs::read_to_string(&out.csv).unwrap(),
            "title,authors,year,venue,abstract,citations,url,query\n"
        );
        assert_eq!(fs::read_to_string(&out.bib).unwrap(), "");
    }

    #[test]
    fn test_export_writes_all_formats() {
        let dir = TempDir::new().unwrap();
        let cache = RecordCache::new(dir.path().join("cache"));
        cache.create_query_dir("q1").unwrap();
        cache.create_query_dir("q2").unwrap();
        cache.store("q1", 0, &make_publication("a", "A")).unwrap();
        cache.store("q1", 1, &make_publication("b", "B")).unwrap();
        cache.store("q2", 0, &make_publication("c", "C")).unwrap();

        let out = outputs(&dir);
        let summary = Exporter::new(cache).export(&out).unwrap();
        assert_eq!(summary, ExportSummary { records: 3, queries: 2 });

        let json: Vec<MetadataEntry> =
            serde_json::from_str(&fs::read_to_string(&out.json).unwrap()).unwrap();
        let titles: Vec<&str> = json.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(json[2].query, "q2");

        let csv = fs::read_to_string(&out.csv).unwrap();
        assert_eq!(csv.lines().count(), 4);

        let bib = fs::read_to_string(&out.bib).unwrap();
        assert!(bib.starts_with("@article{a,\n"));
    }

    #[test]
    fn test_unwritable_output_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut out = outputs(&dir);
        out.json = dir.path().join("no/such/dir/out.json");
        let exporter = Exporter::new(RecordCache::new(dir.path().join("cache")));

        assert!(matches!(
            exporter.export(&out),
            Err(ExportError::Write { .. })
        ));
    }
}
