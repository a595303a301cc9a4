//! On-disk cache of scraped publications.
//!
//! # Cache Structure
//!
//! ```text
//! scholar_cache/
//!   <query>/
//!     0.json
//!     1.json
//!     ...
//! ```
//!
//! One directory per query, one JSON file per result named by its position
//! in the query's result list. Files are written once and never modified.

use crate::models::Publication;
use serde::{de::DeserializeOwned, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of cached record files
pub const CACHE_EXTENSION: &str = "json";

/// Errors raised while reading or writing the cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed cache file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Per-query record cache rooted at a directory
#[derive(Debug, Clone)]
pub struct RecordCache {
    root: PathBuf,
}

impl RecordCache {
    /// Create a cache handle; nothing is touched on disk until a write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name used for a query.
    ///
    /// Path separators would nest the cache, so they are replaced with `_`.
    pub fn query_dir_name(query: &str) -> String {
        let name: String = query
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        match name.as_str() {
            "" | "." | ".." => "_".repeat(name.len().max(1)),
            _ => name,
        }
    }

    /// Directory holding the records of a query
    pub fn query_dir(&self, query: &str) -> PathBuf {
        self.root.join(Self::query_dir_name(query))
    }

    /// Create the directory for a query; succeeds if it already exists
    pub fn create_query_dir(&self, query: &str) -> Result<PathBuf, CacheError> {
        let dir = self.query_dir(query);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(dir)
    }

    /// Path of the record at `idx` within a query
    pub fn record_path(&self, query: &str, idx: usize) -> PathBuf {
        self.query_dir(query)
            .join(format!("{}.{}", idx, CACHE_EXTENSION))
    }

    /// Write one record
    pub fn store(
        &self,
        query: &str,
        idx: usize,
        publication: &Publication,
    ) -> Result<PathBuf, CacheError> {
        let path = self.record_path(query, idx);
        write_json_file(&path, publication)?;
        tracing::debug!("Cached record: {}", path.display());
        Ok(path)
    }

    /// Load every cached record, tagging each with its query.
    ///
    /// The tree is walked recursively; symlinks and files with another
    /// extension are skipped. `query` is set to the name of the directory
    /// containing the file. Directories are visited in name order and records in index
    /// order, so repeated loads of the same cache return the same sequence.
    /// A missing root is an empty cache.
    pub fn load_all(&self) -> Result<Vec<Publication>, CacheError> {
        let mut publications = Vec::new();
        if !self.root.exists() {
            tracing::debug!("Cache directory {} does not exist", self.root.display());
            return Ok(publications);
        }
        self.visit(&self.root, &mut publications)?;
        Ok(publications)
    }

    fn visit(&self, dir: &Path, out: &mut Vec<Publication>) -> Result<(), CacheError> {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| CacheError::io(dir, e))? {
            let entry = entry.map_err(|e| CacheError::io(dir, e))?;
            let path = entry.path();
            // symlinks are not followed
            let file_type = entry.file_type().map_err(|e| CacheError::io(&path, e))?;
            if file_type.is_dir() {
                subdirs.push(path);
            } else if file_type.is_file() {
                files.push(path);
            } else {
                tracing::warn!("Skipping {}", path.display());
            }
        }

        files.sort_by(|a, b| compare_record_paths(a, b));
        subdirs.sort();

        let query = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for path in files {
            if path.extension().and_then(|e| e.to_str()) != Some(CACHE_EXTENSION) {
                tracing::warn!("Skipping non-cache file {}", path.display());
                continue;
            }
            let mut publication: Publication = read_json_file(&path)?;
            publication.query = Some(query.clone());
            out.push(publication);
        }

        for subdir in subdirs {
            self.visit(&subdir, out)?;
        }
        Ok(())
    }
}

/// Numeric stems first in numeric order, then everything else by name
fn compare_record_paths(a: &Path, b: &Path) -> Ordering {
    let index = |p: &Path| {
        p.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok())
    };
    match (index(a), index(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Read a JSON file and deserialize it
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, CacheError> {
    let content = fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| CacheError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize with a four-space indent and write a JSON file
pub(crate) fn write_json_file<T: Serialize + ?Sized>(
    path: &Path,
    data: &T,
) -> Result<(), CacheError> {
    let content = to_json_pretty(data).map_err(|source| CacheError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|e| CacheError::io(path, e))
}

/// Pretty-print JSON with a four-space indent
pub fn to_json_pretty<T: Serialize + ?Sized>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut serializer)?;
    Ok(buf)
}
