//! Configuration management.
//!
//! The scraper reads a JSON file:
//!
//! ```json
//! {
//!     "queries": ["deep learning", "graph neural networks"],
//!     "start_year": 2015,
//!     "end_year": 2024
//! }
//! ```
//!
//! Runtime settings may be added to the same file (`cache_dir`,
//! `progress_file`, `request_delay_secs`) or supplied through
//! `SCHOLAR_HARVEST_*` environment variables, e.g.
//! `SCHOLAR_HARVEST_CACHE_DIR=/tmp/cache`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SCHOLAR_HARVEST";

/// Scraper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Queries to run, in order
    #[serde(default)]
    pub queries: Vec<String>,

    /// Lower publication year bound (read but not applied to searches)
    #[serde(default)]
    pub start_year: Option<i32>,

    /// Upper publication year bound (read but not applied to searches)
    #[serde(default)]
    pub end_year: Option<i32>,

    /// Root of the per-query record cache
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Where the progress marker is written
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,

    /// Pause before and after each detail fetch, in seconds
    #[serde(default = "default_request_delay")]
    pub request_delay_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            start_year: None,
            end_year: None,
            cache_dir: default_cache_dir(),
            progress_file: default_progress_file(),
            request_delay_secs: default_request_delay(),
        }
    }
}

impl HarvestConfig {
    /// Request delay as a duration
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }
}

pub fn default_cache_dir() -> PathBuf {
    PathBuf::from("scholar_cache")
}

fn default_progress_file() -> PathBuf {
    PathBuf::from("progress.json")
}

fn default_request_delay() -> u64 {
    5
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

/// Load configuration from a JSON file, applying environment overrides
pub fn load_config(path: &Path) -> Result<HarvestConfig, ConfigError> {
    let wrap = |source| ConfigError::Load {
        path: path.to_path_buf(),
        source,
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Json))
        .add_source(config::Environment::with_prefix(ENV_PREFIX))
        .build()
        .map_err(wrap)?;

    let config: HarvestConfig = settings.try_deserialize().map_err(wrap)?;
    tracing::debug!(
        "Loaded {} queries from {}",
        config.queries.len(),
        path.display()
    );
    Ok(config)
}
