//! Progress marker written at the end of every scrape.

use serde::{Deserialize, Serialize};

/// Placeholder error text recorded when a run completed
pub const NO_ERROR: &str = "none";

/// Index reported when no result was reached before the run ended
pub const NO_INDEX: i64 = -1;

/// Summary of the last scraper invocation
///
/// Replaced wholesale on every run, whether it succeeded or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMarker {
    /// Query that was being processed (`None` if no query was started)
    pub query: Option<String>,

    /// Index of the last result reached within `query`
    pub idx: i64,

    /// Whether every query was processed to the end
    pub completed: bool,

    /// Error text, or [`NO_ERROR`] on success
    pub error: String,
}

impl ProgressMarker {
    /// Marker for a run that processed every query
    pub fn completed(query: Option<String>, idx: i64) -> Self {
        Self {
            query,
            idx,
            completed: true,
            error: NO_ERROR.to_string(),
        }
    }

    /// Marker for a run that stopped on an error
    pub fn failed(query: Option<String>, idx: i64, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            query,
            idx,
            completed: false,
            error: if error.is_empty() {
                "unknown error".to_string()
            } else {
                error
            },
        }
    }
}
