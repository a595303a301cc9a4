//! The scraper.
//!
//! [`Harvester`] runs every query against a [`ScholarSource`], fills each
//! result and writes it to the [`RecordCache`]. The first error, or an
//! interrupt, stops the whole run where it is. Whatever happens, exactly one
//! [`ProgressMarker`] is written at the end.

use futures_util::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::HarvestConfig;
use crate::models::{ProgressMarker, NO_INDEX};
use crate::sources::{ScholarSource, SourceError};
use crate::utils::{read_json_file, write_json_file, CacheError, RecordCache};

/// Error text recorded when the guard is dropped without a verdict
const ABORTED: &str = "harvest aborted before completion";

/// Errors that stop a harvest
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("interrupted")]
    Interrupted,

    #[error("failed to write progress marker: {0}")]
    Progress(#[source] CacheError),
}

/// Writes the progress marker when the run ends.
///
/// Tracks the query and index reached. [`ProgressGuard::finish`] writes the
/// final marker; if the guard is dropped without finishing (early return,
/// panic), a failed marker is written from `Drop`.
#[derive(Debug)]
pub struct ProgressGuard {
    path: PathBuf,
    query: Option<String>,
    idx: i64,
    written: bool,
}

impl ProgressGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            query: None,
            idx: NO_INDEX,
            written: false,
        }
    }

    /// A new query starts; no result reached yet
    pub fn enter_query(&mut self, query: &str) {
        self.query = Some(query.to_string());
        self.idx = NO_INDEX;
    }

    /// Result `idx` of the current query is being processed
    pub fn reach(&mut self, idx: usize) {
        self.idx = idx as i64;
    }

    /// Write the marker for `outcome` and return it
    pub fn finish(
        mut self,
        outcome: &Result<(), HarvestError>,
    ) -> Result<ProgressMarker, HarvestError> {
        let query = self.query.take();
        let marker = match outcome {
            Ok(()) => ProgressMarker::completed(query, self.idx),
            Err(e) => ProgressMarker::failed(query, self.idx, e.to_string()),
        };
        self.written = true;
        write_marker(&self.path, &marker).map_err(HarvestError::Progress)?;
        Ok(marker)
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        if self.written {
            return;
        }
        let marker = ProgressMarker::failed(self.query.take(), self.idx, ABORTED);
        if let Err(e) = write_marker(&self.path, &marker) {
            tracing::error!("Could not write progress marker: {}", e);
        }
    }
}

/// Write a progress marker, replacing any previous one
pub fn write_marker(path: &Path, marker: &ProgressMarker) -> Result<(), CacheError> {
    write_json_file(path, marker)
}

/// Read the marker left by the last run
pub fn read_marker(path: &Path) -> Result<ProgressMarker, CacheError> {
    read_json_file(path)
}

/// Drives a source over a list of queries
#[derive(Debug, Clone)]
pub struct Harvester {
    source: Arc<dyn ScholarSource>,
    cache: RecordCache,
    progress_file: PathBuf,
    delay: Duration,
}

impl Harvester {
    pub fn new(
        source: Arc<dyn ScholarSource>,
        cache: RecordCache,
        progress_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            cache,
            progress_file: progress_file.into(),
            delay: Duration::from_secs(5),
        }
    }

    /// Build from configuration
    pub fn from_config(source: Arc<dyn ScholarSource>, config: &HarvestConfig) -> Self {
        Self::new(
            source,
            RecordCache::new(&config.cache_dir),
            &config.progress_file,
        )
        .with_delay(config.request_delay())
    }

    /// Set the pause taken before and after each detail fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Run until done, failed, or interrupted with Ctrl-C
    pub async fn run(&self, queries: &[String]) -> Result<ProgressMarker, HarvestError> {
        self.run_until(queries, async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Could not listen for Ctrl-C; run is not interruptible");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until done, failed, or `shutdown` completes.
    ///
    /// The returned marker tells how the run ended. `Err` is returned only
    /// when the marker itself could not be written.
    pub async fn run_until<F>(
        &self,
        queries: &[String],
        shutdown: F,
    ) -> Result<ProgressMarker, HarvestError>
    where
        F: Future<Output = ()>,
    {
        let mut guard = ProgressGuard::new(&self.progress_file);

        let outcome = tokio::select! {
            biased;
            _ = shutdown => Err(HarvestError::Interrupted),
            result = self.harvest_all(queries, &mut guard) => result,
        };

        if let Err(e) = &outcome {
            tracing::error!("Harvest stopped: {}", e);
        }
        let marker = guard.finish(&outcome)?;
        tracing::info!(
            "Progress written to {} (completed: {})",
            self.progress_file.display(),
            marker.completed
        );
        Ok(marker)
    }

    async fn harvest_all(
        &self,
        queries: &[String],
        guard: &mut ProgressGuard,
    ) -> Result<(), HarvestError> {
        for query in queries {
            guard.enter_query(query);
            self.cache.create_query_dir(query)?;
            tracing::info!("Searching {} for '{}'", self.source.name(), query);

            let mut results = self.source.search(query).enumerate();
            let mut stored = 0;
            while let Some((idx, result)) = results.next().await {
                let publication = result?;
                guard.reach(idx);

                self.pause().await;
                let publication = self.source.fill(publication).await?;
                self.cache.store(query, idx, &publication)?;
                tracing::info!(
                    "Stored result {} for '{}': {}",
                    idx,
                    query,
                    publication.title().unwrap_or_default()
                );
                self.pause().await;
                stored += 1;
            }

            tracing::info!("Finished '{}' with {} results", query, stored);
        }
        Ok(())
    }

    async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        tracing::debug!("Waiting {:?}", self.delay);
        tokio::time::sleep(self.delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NO_ERROR;
    use crate::sources::mock::make_publication;
    use crate::sources::MockSource;
    use tempfile::TempDir;

    fn queries(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn harvester(dir: &TempDir, source: Arc<MockSource>) -> Harvester {
        Harvester::new(
            source,
            RecordCache::new(dir.path().join("cache")),
            dir.path().join("progress.json"),
        )
        .with_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_one_directory_per_query() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new());
        source.set_results("a", vec![make_publication("a0", "A0")]);
        let harvester = harvester(&dir, source);

        let marker = harvester
            .run_until(&queries(&["a", "b", "c"]), std::future::pending())
            .await
            .unwrap();

        assert!(marker.completed);
        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("cache"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_results_are_filled_and_stored_by_index() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new());
        source.set_results(
            "q",
            vec![make_publication("k0", "First"), make_publication("k1", "Second")],
        );
        let harvester = harvester(&dir, Arc::clone(&source));

        let marker = harvester
            .run_until(&queries(&["q"]), std::future::pending())
            .await
            .unwrap();

        assert_eq!(source.fill_calls(), 2);
        assert_eq!(
            marker,
            ProgressMarker {
                query: Some("q".to_string()),
                idx: 1,
                completed: true,
                error: NO_ERROR.to_string(),
            }
        );

        let cache = harvester.cache();
        assert!(cache.record_path("q", 0).is_file());
        assert!(cache.record_path("q", 1).is_file());
        let loaded = cache.load_all().unwrap();
        assert!(loaded.iter().all(|p| p.filled));
        assert_eq!(loaded[1].title().as_deref(), Some("Second"));
    }

    #[tokio::test]
    async fn test_pauses_around_each_detail_fetch() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new());
        source.set_results(
            "q",
            vec![make_publication("k0", "First"), make_publication("k1", "Second")],
        );
        let delay = Duration::from_millis(25);
        let harvester = harvester(&dir, source).with_delay(delay);

        let started = std::time::Instant::now();
        let marker = harvester
            .run_until(&queries(&["q"]), std::future::pending())
            .await
            .unwrap();

        assert!(marker.completed);
        // two pauses per result
        assert!(started.elapsed() >= delay * 4);
    }

    #[tokio::test]
    async fn test_no_pause_without_results() {
        let dir = TempDir::new().unwrap();
        let delay = Duration::from_secs(30);
        let harvester = harvester(&dir, Arc::new(MockSource::new())).with_delay(delay);

        let started = std::time::Instant::now();
        let marker = harvester
            .run_until(&queries(&["a", "b"]), std::future::pending())
            .await
            .unwrap();

        assert!(marker.completed);
        assert!(started.elapsed() < delay);
    }

    #[tokio::test]
    async fn test_failure_stops_all_remaining_queries() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new());
        source.set_results("one", vec![make_publication("x", "X")]);
        source.set_results("three", vec![make_publication("y", "Y")]);
        source.fail_on("three", "blocked by captcha");
        let harvester = harvester(&dir, source);

        let marker = harvester
            .run_until(&queries(&["one", "two", "three", "four"]), std::future::pending())
            .await
            .unwrap();

        assert!(!marker.completed);
        assert_eq!(marker.query.as_deref(), Some("three"));
        assert_eq!(marker.idx, 0);
        assert!(marker.error.contains("blocked by captcha"));
        assert!(!harvester.cache().query_dir("four").exists());

        let on_disk = read_marker(&dir.path().join("progress.json")).unwrap();
        assert_eq!(on_disk, marker);
    }

    #[tokio::test]
    async fn test_failure_before_first_result_reports_no_index() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new());
        source.fail_on("q", "unreachable");
        let harvester = harvester(&dir, source);

        let marker = harvester
            .run_until(&queries(&["q"]), std::future::pending())
            .await
            .unwrap();

        assert!(!marker.completed);
        assert_eq!(marker.query.as_deref(), Some("q"));
        assert_eq!(marker.idx, NO_INDEX);
    }

    #[tokio::test]
    async fn test_interrupt_is_recorded() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(MockSource::new());
        source.set_results("q", vec![make_publication("x", "X")]);
        let harvester = harvester(&dir, Arc::clone(&source));

        let marker = harvester
            .run_until(&queries(&["q"]), std::future::ready(()))
            .await
            .unwrap();

        assert!(!marker.completed);
        assert_eq!(marker.error, "interrupted");
        assert_eq!(marker.query, None);
        assert_eq!(marker.idx, NO_INDEX);
        assert_eq!(source.fill_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_query_list_completes() {
        let dir = TempDir::new().unwrap();
        let harvester = harvester(&dir, Arc::new(MockSource::new()));
        let marker = harvester
            .run_until(&[], std::future::pending())
            .await
            .unwrap();
        assert!(marker.completed);
        assert_eq!(marker.query, None);
        assert_eq!(marker.idx, NO_INDEX);
    }

    #[test]
    fn test_dropped_guard_writes_failed_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        {
            let mut guard = ProgressGuard::new(&path);
            guard.enter_query("q");
            guard.reach(3);
        }

        let marker = read_marker(&path).unwrap();
        assert!(!marker.completed);
        assert_eq!(marker.idx, 3);
        assert_eq!(marker.error, ABORTED);
    }

    #[test]
    fn test_marker_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        let guard = ProgressGuard::new(&path);
        guard.finish(&Ok(())).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "{\n    \"query\": null,\n    \"idx\": -1,\n    \"completed\": true,\n    \"error\": \"none\"\n}"
        );
    }
}
