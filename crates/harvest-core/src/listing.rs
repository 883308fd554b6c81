//! Listing collection: one pass per category page, first sightings appended
//! straight into a [`SharedAppendStore`].

use std::collections::HashSet;
use std::ops::AddAssign;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;

use crate::distributor::{Distributor, RunReporter};
use crate::error::AppError;
use crate::models::{ErrorRecord, Job, Listing};
use crate::store::SharedAppendStore;
use crate::traits::ListingSource;

/// Entity identifiers already emitted during one listing pass.
///
/// Scoped to a single traversal: the same entity under another category is
/// a legitimate separate result and gets its own set.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `id` is offered, `false` afterwards.
    pub fn first_sighting(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Counters for one pass, or the sum over many.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    /// Entries found on the page(s), duplicates included.
    pub seen: usize,
    /// Entries skipped because their identifier was already emitted.
    pub duplicates: usize,
    /// Entries skipped because required fields were missing.
    pub rejected: usize,
    /// Entries persisted to the store.
    pub appended: usize,
    /// Entries lost to a failed append.
    pub dropped: usize,
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, other: Self) {
        self.seen += other.seen;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
        self.appended += other.appended;
        self.dropped += other.dropped;
    }
}

/// Run one listing pass for `job`.
///
/// A page that cannot be listed becomes an [`ErrorRecord`]; individual
/// entries never fail the pass.
pub async fn run_pass<S: ListingSource>(
    source: &S,
    store: &SharedAppendStore<Listing>,
    job: &Job,
) -> Result<PassStats, ErrorRecord> {
    let entries = match AssertUnwindSafe(source.list(job)).catch_unwind().await {
        Ok(Ok(entries)) => entries,
        Ok(Err(e)) => return Err(ErrorRecord::from_error(job, &e)),
        Err(_) => {
            return Err(ErrorRecord::unexpected(job, "listing source panicked"));
        }
    };

    let mut dedup = DedupSet::new();
    let mut stats = PassStats::default();

    for mut entry in entries {
        stats.seen += 1;
        if job.category.is_some() {
            entry.category = job.category.clone();
        }
        if job.category_index.is_some() {
            entry.category_index = job.category_index;
        }

        // Rejected entries must not claim an href.
        if let Err(e) = entry.validate() {
            tracing::warn!(
                url = %job.url,
                href = %entry.href,
                error = %e,
                "Skipping listing entry"
            );
            stats.rejected += 1;
            continue;
        }

        if !dedup.first_sighting(&entry.href) {
            stats.duplicates += 1;
            continue;
        }

        if store.append_or_drop(entry).await {
            stats.appended += 1;
        } else {
            stats.dropped += 1;
        }
    }

    tracing::info!(
        url = %job.url,
        category = job.category.as_deref().unwrap_or("-"),
        seen = stats.seen,
        duplicates = stats.duplicates,
        appended = stats.appended,
        dropped = stats.dropped,
        "Listing pass finished"
    );
    Ok(stats)
}

/// Totals of a listing collection run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionReport {
    pub passes: usize,
    pub stats: PassStats,
    pub errors: Vec<ErrorRecord>,
    /// Items in the store before the run started.
    pub stored_before: usize,
    /// Items in the store after every pass finished.
    pub stored_after: usize,
}

impl CollectionReport {
    /// Whether the store grew by exactly the number of reported appends.
    pub fn is_consistent(&self) -> bool {
        self.stored_after == self.stored_before + self.stats.appended
    }
}

/// Runs listing passes concurrently, all feeding one shared artifact.
pub struct ListingCollector<S> {
    source: S,
    store: SharedAppendStore<Listing>,
    distributor: Distributor,
}

impl<S: ListingSource> ListingCollector<S> {
    pub fn new(source: S, store: SharedAppendStore<Listing>, distributor: Distributor) -> Self {
        Self {
            source,
            store,
            distributor,
        }
    }

    /// Run one pass per job and verify the final store count.
    ///
    /// Fails only when the store itself cannot be read; page and entry
    /// failures are reported in the returned [`CollectionReport`].
    pub async fn collect<R>(
        &self,
        jobs: Vec<Job>,
        reporter: Arc<R>,
    ) -> Result<CollectionReport, AppError>
    where
        R: RunReporter + 'static,
    {
        let stored_before = self.store.load().await?.len();
        let passes = jobs.len();

        let handler = {
            let source = self.source.clone();
            let store = self.store.clone();
            move |job: Job| {
                let source = source.clone();
                let store = store.clone();
                async move { run_pass(&source, &store, &job).await }
            }
        };
        let outputs = self.distributor.dispatch(jobs, handler, &reporter).await;

        let mut report = CollectionReport {
            passes,
            stored_before,
            ..Default::default()
        };
        for output in outputs {
            match output {
                Ok(stats) => report.stats += stats,
                Err(error) => {
                    tracing::warn!(
                        url = %error.url,
                        kind = %error.error_type,
                        error = %error.error_message,
                        "Listing pass failed"
                    );
                    report.errors.push(error);
                }
            }
        }

        report.stored_after = self.store.load().await?.len();
        if !report.is_consistent() {
            tracing::warn!(
                before = report.stored_before,
                after = report.stored_after,
                appended = report.stats.appended,
                "Store count does not match reported appends"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdmissionPolicy;
    use crate::error::ErrorKind;
    use crate::testutil::*;

    fn store(dir: &tempfile::TempDir) -> SharedAppendStore<Listing> {
        SharedAppendStore::new(dir.path().join("listings.json"))
    }

    fn category_job(url: &str, category: &str, index: u32) -> Job {
        Job::new(url)
            .with_category(category)
            .with_category_index(index)
    }

    #[test]
    fn dedup_set_reports_first_sighting_only() {
        let mut set = DedupSet::new();
        assert!(set.first_sighting("/r/1"));
        assert!(!set.first_sighting("/r/1"));
        assert!(set.first_sighting("/r/2"));
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn repeated_entity_in_one_pass_is_emitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let source = MockListingSource::new().page(
            "https://example.com/pizza",
            vec![
                make_test_listing("/r/x", None),
                make_test_listing("/r/y", None),
                make_test_listing("/r/x", None),
            ],
        );

        let job = category_job("https://example.com/pizza", "Pizza", 1);
        let stats = run_pass(&source, &store, &job).await.unwrap();

        assert_eq!(
            stats,
            PassStats {
                seen: 3,
                duplicates: 1,
                appended: 2,
                ..Default::default()
            }
        );
        let stored = store.load().await.unwrap();
        assert_eq!(stored.iter().filter(|l| l.href == "/r/x").count(), 1);
    }

    #[tokio::test]
    async fn same_entity_in_two_categories_is_kept_twice() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockListingSource::new()
            .page("https://example.com/pizza", vec![make_test_listing("/r/x", None)])
            .page("https://example.com/sushi", vec![make_test_listing("/r/x", None)]);
        let collector = ListingCollector::new(
            source,
            store(&dir),
            Distributor::new(AdmissionPolicy::Continuous { pool_size: 2 }).unwrap(),
        );

        let report = collector
            .collect(
                vec![
                    category_job("https://example.com/pizza", "Pizza", 1),
                    category_job("https://example.com/sushi", "Sushi", 2),
                ],
                Arc::new(MockReporter::new()),
            )
            .await
            .unwrap();

        assert_eq!(report.stats.appended, 2);
        assert!(report.is_consistent());

        let mut stored = store(&dir).load().await.unwrap();
        stored.sort_by(|a, b| a.category.cmp(&b.category));
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].category.as_deref(), Some("Pizza"));
        assert_eq!(stored[1].category.as_deref(), Some("Sushi"));
        stored[0].category = None;
        stored[0].category_index = None;
        stored[1].category = None;
        stored[1].category_index = None;
        assert_eq!(stored[0], stored[1]);
    }

    #[tokio::test]
    async fn failed_page_is_reported_and_others_continue() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockListingSource::new().page(
            "https://example.com/pizza",
            vec![make_test_listing("/r/1", None), make_test_listing("/r/2", None)],
        );
        let collector = ListingCollector::new(
            source.clone(),
            store(&dir),
            Distributor::new(AdmissionPolicy::Windowed { window_size: 2 }).unwrap(),
        );

        let report = collector
            .collect(
                vec![
                    category_job("https://example.com/pizza", "Pizza", 1),
                    category_job("https://example.com/gone", "Helados", 2),
                ],
                Arc::new(MockReporter::new()),
            )
            .await
            .unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.stats.appended, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].error_type, ErrorKind::HttpStatusError);
        assert_eq!(source.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn entries_without_name_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut nameless = make_test_listing("/r/2", None);
        nameless.name = String::new();
        let source = MockListingSource::new().page(
            "https://example.com/pizza",
            vec![make_test_listing("/r/1", None), nameless],
        );

        let job = Job::new("https://example.com/pizza");
        let stats = run_pass(&source, &store(&dir), &job).await.unwrap();

        assert_eq!(stats.appended, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn rejected_entry_does_not_shadow_a_valid_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let mut nameless = make_test_listing("/r/1", None);
        nameless.name = String::new();
        let mut no_href = make_test_listing("", None);
        no_href.name = "Anonymous".to_string();
        let source = MockListingSource::new().page(
            "https://example.com/pizza",
            vec![
                nameless,
                no_href.clone(),
                no_href,
                make_test_listing("/r/1", None),
            ],
        );

        let job = Job::new("https://example.com/pizza");
        let stats = run_pass(&source, &store, &job).await.unwrap();

        assert_eq!(stats.seen, 4);
        assert_eq!(stats.rejected, 3);
        assert_eq!(stats.duplicates, 0);
        assert_eq!(stats.appended, 1);
        let stored = store.load().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Store /r/1");
    }

    #[tokio::test]
    async fn unwritable_store_drops_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.json");
        std::fs::write(&path, "not json").unwrap();
        let source = MockListingSource::new()
            .page("https://example.com/pizza", vec![make_test_listing("/r/1", None)]);

        let store = SharedAppendStore::new(&path);
        let job = Job::new("https://example.com/pizza");
        let stats = run_pass(&source, &store, &job).await.unwrap();

        assert_eq!(stats.appended, 0);
        assert_eq!(stats.dropped, 1);
    }
}
