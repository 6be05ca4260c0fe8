//! Job orchestrator - runs crawl jobs and exposes their control surface
//!
//! Each enqueued job runs on its own task. Entry URLs are processed in
//! order; the fetch and extraction of one URL overlaps with the staging
//! write of the previous one, and nothing deeper than that. Counters are
//! written in the same transaction as the staged row, so the durable job
//! row always reflects completed work.

use crate::config::CrawlerConfig;
use crate::extract::extract_product_with_rules;
use crate::fetcher::{PageFetcher, SessionFetcher};
use crate::jobs::pool::{PauseFlag, SessionGate, WorkerPool};
use crate::jobs::progress::{ProgressEvent, ProgressNotifier, ProgressTopic};
use crate::jobs::{JobStatus, JobType};
use crate::pattern::apply_template;
use crate::profile::{BrandProfile, TargetKind};
use crate::storage::{
    CatalogStore, ExtractionStatus, JobCounters, JobRecord, JobStore, SqliteStorage,
    StagedProduct, StagingStore, StorageError, StorageResult,
};
use crate::url::canonical_string;
use crate::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const INTERRUPTED_ERROR: &str = "interrupted: the process exited while the job was active";

/// An entry URL, with the product code it was generated from when known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUrl {
    pub url: String,
    pub code: Option<String>,
}

impl EntryUrl {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            code: None,
        }
    }

    pub fn with_code(url: &str, code: &str) -> Self {
        Self {
            url: url.to_string(),
            code: Some(code.to_string()),
        }
    }
}

/// What a job needs at run time, snapshotted at enqueue
struct JobContext {
    job_id: String,
    job_type: JobType,
    profile: BrandProfile,
    entries: Vec<EntryUrl>,
}

/// Result of fetching and extracting one entry URL
struct EntryOutcome {
    staged: StagedProduct,
    associated: Vec<String>,
    missing_code: Option<String>,
}

struct RunningJob {
    cancel: CancellationToken,
    finished: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    config: CrawlerConfig,
    storage: Arc<Mutex<SqliteStorage>>,
    pages: SessionFetcher,
    notifier: Arc<dyn ProgressNotifier>,
    pool: WorkerPool,
    pause: PauseFlag,
    running: Mutex<HashMap<String, RunningJob>>,
}

/// Runs crawl jobs against a shared worker pool
///
/// Cloning is cheap; clones control the same jobs.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Creates an orchestrator
    ///
    /// # Arguments
    ///
    /// * `config` - Pool size, retry budget and stop grace period
    /// * `storage` - Job, staging and catalog store
    /// * `fetcher` - Page fetcher used for every entry URL
    /// * `notifier` - Receiver of progress events
    pub fn new(
        config: CrawlerConfig,
        storage: Arc<Mutex<SqliteStorage>>,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn ProgressNotifier>,
    ) -> Self {
        Self::with_sessions(config, storage, fetcher, notifier, Arc::new(SessionGate::new()))
    }

    /// Creates an orchestrator sharing `sessions` with other fetch users,
    /// such as a taxonomy scanner for the same profiles
    pub fn with_sessions(
        config: CrawlerConfig,
        storage: Arc<Mutex<SqliteStorage>>,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn ProgressNotifier>,
        sessions: Arc<SessionGate>,
    ) -> Self {
        let pool = WorkerPool::new(config.worker_pool_size as usize);
        let pages = SessionFetcher::new(fetcher, sessions)
            .with_pool(pool.clone())
            .with_retry(config.max_fetch_attempts, config.retry_backoff_ms);
        Self {
            shared: Arc::new(Shared {
                config,
                storage,
                pages,
                notifier,
                pool,
                pause: PauseFlag::new(),
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    // ===== Job Control =====

    /// Creates a job in `pending` and starts it on its own task
    ///
    /// The profile's extraction rules are snapshotted into the job row.
    /// Duplicate entry URLs are kept in `total` and counted as processed
    /// without a second fetch. A job with no entry URLs fails immediately.
    ///
    /// # Returns
    ///
    /// The new job's id
    pub fn enqueue(
        &self,
        profile: &BrandProfile,
        job_type: JobType,
        entries: Vec<EntryUrl>,
    ) -> Result<String> {
        let entries: Vec<EntryUrl> = entries
            .into_iter()
            .map(|entry| EntryUrl {
                url: canonical_string(&entry.url),
                code: entry.code,
            })
            .collect();

        if profile.requires_rendering {
            tracing::warn!(
                profile_id = %profile.id,
                "Profile pages need a JavaScript renderer, static extraction may find little"
            );
        }

        let total = entries.len() as u32;
        let job = JobRecord {
            id: Uuid::new_v4().to_string(),
            job_type,
            profile_id: profile.id.clone(),
            entry_urls: entries.iter().map(|e| e.url.clone()).collect(),
            rules: profile.rules.clone(),
            status: JobStatus::Pending,
            counters: JobCounters {
                total,
                total_products: total,
                ..JobCounters::default()
            },
            created_at: String::new(),
            updated_at: String::new(),
            error_text: None,
        };
        self.shared.with_storage(|s| s.create_job(&job))?;
        tracing::info!(
            job_id = %job.id,
            profile_id = %profile.id,
            job_type = %job_type,
            total,
            "Job enqueued"
        );
        self.shared.publish_status(&job.id, JobStatus::Pending, &job.counters);

        if entries.is_empty() {
            self.shared
                .fail_job(&job.id, "no entry URLs to process", &job.counters);
            return Ok(job.id);
        }

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        self.shared.lock_running().insert(
            job.id.clone(),
            RunningJob {
                cancel: cancel.clone(),
                finished,
                handle: None,
            },
        );

        let context = JobContext {
            job_id: job.id.clone(),
            job_type,
            profile: profile.clone(),
            entries,
        };
        let handle = tokio::spawn(run_job(self.shared.clone(), context, cancel));

        // The task may already have finished and deregistered itself
        if let Some(running) = self.shared.lock_running().get_mut(&job.id) {
            running.handle = Some(handle);
        }

        Ok(job.id)
    }

    /// Enqueues one entry URL per product code, generated from the
    /// profile's web URL pattern
    pub fn enqueue_codes<S: AsRef<str>>(
        &self,
        profile: &BrandProfile,
        job_type: JobType,
        codes: &[S],
    ) -> Result<String> {
        let template = profile.rules.pattern_for(TargetKind::Web).ok_or_else(|| {
            CatalogError::InvalidRules(format!("profile {} has no web URL pattern", profile.id))
        })?;
        let urls = apply_template(template, codes)?;
        let entries = urls
            .iter()
            .zip(codes)
            .map(|(url, code)| EntryUrl::with_code(url, code.as_ref()))
            .collect();
        self.enqueue(profile, job_type, entries)
    }

    /// Pauses every running job at its next entry-URL boundary
    pub fn pause(&self) {
        self.shared.pause.pause();
        tracing::info!("Pause requested; running jobs hold at their next entry URL");
    }

    /// Resumes every paused job
    pub fn resume(&self) {
        self.shared.pause.resume();
        tracing::info!("Resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pause.is_paused()
    }

    /// Stops a job, optionally deleting its staged rows
    ///
    /// The job's task gets the configured grace period to finish its current
    /// entry URL; after that it is aborted and its in-flight result dropped.
    /// The `stopped` status and the purge are written in one transaction.
    ///
    /// # Returns
    ///
    /// The number of staged rows deleted
    pub async fn stop(&self, job_id: &str, purge: bool) -> Result<usize> {
        let job = self.get_job(job_id)?;
        if job.status.is_terminal() {
            return Err(CatalogError::InvalidTransition {
                from: job.status,
                to: JobStatus::Stopped,
            });
        }

        let running = self.shared.lock_running().remove(job_id);
        if let Some(running) = running {
            running.cancel.cancel();
            if let Some(mut handle) = running.handle {
                let grace = Duration::from_millis(self.shared.config.stop_grace_period_ms);
                if tokio::time::timeout(grace, &mut handle).await.is_err() {
                    tracing::warn!(job_id, "Job did not stop within the grace period, aborting");
                    handle.abort();
                    let _ = handle.await;
                }
            }
            running.finished.cancel();
        }

        let purged = self.shared.with_storage(|s| s.stop_job(job_id, purge))?;
        tracing::info!(job_id, purge, purged, "Job stopped");

        let job = self.get_job(job_id)?;
        self.shared
            .notifier
            .publish(ProgressEvent::from_record(ProgressTopic::Stopped, &job));
        Ok(purged)
    }

    /// Promotes a `waiting_commit` job's staged rows into the catalog
    ///
    /// Either every row is merged and the job becomes `completed`, or
    /// nothing is applied and the job stays `waiting_commit`.
    ///
    /// # Returns
    ///
    /// The number of catalog rows inserted or merged
    pub fn commit(&self, job_id: &str) -> Result<usize> {
        let applied = self
            .shared
            .with_storage(|s| s.promote(job_id))
            .map_err(|e| match e {
                StorageError::InvalidTransition { .. }
                | StorageError::JobNotFound(_)
                | StorageError::LockPoisoned => CatalogError::from(e),
                other => CatalogError::CommitFailed {
                    job_id: job_id.to_string(),
                    message: other.to_string(),
                },
            })?;
        tracing::info!(job_id, applied, "Job committed");

        let job = self.get_job(job_id)?;
        self.shared
            .notifier
            .publish(ProgressEvent::from_record(ProgressTopic::Completed, &job));
        Ok(applied)
    }

    /// Waits until a job's task has finished, then returns the job row
    pub async fn wait(&self, job_id: &str) -> Result<JobRecord> {
        let finished = self
            .shared
            .lock_running()
            .get(job_id)
            .map(|running| running.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
        self.get_job(job_id)
    }

    // ===== Read Model =====

    pub fn get_job(&self, job_id: &str) -> Result<JobRecord> {
        Ok(self.shared.with_storage(|s| s.get_job(job_id))?)
    }

    /// Jobs in `pending`, `running`, `paused` or `waiting_commit`, rebuilt
    /// from their durable counters
    pub fn list_active_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(self
            .shared
            .with_storage(|s| s.list_jobs_by_status(&JobStatus::active_states()))?)
    }

    pub fn list_staged(&self, job_id: &str) -> Result<Vec<StagedProduct>> {
        Ok(self.shared.with_storage(|s| s.list_staged(job_id))?)
    }

    /// Marks jobs left `running` or `paused` by a previous process as
    /// `failed`, keeping their staged rows
    pub fn recover_interrupted(&self) -> Result<Vec<String>> {
        let recovered = self
            .shared
            .with_storage(|s| s.fail_interrupted_jobs(INTERRUPTED_ERROR))?;
        for job_id in &recovered {
            tracing::warn!(job_id = %job_id, "Marked interrupted job as failed");
        }
        Ok(recovered)
    }
}

impl Shared {
    fn with_storage<T>(
        &self,
        op: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut storage = self.storage.lock().map_err(|_| StorageError::LockPoisoned)?;
        op(&mut storage)
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashMap<String, RunningJob>> {
        // The map holds tokens and handles only, all valid after a panic
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_status(&self, job_id: &str, status: JobStatus, counters: &JobCounters) {
        self.notifier
            .publish(ProgressEvent::progress(job_id, status, counters));
    }

    fn set_status(&self, job_id: &str, next: JobStatus, counters: &JobCounters) -> Result<()> {
        self.with_storage(|s| s.transition_job(job_id, next, None))?;
        tracing::debug!(job_id, status = %next, "Job status changed");
        self.publish_status(job_id, next, counters);
        Ok(())
    }

    fn fail_job(&self, job_id: &str, message: &str, counters: &JobCounters) {
        tracing::error!(job_id, error = message, "Job failed");
        match self.with_storage(|s| s.transition_job(job_id, JobStatus::Failed, Some(message))) {
            Ok(_) => self.publish_status(job_id, JobStatus::Failed, counters),
            Err(e) => tracing::warn!(job_id, error = %e, "Could not mark job as failed"),
        }
    }

    async fn process_entry(&self, job: &JobContext, entry: &EntryUrl) -> EntryOutcome {
        let auth = job.profile.auth_required.then_some(job.profile.id.as_str());
        let fetched = self.pages.fetch(&entry.url, auth).await;

        let extracted = match fetched {
            Ok(page) => {
                let rules = job.profile.rules.clone();
                tokio::task::spawn_blocking(move || {
                    extract_product_with_rules(&page.html, &page.final_url, &rules)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(CatalogError::Unextractable {
                        url: entry.url.clone(),
                        message: format!("extraction task failed: {}", e),
                    })
                })
            }
            Err(e) => Err(e),
        };

        match extracted {
            Ok(record) => {
                let associated = record
                    .associated
                    .iter()
                    .map(|a| canonical_string(&a.url))
                    .collect();
                let staged = StagedProduct::extracted(&job.job_id, &entry.url, record);
                let missing_code = match staged.status {
                    ExtractionStatus::NotFound => entry.code.clone(),
                    _ => None,
                };
                EntryOutcome {
                    staged,
                    associated,
                    missing_code,
                }
            }
            Err(e) => {
                let status = match e {
                    CatalogError::NotFound { .. } => ExtractionStatus::NotFound,
                    _ => ExtractionStatus::Error,
                };
                tracing::warn!(job_id = %job.job_id, url = %entry.url, error = %e, "Entry URL failed");
                EntryOutcome {
                    staged: StagedProduct::failed(&job.job_id, &entry.url, status, &e.to_string()),
                    associated: Vec::new(),
                    missing_code: match status {
                        ExtractionStatus::NotFound => entry.code.clone(),
                        _ => None,
                    },
                }
            }
        }
    }

    // ===== Staging =====

    /// Writes one processed URL and publishes the resulting counters
    ///
    /// Returns false when the job is no longer active and nothing was written.
    fn write_outcome(
        &self,
        profile_id: &str,
        outcome: &EntryOutcome,
        counters: &JobCounters,
        discovered: &[String],
    ) -> StorageResult<bool> {
        let job_id = &outcome.staged.job_id;
        let written = self.with_storage(|s| {
            let written = s.stage_processed(&outcome.staged, counters, discovered)?;
            if written {
                if let Some(code) = &outcome.missing_code {
                    s.record_missing(profile_id, code)?;
                }
            }
            Ok(written)
        })?;

        if written {
            self.publish_status(job_id, JobStatus::Running, counters);
        }
        Ok(written)
    }
}

type PendingWrite = JoinHandle<StorageResult<bool>>;

/// Waits for the previous staging write
///
/// Returns false when that write found the job no longer active.
async fn flush(pending: &mut Option<PendingWrite>) -> Result<bool> {
    match pending.take() {
        Some(handle) => {
            let written = handle
                .await
                .map_err(|e| CatalogError::Storage(StorageError::TaskFailed(e.to_string())))??;
            Ok(written)
        }
        None => Ok(true),
    }
}

async fn run_job(shared: Arc<Shared>, job: JobContext, cancel: CancellationToken) {
    let mut counters = JobCounters {
        total: job.entries.len() as u32,
        total_products: job.entries.len() as u32,
        ..JobCounters::default()
    };

    match drive(&shared, &job, &cancel, &mut counters).await {
        Ok(()) => {}
        Err(e) if cancel.is_cancelled() => {
            tracing::debug!(job_id = %job.job_id, error = %e, "Job exited after cancellation");
        }
        Err(e) => shared.fail_job(&job.job_id, &e.to_string(), &counters),
    }

    let running = shared.lock_running().remove(&job.job_id);
    if let Some(running) = running {
        running.finished.cancel();
    }
}

async fn drive(
    shared: &Arc<Shared>,
    job: &JobContext,
    cancel: &CancellationToken,
    counters: &mut JobCounters,
) -> Result<()> {
    shared.set_status(&job.job_id, JobStatus::Running, counters)?;
    tracing::info!(job_id = %job.job_id, total = counters.total, "Job started");

    let mut queue: VecDeque<EntryUrl> = job.entries.iter().cloned().collect();
    let mut known: HashSet<String> = queue.iter().map(|e| e.url.clone()).collect();
    let mut processed_urls: HashSet<String> = HashSet::new();
    let mut pending: Option<PendingWrite> = None;

    while let Some(entry) = queue.pop_front() {
        if cancel.is_cancelled() {
            flush(&mut pending).await?;
            return Ok(());
        }

        if shared.pause.is_paused() {
            if !flush(&mut pending).await? {
                return Ok(());
            }
            shared.set_status(&job.job_id, JobStatus::Paused, counters)?;
            tracing::info!(job_id = %job.job_id, "Job paused");
            if !shared.pause.wait_resumed(cancel).await {
                return Ok(());
            }
            shared.set_status(&job.job_id, JobStatus::Running, counters)?;
            tracing::info!(job_id = %job.job_id, "Job resumed");
        }

        if !processed_urls.insert(entry.url.clone()) {
            if !flush(&mut pending).await? {
                return Ok(());
            }
            counters.processed += 1;
            counters.products_processed += 1;
            shared.with_storage(|s| s.update_counters(&job.job_id, counters))?;
            shared.publish_status(&job.job_id, JobStatus::Running, counters);
            tracing::debug!(job_id = %job.job_id, url = %entry.url, "Duplicate entry URL skipped");
            continue;
        }

        let outcome = shared.process_entry(job, &entry).await;

        // Counter order follows completed writes, not dispatch
        if !flush(&mut pending).await? {
            return Ok(());
        }

        let mut discovered = Vec::new();
        if job.job_type == JobType::Bulk && outcome.staged.status == ExtractionStatus::Ok {
            for url in &outcome.associated {
                if known.insert(url.clone()) {
                    discovered.push(url.clone());
                    queue.push_back(EntryUrl::new(url));
                }
            }
        }

        counters.processed += 1;
        counters.products_processed += 1;
        counters.total += discovered.len() as u32;
        counters.total_products += discovered.len() as u32;
        if outcome.staged.status == ExtractionStatus::Ok {
            counters.items_found += 1;
        }
        if !discovered.is_empty() {
            tracing::debug!(
                job_id = %job.job_id,
                url = %entry.url,
                discovered = discovered.len(),
                "Associated products appended"
            );
        }

        let writer = shared.clone();
        let profile_id = job.profile.id.clone();
        let snapshot = *counters;
        pending = Some(tokio::task::spawn_blocking(move || {
            writer.write_outcome(&profile_id, &outcome, &snapshot, &discovered)
        }));
    }

    if !flush(&mut pending).await? || cancel.is_cancelled() {
        return Ok(());
    }

    shared.set_status(&job.job_id, JobStatus::WaitingCommit, counters)?;
    tracing::info!(
        job_id = %job.job_id,
        processed = counters.processed,
        items_found = counters.items_found,
        "Job waiting for commit"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchedPage;
    use crate::jobs::progress::BroadcastNotifier;
    use crate::profile::ExtractionRules;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves canned pages; unknown URLs fail transiently
    struct MapFetcher {
        pages: HashMap<String, Result<String>>,
        delay: Duration,
        auth_failures: AtomicU32,
        logins: AtomicU32,
    }

    impl MapFetcher {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                delay: Duration::ZERO,
                auth_failures: AtomicU32::new(0),
                logins: AtomicU32::new(0),
            }
        }

        fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(html.to_string()));
            self
        }

        fn missing(mut self, url: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                Err(CatalogError::NotFound {
                    url: url.to_string(),
                }),
            );
            self
        }
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str, _auth_profile: Option<&str>) -> Result<FetchedPage> {
            tokio::time::sleep(self.delay).await;
            if self
                .auth_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CatalogError::AuthRequired {
                    url: url.to_string(),
                });
            }
            match self.pages.get(url) {
                Some(Ok(html)) => Ok(FetchedPage {
                    final_url: url.to_string(),
                    html: html.clone(),
                }),
                Some(Err(CatalogError::NotFound { url })) => {
                    Err(CatalogError::NotFound { url: url.clone() })
                }
                _ => Err(CatalogError::FetchFailed {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                }),
            }
        }

        async fn login(&self, _profile_id: &str) -> Result<()> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn product_html(name: &str, code: &str) -> String {
        format!(
            "<html><body><h1>{}</h1><p>SKU: {}</p></body></html>",
            name, code
        )
    }

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            worker_pool_size: 2,
            max_fetch_attempts: 2,
            retry_backoff_ms: 1,
            stop_grace_period_ms: 200,
            ..CrawlerConfig::default()
        }
    }

    fn orchestrator(fetcher: MapFetcher) -> (Orchestrator, BroadcastNotifier) {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let notifier = BroadcastNotifier::new(64);
        let orchestrator = Orchestrator::new(
            config(),
            storage,
            Arc::new(fetcher),
            Arc::new(notifier.clone()),
        );
        (orchestrator, notifier)
    }

    fn profile() -> BrandProfile {
        BrandProfile::public("acme", "Acme", "x.com")
    }

    #[tokio::test]
    async fn test_failed_url_does_not_abort_job() {
        let fetcher = MapFetcher::new().page("https://x.com/p/b", &product_html("Drill", "B-100"));
        let (orchestrator, _) = orchestrator(fetcher);

        let job_id = orchestrator
            .enqueue(
                &profile(),
                JobType::Enrich,
                vec![EntryUrl::new("https://x.com/p/a"), EntryUrl::new("https://x.com/p/b")],
            )
            .unwrap();
        let job = orchestrator.wait(&job_id).await.unwrap();

        assert_eq!(job.status, JobStatus::WaitingCommit);
        assert_eq!(job.counters.total, 2);
        assert_eq!(job.counters.processed, 2);
        assert_eq!(job.counters.items_found, 1);

        let staged = orchestrator.list_staged(&job_id).unwrap();
        let status_of = |url: &str| {
            staged
                .iter()
                .find(|row| row.canonical_url == url)
                .map(|row| row.status)
        };
        assert_eq!(status_of("https://x.com/p/a"), Some(ExtractionStatus::Error));
        assert_eq!(status_of("https://x.com/p/b"), Some(ExtractionStatus::Ok));
    }

    #[tokio::test]
    async fn test_duplicate_entry_counted_once_fetched() {
        let fetcher = MapFetcher::new().page("https://x.com/p/b", &product_html("Drill", "B-100"));
        let (orchestrator, _) = orchestrator(fetcher);

        let job_id = orchestrator
            .enqueue(
                &profile(),
                JobType::Enrich,
                vec![EntryUrl::new("https://x.com/p/b"), EntryUrl::new("https://X.com/p/b/")],
            )
            .unwrap();
        let job = orchestrator.wait(&job_id).await.unwrap();

        assert_eq!(job.counters.total, 2);
        assert_eq!(job.counters.processed, 2);
        assert_eq!(job.counters.items_found, 1);
        assert_eq!(orchestrator.list_staged(&job_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_records_missing_code() {
        let fetcher = MapFetcher::new().missing("https://x.com/p/zz-9");
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let orchestrator = Orchestrator::new(
            config(),
            storage.clone(),
            Arc::new(fetcher),
            Arc::new(BroadcastNotifier::new(8)),
        );
        let mut profile = profile();
        profile.rules =
            ExtractionRules::from_json(r#"{"url_pattern_template":"https://x.com/p/{code_lower}"}"#)
                .unwrap();

        let job_id = orchestrator
            .enqueue_codes(&profile, JobType::Update, &["ZZ-9"])
            .unwrap();
        let job = orchestrator.wait(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::WaitingCommit);

        let staged = orchestrator.list_staged(&job_id).unwrap();
        assert_eq!(staged[0].status, ExtractionStatus::NotFound);

        let missing = storage.lock().unwrap().list_missing("acme").unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].searched_code, "ZZ-9");
    }

    #[tokio::test]
    async fn test_query_reference_urls_stay_distinct() {
        let fetcher = MapFetcher::new()
            .page("https://x.com/detail.php?ref=AB12", &product_html("Drill", "AB12"))
            .page("https://x.com/detail.php?ref=CD34", &product_html("Saw", "CD34"));
        let (orchestrator, _) = orchestrator(fetcher);
        let mut profile = profile();
        profile.rules = ExtractionRules::from_json(
            r#"{"url_pattern_template":"https://x.com/detail.php?ref={code}"}"#,
        )
        .unwrap();

        let job_id = orchestrator
            .enqueue_codes(&profile, JobType::Update, &["AB12", "CD34"])
            .unwrap();
        let job = orchestrator.wait(&job_id).await.unwrap();

        assert_eq!(job.counters.total, 2);
        assert_eq!(job.counters.items_found, 2);
        let mut urls: Vec<String> = orchestrator
            .list_staged(&job_id)
            .unwrap()
            .into_iter()
            .map(|row| row.canonical_url)
            .collect();
        urls.sort();
        assert_eq!(
            urls,
            vec![
                "https://x.com/detail.php?ref=AB12".to_string(),
                "https://x.com/detail.php?ref=CD34".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_enqueue_codes_requires_web_pattern() {
        let (orchestrator, _) = orchestrator(MapFetcher::new());
        let result = orchestrator.enqueue_codes(&profile(), JobType::Update, &["A1"]);
        assert!(matches!(result, Err(CatalogError::InvalidRules(_))));
    }

    #[tokio::test]
    async fn test_empty_job_fails() {
        let (orchestrator, _) = orchestrator(MapFetcher::new());
        let job_id = orchestrator
            .enqueue(&profile(), JobType::Enrich, Vec::new())
            .unwrap();
        let job = orchestrator.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_text.is_some());
    }

    #[tokio::test]
    async fn test_auth_required_logs_in_once() {
        let mut fetcher = MapFetcher::new().page("https://x.com/p/b", &product_html("Saw", "S-1"));
        fetcher.auth_failures = AtomicU32::new(1);
        let fetcher = Arc::new(fetcher);
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let orchestrator = Orchestrator::new(
            config(),
            storage,
            fetcher.clone(),
            Arc::new(BroadcastNotifier::new(8)),
        );
        let mut profile = profile();
        profile.auth_required = true;
        profile.credential_id = Some("acme-login".to_string());

        let job_id = orchestrator
            .enqueue(&profile, JobType::Enrich, vec![EntryUrl::new("https://x.com/p/b")])
            .unwrap();
        let job = orchestrator.wait(&job_id).await.unwrap();

        assert_eq!(fetcher.logins.load(Ordering::SeqCst), 1);
        assert_eq!(job.counters.items_found, 1);
    }

    #[tokio::test]
    async fn test_second_auth_required_is_terminal_for_url() {
        let mut fetcher = MapFetcher::new().page("https://x.com/p/b", &product_html("Saw", "S-1"));
        fetcher.auth_failures = AtomicU32::new(2);
        let (orchestrator, _) = {
            let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
            let notifier = BroadcastNotifier::new(8);
            (
                Orchestrator::new(config(), storage, Arc::new(fetcher), Arc::new(notifier.clone())),
                notifier,
            )
        };
        let mut profile = profile();
        profile.auth_required = true;
        profile.credential_id = Some("acme-login".to_string());

        let job_id = orchestrator
            .enqueue(&profile, JobType::Enrich, vec![EntryUrl::new("https://x.com/p/b")])
            .unwrap();
        let job = orchestrator.wait(&job_id).await.unwrap();

        assert_eq!(job.status, JobStatus::WaitingCommit);
        assert_eq!(job.counters.items_found, 0);
        let staged = orchestrator.list_staged(&job_id).unwrap();
        assert_eq!(staged[0].status, ExtractionStatus::Error);
    }

    #[tokio::test]
    async fn test_bulk_job_appends_associated_products() {
        let hub = r#"<html><body><h1>Drill Kit</h1><p>SKU: K-1</p>
            <section class="accessories"><a href="/p/bit">Bit</a></section></body></html>"#;
        let fetcher = MapFetcher::new()
            .page("https://x.com/p/kit", hub)
            .page("https://x.com/p/bit", &product_html("Bit", "BT-2"));
        let (orchestrator, _) = orchestrator(fetcher);

        let job_id = orchestrator
            .enqueue(&profile(), JobType::Bulk, vec![EntryUrl::new("https://x.com/p/kit")])
            .unwrap();
        let job = orchestrator.wait(&job_id).await.unwrap();

        assert_eq!(job.counters.total_products, 2);
        assert_eq!(job.counters.processed, 2);
        assert!(job.entry_urls.contains(&"https://x.com/p/bit".to_string()));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_bounded() {
        let mut fetcher = MapFetcher::new();
        let mut entries = Vec::new();
        for n in 0..6 {
            let url = format!("https://x.com/p/{}", n);
            fetcher = fetcher.page(&url, &product_html("Item", &format!("IT-{}", n)));
            entries.push(EntryUrl::new(&url));
        }
        let (orchestrator, notifier) = orchestrator(fetcher);
        let mut rx = notifier.subscribe();

        let job_id = orchestrator.enqueue(&profile(), JobType::Enrich, entries).unwrap();
        orchestrator.wait(&job_id).await.unwrap();

        let mut last = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(event.processed >= last);
            assert!(event.processed <= event.total);
            last = event.processed;
        }
        assert_eq!(last, 6);
    }

    #[tokio::test]
    async fn test_commit_requires_waiting_commit() {
        let mut fetcher = MapFetcher::new().page("https://x.com/p/b", &product_html("Saw", "S-1"));
        fetcher.delay = Duration::from_millis(300);
        let (orchestrator, _) = orchestrator(fetcher);

        let job_id = orchestrator
            .enqueue(&profile(), JobType::Enrich, vec![EntryUrl::new("https://x.com/p/b")])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = orchestrator.commit(&job_id);
        assert!(matches!(result, Err(CatalogError::InvalidTransition { .. })));

        orchestrator.wait(&job_id).await.unwrap();
        assert_eq!(orchestrator.commit(&job_id).unwrap(), 1);
        assert_eq!(orchestrator.get_job(&job_id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_pause_holds_jobs_until_resume() {
        let mut fetcher = MapFetcher::new()
            .page("https://x.com/p/1", &product_html("One", "O-1"))
            .page("https://x.com/p/2", &product_html("Two", "T-2"));
        fetcher.delay = Duration::from_millis(100);
        let (orchestrator, _) = orchestrator(fetcher);

        let job_id = orchestrator
            .enqueue(
                &profile(),
                JobType::Enrich,
                vec![EntryUrl::new("https://x.com/p/1"), EntryUrl::new("https://x.com/p/2")],
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        orchestrator.pause();

        // The in-flight URL finishes, then the job holds
        tokio::time::sleep(Duration::from_millis(250)).await;
        let job = orchestrator.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Paused);
        assert_eq!(job.counters.processed, 1);

        orchestrator.resume();
        let job = orchestrator.wait(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::WaitingCommit);
        assert_eq!(job.counters.processed, 2);
    }

    #[tokio::test]
    async fn test_stop_paused_job_with_purge() {
        let mut fetcher = MapFetcher::new()
            .page("https://x.com/p/1", &product_html("One", "O-1"))
            .page("https://x.com/p/2", &product_html("Two", "T-2"));
        fetcher.delay = Duration::from_millis(50);
        let (orchestrator, notifier) = orchestrator(fetcher);
        let mut rx = notifier.subscribe();

        let job_id = orchestrator
            .enqueue(
                &profile(),
                JobType::Enrich,
                vec![EntryUrl::new("https://x.com/p/1"), EntryUrl::new("https://x.com/p/2")],
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.pause();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let purged = orchestrator.stop(&job_id, true).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(orchestrator.get_job(&job_id).unwrap().status, JobStatus::Stopped);
        assert!(orchestrator.list_staged(&job_id).unwrap().is_empty());
        orchestrator.resume();

        let mut saw_stopped = false;
        while let Ok(event) = rx.try_recv() {
            saw_stopped |= event.topic == ProgressTopic::Stopped;
        }
        assert!(saw_stopped);

        // Stopping twice is an invalid transition
        assert!(matches!(
            orchestrator.stop(&job_id, false).await,
            Err(CatalogError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_aborts_after_grace_period() {
        let mut fetcher = MapFetcher::new().page("https://x.com/p/1", &product_html("One", "O-1"));
        fetcher.delay = Duration::from_secs(30);
        let (orchestrator, _) = orchestrator(fetcher);

        let job_id = orchestrator
            .enqueue(&profile(), JobType::Enrich, vec![EntryUrl::new("https://x.com/p/1")])
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        orchestrator.stop(&job_id, false).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        let job = orchestrator.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Stopped);
        assert_eq!(job.counters.processed, 0);
        assert!(orchestrator.list_staged(&job_id).unwrap().is_empty());

        // The aborted fetch gave its pool slot back
        assert_eq!(orchestrator.shared.pool.available(), 2);
    }

    #[tokio::test]
    async fn test_recover_interrupted_jobs() {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        {
            let mut s = storage.lock().unwrap();
            s.create_job(&JobRecord {
                id: "j1".to_string(),
                job_type: JobType::Enrich,
                profile_id: "acme".to_string(),
                entry_urls: vec!["https://x.com/p/1".to_string()],
                rules: ExtractionRules::default(),
                status: JobStatus::Pending,
                counters: JobCounters::default(),
                created_at: String::new(),
                updated_at: String::new(),
                error_text: None,
            })
            .unwrap();
            s.transition_job("j1", JobStatus::Running, None).unwrap();
        }
        let orchestrator = Orchestrator::new(
            config(),
            storage,
            Arc::new(MapFetcher::new()),
            Arc::new(BroadcastNotifier::new(8)),
        );

        assert_eq!(orchestrator.recover_interrupted().unwrap(), vec!["j1".to_string()]);
        let job = orchestrator.get_job("j1").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(orchestrator.list_active_jobs().unwrap().is_empty());
    }
}
