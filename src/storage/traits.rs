//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::extract::FileKind;
use crate::jobs::JobStatus;
use crate::profile::BrandProfile;
use crate::storage::{
    AssetRecord, CatalogPage, CatalogProduct, CategoryNode, JobCounters, JobRecord,
    MissingProductRef, StagedProduct,
};
use crate::taxonomy::TaxonomyNode;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Job records and their durable counters
pub trait JobStore {
    // ===== Job Management =====

    /// Inserts a new job in `pending`
    fn create_job(&mut self, job: &JobRecord) -> StorageResult<()>;

    /// Gets a job by id
    fn get_job(&self, job_id: &str) -> StorageResult<JobRecord>;

    /// Lists jobs whose status is one of `statuses`, oldest first
    fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> StorageResult<Vec<JobRecord>>;

    /// Moves a job to `next`, rejecting transitions the state machine forbids
    ///
    /// # Returns
    ///
    /// The status the job held before the transition
    fn transition_job(
        &mut self,
        job_id: &str,
        next: JobStatus,
        error_text: Option<&str>,
    ) -> StorageResult<JobStatus>;

    /// Overwrites the job's counters
    fn update_counters(&mut self, job_id: &str, counters: &JobCounters) -> StorageResult<()>;

    /// Appends entry URLs discovered while the job runs
    fn append_entry_urls(&mut self, job_id: &str, urls: &[String]) -> StorageResult<()>;

    /// Marks `running`/`paused` jobs left by a dead process as `failed`
    ///
    /// # Returns
    ///
    /// The ids of the recovered jobs
    fn fail_interrupted_jobs(&mut self, error_text: &str) -> StorageResult<Vec<String>>;
}

/// Per-job staging of extraction results
pub trait StagingStore {
    // ===== Staging =====

    /// Inserts or replaces the row for (job, canonical URL)
    fn upsert_staged(&mut self, product: &StagedProduct) -> StorageResult<()>;

    /// Stages one processed URL and writes the job's counters in one
    /// transaction, appending any entry URLs it discovered
    ///
    /// # Returns
    ///
    /// False, writing nothing, when the job is no longer `running` or
    /// `paused` (for example after a stop)
    fn stage_processed(
        &mut self,
        product: &StagedProduct,
        counters: &JobCounters,
        discovered_urls: &[String],
    ) -> StorageResult<bool>;

    /// Lists a job's staged rows in staging order
    fn list_staged(&self, job_id: &str) -> StorageResult<Vec<StagedProduct>>;

    /// Deletes a job's staged rows
    fn delete_staged(&mut self, job_id: &str) -> StorageResult<usize>;

    /// Writes `stopped` and optionally purges staging in one transaction
    fn stop_job(&mut self, job_id: &str, purge: bool) -> StorageResult<usize>;

    /// Upserts every `ok` staged row into the catalog, registers the files
    /// those rows link to, and marks the job `completed`, all in one
    /// transaction
    ///
    /// # Returns
    ///
    /// The number of rows applied
    fn promote(&mut self, job_id: &str) -> StorageResult<usize>;
}

/// The permanent catalog, keyed by (profile, canonical URL)
pub trait CatalogStore {
    // ===== Catalog =====

    fn get_product(&self, profile_id: &str, canonical_url: &str) -> StorageResult<Option<CatalogProduct>>;

    /// Searches name, code, and URL; `page` is 1-based
    fn search_catalog(
        &self,
        profile_id: &str,
        query: &str,
        page: u32,
        page_size: u32,
    ) -> StorageResult<CatalogPage>;

    /// Category tree with product counts from committed category paths
    fn category_tree(&self, profile_id: &str) -> StorageResult<Vec<CategoryNode>>;

    fn count_products(&self, profile_id: &str) -> StorageResult<u32>;

    fn delete_product(&mut self, profile_id: &str, canonical_url: &str) -> StorageResult<bool>;

    fn clear_profile_products(&mut self, profile_id: &str) -> StorageResult<usize>;

    // ===== Missing Products =====

    /// Records a code lookup that found no page, bumping its occurrence count
    fn record_missing(&mut self, profile_id: &str, code: &str) -> StorageResult<()>;

    fn list_missing(&self, profile_id: &str) -> StorageResult<Vec<MissingProductRef>>;
}

/// Registry of files linked from committed products and their downloads
pub trait AssetStore {
    /// Lists a profile's assets of the given kinds (all kinds when empty),
    /// oldest first
    fn list_assets(&self, profile_id: &str, kinds: &[FileKind]) -> StorageResult<Vec<AssetRecord>>;

    /// Records a completed download and clears any earlier error
    fn mark_asset_downloaded(
        &mut self,
        profile_id: &str,
        original_url: &str,
        local_path: &str,
        file_hash: &str,
    ) -> StorageResult<()>;

    /// Records a failed download attempt, keeping any earlier local path
    fn mark_asset_failed(
        &mut self,
        profile_id: &str,
        original_url: &str,
        http_status: Option<u16>,
        error: &str,
    ) -> StorageResult<()>;

    /// Notes that an already-downloaded file was found on disk
    fn touch_asset(&mut self, profile_id: &str, original_url: &str) -> StorageResult<()>;
}

/// Persisted taxonomy trees, one per profile
pub trait TaxonomyStore {
    /// Replaces the profile's tree
    fn save_tree(&mut self, profile_id: &str, root: &TaxonomyNode) -> StorageResult<()>;

    /// Rebuilds the profile's tree, if one was saved
    fn load_tree(&self, profile_id: &str) -> StorageResult<Option<TaxonomyNode>>;
}

/// Brand profiles with their current-shape rules
pub trait ProfileStore {
    fn upsert_profile(&mut self, profile: &BrandProfile) -> StorageResult<()>;

    fn get_profile(&self, profile_id: &str) -> StorageResult<BrandProfile>;

    fn list_profiles(&self) -> StorageResult<Vec<BrandProfile>>;

    /// Records the outcome of a rendering check for a stored profile
    fn set_requires_rendering(&mut self, profile_id: &str, requires_rendering: bool) -> StorageResult<()>;
}

/// Everything the orchestrator and CLI need from a backend
pub trait Storage:
    JobStore + StagingStore + CatalogStore + AssetStore + TaxonomyStore + ProfileStore
{
}

impl<T> Storage for T where
    T: JobStore + StagingStore + CatalogStore + AssetStore + TaxonomyStore + ProfileStore
{
}
