//! Gated page fetching shared by jobs and taxonomy scans

use crate::fetcher::{retry_with_backoff, FetchedFile, FetchedPage, PageFetcher};
use crate::jobs::{SessionGate, WorkerPool};
use crate::{CatalogError, Result};
use std::future::Future;
use std::sync::Arc;

/// Wraps a [`PageFetcher`] with the rules every caller must follow
///
/// Each attempt takes the profile's session gate (authenticated fetches
/// only) and then a pool slot, and releases both before any backoff sleep.
/// A rejected session triggers one login and a fresh retry budget.
#[derive(Clone)]
pub struct SessionFetcher {
    fetcher: Arc<dyn PageFetcher>,
    sessions: Arc<SessionGate>,
    pool: Option<WorkerPool>,
    max_attempts: u32,
    backoff_ms: u64,
}

impl SessionFetcher {
    /// Single attempt, no pool
    pub fn new(fetcher: Arc<dyn PageFetcher>, sessions: Arc<SessionGate>) -> Self {
        Self {
            fetcher,
            sessions,
            pool: None,
            max_attempts: 1,
            backoff_ms: 0,
        }
    }

    /// Bounds every attempt by a slot from `pool`
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Retries transient failures up to `max_attempts` with exponential backoff
    pub fn with_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_ms = backoff_ms;
        self
    }

    /// Fetches `url`, inside `auth_profile`'s session when given
    pub async fn fetch(&self, url: &str, auth_profile: Option<&str>) -> Result<FetchedPage> {
        self.gated(url, auth_profile, move || self.fetcher.fetch(url, auth_profile)).await
    }

    /// Downloads a linked file under the same gate, pool and retry rules
    pub async fn download(&self, url: &str, auth_profile: Option<&str>) -> Result<FetchedFile> {
        self.gated(url, auth_profile, move || self.fetcher.download(url, auth_profile)).await
    }

    async fn gated<T, F, Fut>(&self, url: &str, auth_profile: Option<&str>, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let first = self.with_retry_budget(url, auth_profile, &call).await;
        match (first, auth_profile) {
            (Err(CatalogError::AuthRequired { .. }), Some(profile_id)) => {
                tracing::info!(profile_id, url, "Session rejected, logging in");
                self.login(profile_id).await?;
                self.with_retry_budget(url, auth_profile, &call).await
            }
            (other, _) => other,
        }
    }

    async fn with_retry_budget<T, F, Fut>(
        &self,
        url: &str,
        auth_profile: Option<&str>,
        call: &F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_backoff(self.max_attempts, self.backoff_ms, move || async move {
            let _session = match auth_profile {
                Some(profile_id) => Some(self.sessions.lock(profile_id).await),
                None => None,
            };
            let _slot = self.slot(url).await?;
            call().await
        })
        .await
    }

    async fn login(&self, profile_id: &str) -> Result<()> {
        let _session = self.sessions.lock(profile_id).await;
        let _slot = self.slot(profile_id).await?;
        self.fetcher.login(profile_id).await
    }

    async fn slot(&self, url: &str) -> Result<Option<tokio::sync::OwnedSemaphorePermit>> {
        match &self.pool {
            None => Ok(None),
            Some(pool) => pool.acquire().await.map(Some).ok_or_else(|| CatalogError::FetchFailed {
                url: url.to_string(),
                message: "worker pool closed".to_string(),
            }),
        }
    }
}
