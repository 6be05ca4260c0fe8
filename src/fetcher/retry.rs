//! Retry with exponential backoff for transient fetch errors
//!
//! Only [`CatalogError::is_transient`] errors are retried. Everything else
//! (authentication walls, 404s, unextractable bodies) is returned at once.

use crate::{CatalogError, Result};
use std::future::Future;
use std::time::Duration;

/// Runs `operation` up to `max_attempts` times, sleeping
/// `backoff_base_ms * 2^attempt` between transient failures
///
/// | Attempt | Sleep before next attempt |
/// |---------|--------------------------|
/// | 1 (initial) | base × 2^0 |
/// | 2 | base × 2^1 |
/// | 3 | base × 2^2 |
///
/// The last error is returned once attempts are exhausted.
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        let err: CatalogError = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        attempt += 1;
        if !err.is_transient() || attempt >= max_attempts {
            return Err(err);
        }

        let delay_ms = backoff_base_ms.saturating_mul(1u64 << (attempt - 1).min(62));
        tracing::warn!(
            attempt,
            max_attempts,
            delay_ms,
            error = %err,
            "transient fetch error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
}
