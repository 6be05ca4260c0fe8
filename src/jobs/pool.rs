//! Shared execution resources: the fetch worker pool, the per-profile
//! session gate, and the process-wide pause flag

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Bounded pool of fetch slots shared by every job
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Waits for a free slot; the slot returns to the pool when the permit drops
    ///
    /// Returns None only if the pool was closed.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().acquire_owned().await.ok()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Serializes use of one profile's authenticated session
///
/// The guard is held only around a single authenticated fetch (or login),
/// never for a job's whole lifetime. Profiles without login never touch it.
#[derive(Default)]
pub struct SessionGate {
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, profile_id: &str) -> OwnedMutexGuard<()> {
        let session = {
            // A poisoned map still holds valid Arcs
            let mut sessions = self
                .sessions
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            sessions
                .entry(profile_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        session.lock_owned().await
    }
}

/// Process-wide pause flag read by every job between entry URLs
#[derive(Default)]
pub struct PauseFlag {
    paused: AtomicBool,
    resumed: Notify,
}

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Waits until the flag clears
    ///
    /// Returns false if `cancel` fired first.
    pub async fn wait_resumed(&self, cancel: &CancellationToken) -> bool {
        loop {
            // Register before checking so a resume in between is not missed
            let resumed = self.resumed.notified();
            if !self.is_paused() {
                return true;
            }
            tokio::select! {
                _ = resumed => {}
                _ = cancel.cancelled() => return false,
            }
        }
    }
}
