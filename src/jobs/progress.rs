//! Progress events and the outbound notification port
//!
//! Events are a derived, lossy broadcast. The durable `status` and
//! `counters` columns of the job row stay the single source of truth, so
//! every progress event carries the full counter set rather than a delta.

use crate::jobs::JobStatus;
use crate::storage::{JobCounters, JobRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Topic an event is published under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTopic {
    /// Counters after a processed entry URL or a status change
    Progress,
    /// The job's staged data was committed
    Completed,
    /// The job was stopped by an operator
    Stopped,
}

/// Level-triggered progress payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub topic: ProgressTopic,
    pub job_id: String,
    pub status: JobStatus,
    pub processed: u32,
    pub total: u32,
    pub items_found: u32,
    pub total_products: u32,
    pub products_processed: u32,
}

impl ProgressEvent {
    pub fn new(topic: ProgressTopic, job_id: &str, status: JobStatus, counters: &JobCounters) -> Self {
        Self {
            topic,
            job_id: job_id.to_string(),
            status,
            processed: counters.processed,
            total: counters.total,
            items_found: counters.items_found,
            total_products: counters.total_products,
            products_processed: counters.products_processed,
        }
    }

    pub fn progress(job_id: &str, status: JobStatus, counters: &JobCounters) -> Self {
        Self::new(ProgressTopic::Progress, job_id, status, counters)
    }

    /// Event describing a job row as stored
    pub fn from_record(topic: ProgressTopic, job: &JobRecord) -> Self {
        Self::new(topic, &job.id, job.status, &job.counters)
    }
}

/// Outbound notification port
///
/// `publish` is fire-and-forget and must never block job execution.
pub trait ProgressNotifier: Send + Sync {
    fn publish(&self, event: ProgressEvent);
}

/// Broadcasts events to every live subscriber over a bounded channel
///
/// Slow subscribers lose the oldest events (`RecvError::Lagged`); with no
/// subscriber at all events are dropped.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressNotifier for BroadcastNotifier {
    fn publish(&self, event: ProgressEvent) {
        // No receivers is not an error for a best-effort stream
        let _ = self.tx.send(event);
    }
}

/// Discards every event
pub struct NullNotifier;

impl ProgressNotifier for NullNotifier {
    fn publish(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(processed: u32) -> JobCounters {
        JobCounters {
            total: 3,
            processed,
            items_found: processed,
            total_products: 3,
            products_processed: processed,
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(4);
        notifier.publish(ProgressEvent::progress("j1", JobStatus::Running, &counters(1)));
    }

    #[tokio::test]
    async fn test_subscriber_receives_full_counters() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();
        notifier.publish(ProgressEvent::progress("j1", JobStatus::Running, &counters(2)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic, ProgressTopic::Progress);
        assert_eq!(event.processed, 2);
        assert_eq!(event.total, 3);
        assert_eq!(event.total_products, 3);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let notifier = BroadcastNotifier::new(2);
        let mut rx = notifier.subscribe();
        for n in 0..5 {
            notifier.publish(ProgressEvent::progress("j1", JobStatus::Running, &counters(n)));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(rx.recv().await.unwrap().processed, 3);
    }

    #[test]
    fn test_payload_is_camel_case() {
        let event = ProgressEvent::progress("j1", JobStatus::WaitingCommit, &counters(3));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobId"], "j1");
        assert_eq!(json["status"], "waiting_commit");
        assert_eq!(json["itemsFound"], 3);
        assert_eq!(json["topic"], "progress");
    }
}
