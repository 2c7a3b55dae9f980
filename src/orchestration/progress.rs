//! # Progress Channel
//!
//! Best-effort observability for running sync jobs: each batch completion
//! and each job state transition is broadcast to subscribers. A missed event
//! never affects correctness, only UI freshness; the durable checkpoint
//! lives on the job row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::Result;
use crate::models::{SyncCheckpoint, SyncJobState};
use crate::storage::SyncStore;

/// Event broadcast on the progress channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A batch finished; `percentage` is derived from current/total.
    Progress {
        job_id: Uuid,
        current: usize,
        total: usize,
        percentage: f64,
    },
    /// A job moved through its lifecycle.
    JobTransition {
        job_id: Uuid,
        state: SyncJobState,
    },
}

/// High-throughput broadcast publisher for sync lifecycle events.
#[derive(Debug, Clone)]
pub struct SyncEventPublisher {
    sender: broadcast::Sender<PublishedSyncEvent>,
}

/// Event that has been published.
#[derive(Debug, Clone)]
pub struct PublishedSyncEvent {
    pub event: SyncEvent,
    pub published_at: DateTime<Utc>,
}

impl SyncEventPublisher {
    /// Create a new publisher with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error; delivery is
    /// best-effort by design.
    pub fn publish(&self, event: SyncEvent) {
        let published = PublishedSyncEvent {
            event,
            published_at: Utc::now(),
        };
        let _ = self.sender.send(published);
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedSyncEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SyncEventPublisher {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

/// Checkpoint sink handed to the runtime sync engine. The engine records a
/// checkpoint after every batch; where that checkpoint goes (job row, test
/// buffer, nowhere) is the caller's choice.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Checkpoint to resume from, if the pass is a restart.
    fn resume_from(&self) -> Option<SyncCheckpoint>;

    /// Record a batch checkpoint.
    async fn checkpoint(&self, checkpoint: SyncCheckpoint) -> Result<()>;
}

/// Sink that discards checkpoints. For ad-hoc passes outside job tracking.
pub struct NoopProgressSink;

#[async_trait]
impl ProgressSink for NoopProgressSink {
    fn resume_from(&self) -> Option<SyncCheckpoint> {
        None
    }

    async fn checkpoint(&self, _checkpoint: SyncCheckpoint) -> Result<()> {
        Ok(())
    }
}

/// Job-backed sink: persists each checkpoint to the job row (the unit of
/// crash-recoverability) and broadcasts a progress event.
pub struct JobProgressRecorder {
    store: Arc<dyn SyncStore>,
    events: SyncEventPublisher,
    job_id: Uuid,
    resume: Option<SyncCheckpoint>,
}

impl JobProgressRecorder {
    pub fn new(
        store: Arc<dyn SyncStore>,
        events: SyncEventPublisher,
        job_id: Uuid,
        resume: Option<SyncCheckpoint>,
    ) -> Self {
        Self {
            store,
            events,
            job_id,
            resume,
        }
    }
}

#[async_trait]
impl ProgressSink for JobProgressRecorder {
    fn resume_from(&self) -> Option<SyncCheckpoint> {
        self.resume
    }

    async fn checkpoint(&self, checkpoint: SyncCheckpoint) -> Result<()> {
        self.store
            .record_job_progress(self.job_id, serde_json::to_value(checkpoint)?)
            .await?;
        self.events.publish(SyncEvent::Progress {
            job_id: self.job_id,
            current: checkpoint.last_processed_index,
            total: checkpoint.total_count,
            percentage: checkpoint.percentage(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = SyncEventPublisher::new(8);
        publisher.publish(SyncEvent::JobTransition {
            job_id: Uuid::new_v4(),
            state: SyncJobState::Running,
        });
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let publisher = SyncEventPublisher::new(8);
        let mut rx = publisher.subscribe();

        let job_id = Uuid::new_v4();
        publisher.publish(SyncEvent::Progress {
            job_id,
            current: 25,
            total: 100,
            percentage: 25.0,
        });

        let received = rx.recv().await.unwrap();
        match received.event {
            SyncEvent::Progress { current, total, .. } => {
                assert_eq!(current, 25);
                assert_eq!(total, 100);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
