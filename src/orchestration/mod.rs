//! # Sync Orchestration
//!
//! The idempotency and lifecycle layer: turns "please sync environment E"
//! into exactly one in-flight [`SyncJob`], tracks progress and terminal
//! transitions, and always advances the environment's retry-gating
//! timestamps.
//!
//! ## Protocol
//!
//! ```text
//! request_sync ──▶ existing pending/running job? ──yes──▶ (job, is_new=false)
//!       │ no
//!       ▼
//! advance last_sync_attempted_at      (unconditional, BEFORE creation)
//!       │
//!       ▼
//! atomic create ──unique violation──▶ re-query ──▶ (job, is_new=false)
//!       │ ok
//!       ▼
//! (job, is_new=true)
//! ```
//!
//! Callers never wait on a job: they poll `sync_status` or subscribe to the
//! progress channel. Mutual exclusion is entirely storage-side (multiple
//! orchestrator instances may run concurrently), so a lost creation race is
//! resolved by re-querying, never surfaced as an error.
//!
//! A `running` job whose process died is not reclaimed here; recovery is
//! operational (liveness timeout on running jobs is recommended but out of
//! scope).

pub mod progress;

pub use progress::{
    JobProgressRecorder, NoopProgressSink, ProgressSink, PublishedSyncEvent, SyncEvent,
    SyncEventPublisher,
};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{NewSyncJob, SyncJob, SyncJobKind, SyncJobState};
use crate::storage::SyncStore;

/// Idempotent job lifecycle manager for sync passes.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Arc<dyn SyncStore>,
    events: SyncEventPublisher,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self {
            store,
            events: SyncEventPublisher::default(),
        }
    }

    pub fn with_events(store: Arc<dyn SyncStore>, events: SyncEventPublisher) -> Self {
        Self { store, events }
    }

    /// The progress channel carrying batch and lifecycle events.
    pub fn events(&self) -> &SyncEventPublisher {
        &self.events
    }

    /// Request a sync pass for one environment. Returns the job and whether
    /// this call created it (`true`) or adopted an already in-flight one
    /// (`false`).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, environment_id = %environment_id, kind = %kind))]
    pub async fn request_sync(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<(SyncJob, bool)> {
        if let Some(existing) = self
            .store
            .find_active_job(tenant_id, environment_id, kind)
            .await?
        {
            debug!(job_id = %existing.id, "Adopting in-flight sync job");
            return Ok((existing, false));
        }

        // Advanced unconditionally before creation: even a failed create
        // must delay the next scheduler-driven retry. The ordering is
        // load-bearing, not redundant.
        self.store
            .touch_sync_attempted(environment_id, Utc::now())
            .await?;

        loop {
            match self
                .store
                .create_job(NewSyncJob {
                    tenant_id,
                    environment_id,
                    kind,
                })
                .await
            {
                Ok(job) => {
                    info!(job_id = %job.id, "Created sync job");
                    self.events.publish(SyncEvent::JobTransition {
                        job_id: job.id,
                        state: SyncJobState::Pending,
                    });
                    return Ok((job, true));
                }
                Err(SyncError::JobConflict) => {
                    // Lost a creation race to a concurrent caller. The
                    // winner's job may already have finished by the time we
                    // re-query, in which case we try to create again.
                    if let Some(existing) = self
                        .store
                        .find_active_job(tenant_id, environment_id, kind)
                        .await?
                    {
                        debug!(job_id = %existing.id, "Lost creation race, adopting winner's job");
                        return Ok((existing, false));
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Transition a pending job to running and build the checkpoint sink
    /// the engine writes through. The sink resumes from any checkpoint the
    /// job already carries.
    pub async fn begin(&self, job: &SyncJob) -> Result<(SyncJob, JobProgressRecorder)> {
        let running = self.store.mark_job_running(job.id).await?;
        self.events.publish(SyncEvent::JobTransition {
            job_id: running.id,
            state: SyncJobState::Running,
        });
        let recorder = JobProgressRecorder::new(
            Arc::clone(&self.store),
            self.events.clone(),
            running.id,
            running.checkpoint(),
        );
        Ok((running, recorder))
    }

    /// Terminal success: record the result and advance `last_sync_at`.
    #[instrument(skip(self, result), fields(job_id = %job.id))]
    pub async fn complete_sync(&self, job: &SyncJob, result: serde_json::Value) -> Result<SyncJob> {
        let completed = self.store.complete_job(job.id, result).await?;
        self.store
            .touch_synced(job.environment_id, Utc::now())
            .await?;
        self.events.publish(SyncEvent::JobTransition {
            job_id: completed.id,
            state: SyncJobState::Completed,
        });
        info!("Sync job completed");
        Ok(completed)
    }

    /// Terminal failure: record the error and STILL advance `last_sync_at`,
    /// so the scheduler does not hot-loop on a broken environment.
    #[instrument(skip(self), fields(job_id = %job.id))]
    pub async fn fail_sync(&self, job: &SyncJob, error: &str) -> Result<SyncJob> {
        let failed = self.store.fail_job(job.id, error).await?;
        self.store
            .touch_synced(job.environment_id, Utc::now())
            .await?;
        self.events.publish(SyncEvent::JobTransition {
            job_id: failed.id,
            state: SyncJobState::Failed,
        });
        warn!(error = %error, "Sync job failed");
        Ok(failed)
    }

    /// Current job status for the control surface (`GET syncStatus`).
    pub async fn sync_status(&self, job_id: Uuid) -> Result<SyncJob> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("sync job {job_id}")))
    }
}
