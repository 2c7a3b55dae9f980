//! # Sync Job Model
//!
//! Lifecycle record for one synchronization pass, scoped to
//! (tenant, environment, kind). The store enforces that at most one
//! non-terminal job per scope exists at a time; that constraint, not an
//! in-process lock, is what makes concurrent `request_sync` calls collapse
//! onto a single job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::states::{SyncJobKind, SyncJobState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SyncJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub kind: SyncJobKind,
    pub state: SyncJobState,
    /// Checkpoint cursor, serialized [`SyncCheckpoint`]. A restarted job
    /// resumes from here instead of reprocessing.
    pub progress: Option<serde_json::Value>,
    /// Serialized engine outcome, set on completion.
    pub result: Option<serde_json::Value>,
    /// Failure description, set when the job fails.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Deserialize the stored checkpoint, if any. A malformed checkpoint is
    /// treated as absent (the pass restarts from the beginning).
    pub fn checkpoint(&self) -> Option<SyncCheckpoint> {
        self.progress
            .as_ref()
            .and_then(|p| serde_json::from_value(p.clone()).ok())
    }
}

/// New sync job for creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSyncJob {
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub kind: SyncJobKind,
}

/// Batch checkpoint recorded after every processed batch.
///
/// `last_processed_index` is the index one past the last fully processed
/// workflow in listing order, so a resumed pass starts there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub last_processed_index: usize,
    pub total_count: usize,
}

impl SyncCheckpoint {
    pub fn percentage(&self) -> f64 {
        if self.total_count == 0 {
            100.0
        } else {
            (self.last_processed_index as f64 / self.total_count as f64) * 100.0
        }
    }
}
