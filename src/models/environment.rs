//! # Environment Model
//!
//! A sync target: one runtime deployment plus the Git branch/folder acting
//! as its promotion pipeline. The scheduler iterates these rows; the
//! orchestrator advances the two retry-gating timestamps on every attempt
//! and every terminal job transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

use crate::constants::{DEFAULT_SYNC_INTERVAL_SECS, GIT_WORKFLOW_PREFIX};

use super::states::EnvironmentClass;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Environment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub class: EnvironmentClass,
    /// Branch whose head commit defines this environment's Git state.
    pub git_branch: String,
    /// Folder under `workflows/` holding this environment's definitions.
    pub git_folder: String,
    /// When set, sync reads this commit instead of the branch head.
    pub git_pinned_commit: Option<String>,
    /// Per-environment override of the scheduler eligibility interval.
    pub sync_interval_secs: Option<i64>,
    pub sync_enabled: bool,
    /// Advanced unconditionally BEFORE every job-creation attempt, so even a
    /// failed creation delays the next scheduler-driven retry.
    pub last_sync_attempted_at: Option<DateTime<Utc>>,
    /// Advanced on every terminal job transition, success and failure alike.
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Environment {
    /// Whether mappings synced into this environment keep the full workflow
    /// payload (only the designated source-of-truth class does).
    pub fn retains_full_payload(&self) -> bool {
        self.class.retains_payload()
    }

    /// Scheduler eligibility interval, falling back to the system default.
    pub fn sync_interval(&self) -> Duration {
        let secs = self
            .sync_interval_secs
            .and_then(|s| u64::try_from(s).ok())
            .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    /// Full Git folder path holding this environment's workflow files.
    pub fn workflow_folder(&self) -> String {
        format!("{}/{}", GIT_WORKFLOW_PREFIX, self.git_folder)
    }
}
