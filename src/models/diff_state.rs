//! # Workflow Diff State Model
//!
//! Materialized reconciliation result for one canonical workflow between a
//! source and a target environment. Keyed uniquely by (tenant, source
//! environment, target environment, canonical-id). Owned exclusively by the
//! reconciliation engine.
//!
//! This table is a cache: every row is fully derivable from the mapping and
//! Git-state tables, so it is always safe to overwrite or recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::states::DiffStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowDiffState {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source_environment_id: Uuid,
    pub target_environment_id: Uuid,
    pub canonical_id: Uuid,
    pub diff_status: DiffStatus,
    /// The four contributing hashes, as of `computed_at`.
    pub source_git_hash: Option<String>,
    pub target_git_hash: Option<String>,
    pub source_env_hash: Option<String>,
    pub target_env_hash: Option<String>,
    /// Present only when `diff_status == Conflict`.
    pub conflict_metadata: Option<serde_json::Value>,
    pub computed_at: DateTime<Utc>,
}

impl WorkflowDiffState {
    /// Whether a fresh hash tuple matches the stored one, in which case
    /// recomputation can be skipped entirely.
    pub fn hashes_match(
        &self,
        source_git: Option<&str>,
        target_git: Option<&str>,
        source_env: Option<&str>,
        target_env: Option<&str>,
    ) -> bool {
        self.source_git_hash.as_deref() == source_git
            && self.target_git_hash.as_deref() == target_git
            && self.source_env_hash.as_deref() == source_env
            && self.target_env_hash.as_deref() == target_env
    }
}

/// Full-row replacement record, keyed by the unique
/// (tenant, source env, target env, canonical-id) constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffStateUpsert {
    pub tenant_id: Uuid,
    pub source_environment_id: Uuid,
    pub target_environment_id: Uuid,
    pub canonical_id: Uuid,
    pub diff_status: DiffStatus,
    pub source_git_hash: Option<String>,
    pub target_git_hash: Option<String>,
    pub source_env_hash: Option<String>,
    pub target_env_hash: Option<String>,
    pub conflict_metadata: Option<serde_json::Value>,
}

/// Captured on conflict for downstream manual resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictMetadata {
    pub source_git_hash: Option<String>,
    pub target_git_hash: Option<String>,
    pub source_env_hash: Option<String>,
    pub target_env_hash: Option<String>,
    /// When each side's Git state was last recorded, if known.
    pub source_git_synced_at: Option<DateTime<Utc>>,
    pub target_git_synced_at: Option<DateTime<Utc>>,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_match() {
        let state = WorkflowDiffState {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            source_environment_id: Uuid::new_v4(),
            target_environment_id: Uuid::new_v4(),
            canonical_id: Uuid::new_v4(),
            diff_status: DiffStatus::Modified,
            source_git_hash: Some("h1".to_string()),
            target_git_hash: Some("h2".to_string()),
            source_env_hash: None,
            target_env_hash: Some("h2".to_string()),
            conflict_metadata: None,
            computed_at: Utc::now(),
        };

        assert!(state.hashes_match(Some("h1"), Some("h2"), None, Some("h2")));
        assert!(!state.hashes_match(Some("h1"), Some("h2"), Some("h3"), Some("h2")));
        assert!(!state.hashes_match(None, Some("h2"), None, Some("h2")));
    }
}
