//! # Workflow Environment Mapping Model
//!
//! Binds a canonical workflow (nullable) to a concrete runtime instance in
//! one environment. Keyed uniquely by (tenant, environment,
//! runtime-instance-id). Mutated only by the runtime sync engine and by Git
//! sidecar ingestion; rows are never deleted, only status-transitioned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Result, SyncError};

use super::states::MappingStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowEnvironmentMapping {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    /// Identifier of the workflow instance inside the runtime engine.
    /// Preserved across `missing` transitions for audit.
    pub runtime_instance_id: String,
    /// Invariant: `status == Linked` implies this is set.
    pub canonical_id: Option<Uuid>,
    pub status: MappingStatus,
    /// Fingerprint of the runtime copy as of the last sync.
    pub environment_content_hash: Option<String>,
    /// Runtime-reported modification time; unchanged value short-circuits
    /// the whole per-workflow sync step.
    pub runtime_updated_at: Option<DateTime<Utc>>,
    /// Full workflow payload; populated only in the environment class
    /// designated source-of-truth-for-new-work, omitted elsewhere to bound
    /// storage.
    pub payload: Option<serde_json::Value>,
    pub last_synced_at: DateTime<Utc>,
}

/// Upsert record for a mapping, keyed by the unique
/// (tenant, environment, runtime-instance-id) constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingUpsert {
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub runtime_instance_id: String,
    pub canonical_id: Option<Uuid>,
    pub status: MappingStatus,
    pub environment_content_hash: Option<String>,
    pub runtime_updated_at: Option<DateTime<Utc>>,
    pub payload: Option<serde_json::Value>,
}

impl MappingUpsert {
    /// Enforce the linked-implies-canonical invariant before any write.
    /// Both store implementations call this.
    pub fn validate(&self) -> Result<()> {
        if self.status == MappingStatus::Linked && self.canonical_id.is_none() {
            return Err(SyncError::Store(format!(
                "mapping for runtime instance {} cannot be linked without a canonical id",
                self.runtime_instance_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(status: MappingStatus, canonical_id: Option<Uuid>) -> MappingUpsert {
        MappingUpsert {
            tenant_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
            runtime_instance_id: "wf_123".to_string(),
            canonical_id,
            status,
            environment_content_hash: Some("abc".to_string()),
            runtime_updated_at: None,
            payload: None,
        }
    }

    #[test]
    fn test_linked_requires_canonical_id() {
        assert!(upsert(MappingStatus::Linked, None).validate().is_err());
        assert!(upsert(MappingStatus::Linked, Some(Uuid::new_v4()))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_untracked_allows_missing_canonical_id() {
        assert!(upsert(MappingStatus::Untracked, None).validate().is_ok());
        assert!(upsert(MappingStatus::Missing, None).validate().is_ok());
    }
}
