//! # External Collaborators
//!
//! Trait seams for the two upstream systems the engines ingest from. Both
//! are specified only at their interface; production implementations (HTTP
//! clients for the workflow runtime and the Git host) live in the embedding
//! application, and tests supply in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Lightweight listing entry returned by the runtime before any payload is
/// fetched. The `updated_at` value drives the skip-if-unchanged
/// short-circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Runtime-assigned workflow instance id.
    pub id: String,
    pub updated_at: DateTime<Utc>,
}

/// The external workflow-automation engine, one deployment per environment.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// List all workflow instances in the given environment.
    async fn list_workflow_summaries(&self, environment_id: Uuid) -> Result<Vec<WorkflowSummary>>;

    /// Fetch the full definition payload of one workflow instance.
    async fn fetch_workflow(
        &self,
        environment_id: Uuid,
        instance_id: &str,
    ) -> Result<serde_json::Value>;
}

/// The Git hosting service backing the promotion pipelines.
#[async_trait]
pub trait GitHost: Send + Sync {
    /// Resolve the head commit sha of a branch.
    async fn head_commit(&self, branch: &str) -> Result<String>;

    /// List file paths under a folder (non-recursive).
    async fn list_files(&self, folder: &str) -> Result<Vec<String>>;

    /// Read one file's raw contents.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
}

/// Sidecar metadata file (`<name>.env-map.json`) committed next to a
/// workflow definition. Declares, per environment, the runtime instance and
/// content hash Git believes corresponds to the canonical workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarFile {
    pub canonical_workflow_id: Uuid,
    pub environments: std::collections::HashMap<Uuid, SidecarEnvironmentEntry>,
}

/// One declared environment binding inside a sidecar file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarEnvironmentEntry {
    pub environment_type: String,
    pub runtime_instance_id: String,
    pub content_hash: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_schema_parsing() {
        let canonical = Uuid::new_v4();
        let env = Uuid::new_v4();
        let raw = serde_json::json!({
            "canonicalWorkflowId": canonical,
            "environments": {
                env.to_string(): {
                    "environmentType": "production",
                    "runtimeInstanceId": "wf_991",
                    "contentHash": "deadbeef",
                    "lastSeenAt": "2026-02-11T08:30:00Z"
                }
            }
        });

        let parsed: SidecarFile = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.canonical_workflow_id, canonical);
        let entry = parsed.environments.get(&env).unwrap();
        assert_eq!(entry.runtime_instance_id, "wf_991");
        assert_eq!(entry.content_hash, "deadbeef");
        assert!(entry.last_seen_at.is_some());
    }

    #[test]
    fn test_sidecar_last_seen_optional() {
        let raw = serde_json::json!({
            "canonicalWorkflowId": Uuid::new_v4(),
            "environments": {
                Uuid::new_v4().to_string(): {
                    "environmentType": "staging",
                    "runtimeInstanceId": "wf_7",
                    "contentHash": "aa"
                }
            }
        });
        let parsed: SidecarFile = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.environments.len(), 1);
    }
}
