//! # Canonical Git State Model
//!
//! Last-seen Git representation of a canonical workflow for one
//! environment's promotion pipeline. Keyed uniquely by (tenant, environment,
//! canonical-id). Owned exclusively by the Git sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CanonicalGitState {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub canonical_id: Uuid,
    /// Repository path of the workflow definition file.
    pub git_path: String,
    /// Normalized content fingerprint of the committed definition.
    pub git_content_hash: String,
    /// Commit the fingerprint was taken from.
    pub git_commit_sha: String,
    pub last_synced_at: DateTime<Utc>,
}

/// Upsert record keyed by the unique (tenant, environment, canonical-id)
/// constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitStateUpsert {
    pub tenant_id: Uuid,
    pub environment_id: Uuid,
    pub canonical_id: Uuid,
    pub git_path: String,
    pub git_content_hash: String,
    pub git_commit_sha: String,
}
