//! # Canonical Workflow Model
//!
//! The tenant-scoped logical identity of a workflow, independent of any
//! environment or Git commit. Created on first sighting in Git or on first
//! auto-link from a runtime instance; never deleted except by explicit
//! tenant action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Immutable logical identity of a workflow.
///
/// The `id` doubles as the Git filename stem
/// (`workflows/<folder>/<id>.json`), which is how the Git sync engine
/// recognizes a file as belonging to this workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CanonicalWorkflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Display name, taken from the workflow definition on first sighting.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New canonical workflow for creation (without generated timestamps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCanonicalWorkflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}
