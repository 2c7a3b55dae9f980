//! # Relational Store Collaborator
//!
//! Keyed upsert/query operations over the entity layer. All mutual exclusion
//! in the system lives here: the non-terminal-job uniqueness constraint and
//! the per-key upsert constraints on the mapping, Git-state, and diff-state
//! tables. Concurrent writers to the same key serialize at the store with
//! last-writer-wins semantics, which is intentional since each engine is the
//! sole writer of its own tables.
//!
//! Two implementations ship with the crate: [`PostgresStore`] for
//! production and [`MemoryStore`] for tests and embedded use.

pub mod memory;
pub mod migrations;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CanonicalGitState, CanonicalWorkflow, DiffStateUpsert, Environment, GitStateUpsert,
    MappingStatus, MappingUpsert, NewCanonicalWorkflow, NewSyncJob, SyncJob, SyncJobKind,
    WorkflowDiffState, WorkflowEnvironmentMapping,
};

/// Keyed upsert/query operations backing the synchronization engines.
///
/// Every write is an upsert keyed by the owning table's unique constraint,
/// which is what makes whole sync passes safely re-runnable.
#[async_trait]
pub trait SyncStore: Send + Sync {
    // --- environments ---

    async fn upsert_environment(&self, environment: Environment) -> Result<Environment>;

    async fn find_environment(&self, id: Uuid) -> Result<Option<Environment>>;

    /// All environments with `sync_enabled`, across every tenant. The
    /// scheduler iterates this.
    async fn list_sync_enabled_environments(&self) -> Result<Vec<Environment>>;

    /// All environments of one tenant (reconciliation fan-out).
    async fn list_environments(&self, tenant_id: Uuid) -> Result<Vec<Environment>>;

    /// Advance `last_sync_attempted_at`. Called BEFORE job creation so even
    /// a failed creation delays the next scheduler-driven retry.
    async fn touch_sync_attempted(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Advance `last_sync_at`. Called on both terminal job transitions.
    async fn touch_synced(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    // --- canonical workflows ---

    /// Returns the workflow and whether this call created it.
    async fn get_or_create_canonical_workflow(
        &self,
        new: NewCanonicalWorkflow,
    ) -> Result<(CanonicalWorkflow, bool)>;

    async fn find_canonical_workflow(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CanonicalWorkflow>>;

    // --- environment mappings ---

    async fn find_mapping(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
    ) -> Result<Option<WorkflowEnvironmentMapping>>;

    /// The mapping binding a canonical workflow within one environment, if
    /// any. Used by auto-link to refuse adopting a canonical id already
    /// bound to a different runtime instance.
    async fn find_mapping_for_canonical(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowEnvironmentMapping>>;

    async fn list_mappings_by_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        statuses: &[MappingStatus],
    ) -> Result<Vec<WorkflowEnvironmentMapping>>;

    /// Keyed upsert on (tenant, environment, runtime-instance-id).
    async fn upsert_mapping(&self, upsert: MappingUpsert) -> Result<WorkflowEnvironmentMapping>;

    /// Status-only transition ("soft lifecycle"); preserves every other
    /// field including the runtime instance id for audit.
    async fn set_mapping_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
        status: MappingStatus,
    ) -> Result<()>;

    // --- canonical git state ---

    async fn find_git_state(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<CanonicalGitState>>;

    async fn list_git_states(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
    ) -> Result<Vec<CanonicalGitState>>;

    /// Exact-fingerprint lookup used by runtime auto-link.
    async fn find_git_states_by_hash(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        content_hash: &str,
    ) -> Result<Vec<CanonicalGitState>>;

    /// Keyed upsert on (tenant, environment, canonical-id).
    async fn upsert_git_state(&self, upsert: GitStateUpsert) -> Result<CanonicalGitState>;

    // --- diff state ---

    async fn find_diff_state(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowDiffState>>;

    async fn list_diff_states(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
    ) -> Result<Vec<WorkflowDiffState>>;

    /// Full-row replacement keyed on (tenant, source env, target env,
    /// canonical-id). The diff state is a cache, safe to overwrite.
    async fn upsert_diff_state(&self, upsert: DiffStateUpsert) -> Result<WorkflowDiffState>;

    // --- sync jobs ---

    /// The pending-or-running job for this scope, if one exists.
    async fn find_active_job(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<SyncJob>>;

    async fn find_job(&self, id: Uuid) -> Result<Option<SyncJob>>;

    /// Atomically create a pending job. Returns
    /// [`crate::SyncError::JobConflict`] when a non-terminal job already
    /// exists for the same (tenant, environment, kind). The caller lost a
    /// creation race and should re-query.
    async fn create_job(&self, new: NewSyncJob) -> Result<SyncJob>;

    async fn mark_job_running(&self, id: Uuid) -> Result<SyncJob>;

    async fn record_job_progress(&self, id: Uuid, progress: serde_json::Value) -> Result<()>;

    async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> Result<SyncJob>;

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<SyncJob>;
}
