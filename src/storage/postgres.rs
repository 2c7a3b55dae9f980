//! # Postgres Store
//!
//! SQLx-backed [`SyncStore`]. Every write is a keyed upsert
//! (`ON CONFLICT ... DO UPDATE`) against the unique index of the owning
//! table, and job creation relies on the partial unique index over
//! non-terminal states to reject concurrent duplicates (see
//! [`super::migrations`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{
    CanonicalGitState, CanonicalWorkflow, DiffStateUpsert, Environment, GitStateUpsert,
    MappingStatus, MappingUpsert, NewCanonicalWorkflow, NewSyncJob, SyncJob, SyncJobKind,
    WorkflowDiffState, WorkflowEnvironmentMapping,
};

use super::SyncStore;

/// Postgres-backed [`SyncStore`] implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        super::migrations::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SyncStore for PostgresStore {
    async fn upsert_environment(&self, environment: Environment) -> Result<Environment> {
        let row = sqlx::query_as::<_, Environment>(
            r"
            INSERT INTO flowsync_environments (
                id, tenant_id, name, class, git_branch, git_folder,
                git_pinned_commit, sync_interval_secs, sync_enabled,
                last_sync_attempted_at, last_sync_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                class = EXCLUDED.class,
                git_branch = EXCLUDED.git_branch,
                git_folder = EXCLUDED.git_folder,
                git_pinned_commit = EXCLUDED.git_pinned_commit,
                sync_interval_secs = EXCLUDED.sync_interval_secs,
                sync_enabled = EXCLUDED.sync_enabled,
                updated_at = NOW()
            RETURNING *
            ",
        )
        .bind(environment.id)
        .bind(environment.tenant_id)
        .bind(&environment.name)
        .bind(environment.class)
        .bind(&environment.git_branch)
        .bind(&environment.git_folder)
        .bind(&environment.git_pinned_commit)
        .bind(environment.sync_interval_secs)
        .bind(environment.sync_enabled)
        .bind(environment.last_sync_attempted_at)
        .bind(environment.last_sync_at)
        .bind(environment.created_at)
        .bind(environment.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_environment(&self, id: Uuid) -> Result<Option<Environment>> {
        let row = sqlx::query_as::<_, Environment>(
            "SELECT * FROM flowsync_environments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_sync_enabled_environments(&self) -> Result<Vec<Environment>> {
        let rows = sqlx::query_as::<_, Environment>(
            "SELECT * FROM flowsync_environments WHERE sync_enabled ORDER BY tenant_id, name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_environments(&self, tenant_id: Uuid) -> Result<Vec<Environment>> {
        let rows = sqlx::query_as::<_, Environment>(
            "SELECT * FROM flowsync_environments WHERE tenant_id = $1 ORDER BY name",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn touch_sync_attempted(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE flowsync_environments
             SET last_sync_attempted_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(environment_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!("environment {environment_id}")));
        }
        Ok(())
    }

    async fn touch_synced(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE flowsync_environments
             SET last_sync_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(environment_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!("environment {environment_id}")));
        }
        Ok(())
    }

    async fn get_or_create_canonical_workflow(
        &self,
        new: NewCanonicalWorkflow,
    ) -> Result<(CanonicalWorkflow, bool)> {
        let inserted = sqlx::query_as::<_, CanonicalWorkflow>(
            r"
            INSERT INTO flowsync_canonical_workflows (id, tenant_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (tenant_id, id) DO NOTHING
            RETURNING *
            ",
        )
        .bind(new.id)
        .bind(new.tenant_id)
        .bind(&new.name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(workflow) = inserted {
            return Ok((workflow, true));
        }

        let existing = self
            .find_canonical_workflow(new.tenant_id, new.id)
            .await?
            .ok_or_else(|| {
                SyncError::Store(format!("canonical workflow {} vanished mid-upsert", new.id))
            })?;
        Ok((existing, false))
    }

    async fn find_canonical_workflow(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CanonicalWorkflow>> {
        let row = sqlx::query_as::<_, CanonicalWorkflow>(
            "SELECT * FROM flowsync_canonical_workflows WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_mapping(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
    ) -> Result<Option<WorkflowEnvironmentMapping>> {
        let row = sqlx::query_as::<_, WorkflowEnvironmentMapping>(
            "SELECT * FROM flowsync_environment_mappings
             WHERE tenant_id = $1 AND environment_id = $2 AND runtime_instance_id = $3",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .bind(runtime_instance_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_mapping_for_canonical(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowEnvironmentMapping>> {
        let row = sqlx::query_as::<_, WorkflowEnvironmentMapping>(
            "SELECT * FROM flowsync_environment_mappings
             WHERE tenant_id = $1 AND environment_id = $2 AND canonical_id = $3
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .bind(canonical_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_mappings_by_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        statuses: &[MappingStatus],
    ) -> Result<Vec<WorkflowEnvironmentMapping>> {
        let status_strings: Vec<String> = statuses.iter().map(ToString::to_string).collect();
        let rows = sqlx::query_as::<_, WorkflowEnvironmentMapping>(
            "SELECT * FROM flowsync_environment_mappings
             WHERE tenant_id = $1 AND environment_id = $2 AND status = ANY($3)",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .bind(&status_strings)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_mapping(&self, upsert: MappingUpsert) -> Result<WorkflowEnvironmentMapping> {
        upsert.validate()?;
        let row = sqlx::query_as::<_, WorkflowEnvironmentMapping>(
            r"
            INSERT INTO flowsync_environment_mappings (
                id, tenant_id, environment_id, runtime_instance_id, canonical_id,
                status, environment_content_hash, runtime_updated_at, payload, last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (tenant_id, environment_id, runtime_instance_id) DO UPDATE SET
                canonical_id = EXCLUDED.canonical_id,
                status = EXCLUDED.status,
                environment_content_hash = EXCLUDED.environment_content_hash,
                runtime_updated_at = EXCLUDED.runtime_updated_at,
                payload = EXCLUDED.payload,
                last_synced_at = NOW()
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(upsert.tenant_id)
        .bind(upsert.environment_id)
        .bind(&upsert.runtime_instance_id)
        .bind(upsert.canonical_id)
        .bind(upsert.status)
        .bind(&upsert.environment_content_hash)
        .bind(upsert.runtime_updated_at)
        .bind(&upsert.payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_mapping_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
        status: MappingStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE flowsync_environment_mappings
             SET status = $4, last_synced_at = NOW()
             WHERE tenant_id = $1 AND environment_id = $2 AND runtime_instance_id = $3",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .bind(runtime_instance_id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!(
                "mapping for runtime instance {runtime_instance_id}"
            )));
        }
        Ok(())
    }

    async fn find_git_state(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<CanonicalGitState>> {
        let row = sqlx::query_as::<_, CanonicalGitState>(
            "SELECT * FROM flowsync_git_states
             WHERE tenant_id = $1 AND environment_id = $2 AND canonical_id = $3",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .bind(canonical_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_git_states(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
    ) -> Result<Vec<CanonicalGitState>> {
        let rows = sqlx::query_as::<_, CanonicalGitState>(
            "SELECT * FROM flowsync_git_states
             WHERE tenant_id = $1 AND environment_id = $2",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_git_states_by_hash(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        content_hash: &str,
    ) -> Result<Vec<CanonicalGitState>> {
        let rows = sqlx::query_as::<_, CanonicalGitState>(
            "SELECT * FROM flowsync_git_states
             WHERE tenant_id = $1 AND environment_id = $2 AND git_content_hash = $3",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .bind(content_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_git_state(&self, upsert: GitStateUpsert) -> Result<CanonicalGitState> {
        let row = sqlx::query_as::<_, CanonicalGitState>(
            r"
            INSERT INTO flowsync_git_states (
                id, tenant_id, environment_id, canonical_id,
                git_path, git_content_hash, git_commit_sha, last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (tenant_id, environment_id, canonical_id) DO UPDATE SET
                git_path = EXCLUDED.git_path,
                git_content_hash = EXCLUDED.git_content_hash,
                git_commit_sha = EXCLUDED.git_commit_sha,
                last_synced_at = NOW()
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(upsert.tenant_id)
        .bind(upsert.environment_id)
        .bind(upsert.canonical_id)
        .bind(&upsert.git_path)
        .bind(&upsert.git_content_hash)
        .bind(&upsert.git_commit_sha)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_diff_state(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowDiffState>> {
        let row = sqlx::query_as::<_, WorkflowDiffState>(
            "SELECT * FROM flowsync_diff_states
             WHERE tenant_id = $1 AND source_environment_id = $2
               AND target_environment_id = $3 AND canonical_id = $4",
        )
        .bind(tenant_id)
        .bind(source_environment_id)
        .bind(target_environment_id)
        .bind(canonical_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_diff_states(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
    ) -> Result<Vec<WorkflowDiffState>> {
        let rows = sqlx::query_as::<_, WorkflowDiffState>(
            "SELECT * FROM flowsync_diff_states
             WHERE tenant_id = $1 AND source_environment_id = $2 AND target_environment_id = $3",
        )
        .bind(tenant_id)
        .bind(source_environment_id)
        .bind(target_environment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_diff_state(&self, upsert: DiffStateUpsert) -> Result<WorkflowDiffState> {
        let row = sqlx::query_as::<_, WorkflowDiffState>(
            r"
            INSERT INTO flowsync_diff_states (
                id, tenant_id, source_environment_id, target_environment_id, canonical_id,
                diff_status, source_git_hash, target_git_hash, source_env_hash,
                target_env_hash, conflict_metadata, computed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
            ON CONFLICT (tenant_id, source_environment_id, target_environment_id, canonical_id)
            DO UPDATE SET
                diff_status = EXCLUDED.diff_status,
                source_git_hash = EXCLUDED.source_git_hash,
                target_git_hash = EXCLUDED.target_git_hash,
                source_env_hash = EXCLUDED.source_env_hash,
                target_env_hash = EXCLUDED.target_env_hash,
                conflict_metadata = EXCLUDED.conflict_metadata,
                computed_at = NOW()
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(upsert.tenant_id)
        .bind(upsert.source_environment_id)
        .bind(upsert.target_environment_id)
        .bind(upsert.canonical_id)
        .bind(upsert.diff_status)
        .bind(&upsert.source_git_hash)
        .bind(&upsert.target_git_hash)
        .bind(&upsert.source_env_hash)
        .bind(&upsert.target_env_hash)
        .bind(&upsert.conflict_metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_active_job(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJob>(
            "SELECT * FROM flowsync_sync_jobs
             WHERE tenant_id = $1 AND environment_id = $2 AND kind = $3
               AND state IN ('pending', 'running')
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(environment_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJob>("SELECT * FROM flowsync_sync_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_job(&self, new: NewSyncJob) -> Result<SyncJob> {
        let result = sqlx::query_as::<_, SyncJob>(
            r"
            INSERT INTO flowsync_sync_jobs (
                id, tenant_id, environment_id, kind, state, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'pending', NOW(), NOW())
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(new.tenant_id)
        .bind(new.environment_id)
        .bind(new.kind)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(job) => Ok(job),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(SyncError::JobConflict)
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<SyncJob> {
        let row = sqlx::query_as::<_, SyncJob>(
            "UPDATE flowsync_sync_jobs
             SET state = 'running', started_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| SyncError::NotFound(format!("sync job {id}")))
    }

    async fn record_job_progress(&self, id: Uuid, progress: serde_json::Value) -> Result<()> {
        let result = sqlx::query(
            "UPDATE flowsync_sync_jobs SET progress = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(&progress)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!("sync job {id}")));
        }
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> Result<SyncJob> {
        let row = sqlx::query_as::<_, SyncJob>(
            "UPDATE flowsync_sync_jobs
             SET state = 'completed', result = $2, finished_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&result)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| SyncError::NotFound(format!("sync job {id}")))
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<SyncJob> {
        let row = sqlx::query_as::<_, SyncJob>(
            "UPDATE flowsync_sync_jobs
             SET state = 'failed', error = $2, finished_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| SyncError::NotFound(format!("sync job {id}")))
    }
}
