//! # Schema Migrations
//!
//! DDL for the Postgres-backed store. Statements are idempotent
//! (`IF NOT EXISTS`) so `apply` can run on every startup.
//!
//! The partial unique index on the jobs table is the load-bearing piece: it
//! is what turns N concurrent `request_sync` calls into exactly one job
//! without any in-process locking.

use sqlx::PgPool;

use crate::error::Result;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS flowsync_environments (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        name TEXT NOT NULL,
        class TEXT NOT NULL,
        git_branch TEXT NOT NULL,
        git_folder TEXT NOT NULL,
        git_pinned_commit TEXT,
        sync_interval_secs BIGINT,
        sync_enabled BOOLEAN NOT NULL DEFAULT FALSE,
        last_sync_attempted_at TIMESTAMPTZ,
        last_sync_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS flowsync_canonical_workflows (
        id UUID NOT NULL,
        tenant_id UUID NOT NULL,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (tenant_id, id)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS flowsync_environment_mappings (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        environment_id UUID NOT NULL,
        runtime_instance_id TEXT NOT NULL,
        canonical_id UUID,
        status TEXT NOT NULL,
        environment_content_hash TEXT,
        runtime_updated_at TIMESTAMPTZ,
        payload JSONB,
        last_synced_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT linked_requires_canonical
            CHECK (status <> 'linked' OR canonical_id IS NOT NULL)
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_mappings_tenant_env_instance
        ON flowsync_environment_mappings (tenant_id, environment_id, runtime_instance_id)
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_mappings_canonical
        ON flowsync_environment_mappings (tenant_id, environment_id, canonical_id)
    ",
    r"
    CREATE TABLE IF NOT EXISTS flowsync_git_states (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        environment_id UUID NOT NULL,
        canonical_id UUID NOT NULL,
        git_path TEXT NOT NULL,
        git_content_hash TEXT NOT NULL,
        git_commit_sha TEXT NOT NULL,
        last_synced_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_git_states_tenant_env_canonical
        ON flowsync_git_states (tenant_id, environment_id, canonical_id)
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_git_states_content_hash
        ON flowsync_git_states (tenant_id, environment_id, git_content_hash)
    ",
    r"
    CREATE TABLE IF NOT EXISTS flowsync_diff_states (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        source_environment_id UUID NOT NULL,
        target_environment_id UUID NOT NULL,
        canonical_id UUID NOT NULL,
        diff_status TEXT NOT NULL,
        source_git_hash TEXT,
        target_git_hash TEXT,
        source_env_hash TEXT,
        target_env_hash TEXT,
        conflict_metadata JSONB,
        computed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_diff_states_pair_canonical
        ON flowsync_diff_states (tenant_id, source_environment_id, target_environment_id, canonical_id)
    ",
    r"
    CREATE TABLE IF NOT EXISTS flowsync_sync_jobs (
        id UUID PRIMARY KEY,
        tenant_id UUID NOT NULL,
        environment_id UUID NOT NULL,
        kind TEXT NOT NULL,
        state TEXT NOT NULL,
        progress JSONB,
        result JSONB,
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        started_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_jobs_one_non_terminal
        ON flowsync_sync_jobs (tenant_id, environment_id, kind)
        WHERE state IN ('pending', 'running')
    ",
];

/// Apply the schema. Idempotent; safe to run on every startup.
pub async fn apply(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!(statements = SCHEMA.len(), "Store schema applied");
    Ok(())
}
