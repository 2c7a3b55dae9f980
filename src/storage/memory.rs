//! # In-Memory Store
//!
//! `HashMap`-backed [`SyncStore`] used by the test suite and by embedded
//! deployments that do not need durability. Upholds the same constraints as
//! the Postgres store: keyed upserts and at most one non-terminal job per
//! (tenant, environment, kind), enforced atomically under one lock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::models::{
    CanonicalGitState, CanonicalWorkflow, DiffStateUpsert, Environment, GitStateUpsert,
    MappingStatus, MappingUpsert, NewCanonicalWorkflow, NewSyncJob, SyncJob, SyncJobKind,
    SyncJobState, WorkflowDiffState, WorkflowEnvironmentMapping,
};

use super::SyncStore;

#[derive(Default)]
struct Inner {
    environments: HashMap<Uuid, Environment>,
    canonical_workflows: HashMap<(Uuid, Uuid), CanonicalWorkflow>,
    mappings: HashMap<(Uuid, Uuid, String), WorkflowEnvironmentMapping>,
    git_states: HashMap<(Uuid, Uuid, Uuid), CanonicalGitState>,
    diff_states: HashMap<(Uuid, Uuid, Uuid, Uuid), WorkflowDiffState>,
    jobs: HashMap<Uuid, SyncJob>,
}

/// In-memory [`SyncStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn upsert_environment(&self, environment: Environment) -> Result<Environment> {
        let mut inner = self.inner.lock().unwrap();
        inner.environments.insert(environment.id, environment.clone());
        Ok(environment)
    }

    async fn find_environment(&self, id: Uuid) -> Result<Option<Environment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.environments.get(&id).cloned())
    }

    async fn list_sync_enabled_environments(&self) -> Result<Vec<Environment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .environments
            .values()
            .filter(|e| e.sync_enabled)
            .cloned()
            .collect())
    }

    async fn list_environments(&self, tenant_id: Uuid) -> Result<Vec<Environment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .environments
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn touch_sync_attempted(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let env = inner
            .environments
            .get_mut(&environment_id)
            .ok_or_else(|| SyncError::NotFound(format!("environment {environment_id}")))?;
        env.last_sync_attempted_at = Some(at);
        env.updated_at = at;
        Ok(())
    }

    async fn touch_synced(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let env = inner
            .environments
            .get_mut(&environment_id)
            .ok_or_else(|| SyncError::NotFound(format!("environment {environment_id}")))?;
        env.last_sync_at = Some(at);
        env.updated_at = at;
        Ok(())
    }

    async fn get_or_create_canonical_workflow(
        &self,
        new: NewCanonicalWorkflow,
    ) -> Result<(CanonicalWorkflow, bool)> {
        let mut inner = self.inner.lock().unwrap();
        let key = (new.tenant_id, new.id);
        if let Some(existing) = inner.canonical_workflows.get(&key) {
            return Ok((existing.clone(), false));
        }
        let now = Utc::now();
        let workflow = CanonicalWorkflow {
            id: new.id,
            tenant_id: new.tenant_id,
            name: new.name,
            created_at: now,
            updated_at: now,
        };
        inner.canonical_workflows.insert(key, workflow.clone());
        Ok((workflow, true))
    }

    async fn find_canonical_workflow(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CanonicalWorkflow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.canonical_workflows.get(&(tenant_id, id)).cloned())
    }

    async fn find_mapping(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
    ) -> Result<Option<WorkflowEnvironmentMapping>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mappings
            .get(&(tenant_id, environment_id, runtime_instance_id.to_string()))
            .cloned())
    }

    async fn find_mapping_for_canonical(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowEnvironmentMapping>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mappings
            .values()
            .find(|m| {
                m.tenant_id == tenant_id
                    && m.environment_id == environment_id
                    && m.canonical_id == Some(canonical_id)
            })
            .cloned())
    }

    async fn list_mappings_by_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        statuses: &[MappingStatus],
    ) -> Result<Vec<WorkflowEnvironmentMapping>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .mappings
            .values()
            .filter(|m| {
                m.tenant_id == tenant_id
                    && m.environment_id == environment_id
                    && statuses.contains(&m.status)
            })
            .cloned()
            .collect())
    }

    async fn upsert_mapping(&self, upsert: MappingUpsert) -> Result<WorkflowEnvironmentMapping> {
        upsert.validate()?;
        let mut inner = self.inner.lock().unwrap();
        let key = (
            upsert.tenant_id,
            upsert.environment_id,
            upsert.runtime_instance_id.clone(),
        );
        let now = Utc::now();
        let id = inner.mappings.get(&key).map_or_else(Uuid::new_v4, |m| m.id);
        let mapping = WorkflowEnvironmentMapping {
            id,
            tenant_id: upsert.tenant_id,
            environment_id: upsert.environment_id,
            runtime_instance_id: upsert.runtime_instance_id,
            canonical_id: upsert.canonical_id,
            status: upsert.status,
            environment_content_hash: upsert.environment_content_hash,
            runtime_updated_at: upsert.runtime_updated_at,
            payload: upsert.payload,
            last_synced_at: now,
        };
        inner.mappings.insert(key, mapping.clone());
        Ok(mapping)
    }

    async fn set_mapping_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
        status: MappingStatus,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mapping = inner
            .mappings
            .get_mut(&(tenant_id, environment_id, runtime_instance_id.to_string()))
            .ok_or_else(|| {
                SyncError::NotFound(format!("mapping for runtime instance {runtime_instance_id}"))
            })?;
        mapping.status = status;
        mapping.last_synced_at = Utc::now();
        Ok(())
    }

    async fn find_git_state(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<CanonicalGitState>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .git_states
            .get(&(tenant_id, environment_id, canonical_id))
            .cloned())
    }

    async fn list_git_states(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
    ) -> Result<Vec<CanonicalGitState>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .git_states
            .values()
            .filter(|g| g.tenant_id == tenant_id && g.environment_id == environment_id)
            .cloned()
            .collect())
    }

    async fn find_git_states_by_hash(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        content_hash: &str,
    ) -> Result<Vec<CanonicalGitState>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .git_states
            .values()
            .filter(|g| {
                g.tenant_id == tenant_id
                    && g.environment_id == environment_id
                    && g.git_content_hash == content_hash
            })
            .cloned()
            .collect())
    }

    async fn upsert_git_state(&self, upsert: GitStateUpsert) -> Result<CanonicalGitState> {
        let mut inner = self.inner.lock().unwrap();
        let key = (upsert.tenant_id, upsert.environment_id, upsert.canonical_id);
        let id = inner.git_states.get(&key).map_or_else(Uuid::new_v4, |g| g.id);
        let state = CanonicalGitState {
            id,
            tenant_id: upsert.tenant_id,
            environment_id: upsert.environment_id,
            canonical_id: upsert.canonical_id,
            git_path: upsert.git_path,
            git_content_hash: upsert.git_content_hash,
            git_commit_sha: upsert.git_commit_sha,
            last_synced_at: Utc::now(),
        };
        inner.git_states.insert(key, state.clone());
        Ok(state)
    }

    async fn find_diff_state(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowDiffState>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .diff_states
            .get(&(
                tenant_id,
                source_environment_id,
                target_environment_id,
                canonical_id,
            ))
            .cloned())
    }

    async fn list_diff_states(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
    ) -> Result<Vec<WorkflowDiffState>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .diff_states
            .values()
            .filter(|d| {
                d.tenant_id == tenant_id
                    && d.source_environment_id == source_environment_id
                    && d.target_environment_id == target_environment_id
            })
            .cloned()
            .collect())
    }

    async fn upsert_diff_state(&self, upsert: DiffStateUpsert) -> Result<WorkflowDiffState> {
        let mut inner = self.inner.lock().unwrap();
        let key = (
            upsert.tenant_id,
            upsert.source_environment_id,
            upsert.target_environment_id,
            upsert.canonical_id,
        );
        let id = inner.diff_states.get(&key).map_or_else(Uuid::new_v4, |d| d.id);
        let state = WorkflowDiffState {
            id,
            tenant_id: upsert.tenant_id,
            source_environment_id: upsert.source_environment_id,
            target_environment_id: upsert.target_environment_id,
            canonical_id: upsert.canonical_id,
            diff_status: upsert.diff_status,
            source_git_hash: upsert.source_git_hash,
            target_git_hash: upsert.target_git_hash,
            source_env_hash: upsert.source_env_hash,
            target_env_hash: upsert.target_env_hash,
            conflict_metadata: upsert.conflict_metadata,
            computed_at: Utc::now(),
        };
        inner.diff_states.insert(key, state.clone());
        Ok(state)
    }

    async fn find_active_job(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<SyncJob>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .find(|j| {
                j.tenant_id == tenant_id
                    && j.environment_id == environment_id
                    && j.kind == kind
                    && !j.state.is_terminal()
            })
            .cloned())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<SyncJob>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn create_job(&self, new: NewSyncJob) -> Result<SyncJob> {
        // Check and insert must happen under one lock to mirror the partial
        // uniqueness constraint of the Postgres store.
        let mut inner = self.inner.lock().unwrap();
        let conflict = inner.jobs.values().any(|j| {
            j.tenant_id == new.tenant_id
                && j.environment_id == new.environment_id
                && j.kind == new.kind
                && !j.state.is_terminal()
        });
        if conflict {
            return Err(SyncError::JobConflict);
        }
        let now = Utc::now();
        let job = SyncJob {
            id: Uuid::new_v4(),
            tenant_id: new.tenant_id,
            environment_id: new.environment_id,
            kind: new.kind,
            state: SyncJobState::Pending,
            progress: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<SyncJob> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("sync job {id}")))?;
        let now = Utc::now();
        job.state = SyncJobState::Running;
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn record_job_progress(&self, id: Uuid, progress: serde_json::Value) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("sync job {id}")))?;
        job.progress = Some(progress);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> Result<SyncJob> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("sync job {id}")))?;
        let now = Utc::now();
        job.state = SyncJobState::Completed;
        job.result = Some(result);
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<SyncJob> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("sync job {id}")))?;
        let now = Utc::now();
        job.state = SyncJobState::Failed;
        job.error = Some(error.to_string());
        job.finished_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvironmentClass;

    fn environment(tenant_id: Uuid) -> Environment {
        let now = Utc::now();
        Environment {
            id: Uuid::new_v4(),
            tenant_id,
            name: "dev".to_string(),
            class: EnvironmentClass::Development,
            git_branch: "main".to_string(),
            git_folder: "dev".to_string(),
            git_pinned_commit: None,
            sync_interval_secs: None,
            sync_enabled: true,
            last_sync_attempted_at: None,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_job_enforces_non_terminal_uniqueness() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let env = Uuid::new_v4();
        let new = NewSyncJob {
            tenant_id: tenant,
            environment_id: env,
            kind: SyncJobKind::EnvironmentSync,
        };

        let first = store.create_job(new.clone()).await.unwrap();
        let second = store.create_job(new.clone()).await;
        assert!(matches!(second, Err(SyncError::JobConflict)));

        // A different kind for the same environment is a separate scope.
        let repo = store
            .create_job(NewSyncJob {
                tenant_id: tenant,
                environment_id: env,
                kind: SyncJobKind::RepositorySync,
            })
            .await;
        assert!(repo.is_ok());

        // Once terminal, a new job may be created.
        store
            .complete_job(first.id, serde_json::json!({}))
            .await
            .unwrap();
        assert!(store.create_job(new).await.is_ok());
    }

    #[tokio::test]
    async fn test_upsert_mapping_is_keyed() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let env = Uuid::new_v4();

        let upsert = MappingUpsert {
            tenant_id: tenant,
            environment_id: env,
            runtime_instance_id: "wf_1".to_string(),
            canonical_id: None,
            status: MappingStatus::Untracked,
            environment_content_hash: Some("h1".to_string()),
            runtime_updated_at: None,
            payload: None,
        };

        let first = store.upsert_mapping(upsert.clone()).await.unwrap();
        let mut changed = upsert;
        changed.environment_content_hash = Some("h2".to_string());
        let second = store.upsert_mapping(changed).await.unwrap();

        assert_eq!(first.id, second.id, "same key must update in place");
        assert_eq!(second.environment_content_hash.as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn test_linked_mapping_requires_canonical_id() {
        let store = MemoryStore::new();
        let upsert = MappingUpsert {
            tenant_id: Uuid::new_v4(),
            environment_id: Uuid::new_v4(),
            runtime_instance_id: "wf_1".to_string(),
            canonical_id: None,
            status: MappingStatus::Linked,
            environment_content_hash: None,
            runtime_updated_at: None,
            payload: None,
        };
        assert!(store.upsert_mapping(upsert).await.is_err());
    }

    #[tokio::test]
    async fn test_touch_timestamps() {
        let store = MemoryStore::new();
        let env = environment(Uuid::new_v4());
        store.upsert_environment(env.clone()).await.unwrap();

        let at = Utc::now();
        store.touch_sync_attempted(env.id, at).await.unwrap();
        store.touch_synced(env.id, at).await.unwrap();

        let found = store.find_environment(env.id).await.unwrap().unwrap();
        assert_eq!(found.last_sync_attempted_at, Some(at));
        assert_eq!(found.last_sync_at, Some(at));
    }
}
