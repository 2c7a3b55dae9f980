//! Shared test fixtures: in-memory fakes for the two external collaborators
//! plus environment builders used across the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use flowsync_core::clients::{GitHost, RuntimeClient, WorkflowSummary};
use flowsync_core::error::{Result, SyncError};
use flowsync_core::models::{
    CanonicalGitState, CanonicalWorkflow, DiffStateUpsert, Environment, EnvironmentClass,
    GitStateUpsert, MappingStatus, MappingUpsert, NewCanonicalWorkflow, NewSyncJob, SyncJob,
    SyncJobKind, WorkflowDiffState, WorkflowEnvironmentMapping,
};
use flowsync_core::storage::SyncStore;

/// Fake workflow runtime holding per-environment workflow instances.
#[derive(Default)]
pub struct MockRuntime {
    workflows: Mutex<HashMap<Uuid, Vec<MockWorkflow>>>,
    failing_fetches: Mutex<HashSet<String>>,
}

#[derive(Clone)]
struct MockWorkflow {
    id: String,
    updated_at: DateTime<Utc>,
    payload: Value,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a workflow instance in an environment.
    pub fn put_workflow(
        &self,
        environment_id: Uuid,
        instance_id: &str,
        updated_at: DateTime<Utc>,
        payload: Value,
    ) {
        let mut workflows = self.workflows.lock().unwrap();
        let entries = workflows.entry(environment_id).or_default();
        let workflow = MockWorkflow {
            id: instance_id.to_string(),
            updated_at,
            payload,
        };
        match entries.iter_mut().find(|w| w.id == instance_id) {
            Some(existing) => *existing = workflow,
            None => entries.push(workflow),
        }
    }

    /// Remove a workflow instance, as if it was deleted in the runtime UI.
    pub fn remove_workflow(&self, environment_id: Uuid, instance_id: &str) {
        let mut workflows = self.workflows.lock().unwrap();
        if let Some(entries) = workflows.get_mut(&environment_id) {
            entries.retain(|w| w.id != instance_id);
        }
    }

    /// Make `fetch_workflow` fail for one instance id.
    pub fn fail_fetch_for(&self, instance_id: &str) {
        self.failing_fetches
            .lock()
            .unwrap()
            .insert(instance_id.to_string());
    }
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    async fn list_workflow_summaries(&self, environment_id: Uuid) -> Result<Vec<WorkflowSummary>> {
        let workflows = self.workflows.lock().unwrap();
        let mut summaries: Vec<WorkflowSummary> = workflows
            .get(&environment_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|w| WorkflowSummary {
                        id: w.id.clone(),
                        updated_at: w.updated_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        // Deterministic listing order keeps checkpoint assertions stable.
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn fetch_workflow(&self, environment_id: Uuid, instance_id: &str) -> Result<Value> {
        if self.failing_fetches.lock().unwrap().contains(instance_id) {
            return Err(SyncError::Runtime(format!(
                "runtime returned 500 for {instance_id}"
            )));
        }
        let workflows = self.workflows.lock().unwrap();
        workflows
            .get(&environment_id)
            .and_then(|entries| entries.iter().find(|w| w.id == instance_id))
            .map(|w| w.payload.clone())
            .ok_or_else(|| SyncError::Runtime(format!("workflow {instance_id} not found")))
    }
}

/// Fake Git host serving an in-memory file tree at a settable head commit.
pub struct MockGitHost {
    head: Mutex<String>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: Mutex<bool>,
}

impl Default for MockGitHost {
    fn default() -> Self {
        Self {
            head: Mutex::new("commit-1".to_string()),
            files: Mutex::new(HashMap::new()),
            unavailable: Mutex::new(false),
        }
    }
}

impl MockGitHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, sha: &str) {
        *self.head.lock().unwrap() = sha.to_string();
    }

    pub fn put_file(&self, path: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_vec());
    }

    pub fn put_json(&self, path: &str, value: &Value) {
        self.put_file(path, &serde_json::to_vec(value).unwrap());
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    /// Make every subsequent call fail, as if the host is down.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    fn check_available(&self) -> Result<()> {
        if *self.unavailable.lock().unwrap() {
            return Err(SyncError::GitHost("host unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl GitHost for MockGitHost {
    async fn head_commit(&self, _branch: &str) -> Result<String> {
        self.check_available()?;
        Ok(self.head.lock().unwrap().clone())
    }

    async fn list_files(&self, folder: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let prefix = format!("{folder}/");
        let files = self.files.lock().unwrap();
        let mut paths: Vec<String> = files
            .keys()
            .filter(|path| path.starts_with(&prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.check_available()?;
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::GitHost(format!("file not found: {path}")))
    }
}

/// Build an environment row for one tenant, named after its Git folder.
pub fn test_environment(tenant_id: Uuid, name: &str, class: EnvironmentClass) -> Environment {
    let now = Utc::now();
    Environment {
        id: Uuid::new_v4(),
        tenant_id,
        name: name.to_string(),
        class,
        git_branch: "main".to_string(),
        git_folder: name.to_string(),
        git_pinned_commit: None,
        sync_interval_secs: None,
        sync_enabled: true,
        last_sync_attempted_at: None,
        last_sync_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A minimal but realistic workflow definition payload.
pub fn workflow_payload(name: &str, nodes: &[&str]) -> Value {
    serde_json::json!({
        "name": name,
        "nodes": nodes
            .iter()
            .map(|n| serde_json::json!({"type": n, "position": [0, 0]}))
            .collect::<Vec<_>>(),
        "updatedAt": "2026-08-01T00:00:00Z",
    })
}

/// Store decorator that fails `touch_sync_attempted` for selected
/// environments, standing in for an environment row deleted between the
/// scheduler's listing and its trigger. Everything else delegates.
pub struct FailingTouchStore {
    inner: Arc<dyn SyncStore>,
    failing_touches: Mutex<HashSet<Uuid>>,
}

impl FailingTouchStore {
    pub fn new(inner: Arc<dyn SyncStore>) -> Self {
        Self {
            inner,
            failing_touches: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_touch_for(&self, environment_id: Uuid) {
        self.failing_touches.lock().unwrap().insert(environment_id);
    }
}

#[async_trait]
impl SyncStore for FailingTouchStore {
    async fn upsert_environment(&self, environment: Environment) -> Result<Environment> {
        self.inner.upsert_environment(environment).await
    }

    async fn find_environment(&self, id: Uuid) -> Result<Option<Environment>> {
        self.inner.find_environment(id).await
    }

    async fn list_sync_enabled_environments(&self) -> Result<Vec<Environment>> {
        self.inner.list_sync_enabled_environments().await
    }

    async fn list_environments(&self, tenant_id: Uuid) -> Result<Vec<Environment>> {
        self.inner.list_environments(tenant_id).await
    }

    async fn touch_sync_attempted(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if self.failing_touches.lock().unwrap().contains(&environment_id) {
            return Err(SyncError::NotFound(format!("environment {environment_id}")));
        }
        self.inner.touch_sync_attempted(environment_id, at).await
    }

    async fn touch_synced(&self, environment_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.inner.touch_synced(environment_id, at).await
    }

    async fn get_or_create_canonical_workflow(
        &self,
        new: NewCanonicalWorkflow,
    ) -> Result<(CanonicalWorkflow, bool)> {
        self.inner.get_or_create_canonical_workflow(new).await
    }

    async fn find_canonical_workflow(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<CanonicalWorkflow>> {
        self.inner.find_canonical_workflow(tenant_id, id).await
    }

    async fn find_mapping(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
    ) -> Result<Option<WorkflowEnvironmentMapping>> {
        self.inner
            .find_mapping(tenant_id, environment_id, runtime_instance_id)
            .await
    }

    async fn find_mapping_for_canonical(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowEnvironmentMapping>> {
        self.inner
            .find_mapping_for_canonical(tenant_id, environment_id, canonical_id)
            .await
    }

    async fn list_mappings_by_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        statuses: &[MappingStatus],
    ) -> Result<Vec<WorkflowEnvironmentMapping>> {
        self.inner
            .list_mappings_by_status(tenant_id, environment_id, statuses)
            .await
    }

    async fn upsert_mapping(&self, upsert: MappingUpsert) -> Result<WorkflowEnvironmentMapping> {
        self.inner.upsert_mapping(upsert).await
    }

    async fn set_mapping_status(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        runtime_instance_id: &str,
        status: MappingStatus,
    ) -> Result<()> {
        self.inner
            .set_mapping_status(tenant_id, environment_id, runtime_instance_id, status)
            .await
    }

    async fn find_git_state(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<CanonicalGitState>> {
        self.inner
            .find_git_state(tenant_id, environment_id, canonical_id)
            .await
    }

    async fn list_git_states(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
    ) -> Result<Vec<CanonicalGitState>> {
        self.inner.list_git_states(tenant_id, environment_id).await
    }

    async fn find_git_states_by_hash(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        content_hash: &str,
    ) -> Result<Vec<CanonicalGitState>> {
        self.inner
            .find_git_states_by_hash(tenant_id, environment_id, content_hash)
            .await
    }

    async fn upsert_git_state(&self, upsert: GitStateUpsert) -> Result<CanonicalGitState> {
        self.inner.upsert_git_state(upsert).await
    }

    async fn find_diff_state(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<WorkflowDiffState>> {
        self.inner
            .find_diff_state(
                tenant_id,
                source_environment_id,
                target_environment_id,
                canonical_id,
            )
            .await
    }

    async fn list_diff_states(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
    ) -> Result<Vec<WorkflowDiffState>> {
        self.inner
            .list_diff_states(tenant_id, source_environment_id, target_environment_id)
            .await
    }

    async fn upsert_diff_state(&self, upsert: DiffStateUpsert) -> Result<WorkflowDiffState> {
        self.inner.upsert_diff_state(upsert).await
    }

    async fn find_active_job(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        kind: SyncJobKind,
    ) -> Result<Option<SyncJob>> {
        self.inner
            .find_active_job(tenant_id, environment_id, kind)
            .await
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<SyncJob>> {
        self.inner.find_job(id).await
    }

    async fn create_job(&self, new: NewSyncJob) -> Result<SyncJob> {
        self.inner.create_job(new).await
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<SyncJob> {
        self.inner.mark_job_running(id).await
    }

    async fn record_job_progress(&self, id: Uuid, progress: serde_json::Value) -> Result<()> {
        self.inner.record_job_progress(id, progress).await
    }

    async fn complete_job(&self, id: Uuid, result: serde_json::Value) -> Result<SyncJob> {
        self.inner.complete_job(id, result).await
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<SyncJob> {
        self.inner.fail_job(id, error).await
    }
}
