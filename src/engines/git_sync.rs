//! # Git Sync Engine
//!
//! Git → database ingestion for one environment's promotion pipeline. Reads
//! every `<canonical_id>.json` under the environment's workflow folder at
//! the branch head (or a pinned commit), records canonical identity and the
//! Git-side fingerprint, and opportunistically ingests adjacent
//! `<name>.env-map.json` sidecar files declaring environment-to-runtime
//! bindings.
//!
//! Sidecar presence is authoritative: a declared entry is upserted as
//! `linked` even over a `missing` or `ignored` status set by a human. That
//! is a deliberate design choice, not an accident.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clients::{GitHost, SidecarFile};
use crate::constants::SIDECAR_SUFFIX;
use crate::error::{Result, SyncError};
use crate::hashing::{CollisionWarning, HashingService};
use crate::models::{
    Environment, GitStateUpsert, MappingStatus, MappingUpsert, NewCanonicalWorkflow,
};
use crate::storage::SyncStore;

use super::ItemError;

/// Counters and collected diagnostics for one repository sync pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GitSyncOutcome {
    /// Git-state rows created for canonical workflows first seen this pass.
    pub created: usize,
    /// Git-state rows whose fingerprint changed.
    pub updated: usize,
    /// Files skipped on an unchanged fingerprint.
    pub unchanged: usize,
    pub errors: Vec<ItemError>,
    pub collision_warnings: Vec<CollisionWarning>,
}

/// Git → database ingestion engine.
pub struct GitSyncEngine {
    store: Arc<dyn SyncStore>,
    git: Arc<dyn GitHost>,
}

impl GitSyncEngine {
    pub fn new(store: Arc<dyn SyncStore>, git: Arc<dyn GitHost>) -> Self {
        Self { store, git }
    }

    /// Run one repository sync pass over an environment's workflow folder.
    #[instrument(skip(self), fields(environment = %environment.name, environment_id = %environment.id))]
    pub async fn sync_repository(&self, environment: &Environment) -> Result<GitSyncOutcome> {
        let commit = match &environment.git_pinned_commit {
            Some(pinned) => pinned.clone(),
            None => self.git.head_commit(&environment.git_branch).await?,
        };

        let folder = environment.workflow_folder();
        let files = self.git.list_files(&folder).await?;
        let file_set: HashSet<&str> = files.iter().map(String::as_str).collect();

        let mut hasher = HashingService::new();
        let mut outcome = GitSyncOutcome::default();

        for path in &files {
            if !path.ends_with(".json") || path.ends_with(SIDECAR_SUFFIX) {
                continue;
            }
            if let Err(err) = self
                .process_file(environment, path, &commit, &file_set, &mut hasher, &mut outcome)
                .await
            {
                warn!(path = %path, error = %err, "Workflow file failed to sync; continuing with next");
                outcome.errors.push(ItemError {
                    identifier: path.clone(),
                    message: err.to_string(),
                });
            }
        }

        outcome.collision_warnings = hasher.take_warnings();
        info!(
            commit = %commit,
            created = outcome.created,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            errors = outcome.errors.len(),
            "Repository sync pass finished"
        );
        Ok(outcome)
    }

    /// Process one workflow file inside its own failure boundary.
    async fn process_file(
        &self,
        environment: &Environment,
        path: &str,
        commit: &str,
        file_set: &HashSet<&str>,
        hasher: &mut HashingService,
        outcome: &mut GitSyncOutcome,
    ) -> Result<()> {
        let canonical_id = canonical_id_from_path(path)?;

        let bytes = self.git.read_file(path).await?;
        let payload: serde_json::Value = serde_json::from_slice(&bytes)?;
        let hash = hasher.fingerprint(&payload, Some(canonical_id))?;

        let existing = self
            .store
            .find_git_state(environment.tenant_id, environment.id, canonical_id)
            .await?;
        if let Some(state) = &existing {
            if state.git_content_hash == hash {
                outcome.unchanged += 1;
                return Ok(());
            }
        }

        let name = payload
            .get("name")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| canonical_id.to_string(), str::to_string);
        self.store
            .get_or_create_canonical_workflow(NewCanonicalWorkflow {
                id: canonical_id,
                tenant_id: environment.tenant_id,
                name,
            })
            .await?;

        self.store
            .upsert_git_state(GitStateUpsert {
                tenant_id: environment.tenant_id,
                environment_id: environment.id,
                canonical_id,
                git_path: path.to_string(),
                git_content_hash: hash,
                git_commit_sha: commit.to_string(),
            })
            .await?;
        if existing.is_some() {
            outcome.updated += 1;
        } else {
            outcome.created += 1;
        }

        let sidecar_path = sidecar_path_for(path);
        if file_set.contains(sidecar_path.as_str()) {
            self.ingest_sidecar(environment, &sidecar_path).await?;
        }
        Ok(())
    }

    /// Ingest one sidecar file: every declared environment entry becomes an
    /// authoritative `linked` mapping. Fields the sidecar does not declare
    /// (stored payload, runtime timestamp) are preserved from any existing
    /// mapping.
    async fn ingest_sidecar(&self, environment: &Environment, path: &str) -> Result<()> {
        let bytes = self.git.read_file(path).await?;
        let sidecar: SidecarFile = serde_json::from_slice(&bytes)?;

        for (environment_id, entry) in &sidecar.environments {
            let existing = self
                .store
                .find_mapping(
                    environment.tenant_id,
                    *environment_id,
                    &entry.runtime_instance_id,
                )
                .await?;

            self.store
                .upsert_mapping(MappingUpsert {
                    tenant_id: environment.tenant_id,
                    environment_id: *environment_id,
                    runtime_instance_id: entry.runtime_instance_id.clone(),
                    canonical_id: Some(sidecar.canonical_workflow_id),
                    status: MappingStatus::Linked,
                    environment_content_hash: Some(entry.content_hash.clone()),
                    runtime_updated_at: entry
                        .last_seen_at
                        .or(existing.as_ref().and_then(|m| m.runtime_updated_at)),
                    payload: existing.and_then(|m| m.payload),
                })
                .await?;
            debug!(
                canonical_id = %sidecar.canonical_workflow_id,
                environment_id = %environment_id,
                runtime_instance_id = %entry.runtime_instance_id,
                "Sidecar declared environment mapping ingested"
            );
        }
        Ok(())
    }
}

/// Extract the canonical workflow id from a `<canonical_id>.json` path.
fn canonical_id_from_path(path: &str) -> Result<Uuid> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let stem = file_name.strip_suffix(".json").ok_or_else(|| {
        SyncError::GitHost(format!("workflow file has no .json suffix: {path}"))
    })?;
    Uuid::parse_str(stem).map_err(|_| {
        SyncError::GitHost(format!("workflow filename is not a canonical id: {path}"))
    })
}

/// `workflows/dev/<id>.json` → `workflows/dev/<id>.env-map.json`
fn sidecar_path_for(path: &str) -> String {
    match path.strip_suffix(".json") {
        Some(stem) => format!("{stem}{SIDECAR_SUFFIX}"),
        None => format!("{path}{SIDECAR_SUFFIX}"),
    }
}
