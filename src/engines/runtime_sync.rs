//! # Runtime Sync Engine
//!
//! Runtime → database ingestion for one environment. Lists every workflow
//! instance the runtime reports, processes them in fixed-size batches with a
//! checkpoint write after each batch, auto-links unmatched instances against
//! the environment's Git fingerprints, and transitions instances that
//! disappeared from the listing to `missing`.
//!
//! All writes are upserts keyed by the mapping table's unique constraint, so
//! the whole operation is safely re-runnable: a second pass with no upstream
//! change short-circuits every workflow on its unchanged
//! `runtime_updated_at`.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clients::{RuntimeClient, WorkflowSummary};
use crate::constants::SYNC_BATCH_SIZE;
use crate::error::Result;
use crate::hashing::{CollisionWarning, HashingService};
use crate::models::{
    Environment, MappingStatus, MappingUpsert, SyncCheckpoint, WorkflowEnvironmentMapping,
};
use crate::orchestration::ProgressSink;
use crate::storage::SyncStore;

use super::ItemError;

/// Counters and collected diagnostics for one runtime sync pass.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeSyncOutcome {
    /// Mappings created for instances never seen before.
    pub created: usize,
    /// Instances newly bound to a canonical workflow via auto-link.
    pub linked: usize,
    /// Instances short-circuited on unchanged `runtime_updated_at`.
    pub skipped: usize,
    /// Mappings transitioned to `missing` after the post-pass diff.
    pub missing: usize,
    pub errors: Vec<ItemError>,
    pub collision_warnings: Vec<CollisionWarning>,
}

/// Runtime → database ingestion engine.
pub struct RuntimeSyncEngine {
    store: Arc<dyn SyncStore>,
    runtime: Arc<dyn RuntimeClient>,
    batch_size: usize,
}

impl RuntimeSyncEngine {
    pub fn new(store: Arc<dyn SyncStore>, runtime: Arc<dyn RuntimeClient>) -> Self {
        Self {
            store,
            runtime,
            batch_size: SYNC_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run one sync pass over an environment.
    ///
    /// The sink receives a [`SyncCheckpoint`] after every batch; a restarted
    /// job resumes from its last recorded checkpoint instead of
    /// reprocessing. A checkpoint recorded against a listing of different
    /// length is discarded: the listing changed, so the pass restarts.
    #[instrument(skip(self, sink), fields(environment = %environment.name, environment_id = %environment.id))]
    pub async fn sync_environment(
        &self,
        environment: &Environment,
        sink: &dyn ProgressSink,
    ) -> Result<RuntimeSyncOutcome> {
        let summaries = self
            .runtime
            .list_workflow_summaries(environment.id)
            .await?;
        let total = summaries.len();
        let seen: HashSet<&str> = summaries.iter().map(|s| s.id.as_str()).collect();

        let mut hasher = HashingService::new();
        let mut outcome = RuntimeSyncOutcome::default();

        let mut index = sink
            .resume_from()
            .filter(|cp| cp.total_count == total)
            .map_or(0, |cp| cp.last_processed_index.min(total));
        if index > 0 {
            info!(resume_index = index, total = total, "Resuming sync pass from checkpoint");
        }

        while index < total {
            let end = (index + self.batch_size).min(total);
            for summary in &summaries[index..end] {
                if let Err(err) = self
                    .process_workflow(environment, summary, &mut hasher, &mut outcome)
                    .await
                {
                    warn!(
                        runtime_instance_id = %summary.id,
                        error = %err,
                        "Workflow failed to sync; continuing with next"
                    );
                    outcome.errors.push(ItemError {
                        identifier: summary.id.clone(),
                        message: err.to_string(),
                    });
                }
            }
            index = end;
            sink.checkpoint(SyncCheckpoint {
                last_processed_index: index,
                total_count: total,
            })
            .await?;
        }

        outcome.missing += self.mark_departed(environment, &seen).await?;
        outcome.collision_warnings = hasher.take_warnings();

        info!(
            created = outcome.created,
            linked = outcome.linked,
            skipped = outcome.skipped,
            missing = outcome.missing,
            errors = outcome.errors.len(),
            "Runtime sync pass finished"
        );
        Ok(outcome)
    }

    /// Process one listed workflow inside its own failure boundary.
    async fn process_workflow(
        &self,
        environment: &Environment,
        summary: &WorkflowSummary,
        hasher: &mut HashingService,
        outcome: &mut RuntimeSyncOutcome,
    ) -> Result<()> {
        let existing = self
            .store
            .find_mapping(environment.tenant_id, environment.id, &summary.id)
            .await?;

        if let Some(mapping) = &existing {
            // Operator-set exclusions are left untouched by sync passes.
            if matches!(
                mapping.status,
                MappingStatus::Ignored | MappingStatus::Deleted
            ) {
                outcome.skipped += 1;
                return Ok(());
            }
            // Short-circuit: unchanged upstream and not awaiting revival.
            if mapping.runtime_updated_at == Some(summary.updated_at)
                && mapping.status != MappingStatus::Missing
            {
                outcome.skipped += 1;
                return Ok(());
            }
        }

        let payload = self
            .runtime
            .fetch_workflow(environment.id, &summary.id)
            .await?;
        let canonical_hint = existing.as_ref().and_then(|m| m.canonical_id);
        let hash = hasher.fingerprint(&payload, canonical_hint)?;

        let (canonical_id, status) = if let Some(canonical_id) = canonical_hint {
            (Some(canonical_id), MappingStatus::Linked)
        } else {
            match self
                .try_auto_link(environment, &hash, &summary.id)
                .await?
            {
                Some(canonical_id) => {
                    debug!(
                        runtime_instance_id = %summary.id,
                        canonical_id = %canonical_id,
                        "Auto-linked runtime instance to canonical workflow"
                    );
                    outcome.linked += 1;
                    (Some(canonical_id), MappingStatus::Linked)
                }
                None => (None, MappingStatus::Untracked),
            }
        };

        if existing.is_none() {
            outcome.created += 1;
        }

        self.store
            .upsert_mapping(MappingUpsert {
                tenant_id: environment.tenant_id,
                environment_id: environment.id,
                runtime_instance_id: summary.id.clone(),
                canonical_id,
                status,
                environment_content_hash: Some(hash),
                runtime_updated_at: Some(summary.updated_at),
                payload: environment.retains_full_payload().then(|| payload.clone()),
            })
            .await?;
        Ok(())
    }

    /// Adopt a canonical workflow when exactly one Git fingerprint matches
    /// and that canonical id is not already bound to a different runtime
    /// instance in this environment.
    async fn try_auto_link(
        &self,
        environment: &Environment,
        content_hash: &str,
        runtime_instance_id: &str,
    ) -> Result<Option<Uuid>> {
        let candidates = self
            .store
            .find_git_states_by_hash(environment.tenant_id, environment.id, content_hash)
            .await?;
        let [candidate] = candidates.as_slice() else {
            return Ok(None);
        };

        if let Some(bound) = self
            .store
            .find_mapping_for_canonical(
                environment.tenant_id,
                environment.id,
                candidate.canonical_id,
            )
            .await?
        {
            if bound.runtime_instance_id != runtime_instance_id {
                return Ok(None);
            }
        }
        Ok(Some(candidate.canonical_id))
    }

    /// Diff the listed instance ids against previously tracked mappings and
    /// transition anything no longer present to `missing`. The runtime
    /// instance id stays on the row for audit; when the instance reappears
    /// in a later pass it is revived through the normal processing path.
    async fn mark_departed(
        &self,
        environment: &Environment,
        seen: &HashSet<&str>,
    ) -> Result<usize> {
        let tracked: Vec<WorkflowEnvironmentMapping> = self
            .store
            .list_mappings_by_status(
                environment.tenant_id,
                environment.id,
                &[MappingStatus::Linked, MappingStatus::Untracked],
            )
            .await?;

        let mut departed = 0;
        for mapping in tracked {
            if seen.contains(mapping.runtime_instance_id.as_str()) {
                continue;
            }
            debug!(
                runtime_instance_id = %mapping.runtime_instance_id,
                "Runtime instance no longer listed; marking missing"
            );
            self.store
                .set_mapping_status(
                    environment.tenant_id,
                    environment.id,
                    &mapping.runtime_instance_id,
                    MappingStatus::Missing,
                )
                .await?;
            departed += 1;
        }
        Ok(departed)
    }
}
