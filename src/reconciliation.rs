//! # Reconciliation Engine
//!
//! Database → database diff/conflict computation: for every canonical
//! workflow shared by a (source, target) environment pair, classify the
//! relationship between the four recorded hashes (source Git, target Git,
//! source runtime, target runtime) and materialize it into
//! [`WorkflowDiffState`].
//!
//! The engine reads only state persisted by the two ingestion engines, never
//! the engines themselves, so its reads are eventually consistent with
//! concurrently running passes, which is acceptable because every result is
//! idempotently recomputable (the diff table is a cache).

use chrono::Utc;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::constants::RECONCILE_DEBOUNCE_SECS;
use crate::error::Result;
use crate::models::{CanonicalGitState, ConflictMetadata, DiffStateUpsert, DiffStatus};
use crate::storage::SyncStore;

/// Result of one `reconcile_pair` call.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ReconcileOutcome {
    /// Diff rows recomputed and upserted.
    pub updated: usize,
    /// Workflows skipped because all four hashes matched the stored row.
    pub unchanged: usize,
    /// True when the whole call was a debounced no-op.
    pub skipped_by_debounce: bool,
}

/// Aggregate over a full fan-out for one changed environment.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct ReconcileSummary {
    pub pairs_run: usize,
    pub pairs_debounced: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Pairwise diff/conflict computation over persisted sync state.
pub struct ReconciliationEngine {
    store: Arc<dyn SyncStore>,
    debounce_window: Duration,
    last_run: DashMap<(Uuid, Uuid, Uuid), Instant>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self {
            store,
            debounce_window: Duration::from_secs(RECONCILE_DEBOUNCE_SECS),
            last_run: DashMap::new(),
        }
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Recompute the diff state between two environments.
    ///
    /// A non-forced call within the debounce window of the last call for the
    /// same (tenant, source, target) key is a no-op reporting
    /// `skipped_by_debounce`; correctness is unaffected because the next
    /// successful call recomputes fully.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, source = %source_environment_id, target = %target_environment_id))]
    pub async fn reconcile_pair(
        &self,
        tenant_id: Uuid,
        source_environment_id: Uuid,
        target_environment_id: Uuid,
        force: bool,
    ) -> Result<ReconcileOutcome> {
        let key = (tenant_id, source_environment_id, target_environment_id);
        if !force {
            if let Some(last) = self.last_run.get(&key) {
                if last.elapsed() < self.debounce_window {
                    debug!("Reconciliation debounced");
                    return Ok(ReconcileOutcome {
                        skipped_by_debounce: true,
                        ..ReconcileOutcome::default()
                    });
                }
            }
        }
        self.last_run.insert(key, Instant::now());

        let source_git: HashMap<Uuid, CanonicalGitState> = self
            .store
            .list_git_states(tenant_id, source_environment_id)
            .await?
            .into_iter()
            .map(|s| (s.canonical_id, s))
            .collect();
        let target_git: HashMap<Uuid, CanonicalGitState> = self
            .store
            .list_git_states(tenant_id, target_environment_id)
            .await?
            .into_iter()
            .map(|s| (s.canonical_id, s))
            .collect();

        let canonical_ids: HashSet<Uuid> = source_git
            .keys()
            .chain(target_git.keys())
            .copied()
            .collect();

        let mut outcome = ReconcileOutcome::default();
        for canonical_id in canonical_ids {
            let source_state = source_git.get(&canonical_id);
            let target_state = target_git.get(&canonical_id);
            let source_git_hash = source_state.map(|s| s.git_content_hash.clone());
            let target_git_hash = target_state.map(|s| s.git_content_hash.clone());

            let source_env_hash = self
                .environment_hash(tenant_id, source_environment_id, canonical_id)
                .await?;
            let target_env_hash = self
                .environment_hash(tenant_id, target_environment_id, canonical_id)
                .await?;

            // Incremental recompute: identical inputs mean the stored row is
            // still correct.
            if let Some(previous) = self
                .store
                .find_diff_state(
                    tenant_id,
                    source_environment_id,
                    target_environment_id,
                    canonical_id,
                )
                .await?
            {
                if previous.hashes_match(
                    source_git_hash.as_deref(),
                    target_git_hash.as_deref(),
                    source_env_hash.as_deref(),
                    target_env_hash.as_deref(),
                ) {
                    outcome.unchanged += 1;
                    continue;
                }
            }

            let diff_status = classify_diff(
                source_git_hash.as_deref(),
                target_git_hash.as_deref(),
                source_env_hash.as_deref(),
                target_env_hash.as_deref(),
            );

            let conflict_metadata = if diff_status.is_conflict() {
                Some(serde_json::to_value(ConflictMetadata {
                    source_git_hash: source_git_hash.clone(),
                    target_git_hash: target_git_hash.clone(),
                    source_env_hash: source_env_hash.clone(),
                    target_env_hash: target_env_hash.clone(),
                    source_git_synced_at: source_state.map(|s| s.last_synced_at),
                    target_git_synced_at: target_state.map(|s| s.last_synced_at),
                    detected_at: Utc::now(),
                })?)
            } else {
                None
            };

            self.store
                .upsert_diff_state(DiffStateUpsert {
                    tenant_id,
                    source_environment_id,
                    target_environment_id,
                    canonical_id,
                    diff_status,
                    source_git_hash,
                    target_git_hash,
                    source_env_hash,
                    target_env_hash,
                    conflict_metadata,
                })
                .await?;
            outcome.updated += 1;
        }

        info!(
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            "Reconciliation pass finished"
        );
        Ok(outcome)
    }

    /// Reconcile a changed environment against every other environment of
    /// the tenant, in both directions.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, changed = %changed_environment_id))]
    pub async fn reconcile_all_pairs_for(
        &self,
        tenant_id: Uuid,
        changed_environment_id: Uuid,
    ) -> Result<ReconcileSummary> {
        let environments = self.store.list_environments(tenant_id).await?;
        let mut summary = ReconcileSummary::default();

        for other in environments {
            if other.id == changed_environment_id {
                continue;
            }
            for (source, target) in [
                (changed_environment_id, other.id),
                (other.id, changed_environment_id),
            ] {
                let outcome = self
                    .reconcile_pair(tenant_id, source, target, false)
                    .await?;
                if outcome.skipped_by_debounce {
                    summary.pairs_debounced += 1;
                } else {
                    summary.pairs_run += 1;
                    summary.updated += outcome.updated;
                    summary.unchanged += outcome.unchanged;
                }
            }
        }
        Ok(summary)
    }

    /// The runtime-side hash recorded for a canonical workflow in one
    /// environment, if a mapping binds it there.
    async fn environment_hash(
        &self,
        tenant_id: Uuid,
        environment_id: Uuid,
        canonical_id: Uuid,
    ) -> Result<Option<String>> {
        Ok(self
            .store
            .find_mapping_for_canonical(tenant_id, environment_id, canonical_id)
            .await?
            .and_then(|m| m.environment_content_hash))
    }
}

/// Deterministic diff classification, in strict priority order.
///
/// Absent Git state on both sides compares equal (rule 1); in practice that
/// combination never reaches storage because reconciliation only visits
/// workflows with Git state on at least one side.
pub fn classify_diff(
    source_git: Option<&str>,
    target_git: Option<&str>,
    source_env: Option<&str>,
    target_env: Option<&str>,
) -> DiffStatus {
    match (source_git, target_git) {
        // Neither side has Git state: nothing exists to promote.
        (None, None) => DiffStatus::Unchanged,
        // Only the target knows this workflow.
        (None, Some(_)) => DiffStatus::TargetOnly,
        // Only the source knows it; promotion would add it.
        (Some(_), None) => DiffStatus::Added,
        (Some(sg), Some(tg)) => {
            let source_has_local_changes =
                source_env.is_some() && source_env != Some(sg);
            let target_git_diverged = tg != sg;

            match (source_has_local_changes, target_git_diverged) {
                // Git states agree and the source runtime has not drifted.
                (false, false) => DiffStatus::Unchanged,
                // Source runtime edited over a common Git state: source is
                // ahead of an unchanged target.
                (true, false) => DiffStatus::Modified,
                // Both sides moved independently since the last common Git
                // state. Takes priority over hotfix/modified whenever its
                // precondition holds.
                (true, true) => DiffStatus::Conflict,
                (false, true) => {
                    // Target runtime already matches what source wants to
                    // promote, but target Git moved on: a hotfix landed
                    // there.
                    if target_env == Some(sg) {
                        DiffStatus::TargetHotfix
                    } else {
                        // Source is strictly ahead.
                        DiffStatus::Modified
                    }
                }
            }
        }
    }
}
