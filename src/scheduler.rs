//! # Sync Scheduler
//!
//! Periodic, debounced driver for the synchronization engines. Two
//! independent loops (repository sync, environment sync) wake on a fixed
//! tick, walk every sync-enabled environment across all tenants, and hand
//! eligible ones to the orchestrator. After a successful engine pass the
//! changed environment is reconciled against every sibling.
//!
//! The scheduler is disabled by default; when disabled, all synchronization
//! is purely request-driven through [`SyncOrchestrator`]. It holds no state
//! that matters for correctness; the trigger debounce map only bounds
//! redundant work, and the orchestrator's storage-side job uniqueness
//! protects against doubled triggers from multiple scheduler instances.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::engines::{GitSyncEngine, RuntimeSyncEngine};
use crate::error::Result;
use crate::models::{Environment, SyncJobKind};
use crate::orchestration::SyncOrchestrator;
use crate::reconciliation::ReconciliationEngine;
use crate::storage::SyncStore;

/// Counters for one scheduler pass, mostly for observability and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerPassReport {
    /// Environments handed to an engine this pass.
    pub triggered: usize,
    /// Environments inside the trigger-debounce window.
    pub skipped_debounce: usize,
    /// Environments whose last successful sync is still fresh.
    pub skipped_fresh: usize,
    /// Environments with a job already in flight.
    pub already_running: usize,
    /// Environments whose engine pass failed (job marked failed).
    pub failed: usize,
}

/// Periodic driver over all sync-enabled environments.
pub struct Scheduler {
    store: Arc<dyn SyncStore>,
    orchestrator: SyncOrchestrator,
    runtime_engine: Arc<RuntimeSyncEngine>,
    git_engine: Arc<GitSyncEngine>,
    reconciliation: Arc<ReconciliationEngine>,
    config: SchedulerConfig,
    trigger_debounce: DashMap<(Uuid, Uuid, SyncJobKind), Instant>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn SyncStore>,
        orchestrator: SyncOrchestrator,
        runtime_engine: Arc<RuntimeSyncEngine>,
        git_engine: Arc<GitSyncEngine>,
        reconciliation: Arc<ReconciliationEngine>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            orchestrator,
            runtime_engine,
            git_engine,
            reconciliation,
            config,
            trigger_debounce: DashMap::new(),
        }
    }

    /// Spawn the two periodic loops. Returns immediately with their
    /// handles; returns no handles when the scheduler is disabled.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if !self.config.enabled {
            info!("Scheduler disabled; synchronization is request-driven only");
            return Vec::new();
        }

        let mut handles = Vec::with_capacity(2);
        for kind in [SyncJobKind::RepositorySync, SyncJobKind::EnvironmentSync] {
            let scheduler = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(scheduler.tick());
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Err(err) = scheduler.run_pass(kind).await {
                        error!(kind = %kind, error = %err, "Scheduler pass failed");
                    }
                }
            }));
        }
        info!(tick_secs = self.config.tick_secs, "Scheduler loops started");
        handles
    }

    fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.tick_secs)
    }

    /// One pass of one loop: trigger every eligible environment.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn run_pass(&self, kind: SyncJobKind) -> Result<SchedulerPassReport> {
        let environments = self.store.list_sync_enabled_environments().await?;
        let mut report = SchedulerPassReport::default();

        for environment in environments {
            let key = (environment.tenant_id, environment.id, kind);
            if let Some(last) = self.trigger_debounce.get(&key) {
                if last.elapsed().as_secs() < self.config.trigger_debounce_secs {
                    report.skipped_debounce += 1;
                    continue;
                }
            }

            if let Some(last_sync) = environment.last_sync_at {
                let age = chrono::Utc::now().signed_duration_since(last_sync);
                if age.to_std().unwrap_or_default() < environment.sync_interval() {
                    report.skipped_fresh += 1;
                    continue;
                }
            }

            self.trigger_debounce.insert(key, Instant::now());
            match self.run_environment(&environment, kind).await {
                Ok(EnvironmentRun::Completed) => report.triggered += 1,
                Ok(EnvironmentRun::AlreadyRunning) => report.already_running += 1,
                Ok(EnvironmentRun::Failed) => {
                    report.triggered += 1;
                    report.failed += 1;
                }
                Err(err) => {
                    // Same isolation the engines apply per item: a store
                    // error on one environment (an environment row deleted
                    // mid-tick, say) must not abort the rest of the pass.
                    error!(
                        environment_id = %environment.id,
                        error = %err,
                        "Sync trigger failed; continuing with remaining environments"
                    );
                    report.failed += 1;
                }
            }
        }

        debug!(
            triggered = report.triggered,
            skipped_debounce = report.skipped_debounce,
            skipped_fresh = report.skipped_fresh,
            already_running = report.already_running,
            failed = report.failed,
            "Scheduler pass finished"
        );
        Ok(report)
    }

    /// Run one environment through job creation, the engine, and the
    /// reconciliation fan-out.
    async fn run_environment(
        &self,
        environment: &Environment,
        kind: SyncJobKind,
    ) -> Result<EnvironmentRun> {
        let (job, is_new) = self
            .orchestrator
            .request_sync(environment.tenant_id, environment.id, kind)
            .await?;
        if !is_new {
            debug!(job_id = %job.id, "Sync already in flight; leaving it alone");
            return Ok(EnvironmentRun::AlreadyRunning);
        }

        let (job, recorder) = self.orchestrator.begin(&job).await?;

        let engine_result = match kind {
            SyncJobKind::EnvironmentSync => self
                .runtime_engine
                .sync_environment(environment, &recorder)
                .await
                .and_then(|outcome| Ok(serde_json::to_value(outcome)?)),
            SyncJobKind::RepositorySync => self
                .git_engine
                .sync_repository(environment)
                .await
                .and_then(|outcome| Ok(serde_json::to_value(outcome)?)),
        };

        match engine_result {
            Ok(result) => {
                self.orchestrator.complete_sync(&job, result).await?;
                self.reconciliation
                    .reconcile_all_pairs_for(environment.tenant_id, environment.id)
                    .await?;
                Ok(EnvironmentRun::Completed)
            }
            Err(err) => {
                // Upstream unavailability and the like: the job fails, the
                // retry-gating timestamp still advances, and the next tick
                // or explicit request retries idempotently.
                self.orchestrator.fail_sync(&job, &err.to_string()).await?;
                Ok(EnvironmentRun::Failed)
            }
        }
    }
}

enum EnvironmentRun {
    Completed,
    AlreadyRunning,
    Failed,
}
