//! Scheduler pass tests: eligibility, debounce, and failure handling over
//! the full store → orchestrator → engine → reconciliation wiring.

mod common;

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use flowsync_core::clients::{GitHost, RuntimeClient};
use flowsync_core::config::SchedulerConfig;
use flowsync_core::engines::{GitSyncEngine, RuntimeSyncEngine};
use flowsync_core::models::{Environment, EnvironmentClass, SyncJobKind, SyncJobState};
use flowsync_core::orchestration::SyncOrchestrator;
use flowsync_core::reconciliation::ReconciliationEngine;
use flowsync_core::scheduler::Scheduler;
use flowsync_core::storage::{MemoryStore, SyncStore};

use common::{test_environment, workflow_payload, FailingTouchStore, MockGitHost, MockRuntime};

struct Fixture {
    store: Arc<MemoryStore>,
    runtime: Arc<MockRuntime>,
    git: Arc<MockGitHost>,
    scheduler: Arc<Scheduler>,
}

fn fixture_with_config(config: SchedulerConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let runtime = Arc::new(MockRuntime::new());
    let git = Arc::new(MockGitHost::new());

    let dyn_store = Arc::clone(&store) as Arc<dyn SyncStore>;
    let orchestrator = SyncOrchestrator::new(Arc::clone(&dyn_store));
    let runtime_engine = Arc::new(RuntimeSyncEngine::new(
        Arc::clone(&dyn_store),
        Arc::clone(&runtime) as Arc<dyn RuntimeClient>,
    ));
    let git_engine = Arc::new(GitSyncEngine::new(
        Arc::clone(&dyn_store),
        Arc::clone(&git) as Arc<dyn GitHost>,
    ));
    let reconciliation = Arc::new(ReconciliationEngine::new(Arc::clone(&dyn_store)));

    let scheduler = Arc::new(Scheduler::new(
        dyn_store,
        orchestrator,
        runtime_engine,
        git_engine,
        reconciliation,
        config,
    ));
    Fixture {
        store,
        runtime,
        git,
        scheduler,
    }
}

fn fixture() -> Fixture {
    fixture_with_config(SchedulerConfig {
        enabled: true,
        tick_secs: 60,
        trigger_debounce_secs: 60,
        default_sync_interval_secs: 1800,
    })
}

async fn register(fixture: &Fixture, env: &Environment) {
    fixture.store.upsert_environment(env.clone()).await.unwrap();
}

#[tokio::test]
async fn test_empty_pass_reports_nothing() {
    let fixture = fixture();
    let report = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(report.triggered, 0);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_pass_runs_engine_and_completes_job() {
    let fixture = fixture();
    let env = test_environment(Uuid::new_v4(), "dev", EnvironmentClass::Development);
    register(&fixture, &env).await;
    fixture
        .runtime
        .put_workflow(env.id, "wf_1", Utc::now(), workflow_payload("etl", &["http"]));

    let report = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(report.triggered, 1);
    assert_eq!(report.failed, 0);

    let mapping = fixture
        .store
        .find_mapping(env.tenant_id, env.id, "wf_1")
        .await
        .unwrap();
    assert!(mapping.is_some());

    // The job reached its terminal state and the timestamps advanced.
    let refreshed = fixture.store.find_environment(env.id).await.unwrap().unwrap();
    assert!(refreshed.last_sync_attempted_at.is_some());
    assert!(refreshed.last_sync_at.is_some());
}

#[tokio::test]
async fn test_fresh_environment_is_skipped() {
    let fixture = fixture();
    let mut env = test_environment(Uuid::new_v4(), "dev", EnvironmentClass::Development);
    env.last_sync_at = Some(Utc::now());
    register(&fixture, &env).await;

    let report = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(report.skipped_fresh, 1);
    assert_eq!(report.triggered, 0);
}

#[tokio::test]
async fn test_stale_environment_is_triggered() {
    let fixture = fixture();
    let mut env = test_environment(Uuid::new_v4(), "dev", EnvironmentClass::Development);
    env.last_sync_at = Some(Utc::now() - chrono::Duration::hours(2));
    register(&fixture, &env).await;

    let report = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(report.triggered, 1);
}

#[tokio::test]
async fn test_per_environment_interval_override() {
    let fixture = fixture();
    let mut env = test_environment(Uuid::new_v4(), "dev", EnvironmentClass::Development);
    // 5-minute interval, last synced 10 minutes ago: eligible despite the
    // 30-minute default.
    env.sync_interval_secs = Some(300);
    env.last_sync_at = Some(Utc::now() - chrono::Duration::minutes(10));
    register(&fixture, &env).await;

    let report = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(report.triggered, 1);
}

#[tokio::test]
async fn test_trigger_debounce_suppresses_back_to_back_passes() {
    let fixture = fixture();
    let env = test_environment(Uuid::new_v4(), "dev", EnvironmentClass::Development);
    register(&fixture, &env).await;

    let first = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(first.triggered, 1);

    let second = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(second.skipped_debounce, 1);
    assert_eq!(second.triggered, 0);
}

#[tokio::test]
async fn test_engine_failure_marks_job_failed_and_continues() {
    let fixture = fixture();
    let env = test_environment(Uuid::new_v4(), "dev", EnvironmentClass::Development);
    register(&fixture, &env).await;
    fixture.git.set_unavailable(true);

    let report = fixture
        .scheduler
        .run_pass(SyncJobKind::RepositorySync)
        .await
        .unwrap();
    assert_eq!(report.failed, 1);

    // The environment's retry gate still advanced.
    let refreshed = fixture.store.find_environment(env.id).await.unwrap().unwrap();
    assert!(refreshed.last_sync_at.is_some());

    let job = fixture
        .store
        .find_active_job(env.tenant_id, env.id, SyncJobKind::RepositorySync)
        .await
        .unwrap();
    assert!(job.is_none(), "failed job is terminal");
}

#[tokio::test]
async fn test_store_error_on_one_environment_does_not_abort_the_pass() {
    let store = Arc::new(FailingTouchStore::new(
        Arc::new(MemoryStore::new()) as Arc<dyn SyncStore>
    ));
    let runtime = Arc::new(MockRuntime::new());
    let git = Arc::new(MockGitHost::new());

    let dyn_store = Arc::clone(&store) as Arc<dyn SyncStore>;
    let orchestrator = SyncOrchestrator::new(Arc::clone(&dyn_store));
    let runtime_engine = Arc::new(RuntimeSyncEngine::new(
        Arc::clone(&dyn_store),
        Arc::clone(&runtime) as Arc<dyn RuntimeClient>,
    ));
    let git_engine = Arc::new(GitSyncEngine::new(
        Arc::clone(&dyn_store),
        Arc::clone(&git) as Arc<dyn GitHost>,
    ));
    let reconciliation = Arc::new(ReconciliationEngine::new(Arc::clone(&dyn_store)));
    let scheduler = Scheduler::new(
        dyn_store,
        orchestrator,
        runtime_engine,
        git_engine,
        reconciliation,
        SchedulerConfig {
            enabled: true,
            tick_secs: 60,
            trigger_debounce_secs: 60,
            default_sync_interval_secs: 1800,
        },
    );

    let tenant = Uuid::new_v4();
    let doomed = test_environment(tenant, "dev", EnvironmentClass::Development);
    let healthy = test_environment(tenant, "staging", EnvironmentClass::Staging);
    store.upsert_environment(doomed.clone()).await.unwrap();
    store.upsert_environment(healthy.clone()).await.unwrap();
    store.fail_touch_for(doomed.id);

    runtime.put_workflow(
        healthy.id,
        "wf-1",
        Utc::now(),
        workflow_payload("order-intake", &["start", "transform"]),
    );

    let report = scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.triggered, 1);

    // The healthy environment still got a full pass.
    let mapping = store
        .find_mapping(tenant, healthy.id, "wf-1")
        .await
        .unwrap();
    assert!(mapping.is_some(), "healthy environment was ingested");

    // The doomed environment never reached job creation.
    let job = store
        .find_active_job(tenant, doomed.id, SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert!(job.is_none());
}

#[tokio::test]
async fn test_repository_pass_reconciles_siblings() {
    let fixture = fixture();
    let tenant = Uuid::new_v4();
    let dev = test_environment(tenant, "dev", EnvironmentClass::Development);
    let staging = test_environment(tenant, "staging", EnvironmentClass::Staging);
    register(&fixture, &dev).await;
    // Staging stays out of the trigger set but participates in fan-out.
    let mut staging = staging;
    staging.sync_enabled = false;
    register(&fixture, &staging).await;

    let canonical_id = Uuid::new_v4();
    fixture.git.put_json(
        &format!("workflows/dev/{canonical_id}.json"),
        &workflow_payload("etl", &["http"]),
    );

    fixture
        .scheduler
        .run_pass(SyncJobKind::RepositorySync)
        .await
        .unwrap();

    let diff = fixture
        .store
        .find_diff_state(tenant, dev.id, staging.id, canonical_id)
        .await
        .unwrap();
    assert!(diff.is_some(), "successful pass fans out into reconciliation");
}

#[tokio::test]
async fn test_disabled_scheduler_spawns_no_loops() {
    let fixture = fixture_with_config(SchedulerConfig {
        enabled: false,
        tick_secs: 60,
        trigger_debounce_secs: 60,
        default_sync_interval_secs: 1800,
    });
    assert!(fixture.scheduler.spawn().is_empty());
}

#[tokio::test]
async fn test_disabled_environments_are_not_listed() {
    let fixture = fixture();
    let mut env = test_environment(Uuid::new_v4(), "dev", EnvironmentClass::Development);
    env.sync_enabled = false;
    register(&fixture, &env).await;

    let report = fixture
        .scheduler
        .run_pass(SyncJobKind::EnvironmentSync)
        .await
        .unwrap();
    assert_eq!(report.triggered, 0);
    assert_eq!(report.skipped_fresh, 0);
}
