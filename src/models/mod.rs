//! # Entity Layer
//!
//! Data model for the synchronization core. Every entity maps 1:1 onto a
//! store table and derives `sqlx::FromRow` for the Postgres-backed store;
//! the in-memory store shares the same structs.
//!
//! Ownership is strict: [`WorkflowEnvironmentMapping`] is mutated only by the
//! runtime sync engine and Git sidecar ingestion, [`CanonicalGitState`] only
//! by the Git sync engine, and [`WorkflowDiffState`] only by the
//! reconciliation engine (it is a cache, fully derivable from the other two).

pub mod canonical_workflow;
pub mod diff_state;
pub mod environment;
pub mod environment_mapping;
pub mod git_state;
pub mod states;
pub mod sync_job;

pub use canonical_workflow::{CanonicalWorkflow, NewCanonicalWorkflow};
pub use diff_state::{ConflictMetadata, DiffStateUpsert, WorkflowDiffState};
pub use environment::Environment;
pub use environment_mapping::{MappingUpsert, WorkflowEnvironmentMapping};
pub use git_state::{CanonicalGitState, GitStateUpsert};
pub use states::{DiffStatus, EnvironmentClass, MappingStatus, SyncJobKind, SyncJobState};
pub use sync_job::{NewSyncJob, SyncCheckpoint, SyncJob};
