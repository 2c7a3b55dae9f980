//! # Ingestion Engines
//!
//! One-way data flows into the store: [`RuntimeSyncEngine`] pulls workflow
//! state from the runtime (batch-by-batch with checkpointing),
//! [`GitSyncEngine`] pulls canonical identity and Git-side fingerprints from
//! the promotion repository. Both isolate per-item failures: one bad
//! workflow or file is collected into the outcome's `errors` list and never
//! aborts the pass.

pub mod git_sync;
pub mod runtime_sync;

pub use git_sync::{GitSyncEngine, GitSyncOutcome};
pub use runtime_sync::{RuntimeSyncEngine, RuntimeSyncOutcome};

use serde::{Deserialize, Serialize};

/// One isolated per-item failure inside a sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    /// Runtime instance id or Git path of the failing item.
    pub identifier: String,
    pub message: String,
}
