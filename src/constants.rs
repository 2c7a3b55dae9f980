//! # System Constants
//!
//! Default tuning values shared between the engines, the reconciliation
//! layer, and the scheduler. Anything here can be overridden through
//! [`crate::config::FlowsyncConfig`]; these are the values used when no
//! configuration is supplied.

/// Number of workflows processed per batch by the runtime sync engine.
///
/// Batches bound memory usage and define the checkpoint granularity: a crash
/// mid-pass loses at most one batch of progress.
pub const SYNC_BATCH_SIZE: usize = 25;

/// Minimum interval between two reconciliation runs for the same
/// (tenant, source environment, target environment) key.
pub const RECONCILE_DEBOUNCE_SECS: u64 = 60;

/// Minimum interval between two scheduler-driven sync triggers for the same
/// (tenant, environment) key.
pub const TRIGGER_DEBOUNCE_SECS: u64 = 60;

/// Default age a successful sync must reach before the scheduler considers
/// the environment eligible again (30 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 1800;

/// How often each scheduler loop wakes up to look for eligible environments.
pub const SCHEDULER_TICK_SECS: u64 = 60;

/// Capacity of the broadcast channel carrying progress and job lifecycle
/// events. Delivery is best-effort; lagging subscribers drop events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Folder prefix under which workflow definition files live in Git.
pub const GIT_WORKFLOW_PREFIX: &str = "workflows";

/// Suffix of the sidecar metadata files carrying environment mappings.
pub const SIDECAR_SUFFIX: &str = ".env-map.json";
