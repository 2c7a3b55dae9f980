use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a runtime-instance-to-canonical-workflow binding.
///
/// Mappings are never deleted, only status-transitioned (soft lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum MappingStatus {
    /// Bound to a canonical workflow (`canonical_id` is always set)
    Linked,
    /// Seen in the runtime but not matched to any canonical workflow
    Untracked,
    /// Previously seen, no longer reported by the runtime
    Missing,
    /// Deliberately excluded from synchronization by an operator
    Ignored,
    /// Tombstoned after explicit deletion
    Deleted,
}

impl MappingStatus {
    /// Statuses that count as "present" when diffing the runtime listing
    /// against recorded mappings.
    pub fn is_tracked_presence(&self) -> bool {
        matches!(self, Self::Linked | Self::Untracked)
    }
}

impl fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linked => write!(f, "linked"),
            Self::Untracked => write!(f, "untracked"),
            Self::Missing => write!(f, "missing"),
            Self::Ignored => write!(f, "ignored"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

impl std::str::FromStr for MappingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linked" => Ok(Self::Linked),
            "untracked" => Ok(Self::Untracked),
            "missing" => Ok(Self::Missing),
            "ignored" => Ok(Self::Ignored),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!("Invalid mapping status: {s}")),
        }
    }
}

/// Pairwise diff/conflict classification between two environments for one
/// canonical workflow, in strict priority order (see
/// [`crate::reconciliation::classify_diff`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum DiffStatus {
    /// Source and target Git states agree
    Unchanged,
    /// Only the target has Git state for this workflow
    TargetOnly,
    /// Only the source has Git state; promoting would add it
    Added,
    /// Both sides changed independently since the last common Git state
    Conflict,
    /// Target runtime already matches the source, but target Git moved on
    TargetHotfix,
    /// Source is strictly ahead of the target
    Modified,
}

impl DiffStatus {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::TargetOnly => write!(f, "target_only"),
            Self::Added => write!(f, "added"),
            Self::Conflict => write!(f, "conflict"),
            Self::TargetHotfix => write!(f, "target_hotfix"),
            Self::Modified => write!(f, "modified"),
        }
    }
}

impl std::str::FromStr for DiffStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unchanged" => Ok(Self::Unchanged),
            "target_only" => Ok(Self::TargetOnly),
            "added" => Ok(Self::Added),
            "conflict" => Ok(Self::Conflict),
            "target_hotfix" => Ok(Self::TargetHotfix),
            "modified" => Ok(Self::Modified),
            _ => Err(format!("Invalid diff status: {s}")),
        }
    }
}

/// Sync job lifecycle: `pending → running → {completed, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum SyncJobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SyncJobState {
    /// Check if this is a terminal state (no further transitions allowed).
    ///
    /// At most one NON-terminal job per (tenant, environment, kind) may exist
    /// at a time; the store enforces this.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SyncJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncJobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid sync job state: {s}")),
        }
    }
}

impl Default for SyncJobState {
    fn default() -> Self {
        Self::Pending
    }
}

/// What a sync job ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum SyncJobKind {
    /// Runtime → database ingestion for one environment
    EnvironmentSync,
    /// Git → database ingestion for one environment's promotion pipeline
    RepositorySync,
}

impl fmt::Display for SyncJobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnvironmentSync => write!(f, "environment_sync"),
            Self::RepositorySync => write!(f, "repository_sync"),
        }
    }
}

impl std::str::FromStr for SyncJobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "environment_sync" => Ok(Self::EnvironmentSync),
            "repository_sync" => Ok(Self::RepositorySync),
            _ => Err(format!("Invalid sync job kind: {s}")),
        }
    }
}

/// Environment class within a promotion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum EnvironmentClass {
    Development,
    Staging,
    Production,
}

impl EnvironmentClass {
    /// Whether mappings in this environment class retain the full workflow
    /// payload. Only the source-of-truth-for-new-work class does, to bound
    /// storage everywhere else.
    pub fn retains_payload(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for EnvironmentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for EnvironmentClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            _ => Err(format!("Invalid environment class: {s}")),
        }
    }
}
