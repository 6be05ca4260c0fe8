/// Job lifecycle definitions
///
/// A job moves `pending -> running -> {paused <-> running} -> waiting_commit
/// -> completed`. `stopped` and `failed` are terminal exits.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    // ===== Active States =====
    /// Queued; entry URLs resolved but not yet fetched
    Pending,

    /// Fetching and extracting entry URLs
    Running,

    /// Held at an iteration boundary by the global pause flag
    Paused,

    /// Every entry URL processed; staged data awaits commit
    WaitingCommit,

    // ===== Terminal States =====
    /// Staged data promoted into the catalog
    Completed,

    /// Cancelled by an operator
    Stopped,

    /// Aborted by an error outside the per-URL retry budget
    Failed,
}

impl JobStatus {
    /// Returns true for states no transition leaves
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    /// Returns true for states listed as active jobs
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true when the job state machine allows `self -> next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running, WaitingCommit) => true,
            (WaitingCommit, Completed) => true,
            (Pending | Running | Paused | WaitingCommit, Stopped) => true,
            (Pending | Running | Paused | WaitingCommit, Failed) => true,
            _ => false,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::WaitingCommit => "waiting_commit",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "waiting_commit" => Some(Self::WaitingCommit),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all job states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Running,
            Self::Paused,
            Self::WaitingCommit,
            Self::Completed,
            Self::Stopped,
            Self::Failed,
        ]
    }

    /// States reported by `list_active_jobs`
    pub fn active_states() -> Vec<Self> {
        Self::all_states()
            .into_iter()
            .filter(JobStatus::is_active)
            .collect()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// What a job was started for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Fill in details for products already known by code
    Enrich,
    /// Re-crawl committed products
    Update,
    /// Inspect pages without the intent to commit
    Analyze,
    /// Crawl a whole category selection, following associated products
    Bulk,
}

impl JobType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Enrich => "enrich",
            Self::Update => "update",
            Self::Analyze => "analyze",
            Self::Bulk => "bulk",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "enrich" => Some(Self::Enrich),
            "update" => Some(Self::Update),
            "analyze" => Some(Self::Analyze),
            "bulk" => Some(Self::Bulk),
            _ => None,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
