//! Job lifecycle types.
//!
//! The stage vocabulary shared by every job type:
//!
//! ```text
//!   Queued ──→ Dequeued ──→ Started ──→ Waiting ──→ Completed
//!                 │            │           │
//!                 └────────────┴───────────┴──→ Failed(error)
//!
//!   Delayed, Skipped       set by submission / scheduling paths
//!   Canceled               set outside the engine (operator action)
//! ```
//!
//! **Invariants:**
//! - A job is created at `Queued`.
//! - Terminal stages (`Failed`, `Canceled`, `Completed`) are permanent.
//! - `ts` is the time of the most recent transition. `Queued → Dequeued`
//!   keeps the queued timestamp.
//! - A transition produces a new [`JobState`]; the previous value stays a
//!   valid snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::params::JobParams;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random job ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Deploy,
    Anchor,
    #[serde(rename = "test_e2e")]
    TestE2E,
    TestSmoke,
}

impl JobType {
    /// All job types, in notification order.
    pub const ALL: [JobType; 4] = [
        JobType::Deploy,
        JobType::Anchor,
        JobType::TestE2E,
        JobType::TestSmoke,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Deploy => "deploy",
            JobType::Anchor => "anchor",
            JobType::TestE2E => "test_e2e",
            JobType::TestSmoke => "test_smoke",
        }
    }

    /// Human-readable name used in notifications.
    pub fn display_name(&self) -> &'static str {
        match self {
            JobType::Deploy => "deployment",
            JobType::Anchor => "anchor worker",
            JobType::TestE2E => "e2e tests",
            JobType::TestSmoke => "smoke tests",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Job was submitted and waits to be picked up.
    Queued,
    /// Job was picked up by the engine.
    Dequeued,
    /// External work was launched.
    Started,
    /// External work is running and the job waits for it to finish.
    Waiting,
    /// Job was postponed by the submission path.
    Delayed,
    /// Job was skipped by the submission path.
    Skipped,
    /// Job failed.
    Failed,
    /// Job was canceled.
    Canceled,
    /// Job completed successfully.
    Completed,
}

impl JobStage {
    /// Check if this is a terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStage::Failed | JobStage::Canceled | JobStage::Completed
        )
    }

    /// Check if a job in this stage is occupying the task backend.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStage::Dequeued | JobStage::Started | JobStage::Waiting
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Queued => "queued",
            JobStage::Dequeued => "dequeued",
            JobStage::Started => "started",
            JobStage::Waiting => "waiting",
            JobStage::Delayed => "delayed",
            JobStage::Skipped => "skipped",
            JobStage::Failed => "failed",
            JobStage::Canceled => "canceled",
            JobStage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one job.
///
/// The job type is carried by [`JobParams`], so the type and the parameter
/// shape cannot disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub id: JobId,
    pub stage: JobStage,
    /// Time of the most recent stage transition.
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub params: JobParams,
    /// Description of the error that failed the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobState {
    /// Create a queued job.
    pub fn new(id: impl Into<JobId>, params: JobParams, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            stage: JobStage::Queued,
            ts: now,
            params,
            error: None,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.params.job_type()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.stage.is_active()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({}, {})",
            self.job_type(),
            self.id,
            self.stage,
            self.ts.to_rfc3339()
        )
    }
}
