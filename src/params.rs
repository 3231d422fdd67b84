//! Per-type job parameters.
//!
//! Each job type owns its parameter shape. [`JobParams`] is tagged by the
//! job type, so reading a parameter never needs a runtime shape check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobType;

/// Commit hashes keyed by deployed component.
pub type DeployHashes = rustc_hash::FxHashMap<DeployComponent, String>;

/// Parameters of a job, tagged by job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum JobParams {
    Deploy(DeployParams),
    Anchor(TaskParams),
    #[serde(rename = "test_e2e")]
    TestE2E(TaskParams),
    TestSmoke(TaskParams),
}

impl JobParams {
    pub fn job_type(&self) -> JobType {
        match self {
            JobParams::Deploy(_) => JobType::Deploy,
            JobParams::Anchor(_) => JobType::Anchor,
            JobParams::TestE2E(_) => JobType::TestE2E,
            JobParams::TestSmoke(_) => JobType::TestSmoke,
        }
    }

    /// Parameters of a task-backed job, if this is one.
    pub fn task(&self) -> Option<&TaskParams> {
        match self {
            JobParams::Anchor(p) | JobParams::TestE2E(p) | JobParams::TestSmoke(p) => Some(p),
            JobParams::Deploy(_) => None,
        }
    }

    pub fn task_mut(&mut self) -> Option<&mut TaskParams> {
        match self {
            JobParams::Anchor(p) | JobParams::TestE2E(p) | JobParams::TestSmoke(p) => Some(p),
            JobParams::Deploy(_) => None,
        }
    }

    pub fn deploy(&self) -> Option<&DeployParams> {
        match self {
            JobParams::Deploy(p) => Some(p),
            _ => None,
        }
    }

    /// Whether the job was requested manually rather than by automation.
    pub fn is_manual(&self) -> bool {
        match self {
            JobParams::Deploy(p) => p.manual,
            JobParams::Anchor(p) | JobParams::TestE2E(p) | JobParams::TestSmoke(p) => p.manual,
        }
    }
}

/// Parameters of a job that runs as a task on the task backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    /// Identifier of the spawned task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// When the task was launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manual: bool,
}

impl TaskParams {
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }
}

/// Parameters of a deployment job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployParams {
    pub component: DeployComponent,
    /// Commit hash being deployed.
    pub sha: String,
    #[serde(default)]
    pub manual: bool,
}

impl DeployParams {
    pub fn new(component: DeployComponent, sha: impl Into<String>) -> Self {
        Self {
            component,
            sha: sha.into(),
            manual: false,
        }
    }

    pub fn with_manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Check that the sha is a full 40-character hex commit hash.
    pub fn has_valid_sha(&self) -> bool {
        is_commit_hash(&self.sha)
    }
}

/// Check that `sha` is a full 40-character hex commit hash.
pub fn is_commit_hash(sha: &str) -> bool {
    sha.len() == 40 && sha.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Deployable component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployComponent {
    Ceramic,
    Cas,
    Ipfs,
}

impl DeployComponent {
    pub const ALL: [DeployComponent; 3] = [
        DeployComponent::Ceramic,
        DeployComponent::Cas,
        DeployComponent::Ipfs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployComponent::Ceramic => "ceramic",
            DeployComponent::Cas => "cas",
            DeployComponent::Ipfs => "ipfs",
        }
    }

    /// GitHub repository holding the component's source.
    pub fn repo(&self) -> &'static str {
        match self {
            DeployComponent::Ceramic => "js-ceramic",
            DeployComponent::Cas => "ceramic-anchor-service",
            DeployComponent::Ipfs => "go-ipfs-daemon",
        }
    }
}

impl std::fmt::Display for DeployComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
