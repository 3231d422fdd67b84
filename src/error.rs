//! Job engine error types.
//!
//! Errors are categorized by origin:
//!
//! | Category | Variants | Effect on the job |
//! |----------|----------|-------------------|
//! | **External** | `Deployment`, `Database` | Failed |
//! | **Timeout** | `StartupTimeout`, `CompletionTimeout` | Failed |
//! | **Defensive** | `UnexpectedState`, `MissingParam` | Failed |
//! | **Setup** | `Unsupported`, `Configuration` | job untouched |
//!
//! Non-readiness of an external task is not an error: the job is returned
//! unchanged and polled again later.

use thiserror::Error;

use crate::job::{JobStage, JobType};

/// Errors that can occur while advancing jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum JobError {
    /// Task backend call failed.
    #[error("Deployment error: {0}")]
    Deployment(String),

    /// Persistence call failed.
    #[error("Database error: {0}")]
    Database(String),

    /// The launched task did not start in time.
    #[error("Startup timeout")]
    StartupTimeout,

    /// The launched task did not finish in time.
    #[error("Completion timeout")]
    CompletionTimeout,

    /// The job reached a stage its variant does not handle.
    #[error("Unexpected state: {job_type} job in stage {stage}")]
    UnexpectedState { job_type: JobType, stage: JobStage },

    /// A stage needs a parameter the job does not carry.
    #[error("Missing parameter {param} in stage {stage}")]
    MissingParam { param: &'static str, stage: JobStage },

    /// No variant is registered for the job type.
    #[error("Unsupported job type: {0}")]
    Unsupported(JobType),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl JobError {
    /// Returns `true` if this error was synthesized by a timeout check.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StartupTimeout | Self::CompletionTimeout)
    }

    /// Returns `true` if this error came from an external collaborator.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Deployment(_) | Self::Database(_))
    }
}

/// Result type for job engine operations.
pub type JobResult<T> = Result<T, JobError>;
