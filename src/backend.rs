//! External collaborators of the job engine.
//!
//! ```text
//!   Deployment::launch_task() ──→ Deployment::check_task() ... ──→ done
//!            │                          │
//!            └──── Database::save_job() on every transition ────┘
//! ```
//!
//! ## Method table
//!
//! | Trait | Method | Kind | Returns |
//! |-------|--------|------|---------|
//! | `Database` | `save_job()` | async | `JobResult<()>` |
//! | `Database` | `deploy_hashes()` | async | `JobResult<DeployHashes>` |
//! | `Deployment` | `launch_task()` | async | `JobResult<String>` |
//! | `Deployment` | `check_task()` | async | `JobResult<bool>` |
//! | `Notifier` | `notify_job()` | sync | `()` |
//!
//! Backend calls have no built-in retry. A failed call fails the job; a task
//! that is not ready yet is polled again on the next `advance`.

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::error::JobResult;
use crate::job::JobState;
use crate::params::DeployHashes;

/// Container overrides passed to a launched task, e.g. environment variables.
pub type TaskOverrides = FxHashMap<String, String>;

/// Persistent job store.
#[async_trait]
pub trait Database: Send + Sync {
    /// Write a job state through to the store.
    async fn save_job(&self, state: &JobState) -> JobResult<()>;

    /// Commit hashes of the currently deployed components.
    async fn deploy_hashes(&self) -> JobResult<DeployHashes>;
}

/// Container task-control backend.
///
/// # Contract
///
/// - `launch_task()` returns the identifier of the spawned task.
/// - `check_task()` returns `true` when the task's running state matches
///   `expect_running`: running when `true` is expected, stopped otherwise.
/// - Both calls may be slow and may fail; callers treat failures as terminal.
#[async_trait]
pub trait Deployment: Send + Sync {
    /// Launch a task from the latest definition of `family` in `cluster`.
    async fn launch_task(
        &self,
        cluster: &str,
        family: &str,
        container: &str,
        network_config_param: &str,
        overrides: Option<&TaskOverrides>,
    ) -> JobResult<String>;

    /// Check whether a task's running state matches `expect_running`.
    async fn check_task(&self, cluster: &str, task_id: &str, expect_running: bool)
    -> JobResult<bool>;
}

/// Receiver of every job state produced by a transition.
///
/// Fire-and-forget: implementations must not block the caller on delivery.
pub trait Notifier: Send + Sync {
    fn notify_job(&self, state: &JobState);
}

/// Notifier that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_job(&self, _state: &JobState) {}
}
