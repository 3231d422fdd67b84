//! Job variants: one `advance` step function per job type.
//!
//! # Contract
//!
//! - `advance()` MAY be called repeatedly while the job is not terminal.
//! - A job waiting on external work that is neither ready nor timed out is
//!   returned **unchanged** with `Ok`. The driver polls again later.
//! - Every stage change goes through [`transition`].
//! - A failed backend call moves the job to `Failed`; it is never retried
//!   inside one `advance()`.
//!
//! # Task jobs
//!
//! [`TaskJob`] runs one task on the task backend and waits for it to finish.
//! A [`TaskProfile`] carries the per-type constants:
//!
//! ```text
//!   Queued ──→ Dequeued ──launch──→ Started ──running──→ Waiting ──stopped──→ Completed
//!                  │                   │                    │
//!             launch error      startup timeout     completion timeout
//!                  └───────────────────┴────────────────────┴──→ Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::backend::{Deployment, TaskOverrides};
use crate::config::{DEFAULT_WAIT_TIME, EnvType};
use crate::error::{JobError, JobResult};
use crate::job::{JobStage, JobState, JobType};
use crate::timeout::is_timed_out;
use crate::transition::{JobContext, transition};

/// Smoke tests get this long to run.
pub const SMOKE_TEST_FAILURE_TIME: Duration = Duration::from_secs(15 * 60);

/// End-to-end tests get this long to run.
pub const E2E_TEST_FAILURE_TIME: Duration = Duration::from_secs(60 * 60);

/// Cluster running the QA test tasks.
pub const QA_TESTS_CLUSTER: &str = "ceramic-qa-tests";

/// Per-type implementation of the `advance` step.
#[async_trait]
pub trait JobVariant: Send + Sync {
    /// Job type handled by this variant.
    fn job_type(&self) -> JobType;

    /// Take one step on `state` at time `now`.
    async fn advance(&self, ctx: &JobContext, state: &JobState, now: DateTime<Utc>)
    -> JobResult<JobState>;
}

/// Constants that specialize [`TaskJob`] to a job type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProfile {
    pub job_type: JobType,
    pub cluster: String,
    /// Full task family name, environment suffix included.
    pub family: String,
    pub container: String,
    pub network_config_param: String,
    /// How long a launched task has to report that it is running.
    pub startup_timeout: Duration,
    /// How long a running task has to stop.
    pub completion_timeout: Duration,
    pub overrides: Option<TaskOverrides>,
}

impl TaskProfile {
    /// Profile of the smoke-test job.
    pub fn smoke_test(env: EnvType) -> Self {
        Self {
            job_type: JobType::TestSmoke,
            cluster: QA_TESTS_CLUSTER.into(),
            family: format!("ceramic-qa-tests-smoke--{env}"),
            container: "ceramic-qa-tests-smoke".into(),
            network_config_param: "/ceramic-qa-tests-smoke/network_configuration".into(),
            startup_timeout: DEFAULT_WAIT_TIME,
            completion_timeout: SMOKE_TEST_FAILURE_TIME,
            overrides: None,
        }
    }

    /// Profile of the end-to-end test job.
    pub fn e2e_test(env: EnvType) -> Self {
        Self {
            job_type: JobType::TestE2E,
            cluster: QA_TESTS_CLUSTER.into(),
            family: format!("ceramic-qa-tests-e2e--{env}"),
            container: "ceramic-qa-tests-e2e".into(),
            network_config_param: "/ceramic-qa-tests-e2e/network_configuration".into(),
            startup_timeout: DEFAULT_WAIT_TIME,
            completion_timeout: E2E_TEST_FAILURE_TIME,
            overrides: None,
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_overrides(mut self, overrides: TaskOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// A job that launches one backend task and waits for it to stop.
pub struct TaskJob {
    profile: TaskProfile,
    deployment: Arc<dyn Deployment>,
}

impl TaskJob {
    pub fn new(profile: TaskProfile, deployment: Arc<dyn Deployment>) -> Self {
        Self {
            profile,
            deployment,
        }
    }

    pub fn smoke_test(env: EnvType, deployment: Arc<dyn Deployment>) -> Self {
        Self::new(TaskProfile::smoke_test(env), deployment)
    }

    pub fn e2e_test(env: EnvType, deployment: Arc<dyn Deployment>) -> Self {
        Self::new(TaskProfile::e2e_test(env), deployment)
    }

    pub fn profile(&self) -> &TaskProfile {
        &self.profile
    }

    async fn launch(
        &self,
        ctx: &JobContext,
        state: &JobState,
        now: DateTime<Utc>,
    ) -> JobResult<JobState> {
        // Refuse before spawning anything the job could not track.
        let mut next = state.clone();
        let Some(params) = next.params.task_mut() else {
            return self.unexpected(ctx, state, now).await;
        };
        let launched = self
            .deployment
            .launch_task(
                &self.profile.cluster,
                &self.profile.family,
                &self.profile.container,
                &self.profile.network_config_param,
                self.profile.overrides.as_ref(),
            )
            .await;
        match launched {
            Ok(task_id) => {
                params.task_id = Some(task_id);
                params.started_at = Some(now);
                transition(ctx, &next, JobStage::Started, now, None).await
            }
            Err(e) => transition(ctx, state, JobStage::Failed, now, Some(e)).await,
        }
    }

    /// Poll the task until its running state matches `expect_running`.
    ///
    /// Returns `Ok(true)` once it matches, `Ok(false)` while still pending,
    /// and the timeout error once the current stage has lasted too long.
    async fn check_task(
        &self,
        state: &JobState,
        expect_running: bool,
        now: DateTime<Utc>,
    ) -> JobResult<bool> {
        let task_id = state
            .params
            .task()
            .and_then(|p| p.task_id.as_deref())
            .ok_or(JobError::MissingParam {
                param: "task_id",
                stage: state.stage,
            })?;

        if self
            .deployment
            .check_task(&self.profile.cluster, task_id, expect_running)
            .await?
        {
            Ok(true)
        } else if expect_running && is_timed_out(state, self.profile.startup_timeout, now) {
            Err(JobError::StartupTimeout)
        } else if !expect_running && is_timed_out(state, self.profile.completion_timeout, now) {
            Err(JobError::CompletionTimeout)
        } else {
            debug!(
                job_id = %state.id,
                task_id,
                stage = %state.stage,
                "task not ready, polling again later"
            );
            Ok(false)
        }
    }

    async fn await_task(
        &self,
        ctx: &JobContext,
        state: &JobState,
        expect_running: bool,
        ready: JobStage,
        now: DateTime<Utc>,
    ) -> JobResult<JobState> {
        match self.check_task(state, expect_running, now).await {
            Ok(true) => transition(ctx, state, ready, now, None).await,
            Ok(false) => Ok(state.clone()),
            Err(e) => transition(ctx, state, JobStage::Failed, now, Some(e)).await,
        }
    }

    async fn unexpected(
        &self,
        ctx: &JobContext,
        state: &JobState,
        now: DateTime<Utc>,
    ) -> JobResult<JobState> {
        let err = JobError::UnexpectedState {
            job_type: state.job_type(),
            stage: state.stage,
        };
        transition(ctx, state, JobStage::Failed, now, Some(err)).await
    }
}

#[async_trait]
impl JobVariant for TaskJob {
    fn job_type(&self) -> JobType {
        self.profile.job_type
    }

    async fn advance(
        &self,
        ctx: &JobContext,
        state: &JobState,
        now: DateTime<Utc>,
    ) -> JobResult<JobState> {
        match state.stage {
            // Nothing to prepare. Keep the queued timestamp so both events
            // sit at the same point on the timeline.
            JobStage::Queued => transition(ctx, state, JobStage::Dequeued, state.ts, None).await,
            JobStage::Dequeued => self.launch(ctx, state, now).await,
            JobStage::Started => {
                self.await_task(ctx, state, true, JobStage::Waiting, now)
                    .await
            }
            JobStage::Waiting => {
                self.await_task(ctx, state, false, JobStage::Completed, now)
                    .await
            }
            stage if stage.is_terminal() => Ok(state.clone()),
            _ => self.unexpected(ctx, state, now).await,
        }
    }
}
