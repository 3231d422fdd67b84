//! Job engine: dispatches `advance` to the variant registered for a job's type.
//!
//! ```ignore
//! let engine = JobEngine::builder(db, registry, notifier)
//!     .with_default_variants(&config, deployment)
//!     .build();
//!
//! let mut state = JobState::new(JobId::generate(), params, Utc::now());
//! while !state.is_terminal() {
//!     state = engine.advance_now(&state).await?;
//!     tokio::time::sleep(poll_interval).await;
//! }
//! ```
//!
//! The engine does not serialize calls per job id; callers keep at most one
//! `advance` in flight per job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::{Database, Deployment, Notifier};
use crate::config::{EngineConfig, PersistPolicy};
use crate::error::{JobError, JobResult};
use crate::job::{JobState, JobType};
use crate::registry::JobRegistry;
use crate::transition::{JobContext, retry_unsaved};
use crate::variant::{JobVariant, TaskJob, TaskProfile};

/// Advances jobs of every registered type.
pub struct JobEngine {
    ctx: JobContext,
    variants: FxHashMap<JobType, Arc<dyn JobVariant>>,
}

impl JobEngine {
    pub fn builder(
        db: Arc<dyn Database>,
        registry: Arc<JobRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> JobEngineBuilder {
        JobEngineBuilder {
            ctx: JobContext::new(db, registry, notifier),
            variants: FxHashMap::default(),
        }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.ctx.registry
    }

    /// Job types this engine can advance.
    pub fn job_types(&self) -> Vec<JobType> {
        JobType::ALL
            .into_iter()
            .filter(|t| self.variants.contains_key(t))
            .collect()
    }

    /// Take one step on `state` at time `now`.
    ///
    /// Terminal jobs are returned unchanged without touching the store or
    /// the notifier. A state left unwritten by an earlier fail-closed step is
    /// written and returned before the stage handler runs again.
    pub async fn advance(&self, state: &JobState, now: DateTime<Utc>) -> JobResult<JobState> {
        if state.is_terminal() {
            debug!(job_id = %state.id, stage = %state.stage, "job is terminal, nothing to do");
            return Ok(state.clone());
        }
        if let Some(result) = retry_unsaved(&self.ctx, &state.id).await {
            return result;
        }
        let job_type = state.job_type();
        let variant = self
            .variants
            .get(&job_type)
            .ok_or(JobError::Unsupported(job_type))?;
        variant.advance(&self.ctx, state, now).await
    }

    /// Take one step on `state` at the current time.
    pub async fn advance_now(&self, state: &JobState) -> JobResult<JobState> {
        self.advance(state, Utc::now()).await
    }
}

impl std::fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEngine")
            .field("ctx", &self.ctx)
            .field("job_types", &self.job_types())
            .finish()
    }
}

/// Builder for [`JobEngine`].
pub struct JobEngineBuilder {
    ctx: JobContext,
    variants: FxHashMap<JobType, Arc<dyn JobVariant>>,
}

impl JobEngineBuilder {
    /// Register `variant` for its job type, replacing any earlier one.
    pub fn with_variant(mut self, variant: Arc<dyn JobVariant>) -> Self {
        self.variants.insert(variant.job_type(), variant);
        self
    }

    /// Register the smoke-test and end-to-end test variants and apply the
    /// configured persistence policy.
    pub fn with_default_variants(
        self,
        config: &EngineConfig,
        deployment: Arc<dyn Deployment>,
    ) -> Self {
        let smoke = TaskProfile::smoke_test(config.env).with_startup_timeout(config.default_wait);
        let e2e = TaskProfile::e2e_test(config.env).with_startup_timeout(config.default_wait);
        self.with_persist_policy(config.persist_policy)
            .with_variant(Arc::new(TaskJob::new(smoke, deployment.clone())))
            .with_variant(Arc::new(TaskJob::new(e2e, deployment)))
    }

    pub fn with_persist_policy(mut self, policy: PersistPolicy) -> Self {
        self.ctx.persist_policy = policy;
        self
    }

    pub fn build(self) -> JobEngine {
        JobEngine {
            ctx: self.ctx,
            variants: self.variants,
        }
    }
}
