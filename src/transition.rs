//! Shared stage-transition primitive.
//!
//! Every stage change a job variant decides goes through [`transition`]:
//!
//! ```text
//!   copy state ──→ Database::save_job() ──→ JobRegistry::write_job() ──→ Notifier::notify_job()
//! ```
//!
//! The registry is written before the notifier runs, so notification code
//! querying the registry already sees the new state.
//!
//! With [`PersistPolicy::FailClosed`] a state whose write failed is parked in
//! the context. [`retry_unsaved`] writes it on the next step instead of
//! running the stage handler again, so a launched task is never launched
//! twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tracing::{error, info, warn};

use crate::backend::{Database, Notifier};
use crate::config::PersistPolicy;
use crate::error::{JobError, JobResult};
use crate::job::{JobId, JobStage, JobState};
use crate::registry::JobRegistry;

/// Handles shared by every job: store, registry and notifier.
#[derive(Clone)]
pub struct JobContext {
    pub db: Arc<dyn Database>,
    pub registry: Arc<JobRegistry>,
    pub notifier: Arc<dyn Notifier>,
    pub persist_policy: PersistPolicy,
    /// Decided states still waiting for a successful write.
    unsaved: Arc<DashMap<JobId, JobState, FxBuildHasher>>,
}

impl JobContext {
    pub fn new(
        db: Arc<dyn Database>,
        registry: Arc<JobRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            registry,
            notifier,
            persist_policy: PersistPolicy::default(),
            unsaved: Arc::new(DashMap::with_hasher(FxBuildHasher)),
        }
    }

    /// The decided but unwritten state for `id`, if any.
    pub fn unsaved(&self, id: &JobId) -> Option<JobState> {
        self.unsaved.get(id).map(|entry| entry.value().clone())
    }

    pub fn with_persist_policy(mut self, policy: PersistPolicy) -> Self {
        self.persist_policy = policy;
        self
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("jobs", &self.registry.len())
            .field("persist_policy", &self.persist_policy)
            .field("unsaved", &self.unsaved.len())
            .finish_non_exhaustive()
    }
}

/// Move `state` to `stage` at `ts`, recording `err` when present.
///
/// The input is left untouched. With [`PersistPolicy::FailClosed`] a failed
/// write returns the database error and nothing is recorded or announced;
/// the new state is kept for [`retry_unsaved`].
pub async fn transition(
    ctx: &JobContext,
    state: &JobState,
    stage: JobStage,
    ts: DateTime<Utc>,
    err: Option<JobError>,
) -> JobResult<JobState> {
    let mut next = state.clone();
    next.stage = stage;
    next.ts = ts;
    if let Some(err) = err {
        next.error = Some(err.to_string());
    }

    if let Err(e) = ctx.db.save_job(&next).await {
        match ctx.persist_policy {
            PersistPolicy::FailOpen => {
                error!(
                    job_id = %next.id,
                    job_type = %next.job_type(),
                    stage = %next.stage,
                    error = %e,
                    "failed to persist job state, continuing"
                );
            }
            PersistPolicy::FailClosed => {
                error!(
                    job_id = %next.id,
                    job_type = %next.job_type(),
                    stage = %next.stage,
                    error = %e,
                    "failed to persist job state, keeping previous stage"
                );
                ctx.unsaved.insert(next.id.clone(), next);
                return Err(e);
            }
        }
    }

    publish(ctx, state.stage, &next);
    Ok(next)
}

/// Write the parked state for `id` left by a failed fail-closed transition.
///
/// Returns `None` when nothing is parked. On success the state is recorded
/// and announced like any other transition; on failure it stays parked.
pub async fn retry_unsaved(ctx: &JobContext, id: &JobId) -> Option<JobResult<JobState>> {
    let next = ctx.unsaved(id)?;
    if let Err(e) = ctx.db.save_job(&next).await {
        warn!(
            job_id = %next.id,
            stage = %next.stage,
            error = %e,
            "still unable to persist job state"
        );
        return Some(Err(e));
    }
    ctx.unsaved.remove(id);
    // The caller's snapshot still holds the stage before the failed write.
    let from = ctx.registry.job(id).map(|s| s.stage);
    publish(ctx, from.unwrap_or(next.stage), &next);
    Some(Ok(next))
}

fn publish(ctx: &JobContext, from: JobStage, next: &JobState) {
    ctx.registry.write_job(next);
    ctx.notifier.notify_job(next);

    info!(
        job_id = %next.id,
        job_type = %next.job_type(),
        from = %from,
        to = %next.stage,
        error = next.error.as_deref().unwrap_or(""),
        "job transition"
    );
}
