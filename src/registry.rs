//! In-memory index of known job states.
//!
//! Every transition records the new state here before the notification for
//! it is produced, so a job querying the registry always sees its own latest
//! write. Writes from other jobs are last-writer-wins per id.

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::job::{JobId, JobState, JobType};

/// Concurrent, predicate-queryable snapshot of job states keyed by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobState, FxBuildHasher>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest state of a job, replacing any previous one.
    pub fn write_job(&self, state: &JobState) {
        self.jobs.insert(state.id.clone(), state.clone());
    }

    /// Latest recorded state of a job.
    pub fn job(&self, id: &JobId) -> Option<JobState> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Forget a job, e.g. once it has been archived.
    pub fn remove(&self, id: &JobId) -> Option<JobState> {
        self.jobs.remove(id).map(|(_, state)| state)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// All recorded jobs matching `matcher`, in no particular order.
    pub fn jobs_by_matcher<F>(&self, matcher: F) -> Vec<JobState>
    where
        F: Fn(&JobState) -> bool,
    {
        self.jobs
            .iter()
            .filter(|entry| matcher(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Active jobs of `job_type`, leaving out `exclude`.
    pub fn active_jobs_of_type(&self, job_type: JobType, exclude: Option<&JobId>) -> Vec<JobState> {
        self.jobs_by_matcher(|js| {
            js.is_active() && js.job_type() == job_type && Some(&js.id) != exclude
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::job::JobStage;
    use crate::params::{DeployComponent, DeployParams, JobParams, TaskParams};

    fn job(id: &str, params: JobParams, stage: JobStage) -> JobState {
        let mut state = JobState::new(id, params, Utc::now());
        state.stage = stage;
        state
    }

    fn smoke(id: &str, stage: JobStage) -> JobState {
        job(id, JobParams::TestSmoke(TaskParams::default()), stage)
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = JobRegistry::new();
        registry.write_job(&smoke("a", JobStage::Started));
        registry.write_job(&smoke("a", JobStage::Waiting));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.job(&"a".into()).unwrap().stage, JobStage::Waiting);
    }

    #[test]
    fn test_jobs_by_matcher_exact_set() {
        let registry = JobRegistry::new();
        registry.write_job(&smoke("a", JobStage::Started));
        registry.write_job(&smoke("b", JobStage::Completed));
        registry.write_job(&smoke("c", JobStage::Waiting));
        registry.write_job(&job(
            "d",
            JobParams::Deploy(DeployParams::new(DeployComponent::Ceramic, "x")),
            JobStage::Waiting,
        ));

        let ids: HashSet<String> = registry
            .jobs_by_matcher(|js| js.job_type() == JobType::TestSmoke && !js.is_terminal())
            .into_iter()
            .map(|js| js.id.0)
            .collect();
        assert_eq!(ids, HashSet::from(["a".to_string(), "c".to_string()]));

        let others = registry.active_jobs_of_type(JobType::TestSmoke, Some(&"a".into()));
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].id.as_str(), "c");

        assert!(registry.jobs_by_matcher(|_| false).is_empty());
        assert_eq!(registry.jobs_by_matcher(|_| true).len(), 4);
    }

    #[test]
    fn test_remove() {
        let registry = JobRegistry::new();
        registry.write_job(&smoke("a", JobStage::Completed));
        assert!(registry.remove(&"a".into()).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(&"a".into()).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_and_readers() {
        let registry = Arc::new(JobRegistry::new());
        let mut handles = Vec::new();

        for n in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("job-{n}");
                for stage in [JobStage::Dequeued, JobStage::Started, JobStage::Waiting] {
                    registry.write_job(&smoke(&id, stage));
                    let own = registry.job(&id.as_str().into()).unwrap();
                    assert_eq!(own.stage, stage);
                    let _ = registry.active_jobs_of_type(JobType::TestSmoke, None);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len(), 16);
        assert_eq!(
            registry
                .jobs_by_matcher(|js| js.stage == JobStage::Waiting)
                .len(),
            16
        );
    }
}
