//! Smoke-test job lifecycle through the public engine API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cd_manager::{
    Deployment, EngineConfig, EnvType, JobEngine, JobError, JobParams, JobRegistry, JobResult,
    JobStage, JobState, JobType, MemoryDatabase, Notifier, PersistPolicy, TaskOverrides,
    TaskParams,
};
use chrono::{DateTime, TimeDelta, Utc};

/// Backend answering launches and checks from queues.
#[derive(Default)]
struct QueuedDeployment {
    launches: Mutex<VecDeque<JobResult<String>>>,
    checks: Mutex<VecDeque<JobResult<bool>>>,
    launched: AtomicUsize,
}

impl QueuedDeployment {
    fn launch(self, result: JobResult<String>) -> Self {
        self.launches.lock().unwrap().push_back(result);
        self
    }

    fn checks(self, results: impl IntoIterator<Item = JobResult<bool>>) -> Self {
        self.checks.lock().unwrap().extend(results);
        self
    }
}

#[async_trait]
impl Deployment for QueuedDeployment {
    async fn launch_task(
        &self,
        _cluster: &str,
        _family: &str,
        _container: &str,
        _network_config_param: &str,
        _overrides: Option<&TaskOverrides>,
    ) -> JobResult<String> {
        self.launched.fetch_add(1, Ordering::SeqCst);
        self.launches.lock().unwrap().pop_front().expect("unexpected launch")
    }

    async fn check_task(&self, _cluster: &str, _task_id: &str, _expect_running: bool) -> JobResult<bool> {
        self.checks.lock().unwrap().pop_front().expect("unexpected check")
    }
}

/// Records, for each notified state, the other active smoke tests the
/// registry reports at that moment and whether the job's own entry matched.
struct ActiveJobsRecorder {
    registry: Arc<JobRegistry>,
    seen: Mutex<Vec<(JobStage, bool, usize)>>,
}

impl Notifier for ActiveJobsRecorder {
    fn notify_job(&self, state: &JobState) {
        let own_is_current = self.registry.job(&state.id).as_ref() == Some(state);
        let others = self
            .registry
            .active_jobs_of_type(JobType::TestSmoke, Some(&state.id))
            .len();
        self.seen
            .lock()
            .unwrap()
            .push((state.stage, own_is_current, others));
    }
}

struct Harness {
    engine: JobEngine,
    db: Arc<MemoryDatabase>,
    deployment: Arc<QueuedDeployment>,
    recorder: Arc<ActiveJobsRecorder>,
}

fn harness(deployment: QueuedDeployment, policy: PersistPolicy) -> Harness {
    let db = Arc::new(MemoryDatabase::new());
    let registry = Arc::new(JobRegistry::new());
    let recorder = Arc::new(ActiveJobsRecorder {
        registry: registry.clone(),
        seen: Mutex::new(Vec::new()),
    });
    let config = EngineConfig::default()
        .with_env(EnvType::Qa)
        .with_persist_policy(policy);
    let deployment = Arc::new(deployment);
    let engine = JobEngine::builder(db.clone(), registry, recorder.clone())
        .with_default_variants(&config, deployment.clone())
        .build();
    Harness {
        engine,
        db,
        deployment,
        recorder,
    }
}

fn smoke_job(id: &str, stage: JobStage, ts: DateTime<Utc>, task_id: Option<&str>) -> JobState {
    let mut state = JobState::new(
        id,
        JobParams::TestSmoke(TaskParams {
            task_id: task_id.map(str::to_string),
            ..TaskParams::default()
        }),
        ts,
    );
    state.stage = stage;
    state
}

#[tokio::test]
async fn scenario_a_queued_to_dequeued_keeps_ts() {
    let h = harness(QueuedDeployment::default(), PersistPolicy::FailOpen);
    let t0 = Utc::now() - TimeDelta::minutes(10);
    let state = smoke_job("a", JobStage::Queued, t0, None);

    let next = h.engine.advance(&state, Utc::now()).await.unwrap();

    assert_eq!(next.stage, JobStage::Dequeued);
    assert_eq!(next.ts, t0);
}

#[tokio::test]
async fn scenario_b_launch_records_task_id_and_start() {
    let h = harness(
        QueuedDeployment::default().launch(Ok("task-123".into())),
        PersistPolicy::FailOpen,
    );
    let state = smoke_job("b", JobStage::Dequeued, Utc::now() - TimeDelta::minutes(1), None);
    let now = Utc::now();

    let next = h.engine.advance(&state, now).await.unwrap();

    assert_eq!(next.stage, JobStage::Started);
    assert_eq!(next.ts, now);
    let params = next.params.task().unwrap();
    assert_eq!(params.task_id.as_deref(), Some("task-123"));
    assert_eq!(params.started_at, Some(now));
}

#[tokio::test]
async fn scenario_c_and_d_startup_timeout() {
    let h = harness(
        QueuedDeployment::default().checks([Ok(false), Ok(false)]),
        PersistPolicy::FailOpen,
    );
    let t0 = Utc::now();
    let state = smoke_job("c", JobStage::Started, t0, Some("task-123"));

    let unchanged = h
        .engine
        .advance(&state, t0 + TimeDelta::minutes(4))
        .await
        .unwrap();
    assert_eq!(unchanged, state);

    let failed = h
        .engine
        .advance(&state, t0 + TimeDelta::minutes(6))
        .await
        .unwrap();
    assert_eq!(failed.stage, JobStage::Failed);
    assert_eq!(failed.error, Some(JobError::StartupTimeout.to_string()));
}

#[tokio::test]
async fn scenario_e_waiting_task_stopped_completes() {
    let h = harness(
        QueuedDeployment::default().checks([Ok(true)]),
        PersistPolicy::FailOpen,
    );
    let state = smoke_job("e", JobStage::Waiting, Utc::now(), Some("task-123"));

    let next = h.engine.advance_now(&state).await.unwrap();

    assert_eq!(next.stage, JobStage::Completed);
    assert!(next.error.is_none());
}

#[tokio::test]
async fn scenario_f_completion_timeout() {
    let h = harness(
        QueuedDeployment::default().checks([Ok(false)]),
        PersistPolicy::FailOpen,
    );
    let t0 = Utc::now();
    let state = smoke_job("f", JobStage::Waiting, t0, Some("task-123"));

    let next = h
        .engine
        .advance(&state, t0 + TimeDelta::minutes(15) + TimeDelta::seconds(1))
        .await
        .unwrap();

    assert_eq!(next.stage, JobStage::Failed);
    assert_eq!(next.error, Some(JobError::CompletionTimeout.to_string()));
}

#[tokio::test]
async fn full_run_persists_every_transition_and_stays_terminal() {
    let h = harness(
        QueuedDeployment::default()
            .launch(Ok("task-9".into()))
            .checks([Ok(false), Ok(true), Ok(false), Ok(true)]),
        PersistPolicy::FailOpen,
    );
    let t0 = Utc::now();
    let mut state = smoke_job("run", JobStage::Queued, t0, None);
    let mut stages = vec![state.stage];

    for minute in 1..=10 {
        if state.is_terminal() {
            break;
        }
        let now = t0 + TimeDelta::minutes(minute);
        let next = h.engine.advance(&state, now).await.unwrap();
        if next.stage != state.stage {
            assert_eq!(next.ts, if state.stage == JobStage::Queued { t0 } else { now });
            stages.push(next.stage);
        }
        state = next;
    }

    assert_eq!(
        stages,
        vec![
            JobStage::Queued,
            JobStage::Dequeued,
            JobStage::Started,
            JobStage::Waiting,
            JobStage::Completed
        ]
    );
    let writes: Vec<JobStage> = h.db.history().iter().map(|s| s.stage).collect();
    assert_eq!(writes, stages[1..].to_vec());

    for _ in 0..3 {
        assert_eq!(h.engine.advance_now(&state).await.unwrap(), state);
    }
    assert_eq!(h.db.history().len(), 4);
}

#[tokio::test]
async fn notifier_sees_own_transition_and_other_active_jobs() {
    let h = harness(
        QueuedDeployment::default().launch(Ok("task-1".into())),
        PersistPolicy::FailOpen,
    );
    let now = Utc::now();
    let other = smoke_job("other", JobStage::Queued, now, None);
    let other = h.engine.advance(&other, now).await.unwrap();
    assert_eq!(other.stage, JobStage::Dequeued);

    let me = smoke_job("me", JobStage::Dequeued, now, None);
    let me = h.engine.advance(&me, now).await.unwrap();
    assert_eq!(me.stage, JobStage::Started);

    let seen = h.recorder.seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![(JobStage::Dequeued, true, 0), (JobStage::Started, true, 1)]
    );
}

#[tokio::test]
async fn fail_closed_stalls_until_write_succeeds() {
    let h = harness(
        QueuedDeployment::default().launch(Ok("task-1".into())),
        PersistPolicy::FailClosed,
    );
    let state = smoke_job("closed", JobStage::Queued, Utc::now(), None);

    h.db.set_fail_writes(true);
    let err = h.engine.advance_now(&state).await.unwrap_err();
    assert!(err.is_external());
    assert!(h.engine.registry().job(&state.id).is_none());
    assert!(h.recorder.seen.lock().unwrap().is_empty());

    h.db.set_fail_writes(false);
    let next = h.engine.advance_now(&state).await.unwrap();
    assert_eq!(next.stage, JobStage::Dequeued);
    assert_eq!(h.db.latest(&state.id), Some(next));
}

#[tokio::test]
async fn fail_closed_launch_is_written_later_without_relaunching() {
    let h = harness(
        QueuedDeployment::default()
            .launch(Ok("task-1".into()))
            .launch(Ok("task-2".into())),
        PersistPolicy::FailClosed,
    );
    let state = smoke_job("relaunch", JobStage::Dequeued, Utc::now(), None);

    h.db.set_fail_writes(true);
    let err = h.engine.advance_now(&state).await.unwrap_err();
    assert!(matches!(err, JobError::Database(_)));
    assert!(h.engine.advance_now(&state).await.is_err());

    h.db.set_fail_writes(false);
    let next = h.engine.advance_now(&state).await.unwrap();

    assert_eq!(next.stage, JobStage::Started);
    assert_eq!(next.params.task().unwrap().task_id.as_deref(), Some("task-1"));
    assert_eq!(h.deployment.launched.load(Ordering::SeqCst), 1);
    assert_eq!(h.db.history(), vec![next.clone()]);
    assert_eq!(h.engine.registry().job(&state.id), Some(next.clone()));
    assert_eq!(*h.recorder.seen.lock().unwrap(), vec![(JobStage::Started, true, 0)]);
}

#[tokio::test]
async fn fail_open_progresses_without_persistence() {
    let h = harness(QueuedDeployment::default(), PersistPolicy::FailOpen);
    let state = smoke_job("open", JobStage::Queued, Utc::now(), None);

    h.db.set_fail_writes(true);
    let next = h.engine.advance_now(&state).await.unwrap();

    assert_eq!(next.stage, JobStage::Dequeued);
    assert!(h.db.history().is_empty());
    assert_eq!(h.engine.registry().job(&state.id), Some(next));
    assert_eq!(h.recorder.seen.lock().unwrap().len(), 1);
}
