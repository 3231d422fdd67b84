//! Minimal driver advancing jobs against an in-memory task backend.
//!
//! Launches one smoke-test job and one e2e job, polls them until both are
//! terminal and prints every stage. Set `RUST_LOG=cd_manager=debug` to see
//! the engine's own logging.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cd_manager::{
    ChannelNotifier, Deployment, EngineConfig, EnvType, JobEngine, JobError, JobId, JobParams,
    JobRegistry, JobResult, JobState, MemoryDatabase, NotificationPump, TaskJob, TaskOverrides,
    TaskParams, TaskProfile, TracingSink,
};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Number of status checks a mock task spends in each phase.
const CHECKS_UNTIL_RUNNING: u32 = 2;
const CHECKS_UNTIL_STOPPED: u32 = 4;

/// In-memory task backend: tasks start after a few checks and stop a few
/// checks later.
#[derive(Default)]
struct MockDeployment {
    tasks: Mutex<HashMap<String, u32>>,
    next_id: Mutex<u64>,
}

#[async_trait]
impl Deployment for MockDeployment {
    async fn launch_task(
        &self,
        cluster: &str,
        family: &str,
        _container: &str,
        _network_config_param: &str,
        _overrides: Option<&TaskOverrides>,
    ) -> JobResult<String> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("arn:{cluster}:{family}/task-{}", *next)
        };
        self.tasks.lock().unwrap().insert(id.clone(), 0);
        Ok(id)
    }

    async fn check_task(&self, _cluster: &str, task_id: &str, expect_running: bool) -> JobResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let checks = tasks
            .get_mut(task_id)
            .ok_or_else(|| JobError::Deployment(format!("unknown task {task_id}")))?;
        *checks += 1;
        let running = *checks >= CHECKS_UNTIL_RUNNING && *checks < CHECKS_UNTIL_RUNNING + CHECKS_UNTIL_STOPPED;
        Ok(running == expect_running)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env()?.with_env(EnvType::Qa);
    let db = Arc::new(MemoryDatabase::new());
    let registry = Arc::new(JobRegistry::new());
    let deployment = Arc::new(MockDeployment::default());

    let (notifier, rx) = ChannelNotifier::channel();
    let pump = NotificationPump::new(rx, db.clone(), registry.clone(), Arc::new(TracingSink), config.env);
    let pump = tokio::spawn(pump.run());

    let smoke = TaskProfile::smoke_test(config.env).with_completion_timeout(Duration::from_secs(30));
    let engine = JobEngine::builder(db.clone(), registry.clone(), Arc::new(notifier))
        .with_default_variants(&config, deployment.clone())
        .with_variant(Arc::new(TaskJob::new(smoke, deployment)))
        .build();

    println!("Engine: {engine:?}");
    println!();

    let now = Utc::now();
    let mut jobs = vec![
        JobState::new(JobId::generate(), JobParams::TestSmoke(TaskParams::manual()), now),
        JobState::new(JobId::generate(), JobParams::TestE2E(TaskParams::default()), now),
    ];

    while jobs.iter().any(|j| !j.is_terminal()) {
        for job in jobs.iter_mut().filter(|j| !j.is_terminal()) {
            let next = engine.advance_now(job).await?;
            if next.stage != job.stage {
                println!("{next}");
            }
            *job = next;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    println!();
    for job in &jobs {
        println!(
            "{} {} finished {} ({} writes)",
            job.job_type(),
            job.id,
            job.stage,
            db.history().iter().filter(|s| s.id == job.id).count()
        );
    }

    drop(engine);
    pump.await?;
    Ok(())
}
