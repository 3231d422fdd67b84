//! In-memory [`Database`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::backend::Database;
use crate::error::{JobError, JobResult};
use crate::job::{JobId, JobState};
use crate::params::{DeployComponent, DeployHashes};

/// Process-local job store.
///
/// Keeps every saved state in write order. Writes can be made to fail to
/// exercise persistence error handling.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    history: Mutex<Vec<JobState>>,
    hashes: Mutex<DeployHashes>,
    fail_writes: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the commit hash reported for a component.
    pub fn set_deploy_hash(&self, component: DeployComponent, sha: impl Into<String>) {
        self.hashes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(component, sha.into());
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// All saved states, oldest first.
    pub fn history(&self) -> Vec<JobState> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Latest saved state of a job.
    pub fn latest(&self, id: &JobId) -> Option<JobState> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|s| &s.id == id)
            .cloned()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn save_job(&self, state: &JobState) -> JobResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(JobError::Database(format!("write rejected for job {}", state.id)));
        }
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(state.clone());
        Ok(())
    }

    async fn deploy_hashes(&self) -> JobResult<DeployHashes> {
        Ok(self
            .hashes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}
