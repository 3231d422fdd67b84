//! cd-manager: job state-machine engine for deployment and test pipelines
//!
//! Long-running jobs (deploys, anchors, end-to-end and smoke tests) move
//! through a bounded sequence of stages while the engine polls an external
//! task backend. A driver calls [`JobEngine::advance`] on every non-terminal
//! job until it reaches `Failed`, `Canceled` or `Completed`.
//!
//! # Overview
//!
//! The crate defines:
//! - [`JobState`] / [`JobStage`] / [`JobType`] / [`JobParams`]: the job model
//! - [`JobVariant`]: the per-type `advance` step, with [`TaskJob`] as the
//!   generalized "launch a task and wait for it" variant
//! - [`transition`]: the shared primitive that persists, records and
//!   announces each stage change
//! - [`is_timed_out`]: the timeout policy for waiting stages
//! - [`JobRegistry`]: the concurrent, predicate-queryable index of jobs
//! - [`Database`], [`Deployment`], [`Notifier`]: external collaborators
//! - [`JobError`] with categorized error variants
//!
//! # Lifecycle
//!
//! ```text
//!   Queued ──→ Dequeued ──→ Started ──→ Waiting ──→ Completed
//!                 │            │           │
//!                 └────────────┴───────────┴──→ Failed
//! ```
//!
//! Waiting on a task that is not ready yet returns the job unchanged; the
//! driver decides when to poll again.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod memory;
pub mod notify;
pub mod params;
pub mod registry;
pub mod timeout;
pub mod transition;
pub mod variant;

pub use backend::{Database, Deployment, NoopNotifier, Notifier, TaskOverrides};
pub use config::{EngineConfig, EnvType, PersistPolicy};
pub use engine::{JobEngine, JobEngineBuilder};
pub use error::{JobError, JobResult};
pub use job::{JobId, JobStage, JobState, JobType};
pub use memory::MemoryDatabase;
pub use notify::{
    ChannelNotifier, JobNotification, NotifChannel, NotificationPump, NotificationSink, TracingSink,
};
pub use params::{DeployComponent, DeployHashes, DeployParams, JobParams, TaskParams};
pub use registry::JobRegistry;
pub use timeout::is_timed_out;
pub use transition::{JobContext, retry_unsaved, transition};
pub use variant::{JobVariant, TaskJob, TaskProfile};
