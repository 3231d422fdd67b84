//! Job notifications.
//!
//! A [`JobNotification`] is the transport-independent message announcing one
//! job state: a title, a stage color and a list of named fields, including
//! the other jobs currently active per type.
//!
//! [`ChannelNotifier`] is the fire-and-forget [`Notifier`] handed to the
//! engine. It queues states on an unbounded channel drained by a
//! [`NotificationPump`], which looks up deploy hashes, builds the message and
//! passes it to a [`NotificationSink`] once per [`NotifChannel`] the job is
//! routed to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::backend::{Database, Notifier};
use crate::config::EnvType;
use crate::job::{JobStage, JobState, JobType};
use crate::params::{DeployComponent, DeployHashes};
use crate::registry::JobRegistry;

/// Organization hosting the component repositories.
pub const GITHUB_ORG: &str = "ceramicnetwork";

/// Name the notifications are sent under.
pub const SERVICE_NAME: &str = "cd-manager";

pub const FIELD_JOB_ID: &str = "Job ID";
pub const FIELD_COMMIT_HASHES: &str = "Commit Hashes";
pub const FIELD_TIME: &str = "Time";
pub const FIELD_ERROR: &str = "Error";

/// Audience a notification is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifChannel {
    Deployments,
    Community,
    Test,
}

impl NotifChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifChannel::Deployments => "deployments",
            NotifChannel::Community => "community",
            NotifChannel::Test => "test",
        }
    }

    /// Channels announcing `state` in `env`.
    ///
    /// Deploys go to the deployments channel, and to the community channel
    /// for public networks. Every job goes to the test channel.
    pub fn for_job(state: &JobState, env: EnvType) -> Vec<NotifChannel> {
        let mut channels = Vec::with_capacity(3);
        if state.job_type() == JobType::Deploy {
            channels.push(NotifChannel::Deployments);
            if env.is_public() {
                channels.push(NotifChannel::Community);
            }
        }
        channels.push(NotifChannel::Test);
        channels
    }
}

impl std::fmt::Display for NotifChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embed color of a notification, as an RGB integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifColor {
    None,
    Info,
    Ok,
    Warning,
    Alert,
}

impl NotifColor {
    pub fn rgb(&self) -> u32 {
        match self {
            NotifColor::None => 0,
            NotifColor::Info => 3_447_003,
            NotifColor::Ok => 3_581_519,
            NotifColor::Warning => 16_776_960,
            NotifColor::Alert => 16_711_712,
        }
    }

    pub fn for_stage(stage: JobStage) -> Self {
        match stage {
            JobStage::Queued | JobStage::Waiting => NotifColor::Info,
            JobStage::Dequeued | JobStage::Started => NotifColor::None,
            JobStage::Skipped | JobStage::Delayed | JobStage::Canceled => NotifColor::Warning,
            JobStage::Failed => NotifColor::Alert,
            JobStage::Completed => NotifColor::Ok,
        }
    }
}

/// One named field of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifField {
    pub name: String,
    pub value: String,
}

impl NotifField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Message announcing one job state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNotification {
    pub title: String,
    pub color: NotifColor,
    pub fields: Vec<NotifField>,
}

impl JobNotification {
    /// Build the notification for `state`.
    ///
    /// `hashes` are the stored deploy hashes, if they could be fetched.
    /// Active jobs are read from `registry`, leaving out `state` itself.
    pub fn build(
        state: &JobState,
        env: EnvType,
        registry: &JobRegistry,
        hashes: Option<DeployHashes>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut fields = vec![NotifField::new(FIELD_JOB_ID, state.id.as_str())];
        if let Some(hashes) = hashes.map(|h| merge_deploy_hash(state, h)) {
            let value = commit_hashes_message(&hashes);
            if !value.is_empty() {
                fields.push(NotifField::new(FIELD_COMMIT_HASHES, value));
            }
        }
        fields.push(NotifField::new(FIELD_TIME, now.to_rfc2822()));
        if let Some(error) = &state.error {
            fields.push(NotifField::new(FIELD_ERROR, error.as_str()));
        }
        fields.extend(
            JobType::ALL
                .into_iter()
                .filter_map(|job_type| active_jobs_field(state, job_type, registry)),
        );

        Self {
            title: title(state, env),
            color: NotifColor::for_stage(state.stage),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

fn title(state: &JobState, env: EnvType) -> String {
    let prefix = match state.params.deploy() {
        Some(deploy) => format!(
            "3Box Labs `{}` {} ",
            env.display_name(),
            deploy.component.as_str().to_uppercase()
        ),
        None => String::new(),
    };
    let name = state.job_type().display_name();
    let name = if state.params.is_manual() {
        format!("manual {name}")
    } else {
        name.to_string()
    };
    format!("{prefix}{name} {}", state.stage.as_str().to_uppercase())
}

/// A deploy job's own valid sha replaces the stored hash for its component.
fn merge_deploy_hash(state: &JobState, mut hashes: DeployHashes) -> DeployHashes {
    if let Some(deploy) = state.params.deploy().filter(|d| d.has_valid_sha()) {
        hashes.insert(deploy.component, deploy.sha.clone());
    }
    hashes
}

fn commit_hashes_message(hashes: &DeployHashes) -> String {
    DeployComponent::ALL
        .into_iter()
        .filter_map(|component| {
            let sha = hashes.get(&component)?;
            let short = sha.get(..12).unwrap_or(sha.as_str());
            let repo = component.repo();
            Some(format!(
                "[{repo} ({short})](https://github.com/{GITHUB_ORG}/{repo}/commit/{sha})"
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn active_jobs_field(
    state: &JobState,
    job_type: JobType,
    registry: &JobRegistry,
) -> Option<NotifField> {
    let mut active = registry.active_jobs_of_type(job_type, Some(&state.id));
    if active.is_empty() {
        return None;
    }
    active.sort_by(|a, b| a.id.cmp(&b.id));
    let value: String = active
        .iter()
        .map(|js| format!("{} ({})\n", js.id, js.stage))
        .collect();
    Some(NotifField::new(
        format!("Active {}:", job_type.display_name()),
        value,
    ))
}

/// Destination of built notifications.
pub trait NotificationSink: Send + Sync {
    fn send(&self, channel: NotifChannel, state: &JobState, notification: &JobNotification);
}

/// Sink that logs every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send(&self, channel: NotifChannel, state: &JobState, notification: &JobNotification) {
        match serde_json::to_string(&notification.fields) {
            Ok(fields) => info!(
                job_id = %state.id,
                %channel,
                service = SERVICE_NAME,
                color = notification.color.rgb(),
                fields = %fields,
                "{}",
                notification.title
            ),
            Err(e) => warn!(job_id = %state.id, error = %e, "failed to encode notification fields"),
        }
    }
}

/// [`Notifier`] that queues states for a [`NotificationPump`].
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<JobState>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end its pump drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<JobState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify_job(&self, state: &JobState) {
        if self.tx.send(state.clone()).is_err() {
            warn!(job_id = %state.id, stage = %state.stage, "notification pump is gone, dropping notification");
        }
    }
}

/// Drains queued states and delivers their notifications.
pub struct NotificationPump {
    rx: mpsc::UnboundedReceiver<JobState>,
    db: Arc<dyn Database>,
    registry: Arc<JobRegistry>,
    sink: Arc<dyn NotificationSink>,
    env: EnvType,
}

impl NotificationPump {
    pub fn new(
        rx: mpsc::UnboundedReceiver<JobState>,
        db: Arc<dyn Database>,
        registry: Arc<JobRegistry>,
        sink: Arc<dyn NotificationSink>,
        env: EnvType,
    ) -> Self {
        Self {
            rx,
            db,
            registry,
            sink,
            env,
        }
    }

    /// Deliver one queued notification. Returns `false` once every
    /// [`ChannelNotifier`] has been dropped and the queue is empty.
    pub async fn deliver_next(&mut self) -> bool {
        let Some(state) = self.rx.recv().await else {
            return false;
        };
        let hashes = match self.db.deploy_hashes().await {
            Ok(hashes) => Some(hashes),
            Err(e) => {
                warn!(job_id = %state.id, error = %e, "failed to fetch deploy hashes");
                None
            }
        };
        let notification =
            JobNotification::build(&state, self.env, &self.registry, hashes, Utc::now());
        for channel in NotifChannel::for_job(&state, self.env) {
            self.sink.send(channel, &state, &notification);
        }
        true
    }

    /// Deliver notifications until every sender is dropped.
    pub async fn run(mut self) {
        while self.deliver_next().await {}
    }
}
