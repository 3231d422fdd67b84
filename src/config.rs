//! Engine configuration.
//!
//! Values come from [`EngineConfig::default`] or from the process
//! environment via [`EngineConfig::from_env`]:
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `ENV` | `dev`, `qa`, `tnet`, `prod` | `dev` |
//! | `CD_DEFAULT_WAIT_SECS` | seconds | `300` |
//! | `CD_PERSIST_POLICY` | `fail-open`, `fail-closed` | `fail-open` |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};

/// Default time a launched task has to report that it is running.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(5 * 60);

/// Deployment environment the engine runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvType {
    #[default]
    Dev,
    Qa,
    Tnet,
    Prod,
}

impl EnvType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvType::Dev => "dev",
            EnvType::Qa => "qa",
            EnvType::Tnet => "tnet",
            EnvType::Prod => "prod",
        }
    }

    /// Name of the network served by this environment.
    pub fn display_name(&self) -> &'static str {
        match self {
            EnvType::Dev => "dev-unstable",
            EnvType::Qa => "dev-qa",
            EnvType::Tnet => "testnet-clay",
            EnvType::Prod => "mainnet",
        }
    }

    /// Whether notifications for this environment may reach public channels.
    pub fn is_public(&self) -> bool {
        matches!(self, EnvType::Tnet | EnvType::Prod)
    }
}

impl std::fmt::Display for EnvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(EnvType::Dev),
            "qa" => Ok(EnvType::Qa),
            "tnet" => Ok(EnvType::Tnet),
            "prod" => Ok(EnvType::Prod),
            other => Err(JobError::Configuration(format!("unknown environment: {other}"))),
        }
    }
}

/// What a transition does when writing the new state to the database fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistPolicy {
    /// Log the failure and keep going with the new state.
    #[default]
    FailOpen,
    /// Return the error; the job keeps its previous state.
    FailClosed,
}

impl FromStr for PersistPolicy {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-open" => Ok(PersistPolicy::FailOpen),
            "fail-closed" => Ok(PersistPolicy::FailClosed),
            other => Err(JobError::Configuration(format!(
                "unknown persist policy: {other}"
            ))),
        }
    }
}

/// Configuration of the job engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub env: EnvType,
    /// Startup timeout for task-backed jobs.
    #[serde(default = "default_wait")]
    pub default_wait: Duration,
    #[serde(default)]
    pub persist_policy: PersistPolicy,
}

fn default_wait() -> Duration {
    DEFAULT_WAIT_TIME
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            env: EnvType::default(),
            default_wait: DEFAULT_WAIT_TIME,
            persist_policy: PersistPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> JobResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> JobResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(env) = lookup("ENV").filter(|v| !v.is_empty()) {
            config.env = env.parse()?;
        }
        if let Some(secs) = lookup("CD_DEFAULT_WAIT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                JobError::Configuration(format!("invalid CD_DEFAULT_WAIT_SECS: {secs}"))
            })?;
            config.default_wait = Duration::from_secs(secs);
        }
        if let Some(policy) = lookup("CD_PERSIST_POLICY") {
            config.persist_policy = policy.parse()?;
        }
        Ok(config)
    }

    pub fn with_env(mut self, env: EnvType) -> Self {
        self.env = env;
        self
    }

    pub fn with_persist_policy(mut self, policy: PersistPolicy) -> Self {
        self.persist_policy = policy;
        self
    }
}
