//! Configuration of an [`Agent`](crate::Agent) and of the polling of update
//! calls.
use crate::agent::{DEFAULT_INGRESS_EXPIRY, DEFAULT_QUERY_TIMEOUT, DEFAULT_UPDATE_TIMEOUT};
use crate::polling::{AttemptLimit, Deadline, ExponentialBackoff, PollingStrategy, Sequence};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid polling multiplier {multiplier} in {path}: must be finite and at least 1")]
    InvalidMultiplier { path: PathBuf, multiplier: f64 },
}

/// Settings of an agent. Durations are written in `humantime` format, e.g.
/// `"4m"` or `"1s 500ms"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Url of the replica to target, without any path.
    pub url: Url,
    #[serde(default = "default_ingress_expiry", with = "humantime_serde")]
    pub ingress_expiry: Duration,
    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,
    #[serde(default = "default_update_timeout", with = "humantime_serde")]
    pub update_timeout: Duration,
    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_ingress_expiry() -> Duration {
    DEFAULT_INGRESS_EXPIRY
}

fn default_query_timeout() -> Duration {
    DEFAULT_QUERY_TIMEOUT
}

fn default_update_timeout() -> Duration {
    DEFAULT_UPDATE_TIMEOUT
}

impl AgentConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            ingress_expiry: DEFAULT_INGRESS_EXPIRY,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            polling: PollingConfig::default(),
        }
    }

    /// Reads a JSON encoded config from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if !config.polling.has_valid_multiplier() {
            return Err(ConfigError::InvalidMultiplier {
                path: path.to_path_buf(),
                multiplier: config.polling.multiplier,
            });
        }
        Ok(config)
    }
}

/// How the status of an accepted update call is polled.
///
/// The first status read is immediate. After every read finding the call
/// pending, the agent waits `initial_delay`, then that delay multiplied by
/// `multiplier` each round, and gives up once `deadline` has passed or, if
/// set, after `max_attempts` waits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_deadline", with = "humantime_serde")]
    pub deadline: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_multiplier() -> f64 {
    1.2
}

fn default_deadline() -> Duration {
    Duration::from_secs(5 * 60)
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            multiplier: default_multiplier(),
            deadline: default_deadline(),
            max_attempts: None,
        }
    }
}

impl PollingConfig {
    /// Whether waits never shrink and stay representable.
    pub fn has_valid_multiplier(&self) -> bool {
        self.multiplier.is_finite() && self.multiplier >= 1.0
    }

    /// Builds a fresh strategy. The deadline starts running now.
    pub fn strategy(&self) -> Box<dyn PollingStrategy> {
        let mut strategy = Sequence::default()
            .then(ExponentialBackoff::new(self.initial_delay, self.multiplier))
            .then(Deadline::new(self.deadline));
        if let Some(max_attempts) = self.max_attempts {
            strategy = strategy.then(AttemptLimit::new(max_attempts));
        }
        Box::new(strategy)
    }
}
