//! Typed configuration model
//!
//! ```yaml
//! vendors:
//!   aws:
//!     region: us-east-1
//!     credentials_ref: env:AWS_PROFILE
//!     tags:
//!       team: platform
//! polling:
//!   initial_interval_ms: 2000
//!   timeout_ms: 1200000
//! retry:
//!   max_attempts: 5
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_AWS_REGION: &str = "PROVISIO_AWS_REGION";
pub const ENV_AWS_REGION_FALLBACK: &str = "AWS_REGION";
pub const ENV_AWS_CREDENTIALS: &str = "PROVISIO_AWS_CREDENTIALS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisioConfig {
    /// Per-vendor sections keyed by vendor tag (`aws`)
    #[serde(default)]
    pub vendors: BTreeMap<String, VendorSettings>,

    #[serde(default)]
    pub polling: PollSettings,

    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSettings {
    pub region: Option<String>,

    /// `env:NAME`, `profile:NAME` or `secret:NAME`
    pub credentials_ref: Option<String>,

    /// Extra tags applied to every resource
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Status polling (milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_initial")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_poll_max")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Overall deadline for one blocking operation
    #[serde(default = "default_poll_timeout")]
    pub timeout_ms: u64,
}

fn default_poll_initial() -> u64 {
    2_000
}
fn default_poll_max() -> u64 {
    30_000
}
fn default_poll_timeout() -> u64 {
    20 * 60 * 1_000
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_poll_initial(),
            max_interval_ms: default_poll_max(),
            multiplier: default_multiplier(),
            timeout_ms: default_poll_timeout(),
        }
    }
}

impl PollSettings {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry of transient vendor faults (milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_max")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_retry_initial() -> u64 {
    500
}
fn default_retry_max() -> u64 {
    10_000
}
fn default_jitter() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_retry_initial(),
            max_delay_ms: default_retry_max(),
            backoff_multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl ProvisioConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        // An empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: PathBuf::from(path),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn vendor(&self, key: &str) -> Option<&VendorSettings> {
        self.vendors.get(&key.to_ascii_lowercase())
    }

    /// Apply environment overrides on top of file values.
    ///
    /// `PROVISIO_AWS_REGION` always wins; `AWS_REGION` only fills a region
    /// nothing else provided.
    pub fn apply_env_overrides(&mut self) {
        let region = std::env::var(ENV_AWS_REGION).ok().filter(|v| !v.is_empty());
        let fallback = std::env::var(ENV_AWS_REGION_FALLBACK)
            .ok()
            .filter(|v| !v.is_empty());
        let credentials = std::env::var(ENV_AWS_CREDENTIALS)
            .ok()
            .filter(|v| !v.is_empty());

        if region.is_none() && fallback.is_none() && credentials.is_none() {
            return;
        }

        let aws = self.vendors.entry("aws".to_string()).or_default();
        if let Some(region) = region {
            tracing::debug!(region = %region, "aws region from {ENV_AWS_REGION}");
            aws.region = Some(region);
        } else if aws.region.is_none() {
            if let Some(region) = fallback {
                tracing::debug!(region = %region, "aws region from {ENV_AWS_REGION_FALLBACK}");
                aws.region = Some(region);
            }
        }
        if let Some(credentials) = credentials {
            aws.credentials_ref = Some(credentials);
        }
    }

    /// Reject values the backoff loops cannot work with
    pub fn validate(&self) -> Result<()> {
        let p = &self.polling;
        if p.initial_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "polling.initial_interval_ms",
                "must be greater than zero",
            ));
        }
        if p.max_interval_ms < p.initial_interval_ms {
            return Err(ConfigError::invalid(
                "polling.max_interval_ms",
                "must not be smaller than initial_interval_ms",
            ));
        }
        if p.multiplier < 1.0 {
            return Err(ConfigError::invalid("polling.multiplier", "must be >= 1.0"));
        }
        if p.timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "polling.timeout_ms",
                "must be greater than zero",
            ));
        }

        let r = &self.retry;
        if r.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if r.max_delay_ms < r.initial_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be smaller than initial_delay_ms",
            ));
        }
        if r.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "retry.backoff_multiplier",
                "must be >= 1.0",
            ));
        }
        Ok(())
    }
}
