//! Harness-wide timing and naming settings.
//!
//! The values are fixed for the lifetime of a [`FixtureProvisioner`]; there
//! is no per-call override.
//!
//! [`FixtureProvisioner`]: crate::FixtureProvisioner

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Interval between two provider polls while waiting on a VM state.
pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Wall-clock budget of a single polling phase.
pub const STATE_BUDGET: Duration = Duration::from_secs(20 * 60);

/// Time given to asynchronous volume detaches before volumes are deleted.
pub const DETACH_GRACE: Duration = Duration::from_secs(60);

/// Prefix of every resource name the harness creates.
pub const NAME_PREFIX: &str = "dsn";

const ENV_POLL_INTERVAL: &str = "FIXTURES_POLL_INTERVAL_SECS";
const ENV_STATE_BUDGET: &str = "FIXTURES_STATE_BUDGET_SECS";
const ENV_DETACH_GRACE: &str = "FIXTURES_DETACH_GRACE_SECS";
const ENV_NAME_PREFIX: &str = "FIXTURES_NAME_PREFIX";

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable held something other than a whole number of seconds.
    #[error("{name} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { name: &'static str, value: String },

    /// The name prefix was empty.
    #[error("{0} must not be empty")]
    EmptyPrefix(&'static str),
}

/// Timing and naming settings for a harness run.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cloudfixtures::HarnessConfig;
///
/// let config = HarnessConfig::new()
///     .poll_interval(Duration::from_secs(5))
///     .name_prefix("ci");
/// assert_eq!(config.state_budget, Duration::from_secs(1200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Interval between state polls.
    pub poll_interval: Duration,
    /// Budget of each polling phase.
    pub state_budget: Duration,
    /// Grace period between detaching and deleting volumes at teardown.
    pub detach_grace: Duration,
    /// Prefix for generated resource names.
    pub name_prefix: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            state_budget: STATE_BUDGET,
            detach_grace: DETACH_GRACE,
            name_prefix: NAME_PREFIX.to_string(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration with the standard values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the budget of each polling phase.
    pub fn state_budget(mut self, budget: Duration) -> Self {
        self.state_budget = budget;
        self
    }

    /// Sets the volume detach grace period.
    pub fn detach_grace(mut self, grace: Duration) -> Self {
        self.detach_grace = grace;
        self
    }

    /// Sets the resource name prefix.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Builds a configuration from the standard values, overridden by any
    /// `FIXTURES_*` environment variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = seconds(&lookup, ENV_POLL_INTERVAL)? {
            config.poll_interval = secs;
        }
        if let Some(secs) = seconds(&lookup, ENV_STATE_BUDGET)? {
            config.state_budget = secs;
        }
        if let Some(secs) = seconds(&lookup, ENV_DETACH_GRACE)? {
            config.detach_grace = secs;
        }
        if let Some(prefix) = lookup(ENV_NAME_PREFIX) {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                return Err(ConfigError::EmptyPrefix(ENV_NAME_PREFIX));
            }
            config.name_prefix = prefix.to_string();
        }

        Ok(config)
    }
}

fn seconds<F>(lookup: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| ConfigError::InvalidSeconds { name, value })
}
