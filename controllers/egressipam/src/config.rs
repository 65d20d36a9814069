//! Controller configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ControllerError;

/// Upper bound on concurrent record writes per sweep (unset: unbounded)
pub const MAX_CONCURRENT_WRITES_VAR: &str = "EGRESSIPAM_MAX_CONCURRENT_WRITES";
/// Requeue period after a successful pass, in seconds
pub const RESYNC_SECONDS_VAR: &str = "EGRESSIPAM_RESYNC_SECONDS";
/// First backoff step after a failed pass, in minutes
pub const BACKOFF_MIN_MINUTES_VAR: &str = "EGRESSIPAM_BACKOFF_MIN_MINUTES";
/// Backoff cap, in minutes
pub const BACKOFF_MAX_MINUTES_VAR: &str = "EGRESSIPAM_BACKOFF_MAX_MINUTES";

/// Runtime settings of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Bound on in-flight HostSubnet writes within one sweep
    pub max_concurrent_writes: Option<usize>,
    /// Requeue period after a successful pass
    pub resync: Duration,
    /// Fibonacci backoff floor in minutes
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff cap in minutes
    pub backoff_max_minutes: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_writes: None,
            resync: Duration::from_secs(300),
            backoff_min_minutes: 1,
            backoff_max_minutes: 10,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, raw: &str) -> Result<T, ControllerError> {
    raw.trim()
        .parse()
        .map_err(|_| ControllerError::InvalidConfig(format!("{name} must be a positive integer, got '{raw}'")))
}

fn positive(name: &str, value: u64) -> Result<u64, ControllerError> {
    if value == 0 {
        return Err(ControllerError::InvalidConfig(format!("{name} must be greater than zero")));
    }
    Ok(value)
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(MAX_CONCURRENT_WRITES_VAR) {
            let limit = positive(MAX_CONCURRENT_WRITES_VAR, parse_var(MAX_CONCURRENT_WRITES_VAR, &raw)?)?;
            config.max_concurrent_writes = Some(usize::try_from(limit).map_err(|_| {
                ControllerError::InvalidConfig(format!("{MAX_CONCURRENT_WRITES_VAR} is too large"))
            })?);
        }
        if let Some(raw) = lookup(RESYNC_SECONDS_VAR) {
            config.resync = Duration::from_secs(positive(RESYNC_SECONDS_VAR, parse_var(RESYNC_SECONDS_VAR, &raw)?)?);
        }
        if let Some(raw) = lookup(BACKOFF_MIN_MINUTES_VAR) {
            config.backoff_min_minutes = positive(BACKOFF_MIN_MINUTES_VAR, parse_var(BACKOFF_MIN_MINUTES_VAR, &raw)?)?;
        }
        if let Some(raw) = lookup(BACKOFF_MAX_MINUTES_VAR) {
            config.backoff_max_minutes = positive(BACKOFF_MAX_MINUTES_VAR, parse_var(BACKOFF_MAX_MINUTES_VAR, &raw)?)?;
        }

        if config.backoff_max_minutes < config.backoff_min_minutes {
            return Err(ControllerError::InvalidConfig(format!(
                "{BACKOFF_MAX_MINUTES_VAR} ({}) is below {BACKOFF_MIN_MINUTES_VAR} ({})",
                config.backoff_max_minutes, config.backoff_min_minutes
            )));
        }

        Ok(config)
    }
}
