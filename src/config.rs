//! Configuration for invocation contexts and the default dispatcher.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic** - values set via `with_*` methods
//! 2. **Environment variables** - values from `FARCALL_*` env vars
//! 3. **Defaults** - built-in defaults from [`Config::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `FARCALL_WORKER_THREADS` | `usize` | `worker_threads` |
//! | `FARCALL_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `FARCALL_DUPLICATE_COMPLETION` | `panic` \| `log` | `duplicate_completion` |
//! | `FARCALL_PROFILE_APPLY` | `bool` | `profile_apply` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable name for worker thread count.
pub const ENV_WORKER_THREADS: &str = "FARCALL_WORKER_THREADS";
/// Environment variable name for worker thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "FARCALL_THREAD_NAME_PREFIX";
/// Environment variable name for the duplicate completion response.
pub const ENV_DUPLICATE_COMPLETION: &str = "FARCALL_DUPLICATE_COMPLETION";
/// Environment variable name for apply-latency profiling.
pub const ENV_PROFILE_APPLY: &str = "FARCALL_PROFILE_APPLY";

/// Errors produced while building or validating a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable was set to a value that could not be parsed.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Description of the accepted values.
        expected: &'static str,
        /// The rejected raw value.
        value: String,
    },
    /// A configuration field holds a value outside its valid range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Response policy when a result cell receives a second completion.
///
/// A duplicate completion always indicates a broken invariant (retried
/// dispatch, duplicated reply). The stored outcome is never overwritten;
/// this policy only decides what happens to the completing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateCompletionResponse {
    /// Panic in the completing context with diagnostic details.
    #[default]
    Panic,
    /// Log the fault and hand `Err(DuplicateCompletion)` back to the completer.
    Log,
}

impl fmt::Display for DuplicateCompletionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panic => write!(f, "panic"),
            Self::Log => write!(f, "log"),
        }
    }
}

impl FromStr for DuplicateCompletionResponse {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "panic" => Ok(Self::Panic),
            "log" => Ok(Self::Log),
            _ => Err(()),
        }
    }
}

/// Invocation configuration.
///
/// Deserializes with missing fields taken from [`Config::default()`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of worker threads used for locally dispatched invocations.
    pub worker_threads: usize,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// What to do when a completion arrives for an already-completed future.
    pub duplicate_completion: DuplicateCompletionResponse,
    /// Record per-strategy `apply` latency histograms.
    pub profile_apply: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
            thread_name_prefix: "farcall".to_string(),
            duplicate_completion: DuplicateCompletionResponse::default(),
            profile_apply: false,
        }
    }
}

impl Config {
    /// Builds a configuration from defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the worker thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the duplicate completion response.
    #[must_use]
    pub fn with_duplicate_completion(mut self, response: DuplicateCompletionResponse) -> Self {
        self.duplicate_completion = response;
        self
    }

    /// Enables or disables apply-latency profiling.
    #[must_use]
    pub fn with_profile_apply(mut self, enabled: bool) -> Self {
        self.profile_apply = enabled;
        self
    }

    /// Checks field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Apply environment variable overrides to a [`Config`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

fn apply_overrides_from<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_WORKER_THREADS) {
        config.worker_threads = val.trim().parse::<usize>().map_err(|_| invalid(
            ENV_WORKER_THREADS,
            "unsigned integer",
            &val,
        ))?;
    }
    if let Some(val) = lookup(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = lookup(ENV_DUPLICATE_COMPLETION) {
        config.duplicate_completion = val
            .parse()
            .map_err(|()| invalid(ENV_DUPLICATE_COMPLETION, "`panic` or `log`", &val))?;
    }
    if let Some(val) = lookup(ENV_PROFILE_APPLY) {
        config.profile_apply = parse_bool(&val)
            .ok_or_else(|| invalid(ENV_PROFILE_APPLY, "boolean", &val))?;
    }
    Ok(())
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(var: &'static str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        expected,
        value: value.to_string(),
    }
}
