//! Configuration for the statuswatch binary.
//!
//! Supports loading configuration from TOML files, environment variables,
//! or CLI arguments.

use std::{net::SocketAddr, path::Path, time::Duration};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use statuswatch::{ClientConfig, DEFAULT_MAX_FRAME_LEN, RetryPolicy};

/// CLI arguments for statuswatch.
#[derive(Debug, Parser)]
#[command(name = "statuswatch")]
#[command(about = "Watch Scheduler system status and serve it to dashboards")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "STATUSWATCH_CONFIG")]
    pub config: Option<String>,

    /// Address of the status service (`host:port` or URL).
    #[arg(short, long, env = "STATUSWATCH_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Address to serve the dashboard API on.
    #[arg(long, env = "STATUSWATCH_SERVE")]
    pub serve: Option<SocketAddr>,

    /// Reconnection strategy.
    #[arg(long, env = "STATUSWATCH_RETRY")]
    pub retry: Option<RetryKind>,

    /// Fixed delay, or initial delay for exponential backoff, in milliseconds
    /// [default: 500].
    #[arg(long, env = "STATUSWATCH_RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    /// Upper bound on exponential backoff, in milliseconds [default: 10000].
    #[arg(long, env = "STATUSWATCH_RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: Option<u64>,

    /// Maximum consecutive reconnections (unlimited if unset).
    #[arg(long, env = "STATUSWATCH_RETRY_MAX_ATTEMPTS")]
    pub retry_max_attempts: Option<u32>,

    /// Connect timeout in milliseconds.
    #[arg(long, env = "STATUSWATCH_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Maximum silence on the stream before failing, in milliseconds.
    #[arg(long, env = "STATUSWATCH_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: Option<u64>,

    /// Maximum length of one stream frame, in bytes.
    #[arg(long, env = "STATUSWATCH_MAX_FRAME_LEN")]
    pub max_frame_len: Option<usize>,
}

/// Reconnection strategies selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RetryKind {
    /// Report the first failure and stop.
    Never,
    /// Reconnect after a fixed delay.
    Fixed,
    /// Reconnect with exponential backoff.
    Exponential,
}

/// Default retry delay in milliseconds.
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default exponential backoff cap in milliseconds.
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;

impl Cli {
    /// Builds the retry policy selected on the command line, if any.
    ///
    /// Tuning flags are not applied here; see [`Cli::tune_retry`].
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.retry.map(|kind| match kind {
            RetryKind::Never => RetryPolicy::Never,
            RetryKind::Fixed => RetryPolicy::Fixed {
                delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
                max_attempts: None,
            },
            RetryKind::Exponential => RetryPolicy::Exponential {
                initial: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
                max: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
                max_attempts: None,
            },
        })
    }

    /// Returns true if any retry tuning flag was given.
    pub fn has_retry_tuning(&self) -> bool {
        self.retry_delay_ms.is_some()
            || self.retry_max_delay_ms.is_some()
            || self.retry_max_attempts.is_some()
    }

    /// Applies the retry tuning flags on top of `policy`.
    ///
    /// Tuning a policy that never retries is rejected.
    pub fn tune_retry(&self, policy: RetryPolicy) -> Result<RetryPolicy, ConfigError> {
        if !self.has_retry_tuning() {
            return Ok(policy);
        }

        let tuned = match policy {
            RetryPolicy::Never => {
                return Err(ConfigError::Invalid(
                    "retry delay and attempt options need a fixed or exponential retry policy"
                        .to_string(),
                ));
            }
            RetryPolicy::Fixed { delay, max_attempts } => RetryPolicy::Fixed {
                delay: self.retry_delay_ms.map_or(delay, Duration::from_millis),
                max_attempts: self.retry_max_attempts.or(max_attempts),
            },
            RetryPolicy::Exponential { initial, max, max_attempts } => RetryPolicy::Exponential {
                initial: self.retry_delay_ms.map_or(initial, Duration::from_millis),
                max: self.retry_max_delay_ms.map_or(max, Duration::from_millis),
                max_attempts: self.retry_max_attempts.or(max_attempts),
            },
        };
        Ok(tuned)
    }
}

/// Configuration for statuswatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the status service.
    pub endpoint: String,

    /// Address to serve the dashboard API on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve: Option<SocketAddr>,

    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Maximum silence on the stream before failing, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,

    /// Maximum length of one stream frame, in bytes.
    pub max_frame_len: usize,

    /// Reconnection policy.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "localhost:9999".to_string(),
            serve: None,
            connect_timeout_ms: 10_000,
            idle_timeout_ms: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            retry: RetryPolicy::Never,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Load configuration from CLI arguments, optionally overriding with a config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    /// Merges parsed CLI arguments over the config file or defaults.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        // Start with config file if provided
        let mut config =
            if let Some(ref path) = cli.config { Self::from_file(path)? } else { Self::default() };

        // CLI args override config file values
        let retry = cli.retry_policy().unwrap_or(config.retry);
        config.retry = cli.tune_retry(retry)?;
        if let Some(endpoint) = cli.endpoint {
            config.endpoint = endpoint;
        }
        if cli.serve.is_some() {
            config.serve = cli.serve;
        }
        if let Some(ms) = cli.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if cli.idle_timeout_ms.is_some() {
            config.idle_timeout_ms = cli.idle_timeout_ms;
        }
        if let Some(len) = cli.max_frame_len {
            config.max_frame_len = len;
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect timeout must be positive".to_string()));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("idle timeout must be positive".to_string()));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::Invalid("max frame length must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the client configuration.
    pub const fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            idle_timeout: match self.idle_timeout_ms {
                Some(ms) => Some(Duration::from_millis(ms)),
                None => None,
            },
            max_frame_len: self.max_frame_len,
            retry: self.retry,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse configuration file.
    #[error("failed to parse config: {0}")]
    Parse(toml::de::Error),

    /// A configuration value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
