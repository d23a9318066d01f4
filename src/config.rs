//! Layered configuration.
//!
//! Values come from an optional TOML file, overridden by environment
//! variables of the form `GUILDRELAY__<SECTION>__<KEY>`, e.g.
//! `GUILDRELAY__RETRY__MAX_ATTEMPTS=5`. Every key has a default, so running
//! without a file is fine as long as a bot token is available.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::platform::DEFAULT_API_BASE;
use crate::retry::{PolicyError, RetryPolicy};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "GUILDRELAY";

/// Environment variable consulted when no token is configured.
pub const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "guildrelay.toml";

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ::config::ConfigError),

    #[error("invalid retry configuration: {0}")]
    InvalidRetry(#[from] PolicyError),

    #[error("no bot token configured: set discord.token or {TOKEN_ENV_VAR}")]
    MissingToken,

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// `[discord]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl DiscordConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub retryable_kinds: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        let retryable_kinds = ErrorKind::ALL
            .into_iter()
            .filter(|kind| policy.retryable_kinds().contains(kind))
            .collect();
        Self {
            max_attempts: policy.max_attempts(),
            base_delay_ms: policy.base_delay_ms(),
            max_delay_ms: policy.max_delay_ms(),
            jitter: policy.jitter(),
            retryable_kinds,
        }
    }
}

impl RetryConfig {
    /// Builds the validated policy shared by every tool invocation.
    pub fn to_policy(&self) -> Result<Arc<RetryPolicy>, ConfigError> {
        let policy = RetryPolicy::with_kinds(
            self.max_attempts,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter,
            self.retryable_kinds.iter().copied().collect(),
        )?;
        Ok(Arc::new(policy))
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LoggingSection {
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig::new()
            .with_level(self.level)
            .with_format(self.format)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub discord: DiscordConfig,
    pub retry: RetryConfig,
    pub logging: LoggingSection,
}

impl RelayConfig {
    /// Loads configuration from `path` (or `guildrelay.toml` in the working
    /// directory, if present) layered with `GUILDRELAY__*` variables.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                let path_str = path
                    .to_str()
                    .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path_str.to_string()));
                }
                builder = builder.add_source(File::new(path_str, FileFormat::Toml));
            }
            None => {
                builder = builder.add_source(
                    File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
                );
            }
        }

        let config = builder.add_source(env).build()?;
        Ok(config.try_deserialize()?)
    }

    /// Path of the file [`RelayConfig::load`] would read, if any.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        }
    }

    /// The bot token, falling back to `DISCORD_TOKEN`.
    pub fn token(&self) -> Result<String, ConfigError> {
        resolve_token(
            self.discord.token.as_deref(),
            std::env::var(TOKEN_ENV_VAR).ok().as_deref(),
        )
    }

    pub fn retry_policy(&self) -> Result<Arc<RetryPolicy>, ConfigError> {
        self.retry.to_policy()
    }

    /// Renders the configuration as TOML with the token masked.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut redacted = self.clone();
        if redacted.discord.token.is_some() {
            redacted.discord.token = Some("<redacted>".to_string());
        }
        Ok(toml::to_string_pretty(&redacted)?)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("retry.retryable_kinds")
}

fn resolve_token(configured: Option<&str>, from_env: Option<&str>) -> Result<String, ConfigError> {
    let usable = |token: &str| !token.is_empty();
    configured
        .map(str::trim)
        .filter(|t| usable(t))
        .or_else(|| from_env.map(str::trim).filter(|t| usable(t)))
        .map(str::to_string)
        .ok_or(ConfigError::MissingToken)
}
