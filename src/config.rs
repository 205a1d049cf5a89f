// Runtime configuration from environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::capture::models::DEFAULT_USER_AGENT;
use crate::capture::{PlatformTarget, RetryPolicy, ScreenshotConfig, PLATFORM_TARGETS};

pub const ENV_USER_AGENT: &str = "SCREENSHOT_USER_AGENT";
pub const ENV_DEFAULT_TIMEOUT: &str = "SCREENSHOT_DEFAULT_TIMEOUT";
pub const ENV_BROWSER_PATH: &str = "SCREENSHOT_BROWSER_PATH";
pub const ENV_MAX_RETRIES: &str = "SCREENSHOT_MAX_RETRIES";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("default timeout must be positive")]
    ZeroTimeout,
    #[error("user agent cannot be empty")]
    EmptyUserAgent,
    #[error("browser path does not exist: {}", .0.display())]
    BrowserNotFound(PathBuf),
    #[error("unknown output format: {0}")]
    UnknownFormat(String),
}

/// Output format that is always produced
pub const ORIGINAL_FORMAT: &str = "original";

/// Settings that may be overridden from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub user_agent: String,
    /// Per-acquisition deadline
    pub default_timeout: Duration,
    pub browser_path: Option<PathBuf>,
    pub max_retries: u32,
    /// `original` plus the platform target keys to derive
    pub output_formats: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_timeout: Duration::from_secs(30),
            browser_path: None,
            max_retries: 3,
            output_formats: std::iter::once(ORIGINAL_FORMAT)
                .chain(PLATFORM_TARGETS.iter().map(|t| t.key))
                .map(str::to_string)
                .collect(),
        }
    }
}

impl Config {
    /// Defaults overlaid with `SCREENSHOT_*` variables
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `load`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(ua) = var(ENV_USER_AGENT) {
            config.user_agent = ua;
        }

        if let Some(raw) = var(ENV_DEFAULT_TIMEOUT) {
            match parse_duration(&raw) {
                Some(timeout) => config.default_timeout = timeout,
                None => debug!(key = ENV_DEFAULT_TIMEOUT, value = %raw, "ignoring unparseable value"),
            }
        }

        if let Some(path) = var(ENV_BROWSER_PATH) {
            config.browser_path = Some(expand_home(&path));
        }

        if let Some(raw) = var(ENV_MAX_RETRIES) {
            match raw.parse::<u32>() {
                Ok(retries) => config.max_retries = retries,
                Err(_) => debug!(key = ENV_MAX_RETRIES, value = %raw, "ignoring unparseable value"),
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        if let Some(path) = &self.browser_path {
            if !path.exists() {
                return Err(ConfigError::BrowserNotFound(path.clone()));
            }
        }
        if let Some(unknown) = self
            .output_formats
            .iter()
            .find(|f| f.as_str() != ORIGINAL_FORMAT && PlatformTarget::find(f).is_none())
        {
            return Err(ConfigError::UnknownFormat(unknown.clone()));
        }
        Ok(())
    }

    /// Platform targets selected by `output_formats`, in registry order
    pub fn platform_targets(&self) -> Vec<PlatformTarget> {
        PLATFORM_TARGETS
            .iter()
            .filter(|t| self.output_formats.iter().any(|f| f == t.key))
            .copied()
            .collect()
    }

    /// Screenshot settings seeded from this config
    pub fn screenshot_config(&self) -> ScreenshotConfig {
        ScreenshotConfig::default()
            .with_timeout(self.default_timeout)
            .with_user_agent(self.user_agent.clone())
            .with_browser_path(self.browser_path.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(self.max_retries)
    }
}

/// Plain seconds (`45`) or a number with an `ms`, `s` or `m` suffix
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let (number, unit) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit())?);
    let value: u64 = number.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        _ => None,
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}
