//! Agent configuration resolved once from the environment.
//!
//! [`AgentConfig`] captures every setting the agent needs, with documented
//! defaults. It is built once at startup (after an optional `.env` file has
//! been loaded into the process environment) and then only read.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::retry::RetryPolicy;
use crate::error::{Error, Result};

pub const DEFAULT_MODEL_ID: &str = "ai/smollm2";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";
pub const DEFAULT_API_KEY: &str = "dummy_key";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 3;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "Agent.log";
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Immutable settings for one run of the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// OpenAI-compatible base URL, e.g. `http://localhost:12434/engines/v1`.
    /// `DMR_BASE_URL`, no default.
    pub base_url: Option<String>,
    /// Model identifier. `MODEL_ID`, default `"ai/smollm2"`.
    pub model_id: String,
    /// System instructions for the chat session. `AGENT_INSTRUCTIONS`.
    pub instructions: String,
    /// Bearer token. The model runner ignores it. `DMR_API_KEY`.
    pub api_key: String,
    /// Connection attempts before giving up (>= 1). `MAX_RETRIES`, default `3`.
    pub max_retries: u32,
    /// Wait between connection attempts. `RETRY_DELAY` in seconds, default `3`.
    pub retry_delay: Duration,
    /// Whether client construction probes `GET {base}/models`. `CONNECT_PROBE`.
    pub probe: bool,
    /// Timeout for the probe request. `PROBE_TIMEOUT` in seconds, default `5`.
    pub probe_timeout: Duration,
    /// Log directory, created if absent. `LOG_DIR`, default `"logs"`.
    pub log_dir: PathBuf,
    /// Log file name inside `log_dir`. `LOG_FILE`, default `"Agent.log"`.
    pub log_file: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model_id: DEFAULT_MODEL_ID.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            probe: true,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl AgentConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let max_retries: i64 = parse_or(&get, "MAX_RETRIES", i64::from(DEFAULT_MAX_RETRIES))?;
        if max_retries < 1 {
            return Err(Error::config(format!(
                "MAX_RETRIES must be at least 1, got {max_retries}"
            )));
        }
        let max_retries = u32::try_from(max_retries).map_err(|_| {
            Error::config(format!(
                "MAX_RETRIES must be at most {}, got {max_retries}",
                u32::MAX
            ))
        })?;

        // A negative delay means "don't wait".
        let retry_delay: i64 = parse_or(&get, "RETRY_DELAY", DEFAULT_RETRY_DELAY_SECS as i64)?;
        let retry_delay = Duration::from_secs(u64::try_from(retry_delay).unwrap_or(0));

        let probe_timeout: u64 = parse_or(&get, "PROBE_TIMEOUT", DEFAULT_PROBE_TIMEOUT_SECS)?;
        if probe_timeout < 1 {
            return Err(Error::config("PROBE_TIMEOUT must be at least 1 second"));
        }

        let probe = match get("CONNECT_PROBE") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| Error::config(format!("CONNECT_PROBE: not a boolean: '{raw}'")))?,
            None => defaults.probe,
        };

        Ok(Self {
            base_url: get("DMR_BASE_URL").map(|u| u.trim().to_string()),
            model_id: get("MODEL_ID").unwrap_or(defaults.model_id),
            instructions: get("AGENT_INSTRUCTIONS").unwrap_or(defaults.instructions),
            api_key: get("DMR_API_KEY").unwrap_or(defaults.api_key),
            max_retries,
            retry_delay,
            probe,
            probe_timeout: Duration::from_secs(probe_timeout),
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            log_file: get("LOG_FILE").unwrap_or(defaults.log_file),
        })
    }

    /// Set the base URL (builder style, mostly for tests and embedding).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the retry bound and delay.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Set the log location.
    pub fn with_log(mut self, dir: impl Into<PathBuf>, file: impl Into<String>) -> Self {
        self.log_dir = dir.into();
        self.log_file = file.into();
        self
    }

    /// The retry policy for the connection bootstrap.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }

    /// Full path of the log file.
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}

fn parse_or<T: FromStr>(get: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{key}: not a valid integer: '{raw}'"))),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
