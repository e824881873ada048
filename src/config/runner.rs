//! Runner configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix shared by every environment variable read by [`RunnerConfig::from_env`].
pub const ENV_PREFIX: &str = "GROUP_RUNNER_";

const MIN_STACK_SIZE: usize = 16 * 1024;

/// Configuration for a scheduler run.
///
/// Defaults to sequential execution (`max_concurrency = 1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Maximum number of groups running at once. Must be at least 1.
    pub max_concurrency: usize,
    /// Stop dispatching once any group fails.
    pub fail_fast: bool,
    /// Upper bound on the join barrier, in milliseconds. `None` waits forever.
    pub join_timeout_ms: Option<u64>,
    /// Stack size for worker threads. `None` uses the platform default.
    pub thread_stack_size: Option<usize>,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Records retained by the in-memory reporter.
    pub max_records: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            fail_fast: false,
            join_timeout_ms: None,
            thread_stack_size: None,
            thread_name_prefix: "group-worker".into(),
            max_records: 10_000,
        }
    }
}

impl RunnerConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum concurrency.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Use one slot per logical CPU.
    #[must_use]
    pub fn with_available_parallelism(mut self) -> Self {
        self.max_concurrency = num_cpus::get().max(1);
        self
    }

    /// Enable or disable fail-fast.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Bound the join barrier.
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the reporter record bound.
    #[must_use]
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Join timeout as a `Duration`.
    #[must_use]
    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout_ms.map(Duration::from_millis)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.join_timeout_ms == Some(0) {
            return Err("join_timeout_ms must be greater than 0 when set".into());
        }
        if let Some(size) = self.thread_stack_size {
            if size < MIN_STACK_SIZE {
                return Err(format!("thread_stack_size must be at least {MIN_STACK_SIZE} bytes"));
            }
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.thread_name_prefix.contains('\0') {
            return Err("thread_name_prefix must not contain NUL bytes".into());
        }
        if self.max_records == 0 {
            return Err("max_records must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse error (including negative or fractional numbers) or a
    /// validation error.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read `GROUP_RUNNER_*` variables, after loading a `.env` file if present.
    ///
    /// Recognized variables: `MAX_CONCURRENCY`, `FAIL_FAST`, `JOIN_TIMEOUT_MS`,
    /// `THREAD_STACK_SIZE`, `THREAD_NAME_PREFIX`, `MAX_RECORDS`.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable values or a failed validation.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, starting from defaults.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();

        if let Some(v) = get("MAX_CONCURRENCY") {
            cfg.max_concurrency = parse_number("MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("FAIL_FAST") {
            cfg.fail_fast = parse_flag("FAIL_FAST", &v)?;
        }
        if let Some(v) = get("JOIN_TIMEOUT_MS") {
            cfg.join_timeout_ms = Some(parse_number("JOIN_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("THREAD_STACK_SIZE") {
            cfg.thread_stack_size = Some(parse_number("THREAD_STACK_SIZE", &v)?);
        }
        if let Some(v) = get("THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = v;
        }
        if let Some(v) = get("MAX_RECORDS") {
            cfg.max_records = parse_number("MAX_RECORDS", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_number<T>(name: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}: expected a non-negative integer, got `{value}` ({e})"))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("{ENV_PREFIX}{name}: expected a boolean, got `{value}`")),
    }
}
