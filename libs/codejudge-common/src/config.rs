// Service configuration, read from the environment
use crate::types::JudgeMode;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub redis_url: String,
    pub bind_addr: String,
    /// Base directory for ephemeral job files
    pub workdir: PathBuf,
    pub languages_path: PathBuf,
    pub timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub max_concurrent_jobs: usize,
    pub max_output_bytes: usize,
    pub judge_mode: JudgeMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub variable: &'static str,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.variable, self.reason)
    }
}

impl std::error::Error for ConfigError {}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            workdir: std::env::temp_dir().join("codejudge"),
            languages_path: PathBuf::from("config/languages.json"),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            max_concurrent_jobs: default_parallelism(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            judge_mode: JudgeMode::FirstFailure,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("REDIS_URL") {
            config.redis_url = v;
        }
        if let Some(v) = lookup("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = lookup("CODEJUDGE_WORKDIR") {
            config.workdir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CODEJUDGE_LANGUAGES") {
            config.languages_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CODEJUDGE_TIMEOUT_MS") {
            config.timeout_ms = parse("CODEJUDGE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CODEJUDGE_COMPILE_TIMEOUT_MS") {
            config.compile_timeout_ms = parse("CODEJUDGE_COMPILE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CODEJUDGE_MAX_JOBS") {
            config.max_concurrent_jobs = parse("CODEJUDGE_MAX_JOBS", &v)?;
        }
        if let Some(v) = lookup("CODEJUDGE_MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse("CODEJUDGE_MAX_OUTPUT_BYTES", &v)?;
        }
        if let Some(v) = lookup("CODEJUDGE_JUDGE_MODE") {
            config.judge_mode = parse("CODEJUDGE_JUDGE_MODE", &v)?;
        }

        if config.timeout_ms == 0 {
            return Err(ConfigError {
                variable: "CODEJUDGE_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if config.compile_timeout_ms == 0 {
            return Err(ConfigError {
                variable: "CODEJUDGE_COMPILE_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if config.max_concurrent_jobs == 0 {
            return Err(ConfigError {
                variable: "CODEJUDGE_MAX_JOBS",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }
}

fn parse<T>(variable: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError {
        variable,
        reason: e.to_string(),
    })
}
