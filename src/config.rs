//! Run configuration.
//!
//! Layered the same way everywhere: compiled-in defaults, then an optional
//! TOML file (`--config` or `RADLOAD_CONFIG`), then command-line flags.
//! The merged [`RunConfig`] is immutable for the rest of the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::eapol::DEFAULT_PROGRAM;
use crate::credentials::DEFAULT_DELIMITER;
use crate::error::StartupError;
use crate::pool::MAX_WORKERS;

pub const CONFIG_ENV: &str = "RADLOAD_CONFIG";

// ---------------------------------------------------------------------------
// File configuration
// ---------------------------------------------------------------------------

/// Root of the optional TOML configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadloadConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub output: OutputSection,
}

/// Concurrency and termination limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    /// Attempts allowed in flight at once.
    pub workers: usize,
    /// Stop dispatching after this many attempts (0 = unbounded).
    pub max_requests: u64,
    /// Stop dispatching after this many seconds (0 = unbounded).
    pub max_duration_secs: u64,
    /// Delete generated client configurations on exit.
    pub cleanup: bool,
    /// Number of random Calling-Station-Id values to rotate through.
    pub mac_pool_size: usize,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            workers: 1,
            max_requests: 0,
            max_duration_secs: 0,
            cleanup: false,
            mac_pool_size: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    pub path: PathBuf,
    pub delimiter: char,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("radload.csv"),
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Program name (searched in `PATH`) or path to `eapol_test`.
    pub program: String,
    /// Arguments appended to every invocation, e.g. `["-a", "10.0.0.1", "-s", "secret"]`.
    pub args: Vec<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    /// Directory for rendered client configurations.
    pub work_dir: PathBuf,
    /// Attempt log file; stdout when unset (stderr with `json`).
    pub log_path: Option<PathBuf>,
    /// Print the final report as JSON on stdout.
    pub json: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/.radload"),
            log_path: None,
            json: false,
        }
    }
}

impl RadloadConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration file");
        Ok(config)
    }

    /// Resolve the configuration file.
    ///
    /// An explicit path must load. Otherwise `RADLOAD_CONFIG` is tried, and
    /// a broken file named there only produces a warning before falling back
    /// to defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, StartupError> {
        if let Some(path) = explicit {
            return Self::load(path).map_err(|e| StartupError::Config(format!("{:#}", e)));
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, using defaults",
                        CONFIG_ENV
                    );
                }
            }
        }

        debug!("no config file, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Merge command-line overrides and validate the result.
    pub fn into_run_config(self, overrides: Overrides) -> Result<RunConfig, StartupError> {
        let mut backend_args = self.backend.args;
        if !overrides.backend_args.is_empty() {
            backend_args = overrides.backend_args;
        }

        let config = RunConfig {
            worker_limit: overrides.workers.unwrap_or(self.run.workers),
            max_requests: overrides.max_requests.unwrap_or(self.run.max_requests),
            max_duration_secs: overrides
                .max_duration_secs
                .unwrap_or(self.run.max_duration_secs),
            cleanup_on_exit: overrides.cleanup || self.run.cleanup,
            mac_pool_size: overrides.mac_pool_size.unwrap_or(self.run.mac_pool_size),
            credentials_path: overrides.credentials_path.unwrap_or(self.credentials.path),
            delimiter: overrides.delimiter.unwrap_or(self.credentials.delimiter),
            work_dir: overrides.work_dir.unwrap_or(self.output.work_dir),
            log_path: overrides.log_path.or(self.output.log_path),
            json_report: overrides.json || self.output.json,
            backend_program: overrides.backend_program.unwrap_or(self.backend.program),
            backend_args,
        };
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Command-line overrides
// ---------------------------------------------------------------------------

/// Values supplied on the command line; `None` keeps the file/default value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub max_requests: Option<u64>,
    pub max_duration_secs: Option<u64>,
    pub cleanup: bool,
    pub mac_pool_size: Option<usize>,
    pub credentials_path: Option<PathBuf>,
    pub delimiter: Option<char>,
    pub work_dir: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub backend_program: Option<String>,
    /// Pass-through arguments; replace the file's list when non-empty.
    pub backend_args: Vec<String>,
    pub json: bool,
}

// ---------------------------------------------------------------------------
// Effective configuration
// ---------------------------------------------------------------------------

/// Immutable settings for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub worker_limit: usize,
    pub max_requests: u64,
    pub max_duration_secs: u64,
    pub cleanup_on_exit: bool,
    pub mac_pool_size: usize,
    pub credentials_path: PathBuf,
    pub delimiter: char,
    pub work_dir: PathBuf,
    pub log_path: Option<PathBuf>,
    /// Stdout carries only the JSON report.
    pub json_report: bool,
    pub backend_program: String,
    pub backend_args: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        // Defaults are valid by construction.
        let file = RadloadConfig::default();
        RunConfig {
            worker_limit: file.run.workers,
            max_requests: file.run.max_requests,
            max_duration_secs: file.run.max_duration_secs,
            cleanup_on_exit: file.run.cleanup,
            mac_pool_size: file.run.mac_pool_size,
            credentials_path: file.credentials.path,
            delimiter: file.credentials.delimiter,
            work_dir: file.output.work_dir,
            log_path: file.output.log_path,
            json_report: file.output.json,
            backend_program: file.backend.program,
            backend_args: file.backend.args,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.worker_limit == 0 {
            return Err(StartupError::Config("workers must be at least 1".into()));
        }
        if self.worker_limit > MAX_WORKERS {
            return Err(StartupError::Config(format!(
                "workers must be at most {}",
                MAX_WORKERS
            )));
        }
        if self.backend_program.trim().is_empty() {
            return Err(StartupError::Config("backend program must not be empty".into()));
        }
        if matches!(self.delimiter, '"' | '#' | '\n' | '\r') {
            return Err(StartupError::Config(format!(
                "unsupported credential delimiter {:?}",
                self.delimiter
            )));
        }
        Ok(())
    }

    /// Wall-clock limit, if any.
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }

    /// Request limit, if any.
    pub fn request_limit(&self) -> Option<u64> {
        (self.max_requests > 0).then_some(self.max_requests)
    }
}

/// Parse a duration given as plain seconds or with an `s`, `m` or `h` suffix.
pub fn parse_duration_secs(input: &str) -> Result<u64, String> {
    let s = input.trim();
    let (digits, scale) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 3600),
        _ => (s, 1),
    };
    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(|| format!("invalid duration '{}' (examples: 90, 90s, 5m, 1h)", input))
}
