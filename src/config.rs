//! TOML configuration for testhub.
//!
//! Every path and default the hub relies on lives here and is handed to the
//! store and the orchestrator at construction.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TESTHUB_CONFIG";

/// Config file picked up from the working directory when nothing else is set.
pub const LOCAL_CONFIG_FILE: &str = "testhub.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the hub process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HubConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded hub configuration");
        Ok(config)
    }

    /// Resolve the configuration for this process.
    ///
    /// An explicit path must load or the call fails. Otherwise, in order:
    /// 1. The path in the `TESTHUB_CONFIG` environment variable.
    /// 2. `./testhub.toml`.
    /// 3. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        Ok(Self::load_or_default())
    }

    /// Try the environment override and the local file, falling back to defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "TESTHUB_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local_path = Path::new(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            match Self::load(local_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local_path.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Where results are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. Parent directories are created on first use.
    pub db_path: PathBuf,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/test_results.db"),
            max_connections: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// How the external test runner is invoked and how its output is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Runner executable, a path or a bare command name resolved via `$PATH`.
    pub program: String,
    /// Directory receiving the per-run HTML logs written by the runner.
    pub log_dir: PathBuf,
    /// Directory where uploaded suites are staged before a run.
    pub upload_dir: PathBuf,
    /// What gets recorded in the `duration` column.
    pub duration_metric: DurationMetric,
    /// Captured output lines kept in memory per file.
    pub max_captured_lines: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "robot".to_string(),
            log_dir: PathBuf::from("logs"),
            upload_dir: PathBuf::from("temp_uploads"),
            duration_metric: DurationMetric::OutputLines,
            max_captured_lines: 10_000,
        }
    }
}

/// Source of the value stored in the `duration` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationMetric {
    /// Number of output lines the runner produced. Matches historical rows.
    OutputLines,
    /// Measured wall-clock time of the runner process, in seconds.
    ElapsedSeconds,
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Trailing window for the KPI summary, in days.
    pub kpi_window_days: u32,
    /// Rows returned by a history listing when no limit is given.
    pub history_limit: u32,
    /// Buckets in the duration histogram.
    pub histogram_bins: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            kpi_window_days: 7,
            history_limit: 50,
            histogram_bins: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Rows older than this many days are removed by a retention sweep.
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 10 }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
