//! Configuration for the `taskflow` client.
//!
//! Layered, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attributes)
//! 3. TOML config file (`~/.config/taskflow/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use taskflow_proto::task::{SortOrder, TaskStatus};

use crate::sync::RetryPolicy;
use crate::tasks::Session;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Could not determine the user's config directory.
    #[error("could not determine config directory (no HOME or XDG_CONFIG_HOME)")]
    NoConfigDir,

    /// A duration setting was zero.
    #[error("[sync] {key} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending setting.
        key: &'static str,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    sync: SyncFileConfig,
    cache: CacheFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    api_url: Option<String>,
    token: Option<String>,
    user_id: Option<String>,
    admin: Option<bool>,
}

/// `[sync]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    retry_delay_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    probe_interval_secs: Option<u64>,
}

/// `[cache]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CacheFileConfig {
    dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the task service.
    pub api_url: String,
    /// Bearer token; without one the client works offline only.
    pub token: Option<String>,
    /// Signed-in user id. Defaults to the token when unset.
    pub user_id: Option<String>,
    /// Whether the user may list every task.
    pub admin: bool,

    /// Delay before a halted drain is retried.
    pub retry_delay: Duration,
    /// Upper bound on a single service call.
    pub request_timeout: Duration,
    /// Soft failures tolerated per operation before it is dropped.
    pub max_retries: u32,
    /// How often the connectivity monitor probes the service.
    pub probe_interval: Duration,

    /// Directory holding the cache records.
    pub cache_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            api_url: "http://127.0.0.1:3000".to_string(),
            token: None,
            user_id: None,
            admin: false,
            retry_delay: policy.retry_delay,
            request_timeout: policy.request_timeout,
            max_retries: policy.max_retries,
            probe_interval: Duration::from_secs(30),
            cache_dir: default_cache_dir(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit config file cannot be read,
    /// if any config file fails to parse, or if a sync interval is zero.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Rejects zero retry delay, request timeout, and probe interval.
    fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("retry_delay_secs", self.retry_delay),
            ("request_timeout_secs", self.request_timeout),
            ("probe_interval_secs", self.probe_interval),
        ];
        match durations.into_iter().find(|(_, d)| d.is_zero()) {
            Some((key, _)) => Err(ConfigError::ZeroDuration { key }),
            None => Ok(()),
        }
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.server.api_url.clone())
                .unwrap_or(defaults.api_url),
            token: cli.token.clone().or_else(|| file.server.token.clone()),
            user_id: cli.user_id.clone().or_else(|| file.server.user_id.clone()),
            admin: cli.admin || file.server.admin.unwrap_or(defaults.admin),
            retry_delay: file
                .sync
                .retry_delay_secs
                .map_or(defaults.retry_delay, Duration::from_secs),
            request_timeout: file
                .sync
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            max_retries: file.sync.max_retries.unwrap_or(defaults.max_retries),
            probe_interval: file
                .sync
                .probe_interval_secs
                .map_or(defaults.probe_interval, Duration::from_secs),
            cache_dir: cli
                .cache_dir
                .clone()
                .or_else(|| file.cache.dir.clone())
                .unwrap_or(defaults.cache_dir),
        }
    }

    /// Builds the session, if a token is configured.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        let token = self.token.clone().filter(|t| !t.is_empty())?;
        let user_id = self.user_id.clone().unwrap_or_else(|| token.clone());
        Some(Session {
            token,
            user_id,
            is_admin: self.admin,
        })
    }

    /// Retry and timeout settings for the sync engine.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            request_timeout: self.request_timeout,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Offline-first task manager")]
pub struct CliArgs {
    /// Base URL of the task service.
    #[arg(long, env = "TASKFLOW_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the task service.
    #[arg(long, env = "TASKFLOW_TOKEN")]
    pub token: Option<String>,

    /// Your user id (defaults to the token).
    #[arg(long, env = "TASKFLOW_USER_ID")]
    pub user_id: Option<String>,

    /// Sign in as an admin (enables `list --all`).
    #[arg(long)]
    pub admin: bool,

    /// Path to config file (default: `~/.config/taskflow/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the local task cache.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKFLOW_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskflow.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands. Without one, `list` runs.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch and print tasks.
    List {
        /// Every user's tasks (admin only).
        #[arg(long)]
        all: bool,
    },
    /// Create a task.
    Add {
        /// Task title.
        title: String,
        /// Task description.
        #[arg(long, short, default_value = "")]
        description: String,
        /// Due date (free-form, e.g. `2026-05-01`).
        #[arg(long)]
        due: Option<String>,
    },
    /// Change fields of a task.
    Edit {
        /// Task id.
        id: String,
        /// New title.
        #[arg(long)]
        title: Option<String>,
        /// New description.
        #[arg(long)]
        description: Option<String>,
        /// New status (`pending`, `in_progress`, `completed`).
        #[arg(long)]
        status: Option<TaskStatus>,
        /// New due date.
        #[arg(long)]
        due: Option<String>,
    },
    /// Mark a task completed.
    Done {
        /// Task id.
        id: String,
    },
    /// Delete a task.
    Rm {
        /// Task id.
        id: String,
    },
    /// Move the given tasks to the front, in the given order.
    Reorder {
        /// Task ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Set the sort order, or cycle it when no order is given.
    Sort {
        /// `manual`, `asc`, or `desc`.
        order: Option<SortOrder>,
    },
    /// Show queued operations not yet confirmed by the service.
    Pending,
    /// Replay queued operations now.
    Sync,
    /// Watch connectivity and sync events until Ctrl-C.
    Watch,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("taskflow")
}

/// Loads and parses a TOML config file.
///
/// An explicit path must exist. Otherwise the default path is tried and a
/// missing file yields an empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskflow").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

/// Path of the default config file, for help output.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] if the platform has no config directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("taskflow").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}
