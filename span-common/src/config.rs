//! Bootstrap configuration and cache directory resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables (`SPAN_CONFIG`, `SPAN_CACHE_DIR`)
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing default TOML file is not an error; an explicitly named one is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the TOML configuration file
pub const CONFIG_ENV_VAR: &str = "SPAN_CONFIG";

/// Environment variable naming the holdings cache directory
pub const CACHE_DIR_ENV_VAR: &str = "SPAN_CACHE_DIR";

/// Source preference used for deduplication, most preferred first
pub const DEFAULT_PREFERENCES: &str = "85 55 89 60 50 105 34 101 53 49 28 48 121";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Holdings cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub holdings: HoldingsConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub dedup: DedupConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Holdings download and refresh settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldingsConfig {
    /// Re-download cached files older than this many days (never, if unset)
    #[serde(default)]
    pub max_age_days: Option<u64>,

    /// Maximum download attempts per holdings file
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// First backoff delay between attempts
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the backoff delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HoldingsConfig {
    fn default() -> Self {
        Self {
            max_age_days: None,
            retries: default_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    /// Number of workers (defaults to available parallelism)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Records per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: None,
            batch_size: default_batch_size(),
        }
    }
}

/// Index deduplication settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DedupConfig {
    /// Search index server; deduplication is off when unset
    #[serde(default)]
    pub server: Option<String>,

    /// Whitespace separated source IDs, most preferred first
    #[serde(default = "default_preferences")]
    pub preferences: String,

    /// Ignore index documents carrying the record's own ID
    #[serde(default)]
    pub ignore_same_identifier: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            server: None,
            preferences: default_preferences(),
            ignore_same_identifier: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    20_000
}

fn default_preferences() -> String {
    DEFAULT_PREFERENCES.to_string()
}

impl TomlConfig {
    /// Load configuration from an explicit path, `SPAN_CONFIG`, or the
    /// platform default location, in that order.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML file; a missing or malformed file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }
}

/// Platform location of the TOML file, e.g. `~/.config/span/span.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("span").join("span.toml"))
}

/// Holdings cache directory resolution
///
/// Priority: CLI argument, `SPAN_CACHE_DIR`, TOML `cache_dir`, platform
/// cache directory, `./.span-cache`.
pub struct CacheDirResolver<'a> {
    cli_arg: Option<&'a Path>,
    toml: &'a TomlConfig,
}

impl<'a> CacheDirResolver<'a> {
    pub fn new(cli_arg: Option<&'a Path>, toml: &'a TomlConfig) -> Self {
        Self { cli_arg, toml }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = self.cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(CACHE_DIR_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml.cache_dir {
            return path.clone();
        }

        dirs::cache_dir()
            .map(|d| d.join("span"))
            .unwrap_or_else(|| PathBuf::from(".span-cache"))
    }
}
