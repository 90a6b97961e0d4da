//! Configuration loading for the coordination core
//!
//! # Settings Sources Priority
//!
//! 1. Explicit path (command-line argument)
//! 2. `CADENCE_CONFIG` environment variable
//! 3. Platform config file (`<config_dir>/cadence/config.toml`)
//! 4. Built-in defaults (code constants)
//!
//! Individual `CADENCE_*` environment variables are applied on top of
//! whatever the file provided. A missing file is not an error: the core logs
//! a warning and starts with defaults. A malformed file is an error.

use crate::time::{optional_period, period};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CADENCE_CONFIG";

/// Complete configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct CadenceConfig {
    pub scheduler: SchedulerSettings,
    pub registry: RegistrySettings,
    pub logging: LoggingConfig,
}

/// Deferred execution scheduler settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Immediate queue tick (ms)
    pub update_interval_ms: u64,
    /// Tasks drained from the batch queue per batch tick
    pub batch_size: usize,
    /// Batch queue tick (ms)
    pub batch_interval_ms: u64,
    /// Delayed queue deadline check (ms)
    pub delayed_interval_ms: u64,
    /// Bound on each queue's pending task count
    pub max_queue_size: usize,
    /// Statistics snapshot period (ms); 0 disables
    pub stats_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            update_interval_ms: 16,
            batch_size: 10,
            batch_interval_ms: 100,
            delayed_interval_ms: 100,
            max_queue_size: 1000,
            stats_interval_ms: 0,
        }
    }
}

impl SchedulerSettings {
    pub fn update_interval(&self) -> Duration {
        period(self.update_interval_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        period(self.batch_interval_ms)
    }

    pub fn delayed_interval(&self) -> Duration {
        period(self.delayed_interval_ms)
    }

    /// `None` when periodic statistics are disabled
    pub fn stats_interval(&self) -> Option<Duration> {
        optional_period(self.stats_interval_ms)
    }
}

/// Component registry and event bus settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistrySettings {
    /// Event queue drain period (ms)
    pub event_interval_ms: u64,
    /// Liveness sweep period (ms)
    pub liveness_interval_ms: u64,
    /// Performance sample period (ms), only used when monitoring is on
    pub performance_interval_ms: u64,
    pub performance_monitoring: bool,
    /// Bound on queued integration events
    pub max_event_queue_size: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            event_interval_ms: 10,
            liveness_interval_ms: 1000,
            performance_interval_ms: 5000,
            performance_monitoring: false,
            max_event_queue_size: 1000,
        }
    }
}

impl RegistrySettings {
    pub fn event_interval(&self) -> Duration {
        period(self.event_interval_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        period(self.liveness_interval_ms)
    }

    /// `None` when performance monitoring is off
    pub fn performance_interval(&self) -> Option<Duration> {
        optional_period(self.performance_interval_ms).filter(|_| self.performance_monitoring)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CadenceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CadenceConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve, load, override and validate configuration
    ///
    /// `explicit` is the path given on the command line, if any. An explicit
    /// path that does not exist is an error; an absent default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            Some(path) if explicit.is_some() => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("No config location available, using built-in defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply individual `CADENCE_*` environment overrides
    ///
    /// Unparsable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_override::<u64>("CADENCE_UPDATE_INTERVAL_MS") {
            self.scheduler.update_interval_ms = v;
        }
        if let Some(v) = env_override::<usize>("CADENCE_BATCH_SIZE") {
            self.scheduler.batch_size = v;
        }
        if let Some(v) = env_override::<usize>("CADENCE_MAX_QUEUE_SIZE") {
            self.scheduler.max_queue_size = v;
        }
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        let r = &self.registry;

        let intervals = [
            ("scheduler.update_interval_ms", s.update_interval_ms),
            ("scheduler.batch_interval_ms", s.batch_interval_ms),
            ("scheduler.delayed_interval_ms", s.delayed_interval_ms),
            ("registry.event_interval_ms", r.event_interval_ms),
            ("registry.liveness_interval_ms", r.liveness_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }

        if r.performance_monitoring && r.performance_interval_ms == 0 {
            return Err(Error::Config(
                "registry.performance_interval_ms must be greater than 0 when monitoring is enabled"
                    .to_string(),
            ));
        }
        if s.batch_size == 0 {
            return Err(Error::Config("scheduler.batch_size must be greater than 0".to_string()));
        }
        if s.max_queue_size == 0 {
            return Err(Error::Config(
                "scheduler.max_queue_size must be greater than 0".to_string(),
            ));
        }
        if r.max_event_queue_size == 0 {
            return Err(Error::Config(
                "registry.max_event_queue_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pick the config file location following the priority order
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path()
}

/// `<config_dir>/cadence/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadence").join("config.toml"))
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => {
            debug!("{} override applied: {}", name, raw);
            Some(v)
        }
        Err(_) => {
            warn!("Ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}
