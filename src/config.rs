//! Configuration for the analytics engine and CLI
//!
//! Values are resolved in this order, later sources winning:
//! 1. Built-in defaults
//! 2. The first config file found (`./claude-analytics.toml`,
//!    `./.claude-analytics.toml`, `<config_dir>/claude-analytics/config.toml`)
//! 3. Environment variables (`LOG_*`, `CLAUDE_ANALYTICS_*`, `CLAUDE_HOME`)
//!
//! The merged result is validated before use.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Worker pool and I/O configuration
    pub processing: ProcessingConfig,

    /// Thresholds used by the analytics engine
    pub analytics: AnalyticsConfig,

    /// Derived-state cache configuration
    pub cache: CacheConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub max_concurrency: usize,
    pub file_timeout_secs: u64,
    pub buffer_size_kb: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub session_window_hours: i64,
    pub status_square_count: usize,
    pub recent_message_count: usize,
    pub active_threshold_mins: i64,
    pub recent_threshold_mins: i64,
    pub project_active_hours: i64,
    pub project_recent_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub claude_home: PathBuf,
    pub log_directory: PathBuf,
}

impl PathsConfig {
    /// Directory scanned when no explicit root is given
    pub fn projects_dir(&self) -> PathBuf {
        self.claude_home.join("projects")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "WARN".to_string(),
                format: "pretty".to_string(),
                output: "console".to_string(),
            },
            processing: ProcessingConfig {
                max_concurrency: 8,
                file_timeout_secs: 30,
                buffer_size_kb: 64,
            },
            analytics: AnalyticsConfig {
                session_window_hours: 5,
                status_square_count: 10,
                recent_message_count: 5,
                active_threshold_mins: 5,
                recent_threshold_mins: 60,
                project_active_hours: 1,
                project_recent_hours: 24,
            },
            cache: CacheConfig { enabled: true },
            paths: PathsConfig {
                claude_home: dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".claude"),
                log_directory: PathBuf::from("logs"),
            },
        }
    }
}

impl Config {
    /// Defaults, then the first config file found, then the environment
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            PathBuf::from("claude-analytics.toml"),
            PathBuf::from(".claude-analytics.toml"),
            dirs::config_dir()
                .map(|d| d.join("claude-analytics").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("CLAUDE_ANALYTICS_MAX_CONCURRENCY") {
            self.processing.max_concurrency = val
                .parse()
                .context("Invalid CLAUDE_ANALYTICS_MAX_CONCURRENCY")?;
        }
        if let Ok(val) = env::var("CLAUDE_ANALYTICS_FILE_TIMEOUT_SECS") {
            self.processing.file_timeout_secs = val
                .parse()
                .context("Invalid CLAUDE_ANALYTICS_FILE_TIMEOUT_SECS")?;
        }
        if let Ok(val) = env::var("CLAUDE_ANALYTICS_BUFFER_SIZE_KB") {
            self.processing.buffer_size_kb = val
                .parse()
                .context("Invalid CLAUDE_ANALYTICS_BUFFER_SIZE_KB")?;
        }

        if let Ok(val) = env::var("CLAUDE_ANALYTICS_SESSION_WINDOW_HOURS") {
            self.analytics.session_window_hours = val
                .parse()
                .context("Invalid CLAUDE_ANALYTICS_SESSION_WINDOW_HOURS")?;
        }

        if let Ok(val) = env::var("CLAUDE_ANALYTICS_CACHE_ENABLED") {
            self.cache.enabled = val
                .parse()
                .context("Invalid CLAUDE_ANALYTICS_CACHE_ENABLED")?;
        }

        if let Ok(val) = env::var("CLAUDE_HOME") {
            self.paths.claude_home = PathBuf::from(val);
        }
        if let Ok(val) = env::var("CLAUDE_ANALYTICS_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.processing.max_concurrency == 0 {
            return Err(anyhow::anyhow!("Max concurrency must be greater than 0"));
        }

        if self.processing.max_concurrency > 256 {
            warn!(
                max_concurrency = self.processing.max_concurrency,
                "Very high concurrency for an I/O bound scan"
            );
        }

        if self.processing.file_timeout_secs == 0 {
            return Err(anyhow::anyhow!("File timeout must be greater than 0 seconds"));
        }

        if self.processing.buffer_size_kb < 1 || self.processing.buffer_size_kb > 1024 {
            return Err(anyhow::anyhow!(
                "Buffer size must be between 1KB and 1024KB, got {}KB",
                self.processing.buffer_size_kb
            ));
        }

        let analytics = &self.analytics;
        if analytics.session_window_hours <= 0 {
            return Err(anyhow::anyhow!("Session window must be a positive number of hours"));
        }
        if analytics.status_square_count == 0 {
            return Err(anyhow::anyhow!("Status square count must be greater than 0"));
        }
        if analytics.active_threshold_mins < 0
            || analytics.recent_threshold_mins < analytics.active_threshold_mins
        {
            return Err(anyhow::anyhow!(
                "Activity thresholds must satisfy 0 <= active ({}) <= recent ({})",
                analytics.active_threshold_mins,
                analytics.recent_threshold_mins
            ));
        }
        if analytics.project_active_hours < 0
            || analytics.project_recent_hours < analytics.project_active_hours
        {
            return Err(anyhow::anyhow!(
                "Project thresholds must satisfy 0 <= active ({}) <= recent ({})",
                analytics.project_active_hours,
                analytics.project_recent_hours
            ));
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load configuration, using defaults");
            Config::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "WARN");
        assert_eq!(config.processing.max_concurrency, 8);
        assert_eq!(config.analytics.session_window_hours, 5);
        assert_eq!(config.analytics.status_square_count, 10);
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_projects_dir() {
        let mut config = Config::default();
        config.paths.claude_home = PathBuf::from("/tmp/claude");
        assert_eq!(config.paths.projects_dir(), PathBuf::from("/tmp/claude/projects"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.processing.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analytics.session_window_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analytics.recent_threshold_mins = 1;
        assert!(config.validate().is_err());
    }
}
