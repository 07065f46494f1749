//! Configuration management for the visit tracker.
//!
//! Loads configuration from TOML files and provides runtime defaults. The
//! configuration is read once at startup and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether tracking is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum dwell before a visit qualifies; also the re-evaluation interval
    #[serde(default = "default_min_visit")]
    pub min_visit_seconds: u64,

    /// Seconds of inactivity before the user is considered idle
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_seconds: u64,

    /// Wait after navigation-complete before evaluating the tab
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Wait before capturing a tab that just lost focus
    #[serde(default = "default_capture_defer")]
    pub capture_defer_ms: u64,

    /// Upper bound on a single page content request
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_ms: u64,

    /// Upper bound on any other host call
    #[serde(default = "default_host_call_timeout")]
    pub host_call_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_visit_seconds: 20 * 60,
            idle_threshold_seconds: 30,
            settle_delay_ms: 5000,
            capture_defer_ms: 2000,
            capture_timeout_ms: 15_000,
            host_call_timeout_ms: 10_000,
        }
    }
}

impl TimingConfig {
    pub fn min_visit(&self) -> Duration {
        Duration::from_secs(self.min_visit_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn capture_defer(&self) -> Duration {
        Duration::from_millis(self.capture_defer_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn host_call_timeout(&self) -> Duration {
        Duration::from_millis(self.host_call_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Trailing window of browser history attached to each record
    #[serde(default = "default_history_window")]
    pub history_window_hours: u64,

    /// Cap on history entries per record
    #[serde(default = "default_history_max")]
    pub history_max_results: u32,

    /// Number of top sites attached to each record
    #[serde(default = "default_top_sites")]
    pub top_sites_limit: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            history_window_hours: 24,
            history_max_results: 1000,
            top_sites_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Visit ingestion endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Timeout for the POST
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_seconds: 10,
        }
    }
}

impl IngestionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// URL ignore rules. Everything is tracked unless a rule matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Glob patterns matched against the full URL
    #[serde(default)]
    pub ignored_url_patterns: Vec<String>,

    /// Domains ignored together with their subdomains
    #[serde(default)]
    pub ignored_domains: Vec<String>,

    /// URL schemes to ignore (e.g. "chrome", "about")
    #[serde(default)]
    pub ignored_schemes: Vec<String>,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_min_visit() -> u64 {
    20 * 60
}

fn default_idle_threshold() -> u64 {
    30
}

fn default_settle_delay() -> u64 {
    5000
}

fn default_capture_defer() -> u64 {
    2000
}

fn default_capture_timeout() -> u64 {
    15_000
}

fn default_host_call_timeout() -> u64 {
    10_000
}

fn default_history_window() -> u64 {
    24
}

fn default_history_max() -> u32 {
    1000
}

fn default_top_sites() -> usize {
    5
}

fn default_endpoint() -> String {
    "http://localhost:8000/visit".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("visit-tracker")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}
