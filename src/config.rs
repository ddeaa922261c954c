//! Configuration management for herakles-fleet-monitor.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use clap::ValueEnum;
use herakles_fleet_monitor::{EngineConfig, FetchConfig, HistoryConfig, PollConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8050;
pub const DEFAULT_ROSTER_PATH: &str = "./servers.json";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Effective configuration. Plain values first, nested tables last, so the
/// TOML serializer can emit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Roster and polling
    #[serde(alias = "roster")]
    pub roster_path: Option<PathBuf>,
    #[serde(alias = "refresh-interval-secs")]
    pub refresh_interval_secs: Option<u64>,
    #[serde(alias = "max-concurrent-fetches")]
    pub max_concurrent_fetches: Option<usize>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,

    // Logging
    pub log_level: Option<String>,

    // Fetch timeouts and retry
    #[serde(default)]
    pub fetch: FetchConfig,

    // History buffers
    #[serde(default)]
    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            roster_path: Some(PathBuf::from(DEFAULT_ROSTER_PATH)),
            refresh_interval_secs: Some(DEFAULT_REFRESH_INTERVAL_SECS),
            max_concurrent_fetches: Some(DEFAULT_MAX_CONCURRENT_FETCHES),
            enable_health: Some(true),
            enable_telemetry: Some(true),
            log_level: Some("info".into()),
            fetch: FetchConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Config {
    pub fn roster_path(&self) -> PathBuf {
        self.roster_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROSTER_PATH))
    }

    /// Engine settings with defaults filled in.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            fetch: self.fetch.clone(),
            history: self.history.clone(),
            poll: PollConfig {
                refresh_interval: Duration::from_secs(
                    self.refresh_interval_secs
                        .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS),
                ),
                max_concurrent_fetches: self
                    .max_concurrent_fetches
                    .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
            },
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = cfg.bind.as_deref() {
        bind.parse::<IpAddr>()
            .map_err(|_| format!("Invalid bind address '{}'", bind))?;
    }

    if cfg.port == Some(0) {
        return Err("port must be between 1 and 65535".into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        LogLevel::from_str(level, true)
            .map_err(|_| format!("Invalid log_level '{}'", level))?;
    }

    if cfg.refresh_interval_secs == Some(0) {
        return Err("refresh_interval_secs must be at least 1".into());
    }

    if cfg.max_concurrent_fetches == Some(0) {
        return Err("max_concurrent_fetches must be at least 1".into());
    }

    if cfg.history.capacity == 0 {
        return Err("history.capacity must be at least 1".into());
    }

    if cfg.roster_path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
        return Err("roster_path must not be empty".into());
    }

    let fetch = &cfg.fetch;
    if fetch.retry.max_attempts == 0 {
        return Err("fetch.retry.max_attempts must be at least 1".into());
    }
    if fetch.retry.multiplier < 1.0 {
        return Err(format!(
            "fetch.retry.multiplier must be >= 1.0, got {}",
            fetch.retry.multiplier
        )
        .into());
    }
    if fetch.retry.max_backoff_ms < fetch.retry.initial_backoff_ms {
        return Err("fetch.retry.max_backoff_ms must be >= initial_backoff_ms".into());
    }
    if fetch.health_timeout_secs == 0
        || fetch.metrics_timeout_secs == 0
        || fetch.metrics_connect_timeout_secs == 0
    {
        return Err("fetch timeouts must be at least 1 second".into());
    }
    if fetch.health_timeout_secs >= fetch.metrics_timeout_secs {
        return Err(format!(
            "fetch.health_timeout_secs ({}) must be shorter than metrics_timeout_secs ({})",
            fetch.health_timeout_secs, fetch.metrics_timeout_secs
        )
        .into());
    }

    let needed = fetch.health_timeout() + fetch.worst_case_family();
    if fetch.host_deadline() < needed {
        return Err(format!(
            "fetch.host_deadline_secs ({}) is shorter than one probe plus a full retry schedule ({}s)",
            fetch.host_deadline_secs,
            needed.as_secs()
        )
        .into());
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(roster) = &args.roster {
        config.roster_path = Some(roster.clone());
    }
    if let Some(interval) = args.interval {
        config.refresh_interval_secs = Some(interval);
    }
    if let Some(n) = args.max_concurrent {
        config.max_concurrent_fetches = Some(n);
    }
    if let Some(capacity) = args.history_capacity {
        config.history.capacity = capacity;
    }

    if let Some(level) = args.log_level.as_ref().and_then(|l| l.to_possible_value()) {
        config.log_level = Some(level.get_name().to_string());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/fleet-monitor.yaml",
            "/etc/herakles/fleet-monitor.yml",
            "/etc/herakles/fleet-monitor.json",
            "./herakles-fleet-monitor.yaml",
            "./herakles-fleet-monitor.yml",
            "./herakles-fleet-monitor.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_default()
    };

    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}
