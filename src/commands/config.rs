//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = match output {
        Some(path) => path,
        None => PathBuf::from("herakles-fleet-monitor.yaml"),
    };

    let mut content = render_config(&config, &format)?;
    if commented {
        content = match format {
            ConfigFormat::Yaml | ConfigFormat::Toml => add_config_comments(content),
            // JSON has no comment syntax
            ConfigFormat::Json => content,
        };
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML or TOML configuration. Both use `#`.
fn add_config_comments(body: String) -> String {
    let comments = r#"# Herakles Fleet Monitor Configuration
# ====================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"                 # Bind IP (0.0.0.0 = all interfaces)
# port: 8050                      # HTTP port of the JSON API
#
# Roster and Polling
# ------------------
# roster_path: "./servers.json"   # Host roster, rewritten atomically on every change
# refresh_interval_secs: 3        # Seconds between poll cycles
# max_concurrent_fetches: 8       # Hosts fetched in parallel
#
# Feature Flags
# -------------
# enable_health: true             # Enable /health endpoint
# enable_telemetry: true          # Enable /metrics (poller self-metrics)
#
# Logging
# -------
# log_level: "info"               # off, error, warn, info, debug, trace
#
# Fetch
# -----
# fetch.health_timeout_secs: 5           # Health probe timeout
# fetch.metrics_connect_timeout_secs: 5  # Connect timeout for metric families
# fetch.metrics_timeout_secs: 10         # Total timeout per metric request
# fetch.host_deadline_secs: 60           # Upper bound for one host per cycle
# fetch.retry.max_attempts: 3            # Attempts per metric family
# fetch.retry.initial_backoff_ms: 1000   # Wait before the first retry
# fetch.retry.multiplier: 2.0            # Backoff growth per retry
# fetch.retry.max_backoff_ms: 8000       # Backoff cap
# fetch.retry.jitter: false              # Randomize backoff
#
# History
# -------
# history.capacity: 50            # Samples kept per series (FIFO)
"#;

    format!("{comments}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generated_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Herakles Fleet Monitor Configuration"));

        let loaded = crate::config::load_config(path.to_str()).unwrap();
        assert_eq!(loaded.port, Some(8050));
        assert_eq!(loaded.history.capacity, 50);
    }

    #[test]
    fn test_generated_toml_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet.toml");
        command_config(Some(path.clone()), ConfigFormat::Toml, false).unwrap();

        let loaded = crate::config::load_config(path.to_str()).unwrap();
        assert_eq!(loaded.fetch.retry.max_attempts, 3);
    }
}
