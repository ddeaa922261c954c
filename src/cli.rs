//! CLI arguments and subcommands for herakles-fleet-monitor.
//!
//! Server flags override the config file; subcommands operate on the roster
//! and the engine without starting the HTTP server.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Verbosity of the fmt subscriber
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-fleet-monitor",
    about = "Fleet metrics poller for hosts exposing the herakles metrics API",
    long_about = "Fleet metrics poller for hosts exposing the herakles metrics API.\n\n\
                  Periodically health-probes every registered host, fetches CPU, RAM and log \
                  metrics with retry and backoff, aggregates per-core CPU usage and keeps a \
                  bounded rolling history per host. Snapshots, history and roster management \
                  are served as JSON over HTTP.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/cansp-dev/herakles-fleet-monitor | More info: https://www.herakles.now | Support: exporter@herakles.now"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides log_level from the config file)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Host roster file (JSON)
    #[arg(short = 'r', long)]
    pub roster: Option<PathBuf>,

    /// Seconds between poll cycles
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Maximum number of hosts fetched concurrently
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Samples kept per history series
    #[arg(long)]
    pub history_capacity: Option<usize>,

    /// Disable /health endpoint
    #[arg(long)]
    pub disable_health: bool,

    /// Disable /metrics poller telemetry
    #[arg(long)]
    pub disable_telemetry: bool,
}

/// Roster subcommands
#[derive(Subcommand, Debug)]
pub enum HostsCommand {
    /// List registered hosts
    List {
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Register a host
    Add {
        /// IP address or hostname of the metrics API
        address: String,

        /// Port of the metrics API
        #[arg(long, default_value_t = 8000)]
        port: u16,

        /// Display name
        #[arg(long)]
        nickname: String,

        /// Machine hostname
        #[arg(long)]
        hostname: String,
    },

    /// Remove a host by id (address:port)
    Remove { id: String },
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration, load the roster and probe every host
    Check {
        /// Skip probing hosts
        #[arg(long)]
        offline: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Manage the host roster
    Hosts {
        #[command(subcommand)]
        action: HostsCommand,
    },

    /// Run poll cycles once and print the snapshot set
    Poll {
        /// Number of cycles
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}
