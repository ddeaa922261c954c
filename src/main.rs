//! herakles-fleet-monitor - version 0.1.0
//!
//! Fleet metrics poller with tracing logging.
//! This is the main entry point that initializes the server and handles subcommands.

mod cli;
mod commands;
mod config;
mod handlers;
mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use clap::{Parser, ValueEnum};
use herakles_fleet_monitor::{FleetService, LoadOutcome, PollStats, PollerMetrics};
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::{net::TcpListener, signal};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_hosts, command_poll};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{
    add_host_handler, config_handler, core_history_handler, get_host_handler,
    global_interval_handler, health_handler, host_history_handler, host_interval_handler,
    intent_handler, list_hosts_handler, metrics_handler, poll_handler, remove_host_handler,
    root_handler, set_global_interval_handler, snapshots_handler, update_host_handler,
};
use state::{AppState, SharedState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config) {
    let log_level = config
        .log_level
        .as_deref()
        .and_then(|s| LogLevel::from_str(s, true).ok())
        .unwrap_or(LogLevel::Info);

    let filter = match log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Builds the HTTP routes. Optional endpoints follow the feature flags.
fn build_router(state: SharedState) -> Router {
    let mut app = Router::new()
        .route("/", get(root_handler))
        .route("/config", get(config_handler))
        .route("/hosts", get(list_hosts_handler).post(add_host_handler))
        .route(
            "/hosts/{id}",
            get(get_host_handler)
                .patch(update_host_handler)
                .delete(remove_host_handler),
        )
        .route("/hosts/{id}/history", get(host_history_handler))
        .route("/hosts/{id}/cores/{core}", get(core_history_handler))
        .route("/hosts/{id}/interval", put(host_interval_handler))
        .route(
            "/interval",
            get(global_interval_handler).put(set_global_interval_handler),
        )
        .route("/snapshots", get(snapshots_handler))
        .route("/poll", post(poll_handler))
        .route("/intents", post(intent_handler));

    if state.config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }
    if state.config.enable_telemetry.unwrap_or(true) {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.with_state(state)
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), format.clone(), *commented);
        }

        let config = load_validated_config(&args)?;

        return match command {
            Commands::Check { offline } => command_check(*offline, &config).await,
            Commands::Hosts { action } => command_hosts(action, &config),
            Commands::Poll { iterations, format } => {
                setup_logging(&config);
                command_poll(*iterations, format.clone(), &config).await
            }
            Commands::Config { .. } => unreachable!("Config handled above"),
        };
    }

    // Load configuration for main server mode
    let config = load_validated_config(&args)?;

    setup_logging(&config);

    info!("Starting herakles-fleet-monitor");

    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);

    // Initialize Prometheus metrics registry
    let registry = Registry::new();
    let metrics = PollerMetrics::new(&registry)?;
    let stats = Arc::new(PollStats::new());

    let engine = config.engine();
    let (service, outcome) =
        FleetService::open(config.roster_path(), &engine, metrics, stats.clone())?;
    match outcome {
        LoadOutcome::Loaded { hosts } => info!(
            "Loaded {} hosts from {}",
            hosts,
            service.registry().path().display()
        ),
        LoadOutcome::Created => info!(
            "Created empty roster at {}",
            service.registry().path().display()
        ),
        // Already logged by the service
        LoadOutcome::ResetCorrupt { .. } => {}
    }

    let service = Arc::new(service);
    let driver = service.spawn_driver();

    let state = Arc::new(AppState {
        service,
        registry,
        stats,
        config: Arc::new(config.clone()),
        start_time: Instant::now(),
    });

    // Setup graceful shutdown signal handlers
    let shutdown_signal = async {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
        }
    };

    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(
        "herakles-fleet-monitor listening on http://{}:{}",
        bind_ip_str, port
    );

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
                driver.abort();
                return Err(e.into());
            }
        }
        _ = shutdown_signal => {
            info!("Shutdown signal received, exiting...");
        }
    }

    driver.abort();
    info!("herakles-fleet-monitor stopped gracefully");
    Ok(())
}
