//! Poll command implementation.
//!
//! Runs poll cycles against the roster and prints the resulting snapshot set.

use herakles_fleet_monitor::{FleetService, PollStats, PollerMetrics};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::ConfigFormat;
use crate::config::Config;

/// Serializes command output in the requested format.
pub fn render_output<T: Serialize>(
    value: &T,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(value)? + "\n",
        ConfigFormat::Toml => toml::to_string_pretty(value)?,
        ConfigFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Runs `iterations` cycles, waiting one refresh interval in between.
pub async fn command_poll(
    iterations: usize,
    format: ConfigFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = config.engine();
    let (service, _) = FleetService::open(
        config.roster_path(),
        &engine,
        PollerMetrics::detached()?,
        Arc::new(PollStats::new()),
    )?;

    if service.registry().is_empty() {
        eprintln!(
            "ℹ️  No hosts registered in {}",
            service.registry().path().display()
        );
        return Ok(());
    }

    let iterations = iterations.max(1);
    for iteration in 1..=iterations {
        let start = Instant::now();
        let set = service.poll_now().await;
        eprintln!(
            "🔄 Cycle {}/{}: {} of {} hosts healthy in {:.2}s",
            iteration,
            iterations,
            set.healthy(),
            set.hosts.len(),
            start.elapsed().as_secs_f64()
        );
        if iteration == iterations {
            print!("{}", render_output(&set, &format)?);
        } else {
            tokio::time::sleep(engine.poll.refresh_interval).await;
        }
    }

    Ok(())
}
