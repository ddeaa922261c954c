//! Check command implementation.
//!
//! Validates configuration, loads the roster and probes every host.

use futures::future::join_all;
use herakles_fleet_monitor::{Fetcher, LoadOutcome, Registry};

use crate::config::{validate_effective_config, Config};

/// Validates configuration, roster and host reachability.
pub async fn command_check(offline: bool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Fleet Monitor - System Check");
    println!("========================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    let roster_path = config.roster_path();
    println!("\n📁 Checking roster {}...", roster_path.display());
    let registry = match Registry::open(&roster_path) {
        Ok((registry, outcome)) => {
            match outcome {
                LoadOutcome::Loaded { hosts } => println!("   ✅ Loaded {} hosts", hosts),
                LoadOutcome::Created => println!("   ✅ Roster did not exist, created an empty one"),
                LoadOutcome::ResetCorrupt { reason } => {
                    println!("   ⚠️  Roster was unreadable and has been reset: {}", reason);
                }
            }
            Some(registry)
        }
        Err(e) => {
            println!("   ❌ Cannot open roster: {}", e);
            all_ok = false;
            None
        }
    };

    if let Some(registry) = registry.filter(|r| !offline && !r.is_empty()) {
        println!("\n🌐 Probing hosts...");
        let fetcher = Fetcher::new(&config.fetch)?;
        let hosts = registry.list();
        let probes = hosts.iter().map(|(_, host)| fetcher.probe(host));
        let results = join_all(probes).await;

        let mut reachable = 0usize;
        for ((id, host), result) in hosts.iter().zip(results) {
            match result {
                Ok(()) => {
                    reachable += 1;
                    println!("   ✅ {} ({}) is reachable", id, host.nickname);
                }
                Err(e) => println!("   ❌ {} ({}): {}", id, host.nickname, e),
            }
        }
        println!("   {} of {} hosts reachable", reachable, hosts.len());
        if reachable < hosts.len() {
            all_ok = false;
        }
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - fleet monitor is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}
