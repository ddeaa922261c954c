//! Hosts command implementation.
//!
//! Lists and edits the roster file without starting the server.

use herakles_fleet_monitor::{Host, HostId, LoadOutcome, Registry};
use serde::Serialize;

use crate::cli::{ConfigFormat, HostsCommand};
use crate::commands::poll::render_output;
use crate::config::Config;

#[derive(Serialize)]
struct HostList {
    hosts: Vec<Host>,
}

/// Operates on the roster through the registry.
pub fn command_hosts(action: &HostsCommand, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (registry, outcome) = Registry::open(config.roster_path())?;
    if let LoadOutcome::ResetCorrupt { reason } = outcome {
        eprintln!("⚠️  Roster was unreadable and has been reset: {}", reason);
    }

    match action {
        HostsCommand::List { format } => {
            let list = HostList {
                hosts: registry.list().into_iter().map(|(_, host)| host).collect(),
            };
            if list.hosts.is_empty() && matches!(format, ConfigFormat::Yaml) {
                println!("No hosts registered in {}", registry.path().display());
                return Ok(());
            }
            print!("{}", render_output(&list, format)?);
        }
        HostsCommand::Add {
            address,
            port,
            nickname,
            hostname,
        } => {
            let id = registry.add(address, *port, nickname, hostname)?;
            println!("✅ Registered {} ({})", id, nickname.trim());
        }
        HostsCommand::Remove { id } => {
            let id = HostId::from(id.as_str());
            if registry.remove(&id)? {
                println!("✅ Removed {}", id);
            } else {
                println!("ℹ️  {} is not registered", id);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> Config {
        Config {
            roster_path: Some(dir.path().join("servers.json")),
            ..Config::default()
        }
    }

    #[test]
    fn test_add_then_remove() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);

        command_hosts(
            &HostsCommand::Add {
                address: "10.0.0.5".into(),
                port: 8000,
                nickname: "web1".into(),
                hostname: "host5".into(),
            },
            &cfg,
        )
        .unwrap();

        let (registry, _) = Registry::open(cfg.roster_path()).unwrap();
        assert_eq!(registry.len(), 1);

        command_hosts(
            &HostsCommand::Remove {
                id: "10.0.0.5:8000".into(),
            },
            &cfg,
        )
        .unwrap();

        let (registry, _) = Registry::open(cfg.roster_path()).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_add_fails() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let result = command_hosts(
            &HostsCommand::Add {
                address: "300.1.1.1".into(),
                port: 8000,
                nickname: "web1".into(),
                hostname: "host".into(),
            },
            &cfg,
        );
        assert!(result.is_err());
    }
}
