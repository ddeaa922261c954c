//! CLI command implementations for herakles-fleet-monitor.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Configuration, roster and host reachability check
//! - `config`: Configuration file generation
//! - `hosts`: Roster management
//! - `poll`: One-shot poll cycles

pub mod check;
pub mod config;
pub mod hosts;
pub mod poll;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use hosts::command_hosts;
pub use poll::command_poll;
