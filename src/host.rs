//! Host records owned by the registry.
//!
//! A host is identified by `address:port`. The identifier never changes for
//! the lifetime of the record; nickname, hostname and the observed info may.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter handing out registration generations.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Returns a generation number never handed out before in this process.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Unique host identifier, always `address:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(address: &str, port: u16) -> Self {
        Self(format!("{}:{}", address, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Last observed CPU topology of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub cores: usize,
}

/// Memory figures in MB as reported by `/metrics/v1/ram/info`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RamInfo {
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub used: f64,
    #[serde(default)]
    pub available: f64,
    #[serde(default)]
    pub free: f64,
}

/// A registered remote machine.
///
/// Equality compares the persisted fields only, so a record reloaded from
/// the roster equals the one that was written.
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub id: HostId,
    pub address: String,
    pub port: u16,
    pub nickname: String,
    pub hostname: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub cpu_info: Option<CpuInfo>,
    pub ram_info: Option<RamInfo>,
    /// Registration generation. Not persisted; a host removed and added again
    /// under the same id gets a new generation.
    #[serde(skip)]
    pub generation: u64,
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.address == other.address
            && self.port == other.port
            && self.nickname == other.nickname
            && self.hostname == other.hostname
            && self.last_seen == other.last_seen
            && self.cpu_info == other.cpu_info
            && self.ram_info == other.ram_info
    }
}

impl Host {
    pub fn new(address: &str, port: u16, nickname: &str, hostname: &str) -> Self {
        Self {
            id: HostId::new(address, port),
            address: address.to_string(),
            port,
            nickname: nickname.to_string(),
            hostname: hostname.to_string(),
            last_seen: None,
            cpu_info: None,
            ram_info: None,
            generation: next_generation(),
        }
    }

    /// Base URL of the host's metrics API.
    pub fn base_url(&self) -> String {
        if self.address.contains(':') {
            format!("http://[{}]:{}", self.address, self.port)
        } else {
            format!("http://{}:{}", self.address, self.port)
        }
    }
}
