//! Durable host registry.
//!
//! The registry owns every `Host` record and its on-disk roster. Each
//! mutation is followed by an atomic write: the full roster is serialized to a
//! sibling temporary file which then replaces the canonical file with a
//! rename, so readers observe either the old or the new content.
//!
//! Poll results (`record_poll`) only update memory and mark the roster dirty;
//! `sync_with_disk` writes them once per cycle. Other processes (the `hosts`
//! subcommand) may edit the same file, so before every write the registry
//! compares the file against the fingerprint of the content it last read or
//! wrote and merges any foreign change first.
//!
//! Roster format (a JSON object keyed by host id, in insertion order):
//!
//! ```json
//! {
//!   "10.0.0.5:8000": {
//!     "ip": "10.0.0.5", "port": 8000, "nickname": "web1", "hostname": "host5",
//!     "last_seen": "2024-05-01T12:00:00Z", "cpu_info": {"cores": 4},
//!     "ram_info": {"total": 8192.0, "used": 4096.0, "available": 4096.0, "free": 2048.0}
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, ValidationError};
use crate::host::{CpuInfo, Host, HostId, RamInfo};

/// Port assumed for roster records written without one.
pub const DEFAULT_HOST_PORT: u16 = 8000;

static DOTTED_QUAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").expect("static regex"));

/// On-disk form of a single host.
#[derive(Debug, Serialize, Deserialize)]
struct HostRecord {
    ip: String,
    #[serde(default = "default_host_port")]
    port: u16,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    cpu_info: Option<CpuInfo>,
    #[serde(default)]
    ram_info: Option<RamInfo>,
}

fn default_host_port() -> u16 {
    DEFAULT_HOST_PORT
}

impl From<&Host> for HostRecord {
    fn from(h: &Host) -> Self {
        Self {
            ip: h.address.clone(),
            port: h.port,
            nickname: h.nickname.clone(),
            hostname: h.hostname.clone(),
            last_seen: h.last_seen,
            cpu_info: h.cpu_info,
            ram_info: h.ram_info,
        }
    }
}

impl From<HostRecord> for Host {
    fn from(r: HostRecord) -> Self {
        let mut host = Host::new(&r.ip, r.port, &r.nickname, &r.hostname);
        host.last_seen = r.last_seen;
        host.cpu_info = r.cpu_info;
        host.ram_info = r.ram_info;
        host
    }
}

/// Insertion-ordered host list read from a JSON object.
#[derive(Debug, Default)]
struct Roster(Vec<Host>);

impl<'de> Deserialize<'de> for Roster {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RosterVisitor;

        impl<'de> Visitor<'de> for RosterVisitor {
            type Value = Roster;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of host id to host record")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Roster, A::Error> {
                let mut hosts: Vec<Host> = Vec::new();
                while let Some((key, record)) = access.next_entry::<String, HostRecord>()? {
                    let host = Host::from(record);
                    if host.id.as_str() != key {
                        warn!(
                            "Roster key '{}' does not match its record, using '{}'",
                            key, host.id
                        );
                    }
                    if hosts.iter().any(|h| h.id == host.id) {
                        warn!("Duplicate roster entry for {}, keeping the first", host.id);
                        continue;
                    }
                    hosts.push(host);
                }
                Ok(Roster(hosts))
            }
        }

        deserializer.deserialize_map(RosterVisitor)
    }
}

/// How the roster was obtained when the registry was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Existing roster parsed successfully.
    Loaded { hosts: usize },
    /// No roster existed; an empty one was written.
    Created,
    /// Roster content was unreadable and has been replaced by an empty one.
    ResetCorrupt { reason: String },
}

/// Durable mapping from host id to host configuration.
pub struct Registry {
    path: PathBuf,
    hosts: RwLock<Vec<Host>>,
    /// Serializes file access. Holds the fingerprint of the roster content
    /// this registry last read or wrote.
    disk: Mutex<Option<u64>>,
    hasher: ahash::RandomState,
    /// Set when memory holds poll results not yet written.
    dirty: AtomicBool,
}

impl Registry {
    /// Opens the roster at `path`.
    ///
    /// A missing roster is initialized empty and written. A roster that does
    /// not parse is logged at warning level, reset to empty and overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, LoadOutcome), RegistryError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| RegistryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let hasher = ahash::RandomState::new();
        let mut fingerprint = None;

        let (roster, outcome) = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Roster>(&content) {
                Ok(roster) => {
                    info!("Loaded {} hosts from {}", roster.0.len(), path.display());
                    fingerprint = Some(hash_bytes(&hasher, content.as_bytes()));
                    let hosts = roster.0.len();
                    (roster, LoadOutcome::Loaded { hosts })
                }
                Err(e) => {
                    warn!(
                        "Roster {} is corrupt ({}), resetting to an empty roster",
                        path.display(),
                        e
                    );
                    (
                        Roster::default(),
                        LoadOutcome::ResetCorrupt {
                            reason: e.to_string(),
                        },
                    )
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No roster at {}, starting empty", path.display());
                (Roster::default(), LoadOutcome::Created)
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };

        if !matches!(outcome, LoadOutcome::Loaded { .. }) {
            let json = serde_json::to_string_pretty(&RosterRef(&roster.0))?;
            write_atomic(&path, json.as_bytes())?;
            fingerprint = Some(hash_bytes(&hasher, json.as_bytes()));
        }

        Ok((
            Self {
                path,
                hosts: RwLock::new(roster.0),
                disk: Mutex::new(fingerprint),
                hasher,
                dirty: AtomicBool::new(false),
            },
            outcome,
        ))
    }

    /// Location of the canonical roster file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers a new host and persists the roster.
    pub fn add(
        &self,
        address: &str,
        port: u16,
        nickname: &str,
        hostname: &str,
    ) -> Result<HostId, RegistryError> {
        let address = address.trim();
        let nickname = nickname.trim();
        let hostname = hostname.trim();
        validate_fields(address, port, nickname, hostname)?;

        let mut disk = self.lock_disk();
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        self.reconcile(&mut hosts, &mut disk);

        let host = Host::new(address, port, nickname, hostname);
        if hosts.iter().any(|h| h.id == host.id) {
            return Err(ValidationError::Duplicate(host.id.to_string()).into());
        }

        let id = host.id.clone();
        hosts.push(host);
        if let Err(e) = self.persist(&hosts, &mut disk) {
            hosts.pop();
            return Err(e);
        }

        info!("Registered host {} ({})", id, nickname);
        Ok(id)
    }

    /// Removes a host. Unknown ids are a no-op and return `false`.
    pub fn remove(&self, id: &HostId) -> Result<bool, RegistryError> {
        let mut disk = self.lock_disk();
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        self.reconcile(&mut hosts, &mut disk);

        let Some(index) = hosts.iter().position(|h| &h.id == id) else {
            debug!("Remove requested for unknown host {}", id);
            return Ok(false);
        };

        let removed = hosts.remove(index);
        if let Err(e) = self.persist(&hosts, &mut disk) {
            hosts.insert(index, removed);
            return Err(e);
        }

        info!("Removed host {}", id);
        Ok(true)
    }

    /// Changes the mutable labels of a host. `None` keeps the current value.
    pub fn update_labels(
        &self,
        id: &HostId,
        nickname: Option<&str>,
        hostname: Option<&str>,
    ) -> Result<bool, RegistryError> {
        let nickname = nickname.map(str::trim);
        let hostname = hostname.map(str::trim);
        if nickname.is_some_and(str::is_empty) {
            return Err(ValidationError::BlankField("nickname").into());
        }
        if hostname.is_some_and(str::is_empty) {
            return Err(ValidationError::BlankField("hostname").into());
        }

        let mut disk = self.lock_disk();
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        self.reconcile(&mut hosts, &mut disk);

        let Some(host) = hosts.iter_mut().find(|h| &h.id == id) else {
            return Ok(false);
        };

        let previous = (host.nickname.clone(), host.hostname.clone());
        if let Some(n) = nickname {
            host.nickname = n.to_string();
        }
        if let Some(h) = hostname {
            host.hostname = h.to_string();
        }

        if let Err(e) = self.persist(&hosts, &mut disk) {
            if let Some(host) = hosts.iter_mut().find(|h| &h.id == id) {
                (host.nickname, host.hostname) = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    pub fn get(&self, id: &HostId) -> Option<Host> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|h| &h.id == id)
            .cloned()
    }

    /// All hosts in insertion order.
    pub fn list(&self) -> Vec<(HostId, Host)> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|h| (h.id.clone(), h.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hosts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Updates `last_seen` and persists. Persistence failures are logged,
    /// never returned; the update then stays pending for `sync_with_disk`.
    /// Returns `false` if the host is unknown.
    pub fn touch_last_seen(&self, id: &HostId, timestamp: DateTime<Utc>) -> bool {
        let mut disk = self.lock_disk();
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        self.reconcile(&mut hosts, &mut disk);

        let Some(host) = hosts.iter_mut().find(|h| &h.id == id) else {
            return false;
        };
        host.last_seen = Some(timestamp);
        self.dirty.store(true, Ordering::Release);

        if let Err(e) = self.persist(&hosts, &mut disk) {
            warn!("Failed to persist roster to {}: {}", self.path.display(), e);
        }
        true
    }

    /// Records the outcome of a successful poll in memory. The next
    /// `sync_with_disk` writes every pending result in one atomic write.
    ///
    /// The update only applies if the host is still registered under the
    /// same `generation`; results for a removed (or removed and re-added)
    /// host are discarded and `false` is returned.
    pub fn record_poll(
        &self,
        id: &HostId,
        generation: u64,
        timestamp: DateTime<Utc>,
        cpu_info: Option<CpuInfo>,
        ram_info: Option<RamInfo>,
    ) -> bool {
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        let Some(host) = hosts
            .iter_mut()
            .find(|h| &h.id == id && h.generation == generation)
        else {
            return false;
        };

        host.last_seen = Some(timestamp);
        if cpu_info.is_some() {
            host.cpu_info = cpu_info;
        }
        if ram_info.is_some() {
            host.ram_info = ram_info;
        }
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Whether memory holds poll results that are not on disk yet.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Picks up roster changes made by other processes and writes pending
    /// poll results. Returns whether the file was written.
    ///
    /// Blocks on file I/O; async callers run it on the blocking pool. The
    /// host list is only locked while merging and serializing, not during
    /// the write itself.
    pub fn sync_with_disk(&self) -> Result<bool, RegistryError> {
        let mut disk = self.lock_disk();

        let json = {
            let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
            self.reconcile(&mut hosts, &mut disk);
            if !self.dirty.swap(false, Ordering::AcqRel) {
                return Ok(false);
            }
            match serde_json::to_string_pretty(&RosterRef(&hosts)) {
                Ok(json) => json,
                Err(e) => {
                    self.dirty.store(true, Ordering::Release);
                    return Err(e.into());
                }
            }
        };

        if let Err(e) = write_atomic(&self.path, json.as_bytes()) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        *disk = Some(hash_bytes(&self.hasher, json.as_bytes()));
        Ok(true)
    }

    /// Whether `id` is currently registered under `generation`.
    pub fn is_current(&self, id: &HostId, generation: u64) -> bool {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|h| &h.id == id && h.generation == generation)
    }

    fn lock_disk(&self) -> MutexGuard<'_, Option<u64>> {
        self.disk.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges a roster written by another process since this registry last
    /// touched the file. The file decides membership and order; labels come
    /// from the file, observed info from whichever side is newer.
    fn reconcile(&self, hosts: &mut Vec<Host>, known: &mut Option<u64>) {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("Failed to read roster {}: {}", self.path.display(), e);
                return;
            }
        };

        let fingerprint = hash_bytes(&self.hasher, content.as_bytes());
        if *known == Some(fingerprint) {
            return;
        }

        let on_disk = match serde_json::from_str::<Roster>(&content) {
            Ok(roster) => roster.0,
            Err(e) => {
                warn!(
                    "Roster {} changed on disk but does not parse ({}), keeping the in-memory roster",
                    self.path.display(),
                    e
                );
                return;
            }
        };

        let mut merged = Vec::with_capacity(on_disk.len());
        let mut added = 0usize;
        for record in on_disk {
            match hosts.iter().position(|h| h.id == record.id) {
                Some(index) => {
                    let mut host = hosts.swap_remove(index);
                    host.nickname = record.nickname;
                    host.hostname = record.hostname;
                    if record.last_seen > host.last_seen {
                        host.last_seen = record.last_seen;
                        host.cpu_info = record.cpu_info.or(host.cpu_info);
                        host.ram_info = record.ram_info.or(host.ram_info);
                    }
                    merged.push(host);
                }
                None => {
                    added += 1;
                    merged.push(record);
                }
            }
        }

        let removed = hosts.len();
        if added > 0 || removed > 0 {
            info!(
                "Roster {} was changed by another process: {} hosts added, {} removed",
                self.path.display(),
                added,
                removed
            );
        }
        *hosts = merged;
        *known = Some(fingerprint);
    }

    fn persist(&self, hosts: &[Host], known: &mut Option<u64>) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(&RosterRef(hosts))?;
        write_atomic(&self.path, json.as_bytes())?;
        *known = Some(hash_bytes(&self.hasher, json.as_bytes()));
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }
}

fn hash_bytes(hasher: &ahash::RandomState, bytes: &[u8]) -> u64 {
    std::hash::BuildHasher::hash_one(hasher, bytes)
}

/// Borrowed roster used for serialization under the write lock.
struct RosterRef<'a>(&'a [Host]);

impl Serialize for RosterRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for host in self.0 {
            map.serialize_entry(host.id.as_str(), &HostRecord::from(host))?;
        }
        map.end()
    }
}

/// Rejects blank fields, port 0 and malformed addresses.
pub fn validate_fields(
    address: &str,
    port: u16,
    nickname: &str,
    hostname: &str,
) -> Result<(), ValidationError> {
    if address.trim().is_empty() {
        return Err(ValidationError::BlankField("address"));
    }
    if nickname.trim().is_empty() {
        return Err(ValidationError::BlankField("nickname"));
    }
    if hostname.trim().is_empty() {
        return Err(ValidationError::BlankField("hostname"));
    }
    if port == 0 {
        return Err(ValidationError::InvalidPort);
    }
    if !is_valid_address(address.trim()) {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

/// Accepts IPv4, IPv6 and DNS-style hostnames. Dotted quads must have every
/// octet in range.
pub fn is_valid_address(address: &str) -> bool {
    if DOTTED_QUAD.is_match(address) {
        return address.parse::<Ipv4Addr>().is_ok()
            || address.split('.').all(|o| o.parse::<u16>().is_ok_and(|v| v <= 255));
    }
    if address.contains(':') {
        return address.parse::<Ipv6Addr>().is_ok();
    }
    !address.is_empty()
        && address.len() <= 253
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Path of the temporary sibling used while writing `path`.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "roster".into());
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Writes `bytes` to the staging sibling of `path` and syncs it to disk.
/// The canonical file is untouched until `commit_file`.
pub fn stage_file(path: &Path, bytes: &[u8]) -> Result<PathBuf, RegistryError> {
    let staged = staging_path(path);
    let io_err = |source| RegistryError::Io {
        path: staged.clone(),
        source,
    };

    let mut f = File::create(&staged).map_err(io_err)?;
    f.write_all(bytes).map_err(io_err)?;
    f.sync_all().map_err(io_err)?;
    Ok(staged)
}

/// Atomically replaces `path` with the staged file.
pub fn commit_file(staged: &Path, path: &Path) -> Result<(), RegistryError> {
    fs::rename(staged, path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

/// Write-then-rename so a crash mid-write leaves the previous file intact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let staged = stage_file(path, bytes)?;
    commit_file(&staged, path)
}
