use crate::state::{StateError, StateStore};
use std::fmt;
use std::net::Ipv4Addr;

/// Keep-alive window for DynDNS-style hosts: the provider reclaims hosts that
/// go unrefreshed for longer than 28 days.
pub const REFRESH_INTERVAL: u64 = 28 * 24 * 3600 + 60;

/// One DNS name (or HE tunnel id) known to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub name: String,
    /// Last IP the host is believed to be published with.
    pub ip: Option<Ipv4Addr>,
    /// Epoch seconds of the last successful publish, 0 if never.
    pub last_update: u64,
    /// Set once a permanent provider error has been recorded on disk.
    pub locked: bool,
    /// Per-host update password (Hurricane Electric only).
    pub password: Option<String>,
}

impl HostEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: None,
            last_update: 0,
            locked: false,
            password: None,
        }
    }

    #[cfg(test)]
    pub fn with_ip(mut self, ip: Ipv4Addr, last_update: u64) -> Self {
        self.ip = Some(ip);
        self.last_update = last_update;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Why this entry needs an update, if it does.
    ///
    /// `refresh` is the keep-alive window in seconds; providers without a
    /// keep-alive policy pass `None`. Locked entries are never stale.
    pub fn staleness(&self, live_ip: Ipv4Addr, refresh: Option<u64>, now: u64) -> Option<Staleness> {
        if self.locked {
            return None;
        }
        if self.ip != Some(live_ip) {
            return Some(Staleness::Changed);
        }
        match refresh {
            Some(window) if now.saturating_sub(self.last_update) > window => {
                Some(Staleness::Refresh)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Published IP differs from the live IP (or was never published).
    Changed,
    /// IP unchanged but the keep-alive window has elapsed.
    Refresh,
}

/// Hosts selected for update during a single polling cycle, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    hosts: Vec<String>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

impl fmt::Display for UpdateBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hosts.join(","))
    }
}

impl FromIterator<String> for UpdateBatch {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            hosts: iter.into_iter().collect(),
        }
    }
}

/// Ordered host entries belonging to one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRegistry {
    entries: Vec<HostEntry>,
}

impl HostRegistry {
    pub fn from_entries(entries: Vec<HostEntry>) -> Self {
        Self { entries }
    }

    /// Build a registry by merging configured hosts with their on-disk state.
    ///
    /// Hosts with a lockout marker are kept but flagged `locked`. A host
    /// without a usable `-dnsip` file falls back to `resolve`, which normally
    /// performs a DNS lookup of the name.
    pub fn load<I, F>(hosts: I, store: &StateStore, resolve: F) -> Result<Self, StateError>
    where
        I: IntoIterator<Item = HostEntry>,
        F: Fn(&str) -> Option<Ipv4Addr>,
    {
        let mut entries: Vec<HostEntry> = Vec::new();

        for mut entry in hosts {
            if entries.iter().any(|e| e.name == entry.name) {
                log::warn!("[{}] is configured more than once; ignoring duplicate", entry.name);
                continue;
            }

            if let Some(reason) = store.read_lock_reason(&entry.name)? {
                log::warn!(
                    "host:[{}] is locked because of error:[{}]. Correct the problem and remove [{}-dnserr] to allow update.",
                    entry.name,
                    reason,
                    entry.name
                );
                entry.locked = true;
                entries.push(entry);
                continue;
            }

            entry.ip = match store.read_ip(&entry.name)? {
                Some(ip) => Some(ip),
                None => {
                    log::info!("Querying DNS for [{}].", entry.name);
                    resolve(&entry.name)
                }
            };
            entry.last_update = store.read_date(&entry.name)?;

            match entry.ip {
                Some(ip) => log::info!("adding: [{}] ip: [{}]", entry.name, ip),
                None => log::info!("adding: [{}] ip: [none]", entry.name),
            }
            entries.push(entry);
        }

        Ok(Self::from_entries(entries))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&HostEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Every unlocked entry that needs an update, logged with the reason.
    pub fn select_stale(&self, live_ip: Ipv4Addr, refresh: Option<u64>, now: u64) -> UpdateBatch {
        self.entries
            .iter()
            .filter_map(|entry| {
                let why = entry.staleness(live_ip, refresh, now)?;
                match why {
                    Staleness::Changed => log::info!("adding for update [{}]", entry.name),
                    Staleness::Refresh => log::info!("adding for refresh [{}]", entry.name),
                }
                Some(entry.name.clone())
            })
            .collect()
    }

    /// Mirror a successful publish into memory.
    pub fn record_success(&mut self, name: &str, ip: Ipv4Addr, now: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.ip = Some(ip);
            entry.last_update = now;
        }
    }

    /// Drop a host for the remaining lifetime of the process.
    pub fn remove(&mut self, name: &str) -> Option<HostEntry> {
        let pos = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(pos))
    }
}
