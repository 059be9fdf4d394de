/// Configuration file parser
///
/// The format is line oriented. `#` starts a comment line, `[dyndns]`,
/// `[namecheap]` and `[he]` select the provider that following lines apply
/// to, and every other line is either `key=value` or a bare flag word:
/// ```text
/// [dyndns]
/// username=alice
/// password=secret
/// hostname=home.dyndns.org,work.dyndns.org
/// nowildcard
/// backupmx
///
/// [namecheap]
/// password=0123456789abcdef
/// hostname=www.example.com
///
/// [he]
/// userid=0123abcd
/// passhash=5f4dcc3b5aa765d61d8327deb882cf99
/// hostpairs=tunnel.example.net:dynkey
/// tunnelids=123456
/// hostassoc=tunnel.example.net
/// ```
/// Lines that appear before any section header belong to `[dyndns]`.
use std::error::Error;
use std::fs;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DnsSystem {
    #[default]
    Dynamic,
    Static,
    Custom,
}

impl DnsSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            DnsSystem::Dynamic => "dyndns",
            DnsSystem::Static => "statdns",
            DnsSystem::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Wildcard {
    On,
    Off,
    #[default]
    NoChange,
}

impl Wildcard {
    pub fn as_str(self) -> &'static str {
        match self {
            Wildcard::On => "ON",
            Wildcard::Off => "OFF",
            Wildcard::NoChange => "NOCHG",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupMx {
    Yes,
    No,
    #[default]
    NoChange,
}

impl BackupMx {
    pub fn as_str(self) -> &'static str {
        match self {
            BackupMx::Yes => "YES",
            BackupMx::No => "NO",
            BackupMx::NoChange => "NOCHG",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynDnsConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub hostnames: Vec<String>,
    pub mx: Option<String>,
    pub wildcard: Wildcard,
    pub backmx: BackupMx,
    pub offline: bool,
    pub system: DnsSystem,
    pub server: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamecheapConfig {
    pub password: Option<String>,
    pub hostnames: Vec<String>,
    pub server: Option<String>,
}

/// A Hurricane Electric dynamic DNS host and its update key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPair {
    pub host: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeConfig {
    pub userid: Option<String>,
    pub passhash: Option<String>,
    pub hostpairs: Vec<HostPair>,
    pub tunnel_ids: Vec<String>,
    /// Host whose updates also refresh every tunnel endpoint.
    pub hostassoc: Option<String>,
    pub server: Option<String>,
    pub tunnel_server: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub dyndns: Option<DynDnsConfig>,
    pub namecheap: Option<NamecheapConfig>,
    pub he: Option<HeConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    DynDns,
    Namecheap,
    He,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("failed to open [{}] for read: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn from_reader(mut reader: impl Read) -> Result<Self, Box<dyn Error>> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, Box<dyn Error>> {
        let mut config = Config::default();
        let mut section = Section::DynDns;

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = match name.trim().to_ascii_lowercase().as_str() {
                    "dyndns" => Section::DynDns,
                    "namecheap" => Section::Namecheap,
                    "he" => Section::He,
                    other => {
                        return Err(format!("line {}: unknown section [{}]", lineno + 1, other).into())
                    }
                };
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (line, None),
            };

            let handled = match section {
                Section::DynDns => apply_dyndns(config.dyndns.get_or_insert_with(Default::default), key, value),
                Section::Namecheap => {
                    apply_namecheap(config.namecheap.get_or_insert_with(Default::default), key, value)
                }
                Section::He => apply_he(config.he.get_or_insert_with(Default::default), key, value)?,
            };
            if !handled {
                log::warn!("line {}: ignoring unknown directive [{}]", lineno + 1, key);
            }
        }

        Ok(config)
    }

    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if let Some(dd) = &self.dyndns {
            if dd.username.is_none() {
                return Err("config file invalid: no dyndns username provided".into());
            }
            if dd.password.is_none() {
                return Err("config file invalid: no dyndns password provided".into());
            }
            if dd.hostnames.is_empty() {
                return Err("config file invalid: no dyndns hostnames provided".into());
            }
        }

        if let Some(nc) = &self.namecheap {
            if !nc.hostnames.is_empty() && nc.password.is_none() {
                return Err("config file invalid: no namecheap password provided".into());
            }
        }

        if let Some(he) = &self.he {
            if !he.tunnel_ids.is_empty() && (he.userid.is_none() || he.passhash.is_none()) {
                return Err("config file invalid: he tunnels need both userid and passhash".into());
            }
            if !he.tunnel_ids.is_empty() && he.hostassoc.is_none() {
                log::warn!("he tunnels are configured without hostassoc; they will never be updated");
            }
        }

        if self.host_count() == 0 {
            return Err("No hostnames were provided for updates.".into());
        }
        Ok(())
    }

    /// Number of configured hosts across every provider.
    pub fn host_count(&self) -> usize {
        self.dyndns.as_ref().map_or(0, |c| c.hostnames.len())
            + self.namecheap.as_ref().map_or(0, |c| c.hostnames.len())
            + self.he.as_ref().map_or(0, |c| c.hostpairs.len())
    }
}

fn apply_dyndns(dd: &mut DynDnsConfig, key: &str, value: Option<&str>) -> bool {
    match (key, value) {
        ("username", Some(v)) => dd.username = Some(v.to_string()),
        ("password", Some(v)) => dd.password = Some(v.to_string()),
        ("hostname", Some(v)) => dd.hostnames.extend(split_list(v)),
        ("mx", Some(v)) => dd.mx = Some(v.to_string()),
        ("server", Some(v)) => dd.server = Some(v.to_string()),
        ("wildcard", None) => dd.wildcard = Wildcard::On,
        ("nowildcard", None) => dd.wildcard = Wildcard::Off,
        ("primarymx", None) => dd.backmx = BackupMx::No,
        ("backupmx", None) => dd.backmx = BackupMx::Yes,
        ("offline", None) => dd.offline = true,
        ("dyndns", None) => dd.system = DnsSystem::Dynamic,
        ("customdns", None) => dd.system = DnsSystem::Custom,
        ("staticdns", None) => dd.system = DnsSystem::Static,
        _ => return false,
    }
    true
}

fn apply_namecheap(nc: &mut NamecheapConfig, key: &str, value: Option<&str>) -> bool {
    match (key, value) {
        ("password", Some(v)) => nc.password = Some(v.to_string()),
        ("hostname", Some(v)) => nc.hostnames.extend(split_list(v)),
        ("server", Some(v)) => nc.server = Some(v.to_string()),
        _ => return false,
    }
    true
}

fn apply_he(he: &mut HeConfig, key: &str, value: Option<&str>) -> Result<bool, Box<dyn Error>> {
    match (key, value) {
        ("userid", Some(v)) => he.userid = Some(v.to_string()),
        ("passhash", Some(v)) => he.passhash = Some(v.to_string()),
        ("hostassoc", Some(v)) => he.hostassoc = Some(v.to_string()),
        ("tunnelids", Some(v)) => he.tunnel_ids.extend(split_list(v)),
        ("server", Some(v)) => he.server = Some(v.to_string()),
        ("tunnel_server", Some(v)) => he.tunnel_server = Some(v.to_string()),
        ("hostpairs", Some(v)) => {
            for pair in split_list(v) {
                let (host, password) = pair
                    .split_once(':')
                    .filter(|(h, p)| !h.is_empty() && !p.is_empty())
                    .ok_or_else(|| format!("invalid he hostpair [{}]: expected host:password", pair))?;
                he.hostpairs.push(HostPair {
                    host: host.to_string(),
                    password: password.to_string(),
                });
            }
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
