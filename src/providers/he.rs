use crate::config::HeConfig;
use crate::error::Fatal;
use crate::outcome::{parse_errcount_response, Action};
use crate::providers::{enc, mask, Cycle, Progress, Provider};
use crate::registry::HostRegistry;
use crate::transport::Credentials;
use std::net::Ipv4Addr;

pub const DEFAULT_SERVER: &str = "dyn.dns.he.net";
pub const DEFAULT_TUNNEL_SERVER: &str = "ipv4.tunnelbroker.net";

/// Hurricane Electric (HE.net) provider
///
/// Keeps two kinds of records current: dynamic DNS hosts, each with its own
/// update key, and tunnel broker IPv4 endpoints. Tunnels are refreshed
/// whenever the host associated with them is updated.
pub struct HeProvider {
    server: String,
    tunnel_server: String,
    userid: String,
    passhash: String,
    tunnel_ids: Vec<String>,
    hostassoc: Option<String>,
    hosts: HostRegistry,
}

impl HeProvider {
    pub fn new(config: &HeConfig, hosts: HostRegistry) -> Self {
        Self {
            server: config
                .server
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            tunnel_server: config
                .tunnel_server
                .clone()
                .unwrap_or_else(|| DEFAULT_TUNNEL_SERVER.to_string()),
            userid: config.userid.clone().unwrap_or_default(),
            passhash: config.passhash.clone().unwrap_or_default(),
            tunnel_ids: config.tunnel_ids.clone(),
            hostassoc: config.hostassoc.clone(),
            hosts,
        }
    }

    pub fn host_url(&self, scheme: &str, host: &str, ip: Ipv4Addr) -> String {
        format!(
            "{}://{}/nic/update?hostname={}&myip={}",
            scheme,
            self.server,
            enc(host),
            ip
        )
    }

    pub fn tunnel_url(&self, scheme: &str, tunnel_id: &str, ip: Ipv4Addr) -> String {
        format!(
            "{}://{}/ipv4_end.php?ip={}&pass={}&apikey={}&tid={}",
            scheme,
            self.tunnel_server,
            ip,
            enc(&self.passhash),
            enc(&self.userid),
            enc(tunnel_id)
        )
    }

    /// Point every configured tunnel at the live IP.
    fn update_tunnels(&self, cycle: &Cycle<'_>) -> Result<Progress, Fatal> {
        for tunnel_id in &self.tunnel_ids {
            let url = self.tunnel_url(cycle.scheme(), tunnel_id, cycle.ip);
            log::debug!("update url: [{}]", mask(&url, &enc(&self.passhash)));

            let Some(response) = cycle.send(self.name(), &url, None)? else {
                return Ok(Progress::Abandon);
            };

            let outcome = parse_errcount_response(&response.body);
            match outcome.action() {
                Action::Success => {
                    log::info!("{}: [{}] - {}", tunnel_id, outcome, outcome.description());
                    cycle.store.write_ip(tunnel_id, cycle.ip)?;
                    cycle.store.write_date(tunnel_id, cycle.now)?;
                }
                _ => log::warn!("{}: [{}] - {}", tunnel_id, outcome, outcome.description()),
            }
        }
        Ok(Progress::Continue)
    }

    fn update_host(&mut self, cycle: &Cycle<'_>, host: &str) -> Result<Progress, Fatal> {
        let Some(password) = self.hosts.get(host).and_then(|e| e.password.clone()) else {
            log::warn!("{}: no update key configured; skipping.", host);
            return Ok(Progress::Continue);
        };

        if self.hostassoc.as_deref() == Some(host)
            && self.update_tunnels(cycle)? == Progress::Abandon
        {
            return Ok(Progress::Abandon);
        }

        let url = self.host_url(cycle.scheme(), host, cycle.ip);
        log::debug!("update url: [{}]", url);

        let credentials = Credentials::new(host, password);
        let Some(response) = cycle.send(self.name(), &url, Some(&credentials))? else {
            return Ok(Progress::Abandon);
        };

        let outcome = parse_errcount_response(&response.body);
        match outcome.action() {
            Action::Success => {
                log::info!("{}: [{}] - {}", host, outcome, outcome.description());
                cycle.publish(&mut self.hosts, host)?;
            }
            _ => log::warn!("{}: [{}] - {}", host, outcome, outcome.description()),
        }
        Ok(Progress::Continue)
    }
}

impl Provider for HeProvider {
    fn name(&self) -> &'static str {
        "he"
    }

    fn registry(&self) -> &HostRegistry {
        &self.hosts
    }

    fn update(&mut self, cycle: &Cycle<'_>) -> Result<Progress, Fatal> {
        let batch = self.hosts.select_stale(cycle.ip, None, cycle.now);
        for host in batch.hosts() {
            if self.update_host(cycle, host)? == Progress::Abandon {
                return Ok(Progress::Abandon);
            }
        }
        Ok(Progress::Continue)
    }
}
