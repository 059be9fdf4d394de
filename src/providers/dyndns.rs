use crate::config::{BackupMx, DnsSystem, DynDnsConfig, Wildcard};
use crate::error::Fatal;
use crate::outcome::{parse_dyndns_response, Action, Outcome};
use crate::providers::{enc, Cycle, Progress, Provider};
use crate::registry::{HostRegistry, UpdateBatch, REFRESH_INTERVAL};
use crate::transport::Credentials;
use std::net::Ipv4Addr;

pub const DEFAULT_SERVER: &str = "members.dyndns.org";

/// DynDNS-style provider
///
/// All stale hosts go out in a single request; the reply carries one status
/// token per host, in request order.
pub struct DynDnsProvider {
    server: String,
    credentials: Credentials,
    system: DnsSystem,
    wildcard: Wildcard,
    mx: Option<String>,
    backmx: BackupMx,
    offline: bool,
    hosts: HostRegistry,
}

impl DynDnsProvider {
    pub fn new(config: &DynDnsConfig, hosts: HostRegistry) -> Self {
        Self {
            server: config
                .server
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            credentials: Credentials::new(
                config.username.clone().unwrap_or_default(),
                config.password.clone().unwrap_or_default(),
            ),
            system: config.system,
            wildcard: config.wildcard,
            mx: config.mx.clone(),
            backmx: config.backmx,
            offline: config.offline,
            hosts,
        }
    }

    /// Only dynamic hosts are reclaimed by the provider when left idle.
    fn refresh_window(&self) -> Option<u64> {
        (self.system == DnsSystem::Dynamic).then_some(REFRESH_INTERVAL)
    }

    pub fn update_url(&self, scheme: &str, batch: &UpdateBatch, ip: Ipv4Addr) -> String {
        let hostnames = batch
            .hosts()
            .iter()
            .map(|h| enc(h))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{}://{}/nic/update?system={}&hostname={}&myip={}&wildcard={}&mx={}&backmx={}&offline={}",
            scheme,
            self.server,
            self.system.as_str(),
            hostnames,
            ip,
            self.wildcard.as_str(),
            self.mx.as_deref().map(enc).unwrap_or_else(|| "NOCHG".to_string()),
            self.backmx.as_str(),
            if self.offline { "YES" } else { "NO" },
        )
    }

    /// Apply the per-host outcomes of one batched request.
    ///
    /// Hosts and outcomes are paired by position; when the counts differ only
    /// the common prefix is reconciled.
    fn reconcile(&mut self, cycle: &Cycle<'_>, batch: &UpdateBatch, outcomes: &[Outcome]) -> Result<(), Fatal> {
        if batch.len() != outcomes.len() {
            log::warn!(
                "list arity doesn't match ({} hosts, {} results), updates may be suspect",
                batch.len(),
                outcomes.len()
            );
        }

        for (host, &outcome) in batch.hosts().iter().zip(outcomes) {
            match outcome.action() {
                Action::Success => {
                    log::info!("{}: [{}] - {}", host, outcome, outcome.description());
                    cycle.publish(&mut self.hosts, host)?;
                }
                Action::SoftLockout => {
                    log::error!("{}: [{}] - FATAL: {}", host, outcome, outcome.description());
                    log::error!(
                        "[{}] has a configuration problem. Refusing to update until {}-dnserr is removed.",
                        host,
                        host
                    );
                    cycle.store.write_lock_reason(host, outcome.lock_reason())?;
                    self.hosts.remove(host);
                }
                Action::HardFailure | Action::Ignore => {
                    log::error!("{}: [{}] - FATAL: {}", host, outcome, outcome.description());
                    return Err(Fatal::Provider {
                        host: host.clone(),
                        token: outcome.token(),
                        reason: outcome.description(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Provider for DynDnsProvider {
    fn name(&self) -> &'static str {
        "dyndns"
    }

    fn registry(&self) -> &HostRegistry {
        &self.hosts
    }

    fn update(&mut self, cycle: &Cycle<'_>) -> Result<Progress, Fatal> {
        let batch = self.hosts.select_stale(cycle.ip, self.refresh_window(), cycle.now);
        if batch.is_empty() {
            return Ok(Progress::Continue);
        }

        log::info!("{}: updating [{}] to {}", self.name(), batch, cycle.ip);
        let url = self.update_url(cycle.scheme(), &batch, cycle.ip);
        log::debug!("update url: [{}]", url);

        let Some(response) = cycle.send(self.name(), &url, Some(&self.credentials))? else {
            return Ok(Progress::Abandon);
        };

        let outcomes = parse_dyndns_response(&response.body);
        self.reconcile(cycle, &batch, &outcomes)?;
        Ok(Progress::Continue)
    }
}
