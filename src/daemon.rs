use crate::config::Config;
use crate::error::Fatal;
use crate::ip::IpSource;
use crate::providers::dyndns::DynDnsProvider;
use crate::providers::he::HeProvider;
use crate::providers::namecheap::NamecheapProvider;
use crate::providers::{Cycle, Progress, Provider};
use crate::registry::{HostEntry, HostRegistry};
use crate::state::{StateError, StateStore};
use crate::transport::Transport;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM, SIGTSTP, SIGTTIN, SIGUSR1, SIGUSR2};
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Build the providers that have hosts configured, merging in on-disk state.
///
/// Providers are returned in the order they are serviced each cycle:
/// DynDNS-style, then Namecheap, then Hurricane Electric.
pub fn build_providers<F>(config: &Config, store: &StateStore, resolve: F) -> Result<Vec<Box<dyn Provider>>, StateError>
where
    F: Fn(&str) -> Option<Ipv4Addr> + Copy,
{
    let mut providers: Vec<Box<dyn Provider>> = Vec::new();

    if let Some(dd) = config.dyndns.as_ref().filter(|c| !c.hostnames.is_empty()) {
        let hosts = HostRegistry::load(dd.hostnames.iter().map(HostEntry::new), store, resolve)?;
        providers.push(Box::new(DynDnsProvider::new(dd, hosts)));
    }

    if let Some(nc) = config.namecheap.as_ref().filter(|c| !c.hostnames.is_empty()) {
        let hosts = HostRegistry::load(nc.hostnames.iter().map(HostEntry::new), store, resolve)?;
        providers.push(Box::new(NamecheapProvider::new(nc, hosts)));
    }

    if let Some(he) = config.he.as_ref().filter(|c| !c.hostpairs.is_empty()) {
        let entries = he
            .hostpairs
            .iter()
            .map(|pair| HostEntry::new(&pair.host).with_password(&pair.password));
        let hosts = HostRegistry::load(entries, store, resolve)?;
        providers.push(Box::new(HeProvider::new(he, hosts)));
    }

    Ok(providers)
}

/// The polling loop and everything it owns.
pub struct Daemon {
    providers: Vec<Box<dyn Provider>>,
    store: StateStore,
    transport: Box<dyn Transport>,
    use_tls: bool,
    ip_source: IpSource,
    interval: Duration,
    timeout: u64,
    shutdown: Arc<AtomicBool>,
}

impl Daemon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: Vec<Box<dyn Provider>>,
        store: StateStore,
        transport: Box<dyn Transport>,
        use_tls: bool,
        ip_source: IpSource,
        interval: Duration,
        timeout: u64,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            providers,
            store,
            transport,
            use_tls,
            ip_source,
            interval,
            timeout,
            shutdown,
        }
    }

    pub fn providers(&self) -> &[Box<dyn Provider>] {
        &self.providers
    }

    /// Reconcile every provider against `ip`, strictly one after another.
    pub fn run_cycle(&mut self, ip: Ipv4Addr, now: u64) -> Result<(), Fatal> {
        let cycle = Cycle {
            ip,
            now,
            use_tls: self.use_tls,
            transport: self.transport.as_ref(),
            store: &self.store,
        };

        for provider in self.providers.iter_mut() {
            if provider.registry().is_empty() {
                continue;
            }
            if provider.update(&cycle)? == Progress::Abandon {
                log::info!("{}: deferring remaining updates to the next cycle", provider.name());
            }
        }
        Ok(())
    }

    /// Poll until a shutdown signal arrives or a fatal error occurs.
    ///
    /// With `once` set, a single cycle runs and the loop returns.
    pub fn run(&mut self, once: bool) -> Result<(), Fatal> {
        log::info!("updating to {}", self.ip_source.describe());

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                log::info!("Shutdown requested; exiting.");
                return Ok(());
            }

            match self.ip_source.current(self.timeout) {
                Ok(ip) => self.run_cycle(ip, current_timestamp())?,
                Err(e) => log::warn!("Unable to determine current IP ({}). Sleeping.", e),
            }

            if once {
                return Ok(());
            }
            self.sleep();
        }
    }

    /// Wait out the polling interval, waking early on shutdown.
    fn sleep(&self) {
        let mut remaining = self.interval;
        while !remaining.is_zero() && !self.shutdown.load(Ordering::Relaxed) {
            let step = remaining.min(Duration::from_secs(1));
            thread::sleep(step);
            remaining -= step;
        }
    }
}

/// Job-control and user signals the daemon has no use for. Their default
/// action would kill or suspend it, so they are caught and dropped.
pub const IGNORED_SIGNALS: &[i32] = &[SIGHUP, SIGUSR1, SIGUSR2, SIGTSTP, SIGTTIN];

/// Route SIGINT and SIGTERM to `shutdown` and swallow `IGNORED_SIGNALS`.
pub fn install_signal_handlers(shutdown: &Arc<AtomicBool>) -> io::Result<()> {
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(shutdown))?;
    }
    let ignored = Arc::new(AtomicBool::new(false));
    for &signal in IGNORED_SIGNALS {
        signal_hook::flag::register(signal, Arc::clone(&ignored))?;
    }
    Ok(())
}

/// Write our pid to `path`, replacing whatever was there.
pub fn write_pidfile(path: &Path) -> Result<(), Box<dyn Error>> {
    let mut file = fs::File::create(path)
        .map_err(|e| format!("failed to open pid file \"{}\": {}", path.display(), e))?;
    write!(file, "{}", std::process::id())
        .map_err(|e| format!("failed to write pid file \"{}\": {}", path.display(), e))?;
    Ok(())
}

/// Current Unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
