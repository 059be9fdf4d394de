use crate::error::Fatal;
use crate::registry::HostRegistry;
use crate::state::StateStore;
use crate::transport::{Credentials, Response, Transport, TransportError};
use std::net::Ipv4Addr;

pub mod dyndns;
pub mod he;
pub mod namecheap;

/// Longest request URL the daemon is willing to build.
pub const MAX_URL_LEN: usize = 2048;
/// Longest `user:password` pair accepted for Basic Auth.
pub const MAX_CREDENTIALS_LEN: usize = 255;

/// Inputs shared by every provider during one polling cycle.
pub struct Cycle<'a> {
    /// Live IP discovered at the start of the cycle.
    pub ip: Ipv4Addr,
    /// Epoch seconds used for staleness checks and recorded update dates.
    pub now: u64,
    pub use_tls: bool,
    pub transport: &'a dyn Transport,
    pub store: &'a StateStore,
}

impl Cycle<'_> {
    pub fn scheme(&self) -> &'static str {
        if self.use_tls {
            "https"
        } else {
            "http"
        }
    }

    /// Perform one request. A transient failure is logged and yields `None`;
    /// anything else not worth retrying becomes `Fatal`.
    pub(crate) fn send(
        &self,
        provider: &str,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Option<Response>, Fatal> {
        check_len("update url", url, MAX_URL_LEN)?;
        if let Some(credentials) = credentials {
            check_len("username:password pair", &credentials.pair(), MAX_CREDENTIALS_LEN)?;
        }

        match self.transport.get(url, credentials) {
            Ok(response) => {
                log::debug!("{}: response returned: [{}]", provider, response.body.trim());
                Ok(Some(response))
            }
            Err(TransportError::Transient(reason)) => {
                log::warn!(
                    "{}: temporary error connecting to host: [{}]. Queuing for retry.",
                    provider,
                    reason
                );
                Ok(None)
            }
            Err(TransportError::Fatal(reason)) => {
                log::error!("{}: update failed. Transport returned a fatal error: [{}].", provider, reason);
                Err(Fatal::Transport(reason))
            }
        }
    }

    /// Persist a successful publish for `host`, then mirror it into `registry`.
    pub(crate) fn publish(&self, registry: &mut HostRegistry, host: &str) -> Result<(), Fatal> {
        self.store.write_ip(host, self.ip)?;
        self.store.write_date(host, self.now)?;
        registry.record_success(host, self.ip, self.now);
        Ok(())
    }
}

/// Whether a provider finished its work for the cycle or gave up on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    /// A transient failure; the rest of the provider's batch waits for the next cycle.
    Abandon,
}

/// One dynamic DNS service and the hosts it keeps up to date.
pub trait Provider {
    /// Provider name for logging purposes
    fn name(&self) -> &'static str;

    fn registry(&self) -> &HostRegistry;

    /// Update every stale host for this cycle.
    ///
    /// Returns `Err` only for conditions that must stop the daemon.
    fn update(&mut self, cycle: &Cycle<'_>) -> Result<Progress, Fatal>;
}

pub(crate) fn check_len(what: &'static str, value: &str, max: usize) -> Result<(), Fatal> {
    if value.len() > max {
        log::error!("FATAL - {} would overflow the {} byte limit", what, max);
        return Err(Fatal::Oversized {
            what,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Replace a secret with asterisks so URLs can be logged.
pub(crate) fn mask(url: &str, secret: &str) -> String {
    if secret.is_empty() {
        url.to_string()
    } else {
        url.replace(secret, "********")
    }
}

/// Percent-encode a query value.
pub(crate) fn enc(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
