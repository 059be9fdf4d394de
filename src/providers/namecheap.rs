use crate::config::NamecheapConfig;
use crate::error::Fatal;
use crate::outcome::{parse_errcount_response, Action};
use crate::providers::{enc, mask, Cycle, Progress, Provider};
use crate::registry::HostRegistry;
use std::net::Ipv4Addr;

pub const DEFAULT_SERVER: &str = "dynamicdns.park-your-domain.com";

/// Namecheap Dynamic DNS provider
///
/// Hosts are updated one request at a time; the only thing the reply tells
/// us is whether its error count is zero.
pub struct NamecheapProvider {
    server: String,
    password: String,
    hosts: HostRegistry,
}

impl NamecheapProvider {
    pub fn new(config: &NamecheapConfig, hosts: HostRegistry) -> Self {
        Self {
            server: config
                .server
                .clone()
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            password: config.password.clone().unwrap_or_default(),
            hosts,
        }
    }

    pub fn update_url(&self, scheme: &str, host: &str, ip: Ipv4Addr) -> Option<String> {
        let (sub, domain) = split_host(host)?;
        Some(format!(
            "{}://{}/update?host={}&domain={}&password={}&ip={}",
            scheme,
            self.server,
            enc(sub),
            enc(domain),
            enc(&self.password),
            ip
        ))
    }

    fn update_host(&mut self, cycle: &Cycle<'_>, host: &str) -> Result<Progress, Fatal> {
        let Some(url) = self.update_url(cycle.scheme(), host, cycle.ip) else {
            log::warn!("{}: [fail] - not a domain name; skipping.", host);
            return Ok(Progress::Continue);
        };
        log::debug!("update url: [{}]", mask(&url, &enc(&self.password)));

        let Some(response) = cycle.send(self.name(), &url, None)? else {
            return Ok(Progress::Abandon);
        };

        let outcome = parse_errcount_response(&response.body);
        match outcome.action() {
            Action::Success => {
                log::info!("{}: [{}] - {}", host, outcome, outcome.description());
                cycle.publish(&mut self.hosts, host)?;
            }
            _ => match provider_error(&response.body) {
                Some(message) => log::warn!("{}: [fail] - Failed to update: {}", host, message),
                None => log::warn!("{}: [fail] - Failed to update.", host),
            },
        }
        Ok(Progress::Continue)
    }
}

impl Provider for NamecheapProvider {
    fn name(&self) -> &'static str {
        "namecheap"
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

/// Split `www.example.com` into (`www`, `example.com`). A bare domain updates
/// the apex record `@`.
pub fn split_host(host: &str) -> Option<(&str, &str)> {
    let last_dot = host.rfind('.')?;
    match host[..last_dot].rfind('.') {
        Some(dot) => Some((&host[..dot], &host[dot + 1..])),
        None => Some(("@", host)),
    }
}

/// Text of the first `<Err1>` element, if the reply has one.
fn provider_error(body: &str) -> Option<&str> {
    let start = body.find("<Err1>")? + "<Err1>".len();
    let len = body[start..].find("</Err1>")?;
    Some(&body[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HostEntry;
    use crate::state::StateStore;
    use crate::transport::testing::ScriptedTransport;
    use crate::transport::{HttpTransport, Transport, TransportError};
    use mockito::Matcher;
    use tempfile::TempDir;

    const LIVE: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);
    const NOW: u64 = 1_700_000_000;
    const OK_BODY: &str = "<?xml version=\"1.0\"?><interface-response><Command>SETDNSHOST</Command>\
        <ErrCount>0</ErrCount><Done>true</Done></interface-response>";
    const ERR_BODY: &str = "<interface-response><ErrCount>1</ErrCount><errors>\
        <Err1>Passwords do not match</Err1></errors></interface-response>";

    fn provider(server: Option<String>, hosts: &[&str]) -> NamecheapProvider {
        let config = NamecheapConfig {
            password: Some("secret".to_string()),
            server,
            ..Default::default()
        };
        let entries = hosts.iter().map(|h| HostEntry::new(*h)).collect();
        NamecheapProvider::new(&config, HostRegistry::from_entries(entries))
    }

    fn cycle<'a>(transport: &'a dyn Transport, store: &'a StateStore) -> Cycle<'a> {
        Cycle {
            ip: LIVE,
            now: NOW,
            use_tls: false,
            transport,
            store,
        }
    }

    #[test]
    fn test_split_host() {
        assert_eq!(split_host("www.example.com"), Some(("www", "example.com")));
        assert_eq!(split_host("a.b.example.com"), Some(("a.b", "example.com")));
        assert_eq!(split_host("example.com"), Some(("@", "example.com")));
        assert_eq!(split_host("localhost"), None);
    }

    #[test]
    fn test_update_url() {
        let p = provider(None, &[]);
        assert_eq!(
            p.update_url("https", "www.example.com", LIVE).unwrap(),
            "https://dynamicdns.park-your-domain.com/update?host=www&domain=example.com&password=secret&ip=203.0.113.5"
        );
        assert_eq!(
            p.update_url("http", "example.com", LIVE).unwrap(),
            "http://dynamicdns.park-your-domain.com/update?host=%40&domain=example.com&password=secret&ip=203.0.113.5"
        );
    }

    #[test]
    fn test_success_against_server() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/update")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("host".into(), "www".into()),
                Matcher::UrlEncoded("domain".into(), "example.com".into()),
                Matcher::UrlEncoded("password".into(), "secret".into()),
                Matcher::UrlEncoded("ip".into(), "203.0.113.5".into()),
            ]))
            .with_body(OK_BODY)
            .create();

        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let transport = HttpTransport::new(5);
        let mut p = provider(Some(server.host_with_port()), &["www.example.com"]);

        p.update(&cycle(&transport, &store)).unwrap();

        mock.assert();
        assert_eq!(store.read_ip("www.example.com").unwrap(), Some(LIVE));
        assert_eq!(store.read_date("www.example.com").unwrap(), NOW);
        assert_eq!(p.registry().get("www.example.com").unwrap().ip, Some(LIVE));
    }

    #[test]
    fn test_failure_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let transport = ScriptedTransport::new().reply(ERR_BODY);
        let mut p = provider(None, &["www.example.com"]);

        assert_eq!(p.update(&cycle(&transport, &store)).unwrap(), Progress::Continue);

        assert_eq!(store.read_ip("www.example.com").unwrap(), None);
        assert_eq!(store.read_lock_reason("www.example.com").unwrap(), None);
        let entry = p.registry().get("www.example.com").unwrap();
        assert_eq!((entry.ip, entry.locked), (None, false));
    }

    #[test]
    fn test_one_request_per_host() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let transport = ScriptedTransport::new().reply(OK_BODY).reply(ERR_BODY);
        let mut p = provider(None, &["a.example.com", "b.example.com"]);

        p.update(&cycle(&transport, &store)).unwrap();

        let urls = transport.urls();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].contains("host=a&"));
        assert!(urls[1].contains("host=b&"));
        assert_eq!(store.read_ip("a.example.com").unwrap(), Some(LIVE));
        assert_eq!(store.read_ip("b.example.com").unwrap(), None);
    }

    #[test]
    fn test_transient_failure_abandons_batch() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let transport = ScriptedTransport::new()
            .fail(TransportError::Transient("timed out".into()))
            .reply(OK_BODY);
        let mut p = provider(None, &["a.example.com", "b.example.com"]);

        assert_eq!(p.update(&cycle(&transport, &store)).unwrap(), Progress::Abandon);
        assert_eq!(transport.urls().len(), 1);
        assert_eq!(store.read_ip("a.example.com").unwrap(), None);
    }

    #[test]
    fn test_unchanged_host_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let transport = ScriptedTransport::new();
        let config = NamecheapConfig {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let entries = vec![HostEntry::new("www.example.com").with_ip(LIVE, 0)];
        let mut p = NamecheapProvider::new(&config, HostRegistry::from_entries(entries));

        p.update(&cycle(&transport, &store)).unwrap();
        assert!(transport.requests.borrow().is_empty());
    }

    #[test]
    fn test_provider_error() {
        assert_eq!(provider_error(ERR_BODY), Some("Passwords do not match"));
        assert_eq!(provider_error(OK_BODY), None);
    }
}
