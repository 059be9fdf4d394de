use std::error::Error;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::process::Command;

/// Web pages that echo the caller's address back, tried in order.
pub const CHECKIP_SERVICES: &[&str] = &[
    "http://checkip.dyndns.com/",
    "https://checkip.dns.he.net",
    "http://checkip.amazonaws.com",
];

/// Where the live IP comes from
#[derive(Debug, Clone, PartialEq)]
pub enum IpSource {
    /// Address assigned to a local network interface
    Interface(String),
    /// Address observed by a remote check-ip service
    Remote(Vec<String>),
}

impl IpSource {
    pub fn remote() -> Self {
        Self::Remote(CHECKIP_SERVICES.iter().map(|s| s.to_string()).collect())
    }

    pub fn current(&self, timeout: u64) -> Result<Ipv4Addr, Box<dyn Error>> {
        match self {
            IpSource::Interface(name) => get_ip_from_interface(name),
            IpSource::Remote(services) => get_remote_ip(services, timeout),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            IpSource::Interface(name) => format!("interface [{}]", name),
            IpSource::Remote(_) => "remote check-ip service".to_string(),
        }
    }
}

/// Ask each service in turn for our public address.
pub fn get_remote_ip(services: &[String], timeout: u64) -> Result<Ipv4Addr, Box<dyn Error>> {
    let mut last_error = None;

    for service in services {
        match try_service(service, timeout) {
            Ok(ip) => return Ok(ip),
            Err(e) => {
                log::debug!("Failed to get IP from {}: {}", service, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| "Failed to get external IP from any service".into()))
}

fn try_service(url: &str, timeout: u64) -> Result<Ipv4Addr, Box<dyn Error>> {
    let resp = minreq::get(url)
        .with_header("User-Agent", crate::USER_AGENT)
        .with_timeout(timeout)
        .send()?;
    let body = resp.as_str()?;
    find_ipv4(body).ok_or_else(|| format!("no IPv4 address in response from {}", url).into())
}

/// First dotted quad appearing anywhere in `text`.
pub fn find_ipv4(text: &str) -> Option<Ipv4Addr> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|word| word.trim_matches('.'))
        .find_map(|word| word.parse::<Ipv4Addr>().ok())
}

/// Get the IPv4 address of a local network interface
pub fn get_ip_from_interface(interface: &str) -> Result<Ipv4Addr, Box<dyn Error>> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(output) = Command::new("ip").args(ip_addr_args(interface)).output()
        {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if let Some(ip) = extract_ipv4_from_output(&stdout) {
                    return Ok(ip);
                }
            }
        }
    }

    // `ifconfig` covers the BSDs, macOS and older Linux systems.
    if let Ok(output) = Command::new("ifconfig").arg(interface).output() {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if let Some(ip) = extract_ipv4_from_output(&stdout) {
                return Ok(ip);
            }
        }
    }

    Err(format!("Failed to get IP from interface '{}'", interface).into())
}

/// Arguments for `ip` listing only globally scoped IPv4 addresses, so
/// link-local 169.254.x.x addresses are never published.
fn ip_addr_args(interface: &str) -> [&str; 8] {
    ["-4", "-o", "addr", "show", "dev", interface, "scope", "global"]
}

/// Extract the first IPv4 address from `ip addr` or `ifconfig` output
fn extract_ipv4_from_output(output: &str) -> Option<Ipv4Addr> {
    for line in output.lines() {
        let Some(inet_pos) = line.find("inet ") else {
            continue;
        };
        let after_inet = &line[inet_pos + "inet ".len()..];
        let word = after_inet.split_whitespace().next()?;
        // Remove CIDR notation (/24) and the "addr:" prefix of old ifconfig
        let ip_str = word.split('/').next().unwrap_or(word);
        let ip_str = ip_str.strip_prefix("addr:").unwrap_or(ip_str);
        if let Ok(ip) = ip_str.parse::<Ipv4Addr>() {
            return Some(ip);
        }
    }
    None
}

/// Look up the first IPv4 address currently published for `host`.
pub fn resolve_ipv4(host: &str) -> Option<Ipv4Addr> {
    match (host, 0).to_socket_addrs() {
        Ok(addrs) => {
            let ip = addrs.map(|a| a.ip()).find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            });
            match ip {
                Some(ip) => log::info!("lookup_dns: [{}] resolves to [{}]", host, ip),
                None => log::info!("failed to resolve {}: no IPv4 address for host.", host),
            }
            ip
        }
        Err(e) => {
            log::info!("failed to resolve {}: {}", host, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_ipv4_in_checkip_page() {
        let body = "<html><head><title>Current IP Check</title></head>\
                    <body>Current IP Address: 203.0.113.5</body></html>\r\n";
        assert_eq!(find_ipv4(body), Some(Ipv4Addr::new(203, 0, 113, 5)));
    }

    #[test]
    fn test_find_ipv4_plain_body() {
        assert_eq!(find_ipv4("198.51.100.7\n"), Some(Ipv4Addr::new(198, 51, 100, 7)));
        assert_eq!(find_ipv4("ip: 10.0.0.1."), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_find_ipv4_rejects_invalid() {
        assert_eq!(find_ipv4("version 1.2 build 300.1.1.1"), None);
        assert_eq!(find_ipv4(""), None);
        assert_eq!(find_ipv4("2001:db8::1"), None);
    }

    #[test]
    fn test_extract_from_ip_addr_output() {
        let output = "3: ppp0    inet 203.0.113.5 peer 198.51.100.1/32 scope global ppp0\\       valid_lft forever preferred_lft forever\n";
        assert_eq!(extract_ipv4_from_output(output), Some(Ipv4Addr::new(203, 0, 113, 5)));
    }

    #[test]
    fn test_extract_from_ifconfig_output() {
        let modern = "eth0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500\n        inet 192.168.1.100  netmask 255.255.255.0  broadcast 192.168.1.255\n";
        assert_eq!(extract_ipv4_from_output(modern), Some(Ipv4Addr::new(192, 168, 1, 100)));

        let legacy = "ppp0      Link encap:Point-to-Point Protocol\n          inet addr:203.0.113.9  P-t-P:198.51.100.1  Mask:255.255.255.255\n";
        assert_eq!(extract_ipv4_from_output(legacy), Some(Ipv4Addr::new(203, 0, 113, 9)));
    }

    #[test]
    fn test_ip_addr_args_ask_for_global_scope() {
        let args = ip_addr_args("ppp0");
        assert_eq!(&args[4..6], ["dev", "ppp0"]);
        assert_eq!(&args[6..], ["scope", "global"]);
    }

    #[test]
    fn test_extract_ignores_inet6() {
        let output = "        inet6 fe80::1  prefixlen 64  scopeid 0x20<link>\n";
        assert_eq!(extract_ipv4_from_output(output), None);
    }

    #[test]
    fn test_remote_ip_from_mock_service() {
        let mut server = mockito::Server::new();
        let _down = server.mock("GET", "/down").with_status(200).with_body("maintenance").create();
        let _up = server
            .mock("GET", "/up")
            .with_body("Current IP Address: 198.51.100.23")
            .create();

        let services = vec![format!("{}/down", server.url()), format!("{}/up", server.url())];
        assert_eq!(get_remote_ip(&services, 5).unwrap(), Ipv4Addr::new(198, 51, 100, 23));
    }

    #[test]
    fn test_remote_ip_all_services_fail() {
        assert!(get_remote_ip(&[], 5).is_err());
    }

    #[test]
    fn test_resolve_localhost() {
        assert_eq!(resolve_ipv4("localhost"), Some(Ipv4Addr::LOCALHOST));
    }
}
