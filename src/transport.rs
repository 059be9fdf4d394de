use base64::{engine::general_purpose, Engine as _};
use std::io;

/// HTTP Basic Auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// The `user:password` pair as sent on the wire.
    pub fn pair(&self) -> String {
        format!("{}:{}", self.user, self.password)
    }

    pub fn authorization(&self) -> String {
        format!("Basic {}", general_purpose::STANDARD.encode(self.pair()))
    }
}

/// Body and status of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Expected to clear up on its own; retry next cycle.
    #[error("temporary error connecting to host: {0}")]
    Transient(String),
    /// Misconfiguration or library failure; retrying will not help.
    #[error("{0}")]
    Fatal(String),
}

/// A single blocking HTTP GET.
pub trait Transport {
    fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<Response, TransportError>;
}

/// `minreq`-backed transport used by the daemon.
pub struct HttpTransport {
    timeout: u64,
}

impl HttpTransport {
    pub fn new(timeout: u64) -> Self {
        Self { timeout }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, credentials: Option<&Credentials>) -> Result<Response, TransportError> {
        let mut request = minreq::get(url)
            .with_header("User-Agent", crate::USER_AGENT)
            .with_timeout(self.timeout);
        if let Some(credentials) = credentials {
            request = request.with_header("Authorization", credentials.authorization());
        }

        let response = request.send().map_err(classify)?;
        let body = String::from_utf8_lossy(response.as_bytes()).into_owned();

        log::debug!("Response status: {}, body: {}", response.status_code, body.trim());

        Ok(Response {
            status: response.status_code,
            body,
        })
    }
}

/// Split `minreq` failures into ones worth retrying and ones that are not.
///
/// Only name resolution, connect, timeout and send failures are transient.
/// A failure while reading the reply is fatal: the server may already have
/// applied the update, and repeating it can get the account flagged.
pub fn classify(err: minreq::Error) -> TransportError {
    match err {
        minreq::Error::AddressNotFound => TransportError::Transient(err.to_string()),
        minreq::Error::IoError(ref io_err) => match io_err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable => TransportError::Transient(err.to_string()),
            _ => TransportError::Fatal(err.to_string()),
        },
        other => TransportError::Fatal(other.to_string()),
    }
}
