/// Normalized provider outcomes and how each one is reconciled.
use std::fmt;

/// Result of a single host update attempt, independent of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Good,
    NoChange,
    BadSystem,
    BadAgent,
    BadAuth,
    NotDonator,
    NotFqdn,
    NoHost,
    NotYours,
    Abuse,
    NumHost,
    DnsError,
    ServerFailure,
    /// Unclassified failure from a provider that only reports success or not.
    Failed,
}

/// What the reconciler does with an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Persist the live IP and the current time.
    Success,
    /// Persist a lockout marker and drop the host.
    SoftLockout,
    /// Stop the daemon.
    HardFailure,
    /// Log and leave state untouched.
    Ignore,
}

/// DynDNS-style tokens in the order they are matched. Each response token is
/// classified by the first entry it contains.
const DYNDNS_TOKENS: &[(&str, Outcome)] = &[
    ("badsys", Outcome::BadSystem),
    ("badagent", Outcome::BadAgent),
    ("badauth", Outcome::BadAuth),
    ("!donator", Outcome::NotDonator),
    ("good", Outcome::Good),
    ("nochg", Outcome::NoChange),
    ("notfqdn", Outcome::NotFqdn),
    ("nohost", Outcome::NoHost),
    ("!yours", Outcome::NotYours),
    ("abuse", Outcome::Abuse),
    ("numhost", Outcome::NumHost),
    ("dnserr", Outcome::DnsError),
    ("911", Outcome::ServerFailure),
];

impl Outcome {
    /// Classify one whitespace-delimited DynDNS response token. Tokens outside
    /// the vocabulary (such as the echoed IP) yield `None`.
    pub fn from_dyndns_token(token: &str) -> Option<Self> {
        DYNDNS_TOKENS
            .iter()
            .find(|(needle, _)| token.contains(needle))
            .map(|&(_, outcome)| outcome)
    }

    pub fn token(self) -> &'static str {
        match self {
            Outcome::Good => "good",
            Outcome::NoChange => "nochg",
            Outcome::BadSystem => "badsys",
            Outcome::BadAgent => "badagent",
            Outcome::BadAuth => "badauth",
            Outcome::NotDonator => "!donator",
            Outcome::NotFqdn => "notfqdn",
            Outcome::NoHost => "nohost",
            Outcome::NotYours => "!yours",
            Outcome::Abuse => "abuse",
            Outcome::NumHost => "numhost",
            Outcome::DnsError => "dnserr",
            Outcome::ServerFailure => "911",
            Outcome::Failed => "fail",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Outcome::Good => "Update successful.",
            Outcome::NoChange => {
                "Unnecessary update; further updates will be considered abusive."
            }
            Outcome::BadSystem => "Should never happen!",
            Outcome::BadAgent => "Client program is banned!",
            Outcome::BadAuth => "Invalid username or password.",
            Outcome::NotDonator => {
                "Option requested that is only allowed to donating users (such as 'offline')."
            }
            Outcome::NotFqdn => {
                "Hostname isn't a fully-qualified domain name (such as 'hostname.dyndns.org')."
            }
            Outcome::NoHost => {
                "Hostname doesn't exist or wrong service type specified (dyndns, static, custom)."
            }
            Outcome::NotYours => "Hostname exists, but doesn't belong to your account.",
            Outcome::Abuse => "Hostname is banned for abuse.",
            Outcome::NumHost => "Too many or too few hosts found.",
            Outcome::DnsError => "DNS error encountered by server.",
            Outcome::ServerFailure => "Critical error on the provider's hardware.",
            Outcome::Failed => "Failed to update.",
        }
    }

    pub fn action(self) -> Action {
        match self {
            Outcome::Good | Outcome::NoChange => Action::Success,
            Outcome::NotFqdn | Outcome::NoHost | Outcome::NotYours | Outcome::Abuse => {
                Action::SoftLockout
            }
            Outcome::BadSystem
            | Outcome::BadAgent
            | Outcome::BadAuth
            | Outcome::NotDonator
            | Outcome::NumHost
            | Outcome::DnsError
            | Outcome::ServerFailure => Action::HardFailure,
            Outcome::Failed => Action::Ignore,
        }
    }

    /// Contents of the `-dnserr` file written for a soft lockout.
    pub fn lock_reason(self) -> &'static str {
        match self {
            Outcome::NotFqdn | Outcome::NoHost | Outcome::NotYours | Outcome::Abuse => {
                self.token()
            }
            _ => crate::state::UNKNOWN_LOCK_REASON,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Parse a DynDNS-style response body into one outcome per recognized token.
///
/// A body reads like `good 1.2.3.4\nnochg 1.2.3.4\n`; tokens that are not
/// status codes are skipped.
pub fn parse_dyndns_response(body: &str) -> Vec<Outcome> {
    body.split_whitespace()
        .filter_map(Outcome::from_dyndns_token)
        .collect()
}

/// Namecheap and HE report success with a zero error count.
pub fn parse_errcount_response(body: &str) -> Outcome {
    if body.contains("<ErrCount>0") {
        Outcome::Good
    } else {
        Outcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_host_response() {
        let outcomes = parse_dyndns_response("good 203.0.113.5\nnochg 203.0.113.5\n");
        assert_eq!(outcomes, vec![Outcome::Good, Outcome::NoChange]);
    }

    #[test]
    fn test_parse_all_tokens() {
        let body = "badsys badagent badauth !donator good nochg notfqdn nohost !yours abuse numhost dnserr 911";
        let outcomes = parse_dyndns_response(body);
        assert_eq!(outcomes.len(), DYNDNS_TOKENS.len());
        for (outcome, (token, _)) in outcomes.iter().zip(DYNDNS_TOKENS) {
            assert_eq!(outcome.token(), *token);
        }
    }

    #[test]
    fn test_parse_skips_unknown_tokens() {
        assert!(parse_dyndns_response("").is_empty());
        assert!(parse_dyndns_response("<html>oops</html>").is_empty());
        assert_eq!(
            parse_dyndns_response("  \tgood\r\n10.0.0.1 garbage notfqdn"),
            vec![Outcome::Good, Outcome::NotFqdn]
        );
    }

    #[test]
    fn test_token_matching_is_by_substring() {
        assert_eq!(Outcome::from_dyndns_token("[good]"), Some(Outcome::Good));
        assert_eq!(Outcome::from_dyndns_token("badauth!"), Some(Outcome::BadAuth));
    }

    #[test]
    fn test_actions() {
        assert_eq!(Outcome::Good.action(), Action::Success);
        assert_eq!(Outcome::NoChange.action(), Action::Success);
        for soft in [Outcome::NotFqdn, Outcome::NoHost, Outcome::NotYours, Outcome::Abuse] {
            assert_eq!(soft.action(), Action::SoftLockout);
            assert_eq!(soft.lock_reason(), soft.token());
        }
        for hard in [
            Outcome::BadSystem,
            Outcome::BadAgent,
            Outcome::BadAuth,
            Outcome::NotDonator,
            Outcome::NumHost,
            Outcome::DnsError,
            Outcome::ServerFailure,
        ] {
            assert_eq!(hard.action(), Action::HardFailure);
        }
        assert_eq!(Outcome::Failed.action(), Action::Ignore);
        assert_eq!(parse_errcount_response("<ErrCount>0</ErrCount>").action(), Action::Success);
        assert_eq!(parse_errcount_response("<ErrCount>1</ErrCount>").action(), Action::Ignore);
        assert_eq!(Outcome::BadAuth.lock_reason(), "unknown");
    }

    #[test]
    fn test_errcount_response() {
        let ok = "<?xml version=\"1.0\"?><interface-response><ErrCount>0</ErrCount></interface-response>";
        assert_eq!(parse_errcount_response(ok), Outcome::Good);
        assert_eq!(parse_errcount_response("<ErrCount>1</ErrCount><Err1>Passwords do not match</Err1>"), Outcome::Failed);
        assert_eq!(parse_errcount_response(""), Outcome::Failed);
    }
}
