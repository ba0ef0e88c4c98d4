use serde::{Deserialize, Serialize};

/// Where a scan runs: on this machine or on a host reached over SSH.
///
/// A remote target is written as a single string of the form
/// `user@host:port`. The port segment is optional and falls back to 22
/// when absent or unparseable. The sudo flag is orthogonal metadata; two
/// targets with the same host and port identify the same connection
/// regardless of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScanTarget {
    Local,
    Remote {
        /// Login spec as given, typically `user@host`.
        host: String,
        port: u16,
        /// Prefix remote engine invocations with `sudo`.
        sudo: bool,
    },
}

impl ScanTarget {
    /// Parse a target string. The literal `"localhost"` (or an empty
    /// string) means the local machine; anything else is a remote spec.
    pub fn parse(spec: &str, sudo: bool) -> Self {
        if spec.is_empty() || spec == "localhost" {
            return ScanTarget::Local;
        }
        let (host, port) = split_target(spec);
        ScanTarget::Remote { host, port, sudo }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ScanTarget::Local)
    }
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanTarget::Local => write!(f, "localhost"),
            ScanTarget::Remote { host, port, .. } => write!(f, "{host}:{port}"),
        }
    }
}

/// Split a `host[:port]` spec into host and port.
///
/// Everything before the last colon is the host, including any `user@`
/// prefix. A missing or unparseable port segment yields 22.
pub fn split_target(spec: &str) -> (String, u16) {
    match spec.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().unwrap_or(22);
            (host.to_string(), port)
        }
        None => (spec.to_string(), 22),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_user_host_port() {
        assert_eq!(split_target("user@host:22"), ("user@host".into(), 22));
        assert_eq!(split_target("root@box:2222"), ("root@box".into(), 2222));
    }

    #[test]
    fn missing_port_defaults() {
        assert_eq!(split_target("user@host"), ("user@host".into(), 22));
    }

    #[test]
    fn malformed_port_defaults() {
        assert_eq!(split_target("user@host:abc"), ("user@host".into(), 22));
        assert_eq!(split_target("user@host:"), ("user@host".into(), 22));
        assert_eq!(split_target("user@host:99999"), ("user@host".into(), 22));
    }

    #[test]
    fn localhost_is_local() {
        assert!(ScanTarget::parse("localhost", false).is_local());
        assert!(ScanTarget::parse("", false).is_local());
        assert!(!ScanTarget::parse("user@host", false).is_local());
    }

    proptest! {
        #[test]
        fn split_never_panics(spec in ".*") {
            let (_, port) = split_target(&spec);
            // Port is either parsed from the trailing segment or the default.
            if !spec.contains(':') {
                prop_assert_eq!(port, 22);
            }
        }

        #[test]
        fn split_recovers_valid_ports(host in "[a-z@.]{1,12}", port in 1u16..) {
            let spec = format!("{host}:{port}");
            let (parsed_host, parsed_port) = split_target(&spec);
            prop_assert_eq!(parsed_host, host);
            prop_assert_eq!(parsed_port, port);
        }
    }
}
