// ABOUTME: Parsing of the remote target argument.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@[::1]:port".

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostSpecError {
    #[error("host cannot be empty")]
    Empty,

    #[error("hostname cannot be empty in {0:?}")]
    MissingHost(String),

    #[error("user cannot be empty in {0:?}")]
    EmptyUser(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid character in host {host:?}: {found:?}")]
    InvalidChar { host: String, found: char },
}

/// A remote target: `[user@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    user: Option<String>,
    host: String,
    port: Option<u16>,
}

impl HostSpec {
    pub fn parse(s: &str) -> Result<Self, HostSpecError> {
        if s.is_empty() {
            return Err(HostSpecError::Empty);
        }
        if let Some(c) = s.chars().find(|c| c.is_whitespace()) {
            return Err(HostSpecError::InvalidChar {
                host: s.to_string(),
                found: c,
            });
        }

        let (user, rest) = match s.rsplit_once('@') {
            Some((user, _)) if user.is_empty() => {
                return Err(HostSpecError::EmptyUser(s.to_string()));
            }
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, s),
        };

        let (host, port_str) = if let Some(bracketed) = rest.strip_prefix('[') {
            // IPv6 literal: [addr] or [addr]:port
            let (addr, after) = bracketed
                .split_once(']')
                .ok_or_else(|| HostSpecError::MissingHost(s.to_string()))?;
            match after {
                "" => (addr, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (addr, Some(port)),
                    None => return Err(HostSpecError::InvalidPort(after.to_string())),
                },
            }
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(HostSpecError::MissingHost(s.to_string()));
        }
        // ssh would read a leading dash in the destination as an option.
        if host.starts_with('-') || user.as_deref().is_some_and(|u| u.starts_with('-')) {
            return Err(HostSpecError::InvalidChar {
                host: s.to_string(),
                found: '-',
            });
        }

        let port = port_str
            .map(|p| {
                p.parse::<u16>()
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| HostSpecError::InvalidPort(p.to_string()))
            })
            .transpose()?;

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The `[user@]host` destination passed to an ssh client.
    pub fn destination(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match &self.user {
            Some(user) => format!("{}@{}", user, host),
            None => host,
        }
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination())?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for HostSpec {
    type Err = HostSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host() {
        let spec = HostSpec::parse("build01").unwrap();
        assert_eq!(spec.host(), "build01");
        assert_eq!(spec.user(), None);
        assert_eq!(spec.port(), None);
        assert_eq!(spec.destination(), "build01");
    }

    #[test]
    fn user_host_port() {
        let spec = HostSpec::parse("alice@build01:2222").unwrap();
        assert_eq!(spec.user(), Some("alice"));
        assert_eq!(spec.host(), "build01");
        assert_eq!(spec.port(), Some(2222));
        assert_eq!(spec.to_string(), "alice@build01:2222");
    }

    #[test]
    fn ipv6_literal() {
        let spec = HostSpec::parse("root@[::1]:22").unwrap();
        assert_eq!(spec.host(), "::1");
        assert_eq!(spec.port(), Some(22));
        assert_eq!(spec.destination(), "root@[::1]");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(HostSpec::parse(""), Err(HostSpecError::Empty));
        assert!(matches!(
            HostSpec::parse("@host"),
            Err(HostSpecError::EmptyUser(_))
        ));
        assert!(matches!(
            HostSpec::parse("alice@"),
            Err(HostSpecError::MissingHost(_))
        ));
        assert!(matches!(
            HostSpec::parse("host:ssh"),
            Err(HostSpecError::InvalidPort(_))
        ));
        assert!(matches!(
            HostSpec::parse("host:0"),
            Err(HostSpecError::InvalidPort(_))
        ));
        assert!(matches!(
            HostSpec::parse("my host"),
            Err(HostSpecError::InvalidChar { .. })
        ));
    }

    #[test]
    fn leading_dash_is_not_an_ssh_option() {
        assert_eq!(
            HostSpec::parse("-oProxyCommand=touch${IFS}/tmp/x"),
            Err(HostSpecError::InvalidChar {
                host: "-oProxyCommand=touch${IFS}/tmp/x".to_string(),
                found: '-',
            })
        );
        assert!(matches!(
            HostSpec::parse("-lroot@build01"),
            Err(HostSpecError::InvalidChar { found: '-', .. })
        ));
        assert!(matches!(
            HostSpec::parse("alice@-build01:22"),
            Err(HostSpecError::InvalidChar { found: '-', .. })
        ));
        assert_eq!(HostSpec::parse("build-01").unwrap().host(), "build-01");
    }
}
