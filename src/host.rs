//! SSH host specifications.
//!
//! A host is given on the command line as `[user@]host[:port]`, or as an alias
//! defined in a YAML hosts file. Every task of one invocation runs against the
//! single `ConnectionSpec` resolved here.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::net::Ipv6Addr;
use std::str::FromStr;

use colored::*;
use serde::Deserialize;
use void::Void;

use crate::error::FabError;
use crate::serde::string_or_mapping;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    /// SSH login user. `None` leaves the choice to ssh (config or local user).
    pub user: Option<String>,
    /// Hostname or address to connect to.
    pub host: String,
    /// SSH port. `None` leaves the choice to ssh.
    pub port: Option<u16>,
}

impl ConnectionSpec {
    /// Parses `[user@]host[:port]`. IPv6 addresses with a port go in brackets.
    pub fn parse(spec: &str) -> Result<Self, FabError> {
        let invalid = |reason: &str| FabError::InvalidHostSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        if spec.is_empty() {
            return Err(invalid("missing host"));
        }
        if spec.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }

        let (user, rest) = match spec.split_once('@') {
            Some(("", _)) => return Err(invalid("empty user")),
            Some((user, rest)) => (Some(user.to_string()), rest),
            None => (None, spec),
        };
        if rest.contains('@') {
            return Err(invalid("more than one '@'"));
        }

        let (host, port) = if let Some(inner) = rest.strip_prefix('[') {
            let (addr, after) = inner
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '['"))?;
            let port = match after {
                "" => None,
                after => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| invalid("expected ':' after ']'"))?;
                    Some(parse_port(port).ok_or_else(|| invalid("invalid port"))?)
                }
            };
            (addr, port)
        } else {
            match rest.split_once(':') {
                Some((host, port)) if !port.contains(':') => {
                    (host, Some(parse_port(port).ok_or_else(|| invalid("invalid port"))?))
                }
                // More than one colon without brackets must be a bare IPv6 address.
                Some(_) => {
                    rest.parse::<Ipv6Addr>()
                        .map_err(|_| invalid("invalid IPv6 address"))?;
                    (rest, None)
                }
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }

    /// For pretty-printing the host name in command output.
    pub fn prettify(&self) -> ColoredString {
        format!("[{}]", self).bright_cyan().bold()
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok().filter(|port| *port != 0)
}

impl FromStr for ConnectionSpec {
    type Err = FabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        match self.port {
            Some(port) if self.host.contains(':') => write!(f, "[{}]:{}", self.host, port),
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostEntry(#[serde(deserialize_with = "string_or_mapping")] HostEntryInner);

#[derive(Debug, Deserialize)]
struct HostEntryInner {
    hostname: String,
    user: Option<String>,
    port: Option<u16>,
}

impl FromStr for HostEntryInner {
    type Err = Void;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            hostname: s.to_string(),
            user: None,
            port: None,
        })
    }
}

impl HostEntryInner {
    fn into_spec(self) -> Result<ConnectionSpec, FabError> {
        let mut spec = ConnectionSpec::parse(&self.hostname)?;
        if let Some(user) = self.user {
            if user.is_empty() {
                return Err(FabError::InvalidHostSpec {
                    spec: self.hostname,
                    reason: "empty user".to_string(),
                });
            }
            spec.user = Some(user);
        }
        if let Some(port) = self.port {
            if port == 0 {
                return Err(FabError::InvalidHostSpec {
                    spec: self.hostname,
                    reason: "invalid port".to_string(),
                });
            }
            spec.port = Some(port);
        }
        Ok(spec)
    }
}

/// Reads a YAML mapping of host aliases.
///
/// Each value is either a host spec string or a mapping with `hostname` and
/// optional `user` and `port` keys.
pub fn load_hosts_file(hosts_file: &str) -> Result<HashMap<String, ConnectionSpec>, FabError> {
    let hosts_error = |reason: String| FabError::HostsFile {
        path: hosts_file.to_string(),
        reason,
    };

    let hosts_fd = File::open(hosts_file).map_err(|e| hosts_error(e.to_string()))?;
    let entries: HashMap<String, HostEntry> =
        serde_yaml::from_reader(hosts_fd).map_err(|e| hosts_error(e.to_string()))?;

    let mut aliases = HashMap::with_capacity(entries.len());
    for (alias, HostEntry(entry)) in entries {
        aliases.insert(alias, entry.into_spec()?);
    }
    Ok(aliases)
}

/// Resolves the `-H` value: an alias from the hosts file wins over parsing.
pub fn resolve(
    spec: &str,
    aliases: &HashMap<String, ConnectionSpec>,
) -> Result<ConnectionSpec, FabError> {
    match aliases.get(spec) {
        Some(resolved) => Ok(resolved.clone()),
        None => ConnectionSpec::parse(spec),
    }
}
