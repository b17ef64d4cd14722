//! Structured process addresses.
//!
//! Text form is `ip[:port[:flag...]]`. IPv6 hosts are wrapped in brackets
//! whenever a port follows (`[::1]:4500:tls`); a bare IPv6 literal without a
//! port is accepted as-is. The exclusion logic only relies on equality and
//! hashing, so two addresses that differ in port or flags are distinct.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a [`ProcessAddress`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("empty address")]
    Empty,

    #[error("invalid IP address in '{0}'")]
    InvalidIp(String),

    #[error("invalid port in '{0}'")]
    InvalidPort(String),

    #[error("unterminated IPv6 bracket in '{0}'")]
    UnterminatedBracket(String),
}

/// Network endpoint of a single database process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessAddress {
    pub ip: IpAddr,
    pub port: Option<u16>,
    /// Transport qualifiers such as `tls`. Only written out when a port is set.
    pub flags: BTreeSet<String>,
}

impl ProcessAddress {
    pub fn new(ip: IpAddr, port: Option<u16>) -> Self {
        Self {
            ip,
            port,
            flags: BTreeSet::new(),
        }
    }

    /// Address with only an IP, the shape the admin interface uses for
    /// whole-machine exclusions.
    pub fn from_ip(ip: IpAddr) -> Self {
        Self::new(ip, None)
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into().to_ascii_lowercase());
        self
    }

    /// Same host with port and flags stripped.
    pub fn ip_only(&self) -> Self {
        Self::from_ip(self.ip)
    }

    fn parse_port(raw: &str, original: &str) -> Result<u16, AddressParseError> {
        raw.parse::<u16>()
            .map_err(|_| AddressParseError::InvalidPort(original.to_string()))
    }

    fn parse_tail(
        ip: IpAddr,
        tail: Option<&str>,
        original: &str,
    ) -> Result<Self, AddressParseError> {
        let mut address = Self::from_ip(ip);
        let Some(tail) = tail else {
            return Ok(address);
        };

        let mut parts = tail.split(':');
        if let Some(port) = parts.next() {
            address.port = Some(Self::parse_port(port, original)?);
        }
        for flag in parts.filter(|f| !f.is_empty()) {
            address = address.with_flag(flag);
        }
        Ok(address)
    }
}

impl FromStr for ProcessAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressParseError::Empty);
        }

        // Bare IPv4 or IPv6 literal.
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Self::from_ip(ip));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| AddressParseError::UnterminatedBracket(s.to_string()))?;
            let ip = host
                .parse::<IpAddr>()
                .map_err(|_| AddressParseError::InvalidIp(s.to_string()))?;
            let tail = match after {
                "" => None,
                other => Some(
                    other
                        .strip_prefix(':')
                        .ok_or_else(|| AddressParseError::InvalidPort(s.to_string()))?,
                ),
            };
            return Self::parse_tail(ip, tail, s);
        }

        let (host, tail) = match s.split_once(':') {
            Some((host, tail)) => (host, Some(tail)),
            None => (s, None),
        };
        let ip = host
            .parse::<IpAddr>()
            .map_err(|_| AddressParseError::InvalidIp(s.to_string()))?;
        Self::parse_tail(ip, tail, s)
    }
}

impl TryFrom<String> for ProcessAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProcessAddress> for String {
    fn from(value: ProcessAddress) -> Self {
        value.to_string()
    }
}

impl From<IpAddr> for ProcessAddress {
    fn from(ip: IpAddr) -> Self {
        Self::from_ip(ip)
    }
}

impl fmt::Display for ProcessAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(port) = self.port else {
            return write!(f, "{}", self.ip);
        };
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, port)?,
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, port)?,
        }
        for flag in &self.flags {
            write!(f, ":{}", flag)?;
        }
        Ok(())
    }
}

/// Renders a list of addresses as `[a b c]` for log and event messages.
pub fn format_addresses<'a, I>(addresses: I) -> String
where
    I: IntoIterator<Item = &'a ProcessAddress>,
{
    let joined = addresses
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{}]", joined)
}
