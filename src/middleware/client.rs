//! Client address resolution for the access log.
//!
//! The directly connected peer is the client unless it is a trusted proxy, in
//! which case the forwarding headers are consulted. With no trusted proxies
//! configured the headers are never believed.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

use crate::http::Headers;

/// Headers consulted, in order, once the peer is trusted.
const FORWARDING_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// A trusted-proxy entry that is neither an IP address nor a CIDR block.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid trusted proxy {entry:?}: expected an IP address or CIDR block")]
pub struct TrustedProxyError {
    pub entry: String,
}

// One IP address or CIDR block. A bare address is a full-length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Network {
    addr: IpAddr,
    prefix: u8,
}

impl Network {
    fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                same_prefix(u32::from(net).into(), u32::from(ip).into(), self.prefix, 32)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                same_prefix(u128::from(net), u128::from(ip), self.prefix, 128)
            }
            _ => false,
        }
    }
}

fn same_prefix(net: u128, ip: u128, prefix: u8, width: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    let shift = u32::from(width - prefix);
    (net >> shift) == (ip >> shift)
}

impl FromStr for Network {
    type Err = TrustedProxyError;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let invalid = || TrustedProxyError {
            entry: entry.to_owned(),
        };

        let (addr, prefix) = match entry.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (entry, None),
        };
        let addr = addr.parse::<IpAddr>().map_err(|_| invalid())?.to_canonical();
        let width = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= width).ok_or_else(invalid)?,
            None => width,
        };

        Ok(Self { addr, prefix })
    }
}

/// Peers whose forwarding headers are believed.
///
/// ```
/// use geocache::middleware::TrustedProxies;
///
/// let trusted = TrustedProxies::parse("10.0.0.0/8, 192.168.1.5").unwrap();
/// assert!(trusted.contains("10.1.2.3".parse().unwrap()));
/// assert!(!trusted.contains("192.168.1.6".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies {
    networks: Vec<Network>,
}

impl TrustedProxies {
    /// Trusts nobody: the peer address is always the client.
    pub fn none() -> Self {
        Self::default()
    }

    /// Parses a comma-separated list of IP addresses and CIDR blocks.
    ///
    /// Entries are trimmed. An empty list trusts nobody.
    ///
    /// # Errors
    ///
    /// [`TrustedProxyError`] naming the first entry that does not parse.
    pub fn parse(list: &str) -> Result<Self, TrustedProxyError> {
        if list.trim().is_empty() {
            return Ok(Self::none());
        }
        let networks = list
            .split(',')
            .map(|entry| entry.trim().parse())
            .collect::<Result<_, _>>()?;
        Ok(Self { networks })
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Returns `true` if `ip` falls inside any trusted entry.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(ip))
    }

    /// Best guess at the originating client of a request from `peer`.
    ///
    /// An untrusted peer is the answer. A trusted peer's `X-Forwarded-For`
    /// chain is walked right to left and the first address that is not itself
    /// a trusted proxy wins (the leftmost if all are trusted); `X-Real-IP` is
    /// the fallback. Unparseable headers leave the peer as the answer.
    pub fn client_ip(&self, peer: Option<SocketAddr>, headers: &Headers) -> Option<IpAddr> {
        let peer = peer?.ip();
        if !self.contains(peer) {
            return Some(peer);
        }

        FORWARDING_HEADERS
            .iter()
            .filter_map(|name| headers.get(name))
            .find_map(|value| self.forwarded_client(value))
            .or(Some(peer))
    }

    fn forwarded_client(&self, value: &str) -> Option<IpAddr> {
        let hops: Vec<&str> = value.split(',').collect();
        for (i, hop) in hops.iter().enumerate().rev() {
            let ip = hop.trim().parse::<IpAddr>().ok()?;
            if i == 0 || !self.contains(ip) {
                return Some(ip);
            }
        }
        None
    }
}

impl FromStr for TrustedProxies {
    type Err = TrustedProxyError;

    fn from_str(list: &str) -> Result<Self, Self::Err> {
        Self::parse(list)
    }
}
