//! Client address classification.
//!
//! Enrichment skips third-party geolocation for addresses that can never
//! leave the local network; those are annotated as local origin instead.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Where a client identifier lives, as far as geolocation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressScope {
    /// Loopback, private, link-local, unspecified or unique-local.
    Local,
    /// Anything else, including identifiers that do not parse as addresses.
    Public,
}

impl AddressScope {
    pub fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

/// Classify a client identifier.
pub fn classify(identifier: &str) -> AddressScope {
    match identifier.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) if is_local_v4(v4) => AddressScope::Local,
        Ok(IpAddr::V6(v6)) if is_local_v6(v6) => AddressScope::Local,
        _ => AddressScope::Public,
    }
}

/// Shorthand for `classify(identifier).is_local()`.
pub fn is_local(identifier: &str) -> bool {
    classify(identifier).is_local()
}

fn is_local_v4(addr: Ipv4Addr) -> bool {
    addr.is_loopback() || addr.is_private() || addr.is_link_local() || addr.is_unspecified()
}

fn is_local_v6(addr: Ipv6Addr) -> bool {
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return is_local_v4(mapped);
    }
    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}
