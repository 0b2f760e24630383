//! Request classification: turn request metadata into an [`Identity`] and
//! then into the `(key, limit)` pair the engine works with.

use super::types::{ClassLimits, Identity, RateKey};
use std::net::{IpAddr, SocketAddr};

/// Classify a request by its originating address and optional access token.
///
/// A non-empty token wins and the address is ignored. Otherwise the address is
/// used with any port suffix stripped.
pub fn classify(remote_addr: &str, token: Option<&str>) -> Identity {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => Identity::token(token),
        None => Identity::address(strip_port(remote_addr)),
    }
}

/// Map an identity to its store key and ceiling
pub fn key_and_limit(identity: &Identity, limits: &ClassLimits) -> (RateKey, u32) {
    (identity.rate_key(), limits.limit_for(identity.class))
}

/// Strip a `:port` suffix from an address.
///
/// Handles `1.2.3.4:80`, `[::1]:80`, bare IPs (v4 and v6) and `host:port`.
pub fn strip_port(addr: &str) -> String {
    let addr = addr.trim();

    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return sock.ip().to_string();
    }

    // Bare IPv6 contains colons but no port
    if addr.parse::<IpAddr>().is_ok() {
        return addr.to_string();
    }

    if let Some(rest) = addr.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once(']') {
            return host.to_string();
        }
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            host.to_string()
        }
        _ => addr.to_string(),
    }
}
