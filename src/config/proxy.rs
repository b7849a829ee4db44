//! Proxy address validation.

use std::net::Ipv4Addr;

use super::error::ConfigError;

const SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];
const MIN_PORT: u16 = 21;

/// Validates a proxy given as `scheme://ipv4:port`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidProxy`] naming the first problem found.
pub fn validate_proxy(proxy: &str) -> Result<(), ConfigError> {
    let (scheme, rest) = proxy
        .split_once("://")
        .ok_or_else(|| ConfigError::invalid_proxy(proxy, "expected scheme://address:port"))?;
    if !SCHEMES.contains(&scheme) {
        return Err(ConfigError::invalid_proxy(
            proxy,
            format!("unsupported scheme '{scheme}'"),
        ));
    }

    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::invalid_proxy(proxy, "missing port"))?;
    host.parse::<Ipv4Addr>()
        .map_err(|_| ConfigError::invalid_proxy(proxy, format!("'{host}' is not an IPv4 address")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| ConfigError::invalid_proxy(proxy, format!("invalid port '{port}'")))?;
    if port < MIN_PORT || port == u16::MAX {
        return Err(ConfigError::invalid_proxy(
            proxy,
            format!("port {port} outside {MIN_PORT}..65535"),
        ));
    }
    Ok(())
}
