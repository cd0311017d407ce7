//! Host list loading and IPv4 resolution

use crate::pinger::PingerError;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tracing::debug;

/// Parse a host list: one host per line, blank lines and `#` comments skipped
pub fn parse_host_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read the host list at `path`
///
/// # Errors
///
/// * `PingerError::HostFileError` - If the file cannot be read
/// * `PingerError::ConfigError` - If the file names no hosts
pub fn read_host_file(path: &Path) -> Result<Vec<String>, PingerError> {
    let contents = std::fs::read_to_string(path).map_err(|e| PingerError::HostFileError {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let hosts = parse_host_list(&contents);
    if hosts.is_empty() {
        return Err(PingerError::ConfigError(format!(
            "{} contains no hosts",
            path.display()
        )));
    }
    Ok(hosts)
}

/// Resolver used for host names in the host list
pub fn default_resolver() -> TokioResolver {
    TokioResolver::builder_with_config(
        ResolverConfig::cloudflare(),
        TokioConnectionProvider::default(),
    )
    .build()
}

/// Resolve one host to an IPv4 address
///
/// Literal addresses are used as-is; anything else goes through an A lookup.
pub async fn resolve_host(resolver: &TokioResolver, host: &str) -> Result<Ipv4Addr, PingerError> {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => return Ok(ip),
        Ok(IpAddr::V6(_)) => return Err(PingerError::Ipv6NotSupported),
        Err(_) => {}
    }

    let lookup = resolver
        .ipv4_lookup(host)
        .await
        .map_err(|e| PingerError::ResolutionError(format!("{host}: {e}")))?;
    let ip = lookup
        .iter()
        .next()
        .map(|a| a.0)
        .ok_or_else(|| PingerError::ResolutionError(format!("{host}: no IPv4 address")))?;

    debug!(host, %ip, "Resolved host");
    Ok(ip)
}

/// Resolve every host, failing on the first one that does not resolve
pub async fn resolve_hosts(hosts: &[String]) -> Result<Vec<Ipv4Addr>, PingerError> {
    let resolver = default_resolver();
    let mut addresses = Vec::with_capacity(hosts.len());
    for host in hosts {
        addresses.push(resolve_host(&resolver, host).await?);
    }
    Ok(addresses)
}
