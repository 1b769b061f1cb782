//! Network environment self-check
//!
//! A transparent proxy or captive portal resolves unrelated hostnames to the
//! same handful of addresses, which silently poisons every capture made
//! behind it. Before acquiring work the pipeline periodically resolves a set
//! of well-known hostnames and requires every answer to be distinct.

use std::collections::HashSet;
use std::net::IpAddr;

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Hostnames resolved by the self-check, hosted on unrelated networks
const CHECK_HOSTNAMES: [&str; 5] = [
    "twitter.com",
    "youtube.com",
    "microsoft.com",
    "icanhas.cheezburger.com",
    "archiveteam.org",
];

/// Resolve the check hostnames and require all answers to be distinct
///
/// # Errors
/// Returns [`Error::Environment`] when a hostname does not resolve or when
/// two hostnames share an address. Both terminate the run loop.
pub(crate) async fn check_environment() -> Result<()> {
    let mut resolved = Vec::with_capacity(CHECK_HOSTNAMES.len());
    for host in CHECK_HOSTNAMES {
        let address = resolve_first(host).await?;
        debug!(host, address = %address, "Resolved self-check hostname");
        resolved.push(address);
    }
    ensure_distinct(&resolved)?;
    info!("Environment self-check passed");
    Ok(())
}

async fn resolve_first(host: &str) -> Result<IpAddr> {
    let mut addresses = tokio::net::lookup_host((host, 80))
        .await
        .map_err(|e| Error::Environment(format!("cannot resolve {host}: {e}")))?;
    addresses
        .next()
        .map(|socket_address| socket_address.ip())
        .ok_or_else(|| Error::Environment(format!("{host} resolved to no addresses")))
}

fn ensure_distinct(addresses: &[IpAddr]) -> Result<()> {
    let distinct: HashSet<&IpAddr> = addresses.iter().collect();
    if distinct.len() != addresses.len() {
        return Err(Error::Environment(format!(
            "{} hostnames resolved to only {} distinct addresses, DNS looks intercepted",
            addresses.len(),
            distinct.len()
        )));
    }
    Ok(())
}
