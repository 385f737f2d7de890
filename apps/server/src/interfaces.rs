//! Choosing the interface the relay advertises on.

use std::net::{IpAddr, Ipv4Addr};

use anyhow::{bail, Result};
use local_ip_address::list_afinet_netifas;
use relay_core::AdvertiseInterface;

/// Private, non-loopback IPv4 addresses of all interfaces, in enumeration order.
///
/// An interface with several addresses appears once per address.
pub fn list_candidates() -> Result<Vec<AdvertiseInterface>> {
    let candidates = list_afinet_netifas()?
        .into_iter()
        .filter_map(|(name, addr)| match addr {
            IpAddr::V4(ip) if !ip.is_loopback() && ip.is_private() => {
                Some(AdvertiseInterface { name, ip })
            }
            _ => None,
        })
        .collect();
    Ok(candidates)
}

/// Picks the advertise interface from the candidates and the operator's
/// `--ifname` / `--bind` choices.
///
/// - neither given: first candidate
/// - only `bind`: the interface owning that address
/// - only `ifname`: that interface's first address
/// - both: the named interface's first address; `bind` then only moves the
///   HTTP listener (see `ServerConfig::to_core_config`), multicast stays on
///   the named interface
pub fn select_interface(
    candidates: &[AdvertiseInterface],
    ifname: Option<&str>,
    bind: Option<Ipv4Addr>,
) -> Result<AdvertiseInterface> {
    if candidates.is_empty() {
        bail!("network not available: no private IPv4 interface found");
    }

    log::debug!("Available interfaces:");
    for (i, c) in candidates.iter().enumerate() {
        log::debug!("{}: {} ({})", i + 1, c.name, c.ip);
    }

    let ifname = ifname.filter(|n| !n.is_empty());
    let selected = match (ifname, bind) {
        (None, None) => candidates.first(),
        (None, Some(ip)) => candidates.iter().find(|c| c.ip == ip),
        (Some(name), _) => candidates.iter().find(|c| c.name == name),
    };

    match selected {
        Some(iface) => Ok(iface.clone()),
        None => bail!("select interface and/or bind address"),
    }
}
