//! SSDP sockets scoped to a single network interface.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use super::{SsdpError, SsdpResult};
use crate::protocol_constants::{SSDP_MULTICAST_IP, SSDP_MULTICAST_TTL, SSDP_PORT};

/// Sends one datagram to the SSDP multicast group.
///
/// Synchronous so the advertiser can send while holding its state lock.
pub trait SsdpTransport: Send + Sync {
    fn send(&self, datagram: &[u8]) -> SsdpResult<()>;
}

/// Multicast sender bound to one interface address.
#[derive(Debug)]
pub struct MulticastTransport {
    socket: StdUdpSocket,
    group: SocketAddr,
}

impl MulticastTransport {
    /// Creates a sender whose datagrams leave through `iface_ip` only.
    ///
    /// Sets up the socket for SSDP announcements:
    /// - SO_REUSEADDR for rapid restarts
    /// - Outgoing multicast interface pinned to `iface_ip`
    /// - Multicast TTL of 4 per UPnP spec
    pub fn bind(iface_ip: Ipv4Addr) -> SsdpResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(SsdpError::SocketBind)?;

        if let Err(e) = socket.set_reuse_address(true) {
            log::warn!("[Ssdp] Failed to set SO_REUSEADDR on {}: {}", iface_ip, e);
        }
        socket
            .set_multicast_if_v4(&iface_ip)
            .map_err(SsdpError::SocketBind)?;
        if let Err(e) = socket.set_multicast_ttl_v4(SSDP_MULTICAST_TTL) {
            log::warn!("[Ssdp] Failed to set multicast TTL on {}: {}", iface_ip, e);
        }

        let bind_addr = SocketAddr::new(IpAddr::V4(iface_ip), 0);
        socket
            .bind(&bind_addr.into())
            .map_err(SsdpError::SocketBind)?;

        Ok(Self {
            socket: socket.into(),
            group: SocketAddr::new(IpAddr::V4(SSDP_MULTICAST_IP), SSDP_PORT),
        })
    }

    /// Returns the local address datagrams are sent from.
    pub fn local_addr(&self) -> SsdpResult<SocketAddr> {
        self.socket.local_addr().map_err(SsdpError::SocketBind)
    }
}

impl SsdpTransport for MulticastTransport {
    fn send(&self, datagram: &[u8]) -> SsdpResult<()> {
        self.socket
            .send_to(datagram, self.group)
            .map(|_| ())
            .map_err(SsdpError::Send)
    }
}

/// Binds the socket that receives M-SEARCH queries.
///
/// Listens on `0.0.0.0:1900` (shared with other SSDP stacks on the host via
/// SO_REUSEADDR/SO_REUSEPORT) and joins the group on `iface_ip` only.
pub fn bind_search_socket(iface_ip: Ipv4Addr) -> SsdpResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(SsdpError::SocketBind)?;

    socket
        .set_reuse_address(true)
        .map_err(SsdpError::SocketBind)?;
    #[cfg(unix)]
    if let Err(e) = socket.set_reuse_port(true) {
        log::warn!("[Ssdp] Failed to set SO_REUSEPORT: {}", e);
    }

    let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), SSDP_PORT);
    socket
        .bind(&bind_addr.into())
        .map_err(SsdpError::SocketBind)?;
    socket
        .join_multicast_v4(&SSDP_MULTICAST_IP, &iface_ip)
        .map_err(|source| SsdpError::JoinMulticast {
            iface: iface_ip,
            source,
        })?;
    socket
        .set_nonblocking(true)
        .map_err(SsdpError::SocketBind)?;

    let std_socket: StdUdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(SsdpError::SocketBind)
}
