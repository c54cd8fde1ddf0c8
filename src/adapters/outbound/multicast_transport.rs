//! UDP Multicast Transport
//!
//! Implements Transport with a pair of UDP sockets: one bound to the group
//! port and joined to the group on every IPv4 interface, one on an ephemeral
//! port for sending.

use crate::domain::ports::{Datagram, Transport, TransportError};
use crate::replication::{ConfigError, MAX_DATAGRAM_SIZE};
use async_trait::async_trait;
use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;

/// Multicast group settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastConfig {
    /// Group address (default: 230.1.1.1)
    pub group: Ipv4Addr,
    /// Group port (default: 12345)
    pub port: u16,
    /// Hop limit of outgoing datagrams (default: 1, stay on the LAN)
    pub ttl: u32,
    /// Deliver outgoing datagrams to sockets on this host (default: true)
    pub multicast_loop: bool,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(230, 1, 1, 1),
            port: 12345,
            ttl: 1,
            multicast_loop: true,
        }
    }
}

impl MulticastConfig {
    pub fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.group.is_multicast() {
            return Err(ConfigError::InvalidGroup(self.group.to_string()));
        }
        Ok(())
    }
}

/// Transport over a real UDP multicast group.
pub struct MulticastTransport {
    recv_socket: UdpSocket,
    send_socket: UdpSocket,
    group: SocketAddr,
    send_port: u16,
    local_ips: HashSet<IpAddr>,
    joined: Vec<Ipv4Addr>,
}

impl MulticastTransport {
    /// Bind both sockets and join the group.
    ///
    /// Must be called from within a tokio runtime. Join failures on single
    /// interfaces are logged and skipped.
    pub fn bind(config: &MulticastConfig) -> Result<Self, TransportError> {
        config
            .validate()
            .map_err(|e| TransportError::Setup(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let interfaces = local_ipv4_interfaces();

        let recv_socket = receive_socket(config.port).map_err(TransportError::Setup)?;
        let joined = join_group(&recv_socket, config.group, &interfaces);

        let send_socket = send_socket(config).map_err(TransportError::Setup)?;
        let send_port = send_socket
            .local_addr()
            .map_err(TransportError::Setup)?
            .as_socket()
            .map(|addr| addr.port())
            .unwrap_or(0);

        let local_ips = interfaces.iter().map(|(_, ip)| IpAddr::V4(*ip)).collect();

        tracing::info!(
            "multicast transport on {} joined {} interfaces, sending from port {}",
            config.group_addr(),
            joined.len(),
            send_port
        );

        Ok(Self {
            recv_socket: UdpSocket::from_std(recv_socket.into()).map_err(TransportError::Setup)?,
            send_socket: UdpSocket::from_std(send_socket.into()).map_err(TransportError::Setup)?,
            group: config.group_addr(),
            send_port,
            local_ips,
            joined,
        })
    }

    pub fn group(&self) -> SocketAddr {
        self.group
    }

    /// Interface addresses the group was joined on.
    pub fn joined_interfaces(&self) -> &[Ipv4Addr] {
        &self.joined
    }

    pub fn send_port(&self) -> u16 {
        self.send_port
    }
}

#[async_trait]
impl Transport for MulticastTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.send_socket
            .send_to(payload, self.group)
            .await
            .map(|_| ())
            .map_err(TransportError::Send)
    }

    async fn recv(&self) -> Result<Datagram, TransportError> {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM_SIZE);
        let (len, src) = self
            .recv_socket
            .recv_from(&mut buf)
            .await
            .map_err(TransportError::Receive)?;
        buf.truncate(len);

        Ok(Datagram {
            payload: buf.freeze(),
            from_self: is_own_source(src, self.send_port, &self.local_ips),
        })
    }
}

/// Whether a datagram source is this host's send socket.
pub fn is_own_source(src: SocketAddr, send_port: u16, local_ips: &HashSet<IpAddr>) -> bool {
    src.port() == send_port && local_ips.contains(&src.ip())
}

/// IPv4 addresses of every interface that is up.
fn local_ipv4_interfaces() -> Vec<(String, Ipv4Addr)> {
    match get_if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(ip) => Some((iface.name, ip)),
                IpAddr::V6(_) => None,
            })
            .collect(),
        Err(e) => {
            tracing::warn!("failed to list network interfaces: {}", e);
            Vec::new()
        }
    }
}

fn receive_socket(port: u16) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    Ok(socket)
}

fn send_socket(config: &MulticastConfig) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_ttl_v4(config.ttl)?;
    socket.set_multicast_loop_v4(config.multicast_loop)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
    Ok(socket)
}

/// Join the group on each interface, falling back to the default interface
/// when none of them accepts the membership.
fn join_group(socket: &Socket, group: Ipv4Addr, interfaces: &[(String, Ipv4Addr)]) -> Vec<Ipv4Addr> {
    let mut joined = Vec::new();

    for (name, ip) in interfaces {
        match socket.join_multicast_v4(&group, ip) {
            Ok(()) => {
                tracing::debug!("joined {} on {} ({})", group, name, ip);
                joined.push(*ip);
            }
            Err(e) => {
                let err = TransportError::Join {
                    interface: format!("{} ({})", name, ip),
                    source: e,
                };
                tracing::warn!("{}", err);
            }
        }
    }

    if joined.is_empty() {
        match socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
            Ok(()) => joined.push(Ipv4Addr::UNSPECIFIED),
            Err(e) => tracing::error!("failed to join {} on any interface: {}", group, e),
        }
    }

    joined
}
