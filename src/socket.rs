//! Socket utilities for mDNS.
//!
//! This module provides [`MulticastSocket`], a builder for creating
//! properly configured UDP sockets for mDNS communication. It is the
//! only piece of the crate that touches the platform; every protocol
//! component stays sans-I/O and is fed datagrams by the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use mdns_discovery::{Family, MulticastSocket};
//!
//! let std_socket = MulticastSocket::new(Family::Ipv4)
//!     .with_loopback(true)
//!     .into_std()?;
//!
//! // For tokio:
//! let socket = tokio::net::UdpSocket::from_std(std_socket)?;
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::transport::{Family, MDNS_MULTICAST_IPV4, MDNS_MULTICAST_IPV6, MDNS_PORT};

/// A builder for creating multicast UDP sockets suitable for mDNS.
///
/// The resulting socket will be:
///
/// - Bound to `0.0.0.0:5353` or `[::]:5353` depending on the family
/// - Configured with `SO_REUSEADDR` (and `SO_REUSEPORT` where supported)
/// - Set to non-blocking mode for async compatibility
/// - Joined to the mDNS multicast group (224.0.0.251 or ff02::fb)
#[derive(Debug, Clone)]
pub struct MulticastSocket {
    family: Family,
    local_port: Option<u16>,
    interface_v4: Option<Ipv4Addr>,
    interface_index_v6: u32,
    loopback: bool,
    ttl: Option<u32>,
}

impl Default for MulticastSocket {
    fn default() -> Self {
        Self::new(Family::Ipv4)
    }
}

impl MulticastSocket {
    /// Creates a new builder for the given address family.
    pub fn new(family: Family) -> Self {
        Self {
            family,
            local_port: None,
            interface_v4: None,
            interface_index_v6: 0,
            loopback: true,
            ttl: None,
        }
    }

    /// Overrides the local port (default 5353). Useful for test drivers
    /// that run several endpoints on one machine.
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = Some(port);
        self
    }

    /// Sets a specific IPv4 network interface for multicast operations.
    ///
    /// If not set, the socket joins the multicast group on all
    /// interfaces (`INADDR_ANY`).
    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface_v4 = Some(interface);
        self
    }

    /// Sets the IPv6 interface index for the group join (0 = any).
    pub fn with_interface_index(mut self, index: u32) -> Self {
        self.interface_index_v6 = index;
        self
    }

    /// Enables or disables local loopback of multicast datagrams.
    ///
    /// Loopback is on by default: other mDNS endpoints on this machine
    /// must see our traffic, and the protocol components discard their
    /// own copies via the interface's own-address check.
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Sets the multicast TTL. Only meaningful for IPv4; ignored for
    /// IPv6, where the hop limit stays at the platform default.
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Converts this builder into a configured `std::net::UdpSocket`.
    ///
    /// # Errors
    ///
    /// Returns an error if socket creation, an option, the bind or the
    /// multicast group join fails.
    pub fn into_std(self) -> io::Result<UdpSocket> {
        let domain = match self.family {
            Family::Ipv4 => Domain::IPV4,
            Family::Ipv6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        // Allow coexistence with other mDNS responders on this machine.
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;

        let port = self.local_port.unwrap_or(MDNS_PORT);
        match self.family {
            Family::Ipv4 => {
                let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
                socket.bind(&bind_addr.into())?;

                let iface = self.interface_v4.unwrap_or(Ipv4Addr::UNSPECIFIED);
                socket.join_multicast_v4(&MDNS_MULTICAST_IPV4, &iface)?;
                socket.set_multicast_loop_v4(self.loopback)?;
                if let Some(ttl) = self.ttl {
                    socket.set_multicast_ttl_v4(ttl)?;
                }
            }
            Family::Ipv6 => {
                let bind_addr = SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), port);
                socket.bind(&bind_addr.into())?;

                socket.join_multicast_v6(&MDNS_MULTICAST_IPV6, self.interface_index_v6)?;
                socket.set_multicast_loop_v6(self.loopback)?;
            }
        }

        Ok(socket.into())
    }
}
