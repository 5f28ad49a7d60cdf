//! Transport plumbing shared by every component.
//!
//! The crate never touches a socket itself: the caller reads datagrams off
//! its UDP socket, tags them with a [`TransportContext`] and feeds them to
//! `handle_read()`, and transmits whatever `poll_write()` hands back. The
//! types here carry that tagging, plus the interface description the
//! querier and responder use to recognise their own traffic.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Instant;

use bytes::BytesMut;

/// The IPv4 mDNS multicast group (224.0.0.251).
pub const MDNS_MULTICAST_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The IPv6 mDNS multicast group (ff02::fb).
pub const MDNS_MULTICAST_IPV6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// The standard mDNS port (5353).
pub const MDNS_PORT: u16 = 5353;

/// mDNS IPv4 multicast destination address (224.0.0.251:5353).
pub const MDNS_DEST_ADDR_IPV4: SocketAddr =
    SocketAddr::new(IpAddr::V4(MDNS_MULTICAST_IPV4), MDNS_PORT);

/// mDNS IPv6 multicast destination address ([ff02::fb]:5353).
pub const MDNS_DEST_ADDR_IPV6: SocketAddr =
    SocketAddr::new(IpAddr::V6(MDNS_MULTICAST_IPV6), MDNS_PORT);

/// Address family of the multicast transport.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Family {
    /// IPv4
    #[default]
    Ipv4,
    /// IPv6
    Ipv6,
}

impl Family {
    /// The multicast group destination for this family.
    pub fn mdns_dest_addr(&self) -> SocketAddr {
        match self {
            Family::Ipv4 => MDNS_DEST_ADDR_IPV4,
            Family::Ipv6 => MDNS_DEST_ADDR_IPV6,
        }
    }
}

/// Type of transport protocol. mDNS only ever uses UDP; the field exists
/// so tagged messages stay interchangeable with other protocol drivers.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    /// UDP
    #[default]
    UDP,
    /// TCP
    TCP,
}

/// Transport context with local address, peer address and protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TransportContext {
    /// Local socket address, either IPv4 or IPv6
    pub local_addr: SocketAddr,
    /// Peer socket address, either IPv4 or IPv6
    pub peer_addr: SocketAddr,
    /// Type of transport protocol
    pub transport_protocol: TransportProtocol,
}

impl Default for TransportContext {
    fn default() -> Self {
        Self {
            local_addr: SocketAddr::from_str("0.0.0.0:0").unwrap(),
            peer_addr: SocketAddr::from_str("0.0.0.0:0").unwrap(),
            transport_protocol: TransportProtocol::UDP,
        }
    }
}

/// A generic transmit with [`TransportContext`].
#[derive(Debug, Clone)]
pub struct TransportMessage<T> {
    /// Received/Sent time
    pub now: Instant,
    /// A transport context with local and peer address
    pub transport: TransportContext,
    /// Message body with generic type
    pub message: T,
}

/// BytesMut type transmit with [`TransportContext`].
pub type TaggedBytesMut = TransportMessage<BytesMut>;

/// Description of the local interface a component speaks mDNS on.
///
/// The multicast group loops our own datagrams back at us;
/// [`is_own_address`](InterfaceInfo::is_own_address) is how the querier
/// and responder recognise and drop those copies.
#[derive(Debug, Clone, Default)]
pub struct InterfaceInfo {
    /// Address family the transport is bound to.
    pub family: Family,
    /// Every address assigned to this machine on the interface.
    pub addrs: Vec<IpAddr>,
}

impl InterfaceInfo {
    pub fn new(family: Family, addrs: Vec<IpAddr>) -> Self {
        Self { family, addrs }
    }

    /// Convenience constructor for a single-address IPv4 interface.
    pub fn ipv4(addr: Ipv4Addr) -> Self {
        Self {
            family: Family::Ipv4,
            addrs: vec![IpAddr::V4(addr)],
        }
    }

    /// Convenience constructor for a single-address IPv6 interface.
    pub fn ipv6(addr: Ipv6Addr) -> Self {
        Self {
            family: Family::Ipv6,
            addrs: vec![IpAddr::V6(addr)],
        }
    }

    /// Whether `host` is one of this machine's addresses.
    pub fn is_own_address(&self, host: IpAddr) -> bool {
        self.addrs.contains(&host)
    }

    /// The multicast destination matching this interface's family.
    pub fn mdns_dest_addr(&self) -> SocketAddr {
        self.family.mdns_dest_addr()
    }
}
