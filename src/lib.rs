//! # mdns-discovery
//!
//! A sans-I/O implementation of mDNS (RFC 6762) and DNS-SD (RFC 6763)
//! service discovery for Rust.
//!
//! The crate speaks the DNS wire format over a UDP multicast group and
//! provides the four protocol engines a zero-configuration stack needs:
//!
//! - [`Message`] — the DNS wire codec, with label compression and the
//!   record types DNS-SD composes (A, AAAA, PTR, TXT, SRV, NSEC).
//! - [`Query`] — a continuous querier: exponential-backoff question
//!   schedule, TTL-driven answer cache with proactive re-query, duplicate
//!   question and known-answer suppression.
//! - [`Responder`] — the probe → announce → respond state machine, with
//!   tie-breaking conflict resolution, response aggregation, rate
//!   limiting, NSEC negative answers and goodbyes.
//! - [`ServiceAdvertiser`] / [`ServiceBrowser`] — DNS-SD on top: publish
//!   a service instance (renaming it away from conflicts), or browse a
//!   service type and resolve each instance to host, port and TXT data.
//!
//! ## Sans-I/O Design
//!
//! Every engine implements the [`sansio::Protocol`] trait and performs
//! no I/O of its own. The caller is responsible for:
//!
//! 1. Reading datagrams from the network and calling `handle_read()`
//! 2. Sending the packets returned by `poll_write()`
//! 3. Calling `handle_timeout()` when `poll_timeout()` expires
//! 4. Processing events from `poll_event()`
//!
//! This keeps the protocol logic runtime-agnostic (tokio, async-std,
//! smol, or blocking I/O) and deterministic under test: the RFC's
//! timing behavior is driven entirely through the `Instant` handed to
//! `handle_timeout()`.
//!
//! ## Quick Start
//!
//! ### Browse for services
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use std::time::Instant;
//!
//! use mdns_discovery::{InterfaceInfo, ServiceBrowser, ServiceProtocol, ServiceType};
//! use sansio::Protocol;
//!
//! let interface = InterfaceInfo::ipv4(Ipv4Addr::new(192, 168, 1, 2));
//! let ty = ServiceType::new("http", ServiceProtocol::Tcp);
//! let mut browser = ServiceBrowser::new(ty, interface, Instant::now()).unwrap();
//!
//! // Drive the browser from your event loop:
//! // - feed received datagrams to browser.handle_read(..)
//! // - transmit browser.poll_write() packets to 224.0.0.251:5353
//! // - sleep until browser.poll_timeout(), then browser.handle_timeout(now)
//! while let Some(service) = browser.poll_event() {
//!     println!("{}:{} ({})", service.host, service.port, service.name);
//! }
//! ```
//!
//! ### Advertise a service
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use std::time::Instant;
//!
//! use mdns_discovery::{
//!     InterfaceInfo, ServiceAdvertiser, ServiceConfig, ServiceProtocol, ServiceType,
//! };
//!
//! let interface = InterfaceInfo::ipv4(Ipv4Addr::new(192, 168, 1, 2));
//! let config = ServiceConfig::new(
//!     "My Web Server",
//!     ServiceType::new("http", ServiceProtocol::Tcp),
//!     8080,
//! );
//! let advertiser = ServiceAdvertiser::new(config, interface, Instant::now()).unwrap();
//! // Drive it like the browser; close() sends the goodbye packet.
//! ```
//!
//! ## Event Loop Pattern
//!
//! ```text
//! loop {
//!     while let Some(packet) = conn.poll_write() {
//!         socket.send_to(&packet.message, packet.transport.peer_addr);
//!     }
//!     select! {
//!         (data, peer) = socket.recv_from() => {
//!             conn.handle_read(tagged(data, peer));
//!         }
//!         _ = sleep_until(conn.poll_timeout()) => {
//!             conn.handle_timeout(Instant::now());
//!         }
//!     }
//!     while let Some(event) = conn.poll_event() { /* ... */ }
//! }
//! ```
//!
//! [`MulticastSocket`] builds a correctly configured socket (reuse
//! flags, group join, loopback and TTL control) for the real-network
//! side of that loop.
//!
//! ## Protocol Details
//!
//! - **Multicast groups**: 224.0.0.251:5353 (IPv4), [ff02::fb]:5353 (IPv6)
//! - **Cache-flush bit**: the class field's top bit marks unique records
//! - **TTLs**: 120 s for A/AAAA/SRV/PTR answers, 75 min for the rest
//! - **Message size**: up to 9000 bytes; the TC flag is never set

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub(crate) mod config;
pub mod error;
pub mod message;
pub(crate) mod timer;

pub mod dnssd;
pub mod query;
pub mod responder;
pub mod socket;
pub mod transport;

pub use dnssd::{AdvertiserEvent, Service, ServiceAdvertiser, ServiceBrowser, ServiceConfig};
pub use dnssd::{ServiceProtocol, ServiceType};
pub use error::{Error, Result};
pub use message::{
    DnsType, Header, Message, Name, Question, RData, Resource, TxtAttribute, TxtValue,
};
pub use query::{CacheEvent, CacheEventKind, Query};
pub use responder::{ProposedRecord, Responder, ResponderEvent};
pub use socket::MulticastSocket;
pub use transport::{
    Family, InterfaceInfo, TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol,
    MDNS_DEST_ADDR_IPV4, MDNS_DEST_ADDR_IPV6, MDNS_MULTICAST_IPV4, MDNS_MULTICAST_IPV6, MDNS_PORT,
};
